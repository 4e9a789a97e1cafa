//! Gettext `.po` reader and writer.
//!
//! The reader is strict: anything that is not a comment, a keyword line or a
//! string continuation is rejected with the offending line number, so a
//! malformed push never reaches the store.

use std::fmt::{self, Write as _};
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use thiserror::Error;

use crate::model::entry::Entry;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct PoError {
    pub line: usize,
    pub message: String,
}

impl PoError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoFile {
    /// Comment lines above the header entry, verbatim.
    pub header: Vec<String>,
    pub header_flags: Vec<String>,
    pub metadata: IndexMap<String, String>,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Ctxt,
    Id,
    IdPlural,
    Str,
    StrPlural(usize),
}

#[derive(Default)]
struct Pending {
    entry: Entry,
    raw_comments: Vec<String>,
    has_msgid: bool,
    has_msgstr: bool,
    field: Option<Field>,
    line: usize,
}

impl Pending {
    fn has_comments(&self) -> bool {
        !self.raw_comments.is_empty()
    }
}

fn keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(msgctxt|msgid_plural|msgid|msgstr)(?:\[([^\]]*)\])?\s+(.*)$")
            .expect("keyword pattern is valid")
    })
}

pub fn parse(text: &str) -> Result<PoFile, PoError> {
    if text.trim().is_empty() {
        return Err(PoError::new(1, "empty catalog"));
    }

    let mut po = PoFile::default();
    let mut pending = Pending::default();

    for (i, raw) in text.lines().enumerate() {
        let ln = i + 1;
        let line = raw.trim();

        if line.is_empty() {
            if pending.has_msgid {
                finish(&mut po, std::mem::take(&mut pending))?;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("#~") {
            let rest = rest.trim_start();
            if let Some(prev) = rest.strip_prefix('|') {
                start_comment(&mut po, &mut pending, ln, line)?;
                pending.entry.previous.push(prev.trim().to_string());
                continue;
            }
            keyword_or_continuation(&mut po, &mut pending, ln, rest, true)?;
            continue;
        }

        if line.starts_with('#') {
            start_comment(&mut po, &mut pending, ln, line)?;
            let e = &mut pending.entry;
            if let Some(rest) = line.strip_prefix("#,") {
                e.flags.extend(
                    rest.split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(str::to_string),
                );
            } else if let Some(rest) = line.strip_prefix("#:") {
                e.occurrences.push(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("#.") {
                e.comment.push(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("#|") {
                e.previous.push(rest.trim().to_string());
            } else {
                let rest = &line[1..];
                e.tcomment
                    .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
            continue;
        }

        keyword_or_continuation(&mut po, &mut pending, ln, line, false)?;
    }

    if pending.has_msgid {
        finish(&mut po, pending)?;
    } else if pending.has_comments() && po.entries.is_empty() && po.metadata.is_empty() {
        po.header = pending.raw_comments;
        po.header_flags = pending.entry.flags;
    }

    Ok(po)
}

/// A comment after a keyword line belongs to the next entry.
fn start_comment(
    po: &mut PoFile,
    pending: &mut Pending,
    ln: usize,
    line: &str,
) -> Result<(), PoError> {
    if pending.has_msgid {
        finish(po, std::mem::take(pending))?;
    }
    if !pending.has_comments() {
        pending.line = ln;
    }
    pending.raw_comments.push(line.to_string());
    Ok(())
}

fn keyword_or_continuation(
    po: &mut PoFile,
    pending: &mut Pending,
    ln: usize,
    line: &str,
    obsolete: bool,
) -> Result<(), PoError> {
    if line.starts_with('"') {
        let value = unquote(line, ln)?;
        let field = pending
            .field
            .ok_or_else(|| PoError::new(ln, "string continuation without a keyword"))?;
        let e = &mut pending.entry;
        match field {
            Field::Ctxt => e.msgctxt.get_or_insert_with(String::new).push_str(&value),
            Field::Id => e.msgid.push_str(&value),
            Field::IdPlural => e.msgid_plural.get_or_insert_with(String::new).push_str(&value),
            Field::Str => e.msgstr.push_str(&value),
            Field::StrPlural(n) => e.msgstr_plural.entry(n).or_default().push_str(&value),
        }
        return Ok(());
    }

    let caps = keyword_re()
        .captures(line)
        .ok_or_else(|| PoError::new(ln, format!("unexpected line: {line}")))?;
    let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let index = caps.get(2).map(|m| m.as_str());
    let value = unquote(caps.get(3).map(|m| m.as_str()).unwrap_or(""), ln)?;

    if index.is_some() && keyword != "msgstr" {
        return Err(PoError::new(ln, format!("{keyword} does not take an index")));
    }

    match keyword {
        "msgctxt" | "msgid" => {
            if pending.has_msgid {
                finish(po, std::mem::take(pending))?;
            }
            if obsolete {
                pending.entry.obsolete = true;
            }
            if !pending.has_comments() && pending.entry.msgctxt.is_none() {
                pending.line = ln;
            }
            if keyword == "msgctxt" {
                pending.entry.msgctxt = Some(value);
                pending.field = Some(Field::Ctxt);
            } else {
                pending.entry.msgid = value;
                pending.has_msgid = true;
                pending.field = Some(Field::Id);
            }
        }
        "msgid_plural" => {
            if !pending.has_msgid {
                return Err(PoError::new(ln, "msgid_plural without msgid"));
            }
            pending.entry.msgid_plural = Some(value);
            pending.field = Some(Field::IdPlural);
        }
        _ => {
            if !pending.has_msgid {
                return Err(PoError::new(ln, "msgstr without msgid"));
            }
            pending.has_msgstr = true;
            match index {
                None => {
                    pending.entry.msgstr = value;
                    pending.field = Some(Field::Str);
                }
                Some(raw) => {
                    let n: usize = raw
                        .trim()
                        .parse()
                        .map_err(|_| PoError::new(ln, format!("invalid plural index: {raw}")))?;
                    pending.entry.msgstr_plural.insert(n, value);
                    pending.field = Some(Field::StrPlural(n));
                }
            }
        }
    }

    Ok(())
}

fn finish(po: &mut PoFile, pending: Pending) -> Result<(), PoError> {
    if !pending.has_msgstr {
        return Err(PoError::new(pending.line, "entry has no msgstr"));
    }

    let mut entry = pending.entry;
    if entry.msgid_plural.is_some() && entry.msgstr_plural.is_empty() {
        let msgstr = std::mem::take(&mut entry.msgstr);
        entry.msgstr_plural.insert(0, msgstr);
    }

    let is_header = entry.msgid.is_empty()
        && entry.msgctxt.is_none()
        && !entry.obsolete
        && po.entries.is_empty()
        && po.metadata.is_empty();

    if is_header {
        po.header = pending
            .raw_comments
            .into_iter()
            .filter(|c| !c.starts_with("#,"))
            .collect();
        po.header_flags = entry.flags;
        for line in entry.msgstr.lines() {
            if let Some((k, v)) = line.split_once(':') {
                po.metadata
                    .insert(k.trim().to_string(), v.trim_start().to_string());
            }
        }
        return Ok(());
    }

    po.entries.push(entry);
    Ok(())
}

fn unquote(s: &str, ln: usize) -> Result<String, PoError> {
    let s = s.trim();
    let inner = s
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|_| s.len() >= 2)
        .ok_or_else(|| PoError::new(ln, "unterminated string"))?;

    let mut result = String::with_capacity(inner.len());
    // Numeric escapes name raw bytes; consecutive ones may spell one UTF-8 character.
    let mut bytes: Vec<(u8, String)> = Vec::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let decoded = match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('a') => '\u{7}',
                Some('b') => '\u{8}',
                Some('f') => '\u{c}',
                Some('v') => '\u{b}',
                Some('"') => '"',
                Some('\\') => '\\',
                Some(d @ '0'..='7') => {
                    let mut digits = String::from(d);
                    while digits.len() < 3 {
                        match chars.peek() {
                            Some(&n @ '0'..='7') => {
                                digits.push(n);
                                chars.next();
                            }
                            _ => break,
                        }
                    }
                    push_byte(&mut result, &mut bytes, &digits, 8, "\\");
                    continue;
                }
                Some('x') => {
                    let mut digits = String::new();
                    while let Some(&h) = chars.peek().filter(|h| h.is_ascii_hexdigit()) {
                        digits.push(h);
                        chars.next();
                    }
                    push_byte(&mut result, &mut bytes, &digits, 16, "\\x");
                    continue;
                }
                Some(other) => {
                    flush_bytes(&mut result, &mut bytes);
                    result.push('\\');
                    other
                }
                None => return Err(PoError::new(ln, "unterminated string")),
            };
            flush_bytes(&mut result, &mut bytes);
            result.push(decoded);
        } else if c == '"' {
            return Err(PoError::new(ln, "unescaped quote inside string"));
        } else {
            flush_bytes(&mut result, &mut bytes);
            result.push(c);
        }
    }
    flush_bytes(&mut result, &mut bytes);
    Ok(result)
}

fn push_byte(out: &mut String, bytes: &mut Vec<(u8, String)>, digits: &str, radix: u32, lead: &str) {
    let written = format!("{lead}{digits}");
    match u8::from_str_radix(digits, radix) {
        Ok(b) => bytes.push((b, written)),
        Err(_) => {
            flush_bytes(out, bytes);
            out.push_str(&written);
        }
    }
}

/// Invalid UTF-8 stays as the escapes it was written with.
fn flush_bytes(out: &mut String, bytes: &mut Vec<(u8, String)>) {
    if bytes.is_empty() {
        return;
    }
    let raw: Vec<u8> = bytes.iter().map(|(b, _)| *b).collect();
    match String::from_utf8(raw) {
        Ok(text) => out.push_str(&text),
        Err(_) => bytes.iter().for_each(|(_, written)| out.push_str(written)),
    }
    bytes.clear();
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{b}' => out.push_str("\\v"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            _ => out.push(c),
        }
    }
    out
}

fn write_field(out: &mut String, prefix: &str, keyword: &str, value: &str) {
    let segments: Vec<&str> = value.split_inclusive('\n').collect();
    if segments.len() > 1 {
        let _ = writeln!(out, "{prefix}{keyword} \"\"");
        for seg in segments {
            let _ = writeln!(out, "{prefix}\"{}\"", escape(seg));
        }
    } else {
        let _ = writeln!(out, "{prefix}{keyword} \"{}\"", escape(value));
    }
}

/// Serialized form of a single entry, used for editor queries too.
pub fn entry_to_string(e: &Entry) -> String {
    let mut out = String::new();

    for c in &e.tcomment {
        if c.is_empty() {
            out.push_str("#\n");
        } else {
            let _ = writeln!(out, "# {c}");
        }
    }
    for c in &e.comment {
        let _ = writeln!(out, "#. {c}");
    }
    for o in &e.occurrences {
        let _ = writeln!(out, "#: {o}");
    }
    if !e.flags.is_empty() {
        let _ = writeln!(out, "#, {}", e.flags.join(", "));
    }
    let prefix = if e.obsolete { "#~ " } else { "" };
    for p in &e.previous {
        let _ = writeln!(out, "{}| {p}", if e.obsolete { "#~" } else { "#" });
    }

    if let Some(ctxt) = &e.msgctxt {
        write_field(&mut out, prefix, "msgctxt", ctxt);
    }
    write_field(&mut out, prefix, "msgid", &e.msgid);
    if let Some(plural) = &e.msgid_plural {
        write_field(&mut out, prefix, "msgid_plural", plural);
        for (n, s) in &e.msgstr_plural {
            write_field(&mut out, prefix, &format!("msgstr[{n}]"), s);
        }
        if e.msgstr_plural.is_empty() {
            write_field(&mut out, prefix, "msgstr[0]", "");
        }
    } else {
        write_field(&mut out, prefix, "msgstr", &e.msgstr);
    }

    out
}

impl fmt::Display for PoFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut blocks: Vec<String> = Vec::with_capacity(self.entries.len() + 1);

        if !self.header.is_empty() || !self.header_flags.is_empty() || !self.metadata.is_empty() {
            let mut out = String::new();
            for c in &self.header {
                let _ = writeln!(out, "{c}");
            }
            if !self.header_flags.is_empty() {
                let _ = writeln!(out, "#, {}", self.header_flags.join(", "));
            }
            out.push_str("msgid \"\"\nmsgstr \"\"\n");
            for (k, v) in &self.metadata {
                let _ = writeln!(out, "\"{}\"", escape(&format!("{k}: {v}\n")));
            }
            blocks.push(out);
        }

        for e in &self.entries {
            blocks.push(entry_to_string(e));
        }

        f.write_str(&blocks.join("\n"))
    }
}

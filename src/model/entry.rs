use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const FUZZY: &str = "fuzzy";

/// One message of a catalog body.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    #[serde(default)]
    pub msgctxt: Option<String>,

    #[serde(default)]
    pub msgid: String,

    #[serde(default)]
    pub msgid_plural: Option<String>,

    #[serde(default)]
    pub msgstr: String,

    #[serde(default)]
    pub msgstr_plural: BTreeMap<usize, String>,

    #[serde(default)]
    pub flags: Vec<String>,

    #[serde(default)]
    pub obsolete: bool,

    /// `#.` lines
    #[serde(default)]
    pub comment: Vec<String>,

    /// `# ` lines
    #[serde(default)]
    pub tcomment: Vec<String>,

    /// `#:` lines
    #[serde(default)]
    pub occurrences: Vec<String>,

    /// `#|` lines
    #[serde(default)]
    pub previous: Vec<String>,
}

/// Composite key identifying an entry inside one catalog body.
///
/// Absent plural ids and contexts are represented by the empty string, so an
/// entry without context and one with `msgctxt ""` share a key.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    #[serde(default)]
    pub msgid: String,

    #[serde(default)]
    pub msgid_plural: String,

    #[serde(default)]
    pub msgctxt: String,
}

impl EntryKey {
    pub fn new(msgid: impl Into<String>) -> Self {
        Self {
            msgid: msgid.into(),
            ..Self::default()
        }
    }

    pub fn with_plural(mut self, msgid_plural: impl Into<String>) -> Self {
        self.msgid_plural = msgid_plural.into();
        self
    }

    pub fn with_context(mut self, msgctxt: impl Into<String>) -> Self {
        self.msgctxt = msgctxt.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.msgid.is_empty()
    }
}

impl Entry {
    pub fn new(msgid: impl Into<String>, msgstr: impl Into<String>) -> Self {
        Self {
            msgid: msgid.into(),
            msgstr: msgstr.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey {
            msgid: self.msgid.clone(),
            msgid_plural: self.msgid_plural.clone().unwrap_or_default(),
            msgctxt: self.msgctxt.clone().unwrap_or_default(),
        }
    }

    pub fn matches(&self, key: &EntryKey) -> bool {
        self.msgid == key.msgid
            && self.msgid_plural.as_deref().unwrap_or("") == key.msgid_plural
            && self.msgctxt.as_deref().unwrap_or("") == key.msgctxt
    }

    pub fn is_plural(&self) -> bool {
        self.msgid_plural.is_some()
    }

    pub fn fuzzy(&self) -> bool {
        self.flags.iter().any(|f| f == FUZZY)
    }

    pub fn set_fuzzy(&mut self, fuzzy: bool) {
        if fuzzy && !self.fuzzy() {
            self.flags.insert(0, FUZZY.to_string());
        } else if !fuzzy {
            self.flags.retain(|f| f != FUZZY);
        }
    }

    /// Every form carries text.
    pub fn translated(&self) -> bool {
        if self.obsolete || self.fuzzy() {
            return false;
        }
        if self.is_plural() {
            !self.msgstr_plural.is_empty() && self.msgstr_plural.values().all(|s| !s.is_empty())
        } else {
            !self.msgstr.is_empty()
        }
    }
}

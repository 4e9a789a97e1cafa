//! Interactive editor: one filtered page of entries at a time, saved back
//! through the entry updater.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::catalog::Catalog;
use crate::model::entry::{Entry, EntryKey};
use crate::model::event::{Action, NewEvent};
use crate::model::project::Project;
use crate::parsers::po::{self, PoError, PoFile};
use crate::services::access::{self, AccessError, Caller};
use crate::services::store::{CatalogWrite, Repository, StoreError};
use crate::services::updater::{self, SubmittedUpdate, ENTRIES_PER_PAGE};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("catalog not found")]
    NotFound,

    #[error("stored catalog cannot be parsed: {0}")]
    Corrupt(#[from] PoError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlagFilter {
    #[default]
    All,
    Fuzzy,
    Untranslated,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    #[serde(default)]
    pub flags: FlagFilter,

    #[serde(default)]
    pub query: String,

    #[serde(default)]
    pub start: usize,
}

impl Filter {
    /// `path` plus the filter as query string.
    pub fn redirect_to(&self, path: &str) -> String {
        let mut params: Vec<(&str, String)> = Vec::new();
        match self.flags {
            FlagFilter::All => {}
            FlagFilter::Fuzzy => params.push(("flags", "fuzzy".into())),
            FlagFilter::Untranslated => params.push(("flags", "untranslated".into())),
        }
        if !self.query.is_empty() {
            params.push(("query", self.query.clone()));
        }
        if self.start > 0 {
            params.push(("start", self.start.to_string()));
        }

        match Url::parse_with_params("http://localhost/", &params) {
            Ok(url) => match url.query() {
                Some(q) if !q.is_empty() => format!("{path}?{q}"),
                _ => path.to_string(),
            },
            Err(_) => path.to_string(),
        }
    }

    fn accepts(&self, entry: &Entry, needle: &str) -> bool {
        let flag_ok = match self.flags {
            FlagFilter::All => true,
            FlagFilter::Fuzzy => entry.fuzzy(),
            FlagFilter::Untranslated => !entry.translated() && !entry.fuzzy() && !entry.obsolete,
        };
        flag_ok && (needle.is_empty() || casefold(&po::entry_to_string(entry)).contains(needle))
    }
}

/// Lowercasing plus the multi-letter folds of full Unicode case folding that
/// matter for catalog text (`ß` → `ss`, final sigma).
fn casefold(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .fold(String::with_capacity(s.len()), |mut out, c| {
            match c {
                'ß' => out.push_str("ss"),
                'ς' => out.push('σ'),
                'ŉ' => out.push_str("ʼn"),
                'ﬀ' => out.push_str("ff"),
                'ﬁ' => out.push_str("fi"),
                'ﬂ' => out.push_str("fl"),
                'ﬅ' | 'ﬆ' => out.push_str("st"),
                other => out.push(other),
            }
            out
        })
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Page {
    pub entries: Vec<Entry>,
    pub total: usize,
    pub start: usize,
    pub previous: Option<usize>,
    pub next: Option<usize>,
}

pub fn entries_page(po: &PoFile, filter: &Filter) -> Page {
    let needle = casefold(&filter.query);
    let matching: Vec<&Entry> = po
        .entries
        .iter()
        .filter(|e| filter.accepts(e, &needle))
        .collect();

    let entries: Vec<Entry> = matching
        .iter()
        .skip(filter.start)
        .take(ENTRIES_PER_PAGE)
        .map(|e| (*e).clone())
        .collect();

    let next = filter.start + ENTRIES_PER_PAGE;
    Page {
        total: matching.len(),
        start: filter.start,
        previous: filter.start.checked_sub(ENTRIES_PER_PAGE),
        next: (next < matching.len()).then_some(next),
        entries,
    }
}

fn plural_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^msgstr_(\d+):(\d+)$").expect("plural field pattern is valid"))
}

fn truthy(value: Option<&String>) -> bool {
    matches!(value.map(|v| v.trim()), Some("on" | "true" | "1" | "yes"))
}

/// Reads the indexed editor fields into one slot per page row.
pub fn parse_form(form: &HashMap<String, String>) -> Vec<Option<SubmittedUpdate>> {
    let mut slots: Vec<Option<SubmittedUpdate>> = (0..ENTRIES_PER_PAGE)
        .map(|i| {
            let msgid = form.get(&format!("msgid_{i}")).filter(|m| !m.is_empty())?;
            let key = EntryKey::new(msgid.as_str())
                .with_plural(form.get(&format!("msgid_plural_{i}")).cloned().unwrap_or_default())
                .with_context(form.get(&format!("msgctxt_{i}")).cloned().unwrap_or_default());
            Some(SubmittedUpdate {
                key,
                msgstr: form.get(&format!("msgstr_{i}")).cloned().unwrap_or_default(),
                msgstr_plural: Default::default(),
                fuzzy: truthy(form.get(&format!("fuzzy_{i}"))),
            })
        })
        .collect();

    for (name, value) in form {
        let Some(caps) = plural_field_re().captures(name) else {
            continue;
        };
        let (Ok(i), Ok(n)) = (caps[1].parse::<usize>(), caps[2].parse::<usize>()) else {
            continue;
        };
        if let Some(Some(update)) = slots.get_mut(i) {
            update.msgstr_plural.insert(n, value.clone());
        }
    }

    slots
}

pub fn catalog_path(project: &str, language_code: &str, domain: &str) -> String {
    format!("/project/{project}/catalog/{language_code}/{domain}/")
}

/// Resolves a catalog the caller may see in the editor.
pub fn open<R: Repository + ?Sized>(
    repo: &R,
    caller: &Caller,
    project: &str,
    language_code: &str,
    domain: &str,
) -> Result<(Project, Catalog), EditorError> {
    let user = access::require_user(caller)?;
    let project = access::visible_project(repo, user, project)?;
    let catalog = repo
        .catalog(project.id, language_code, domain)?
        .ok_or(EditorError::NotFound)?;
    Ok((project, catalog))
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "status", content = "count", rename_all = "snake_case")]
pub enum SaveStatus {
    Updated(usize),
    NoChanges,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub status: SaveStatus,
    pub skipped: usize,
    pub redirect: String,
}

impl SaveOutcome {
    pub fn message(&self) -> String {
        match self.status {
            SaveStatus::Updated(1) => "Successfully updated 1 message.".to_string(),
            SaveStatus::Updated(n) => format!("Successfully updated {n} messages."),
            SaveStatus::NoChanges => "No changes detected.".to_string(),
        }
    }
}

pub struct SaveRequest<'a> {
    pub project: &'a str,
    pub language_code: &'a str,
    pub domain: &'a str,
    pub filter: &'a Filter,
    pub form: &'a HashMap<String, String>,
    pub tool: &'a str,
    pub now: DateTime<FixedOffset>,
}

/// Applies one submitted page. Nothing is stamped, written or logged to the
/// audit trail unless at least one entry really changed.
pub fn save<R: Repository + ?Sized>(
    repo: &mut R,
    caller: &Caller,
    req: SaveRequest<'_>,
) -> Result<SaveOutcome, EditorError> {
    let (project, mut catalog) = open(repo, caller, req.project, req.language_code, req.domain)?;
    let user = access::require_user(caller)?;

    let mut po = catalog.po()?;
    let slots = parse_form(req.form);
    let report = updater::apply_updates(&mut po, &slots);

    let redirect = req
        .filter
        .redirect_to(&catalog_path(&project.slug, req.language_code, req.domain));

    if report.changed == 0 {
        tracing::info!(catalog = catalog.id, "editor save without changes");
        return Ok(SaveOutcome {
            status: SaveStatus::NoChanges,
            skipped: report.skipped,
            redirect,
        });
    }

    updater::stamp_metadata(
        &mut po,
        &updater::translator_identity(Some(user)),
        req.tool,
        &req.now,
    );
    catalog.set_po(&po);
    let audit = NewEvent {
        user_id: user.id,
        action: Action::Updated,
    };
    let saved = repo.commit_catalog(CatalogWrite::Update(catalog), audit)?.catalog;

    tracing::info!(catalog = saved.id, changed = report.changed, user = user.id, "editor saved catalog");

    Ok(SaveOutcome {
        status: SaveStatus::Updated(report.changed),
        skipped: report.skipped,
        redirect,
    })
}

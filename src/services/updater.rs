use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::model::entry::EntryKey;
use crate::model::user::User;
use crate::parsers::po::PoFile;
use crate::services::{matcher, normalize};

/// Entries shown and accepted per editor page.
pub const ENTRIES_PER_PAGE: usize = 20;

pub const REVISION_DATE_FORMAT: &str = "%Y-%m-%d %H:%M%z";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SubmittedUpdate {
    pub key: EntryKey,

    #[serde(default)]
    pub msgstr: String,

    #[serde(default)]
    pub msgstr_plural: BTreeMap<usize, String>,

    #[serde(default)]
    pub fuzzy: bool,
}

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub changed: usize,
    /// Submitted keys that no longer exist in the catalog.
    pub skipped: usize,
}

/// Applies one page of submitted translations to `po`.
///
/// The caller decides what to do with the report; nothing here touches
/// metadata or storage.
pub fn apply_updates(po: &mut PoFile, slots: &[Option<SubmittedUpdate>]) -> UpdateReport {
    let mut report = UpdateReport::default();

    for update in slots.iter().take(ENTRIES_PER_PAGE).flatten() {
        if update.key.is_empty() {
            continue;
        }

        let Some(entry) = matcher::find_entry_mut(&mut po.entries, &update.key) else {
            tracing::debug!(msgid = %update.key.msgid, "submitted key not in catalog, skipping");
            report.skipped += 1;
            continue;
        };

        let old = entry.clone();

        if let Some(plural) = entry.msgid_plural.clone() {
            let counts: Vec<usize> = entry.msgstr_plural.keys().copied().collect();
            for n in counts {
                let submitted = update.msgstr_plural.get(&n).map(String::as_str).unwrap_or("");
                entry
                    .msgstr_plural
                    .insert(n, normalize::fix_nls(&plural, submitted));
            }
        } else {
            entry.msgstr = normalize::fix_nls(&entry.msgid, &update.msgstr);
        }

        entry.set_fuzzy(update.fuzzy);

        if *entry != old {
            report.changed += 1;
        }
    }

    if report.skipped > 0 {
        tracing::info!(skipped = report.skipped, "ignored stale editor keys");
    }

    report
}

/// `"First Last <email>"` with placeholders for blank parts.
pub fn translator_identity(user: Option<&User>) -> String {
    let pick = |value: Option<&str>, fallback: &str| match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    };
    format!(
        "{} {} <{}>",
        pick(user.map(|u| u.first_name.as_str()), "Anonymous"),
        pick(user.map(|u| u.last_name.as_str()), "User"),
        pick(user.map(|u| u.email.as_str()), "anonymous@user.tld"),
    )
}

pub fn stamp_metadata<Tz>(po: &mut PoFile, translator: &str, tool: &str, now: &DateTime<Tz>)
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    po.metadata
        .insert("Last-Translator".to_string(), translator.to_string());
    po.metadata
        .insert("X-Translated-Using".to_string(), tool.to_string());
    po.metadata.insert(
        "PO-Revision-Date".to_string(),
        now.format(REVISION_DATE_FORMAT).to_string(),
    );
}

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::model::catalog::Catalog;
use crate::model::entry::{Entry, EntryKey};
use crate::parsers::po::PoError;

/// `(language_code, domain)`
pub type Column = (String, String);

/// Every key of every catalog, with the entry each (language, domain) pair
/// has for it. Keys keep first-seen order.
pub fn merge_catalogs(catalogs: &[Catalog]) -> Result<IndexMap<EntryKey, IndexMap<Column, Entry>>, PoError> {
    let mut messages: IndexMap<EntryKey, IndexMap<Column, Entry>> = IndexMap::new();

    for catalog in catalogs {
        let po = catalog.po()?;
        for entry in po.entries {
            messages
                .entry(entry.key())
                .or_default()
                .insert((catalog.language_code.clone(), catalog.domain.clone()), entry);
        }
    }

    Ok(messages)
}

pub fn messages_as_table(catalogs: &[Catalog]) -> Result<Vec<Vec<String>>, PoError> {
    let merged = merge_catalogs(catalogs)?;
    let columns: Vec<Column> = merged
        .values()
        .flat_map(|by_column| by_column.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut header: Vec<String> = ["msgctxt", "msgid", "msgid_plural", "comment", "tcomment", "flags"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(columns.iter().map(|(lang, domain)| format!("{lang}:{domain}")));

    let mut rows = vec![header];
    for by_column in merged.values() {
        let Some(any) = by_column.values().next() else {
            continue;
        };

        let mut row = vec![
            any.msgctxt.clone().unwrap_or_default(),
            any.msgid.clone(),
            any.msgid_plural.clone().unwrap_or_default(),
            any.comment.join("\n"),
            any.tcomment.join("\n"),
            any.flags.join(", "),
        ];
        for column in &columns {
            row.push(by_column.get(column).map(|e| e.msgstr.clone()).unwrap_or_default());
        }
        rows.push(row);
    }

    Ok(rows)
}

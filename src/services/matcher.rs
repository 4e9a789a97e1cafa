use crate::model::entry::{Entry, EntryKey};

/// Position of the first entry carrying `key`. Linear scan; catalogs are
/// small and no index is kept between requests.
pub fn find_entry(entries: &[Entry], key: &EntryKey) -> Option<usize> {
    if key.is_empty() {
        return None;
    }
    entries.iter().position(|e| e.matches(key))
}

pub fn find_entry_mut<'a>(entries: &'a mut [Entry], key: &EntryKey) -> Option<&'a mut Entry> {
    let idx = find_entry(entries, key)?;
    entries.get_mut(idx)
}

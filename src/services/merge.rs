//! Reconciles a pushed catalog with the stored one.
//!
//! Three outcomes: a missing catalog is created from the payload verbatim,
//! an explicit replace overwrites the body verbatim, and a plain write merges
//! entry by entry with the stored translations winning every key collision.
//!
//! The merge itself runs outside the store lock. A writer that read a row
//! another writer has since changed fails with a conflict when it commits,
//! so no write is silently lost.

use serde::Serialize;
use thiserror::Error;

use crate::model::catalog::{Catalog, NewCatalog};
use crate::model::event::{Action, NewEvent};
use crate::model::project::Project;
use crate::model::user::User;
use crate::parsers::po::{self, PoError, PoFile};
use crate::services::store::{CatalogWrite, Repository, StoreError};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("payload is not a valid catalog: {0}")]
    Unparseable(PoError),

    #[error("stored catalog {id} cannot be parsed: {source}")]
    Corrupt { id: u64, source: PoError },

    #[error("catalog not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Replaced,
}

impl Outcome {
    pub fn action(self) -> Action {
        match self {
            Outcome::Created => Action::Created,
            Outcome::Updated => Action::Updated,
            Outcome::Replaced => Action::Replaced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Incremental merge into an existing catalog.
    Merge,
    /// Overwrite whatever is stored.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pushed {
    pub catalog: Catalog,
    pub outcome: Outcome,
}

/// Folds `incoming` into `existing`. Keys already present keep their stored
/// state, new keys are appended in incoming order. Returns how many entries
/// were added.
pub fn merge_po(existing: &mut PoFile, incoming: PoFile) -> usize {
    for (k, v) in incoming.metadata {
        existing.metadata.entry(k).or_insert(v);
    }

    let mut added = 0usize;
    for entry in incoming.entries {
        let key = entry.key();
        if existing.entries.iter().any(|e| e.matches(&key)) {
            continue;
        }
        existing.entries.push(entry);
        added += 1;
    }
    added
}

/// The body a push produces, without touching storage.
pub fn plan(
    existing: Option<&Catalog>,
    strategy: Strategy,
    payload: &str,
    incoming: PoFile,
) -> Result<(String, Outcome), MergeError> {
    let Some(current) = existing else {
        return Ok((payload.to_string(), Outcome::Created));
    };

    match strategy {
        Strategy::Replace => Ok((payload.to_string(), Outcome::Replaced)),
        Strategy::Merge => {
            let mut po = current.po().map_err(|source| MergeError::Corrupt {
                id: current.id,
                source,
            })?;
            let added = merge_po(&mut po, incoming);
            tracing::debug!(catalog = current.id, added, "merged incoming entries");
            Ok((po.to_string(), Outcome::Updated))
        }
    }
}

/// Parses `payload` completely, then creates, replaces or merges the target
/// catalog and records one audit event.
pub fn push<R: Repository + ?Sized>(
    repo: &mut R,
    user: &User,
    project: &Project,
    language_code: &str,
    domain: &str,
    strategy: Strategy,
    payload: &str,
) -> Result<Pushed, MergeError> {
    let incoming = po::parse(payload).map_err(MergeError::Unparseable)?;

    let existing = repo.catalog(project.id, language_code, domain)?;
    let (body, outcome) = plan(existing.as_ref(), strategy, payload, incoming)?;

    let write = match existing {
        None => CatalogWrite::Insert(NewCatalog {
            project_id: project.id,
            language_code: language_code.to_string(),
            domain: domain.to_string(),
            pofile: body,
        }),
        Some(mut current) => {
            current.pofile = body;
            CatalogWrite::Update(current)
        }
    };
    let audit = NewEvent {
        user_id: user.id,
        action: outcome.action(),
    };
    let catalog = repo.commit_catalog(write, audit)?.catalog;

    tracing::info!(
        project = %project.slug,
        language_code,
        domain,
        outcome = outcome.action().as_str(),
        user = user.id,
        "catalog pushed"
    );

    Ok(Pushed { catalog, outcome })
}

/// Removes the catalog row together with its `deleted` event.
pub fn delete<R: Repository + ?Sized>(
    repo: &mut R,
    user: &User,
    project: &Project,
    language_code: &str,
    domain: &str,
) -> Result<(), MergeError> {
    let catalog = repo
        .catalog(project.id, language_code, domain)?
        .ok_or(MergeError::NotFound)?;

    let audit = NewEvent {
        user_id: user.id,
        action: Action::Deleted,
    };
    match repo.commit_catalog(CatalogWrite::Delete(catalog), audit) {
        Ok(_) => {}
        Err(StoreError::Missing(_)) => return Err(MergeError::NotFound),
        Err(e) => return Err(e.into()),
    }

    tracing::info!(project = %project.slug, language_code, domain, user = user.id, "catalog deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::FileStore;

    const EXISTING: &str = "msgid \"K\"\nmsgstr \"A\"\n\nmsgid \"server only\"\nmsgstr \"S\"\n";
    const INCOMING: &str = "msgid \"K\"\nmsgstr \"B\"\n\nmsgid \"K2\"\nmsgstr \"new\"\n";

    fn setup() -> (FileStore, User, Project) {
        let mut store = FileStore::in_memory();
        let user = store
            .add_user(User { id: 1, email: "t@example.com".into(), ..Default::default() })
            .unwrap();
        let project = store
            .add_project(Project { id: 1, slug: "demo".into(), users: vec![1], ..Default::default() })
            .unwrap();
        (store, user, project)
    }

    #[test]
    fn missing_catalog_is_created_verbatim() {
        let (mut store, user, project) = setup();
        let pushed = push(&mut store, &user, &project, "fr", "djangojs", Strategy::Merge, INCOMING).unwrap();

        assert_eq!(pushed.outcome, Outcome::Created);
        assert_eq!(pushed.catalog.pofile, INCOMING);
        let events = store.events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, Action::Created);
    }

    #[test]
    fn merge_keeps_existing_translations_and_adds_new_keys() {
        let (mut store, user, project) = setup();
        push(&mut store, &user, &project, "fr", "django", Strategy::Merge, EXISTING).unwrap();

        let pushed = push(&mut store, &user, &project, "fr", "django", Strategy::Merge, INCOMING).unwrap();
        assert_eq!(pushed.outcome, Outcome::Updated);

        let po = pushed.catalog.po().unwrap();
        let texts: Vec<(&str, &str)> = po
            .entries
            .iter()
            .map(|e| (e.msgid.as_str(), e.msgstr.as_str()))
            .collect();
        assert_eq!(texts, vec![("K", "A"), ("server only", "S"), ("K2", "new")]);
    }

    #[test]
    fn replace_discards_server_translations() {
        let (mut store, user, project) = setup();
        push(&mut store, &user, &project, "fr", "django", Strategy::Merge, EXISTING).unwrap();

        let pushed = push(&mut store, &user, &project, "fr", "django", Strategy::Replace, INCOMING).unwrap();
        assert_eq!(pushed.outcome, Outcome::Replaced);
        assert_eq!(pushed.catalog.pofile, INCOMING);

        let actions: Vec<Action> = store.events().unwrap().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![Action::Created, Action::Replaced]);
    }

    #[test]
    fn unparseable_payload_writes_nothing() {
        let (mut store, user, project) = setup();
        let err = push(&mut store, &user, &project, "fr", "django", Strategy::Merge, "garbage").unwrap_err();

        assert!(matches!(err, MergeError::Unparseable(_)));
        assert!(store.catalog(1, "fr", "django").unwrap().is_none());
        assert!(store.events().unwrap().is_empty());
    }

    #[test]
    fn pushing_the_same_payload_twice_keeps_its_content() {
        let (mut store, user, project) = setup();
        push(&mut store, &user, &project, "fr", "django", Strategy::Merge, INCOMING).unwrap();
        let second = push(&mut store, &user, &project, "fr", "django", Strategy::Merge, INCOMING).unwrap();

        assert_eq!(second.catalog.po().unwrap(), po::parse(INCOMING).unwrap());
    }

    #[test]
    fn metadata_merges_with_existing_values_winning() {
        let mut existing = po::parse("msgid \"\"\nmsgstr \"\"\n\"Language: fr\\n\"\n").unwrap();
        let incoming =
            po::parse("msgid \"\"\nmsgstr \"\"\n\"Language: de\\n\"\n\"Project-Id-Version: x\\n\"\n").unwrap();

        merge_po(&mut existing, incoming);
        assert_eq!(existing.metadata["Language"], "fr");
        assert_eq!(existing.metadata["Project-Id-Version"], "x");
    }

    #[test]
    fn delete_twice_reports_not_found_the_second_time() {
        let (mut store, user, project) = setup();
        push(&mut store, &user, &project, "fr", "django", Strategy::Merge, EXISTING).unwrap();

        assert!(delete(&mut store, &user, &project, "fr", "django").is_ok());
        assert!(matches!(
            delete(&mut store, &user, &project, "fr", "django"),
            Err(MergeError::NotFound)
        ));
        let events = store.events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].action, Action::Deleted);
        assert_eq!(events[1].body_digest, crate::services::digest::body_digest(EXISTING));
    }
}

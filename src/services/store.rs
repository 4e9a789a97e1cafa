use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::catalog::{Catalog, NewCatalog};
use crate::model::event::{Event, NewEvent};
use crate::model::project::Project;
use crate::model::user::User;
use crate::services::{digest, token};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("catalog {language_code}/{domain} already exists in project {project_id}")]
    Duplicate {
        project_id: u64,
        language_code: String,
        domain: String,
    },

    #[error("catalog {0} changed since it was read")]
    Conflict(u64),

    #[error("catalog {0} does not exist")]
    Missing(u64),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is invalid: {0}")]
    Format(#[from] serde_json::Error),
}

/// A change to one catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogWrite {
    /// Fails with [`StoreError::Duplicate`] if the tuple is taken.
    Insert(NewCatalog),
    /// Fails with [`StoreError::Conflict`] unless the stored revision still
    /// equals the row's.
    Update(Catalog),
    /// Fails with [`StoreError::Missing`] if the row is already gone.
    Delete(Catalog),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// The row as written, or as it was before a delete.
    pub catalog: Catalog,
    pub event: Event,
}

/// Persistence seam for everything the sync and editor paths touch.
pub trait Repository {
    fn user(&self, id: u64) -> Result<Option<User>, StoreError>;

    fn user_by_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    fn save_user(&mut self, user: &User) -> Result<(), StoreError>;

    fn projects(&self) -> Result<Vec<Project>, StoreError>;

    fn project_by_slug(&self, slug: &str) -> Result<Option<Project>, StoreError>;

    fn project_catalogs(&self, project_id: u64) -> Result<Vec<Catalog>, StoreError>;

    fn catalog(
        &self,
        project_id: u64,
        language_code: &str,
        domain: &str,
    ) -> Result<Option<Catalog>, StoreError>;

    /// Applies `write` and records its audit event as one step: either both
    /// are stored or neither is.
    fn commit_catalog(&mut self, write: CatalogWrite, audit: NewEvent) -> Result<Committed, StoreError>;
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
struct State {
    #[serde(default)]
    users: Vec<User>,

    #[serde(default)]
    projects: Vec<Project>,

    #[serde(default)]
    catalogs: Vec<Catalog>,

    #[serde(default)]
    events: Vec<Event>,

    #[serde(default)]
    next_catalog_id: u64,

    #[serde(default)]
    next_event_id: u64,
}

impl State {
    fn find_catalog(&self, project_id: u64, language_code: &str, domain: &str) -> Option<&Catalog> {
        self.catalogs.iter().find(|c| {
            c.project_id == project_id && c.language_code == language_code && c.domain == domain
        })
    }

    fn insert_catalog(&mut self, new: NewCatalog) -> Result<Catalog, StoreError> {
        if self
            .find_catalog(new.project_id, &new.language_code, &new.domain)
            .is_some()
        {
            return Err(StoreError::Duplicate {
                project_id: new.project_id,
                language_code: new.language_code,
                domain: new.domain,
            });
        }

        self.next_catalog_id += 1;
        let catalog = Catalog {
            id: self.next_catalog_id,
            project_id: new.project_id,
            language_code: new.language_code,
            domain: new.domain,
            pofile: new.pofile,
            revision: 1,
        };
        self.catalogs.push(catalog.clone());
        Ok(catalog)
    }

    fn update_catalog(&mut self, catalog: &Catalog) -> Result<Catalog, StoreError> {
        let stored = self
            .catalogs
            .iter_mut()
            .find(|c| c.id == catalog.id)
            .ok_or(StoreError::Missing(catalog.id))?;

        if stored.revision != catalog.revision {
            return Err(StoreError::Conflict(catalog.id));
        }

        stored.pofile = catalog.pofile.clone();
        stored.revision += 1;
        Ok(stored.clone())
    }

    fn remove_catalog(&mut self, id: u64) -> Result<Catalog, StoreError> {
        let pos = self
            .catalogs
            .iter()
            .position(|c| c.id == id)
            .ok_or(StoreError::Missing(id))?;
        Ok(self.catalogs.remove(pos))
    }

    fn push_event(&mut self, audit: NewEvent, catalog: &Catalog) -> Event {
        self.next_event_id += 1;
        let event = Event {
            id: self.next_event_id,
            created_at: chrono::Local::now().to_rfc3339(),
            user_id: audit.user_id,
            action: audit.action,
            catalog: catalog.reference(),
            body_digest: digest::body_digest(&catalog.pofile),
        };
        self.events.push(event.clone());
        event
    }
}

#[derive(Debug)]
enum Backing {
    Memory(State),
    /// Every call reads the file; writes hold an exclusive lock from reload
    /// to rename, so several processes can share one store.
    File(PathBuf),
}

/// JSON-file backed repository. Without a path it only lives in memory.
#[derive(Debug)]
pub struct FileStore {
    backing: Backing,
}

impl Default for FileStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl FileStore {
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(State::default()),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut store = Self {
            backing: Backing::File(path.into()),
        };

        let missing = store.read(|s| s.users.iter().any(|u| u.token.is_empty()))?;
        if missing {
            store.write(|s| {
                for u in s.users.iter_mut() {
                    ensure_token(u);
                }
                Ok(())
            })?;
            tracing::info!("generated missing user tokens");
        }

        Ok(store)
    }

    /// Adds or replaces a user; an empty token is generated.
    pub fn add_user(&mut self, mut user: User) -> Result<User, StoreError> {
        ensure_token(&mut user);
        let row = user.clone();
        self.write(move |s| {
            s.users.retain(|u| u.id != row.id);
            s.users.push(row);
            Ok(())
        })?;
        Ok(user)
    }

    pub fn add_project(&mut self, project: Project) -> Result<Project, StoreError> {
        let row = project.clone();
        self.write(move |s| {
            s.projects.retain(|p| p.id != row.id);
            s.projects.push(row);
            Ok(())
        })?;
        Ok(project)
    }

    /// Seeds a catalog without an audit event.
    pub fn add_catalog(&mut self, new: NewCatalog) -> Result<Catalog, StoreError> {
        self.write(|s| s.insert_catalog(new))
    }

    pub fn events(&self) -> Result<Vec<Event>, StoreError> {
        self.read(|s| s.events.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        match &self.backing {
            Backing::Memory(state) => Ok(f(state)),
            Backing::File(path) => Ok(f(&load(path)?)),
        }
    }

    /// Runs `f` on a copy of the current state and keeps the copy only once
    /// it is stored. A failed write leaves no trace.
    fn write<T>(&mut self, f: impl FnOnce(&mut State) -> Result<T, StoreError>) -> Result<T, StoreError> {
        match &mut self.backing {
            Backing::Memory(state) => {
                let mut next = state.clone();
                let out = f(&mut next)?;
                *state = next;
                Ok(out)
            }
            Backing::File(path) => {
                let _lock = lock_exclusive(path)?;
                let mut next = load(path)?;
                let out = f(&mut next)?;
                let json = serde_json::to_string_pretty(&next)?;
                write_atomic(path, json.as_bytes())?;
                Ok(out)
            }
        }
    }
}

fn ensure_token(user: &mut User) -> bool {
    if user.token.is_empty() {
        user.token = token::generate(user.id);
        return true;
    }
    false
}

impl Repository for FileStore {
    fn user(&self, id: u64) -> Result<Option<User>, StoreError> {
        self.read(|s| s.users.iter().find(|u| u.id == id).cloned())
    }

    fn user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        if token.is_empty() {
            return Ok(None);
        }
        self.read(|s| s.users.iter().find(|u| u.token == token).cloned())
    }

    fn save_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.add_user(user.clone()).map(|_| ())
    }

    fn projects(&self) -> Result<Vec<Project>, StoreError> {
        self.read(|s| s.projects.clone())
    }

    fn project_by_slug(&self, slug: &str) -> Result<Option<Project>, StoreError> {
        self.read(|s| s.projects.iter().find(|p| p.slug == slug).cloned())
    }

    fn project_catalogs(&self, project_id: u64) -> Result<Vec<Catalog>, StoreError> {
        self.read(|s| {
            let mut out: Vec<Catalog> = s
                .catalogs
                .iter()
                .filter(|c| c.project_id == project_id)
                .cloned()
                .collect();
            out.sort_by(|a, b| {
                (a.language_code.as_str(), a.domain.as_str())
                    .cmp(&(b.language_code.as_str(), b.domain.as_str()))
            });
            out
        })
    }

    fn catalog(
        &self,
        project_id: u64,
        language_code: &str,
        domain: &str,
    ) -> Result<Option<Catalog>, StoreError> {
        self.read(|s| s.find_catalog(project_id, language_code, domain).cloned())
    }

    fn commit_catalog(&mut self, write: CatalogWrite, audit: NewEvent) -> Result<Committed, StoreError> {
        self.write(|s| {
            let catalog = match write {
                CatalogWrite::Insert(new) => s.insert_catalog(new)?,
                CatalogWrite::Update(catalog) => s.update_catalog(&catalog)?,
                CatalogWrite::Delete(catalog) => s.remove_catalog(catalog.id)?,
            };
            let event = s.push_event(audit, &catalog);
            Ok(Committed { catalog, event })
        })
    }
}

fn load(path: &Path) -> Result<State, StoreError> {
    if !path.exists() {
        return Ok(State::default());
    }
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Held until the returned file is dropped. Readers need no lock since the
/// store file is only ever replaced by rename.
fn lock_exclusive(path: &Path) -> std::io::Result<File> {
    let lock = sidecar(path, "lock");
    if let Some(parent) = lock.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock)?;
    file.lock()?;
    Ok(file)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = sidecar(path, "tmp");

    if let Some(parent) = tmp.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;

    Ok(())
}

fn sidecar(path: &Path, ext: &str) -> PathBuf {
    let mut p = path.to_path_buf();
    let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(n) => n.to_string(),
        None => "store".to_string(),
    };
    p.set_file_name(format!("{file_name}.{ext}"));
    p
}

//! Command-line side of catalog sync: finds local `.po` files and pushes or
//! pulls them against a configured project.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::model::project::Project;

mod remote;

pub use remote::{Remote, SyncAction};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Config file {0} doesn't exist.")]
    ConfigMissing(PathBuf),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Couldn't find a project for the current working directory {0}")]
    NoProject(String),

    #[error("{0} is not inside a <language>/LC_MESSAGES/<domain>.po layout")]
    BadLayout(PathBuf),

    #[error("invalid project url {0}: {1}")]
    Url(String, String),

    #[error("failed to walk {0}: {1}")]
    Walk(PathBuf, #[source] walkdir::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Non-success answer; the body is the server's message.
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub path: String,

    pub url: String,

    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default)]
    pub project: Vec<ProjectConfig>,
}

impl ClientConfig {
    /// `~/.config/traduire.toml`
    pub fn default_path() -> PathBuf {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("traduire.toml")
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClientError::ConfigMissing(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// One `[[project]]` table per project, all sharing `token`. The `path`
    /// is a placeholder for the local checkout.
    pub fn for_projects(base_url: &str, token: &str, projects: &[Project]) -> Result<Self, ClientError> {
        let invalid = |e: &dyn std::fmt::Display| ClientError::Url(base_url.to_string(), e.to_string());
        let base = Url::parse(base_url).map_err(|e| invalid(&e))?;

        let project = projects
            .iter()
            .map(|p| {
                let url = base
                    .join(&format!("api/pofile/{}/", p.slug))
                    .map_err(|e| invalid(&e))?;
                Ok(ProjectConfig {
                    path: format!("/path/to/{}", p.slug),
                    url: url.to_string(),
                    token: token.to_string(),
                })
            })
            .collect::<Result<_, ClientError>>()?;
        Ok(Self { project })
    }

    pub fn to_toml(&self) -> Result<String, ClientError> {
        Ok(toml::to_string(self)?)
    }

    /// The project whose `path` is `cwd`, ignoring trailing slashes.
    pub fn current_project(&self, cwd: &Path) -> Result<&ProjectConfig, ClientError> {
        let cwd = cwd.to_string_lossy();
        let cwd = cwd.trim_end_matches('/');
        self.project
            .iter()
            .find(|p| p.path.trim_end_matches('/') == cwd)
            .ok_or_else(|| ClientError::NoProject(cwd.to_string()))
    }
}

/// Every `*.po` file below `root`, in a stable order.
pub fn find_pofiles(root: &Path) -> Result<Vec<PathBuf>, ClientError> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => {
                let path = entry.path();
                let is_po = path.extension().is_some_and(|ext| ext == "po");
                (entry.file_type().is_file() && is_po).then(|| Ok(path.to_path_buf()))
            }
            Err(e) => Some(Err(ClientError::Walk(root.to_path_buf(), e))),
        })
        .collect::<Result<_, _>>()?;
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub language_code: String,
    pub domain: String,
}

/// `.../<language>/LC_MESSAGES/<domain>.po`
pub fn target_from_path(path: &Path) -> Result<Target, ClientError> {
    let bad = || ClientError::BadLayout(path.to_path_buf());

    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if parts.len() < 3 {
        return Err(bad());
    }
    let domain = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(bad)?;

    Ok(Target {
        language_code: parts[parts.len() - 3].to_string(),
        domain: domain.to_string(),
    })
}

pub fn url_for(project_url: &str, target: &Target) -> Result<Url, ClientError> {
    Url::parse(project_url)
        .and_then(|base| base.join(&format!("{}/{}/", target.language_code, target.domain)))
        .map_err(|e| ClientError::Url(project_url.to_string(), e.to_string()))
}

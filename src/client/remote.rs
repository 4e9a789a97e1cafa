use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};

use super::{find_pofiles, target_from_path, url_for, ClientError, ProjectConfig};
use crate::config::CLI_API;
use crate::protocol::sync::{TOKEN_HEADER, VERSION_HEADER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Get,
    Submit,
    Replace,
}

impl SyncAction {
    fn done(self, path: &Path) -> String {
        match self {
            SyncAction::Get => format!("Updated {}", path.display()),
            SyncAction::Submit => format!("Submitted {} to the server for translation", path.display()),
            SyncAction::Replace => format!("Replaced {} on the server", path.display()),
        }
    }
}

/// A configured project on the server.
pub struct Remote {
    client: Client,
    project: ProjectConfig,
}

impl Remote {
    pub fn new(project: ProjectConfig) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, project })
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(TOKEN_HEADER, &self.project.token)
            .header(VERSION_HEADER, CLI_API)
    }

    /// Runs `action` for every catalog below `folder`, stopping at the first
    /// rejection. Returns one line per file handled.
    pub fn run(&self, action: SyncAction, folder: &Path) -> Result<Vec<String>, ClientError> {
        let mut done = Vec::new();
        for path in find_pofiles(folder)? {
            self.sync_file(action, &path)?;
            tracing::info!(file = %path.display(), ?action, "catalog synced");
            done.push(action.done(&path));
        }
        Ok(done)
    }

    fn sync_file(&self, action: SyncAction, path: &Path) -> Result<(), ClientError> {
        let url = url_for(&self.project.url, &target_from_path(path)?)?;

        let req = match action {
            SyncAction::Get => self.client.get(url),
            SyncAction::Submit => self.client.post(url).body(fs::read(path)?),
            SyncAction::Replace => self.client.put(url).body(fs::read(path)?),
        };
        let resp = self.authorized(req).send()?;

        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(ClientError::Rejected(body));
        }
        if action == SyncAction::Get {
            fs::write(path, body)?;
        }
        Ok(())
    }
}

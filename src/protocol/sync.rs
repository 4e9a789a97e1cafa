//! Catalog sync endpoint used by the command-line client.
//!
//! Checks run in a fixed order: protocol version, token, method, project
//! scope, then the catalog itself. Every failure is decided before the first
//! write.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServerConfig;
use crate::services::access::{self, AccessError};
use crate::services::digest;
use crate::services::encoding::{self, DecodeError};
use crate::services::merge::{self, MergeError, Outcome, Strategy};
use crate::services::store::{Repository, StoreError};

pub const VERSION_HEADER: &str = "x-cli-version";
pub const TOKEN_HEADER: &str = "x-token";
pub const DIGEST_HEADER: &str = "x-catalog-digest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Read,
    /// `POST`: create or incremental merge.
    Write,
    /// `PUT`: create or full replace.
    Replace,
    /// `DELETE`
    Delete,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Read),
            "POST" => Some(Method::Write),
            "PUT" => Some(Method::Replace),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u16")]
pub enum Status {
    Ok,
    Accepted,
    NoContent,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    Conflict,
    InternalError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Accepted => 202,
            Status::NoContent => 204,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::Conflict => 409,
            Status::InternalError => 500,
        }
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s.code()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncRequest {
    pub method: String,

    pub project: String,

    pub language_code: String,

    #[serde(default = "default_domain")]
    pub domain: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(skip)]
    pub body: Vec<u8>,
}

fn default_domain() -> String {
    "django".to_string()
}

impl SyncRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SyncResponse {
    pub status: Status,

    pub body: String,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl SyncResponse {
    fn new(status: Status, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HashMap::new(),
            outcome: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{}", version_message(.received.as_deref(), .expected))]
    ProtocolMismatch {
        received: Option<String>,
        expected: String,
    },

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("catalog changed while this request was processed, retry")]
    Conflict,

    #[error("internal error: {0}")]
    Internal(String),
}

fn version_message(received: Option<&str>, expected: &str) -> String {
    match received {
        Some(v) => format!("unsupported CLI version {v:?}, the server speaks {expected:?}"),
        None => format!("missing {VERSION_HEADER} header, the server speaks {expected:?}"),
    }
}

impl SyncError {
    pub fn status(&self) -> Status {
        match self {
            SyncError::ProtocolMismatch { .. } | SyncError::BadRequest(_) => Status::BadRequest,
            SyncError::Forbidden => Status::Forbidden,
            SyncError::NotFound => Status::NotFound,
            SyncError::MethodNotAllowed(_) => Status::MethodNotAllowed,
            SyncError::Conflict => Status::Conflict,
            SyncError::Internal(_) => Status::InternalError,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) | StoreError::Duplicate { .. } => SyncError::Conflict,
            other => SyncError::Internal(other.to_string()),
        }
    }
}

impl From<AccessError> for SyncError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Forbidden => SyncError::Forbidden,
            AccessError::NotFound => SyncError::NotFound,
            AccessError::Store(e) => e.into(),
        }
    }
}

impl From<MergeError> for SyncError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::Unparseable(e) => SyncError::BadRequest(format!("invalid catalog: {e}")),
            MergeError::NotFound => SyncError::NotFound,
            MergeError::Corrupt { .. } => SyncError::Internal(err.to_string()),
            MergeError::Store(e) => e.into(),
        }
    }
}

impl From<DecodeError> for SyncError {
    fn from(err: DecodeError) -> Self {
        SyncError::BadRequest(err.to_string())
    }
}

/// Rejects a request whose declared version is not exactly `expected`.
pub fn check_version(received: Option<&str>, expected: &str) -> Result<(), SyncError> {
    match received {
        Some(v) if v == expected => Ok(()),
        other => Err(SyncError::ProtocolMismatch {
            received: other.map(str::to_string),
            expected: expected.to_string(),
        }),
    }
}

pub fn handle<R: Repository + ?Sized>(repo: &mut R, cfg: &ServerConfig, req: &SyncRequest) -> SyncResponse {
    match process(repo, cfg, req) {
        Ok(resp) => resp,
        Err(err) => {
            let status = err.status();
            if status == Status::InternalError {
                tracing::error!(error = %err, project = %req.project, "sync request failed");
            } else {
                tracing::warn!(
                    status = status.code(),
                    error = %err,
                    project = %req.project,
                    language_code = %req.language_code,
                    domain = %req.domain,
                    "sync request rejected"
                );
            }
            SyncResponse::new(status, err.to_string())
        }
    }
}

fn process<R: Repository + ?Sized>(
    repo: &mut R,
    cfg: &ServerConfig,
    req: &SyncRequest,
) -> Result<SyncResponse, SyncError> {
    check_version(req.header(VERSION_HEADER), &cfg.cli_api)?;

    let caller = access::resolve_token(repo, req.header(TOKEN_HEADER))?;
    let user = access::require_user(&caller)?;

    let method =
        Method::parse(&req.method).ok_or_else(|| SyncError::MethodNotAllowed(req.method.clone()))?;

    let project = access::visible_project(repo, user, &req.project)?;

    match method {
        Method::Read => {
            let catalog = repo
                .catalog(project.id, &req.language_code, &req.domain)?
                .ok_or(SyncError::NotFound)?;
            let mut resp = SyncResponse::new(Status::Ok, catalog.pofile.clone());
            resp.headers
                .insert(DIGEST_HEADER.to_string(), digest::body_digest(&catalog.pofile));
            Ok(resp)
        }
        Method::Write | Method::Replace => {
            let strategy = if method == Method::Replace {
                Strategy::Replace
            } else {
                Strategy::Merge
            };
            let decoded = encoding::decode_payload(&req.body)?;
            let pushed = merge::push(
                repo,
                user,
                &project,
                &req.language_code,
                &req.domain,
                strategy,
                &decoded.text,
            )?;

            let mut resp = SyncResponse::new(Status::Accepted, pushed.outcome.action().as_str());
            resp.outcome = Some(pushed.outcome);
            resp.headers
                .insert(DIGEST_HEADER.to_string(), digest::body_digest(&pushed.catalog.pofile));
            Ok(resp)
        }
        Method::Delete => {
            merge::delete(repo, user, &project, &req.language_code, &req.domain)?;
            Ok(SyncResponse::new(Status::NoContent, ""))
        }
    }
}

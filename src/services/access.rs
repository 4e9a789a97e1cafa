use thiserror::Error;

use crate::model::project::Project;
use crate::model::user::User;
use crate::services::store::{Repository, StoreError};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    /// Interactive editor user.
    Session(User),
    /// CLI caller identified by its token.
    Token(User),
}

impl Caller {
    pub fn user(&self) -> Option<&User> {
        match self {
            Caller::Anonymous => None,
            Caller::Session(u) | Caller::Token(u) => Some(u),
        }
    }
}

pub fn session<R: Repository + ?Sized>(repo: &R, user_id: Option<u64>) -> Result<Caller, AccessError> {
    let Some(id) = user_id else {
        return Ok(Caller::Anonymous);
    };
    Ok(repo.user(id)?.map_or(Caller::Anonymous, Caller::Session))
}

/// Exact match of the presented token against stored identities.
pub fn resolve_token<R: Repository + ?Sized>(repo: &R, token: Option<&str>) -> Result<Caller, AccessError> {
    let token = token.unwrap_or("");
    if token.is_empty() {
        return Err(AccessError::Forbidden);
    }
    repo.user_by_token(token)?
        .map(Caller::Token)
        .ok_or(AccessError::Forbidden)
}

pub fn require_user(caller: &Caller) -> Result<&User, AccessError> {
    caller.user().ok_or(AccessError::Forbidden)
}

pub fn can_access(user: &User, project: &Project) -> bool {
    user.is_staff || project.has_member(user.id)
}

/// A project outside the caller's scope looks exactly like a missing one.
pub fn visible_project<R: Repository + ?Sized>(
    repo: &R,
    user: &User,
    slug: &str,
) -> Result<Project, AccessError> {
    match repo.project_by_slug(slug)? {
        Some(project) if can_access(user, &project) => Ok(project),
        _ => Err(AccessError::NotFound),
    }
}

/// Every project `user` may sync, by slug.
pub fn visible_projects<R: Repository + ?Sized>(repo: &R, user: &User) -> Result<Vec<Project>, AccessError> {
    let mut projects: Vec<Project> = repo
        .projects()?
        .into_iter()
        .filter(|p| can_access(user, p))
        .collect();
    projects.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(projects)
}

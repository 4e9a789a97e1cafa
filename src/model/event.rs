use serde::{Deserialize, Serialize};

use super::catalog::CatalogRef;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Replaced,
    Deleted,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Replaced => "replaced",
            Action::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: u64,

    /// RFC 3339
    pub created_at: String,

    pub user_id: u64,

    pub action: Action,

    pub catalog: CatalogRef,

    /// SHA-256 of the catalog body when the event was recorded.
    #[serde(default)]
    pub body_digest: String,
}

/// Who did what; the store fills in the catalog reference and digest when it
/// commits the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewEvent {
    pub user_id: u64,
    pub action: Action,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: u64,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    #[serde(default)]
    pub is_staff: bool,

    /// Secret for non-interactive callers. Empty means "not generated yet".
    #[serde(default)]
    pub token: String,
}

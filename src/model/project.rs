use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Project {
    pub id: u64,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub slug: String,

    /// Member user ids.
    #[serde(default)]
    pub users: Vec<u64>,
}

impl Project {
    pub fn has_member(&self, user_id: u64) -> bool {
        self.users.contains(&user_id)
    }
}

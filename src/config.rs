use std::path::PathBuf;

/// Wire version the sync endpoint accepts. Bump it when the protocol changes
/// in an incompatible way.
pub const CLI_API: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub store_path: PathBuf,
    pub cli_api: String,
    pub deepl_auth_key: Option<String>,
    /// Written to `X-Translated-Using`.
    pub tool: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            cli_api: CLI_API.to_string(),
            deepl_auth_key: None,
            tool: default_tool(),
        }
    }
}

fn default_tool() -> String {
    format!("traduire {}", env!("CARGO_PKG_VERSION"))
}

fn default_store_path() -> PathBuf {
    if let Ok(local) = std::env::var("LOCALAPPDATA") {
        return PathBuf::from(local).join("traduire").join("store.json");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("traduire-store.json")
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_path: non_empty("TRADUIRE_STORE")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            cli_api: non_empty("TRADUIRE_CLI_API").unwrap_or(defaults.cli_api),
            deepl_auth_key: non_empty("DEEPL_AUTH_KEY"),
            tool: non_empty("TRADUIRE_TOOL").unwrap_or(defaults.tool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_speak_the_current_protocol() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.cli_api, CLI_API);
        assert!(cfg.tool.starts_with("traduire "));
        assert!(cfg.deepl_auth_key.is_none());
    }
}

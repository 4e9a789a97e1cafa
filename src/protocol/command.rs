#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Sync,
    EditorEntries,
    EditorSave,
    Suggest,
    ProjectMessages,
    ClientConfig,
    CycleToken,
    Unknown,
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s {
            "ping" => Command::Ping,
            "sync" => Command::Sync,
            "editor.entries" => Command::EditorEntries,
            "editor.save" => Command::EditorSave,
            "suggest" => Command::Suggest,
            "project.messages" => Command::ProjectMessages,
            "project.client_config" => Command::ClientConfig,
            "user.cycle_token" => Command::CycleToken,
            _ => Command::Unknown,
        }
    }
}

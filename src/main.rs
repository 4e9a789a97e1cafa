use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use traduire_core::client::{ClientConfig, ClientError, Remote, SyncAction};
use traduire_core::config::ServerConfig;
use traduire_core::protocol::{self, Context};
use traduire_core::services::store::FileStore;

#[derive(Parser)]
#[command(name = "traduire-core", version, about = "Gettext catalog sync and merge engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer JSON-line requests on stdin (default)
    Serve,
    /// Fetch all pofiles from the server
    Get { folder: PathBuf },
    /// Submit updated pofiles to the server for translation
    Submit { folder: PathBuf },
    /// Replace pofiles on the server
    Replace { folder: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(),
        Commands::Get { folder } => sync(SyncAction::Get, &folder),
        Commands::Submit { folder } => sync(SyncAction::Submit, &folder),
        Commands::Replace { folder } => sync(SyncAction::Replace, &folder),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn sync(action: SyncAction, folder: &Path) -> Result<(), String> {
    let run = || -> Result<Vec<String>, ClientError> {
        let config = ClientConfig::read_from_path(ClientConfig::default_path())?;
        let cwd = std::env::current_dir()?;
        let project = config.current_project(&cwd)?.clone();
        Remote::new(project)?.run(action, folder)
    };
    let done = run().map_err(|e| e.to_string())?;
    for line in done {
        println!("{line}");
    }
    Ok(())
}

fn serve() -> Result<(), String> {
    let cfg = ServerConfig::from_env();
    let store = FileStore::open(&cfg.store_path)
        .map_err(|e| format!("cannot open store {}: {e}", cfg.store_path.display()))?;
    tracing::info!(store = %cfg.store_path.display(), cli_api = %cfg.cli_api, "serving");

    let mut ctx = Context::new(store, cfg);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };

        if line.trim().is_empty() {
            continue;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| protocol::handle(&mut ctx, &line)));

        let response = match result {
            Ok(resp) => resp,
            Err(_) => serde_json::json!({
                "status": "error",
                "message": "internal core error"
            })
            .to_string(),
        };

        if writeln!(stdout, "{response}").is_err() {
            break;
        }

        let _ = stdout.flush();
    }

    Ok(())
}

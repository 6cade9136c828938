//! vibeship CLI - Main entry point

mod cli;
mod init;
mod keys;
mod sessions;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vibe_foundation::{ConfigStore, SecretString, Storage, VibeConfig};

/// vibeship - describe a change, review it, ship it as a commit
#[derive(Parser, Debug)]
#[command(name = "vibe")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Repository owner (overrides env and config)
    #[arg(long, global = true)]
    owner: Option<String>,

    /// Repository name (overrides env and config)
    #[arg(long, global = true)]
    repo: Option<String>,

    /// GitHub token (overrides env and config)
    #[arg(long, global = true)]
    token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record owner / repo / branch in ./.vibeship/config.json
    Init {
        /// Default branch for this project
        #[arg(short, long)]
        branch: Option<String>,

        /// Overwrite an existing project config
        #[arg(short, long)]
        force: bool,
    },
    /// Propose a change for an instruction and ship it after confirmation
    Run {
        /// What to change, in plain words
        instruction: String,

        /// Branch to read and commit to
        #[arg(short, long)]
        branch: Option<String>,

        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,

        /// Ship without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Manage the shared model key pool
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },
    /// Inspect recorded sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Add a key to the pool (re-activates a known key)
    Donate { key: String },
    /// List keys with masked secrets
    List,
    /// Re-activate an exhausted key
    Reset {
        /// Key ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// List recent sessions
    List {
        /// Number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
    /// Show the transcript of a session
    Show { id: String },
    /// Delete a session and its transcript
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, so prompts and tables stay clean)
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Command::Init { branch, force } = args.command {
        let store = ConfigStore::current_project()?;
        let options = init::InitOptions {
            owner: args.owner,
            repo: args.repo,
            branch,
            force,
        };
        init::init_project(&store, options)?;
        return Ok(());
    }

    let mut config = VibeConfig::load()?;
    if let Some(owner) = args.owner {
        config.github.owner = Some(owner);
    }
    if let Some(repo) = args.repo {
        config.github.repo = Some(repo);
    }
    if let Some(token) = args.token {
        config.github.token = Some(SecretString::new(token));
    }

    let data_dir = config.effective_data_dir();
    tracing::debug!("Data directory: {}", data_dir.display());
    let storage = Arc::new(Storage::new(&data_dir)?);

    match args.command {
        Command::Init { .. } => Ok(()),
        Command::Run {
            instruction,
            branch,
            session,
            yes,
        } => {
            let options = cli::RunOptions {
                branch,
                session,
                assume_yes: yes,
            };
            cli::run(&config, storage, &instruction, options).await
        }
        Command::Keys { command } => match command {
            KeysCommand::Donate { key } => keys::donate(storage, key),
            KeysCommand::List => keys::list(storage),
            KeysCommand::Reset { id } => keys::reset(storage, &id),
        },
        Command::Sessions { command } => match command {
            SessionsCommand::List { limit } => sessions::list(&storage, limit),
            SessionsCommand::Show { id } => sessions::show(&storage, &id),
            SessionsCommand::Delete { id } => sessions::delete(&storage, &id),
        },
    }
}

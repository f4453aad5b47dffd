//! ERP CLI - Command-line client for the ERP API.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use client_config_and_utils::{init_logging, Config, Paths};
use session_engine::{AuthFacade, SessionError, SessionEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// ERP CLI - Log in with an emailed code and call the API.
#[derive(Parser)]
#[command(name = "erp")]
#[command(about = "ERP CLI for authentication and API access")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// API base URL, overriding the config file and ERP_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with an emailed one-time code
    Login {
        /// Account email; prompted for when omitted
        email: Option<String>,
    },

    /// Logout and clear the stored session
    Logout,

    /// Show authentication status
    Status {
        /// Confirm the stored session with the server
        #[arg(long)]
        verify: bool,
    },

    /// Show the current user's profile
    Whoami,

    /// Send an authenticated GET request
    Get {
        /// API path, relative to the base URL
        path: String,
        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query")]
        query: Vec<String>,
        /// Print the response body without unwrapping the envelope
        #[arg(long)]
        raw: bool,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let mut config = Config::load(&paths)?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
        config.validate()?;
    }

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, &paths);
    debug!(api = %config.api_base_url, "Starting");

    let facade = AuthFacade::from_config(&config, &paths)?;
    let state = facade.restore_session()?;
    debug!(state = state.name(), "Restored session");

    let mut events = facade.subscribe();
    let format = cli.format;

    let result = match cli.command {
        Commands::Login { email } => commands::login(&facade, email, &format).await,
        Commands::Logout => commands::logout(&facade, &format).await,
        Commands::Status { verify } => {
            commands::status(&facade, &config, &paths, verify, &format).await
        }
        Commands::Whoami => commands::whoami(&facade, &format).await,
        Commands::Get { path, query, raw } => commands::get(&facade, &path, &query, raw).await,
    };

    if session_invalidated(&mut events) {
        output::print_error("Session expired. Run 'erp login' to sign in again", &format);
    }

    result
}

fn session_invalidated(events: &mut broadcast::Receiver<SessionEvent>) -> bool {
    let mut invalidated = false;
    loop {
        match events.try_recv() {
            Ok(SessionEvent::SessionInvalidated) => invalidated = true,
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    invalidated
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&error_message(&e), &format);
        std::process::exit(1);
    }
}

fn error_message(e: &anyhow::Error) -> String {
    match e.downcast_ref::<SessionError>() {
        Some(err) => match err.status() {
            Some(status) => format!("{} (HTTP {})", err.user_message(), status),
            None => err.user_message(),
        },
        None => e.to_string(),
    }
}

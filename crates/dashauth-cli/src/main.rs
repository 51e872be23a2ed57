//! dashauth - command-line client for the logistics dashboard.
//!
//! Logs in, keeps the session alive and fetches dashboard data through
//! the session-aware request pipeline.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dashauth_core::{
    Config, FileStore, KeyringStore, Navigator, PersistenceAdapter, SessionManager, StorageBackend,
};

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "dashauth.log";

#[derive(Parser)]
#[command(name = "dashauth", version, about = "Dashboard session client")]
struct Cli {
    /// Dashboard base URL
    #[arg(long, global = true, env = dashauth_core::config::BASE_URL_ENV)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Show the current user and credential lifetime
    Whoami,
    /// End the current session
    Logout,
    /// Check that the backend is reachable
    Health,
    /// Fetch a dashboard view
    Fetch {
        #[command(subcommand)]
        view: View,
    },
    /// Change the password of the logged-in user
    ChangePassword,
    /// Keep the session alive and report changes until interrupted
    Watch,
}

#[derive(Subcommand)]
enum View {
    ForwardingOrders,
    FirstMileTruck,
    LastMileTruck { terminal: String },
    Stockpiles,
    All,
}

/// Tells the user to log in again when the session is torn down.
struct CliNavigator;

impl Navigator for CliNavigator {
    fn redirect_to_login(&self) {
        eprintln!("Session ended. Run `dashauth login` to sign in again.");
    }
}

/// Initialize the tracing subscriber for logging
///
/// Writes to stderr and, when the cache directory is available, to a daily
/// log file. The returned guard must live until exit to flush the file.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn open_store(config: &Config) -> Result<Arc<dyn PersistenceAdapter>> {
    Ok(match config.storage {
        StorageBackend::Keyring => Arc::new(KeyringStore::default()),
        StorageBackend::File => Arc::new(FileStore::in_dir(&config.cache_dir()?)),
    })
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {}", e);
        Config::default()
    });
    let _guard = init_tracing(&config);

    let mut session_config = config.session_config();
    if let Some(url) = cli.api_url {
        session_config.base_url = url;
    }

    let manager = SessionManager::builder()
        .config(session_config)
        .store(open_store(&config)?)
        .navigator(Arc::new(CliNavigator))
        .build()?;
    info!(base_url = %manager.config().base_url, "dashauth starting");

    match cli.command {
        Command::Login { username } => {
            let username = match username.or_else(|| config.last_username.clone()) {
                Some(name) => name,
                None => prompt("Username: ")?,
            };
            let password = rpassword::prompt_password("Password: ")
                .context("Failed to read password")?;

            let principal = manager.login(&username, &password).await?;
            println!("Logged in as {} ({:?})", principal.username, principal.role);

            config.last_username = Some(username);
            if let Err(e) = config.save() {
                warn!("Failed to save config: {}", e);
            }
        }
        Command::Whoami => {
            if !manager.restore() {
                println!("Not logged in");
                return Ok(());
            }
            if let Some(session) = manager.current() {
                println!("{} ({:?})", session.principal.username, session.principal.role);
                println!(
                    "Credential expires in {}s",
                    session.credential.seconds_until_expiry(Utc::now())
                );
            }
        }
        Command::Logout => {
            manager.restore();
            manager.logout();
            println!("Logged out");
        }
        Command::Health => {
            print_json(&manager.dashboard().health_check().await?)?;
        }
        Command::Fetch { view } => {
            manager.restore();
            let dashboard = manager.dashboard();
            let data = match view {
                View::ForwardingOrders => dashboard.forwarding_orders().await?,
                View::FirstMileTruck => dashboard.first_mile_truck().await?,
                View::LastMileTruck { terminal } => dashboard.last_mile_truck(&terminal).await?,
                View::Stockpiles => dashboard.stockpiles().await?,
                View::All => dashboard.all().await?,
            };
            print_json(&data)?;
        }
        Command::ChangePassword => {
            manager.restore();
            let current = rpassword::prompt_password("Current password: ")
                .context("Failed to read password")?;
            let new = rpassword::prompt_password("New password: ")
                .context("Failed to read password")?;
            let response = manager.dashboard().change_password(&current, &new).await?;
            if response.success {
                println!("Password changed");
            } else {
                anyhow::bail!("Password change failed: {}", response.message);
            }
        }
        Command::Watch => {
            if !manager.restore() {
                anyhow::bail!("Not logged in");
            }
            println!("Watching session, press Ctrl-C to stop");
            let mut changes = manager.subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let Some(session) = changes.borrow_and_update().clone() else {
                            println!("Session ended");
                            break;
                        };
                        println!(
                            "Credential renewed, expires in {}s",
                            session.credential.seconds_until_expiry(Utc::now())
                        );
                    }
                }
            }
            manager.monitor().stop();
        }
    }

    Ok(())
}

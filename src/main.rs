//! Portal notification service
//!
//! Runs the due-date reminder scheduler and the unread badge poller, or
//! performs one-off checks from the command line.

use anyhow::Context;
use clap::{Parser, Subcommand};
use portal_core::{
    badge_label, AuthBroadcaster, BadgePoller, BadgeSurface, ConnectionMode, LibsqlStore,
    NotificationDispatcher, NotificationStore, PortalConfig, ReminderScheduler, Session,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Portal notification service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Database path (overrides config and PORTAL_DB_PATH)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true, env = "PORTAL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reminder scheduler until interrupted
    Serve {
        /// Treat this user as signed in and keep their badge updated
        #[arg(long)]
        user: Option<String>,
    },

    /// Run one due-date check now
    CheckReminders {
        /// Remind about forms due this many days ahead
        #[arg(long)]
        days: Option<u32>,
    },

    /// Show a user's unread count and badge text
    Unread {
        /// User id
        user_id: String,
    },
}

/// Badge surface that writes to the log
struct LogSurface;

impl BadgeSurface for LogSurface {
    fn show(&self, label: &str) {
        info!("Unread badge: {}", label);
    }

    fn hide(&self) {
        info!("Unread badge hidden");
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PortalConfig> {
    let config = match &cli.config {
        Some(path) => PortalConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PortalConfig::default(),
    };

    let mut config = config.with_env_overrides();
    if let Some(path) = &cli.db_path {
        config.storage.db_path = path.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Use the requested level for our crates, keep libSQL quiet
    let filter = EnvFilter::new(format!(
        "portal={level},portal_core={level},libsql=warn",
        level = level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Portal v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let store = Arc::new(
        LibsqlStore::open(ConnectionMode::Local(config.storage.db_path.clone()))
            .await
            .with_context(|| {
                format!("Failed to open database {}", config.storage.db_path.display())
            })?,
    );
    let dispatcher = NotificationDispatcher::new(store.clone());

    match cli.command {
        Command::Serve { user } => {
            let scheduler = ReminderScheduler::new(dispatcher, config.scheduler.clone());

            let broadcaster = AuthBroadcaster::new();
            let poller = Arc::new(BadgePoller::new(
                store.clone(),
                Arc::new(LogSurface),
                config.badge.poll_interval,
            )?);
            let subscription = poller.bind(&broadcaster);
            broadcaster.initialize(user.map(|id| Session::new(id.clone(), id)));

            scheduler.auto_start();
            info!("Portal service running; press Ctrl-C to stop");

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;

            info!("Shutting down");
            scheduler.shutdown();
            broadcaster.publish(None);
            subscription.unsubscribe();
        }

        Command::CheckReminders { days } => {
            let days = days.unwrap_or(config.scheduler.reminder_days);
            let created = dispatcher.dispatch_due_date_reminders(days).await?;
            println!("{} reminder(s) created", created);
        }

        Command::Unread { user_id } => {
            let count = store.get_unread_count(&user_id).await?;
            match badge_label(count) {
                Some(label) => println!("{}: {} unread (badge \"{}\")", user_id, count, label),
                None => println!("{}: no unread notifications", user_id),
            }
        }
    }

    Ok(())
}

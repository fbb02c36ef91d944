//! IZAJ CLI - session, notification and profile commands.
//!
//! # Usage
//!
//! ```bash
//! # Log in and stay remembered across runs
//! IZAJ_PASSWORD=... izaj login --identifier maria@izaj.ph --remember
//!
//! # Show unread notifications
//! izaj notifications list --unread-only
//!
//! # Follow the feed until Ctrl+C
//! izaj watch
//! ```
//!
//! # Commands
//!
//! - `whoami` / `login` / `logout` / `register` / `oauth-url` - session
//! - `notifications` - list, stats, read, read-all, delete
//! - `avatar` - upload or remove the profile picture
//! - `watch` - print the notification feed on every change

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use izaj_core::NotificationKind;
use izaj_storefront::config::ClientConfig;
use secrecy::SecretString;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "izaj")]
#[command(author, version, about = "IZAJ storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current identity
    Whoami,
    /// Log in with email or phone
    Login {
        /// Email address or phone number
        #[arg(short, long)]
        identifier: String,

        /// Password
        #[arg(long, env = "IZAJ_PASSWORD", hide_env_values = true)]
        password: String,

        /// Keep the session across runs
        #[arg(short, long)]
        remember: bool,
    },
    /// Print the Google sign-in URL
    OauthUrl,
    /// Log out and clear every local session
    Logout,
    /// Create an account (does not log in)
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        phone: Option<String>,

        /// Password
        #[arg(long, env = "IZAJ_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Work with notifications
    Notifications {
        #[command(subcommand)]
        action: NotificationAction,
    },
    /// Manage the profile picture
    Avatar {
        #[command(subcommand)]
        action: AvatarAction,
    },
    /// Print the notification feed on every change until Ctrl+C
    Watch,
}

#[derive(Subcommand)]
enum NotificationAction {
    /// List notifications
    List {
        /// Only unread notifications
        #[arg(long)]
        unread_only: bool,

        /// Restrict to one type (order, promo, review, system, favorite, payment)
        #[arg(long)]
        kind: Option<NotificationKind>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show aggregate counts
    Stats,
    /// Mark one notification as read
    Read { id: String },
    /// Mark every notification as read
    ReadAll,
    /// Delete one notification
    Delete { id: String },
}

#[derive(Subcommand)]
enum AvatarAction {
    /// Upload a JPEG, PNG or WebP image (max 5 MiB)
    Upload { path: PathBuf },
    /// Remove the profile picture
    Remove,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "izaj_storefront=info,izaj_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Whoami => commands::session::whoami(config).await?,
        Commands::Login {
            identifier,
            password,
            remember,
        } => {
            commands::session::login(config, &identifier, SecretString::from(password), remember)
                .await?;
        }
        Commands::OauthUrl => commands::session::oauth_url(config)?,
        Commands::Logout => commands::session::logout(config).await?,
        Commands::Register {
            email,
            first_name,
            last_name,
            phone,
            password,
        } => {
            commands::session::register(
                config,
                commands::session::Registration {
                    email,
                    first_name,
                    last_name,
                    phone,
                    password: SecretString::from(password),
                },
            )
            .await?;
        }
        Commands::Notifications { action } => match action {
            NotificationAction::List {
                unread_only,
                kind,
                limit,
                offset,
            } => {
                commands::notifications::list(config, unread_only, kind, limit, offset).await?;
            }
            NotificationAction::Stats => commands::notifications::stats(config).await?,
            NotificationAction::Read { id } => commands::notifications::read(config, &id).await?,
            NotificationAction::ReadAll => commands::notifications::read_all(config).await?,
            NotificationAction::Delete { id } => {
                commands::notifications::delete(config, &id).await?;
            }
        },
        Commands::Avatar { action } => match action {
            AvatarAction::Upload { path } => commands::avatar::upload(config, &path).await?,
            AvatarAction::Remove => commands::avatar::remove(config).await?,
        },
        Commands::Watch => commands::watch::run(config).await?,
    }
    Ok(())
}

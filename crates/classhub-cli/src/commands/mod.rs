//! CLI command definitions and dispatch.

pub mod backoff;
pub mod config;
pub mod notifications;
pub mod prefs;

use clap::{Args, Parser, Subcommand};

use classhub_core::config::AppConfig;
use classhub_core::error::AppError;
use classhub_core::types::Credentials;

use crate::output::OutputFormat;

/// ClassHub notifications toolbox
#[derive(Debug, Parser)]
#[command(name = "classhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Session overrides
    #[command(flatten)]
    pub session: SessionArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Credentials given on the command line; each overrides `[session]`.
#[derive(Debug, Clone, Default, Args)]
pub struct SessionArgs {
    /// Bearer token
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// User id
    #[arg(long, global = true)]
    pub user_id: Option<String>,

    /// Role (student, teacher, admin)
    #[arg(long, global = true)]
    pub role: Option<String>,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Notification list and read markers
    Notifications(notifications::NotificationsArgs),
    /// Display preferences
    Prefs(prefs::PrefsArgs),
    /// Configuration management
    Config(config::ConfigArgs),
    /// Show the reconnect delay schedule
    Backoff(backoff::BackoffArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Notifications(args) => {
                notifications::execute(args, &self.config, &self.session, self.format).await
            }
            Commands::Prefs(args) => prefs::execute(args, &self.config, self.format).await,
            Commands::Config(args) => config::execute(args, &self.config, self.format).await,
            Commands::Backoff(args) => backoff::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file
pub async fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load_file(config_path)
}

/// Helper: resolve credentials from flags, falling back to `[session]`.
pub fn resolve_credentials(
    config: &AppConfig,
    overrides: &SessionArgs,
) -> Result<Credentials, AppError> {
    let mut session = config.session.clone();
    if overrides.token.is_some() {
        session.token = overrides.token.clone();
    }
    if overrides.user_id.is_some() {
        session.user_id = overrides.user_id.clone();
    }
    if overrides.role.is_some() {
        session.role = overrides.role.clone();
    }
    session.credentials()
}

//! Notification list and read-marker commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use tracing::debug;

use classhub_core::error::AppError;
use classhub_notify::api::{HttpNotificationApi, NotificationApi};
use classhub_notify::preferences::{FilePreferenceStorage, load_preferences};
use classhub_notify::record::{NotificationRecord, Source};

use super::SessionArgs;
use crate::output::{self, OutputFormat};

/// Arguments for notification commands
#[derive(Debug, Args)]
pub struct NotificationsArgs {
    /// Notification subcommand
    #[command(subcommand)]
    pub command: NotificationsCommand,
}

/// Notification subcommands
#[derive(Debug, Subcommand)]
pub enum NotificationsCommand {
    /// List recent notifications
    List {
        /// Only show unread notifications
        #[arg(short, long)]
        unread: bool,
    },
    /// Mark one notification as read
    Read {
        /// Notification id
        id: String,
    },
    /// Mark every notification as read
    ReadAll {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Notification display row for table output
#[derive(Debug, Serialize, Tabled)]
struct NotificationRow {
    /// Notification id
    id: String,
    /// Type tag
    #[tabled(rename = "type")]
    #[serde(rename = "type")]
    kind: String,
    /// Title
    title: String,
    /// Message, shortened for tables
    message: String,
    /// Creation time
    created_at: String,
    /// Read marker
    read: String,
}

impl NotificationRow {
    fn from_record(record: &NotificationRecord, format: OutputFormat) -> Self {
        let message = match format {
            OutputFormat::Table => output::truncate(&record.message, 48),
            OutputFormat::Json => record.message.clone(),
        };
        Self {
            id: record.id.clone(),
            kind: record.kind.clone(),
            title: record.title.clone(),
            message,
            created_at: record
                .created_at()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            read: if record.is_read { "yes" } else { "no" }.to_string(),
        }
    }
}

/// Execute notification commands
pub async fn execute(
    args: &NotificationsArgs,
    config_path: &str,
    session: &SessionArgs,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path).await?;
    let credentials = super::resolve_credentials(&config, session)?;
    let api = HttpNotificationApi::from_config(&config.api)?.with_token(credentials.token.clone());

    match &args.command {
        NotificationsCommand::List { unread } => {
            let storage = FilePreferenceStorage::new(&config.notifications.preferences_path);
            let prefs = load_preferences(&storage).await.unwrap_or_default();

            let items = api.get_notifications(&credentials.user_id).await?;
            debug!(count = items.len(), user_id = %credentials.user_id, "Fetched notifications");
            let rows: Vec<NotificationRow> = items
                .iter()
                .map(|item| NotificationRecord::from_server(item, &prefs, Source::Polling))
                .filter(|record| !*unread || !record.is_read)
                .map(|record| NotificationRow::from_record(&record, format))
                .collect();

            output::print_list(&rows, format);
        }
        NotificationsCommand::Read { id } => {
            api.mark_notification_as_read(id).await?;
            output::print_success(&format!("Notification '{id}' marked as read"));
        }
        NotificationsCommand::ReadAll { yes } => {
            if !yes {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!(
                        "Mark all notifications of user {} as read?",
                        credentials.user_id
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Prompt error: {e}")))?;

                if !confirm {
                    output::print_warning("Aborted, nothing was changed");
                    return Ok(());
                }
            }

            api.mark_all_notifications_as_read(&credentials.user_id).await?;
            output::print_success("All notifications marked as read");
        }
    }

    Ok(())
}

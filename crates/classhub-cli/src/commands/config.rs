//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use classhub_core::config::AppConfig;
use classhub_core::error::AppError;
use classhub_core::types::identity::mask_token;
use classhub_realtime::connection::target::derive_fallback;

use crate::output::{self, OutputFormat};

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration, with the session token masked
    Show,
    /// Validate configuration file
    Validate,
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let config = redacted(super::load_config(config_path).await?);
            output::print_item(&config, format);
        }
        ConfigCommand::Validate => match super::load_config(config_path).await {
            Ok(config) => {
                output::print_success(&format!("Configuration '{config_path}' is valid"));
                output::print_kv("API", &config.api.base_url);
                output::print_kv("Stream", &stream_endpoint(&config));
                output::print_kv(
                    "Retries",
                    &format!(
                        "{} (backoff {}..{} ms)",
                        config.stream.max_retries,
                        config.stream.base_backoff_ms,
                        config.stream.max_backoff_ms
                    ),
                );
                output::print_kv(
                    "Heartbeat timeout",
                    &format!("{} ms", config.stream.heartbeat_timeout_ms),
                );
                output::print_kv(
                    "Poll interval",
                    &format!("{} ms", config.notifications.poll_interval_ms),
                );
                output::print_kv(
                    "Session",
                    if config.session.credentials().is_ok() {
                        "configured"
                    } else {
                        "not configured"
                    },
                );
            }
            Err(e) => {
                output::print_error(&format!("Configuration invalid: {e}"));
                return Err(e);
            }
        },
    }

    Ok(())
}

fn stream_endpoint(config: &AppConfig) -> String {
    match &config.stream.url {
        Some(url) => url.clone(),
        None => derive_fallback(&config.api.base_url)
            .map(|url| format!("{url} (derived)"))
            .unwrap_or_else(|e| format!("unresolvable: {e}")),
    }
}

fn redacted(mut config: AppConfig) -> AppConfig {
    if let Some(token) = config.session.token.as_deref() {
        config.session.token = Some(mask_token(token));
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(toml: &str) -> AppConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classhub.toml");
        std::fs::write(&path, toml).unwrap();
        AppConfig::load_file(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_show_masks_session_token() {
        let config = load(
            "[api]\nbase_url = \"https://school.example/api\"\n\n[session]\ntoken = \"abcdef123456\"\n",
        );
        let shown = redacted(config);
        assert_ne!(shown.session.token.as_deref(), Some("abcdef123456"));
    }

    #[test]
    fn test_stream_endpoint_falls_back_to_api_base() {
        let config = load("[api]\nbase_url = \"https://school.example/api\"\n");
        assert_eq!(
            stream_endpoint(&config),
            "https://school.example/api/notifications/stream (derived)"
        );
    }
}

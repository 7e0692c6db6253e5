//! Display preference commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use classhub_core::error::AppError;
use classhub_notify::preferences::{
    FilePreferenceStorage, Preferences, load_preferences, save_preferences,
};

use crate::output::{self, OutputFormat};

/// Arguments for preference commands
#[derive(Debug, Args)]
pub struct PrefsArgs {
    /// Preference subcommand
    #[command(subcommand)]
    pub command: PrefsCommand,
}

/// Preference subcommands
#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    /// Show stored preferences
    Show,
    /// Change one or more preferences
    Set {
        /// Enable or disable sounds
        #[arg(long)]
        sound: Option<bool>,
        /// Enable or disable desktop notifications
        #[arg(long)]
        desktop: Option<bool>,
        /// Maximum number of visible toasts
        #[arg(long)]
        max_stack: Option<usize>,
        /// Auto-dismiss delay as `type=ms`; repeatable, 0 disables the timer
        #[arg(long = "duration", value_parser = parse_duration_override)]
        durations: Vec<(String, u64)>,
    },
    /// Restore the defaults
    Reset,
}

/// Duration display row for table output
#[derive(Debug, Serialize, Tabled)]
struct DurationRow {
    /// Notification type
    #[tabled(rename = "type")]
    #[serde(rename = "type")]
    kind: String,
    /// Auto-dismiss delay
    duration: String,
}

/// Execute preference commands
pub async fn execute(
    args: &PrefsArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path).await?;
    let storage = FilePreferenceStorage::new(&config.notifications.preferences_path);

    match &args.command {
        PrefsCommand::Show => {
            let prefs = load_preferences(&storage).await?;
            print_preferences(&prefs, format);
        }
        PrefsCommand::Set {
            sound,
            desktop,
            max_stack,
            durations,
        } => {
            // A corrupt file is replaced rather than blocking the update.
            let mut prefs = match load_preferences(&storage).await {
                Ok(prefs) => prefs,
                Err(e) => {
                    output::print_warning(&format!("{e}; starting from defaults"));
                    Preferences::default()
                }
            };

            if let Some(sound) = sound {
                prefs.sound_enabled = *sound;
            }
            if let Some(desktop) = desktop {
                prefs.desktop_enabled = *desktop;
            }
            if let Some(max_stack) = max_stack {
                if *max_stack == 0 {
                    return Err(AppError::validation("max_stack must be at least 1"));
                }
                prefs.max_stack = *max_stack;
            }
            for (kind, ms) in durations {
                prefs = prefs.with_duration(kind.clone(), *ms);
            }

            save_preferences(&storage, &prefs).await?;
            output::print_success(&format!(
                "Preferences saved to '{}'",
                storage.path().display()
            ));
        }
        PrefsCommand::Reset => {
            save_preferences(&storage, &Preferences::default()).await?;
            output::print_success("Preferences reset to defaults");
        }
    }

    Ok(())
}

fn print_preferences(prefs: &Preferences, format: OutputFormat) {
    match format {
        OutputFormat::Json => output::print_item(prefs, format),
        OutputFormat::Table => {
            output::print_kv("Sound", on_off(prefs.sound_enabled));
            output::print_kv("Desktop", on_off(prefs.desktop_enabled));
            output::print_kv("Max stack", &prefs.max_stack.to_string());
            println!();

            let rows: Vec<DurationRow> = prefs
                .durations
                .iter()
                .map(|(kind, ms)| DurationRow {
                    kind: kind.clone(),
                    duration: match ms {
                        0 => "manual".to_string(),
                        ms => format!("{ms} ms"),
                    },
                })
                .collect();
            output::print_list(&rows, format);
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn parse_duration_override(s: &str) -> Result<(String, u64), String> {
    let (kind, ms) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `type=ms`, got '{s}'"))?;
    let kind = kind.trim();
    if kind.is_empty() {
        return Err("type must not be empty".to_string());
    }
    let ms = ms
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid duration '{ms}': {e}"))?;
    Ok((kind.to_string(), ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_override() {
        assert_eq!(
            parse_duration_override("warning=1500").unwrap(),
            ("warning".to_string(), 1_500)
        );
        assert_eq!(parse_duration_override(" error = 0 ").unwrap().1, 0);
        assert!(parse_duration_override("warning").is_err());
        assert!(parse_duration_override("=5").is_err());
        assert!(parse_duration_override("info=soon").is_err());
    }
}

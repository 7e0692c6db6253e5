//! Reconnect schedule preview.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use classhub_core::error::AppError;
use classhub_realtime::connection::backoff::{BackoffPolicy, JITTER_MAX_MS};

use crate::output::{self, OutputFormat};

/// Arguments for the backoff command
#[derive(Debug, Args)]
pub struct BackoffArgs {
    /// Number of attempts to show; defaults to `stream.max_retries`
    #[arg(short, long)]
    pub attempts: Option<u32>,
}

/// One retry attempt
#[derive(Debug, Serialize, Tabled)]
struct AttemptRow {
    /// 1-based attempt number
    attempt: u32,
    /// Lower bound of the delay
    min_ms: u64,
    /// Exclusive upper bound of the delay
    max_ms: u64,
    /// Time since the first failure, lower bound
    cumulative_ms: u64,
}

/// Execute the backoff command
pub async fn execute(
    args: &BackoffArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path).await?;
    let policy = BackoffPolicy::new(config.stream.base_backoff_ms, config.stream.max_backoff_ms);
    let attempts = args.attempts.unwrap_or(config.stream.max_retries);

    output::print_list(&rows(&policy, attempts), format);
    Ok(())
}

fn rows(policy: &BackoffPolicy, attempts: u32) -> Vec<AttemptRow> {
    let mut cumulative = 0u64;
    policy
        .schedule(attempts)
        .into_iter()
        .zip(1..)
        .map(|(delay, attempt)| {
            let base = delay.as_millis() as u64;
            cumulative = cumulative.saturating_add(base);
            AttemptRow {
                attempt,
                min_ms: base,
                max_ms: base + JITTER_MAX_MS,
                cumulative_ms: cumulative,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_double_until_capped() {
        let rows = rows(&BackoffPolicy::new(1_000, 5_000), 5);
        let mins: Vec<u64> = rows.iter().map(|r| r.min_ms).collect();

        assert_eq!(mins, vec![1_000, 2_000, 4_000, 5_000, 5_000]);
        assert_eq!(rows[0].max_ms, 1_250);
        assert_eq!(rows[4].cumulative_ms, 17_000);
    }

    #[test]
    fn test_zero_attempts() {
        assert!(rows(&BackoffPolicy::default(), 0).is_empty());
    }
}

//! REST collaborator configuration.

use serde::{Deserialize, Serialize};

/// Settings for the classroom REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API, e.g. `https://school.example/api`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    15
}

//! Session credential configuration.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::identity::{Credentials, UserRole};

/// Credentials supplied through configuration rather than an interactive login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bearer token.
    #[serde(default)]
    pub token: Option<String>,
    /// Numeric or opaque user id as issued by the backend.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Role of the user (`student`, `teacher`, `admin`).
    #[serde(default)]
    pub role: Option<String>,
}

impl SessionConfig {
    /// Build credentials, failing when the token or user id is missing.
    pub fn credentials(&self) -> Result<Credentials, AppError> {
        let token = self
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::configuration("session.token is not set"))?;
        let user_id = self
            .user_id
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::configuration("session.user_id is not set"))?;
        let role = self
            .role
            .as_deref()
            .map(UserRole::from_str_value)
            .unwrap_or_default();

        Ok(Credentials::new(token, user_id, role))
    }
}

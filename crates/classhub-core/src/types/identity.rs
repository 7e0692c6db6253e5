//! Session identity handed to the notification core by the auth provider.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Roles known to the classroom backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Enrolled student.
    #[default]
    Student,
    /// Classroom owner.
    Teacher,
    /// School administrator.
    Admin,
}

impl UserRole {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    /// Lenient parse used for configuration input; unknown values become `Student`.
    pub fn from_str_value(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            _ => Err(AppError::validation(format!(
                "Invalid user role: '{s}'. Expected one of: student, teacher, admin"
            ))),
        }
    }
}

/// `{token, userId, role}` triple of an authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token.
    pub token: String,
    /// Backend user id.
    pub user_id: String,
    /// User role.
    pub role: UserRole,
}

impl Credentials {
    /// Create a credential triple.
    pub fn new(token: impl Into<String>, user_id: impl Into<String>, role: UserRole) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            role,
        }
    }

    /// Whether the pair `{userId, token}` is usable for opening a session.
    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.user_id.is_empty()
    }

    /// Token with everything but the first four characters hidden.
    pub fn masked_token(&self) -> String {
        mask_token(&self.token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.masked_token())
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish()
    }
}

/// Mask a secret for safe logging.
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

//! Structured errors for store actions and the identity provider.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,

    // Session errors
    NotAuthenticated,
    AuthProvider,

    // Not found errors
    TaskNotFound,
    ProjectNotFound,
    NotificationNotFound,

    // Internal errors
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    /// Validation problems are the user's to fix; everything else is a failure.
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            ErrorCode::MissingRequiredField | ErrorCode::InvalidFieldValue
        )
    }
}

/// Structured error returned by every store action.
#[derive(Debug, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn not_authenticated() -> Self {
        Self::new(
            ErrorCode::NotAuthenticated,
            "You must be logged in to do that",
        )
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task not found: {}", task_id),
        )
    }

    pub fn project_not_found(project_id: &str) -> Self {
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("Project not found: {}", project_id),
        )
    }

    pub fn notification_not_found(id: &str) -> Self {
        Self::new(
            ErrorCode::NotificationNotFound,
            format!("Notification not found: {}", id),
        )
    }

    pub fn auth(err: &AuthError) -> Self {
        Self::new(ErrorCode::AuthProvider, err.to_string()).with_details(err.code.clone())
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(app_err) => app_err,
            Err(err) => AppError::database(err),
        }
    }
}

/// Result type for store actions.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Error reported by the identity provider, identified by a provider code
/// such as `auth/popup-closed-by-user`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AuthError {
    pub code: String,
    pub message: String,
}

impl AuthError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// How loudly a message is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// User-facing rendering of an identity-provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthMessage {
    pub message: &'static str,
    pub icon: &'static str,
    pub severity: Severity,
}

const AUTH_MESSAGES: &[(&str, AuthMessage)] = &[
    (
        "auth/popup-closed-by-user",
        AuthMessage {
            message: "The sign-in window was closed before finishing.",
            icon: "info",
            severity: Severity::Info,
        },
    ),
    (
        "auth/cancelled-popup-request",
        AuthMessage {
            message: "Only one sign-in window can be open at a time.",
            icon: "info",
            severity: Severity::Info,
        },
    ),
    (
        "auth/popup-blocked",
        AuthMessage {
            message: "The browser blocked the sign-in window. Allow pop-ups and try again.",
            icon: "block",
            severity: Severity::Warning,
        },
    ),
    (
        "auth/network-request-failed",
        AuthMessage {
            message: "Network error. Check your connection and try again.",
            icon: "wifi_off",
            severity: Severity::Warning,
        },
    ),
    (
        "auth/too-many-requests",
        AuthMessage {
            message: "Too many attempts. Please wait a moment and try again.",
            icon: "hourglass_empty",
            severity: Severity::Warning,
        },
    ),
    (
        "auth/user-disabled",
        AuthMessage {
            message: "This account has been disabled.",
            icon: "person_off",
            severity: Severity::Error,
        },
    ),
    (
        "auth/account-exists-with-different-credential",
        AuthMessage {
            message: "An account already exists with this email using another sign-in method.",
            icon: "error",
            severity: Severity::Error,
        },
    ),
    (
        "auth/unauthorized-domain",
        AuthMessage {
            message: "Sign-in is not allowed from this domain.",
            icon: "gpp_bad",
            severity: Severity::Error,
        },
    ),
];

const AUTH_FALLBACK: AuthMessage = AuthMessage {
    message: "Something went wrong while signing in. Please try again.",
    icon: "error",
    severity: Severity::Error,
};

/// Look up the user-facing message for a provider error code.
pub fn auth_message(code: &str) -> AuthMessage {
    AUTH_MESSAGES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, msg)| *msg)
        .unwrap_or(AUTH_FALLBACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_auth_codes_map_to_their_entry() {
        let msg = auth_message("auth/popup-blocked");
        assert_eq!(msg.severity, Severity::Warning);
        assert_eq!(msg.icon, "block");

        let msg = auth_message("auth/user-disabled");
        assert_eq!(msg.severity, Severity::Error);
    }

    #[test]
    fn unknown_auth_code_falls_back() {
        assert_eq!(auth_message("auth/something-new"), AUTH_FALLBACK);
        assert_eq!(auth_message(""), AUTH_FALLBACK);
    }

    #[test]
    fn auth_codes_are_unique() {
        let mut codes: Vec<&str> = AUTH_MESSAGES.iter().map(|(c, _)| *c).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), AUTH_MESSAGES.len());
    }

    #[test]
    fn anyhow_round_trips_app_error() {
        let err: anyhow::Error = AppError::missing_field("title").into();
        let back = AppError::from(err);
        assert_eq!(back.code, ErrorCode::MissingRequiredField);
        assert_eq!(back.field.as_deref(), Some("title"));
    }

    #[test]
    fn serializes_codes_in_screaming_case() {
        let json = serde_json::to_value(AppError::not_authenticated()).unwrap();
        assert_eq!(json["code"], "NOT_AUTHENTICATED");
        assert!(json.get("field").is_none());
    }
}

//! Unified error handling with Sentry integration.
//!
//! [`SyncError`] is the error taxonomy surfaced to consumers of the session
//! and notification layer. Foreground commands return it; background polling
//! records it as a message on the store instead.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::session::StorageError;

/// Why a profile picture was rejected before upload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadViolation {
    /// File exceeds the size limit.
    #[error("file is {size} bytes, maximum is {max} bytes")]
    TooLarge { size: usize, max: usize },

    /// MIME type is not an accepted image type.
    #[error("unsupported file type {0}, only JPEG, PNG and WebP are allowed")]
    UnsupportedType(String),
}

/// Errors surfaced by the session and notification layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad credentials or no valid session.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed payload or rejected input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Row is missing or not owned by the caller (not distinguished).
    #[error("Not found: {0}")]
    Ownership(String),

    /// Transport failure or unusable response.
    #[error("Network error: {0}")]
    Network(String),

    /// Client-side pre-check on a file upload; never reaches the network.
    #[error("Upload rejected: {0}")]
    UploadConstraint(#[from] UploadViolation),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// Whether this error should be reported to Sentry.
    ///
    /// User mistakes (bad credentials, invalid input, oversized files) are
    /// expected and only logged.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Storage(_))
    }

    /// Log the error and capture it to Sentry when reportable.
    pub fn report(&self, operation: &str) {
        if self.is_reportable() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                operation,
                sentry_event_id = %event_id,
                "Sync operation failed"
            );
        } else {
            tracing::info!(error = %self, operation, "Sync operation rejected");
        }
    }
}

impl From<GatewayError> for SyncError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Status { status, message } => match status {
                401 => Self::Authentication(message),
                400 | 409 | 422 => Self::Validation(message),
                403 | 404 => Self::Ownership(message),
                _ => Self::Network(format!("HTTP {status}: {message}")),
            },
            GatewayError::Rejected(message) => Self::Validation(message),
            other => Self::Network(other.to_string()),
        }
    }
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Set the Sentry user context from an identity.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a user-issued command.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of commands
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("notifications", "Marked as read", Some(&[("id", "n-42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

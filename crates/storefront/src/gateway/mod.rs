//! Remote gateways: the auth authority and the notification authority.
//!
//! # Architecture
//!
//! The stores never talk HTTP directly. They depend on the [`AuthGateway`]
//! and [`NotificationGateway`] traits, which [`HttpGateway`] implements over
//! `reqwest` and which tests replace with in-memory fakes.
//!
//! Ownership is enforced remotely: a notification that does not exist and
//! one owned by another user both come back as a 404.

mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use izaj_core::{Notification, NotificationId, NotificationKind, NotificationStats, Principal};
use secrecy::SecretString;
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Errors that can occur when talking to a gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The server answered 2xx but flagged the call as unsuccessful.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The configured base URL cannot carry API paths.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl GatewayError {
    /// Message suitable for showing to the user.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Status { message, .. } | Self::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Login credentials.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct Credentials {
    /// Email or phone number.
    pub identifier: String,
    pub password: SecretString,
    pub remember_me: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"[REDACTED]")
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

/// Postal address captured at signup.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SignupAddress {
    pub province: String,
    pub city: String,
    pub barangay: String,
    pub address: String,
}

/// Account registration data.
#[derive(Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: SecretString,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<SignupAddress>,
}

impl RegisterRequest {
    /// Full name as sent to the provider.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("phone", &self.phone)
            .field("address", &self.address)
            .finish()
    }
}

/// Profile fields to change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.phone.is_none()
    }
}

/// A profile picture file ready for upload.
#[derive(Clone)]
pub struct ProfilePictureUpload {
    pub file_name: String,
    /// MIME type, e.g. `image/png`.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ProfilePictureUpload {
    /// Size of the file in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl std::fmt::Debug for ProfilePictureUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilePictureUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Third-party login providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }
}

/// Query for the notification list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFilter {
    pub limit: u32,
    pub offset: u32,
    pub kind: Option<NotificationKind>,
    pub unread_only: bool,
}

impl NotificationFilter {
    /// Default page size used by the server when none is given.
    pub const DEFAULT_LIMIT: u32 = 50;

    /// First page with the given size.
    #[must_use]
    pub const fn first_page(limit: u32) -> Self {
        Self {
            limit,
            offset: 0,
            kind: None,
            unread_only: false,
        }
    }

    /// Query parameters, omitting values equal to the server defaults.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if self.limit != Self::DEFAULT_LIMIT {
            pairs.push(("limit", self.limit.to_string()));
        }
        if self.offset != 0 {
            pairs.push(("offset", self.offset.to_string()));
        }
        if let Some(kind) = self.kind {
            pairs.push(("type", kind.as_str().to_string()));
        }
        if self.unread_only {
            pairs.push(("unread_only", "true".to_string()));
        }
        pairs
    }
}

impl Default for NotificationFilter {
    fn default() -> Self {
        Self::first_page(Self::DEFAULT_LIMIT)
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Remote authentication authority.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Probe the remote session. `None` means no one is logged in.
    async fn current_session(&self) -> Result<Option<Principal>, GatewayError>;

    /// Authenticate and open a remote session.
    async fn login(&self, credentials: &Credentials) -> Result<Principal, GatewayError>;

    /// Invalidate the remote session.
    async fn logout(&self) -> Result<(), GatewayError>;

    /// Create an account. Does not open a session.
    async fn signup(&self, request: &RegisterRequest) -> Result<Principal, GatewayError>;

    /// Persist profile field changes.
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), GatewayError>;

    /// Upload a profile picture, returning its public URL.
    async fn upload_profile_picture(
        &self,
        upload: &ProfilePictureUpload,
    ) -> Result<String, GatewayError>;

    /// Remove the current profile picture.
    async fn remove_profile_picture(&self) -> Result<(), GatewayError>;

    /// Where to send the user to start a third-party login.
    fn oauth_redirect_url(&self, provider: OAuthProvider) -> Result<Url, GatewayError>;

    /// Credential carrying the remote session, for transports that keep one
    /// client-side (a cookie). `None` when there is nothing to carry over.
    fn session_token(&self) -> Option<SecretString> {
        None
    }

    /// Reinstate a token saved by [`Self::session_token`] in an earlier
    /// process.
    fn restore_session_token(&self, _token: &SecretString) {}
}

/// Remote notification authority.
///
/// Every call is scoped to the authenticated caller.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// List notifications, newest first.
    async fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, GatewayError>;

    /// Aggregate counts across all of the caller's notifications.
    async fn stats(&self) -> Result<NotificationStats, GatewayError>;

    /// Set the read flag of one notification, returning the updated row.
    async fn set_read(
        &self,
        id: &NotificationId,
        is_read: bool,
    ) -> Result<Notification, GatewayError>;

    /// Mark every unread notification as read, returning the changed rows.
    async fn mark_all_read(&self) -> Result<Vec<Notification>, GatewayError>;

    /// Delete one notification.
    async fn delete(&self, id: &NotificationId) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_has_no_query() {
        assert!(NotificationFilter::default().query_pairs().is_empty());
    }

    #[test]
    fn test_filter_query_pairs() {
        let filter = NotificationFilter {
            limit: 10,
            offset: 20,
            kind: Some(NotificationKind::Payment),
            unread_only: true,
        };
        assert_eq!(
            filter.query_pairs(),
            vec![
                ("limit", "10".to_string()),
                ("offset", "20".to_string()),
                ("type", "payment".to_string()),
                ("unread_only", "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            identifier: "maria@izaj.ph".to_string(),
            password: SecretString::from("hunter2-but-longer"),
            remember_me: true,
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("maria@izaj.ph"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_register_full_name_trims() {
        let request = RegisterRequest {
            email: "a@izaj.ph".to_string(),
            password: SecretString::from("pw"),
            first_name: " Maria ".to_string(),
            last_name: String::new(),
            phone: None,
            address: None,
        };
        assert_eq!(request.full_name(), "Maria");
    }

    #[test]
    fn test_gateway_error_message() {
        let err = GatewayError::Status {
            status: 404,
            message: "Notification not found".to_string(),
        };
        assert_eq!(err.message(), "Notification not found");
    }
}

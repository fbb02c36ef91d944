//! Authenticated identity types.
//!
//! [`Principal`] is the shape the remote auth provider returns from
//! `/auth/me`, `/auth/login` and `/auth/signup`. [`Identity`] is the
//! client-side snapshot built from it and cached in the local persistence
//! tiers under the `"user"` key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;

/// Remote auth principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Free-form metadata the provider stores alongside the principal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserMetadata {
    /// Full display name as entered at signup.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Set by the custom confirmation flow instead of `email_confirmed_at`.
    #[serde(default, rename = "emailConfirmed")]
    pub email_confirmed: Option<bool>,
}

/// The authenticated principal held client-side.
///
/// Serialized with camelCase keys; this is the exact JSON blob written to the
/// local persistence tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: UserId,
    /// Absent for accounts that log in by phone and never gave an email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl Identity {
    /// Build an identity from a remote principal.
    ///
    /// The principal's single `name` field is split into first and last
    /// name. `identifier` is what the user logged in with: it fills the
    /// email when the principal has none, or the phone when it is not an
    /// email address and the principal has no phone on record.
    #[must_use]
    pub fn from_principal(
        principal: Principal,
        identifier: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let identifier = identifier.map(str::trim).filter(|i| !i.is_empty());
        let email = principal
            .email
            .as_deref()
            .and_then(|e| Email::parse(e).ok())
            .or_else(|| identifier.and_then(|i| Email::parse(i).ok()));

        let phone = principal
            .user_metadata
            .phone
            .filter(|p| !p.trim().is_empty())
            .or_else(|| {
                identifier
                    .filter(|i| !i.contains('@'))
                    .map(String::from)
            })
            .unwrap_or_default();

        let name = principal.user_metadata.name.as_deref().unwrap_or_default();
        let (first_name, last_name) = split_full_name(name);

        let email_verified = principal.email_confirmed_at.is_some()
            || principal.user_metadata.email_confirmed.unwrap_or(false);

        Self {
            id: principal.id,
            email,
            first_name,
            last_name,
            phone,
            email_verified,
            created_at: principal.created_at.unwrap_or(now),
            updated_at: now,
            profile_picture: None,
        }
    }

    /// Email as a plain string, if the account has one.
    #[must_use]
    pub fn email_str(&self) -> Option<&str> {
        self.email.as_ref().map(Email::as_str)
    }

    /// First and last name joined for display.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Split a single display name into `(first, last)`.
///
/// The first whitespace-separated token is the first name; the remaining
/// tokens, joined by single spaces, form the last name.
#[must_use]
pub fn split_full_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

//! In-memory stand-in for the storefront API.
//!
//! Holds accounts, one remote session and every user's notifications, and
//! enforces ownership the way the real API does: rows belonging to someone
//! else are indistinguishable from missing rows (404).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use izaj_core::{
    Notification, NotificationId, NotificationKind, NotificationStats, Principal, UserId,
    UserMetadata,
};
use izaj_storefront::gateway::{
    AuthGateway, Credentials, GatewayError, NotificationFilter, NotificationGateway,
    OAuthProvider, ProfilePictureUpload, ProfileUpdate, RegisterRequest,
};
use secrecy::ExposeSecret;
use url::Url;

/// Gateway operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CurrentSession,
    Login,
    Logout,
    Signup,
    UpdateProfile,
    UploadPicture,
    RemovePicture,
    List,
    Stats,
    SetRead,
    MarkAllRead,
    Delete,
}

#[derive(Debug, Clone)]
struct Account {
    principal: Principal,
    password: String,
    picture: Option<String>,
}

#[derive(Default)]
struct Server {
    accounts: Vec<Account>,
    session: Option<UserId>,
    notifications: Vec<Notification>,
}

/// Fake auth and notification API.
#[derive(Default)]
pub struct FakeGateway {
    server: Mutex<Server>,
    calls: Mutex<HashMap<Op, usize>>,
    failing: Mutex<HashSet<Op>>,
    list_delay: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn status(status: u16, message: &str) -> GatewayError {
    GatewayError::Status {
        status,
        message: message.to_string(),
    }
}

/// Base timestamp for seeded rows; later rows are newer.
fn seeded_at(n: usize) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_000) + TimeDelta::minutes(n as i64)
}

impl FakeGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Register an account directly on the server.
    pub fn add_account(&self, id: &str, email: &str, name: &str, password: &str) -> UserId {
        self.insert_account(id, Some(email), None, name, password)
    }

    /// Register an account that has a phone number but no email.
    pub fn add_phone_account(&self, id: &str, phone: &str, name: &str, password: &str) -> UserId {
        self.insert_account(id, None, Some(phone), name, password)
    }

    fn insert_account(
        &self,
        id: &str,
        email: Option<&str>,
        phone: Option<&str>,
        name: &str,
        password: &str,
    ) -> UserId {
        let user_id = UserId::new(id);
        lock(&self.server).accounts.push(Account {
            principal: Principal {
                id: user_id.clone(),
                email: email.map(String::from),
                user_metadata: UserMetadata {
                    name: Some(name.to_string()),
                    phone: phone.map(String::from),
                    email_confirmed: None,
                },
                email_confirmed_at: email.map(|_| seeded_at(0)),
                created_at: Some(seeded_at(0)),
            },
            password: password.to_string(),
            picture: None,
        });
        user_id
    }

    /// Open a remote session as if a cookie were already present.
    pub fn set_remote_session(&self, user: Option<&UserId>) {
        lock(&self.server).session = user.cloned();
    }

    /// Create `total` notifications for `user`, the first `unread` unread.
    pub fn seed(&self, user: &UserId, total: usize, unread: usize) -> Vec<NotificationId> {
        (0..total)
            .map(|i| {
                let kind = NotificationKind::ALL[i % NotificationKind::ALL.len()];
                self.push(user, kind, i >= unread)
            })
            .collect()
    }

    /// Create one notification on the server.
    pub fn push(&self, user: &UserId, kind: NotificationKind, is_read: bool) -> NotificationId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = NotificationId::new(format!("n-{n}"));
        lock(&self.server).notifications.push(Notification {
            id: id.clone(),
            user_id: user.clone(),
            kind,
            title: format!("{kind} update #{n}"),
            message: format!("Notification body {n}"),
            is_read,
            link: None,
            metadata: None,
            created_at: seeded_at(n),
            updated_at: seeded_at(n),
        });
        id
    }

    /// Server-side copy of one notification.
    #[must_use]
    pub fn notification(&self, id: &NotificationId) -> Option<Notification> {
        lock(&self.server)
            .notifications
            .iter()
            .find(|n| n.id == *id)
            .cloned()
    }

    /// Server-side notifications of `user`.
    #[must_use]
    pub fn notifications_of(&self, user: &UserId) -> Vec<Notification> {
        lock(&self.server)
            .notifications
            .iter()
            .filter(|n| n.user_id == *user)
            .cloned()
            .collect()
    }

    /// Make `op` fail with a 503 until [`Self::recover`] is called.
    pub fn fail(&self, op: Op) {
        lock(&self.failing).insert(op);
    }

    pub fn recover(&self, op: Op) {
        lock(&self.failing).remove(&op);
    }

    /// Delay every list response (use with paused time).
    pub fn delay_list(&self, delay: Option<Duration>) {
        *lock(&self.list_delay) = delay;
    }

    /// How many times `op` was called.
    #[must_use]
    pub fn calls(&self, op: Op) -> usize {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn enter(&self, op: Op) -> Result<(), GatewayError> {
        *lock(&self.calls).entry(op).or_insert(0) += 1;
        if lock(&self.failing).contains(&op) {
            return Err(status(503, "Service unavailable"));
        }
        Ok(())
    }

    fn session_user(&self) -> Result<UserId, GatewayError> {
        lock(&self.server)
            .session
            .clone()
            .ok_or_else(|| status(401, "Unauthorized"))
    }

    fn stats_for(server: &Server, user: &UserId) -> NotificationStats {
        let mut stats = NotificationStats::default().with_all_kinds();
        for n in server.notifications.iter().filter(|n| n.user_id == *user) {
            stats.record_added(n);
        }
        stats
    }
}

#[async_trait]
impl AuthGateway for FakeGateway {
    async fn current_session(&self) -> Result<Option<Principal>, GatewayError> {
        self.enter(Op::CurrentSession)?;
        let server = lock(&self.server);
        Ok(server.session.as_ref().and_then(|id| {
            server
                .accounts
                .iter()
                .find(|a| a.principal.id == *id)
                .map(|a| a.principal.clone())
        }))
    }

    async fn login(&self, credentials: &Credentials) -> Result<Principal, GatewayError> {
        self.enter(Op::Login)?;
        let mut server = lock(&self.server);
        let account = server
            .accounts
            .iter()
            .find(|a| {
                let email_matches = a.principal.email.as_deref() == Some(&credentials.identifier);
                let phone_matches =
                    a.principal.user_metadata.phone.as_deref() == Some(&credentials.identifier);
                (email_matches || phone_matches)
                    && a.password == credentials.password.expose_secret()
            })
            .cloned()
            .ok_or_else(|| status(401, "Invalid login credentials"))?;
        server.session = Some(account.principal.id.clone());
        Ok(account.principal)
    }

    async fn logout(&self) -> Result<(), GatewayError> {
        self.enter(Op::Logout)?;
        lock(&self.server).session = None;
        Ok(())
    }

    async fn signup(&self, request: &RegisterRequest) -> Result<Principal, GatewayError> {
        self.enter(Op::Signup)?;
        let mut server = lock(&self.server);
        if server
            .accounts
            .iter()
            .any(|a| a.principal.email.as_deref() == Some(request.email.as_str()))
        {
            return Err(status(400, "User already registered"));
        }

        let principal = Principal {
            id: UserId::new(uuid::Uuid::new_v4().to_string()),
            email: Some(request.email.clone()),
            user_metadata: UserMetadata {
                name: Some(request.full_name()),
                phone: request.phone.clone(),
                email_confirmed: Some(false),
            },
            email_confirmed_at: None,
            created_at: Some(Utc::now()),
        };
        server.accounts.push(Account {
            principal: principal.clone(),
            password: request.password.expose_secret().to_string(),
            picture: None,
        });
        Ok(principal)
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), GatewayError> {
        self.enter(Op::UpdateProfile)?;
        let user = self.session_user()?;
        let mut server = lock(&self.server);
        let account = server
            .accounts
            .iter_mut()
            .find(|a| a.principal.id == user)
            .ok_or_else(|| status(404, "User not found"))?;
        if let Some(phone) = &update.phone {
            account.principal.user_metadata.phone = Some(phone.clone());
        }
        Ok(())
    }

    async fn upload_profile_picture(
        &self,
        upload: &ProfilePictureUpload,
    ) -> Result<String, GatewayError> {
        self.enter(Op::UploadPicture)?;
        let user = self.session_user()?;
        let url = format!("https://cdn.izaj.test/avatars/{user}/{}", upload.file_name);
        let mut server = lock(&self.server);
        if let Some(account) = server.accounts.iter_mut().find(|a| a.principal.id == user) {
            account.picture = Some(url.clone());
        }
        Ok(url)
    }

    async fn remove_profile_picture(&self) -> Result<(), GatewayError> {
        self.enter(Op::RemovePicture)?;
        let user = self.session_user()?;
        let mut server = lock(&self.server);
        if let Some(account) = server.accounts.iter_mut().find(|a| a.principal.id == user) {
            account.picture = None;
        }
        Ok(())
    }

    fn oauth_redirect_url(&self, provider: OAuthProvider) -> Result<Url, GatewayError> {
        let mut url = Url::parse("https://izaj.test/api/auth/oauth")
            .map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("provider", provider.as_str());
        Ok(url)
    }
}

#[async_trait]
impl NotificationGateway for FakeGateway {
    async fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, GatewayError> {
        self.enter(Op::List)?;
        let user = self.session_user()?;

        let delay = *lock(&self.list_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let server = lock(&self.server);
        let mut rows: Vec<Notification> = server
            .notifications
            .iter()
            .filter(|n| n.user_id == user)
            .filter(|n| filter.kind.is_none_or(|kind| n.kind == kind))
            .filter(|n| !filter.unread_only || !n.is_read)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(rows
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn stats(&self) -> Result<NotificationStats, GatewayError> {
        self.enter(Op::Stats)?;
        let user = self.session_user()?;
        Ok(Self::stats_for(&lock(&self.server), &user))
    }

    async fn set_read(
        &self,
        id: &NotificationId,
        is_read: bool,
    ) -> Result<Notification, GatewayError> {
        self.enter(Op::SetRead)?;
        let user = self.session_user()?;
        let mut server = lock(&self.server);
        let row = server
            .notifications
            .iter_mut()
            .find(|n| n.id == *id && n.user_id == user)
            .ok_or_else(|| status(404, "Notification not found"))?;
        if row.is_read != is_read {
            row.is_read = is_read;
            row.updated_at = Utc::now();
        }
        Ok(row.clone())
    }

    async fn mark_all_read(&self) -> Result<Vec<Notification>, GatewayError> {
        self.enter(Op::MarkAllRead)?;
        let user = self.session_user()?;
        let mut server = lock(&self.server);
        let now = Utc::now();
        Ok(server
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user && !n.is_read)
            .map(|n| {
                n.is_read = true;
                n.updated_at = now;
                n.clone()
            })
            .collect())
    }

    async fn delete(&self, id: &NotificationId) -> Result<(), GatewayError> {
        self.enter(Op::Delete)?;
        let user = self.session_user()?;
        let mut server = lock(&self.server);
        let before = server.notifications.len();
        server
            .notifications
            .retain(|n| !(n.id == *id && n.user_id == user));
        if server.notifications.len() == before {
            return Err(status(404, "Notification not found"));
        }
        Ok(())
    }
}

//! Authentication session service.
//!
//! [`AuthSessionManager`] owns the client-side identity: it hydrates it on
//! startup, replaces it on login, clears it on logout, and applies profile
//! changes once the remote authority has confirmed them.
//!
//! The identity is published through a `tokio::sync::watch` channel so the
//! notification store (and any UI) can follow it without polling.

mod upload;

pub use upload::{
    ALLOWED_CONTENT_TYPES, MAX_PROFILE_PICTURE_BYTES, check_upload, content_type_for_path,
};

use std::sync::Arc;

use chrono::Utc;
use izaj_core::{Email, Identity, UserId};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{Result, SyncError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::gateway::{
    AuthGateway, Credentials, GatewayError, OAuthProvider, ProfilePictureUpload, ProfileUpdate,
    RegisterRequest,
};
use crate::models::SessionPersistenceTier;
use crate::session::SessionStore;

/// Owns the authenticated identity and its persistence.
pub struct AuthSessionManager {
    gateway: Arc<dyn AuthGateway>,
    sessions: SessionStore,
    identity: watch::Sender<Option<Identity>>,
    loading: watch::Sender<bool>,
}

/// Holds the loading flag up until dropped.
struct LoadingGuard<'a>(&'a watch::Sender<bool>);

impl<'a> LoadingGuard<'a> {
    fn new(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl AuthSessionManager {
    /// Create a manager with no identity.
    ///
    /// `is_loading` starts `true` and stays there until [`Self::hydrate`]
    /// completes.
    #[must_use]
    pub fn new(gateway: Arc<dyn AuthGateway>, sessions: SessionStore) -> Self {
        let (identity, _) = watch::channel(None);
        let (loading, _) = watch::channel(true);
        Self {
            gateway,
            sessions,
            identity,
            loading,
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Follow identity changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    /// Current identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.borrow().is_some()
    }

    /// Whether hydration is still in progress.
    ///
    /// Dependents should not render a logged-out state while this is `true`.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Wait until hydration has finished.
    pub async fn wait_until_hydrated(&self) {
        let mut loading = self.loading.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = loading.wait_for(|loading| !*loading).await;
    }

    /// The local session store backing this manager.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Restore the identity on startup.
    ///
    /// Sources are tried in order and the first hit wins: the remembered
    /// snapshot, the ephemeral snapshot, then the remote session probe. A
    /// local hit never touches the network; it hands any saved session
    /// credential back to the gateway instead.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Option<Identity> {
        let _loading = LoadingGuard::new(&self.loading);

        if let Some((tier, identity)) = self.sessions.lookup() {
            debug!(%tier, user_id = %identity.id, "Hydrated from local snapshot");
            self.restore_remote_session();
            self.publish(identity.clone());
            return Some(identity);
        }

        let principal = match self.gateway.current_session().await {
            Ok(Some(principal)) => principal,
            Ok(None) => {
                debug!("No remote session");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Remote session probe failed");
                return None;
            }
        };

        let identity = Identity::from_principal(principal, None, Utc::now());

        // A login that finished while the probe was in flight wins.
        let published = self.identity.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(identity.clone());
            true
        });
        if !published {
            debug!("Identity set during remote probe, discarding probe result");
            return self.identity();
        }

        if let Err(e) = self
            .sessions
            .persist(SessionPersistenceTier::Remembered, &identity)
        {
            SyncError::from(e).report("hydrate");
        }
        self.remember_remote_session("hydrate");
        set_sentry_user(&identity.id, identity.email_str());
        info!(user_id = %identity.id, "Hydrated from remote session");
        Some(identity)
    }

    /// Log in and persist the identity into the tier chosen by `remember_me`.
    ///
    /// The other tier is purged so no stale snapshot survives. A remembered
    /// login also saves the remote session credential.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Authentication` if the credentials are rejected,
    /// `SyncError::Validation` if they are blank, or `SyncError::Network` if
    /// the auth service is unreachable.
    #[instrument(skip(self, identifier, password), fields(identifier = %identifier))]
    pub async fn login(
        &self,
        identifier: &str,
        password: SecretString,
        remember_me: bool,
    ) -> Result<Identity> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.expose_secret().is_empty() {
            return Err(SyncError::Validation(
                "Email or phone and password are required".to_string(),
            ));
        }

        add_breadcrumb(
            "auth",
            "Login attempt",
            Some(&[("remember_me", bool_str(remember_me))][..]),
        );

        let credentials = Credentials {
            identifier: identifier.to_string(),
            password,
            remember_me,
        };
        let principal = self
            .gateway
            .login(&credentials)
            .await
            .map_err(login_error)?;

        let identity = Identity::from_principal(principal, Some(identifier), Utc::now());

        let tier = SessionPersistenceTier::for_remember_me(remember_me);
        if let Err(e) = self.sessions.persist(tier, &identity) {
            // The session stays usable for this process.
            SyncError::from(e).report("login");
        }
        if tier == SessionPersistenceTier::Remembered {
            self.remember_remote_session("login");
        }

        self.publish(identity.clone());
        info!(user_id = %identity.id, %tier, "User logged in");
        Ok(identity)
    }

    /// Build the redirect URL for a third-party login.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Network` if the gateway cannot build the URL.
    pub fn login_with_provider(&self, provider: OAuthProvider) -> Result<Url> {
        Ok(self.gateway.oauth_redirect_url(provider)?)
    }

    /// Log out.
    ///
    /// Local state is cleared first and unconditionally. The remote logout is
    /// best effort and its failure is only logged.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let previous = self.identity.send_replace(None);
        if let Err(e) = self.sessions.clear_all() {
            SyncError::from(e).report("logout");
        }
        clear_sentry_user();

        if let Some(identity) = &previous {
            info!(user_id = %identity.id, "User logged out");
        }

        if let Err(e) = self.gateway.logout().await {
            warn!(error = %e, "Remote logout failed, ignoring");
        }
    }

    /// Create an account. Does not log in.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Validation` for invalid input or when the auth
    /// service rejects the signup (its message is surfaced verbatim), or
    /// `SyncError::Network` if the auth service is unreachable.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        Email::parse(&request.email)
            .map_err(|e| SyncError::Validation(format!("Invalid email: {e}")))?;
        if request.password.expose_secret().is_empty() {
            return Err(SyncError::Validation("Password is required".to_string()));
        }
        if request.full_name().is_empty() {
            return Err(SyncError::Validation("Name is required".to_string()));
        }

        add_breadcrumb("auth", "Registration", None);

        let principal = self
            .gateway
            .signup(request)
            .await
            .map_err(register_error)?;

        info!(user_id = %principal.id, "Account registered");
        Ok(())
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Change profile fields once the remote authority accepts them.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Authentication` when logged out, or the mapped
    /// gateway error. The identity is untouched on failure.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Identity> {
        let current = self.require_identity()?;
        if update.is_empty() {
            return Ok(current);
        }

        self.gateway.update_profile(&update).await?;

        self.apply_confirmed(&current.id, "update_profile", |identity| {
            if let Some(first_name) = update.first_name {
                identity.first_name = first_name;
            }
            if let Some(last_name) = update.last_name {
                identity.last_name = last_name;
            }
            if let Some(phone) = update.phone {
                identity.phone = phone;
            }
        })
    }

    /// Upload a new profile picture and return its URL.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UploadConstraint` before any network call when
    /// the file is too large or not an accepted image type. On a remote
    /// failure the previous picture is left in place.
    #[instrument(skip(self, upload), fields(size = upload.size(), content_type = %upload.content_type))]
    pub async fn upload_profile_picture(&self, upload: &ProfilePictureUpload) -> Result<String> {
        check_upload(upload)?;
        let current = self.require_identity()?;

        let url = self.gateway.upload_profile_picture(upload).await?;

        self.apply_confirmed(&current.id, "upload_profile_picture", |identity| {
            identity.profile_picture = Some(url.clone());
        })?;
        Ok(url)
    }

    /// Remove the profile picture.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Authentication` when logged out, or the mapped
    /// gateway error.
    #[instrument(skip(self))]
    pub async fn remove_profile_picture(&self) -> Result<()> {
        let current = self.require_identity()?;

        self.gateway.remove_profile_picture().await?;

        self.apply_confirmed(&current.id, "remove_profile_picture", |identity| {
            identity.profile_picture = None;
        })?;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn require_identity(&self) -> Result<Identity> {
        self.identity()
            .ok_or_else(|| SyncError::Authentication("Not logged in".to_string()))
    }

    /// Save the gateway's session credential so a restart can reuse it.
    fn remember_remote_session(&self, operation: &str) {
        let Some(token) = self.gateway.session_token() else {
            return;
        };
        if let Err(e) = self.sessions.save_remote_session(&token) {
            SyncError::from(e).report(operation);
        }
    }

    /// Hand a saved session credential back to the gateway.
    fn restore_remote_session(&self) {
        match self.sessions.remote_session() {
            Ok(Some(token)) => self.gateway.restore_session_token(&token),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read saved remote session"),
        }
    }

    fn publish(&self, identity: Identity) {
        set_sentry_user(&identity.id, identity.email_str());
        self.identity.send_replace(Some(identity));
    }

    /// Apply a remotely confirmed change to the identity of `user_id`.
    ///
    /// Fails if the session changed hands while the remote call was running.
    fn apply_confirmed(
        &self,
        user_id: &UserId,
        operation: &str,
        change: impl FnOnce(&mut Identity),
    ) -> Result<Identity> {
        let mut updated = None;
        self.identity.send_if_modified(|current| match current {
            Some(identity) if identity.id == *user_id => {
                change(identity);
                identity.updated_at = Utc::now();
                updated = Some(identity.clone());
                true
            }
            _ => false,
        });

        let Some(identity) = updated else {
            warn!(%user_id, operation, "Session changed before the update was applied");
            return Err(SyncError::Authentication(
                "Session ended during the update".to_string(),
            ));
        };

        if let Err(e) = self.sessions.rewrite(&identity) {
            SyncError::from(e).report(operation);
        }
        Ok(identity)
    }
}

const fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Login rejections are authentication failures whatever the status.
fn login_error(err: GatewayError) -> SyncError {
    match err {
        GatewayError::Status {
            status: 400 | 401 | 403,
            message,
        }
        | GatewayError::Rejected(message) => SyncError::Authentication(message),
        other => other.into(),
    }
}

/// Signup rejections carry a user-facing message.
fn register_error(err: GatewayError) -> SyncError {
    match err {
        GatewayError::Status {
            status: 400..=499,
            message,
        }
        | GatewayError::Rejected(message) => SyncError::Validation(message),
        other => other.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use izaj_core::{Principal, UserMetadata};

    use super::*;
    use crate::models::session::keys;
    use crate::session::{KeyValueStorage, MemoryStorage};

    #[derive(Default)]
    struct StubAuth {
        remote: Mutex<Option<Principal>>,
        reject_login: bool,
        probes: AtomicUsize,
        uploads: AtomicUsize,
        restored: Mutex<Option<String>>,
    }

    fn principal(id: &str) -> Principal {
        Principal {
            id: UserId::new(id),
            email: Some(format!("{id}@izaj.ph")),
            user_metadata: UserMetadata {
                name: Some("Maria Clara Santos".to_string()),
                phone: None,
                email_confirmed: Some(true),
            },
            email_confirmed_at: None,
            created_at: None,
        }
    }

    #[async_trait]
    impl AuthGateway for StubAuth {
        async fn current_session(&self) -> std::result::Result<Option<Principal>, GatewayError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.remote.lock().unwrap().clone())
        }

        async fn login(&self, creds: &Credentials) -> std::result::Result<Principal, GatewayError> {
            if self.reject_login {
                return Err(GatewayError::Status {
                    status: 401,
                    message: "Invalid login credentials".to_string(),
                });
            }
            let principal = principal(creds.identifier.split('@').next().unwrap());
            *self.remote.lock().unwrap() = Some(principal.clone());
            Ok(principal)
        }

        async fn logout(&self) -> std::result::Result<(), GatewayError> {
            Err(GatewayError::Status {
                status: 503,
                message: "down".to_string(),
            })
        }

        async fn signup(&self, req: &RegisterRequest) -> std::result::Result<Principal, GatewayError> {
            Err(GatewayError::Status {
                status: 400,
                message: format!("User {} already registered", req.email),
            })
        }

        async fn update_profile(&self, _: &ProfileUpdate) -> std::result::Result<(), GatewayError> {
            Ok(())
        }

        async fn upload_profile_picture(
            &self,
            _: &ProfilePictureUpload,
        ) -> std::result::Result<String, GatewayError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok("https://cdn.izaj.ph/avatars/u.png".to_string())
        }

        async fn remove_profile_picture(&self) -> std::result::Result<(), GatewayError> {
            Ok(())
        }

        fn oauth_redirect_url(&self, provider: OAuthProvider) -> std::result::Result<Url, GatewayError> {
            Ok(Url::parse(&format!("https://izaj.ph/api/auth/oauth?provider={}", provider.as_str())).unwrap())
        }

        fn session_token(&self) -> Option<SecretString> {
            let remote = self.remote.lock().unwrap();
            remote
                .as_ref()
                .map(|p| SecretString::from(format!("sid={}", p.id)))
        }

        fn restore_session_token(&self, token: &SecretString) {
            *self.restored.lock().unwrap() = Some(token.expose_secret().to_string());
        }
    }

    struct Harness {
        manager: AuthSessionManager,
        gateway: Arc<StubAuth>,
        remembered: Arc<MemoryStorage>,
        ephemeral: Arc<MemoryStorage>,
    }

    fn harness(gateway: StubAuth) -> Harness {
        let gateway = Arc::new(gateway);
        let remembered = Arc::new(MemoryStorage::new());
        let ephemeral = Arc::new(MemoryStorage::new());
        let sessions = SessionStore::new(remembered.clone(), ephemeral.clone());
        Harness {
            manager: AuthSessionManager::new(gateway.clone(), sessions),
            gateway,
            remembered,
            ephemeral,
        }
    }

    #[tokio::test]
    async fn test_login_splits_name_and_persists_tier() {
        let h = harness(StubAuth::default());
        let identity = h
            .manager
            .login("maria@izaj.ph", SecretString::from("pw"), false)
            .await
            .unwrap();

        assert_eq!(identity.first_name, "Maria");
        assert_eq!(identity.last_name, "Clara Santos");
        assert!(identity.email_verified);
        assert!(h.ephemeral.get(keys::USER).unwrap().is_some());
        assert!(h.remembered.get(keys::REMEMBER_ME).unwrap().is_none());
        assert_eq!(h.manager.identity(), Some(identity));
    }

    #[tokio::test]
    async fn test_login_rejected_is_authentication_error() {
        let h = harness(StubAuth {
            reject_login: true,
            ..StubAuth::default()
        });
        let err = h
            .manager
            .login("maria@izaj.ph", SecretString::from("wrong"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Authentication(m) if m == "Invalid login credentials"));
        assert!(!h.manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_hydrate_local_hit_skips_remote_check() {
        let h = harness(StubAuth::default());
        *h.gateway.remote.lock().unwrap() = Some(principal("remote"));
        h.manager
            .login("local@izaj.ph", SecretString::from("pw"), true)
            .await
            .unwrap();

        let fresh = AuthSessionManager::new(
            h.gateway.clone(),
            SessionStore::new(h.remembered.clone(), h.ephemeral.clone()),
        );
        assert!(fresh.is_loading());
        let identity = fresh.hydrate().await.unwrap();
        assert_eq!(identity.id.as_str(), "local");
        assert_eq!(h.gateway.probes.load(Ordering::SeqCst), 0);
        assert!(!fresh.is_loading());
    }

    #[tokio::test]
    async fn test_remembered_login_carries_remote_session_across_restart() {
        let h = harness(StubAuth::default());
        h.manager
            .login("maria@izaj.ph", SecretString::from("pw"), true)
            .await
            .unwrap();
        assert_eq!(
            h.remembered.get(keys::REMOTE_SESSION).unwrap().as_deref(),
            Some("sid=maria")
        );

        let restarted = Arc::new(StubAuth::default());
        let fresh = AuthSessionManager::new(
            restarted.clone(),
            SessionStore::new(h.remembered.clone(), Arc::new(MemoryStorage::new())),
        );
        fresh.hydrate().await.unwrap();
        assert_eq!(restarted.restored.lock().unwrap().as_deref(), Some("sid=maria"));

        fresh.logout().await;
        assert!(h.remembered.get(keys::REMOTE_SESSION).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ephemeral_login_saves_no_remote_session() {
        let h = harness(StubAuth::default());
        h.manager
            .login("maria@izaj.ph", SecretString::from("pw"), false)
            .await
            .unwrap();
        assert!(h.remembered.get(keys::REMOTE_SESSION).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hydrate_remote_persists_remembered() {
        let h = harness(StubAuth::default());
        *h.gateway.remote.lock().unwrap() = Some(principal("remote"));

        let identity = h.manager.hydrate().await.unwrap();
        assert_eq!(identity.id.as_str(), "remote");
        assert_eq!(h.manager.sessions().active_tier(), SessionPersistenceTier::Remembered);
    }

    #[tokio::test]
    async fn test_hydrate_miss_clears_loading() {
        let h = harness(StubAuth::default());
        assert!(h.manager.hydrate().await.is_none());
        assert!(!h.manager.is_loading());
        h.manager.wait_until_hydrated().await;
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_remote_fails() {
        let h = harness(StubAuth::default());
        h.remembered.set(keys::CART, "[]").unwrap();
        h.manager
            .login("maria@izaj.ph", SecretString::from("pw"), true)
            .await
            .unwrap();

        h.manager.logout().await;
        assert!(h.manager.identity().is_none());
        assert!(h.manager.sessions().lookup().is_none());
        assert!(h.remembered.get(keys::CART).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_surfaces_message_and_stays_logged_out() {
        let h = harness(StubAuth::default());
        let request = RegisterRequest {
            email: "maria@izaj.ph".to_string(),
            password: SecretString::from("pw"),
            first_name: "Maria".to_string(),
            last_name: "Santos".to_string(),
            phone: None,
            address: None,
        };
        let err = h.manager.register(&request).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(m) if m == "User maria@izaj.ph already registered"));
        assert!(!h.manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_register_validates_locally() {
        let h = harness(StubAuth::default());
        let request = RegisterRequest {
            email: "not-an-email".to_string(),
            password: SecretString::from("pw"),
            first_name: "Maria".to_string(),
            last_name: String::new(),
            phone: None,
            address: None,
        };
        assert!(matches!(
            h.manager.register(&request).await,
            Err(SyncError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_profile_rewrites_canonical_tier() {
        let h = harness(StubAuth::default());
        h.manager
            .login("maria@izaj.ph", SecretString::from("pw"), false)
            .await
            .unwrap();

        let identity = h
            .manager
            .update_profile(ProfileUpdate {
                phone: Some("09171234567".to_string()),
                ..ProfileUpdate::default()
            })
            .await
            .unwrap();

        assert_eq!(identity.phone, "09171234567");
        let (tier, stored) = h.manager.sessions().lookup().unwrap();
        assert_eq!(tier, SessionPersistenceTier::Ephemeral);
        assert_eq!(stored.phone, "09171234567");
    }

    #[tokio::test]
    async fn test_upload_oversized_never_reaches_gateway() {
        let h = harness(StubAuth::default());
        h.manager
            .login("maria@izaj.ph", SecretString::from("pw"), false)
            .await
            .unwrap();

        let upload = ProfilePictureUpload {
            file_name: "big.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0; 6_000_000],
        };
        assert!(matches!(
            h.manager.upload_profile_picture(&upload).await,
            Err(SyncError::UploadConstraint(_))
        ));
        assert_eq!(h.gateway.uploads.load(Ordering::SeqCst), 0);
        assert!(h.manager.identity().unwrap().profile_picture.is_none());
    }

    #[tokio::test]
    async fn test_profile_mutation_requires_login() {
        let h = harness(StubAuth::default());
        assert!(matches!(
            h.manager.remove_profile_picture().await,
            Err(SyncError::Authentication(_))
        ));
    }

    #[test]
    fn test_login_with_provider() {
        let h = harness(StubAuth::default());
        let url = h.manager.login_with_provider(OAuthProvider::Google).unwrap();
        assert_eq!(url.query(), Some("provider=google"));
    }
}

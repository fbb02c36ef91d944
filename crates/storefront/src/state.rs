//! Client context shared across the application.
//!
//! [`StorefrontClient`] is built once at startup and handed to every consumer.
//! It owns the session store, the auth manager and the notification store,
//! and gives them an explicit `init()` / `dispose()` lifecycle.

use std::sync::Arc;

use tracing::info;

use crate::config::ClientConfig;
use crate::gateway::{AuthGateway, GatewayError, HttpGateway, NotificationGateway};
use crate::scheduler::Scheduler;
use crate::services::{
    AuthSessionManager, NoopObserver, NotificationObserver, NotificationSettings,
    NotificationStore,
};
use crate::session::{FileStorage, KeyValueStorage, MemoryStorage, SessionStore};

/// Everything needed to assemble a client without going through HTTP.
pub struct ClientParts {
    pub auth_gateway: Arc<dyn AuthGateway>,
    pub notification_gateway: Arc<dyn NotificationGateway>,
    pub remembered: Arc<dyn KeyValueStorage>,
    pub ephemeral: Arc<dyn KeyValueStorage>,
    pub settings: NotificationSettings,
    pub observer: Arc<dyn NotificationObserver>,
}

impl ClientParts {
    /// Parts using one gateway for both roles and in-memory storage.
    pub fn with_gateway<G>(gateway: Arc<G>) -> Self
    where
        G: AuthGateway + NotificationGateway + 'static,
    {
        Self {
            auth_gateway: gateway.clone(),
            notification_gateway: gateway,
            remembered: Arc::new(MemoryStorage::new()),
            ephemeral: Arc::new(MemoryStorage::new()),
            settings: NotificationSettings::default(),
            observer: Arc::new(NoopObserver),
        }
    }
}

/// Session and notification client.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    sessions: SessionStore,
    auth: Arc<AuthSessionManager>,
    notifications: Arc<NotificationStore>,
}

impl StorefrontClient {
    /// Build a client talking to the configured API.
    ///
    /// The remembered tier lives in `<state_dir>/session.json`; the ephemeral
    /// tier lives in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(
        config: &ClientConfig,
        observer: Arc<dyn NotificationObserver>,
    ) -> Result<Self, GatewayError> {
        let gateway = Arc::new(HttpGateway::new(
            &config.api_base_url,
            config.request_timeout,
        )?);

        Ok(Self::from_parts(ClientParts {
            auth_gateway: gateway.clone(),
            notification_gateway: gateway,
            remembered: Arc::new(FileStorage::in_dir(&config.state_dir)),
            ephemeral: Arc::new(MemoryStorage::new()),
            settings: NotificationSettings {
                poll_interval: config.poll_interval,
                page_size: config.notification_page_size,
            },
            observer,
        }))
    }

    /// Build a client from explicit parts.
    #[must_use]
    pub fn from_parts(parts: ClientParts) -> Self {
        let sessions = SessionStore::new(parts.remembered, parts.ephemeral);
        let auth = Arc::new(AuthSessionManager::new(
            parts.auth_gateway,
            sessions.clone(),
        ));
        let notifications = Arc::new(NotificationStore::new(
            parts.notification_gateway,
            auth.subscribe(),
            parts.settings,
            parts.observer,
        ));

        Self {
            inner: Arc::new(StorefrontClientInner {
                sessions,
                auth,
                notifications,
            }),
        }
    }

    /// Start following the identity, then hydrate it.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn init(&self) {
        self.inner.notifications.start(&Scheduler::current());
        let identity = self.inner.auth.hydrate().await;
        info!(
            authenticated = identity.is_some(),
            "Storefront client initialized"
        );
    }

    /// Stop background work.
    pub fn dispose(&self) {
        self.inner.notifications.dispose();
    }

    /// Get a reference to the auth manager.
    #[must_use]
    pub fn auth(&self) -> &AuthSessionManager {
        &self.inner.auth
    }

    /// Get a reference to the notification store.
    #[must_use]
    pub fn notifications(&self) -> &NotificationStore {
        &self.inner.notifications
    }

    /// Get a reference to the local session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }
}

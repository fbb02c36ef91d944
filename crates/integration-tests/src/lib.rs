//! Integration tests for the IZAJ storefront client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p izaj-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_tiers` - login, hydration and logout across persistence tiers
//! - `notification_sync` - feed commands, stats authority and polling
//! - `http_gateway` - wire behavior against a local axum server
//!
//! Store-level tests run against [`FakeGateway`]; only the HTTP tests open a
//! socket.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex, PoisonError};

use izaj_core::UserId;
use izaj_storefront::services::{NotificationObserver, NotificationSettings, NotificationSnapshot};
use izaj_storefront::session::MemoryStorage;
use izaj_storefront::{ClientParts, StorefrontClient};
use url::Url;

mod fake;

pub use fake::{FakeGateway, Op};

/// Seeded account used by most tests.
pub const MARIA: Account = Account {
    id: "u-maria",
    email: "maria@izaj.ph",
    name: "Maria Santos",
    password: "sampaguita-42",
};

/// Second account, for ownership and account-switch tests.
pub const JUAN: Account = Account {
    id: "u-juan",
    email: "juan@izaj.ph",
    name: "Juan dela Cruz",
    password: "narra-7",
};

#[derive(Debug, Clone, Copy)]
pub struct Account {
    pub id: &'static str,
    pub email: &'static str,
    pub name: &'static str,
    pub password: &'static str,
}

impl Account {
    #[must_use]
    pub fn user_id(&self) -> UserId {
        UserId::new(self.id)
    }
}

/// Observer keeping every snapshot it was handed.
#[derive(Default)]
pub struct RecordingObserver {
    snapshots: Mutex<Vec<NotificationSnapshot>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn snapshots(&self) -> Vec<NotificationSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<NotificationSnapshot> {
        self.snapshots().pop()
    }
}

impl NotificationObserver for RecordingObserver {
    fn on_change(&self, snapshot: &NotificationSnapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
    }
}

/// A client wired to a [`FakeGateway`] and in-memory storage.
pub struct TestContext {
    pub client: StorefrontClient,
    pub gateway: Arc<FakeGateway>,
    pub remembered: Arc<MemoryStorage>,
    pub ephemeral: Arc<MemoryStorage>,
    pub observer: Arc<RecordingObserver>,
}

impl TestContext {
    /// Fresh client; the server knows [`MARIA`] and [`JUAN`].
    #[must_use]
    pub fn new() -> Self {
        let gateway = Arc::new(FakeGateway::new());
        for account in [MARIA, JUAN] {
            gateway.add_account(account.id, account.email, account.name, account.password);
        }
        Self::with_gateway(gateway, NotificationSettings::default())
    }

    /// Client over an existing gateway with fresh local storage.
    #[must_use]
    pub fn with_gateway(gateway: Arc<FakeGateway>, settings: NotificationSettings) -> Self {
        Self::with_storage(
            gateway,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            settings,
        )
    }

    /// Client over existing gateway and storage, as after a restart.
    #[must_use]
    pub fn with_storage(
        gateway: Arc<FakeGateway>,
        remembered: Arc<MemoryStorage>,
        ephemeral: Arc<MemoryStorage>,
        settings: NotificationSettings,
    ) -> Self {
        let observer = Arc::new(RecordingObserver::default());
        let client = StorefrontClient::from_parts(ClientParts {
            auth_gateway: gateway.clone(),
            notification_gateway: gateway.clone(),
            remembered: remembered.clone(),
            ephemeral: ephemeral.clone(),
            settings,
            observer: observer.clone(),
        });

        Self {
            client,
            gateway,
            remembered,
            ephemeral,
            observer,
        }
    }

    /// Log in as `account`.
    pub async fn login(&self, account: Account, remember_me: bool) {
        self.client
            .auth()
            .login(account.email, account.password.to_string().into(), remember_me)
            .await
            .expect("login should succeed");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Serve `router` on an ephemeral local port and return its `/api/` base URL.
pub async fn spawn_server(router: axum::Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    Url::parse(&format!("http://{addr}/api/")).expect("server url")
}

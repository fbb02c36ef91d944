//! Notification feed synchronization.
//!
//! # Architecture
//!
//! [`NotificationStore`] is the single writer of the local notification list
//! and the aggregate stats. It follows the identity published by the auth
//! manager:
//!
//! - identity appears (or changes user) - state is reset and a poll starts;
//!   its first tick runs immediately, later ticks every poll interval
//! - identity disappears - the poll is cancelled and state is cleared
//!
//! Every identity transition bumps a session epoch. Remote results are only
//! applied when the epoch and user captured before the call still match, so
//! a fetch that was in flight during logout never writes into the next
//! session.
//!
//! The list is always replaced wholesale from the server. Stats are only
//! ever taken from the server, except for [`NotificationStore::add_notification`].

mod observer;

pub use observer::{NoopObserver, NotificationObserver, NotificationSnapshot};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use izaj_core::{Identity, Notification, NotificationId, NotificationStats, UserId};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError, add_breadcrumb};
use crate::gateway::{NotificationFilter, NotificationGateway};
use crate::scheduler::{ScheduledTask, Scheduler};

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Polling and paging knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationSettings {
    pub poll_interval: Duration,
    /// Page size used by the poll and by fetches without a filter.
    pub page_size: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            page_size: NotificationFilter::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    notifications: Vec<Notification>,
    stats: Option<NotificationStats>,
    inflight: usize,
    last_error: Option<String>,
}

/// Session a remote call was started under.
#[derive(Debug, Clone)]
struct Ticket {
    epoch: u64,
    user_id: UserId,
}

/// Owns the notification list and stats for the current identity.
pub struct NotificationStore {
    gateway: Arc<dyn NotificationGateway>,
    identity: watch::Receiver<Option<Identity>>,
    state: RwLock<State>,
    epoch: AtomicU64,
    observer: Arc<dyn NotificationObserver>,
    settings: NotificationSettings,
    watcher: Mutex<Option<ScheduledTask>>,
    poll: Mutex<Option<ScheduledTask>>,
}

/// Keeps the in-flight counter raised while a fetch runs.
struct LoadingGuard<'a>(&'a NotificationStore);

impl<'a> LoadingGuard<'a> {
    fn new(store: &'a NotificationStore) -> Self {
        store.write_state().inflight += 1;
        store.notify();
        Self(store)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.0.write_state();
            state.inflight = state.inflight.saturating_sub(1);
        }
        self.0.notify();
    }
}

impl NotificationStore {
    /// Create a store following `identity`.
    ///
    /// Nothing runs until [`Self::start`] is called.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        identity: watch::Receiver<Option<Identity>>,
        settings: NotificationSettings,
        observer: Arc<dyn NotificationObserver>,
    ) -> Self {
        Self {
            gateway,
            identity,
            state: RwLock::new(State::default()),
            epoch: AtomicU64::new(0),
            observer,
            settings,
            watcher: Mutex::new(None),
            poll: Mutex::new(None),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> NotificationSnapshot {
        let state = self.read_state();
        NotificationSnapshot {
            notifications: state.notifications.clone(),
            stats: state.stats.clone(),
            is_loading: state.inflight > 0,
            last_error: state.last_error.clone(),
        }
    }

    /// Whether a poll task is currently scheduled.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        lock(&self.poll)
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Replace the local list with the server's.
    ///
    /// Without a filter, the first page of the configured size is fetched.
    /// Does nothing when logged out.
    ///
    /// # Errors
    ///
    /// Returns the mapped gateway error; it is also recorded as `last_error`.
    pub async fn fetch_notifications(&self, filter: Option<NotificationFilter>) -> Result<()> {
        self.fetch(filter).await.inspect_err(|e| e.report("fetch_notifications"))
    }

    /// Mark one notification as read.
    ///
    /// The local row flips immediately. Stats are refreshed afterwards
    /// whatever the remote outcome; a remote failure does not undo the local
    /// change.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Authentication` when logged out, or the mapped
    /// gateway error (also recorded as `last_error`).
    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn mark_as_read(&self, id: &NotificationId) -> Result<()> {
        let ticket = self.require_ticket()?;
        add_breadcrumb("notifications", "Mark as read", Some(&[("id", id.as_str())][..]));

        self.apply(&ticket, |state| {
            if let Some(row) = state.notifications.iter_mut().find(|n| n.id == *id) {
                row.is_read = true;
            }
        });

        let result = match self.gateway.set_read(id, true).await {
            Ok(updated) => {
                self.apply(&ticket, |state| {
                    if let Some(row) = state.notifications.iter_mut().find(|n| n.id == updated.id) {
                        *row = updated;
                    }
                });
                Ok(())
            }
            Err(e) => Err(self.fail(&ticket, "mark_as_read", e.into())),
        };

        let _ = self.refresh_stats().await;
        result
    }

    /// Mark every notification as read once the server confirms.
    ///
    /// Nothing changes locally on failure.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Authentication` when logged out, or the mapped
    /// gateway error (also recorded as `last_error`).
    #[instrument(skip(self))]
    pub async fn mark_all_as_read(&self) -> Result<()> {
        let ticket = self.require_ticket()?;
        add_breadcrumb("notifications", "Mark all as read", None);

        let changed = match self.gateway.mark_all_read().await {
            Ok(changed) => changed,
            Err(e) => return Err(self.fail(&ticket, "mark_all_as_read", e.into())),
        };

        self.apply(&ticket, |state| {
            for row in &mut state.notifications {
                row.is_read = true;
            }
        });
        debug!(changed = changed.len(), "Marked all notifications as read");

        let _ = self.refresh_stats().await;
        Ok(())
    }

    /// Delete a notification once the server confirms.
    ///
    /// A missing id and an id owned by someone else fail the same way.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Authentication` when logged out, or the mapped
    /// gateway error (also recorded as `last_error`).
    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn delete_notification(&self, id: &NotificationId) -> Result<()> {
        let ticket = self.require_ticket()?;
        add_breadcrumb("notifications", "Delete", Some(&[("id", id.as_str())][..]));

        if let Err(e) = self.gateway.delete(id).await {
            return Err(self.fail(&ticket, "delete_notification", e.into()));
        }

        self.apply(&ticket, |state| state.notifications.retain(|n| n.id != *id));
        let _ = self.refresh_stats().await;
        Ok(())
    }

    /// Replace the stats with the server's.
    ///
    /// Failures are logged but never recorded as `last_error`.
    ///
    /// # Errors
    ///
    /// Returns the mapped gateway error.
    pub async fn refresh_stats(&self) -> Result<()> {
        let Some(ticket) = self.ticket() else {
            return Ok(());
        };

        match self.gateway.stats().await {
            Ok(stats) => {
                self.apply(&ticket, |state| state.stats = Some(stats.with_all_kinds()));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh notification stats");
                Err(e.into())
            }
        }
    }

    /// Inject an externally delivered notification.
    ///
    /// Prepends it and bumps the stats directly. Notifications for anyone
    /// but the current user are dropped. Returns whether it was accepted.
    pub fn add_notification(&self, notification: Notification) -> bool {
        let Some(ticket) = self.ticket() else {
            debug!("Dropping injected notification while logged out");
            return false;
        };
        if notification.user_id != ticket.user_id {
            warn!(
                notification_user = %notification.user_id,
                "Dropping injected notification for another user"
            );
            return false;
        }

        self.apply(&ticket, |state| {
            if let Some(stats) = state.stats.as_mut() {
                stats.record_added(&notification);
            }
            state.notifications.insert(0, notification);
        })
    }

    /// Forget the last error.
    pub fn clear_error(&self) {
        let cleared = self.write_state().last_error.take().is_some();
        if cleared {
            self.notify();
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start following the identity.
    ///
    /// Calling it again replaces the previous watcher.
    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) {
        let store = Arc::downgrade(self);
        let mut identity = self.identity.clone();
        let poll_scheduler = scheduler.clone();

        let watcher = scheduler.spawn(async move {
            let mut current: Option<UserId> = None;
            loop {
                let user = identity.borrow_and_update().as_ref().map(|i| i.id.clone());
                if user != current {
                    let Some(this) = store.upgrade() else { break };
                    this.on_identity_changed(user.as_ref(), &poll_scheduler);
                    current = user;
                }
                if identity.changed().await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = lock(&self.watcher).replace(watcher) {
            previous.cancel();
        }
    }

    /// Stop the watcher and any poll. In-flight results are discarded.
    pub fn dispose(&self) {
        if let Some(watcher) = lock(&self.watcher).take() {
            watcher.cancel();
        }
        if let Some(poll) = lock(&self.poll).take() {
            poll.cancel();
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
        debug!("Notification store disposed");
    }

    fn on_identity_changed(self: &Arc<Self>, user: Option<&UserId>, scheduler: &Scheduler) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(poll) = lock(&self.poll).take() {
            poll.cancel();
        }

        {
            let mut state = self.write_state();
            state.notifications.clear();
            state.stats = None;
            state.last_error = None;
        }
        self.notify();

        let Some(user_id) = user else {
            info!("Identity cleared, notification polling stopped");
            return;
        };

        let store = Arc::downgrade(self);
        let poll = scheduler.every(self.settings.poll_interval, move || {
            let store = store.clone();
            async move {
                if let Some(store) = store.upgrade() {
                    store.poll_tick().await;
                }
            }
        });
        *lock(&self.poll) = Some(poll);
        info!(
            %user_id,
            interval_secs = self.settings.poll_interval.as_secs(),
            "Notification polling started"
        );
    }

    /// One poll: fetch the list, then the stats. Errors stay in `last_error`.
    async fn poll_tick(&self) {
        if let Err(e) = self.fetch(None).await {
            debug!(error = %e, "Notification poll failed");
        }
        let _ = self.refresh_stats().await;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn fetch(&self, filter: Option<NotificationFilter>) -> Result<()> {
        let Some(ticket) = self.ticket() else {
            return Ok(());
        };
        let filter =
            filter.unwrap_or_else(|| NotificationFilter::first_page(self.settings.page_size));

        let _loading = LoadingGuard::new(self);
        self.apply(&ticket, |state| state.last_error = None);

        match self.gateway.list(&filter).await {
            Ok(notifications) => {
                let applied =
                    self.apply(&ticket, |state| state.notifications = notifications);
                if !applied {
                    debug!("Discarding notification list from a previous session");
                }
                Ok(())
            }
            Err(e) => {
                let err = SyncError::from(e);
                self.record_error(&ticket, &err);
                Err(err)
            }
        }
    }

    fn ticket(&self) -> Option<Ticket> {
        let epoch = self.epoch.load(Ordering::Acquire);
        self.identity.borrow().as_ref().map(|identity| Ticket {
            epoch,
            user_id: identity.id.clone(),
        })
    }

    fn require_ticket(&self) -> Result<Ticket> {
        self.ticket()
            .ok_or_else(|| SyncError::Authentication("Not logged in".to_string()))
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.epoch.load(Ordering::Acquire) == ticket.epoch
            && self
                .identity
                .borrow()
                .as_ref()
                .is_some_and(|identity| identity.id == ticket.user_id)
    }

    /// Apply `change` if `ticket` is still current. Returns whether it ran.
    fn apply(&self, ticket: &Ticket, change: impl FnOnce(&mut State)) -> bool {
        {
            let mut state = self.write_state();
            if !self.is_current(ticket) {
                return false;
            }
            change(&mut state);
        }
        self.notify();
        true
    }

    fn record_error(&self, ticket: &Ticket, err: &SyncError) {
        let message = err.to_string();
        self.apply(ticket, |state| state.last_error = Some(message));
    }

    /// Record and report a failed foreground command.
    fn fail(&self, ticket: &Ticket, operation: &str, err: SyncError) -> SyncError {
        self.record_error(ticket, &err);
        err.report(operation);
        err
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        self.observer.on_change(&snapshot);
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for NotificationStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use izaj_core::{Email, NotificationKind};

    use super::*;
    use crate::gateway::GatewayError;

    fn identity(id: &str) -> Identity {
        Identity {
            id: UserId::new(id),
            email: Some(Email::parse("maria@izaj.ph").unwrap()),
            first_name: "Maria".to_string(),
            last_name: "Santos".to_string(),
            phone: String::new(),
            email_verified: true,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            profile_picture: None,
        }
    }

    fn notification(id: &str, user: &str, is_read: bool) -> Notification {
        Notification {
            id: NotificationId::new(id),
            user_id: UserId::new(user),
            kind: NotificationKind::Promo,
            title: "Flash sale".to_string(),
            message: "20% off pendant lights today.".to_string(),
            is_read,
            link: None,
            metadata: None,
            created_at: DateTime::UNIX_EPOCH,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }

    /// Serves a fixed page and fails mutations.
    struct StubGateway {
        page: Vec<Notification>,
        stats_calls: AtomicUsize,
    }

    #[async_trait]
    impl NotificationGateway for StubGateway {
        async fn list(
            &self,
            _: &NotificationFilter,
        ) -> std::result::Result<Vec<Notification>, GatewayError> {
            Ok(self.page.clone())
        }

        async fn stats(&self) -> std::result::Result<NotificationStats, GatewayError> {
            self.stats_calls.fetch_add(1, Ordering::SeqCst);
            Ok(NotificationStats {
                total: 120,
                unread: 7,
                ..NotificationStats::default()
            })
        }

        async fn set_read(
            &self,
            _: &NotificationId,
            _: bool,
        ) -> std::result::Result<Notification, GatewayError> {
            Err(GatewayError::Status {
                status: 500,
                message: "boom".to_string(),
            })
        }

        async fn mark_all_read(&self) -> std::result::Result<Vec<Notification>, GatewayError> {
            Err(GatewayError::Status {
                status: 500,
                message: "boom".to_string(),
            })
        }

        async fn delete(&self, _: &NotificationId) -> std::result::Result<(), GatewayError> {
            Err(GatewayError::Status {
                status: 404,
                message: "Notification not found".to_string(),
            })
        }
    }

    fn store(
        who: Option<&str>,
    ) -> (Arc<NotificationStore>, watch::Sender<Option<Identity>>, Arc<StubGateway>) {
        let gateway = Arc::new(StubGateway {
            page: vec![
                notification("n-1", "u-1", false),
                notification("n-2", "u-1", true),
            ],
            stats_calls: AtomicUsize::new(0),
        });
        let (tx, rx) = watch::channel(who.map(identity));
        let store = Arc::new(NotificationStore::new(
            gateway.clone(),
            rx,
            NotificationSettings::default(),
            Arc::new(NoopObserver),
        ));
        (store, tx, gateway)
    }

    #[tokio::test]
    async fn test_fetch_when_logged_out_is_noop() {
        let (store, _tx, _) = store(None);
        store.fetch_notifications(None).await.unwrap();
        assert!(store.snapshot().notifications.is_empty());
        assert!(!store.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_fetch_replaces_list() {
        let (store, _tx, _) = store(Some("u-1"));
        store.fetch_notifications(None).await.unwrap();
        store.fetch_notifications(None).await.unwrap();
        assert_eq!(store.snapshot().notifications.len(), 2);
    }

    #[tokio::test]
    async fn test_mark_as_read_failure_keeps_optimistic_change() {
        let (store, _tx, gateway) = store(Some("u-1"));
        store.fetch_notifications(None).await.unwrap();

        let err = store.mark_as_read(&NotificationId::new("n-1")).await;
        assert!(matches!(err, Err(SyncError::Network(_))));

        let snapshot = store.snapshot();
        assert!(snapshot.notifications[0].is_read);
        assert!(snapshot.last_error.is_some());
        assert_eq!(snapshot.stats.unwrap().unread, 7);
        assert_eq!(gateway.stats_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mark_all_failure_changes_nothing() {
        let (store, _tx, gateway) = store(Some("u-1"));
        store.fetch_notifications(None).await.unwrap();

        assert!(store.mark_all_as_read().await.is_err());
        assert!(!store.snapshot().notifications[0].is_read);
        assert_eq!(gateway.stats_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_commands_require_identity() {
        let (store, _tx, _) = store(None);
        assert!(matches!(
            store.delete_notification(&NotificationId::new("n-1")).await,
            Err(SyncError::Authentication(_))
        ));
        assert!(store.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn test_add_notification_updates_stats_only_when_present() {
        let (store, _tx, _) = store(Some("u-1"));
        assert!(store.add_notification(notification("n-9", "u-1", false)));
        assert!(store.snapshot().stats.is_none());

        store.refresh_stats().await.unwrap();
        assert!(store.add_notification(notification("n-10", "u-1", false)));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.notifications[0].id.as_str(), "n-10");
        let stats = snapshot.stats.unwrap();
        assert_eq!(stats.total, 121);
        assert_eq!(stats.unread, 8);
        assert_eq!(stats.count(NotificationKind::Promo), 1);
    }

    #[tokio::test]
    async fn test_add_notification_rejects_other_user() {
        let (store, _tx, _) = store(Some("u-1"));
        assert!(!store.add_notification(notification("n-9", "u-2", false)));
        assert!(store.snapshot().notifications.is_empty());
    }

    #[tokio::test]
    async fn test_clear_error() {
        let (store, _tx, _) = store(Some("u-1"));
        let _ = store.delete_notification(&NotificationId::new("n-1")).await;
        assert!(store.snapshot().last_error.is_some());
        store.clear_error();
        assert!(store.snapshot().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_follows_identity() {
        let (store, tx, gateway) = store(None);
        store.start(&Scheduler::current());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!store.is_polling());

        tx.send_replace(Some(identity("u-1")));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(store.is_polling());
        assert_eq!(store.snapshot().notifications.len(), 2);
        assert_eq!(gateway.stats_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        assert_eq!(gateway.stats_calls.load(Ordering::SeqCst), 2);

        tx.send_replace(None);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!store.is_polling());
        let snapshot = store.snapshot();
        assert!(snapshot.notifications.is_empty());
        assert!(snapshot.stats.is_none());

        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert_eq!(gateway.stats_calls.load(Ordering::SeqCst), 2);
    }
}

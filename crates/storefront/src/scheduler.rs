//! Cancellable background tasks.
//!
//! Every timer or loop the client starts is owned by a [`ScheduledTask`]
//! handle. Cancelling or dropping the handle aborts the task, so teardown is
//! an explicit call rather than a side effect.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawns tasks onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    /// Scheduler for the given runtime.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Run `task` every `period`.
    ///
    /// The first run starts immediately. A run that overruns the period
    /// delays the next one instead of bursting to catch up.
    pub fn every<F, Fut>(&self, period: Duration, mut task: F) -> ScheduledTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                task().await;
            }
        })
    }

    /// Run a one-off future in the background.
    pub fn spawn<Fut>(&self, future: Fut) -> ScheduledTask
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        ScheduledTask {
            handle: self.handle.spawn(future),
            cancelled: AtomicBool::new(false),
        }
    }
}

/// Handle to a running background task.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
    cancelled: AtomicBool,
}

impl ScheduledTask {
    /// Abort the task. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.handle.abort();
    }

    /// Whether the task was cancelled or has finished.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_task(
        scheduler: &Scheduler,
        period: Duration,
    ) -> (ScheduledTask, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::clone(&count);
        let task = scheduler.every(period, move || {
            let ticks = Arc::clone(&ticks);
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });
        (task, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_runs_immediately_then_each_period() {
        let (task, count) = counting_task(&Scheduler::current(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(!task.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let (task, count) = counting_task(&Scheduler::current(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(1)).await;

        task.cancel();
        task.cancel();
        assert!(task.is_cancelled());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (task, count) = counting_task(&Scheduler::current(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(task);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

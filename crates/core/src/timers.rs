use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A delayed action that is aborted when cancelled or dropped.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Returns `None` when called outside a tokio runtime.
    pub fn after<F>(delay: Duration, action: F) -> Option<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = Handle::try_current().ok()?;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        Some(Self { handle })
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Default)]
pub struct TransientFlag {
    raised: Arc<AtomicBool>,
    timer: Option<ScheduledTask>,
}

impl TransientFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise_for(&mut self, duration: Duration) {
        self.cancel_timer();
        self.raised.store(true, Ordering::SeqCst);

        let raised = Arc::clone(&self.raised);
        self.timer = ScheduledTask::after(duration, move || {
            raised.store(false, Ordering::SeqCst);
        });
        if self.timer.is_none() {
            tracing::debug!("no runtime available, transient flag will not auto-clear");
        }
    }

    pub fn clear(&mut self) {
        self.cancel_timer();
        self.raised.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

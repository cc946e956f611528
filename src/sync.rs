//! Synchronization primitives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counts live workers and lets one task wait until all of them are gone.
///
/// Every [`WaitGroup::add`] hands out a [`WaitGuard`]; dropping the guard is the
/// only way to decrement, so each registration is released exactly once, even if
/// the task holding it panics.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: AtomicUsize,
    zero: Notify,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more participant.
    pub fn add(&self) -> WaitGuard {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        WaitGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of guards currently alive.
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Resolves once the count is zero. Returns immediately if nothing was added.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.zero.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a release between the check
            // and the await is not missed.
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub struct WaitGuard {
    inner: Arc<Inner>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.zero.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_without_members_returns() {
        let wg = WaitGroup::new();
        wg.wait().await;
        assert_eq!(wg.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_all_guards_drop() {
        let wg = WaitGroup::new();
        let first = wg.add();
        let second = wg.add();
        assert_eq!(wg.count(), 2);

        let waiter = {
            let wg = wg.clone();
            tokio::spawn(async move { wg.wait().await })
        };

        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not wake up")
            .unwrap();
        assert_eq!(wg.count(), 0);
    }

    #[tokio::test]
    async fn test_guard_released_when_task_panics() {
        let wg = WaitGroup::new();
        let guard = wg.add();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("worker blew up");
        });
        assert!(handle.await.is_err());
        tokio::time::timeout(Duration::from_secs(1), wg.wait())
            .await
            .expect("count never reached zero");
    }
}

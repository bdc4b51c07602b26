//! Crash-safe session teardown.
//!
//! A session acquires its worker-notification obligation up front as a
//! scoped guard; whatever way the session loop exits, the owning worker
//! hears about it exactly once so it can apply its own recovery policy.

use tracing::trace;

/// Notification contract back to the worker that owns a session's
/// execution unit.
pub trait Worker: Send {
    /// Notify the owning worker that this session has ended.
    fn shutdown(&self);
}

/// Worker for standalone sessions with no supervising pool.
#[allow(dead_code)]
pub struct NoopWorker;

impl Worker for NoopWorker {
    fn shutdown(&self) {}
}

/// Guard that delivers the worker notification on every exit path,
/// including panics. No-op when no worker reference is present.
pub struct ShutdownGuard<W: Worker> {
    worker: Option<W>,
}

impl<W: Worker> ShutdownGuard<W> {
    pub fn new(worker: Option<W>) -> Self {
        Self { worker }
    }
}

impl<W: Worker> Drop for ShutdownGuard<W> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
            trace!("Worker notified of session end");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingWorker(Arc<AtomicUsize>);

    impl Worker for CountingWorker {
        fn shutdown(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_notifies_exactly_once_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let _guard = ShutdownGuard::new(Some(CountingWorker(Arc::clone(&count))));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_absent_worker_is_noop() {
        let _guard: ShutdownGuard<CountingWorker> = ShutdownGuard::new(None);
    }

    #[test]
    fn test_notifies_on_panic() {
        let count = Arc::new(AtomicUsize::new(0));
        let worker = CountingWorker(Arc::clone(&count));

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = ShutdownGuard::new(Some(worker));
            panic!("session fault");
        }));

        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

//! Process shutdown signal.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Returned by blocking operations that were cut short because shutdown was
/// requested.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("shutdown requested")]
pub struct Interrupted;

/// Something that can tell whether the process should stop.
pub trait ShutdownPredicate {
    fn is_shutdown(&self) -> bool;
}

/// Shared shutdown flag.
///
/// Clones share the same flag. Requesting shutdown wakes every thread
/// blocked in [`ShutdownSignal::wait_timeout`].
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown on SIGINT and SIGTERM.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("termination signal received");
            signal.request();
        })
    }

    pub fn request(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for `timeout`, or until shutdown is requested.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), Interrupted> {
        let (flag, condvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut requested = flag.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if *requested {
                return Err(Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            requested = condvar
                .wait_timeout(requested, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl ShutdownPredicate for ShutdownSignal {
    fn is_shutdown(&self) -> bool {
        self.is_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_times_out_without_request() {
        let signal = ShutdownSignal::new();

        let started = Instant::now();
        assert_eq!(signal.wait_timeout(Duration::from_millis(20)), Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(!signal.is_shutdown());
    }

    #[test]
    fn request_wakes_waiter() {
        let signal = ShutdownSignal::new();
        let remote = signal.clone();

        let waiter = thread::spawn(move || remote.wait_timeout(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        signal.request();

        assert_eq!(waiter.join().unwrap(), Err(Interrupted));
        assert!(signal.is_shutdown());
    }

    #[test]
    fn wait_after_request_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.request();

        let started = Instant::now();
        assert_eq!(signal.wait_timeout(Duration::from_secs(30)), Err(Interrupted));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

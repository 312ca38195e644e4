//! Fixed-rate loop pacing.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use crate::shutdown::{Interrupted, ShutdownSignal};

/// Paces a loop to a fixed rate.
pub trait RateLimiter {
    /// Block until the next cycle is due.
    fn sleep(&mut self) -> Result<(), Interrupted>;
}

/// Sleeps whatever is left of the current period, so the loop body's own
/// run time does not slow the loop down.
#[derive(Debug)]
pub struct Rate {
    period: Duration,
    last: Instant,
    shutdown: ShutdownSignal,
}

impl Rate {
    /// Create a rate of `hz` cycles per second. The sleep is cut short with
    /// [`Interrupted`] once `shutdown` is requested.
    pub fn new(hz: NonZeroU32, shutdown: ShutdownSignal) -> Self {
        Rate {
            period: Duration::from_secs(1) / hz.get(),
            last: Instant::now(),
            shutdown,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time left until the current cycle ends.
    #[cfg(test)]
    fn remaining(&self) -> Duration {
        (self.last + self.period).saturating_duration_since(Instant::now())
    }
}

impl RateLimiter for Rate {
    fn sleep(&mut self) -> Result<(), Interrupted> {
        let deadline = self.last + self.period;
        let now = Instant::now();

        if now < deadline {
            self.shutdown.wait_timeout(deadline - now)?;
        } else if self.shutdown.is_requested() {
            return Err(Interrupted);
        }

        self.last = deadline;
        // more than a whole period late: start over instead of bursting
        if Instant::now().saturating_duration_since(self.last) > self.period {
            tracing::debug!(period = ?self.period, "loop overran, resetting rate");
            self.last = Instant::now();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hz(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    #[test]
    fn period_from_hz() {
        let rate = Rate::new(hz(10), ShutdownSignal::new());
        assert_eq!(rate.period(), Duration::from_millis(100));
    }

    #[test]
    fn average_period_matches_rate() {
        let mut rate = Rate::new(hz(10), ShutdownSignal::new());

        let started = Instant::now();
        for _ in 0..5 {
            rate.sleep().unwrap();
        }
        let average = started.elapsed() / 5;

        assert!(average >= Duration::from_millis(95), "average {average:?}");
        assert!(average < Duration::from_millis(150), "average {average:?}");
    }

    #[test]
    fn loop_body_time_is_absorbed() {
        let mut rate = Rate::new(hz(10), ShutdownSignal::new());

        let started = Instant::now();
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(40));
            rate.sleep().unwrap();
        }

        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn overrun_resets_instead_of_bursting() {
        let mut rate = Rate::new(hz(10), ShutdownSignal::new());

        thread::sleep(Duration::from_millis(350));
        rate.sleep().unwrap();

        assert!(rate.remaining() > Duration::from_millis(50));
    }

    #[test]
    fn sleep_is_interrupted_by_shutdown() {
        let shutdown = ShutdownSignal::new();
        let mut rate = Rate::new(hz(1), shutdown.clone());

        let remote = shutdown.clone();
        let requester = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.request();
        });

        let started = Instant::now();
        assert_eq!(rate.sleep(), Err(Interrupted));
        assert!(started.elapsed() < Duration::from_millis(500));

        requester.join().unwrap();
    }
}

//! Time source used for settle waits, interval scheduling and file names.

use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};

/// Monotonic time, blocking sleep and local wall time.
pub trait Clock {
    /// Time elapsed since the clock was created.
    fn elapsed(&self) -> Duration;

    /// Block the calling thread.
    fn sleep(&self, duration: Duration);

    /// Current local date and time, used for folder and file names.
    fn local_time(&self) -> NaiveDateTime;
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }

    fn local_time(&self) -> NaiveDateTime {
        (**self).local_time()
    }
}

/// The real clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn local_time(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

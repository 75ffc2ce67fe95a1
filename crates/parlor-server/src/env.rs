//! Environment abstraction for deterministic testing.
//!
//! Decouples routing logic from the system clock so driver tests can pin
//! timestamps. The production implementation is [`SystemEnv`].

use std::time::{Duration, Instant};

/// Abstract environment providing time.
///
/// # Invariants
///
/// - `now()` never goes backwards within one execution context
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current monotonic time. Used for log action timestamps.
    fn now(&self) -> Instant;

    /// Seconds since the Unix epoch. Used for persisted message timestamps.
    fn wall_clock_secs(&self) -> u64;
}

/// Production environment backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock_secs(&self) -> u64 {
        // A clock set before 1970 yields 0 rather than failing the send path
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}

//! Injected dependencies.
//!
//! Time is the only ambient dependency the engine reaches for on its own;
//! everything else (notifications, badges, certificates) comes in through
//! the collaborator traits in [`crate::dispatch`].

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

//! Engine configuration.
//!
//! Loaded from environment variables with sensible defaults, so the
//! surrounding application can tune the credit economy without code changes.

use crate::types::Credits;
use std::env;

/// Tunable credit-economy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Credits granted when an account is opened, so new members can book
    /// a session before they have taught one.
    pub signup_grant: Credits,
    /// Credits moved per completed session or held per seat.
    pub session_fee: Credits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signup_grant: Credits::new(5),
            session_fee: Credits::ONE,
        }
    }
}

impl Config {
    /// Loads configuration from `SKILLSWAP_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            signup_grant: read_credits("SKILLSWAP_SIGNUP_GRANT", defaults.signup_grant),
            session_fee: read_credits("SKILLSWAP_SESSION_FEE", defaults.session_fee),
        }
    }
}

fn read_credits(key: &str, default: Credits) -> Credits {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map_or(default, Credits::new)
}

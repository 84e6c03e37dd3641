//! Authenticated session handling.

mod expiry;

pub use expiry::{SessionExpired, SessionExpirySignal, SessionGeneration, DEFAULT_AUTH_ENDPOINTS};

use std::fmt;

/// Bearer credential bound to the session it was issued for.
#[derive(Clone)]
pub struct Credentials {
    pub token: String,
    pub generation: SessionGeneration,
}

impl Credentials {
    pub fn new(token: impl Into<String>, generation: SessionGeneration) -> Self {
        Self {
            token: token.into(),
            generation,
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// Keep tokens out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("generation", &self.generation)
            .finish()
    }
}

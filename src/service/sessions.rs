use crate::db::normalize_email;
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::time::Instant;
use tracing::debug;

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

struct SessionToken {
    token: String,
    expires: Instant,
}

impl SessionToken {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires
    }
}

/// In-memory bearer tokens, one per identity. Nothing here survives a restart.
pub struct SessionCache {
    ttl: Duration,
    tokens: Mutex<HashMap<String, SessionToken>>,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// The live token for `email`, or a freshly minted one replacing an expired entry.
    pub fn token_for(&self, email: &str) -> String {
        let key = normalize_email(email);
        let now = Instant::now();
        let mut tokens = self.tokens.lock();
        if let Some(existing) = tokens.get(&key).filter(|t| t.is_live(now)) {
            return existing.token.clone();
        }
        let token = random_token();
        debug!(email = %key, "issued session token");
        tokens.insert(
            key,
            SessionToken {
                token: token.clone(),
                expires: now + self.ttl,
            },
        );
        token
    }

    pub fn validate(&self, email: &str, presented: &str) -> bool {
        let key = normalize_email(email);
        let tokens = self.tokens.lock();
        tokens.get(&key).is_some_and(|t| {
            t.is_live(Instant::now()) && bool::from(t.token.as_bytes().ct_eq(presented.as_bytes()))
        })
    }

    /// End the session for `email` immediately.
    pub fn forget(&self, email: &str) -> bool {
        self.tokens.lock().remove(&normalize_email(email)).is_some()
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, t| t.is_live(now));
        before - tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

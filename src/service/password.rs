use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hex SHA-256 of `salt || raw`.
pub fn hash_password(salt: &str, raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(salt: &str, raw: &str, stored_hash: &str) -> bool {
    let attempt = hash_password(salt, raw);
    bool::from(attempt.as_bytes().ct_eq(stored_hash.as_bytes()))
}

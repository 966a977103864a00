//! Pseudonymous user and session identifiers

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Placeholder used when the IP or user agent is absent
const UNKNOWN: &str = "unknown";

/// Derive a stable pseudonymous user id from client IP and user agent.
///
/// SHA-256 over `ip + user_agent`, lowercase hex (64 chars).
pub fn derive_user_id(ip: Option<&str>, user_agent: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.unwrap_or(UNKNOWN).as_bytes());
    hasher.update(user_agent.unwrap_or(UNKNOWN).as_bytes());
    hex::encode(hasher.finalize())
}

/// Random 16-byte session id (32 hex chars) for requests without one
pub fn new_session_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

//! Opaque bearer secrets for sessions and emailed decision links.
//!
//! Secrets are handed out once and only their SHA-256 digest is kept.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Two v4 UUIDs (244 random bits) rendered as 64 lowercase hex characters.
pub fn generate_secure_token() -> String {
    let mut token = String::with_capacity(64);
    token.push_str(&Uuid::new_v4().simple().to_string());
    token.push_str(&Uuid::new_v4().simple().to_string());
    token
}

pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented secret against a stored digest without early exit.
pub fn matches_digest(token: &str, digest: &str) -> bool {
    let presented = token_digest(token);
    if presented.len() != digest.len() {
        return false;
    }
    presented
        .bytes()
        .zip(digest.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_hex() {
        let first = generate_secure_token();
        let second = generate_secure_token();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn digest_matching() {
        let token = generate_secure_token();
        let digest = token_digest(&token);
        assert!(matches_digest(&token, &digest));
        assert!(!matches_digest("not-the-token", &digest));
        assert_ne!(digest, token);
    }
}

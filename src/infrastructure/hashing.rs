use crate::domain::ports::SecretHasher;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;

/// Salted SHA-256 digests encoded as `salt_hex$digest_hex`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    pub fn new() -> Self {
        Self
    }

    fn digest(salt: &[u8], secret: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(secret.as_bytes());
        hasher.finalize().to_vec()
    }
}

impl SecretHasher for Sha256Hasher {
    fn hash(&self, secret: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = Self::digest(&salt, secret);
        format!("{}${}", hex::encode(salt), hex::encode(digest))
    }

    fn verify(&self, secret: &str, digest: &str) -> bool {
        let Some((salt_hex, expected_hex)) = digest.split_once('$') else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(expected_hex)) else {
            return false;
        };
        let actual = Self::digest(&salt, secret);

        actual.as_slice().ct_eq(expected.as_slice()).into()
    }
}

/// Content fingerprint used for idempotency keys.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Sha256Hasher::new();
        let digest = hasher.hash("1234");

        assert!(hasher.verify("1234", &digest));
        assert!(!hasher.verify("4321", &digest));
        assert!(!hasher.verify("", &digest));
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = Sha256Hasher::new();
        assert_ne!(hasher.hash("secret"), hasher.hash("secret"));
    }

    #[test]
    fn test_verify_rejects_malformed_digest() {
        let hasher = Sha256Hasher::new();
        assert!(!hasher.verify("1234", "not-a-digest"));
        assert!(!hasher.verify("1234", "zz$zz"));
    }

    #[test]
    fn test_verify_rejects_truncated_digest() {
        let hasher = Sha256Hasher::new();
        let digest = hasher.hash("1234");
        let truncated = &digest[..digest.len() - 2];

        assert!(!hasher.verify("1234", truncated));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert_eq!(fingerprint(b"").len(), 64);
    }
}

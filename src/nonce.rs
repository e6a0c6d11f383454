//! Correlation token generation.
//!
//! Every command carries a fresh random UUID-v4 string as its `nonce`; the
//! host echoes it back in the response. The generator belongs to one engine
//! and is seeded once, so tests can pin the sequence with a fixed seed.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use uuid::Uuid;

/// Produces UUID-v4 nonces from an engine-owned RNG.
#[derive(Debug)]
pub struct NonceGenerator {
    rng: StdRng,
}

impl NonceGenerator {
    /// Generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next token, e.g. `"3f2b8c1e-9a4d-4e6f-b1c2-0d9e8f7a6b5c"`.
    pub fn next_nonce(&mut self) -> String {
        self.next_uuid().hyphenated().to_string()
    }

    /// Next token as a [`Uuid`].
    pub fn next_uuid(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_nonce_shape() {
        let mut nonces = NonceGenerator::new();
        for _ in 0..100 {
            let nonce = nonces.next_nonce();
            assert_eq!(nonce.len(), 36);
            assert_eq!(nonce.as_bytes()[14], b'4');
            assert_eq!(nonce, nonce.to_lowercase());
            assert!(matches!(nonce.as_bytes()[19], b'8' | b'9' | b'a' | b'b'));
            for i in [8, 13, 18, 23] {
                assert_eq!(nonce.as_bytes()[i], b'-');
            }
        }
    }

    #[test]
    fn test_nonces_are_unique() {
        let mut nonces = NonceGenerator::new();
        let seen: HashSet<String> = (0..10_000).map(|_| nonces.next_nonce()).collect();
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_seeded_sequence_is_reproducible() {
        let mut a = NonceGenerator::with_seed(7);
        let mut b = NonceGenerator::with_seed(7);
        assert_eq!(a.next_nonce(), b.next_nonce());
        assert_eq!(a.next_uuid(), b.next_uuid());
        assert_ne!(a.next_nonce(), a.next_nonce());
    }

    #[test]
    fn test_uuid_version() {
        let mut nonces = NonceGenerator::with_seed(1);
        assert_eq!(nonces.next_uuid().get_version_num(), 4);
    }
}

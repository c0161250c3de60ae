//! Test data generators.

use marmara_chain::{PubKey, TxId};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique nonce/id generation.
static NONCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A process-unique nonce for fixture transactions.
pub fn next_nonce() -> u64 {
    NONCE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Deterministic test pubkey from a seed.
pub fn test_pk(seed: u8) -> PubKey {
    let mut bytes = [seed; 33];
    bytes[0] = 0x02;
    bytes[32] = seed.wrapping_mul(7);
    PubKey(bytes)
}

/// Deterministic test txid from a seed.
pub fn test_txid(seed: u8) -> TxId {
    let mut id = [0u8; 32];
    id[0] = 0xAA;
    id[1] = seed;
    id[31] = seed.wrapping_mul(3);
    TxId(id)
}

/// Random pubkey (for property tests that want fresh identities).
pub fn random_pk<R: Rng>(rng: &mut R) -> PubKey {
    let mut bytes = [0u8; 33];
    rng.fill(&mut bytes[1..]);
    bytes[0] = 0x02;
    PubKey(bytes)
}

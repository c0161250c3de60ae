//! Identifier newtypes shared across the Marmara crates.

use crate::{ChainError, ChainResult};
use blake2::{digest::Digest, Blake2b};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Blake2b with 256-bit output, the hash used for id derivations.
type Blake2b256 = Blake2b<blake2::digest::consts::U32>;

/// Coin amount in base units (1/10^8 coin). Signed, like the host ledger's.
pub type Amount = i64;

/// Block height. Signed so the lock-to-even sentinel (`i32::MAX - 1`) and the
/// opret wire format (little-endian `i32`) fit without casts.
pub type Height = i32;

/// Domain tag mixed into txid-to-pubkey derivation.
const LOOP_KEY_TAG: &[u8] = b"marmara/loop-key/v1";

macro_rules! impl_hash_newtype {
    ($name:ident, $len:expr) => {
        impl $name {
            /// Byte length of this identifier.
            pub const LEN: usize = $len;

            /// The all-zero identifier ("null" in the host daemon).
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            /// Whether this is the all-zero identifier.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Parse from a hex string of exactly `LEN * 2` characters.
            pub fn from_hex(s: &str) -> ChainResult<Self> {
                let bytes = hex::decode(s)?;
                Self::from_slice(&bytes)
            }

            /// Build from a byte slice, checking the length.
            pub fn from_slice(bytes: &[u8]) -> ChainResult<Self> {
                if bytes.len() != $len {
                    return Err(ChainError::InvalidLength {
                        kind: stringify!($name),
                        expected: $len,
                        got: bytes.len(),
                    });
                }
                let mut buf = [0u8; $len];
                buf.copy_from_slice(bytes);
                Ok(Self(buf))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(de::Error::custom)
            }
        }
    };
}

/// A 32-byte transaction id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub [u8; 32]);

impl_hash_newtype!(TxId, 32);

/// A 32-byte block hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHash(pub [u8; 32]);

impl_hash_newtype!(BlockHash, 32);

/// A 33-byte compressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PubKey(pub [u8; 33]);

impl_hash_newtype!(PubKey, 33);

impl PubKey {
    /// Deterministic hash-to-point derivation of the per-loop pubkey from a
    /// creation txid.
    ///
    /// Both halves of the derivation are public, so anyone who knows the
    /// creation txid can spend outputs guarded by this key; consensus rules
    /// are what actually protect locked-in-loop value.
    pub fn from_txid(txid: &TxId) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(LOOP_KEY_TAG);
        hasher.update(txid.as_bytes());
        let digest = hasher.finalize();
        let mut buf = [0u8; 33];
        buf[0] = 0x02;
        buf[1..].copy_from_slice(&digest);
        Self(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let txid = TxId([7u8; 32]);
        let parsed = TxId::from_hex(&txid.to_string()).unwrap();
        assert_eq!(txid, parsed);
    }

    #[test]
    fn test_from_slice_rejects_bad_length() {
        assert!(matches!(
            PubKey::from_slice(&[0u8; 32]),
            Err(ChainError::InvalidLength { expected: 33, .. })
        ));
    }

    #[test]
    fn test_zero_id() {
        assert!(TxId::zero().is_zero());
        assert!(!TxId([1u8; 32]).is_zero());
    }

    #[test]
    fn test_txid_derived_pubkey_is_stable() {
        let txid = TxId([0xAB; 32]);
        let a = PubKey::from_txid(&txid);
        let b = PubKey::from_txid(&txid);
        assert_eq!(a, b);
        assert_eq!(a.0[0], 0x02, "derived keys use the even-parity prefix");

        let other = PubKey::from_txid(&TxId([0xAC; 32]));
        assert_ne!(a, other);
    }
}

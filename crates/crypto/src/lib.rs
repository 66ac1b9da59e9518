//! Schnorr (BIP-340) signature verification and content hashing.
//!
//! Events and DAG roots are authorized the same way: a 32-byte x-only
//! secp256k1 public key signs a 32-byte message (the event id, or the DAG
//! root CID) with a 64-byte Schnorr signature. This crate knows nothing
//! about events or leaves — it only verifies bytes against bytes.

use std::fmt;

use bech32::FromBase32;
use secp256k1::schnorr;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const PUBKEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CryptoError {
    #[error("public key must be {PUBKEY_LEN} bytes, got {0}")]
    BadPublicKeyLength(usize),
    #[error("signature must be {SIGNATURE_LEN} bytes, got {0}")]
    BadSignatureLength(usize),
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("malformed secp256k1 value: {0}")]
    Secp256k1(#[from] secp256k1::Error),
    #[error("invalid npub encoding: {0}")]
    InvalidNpub(String),
}

/// A 32-byte x-only secp256k1 public key, as used to authorize events and DAG roots.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUBKEY_LEN]);

impl PublicKey {
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; PUBKEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::BadPublicKeyLength(bytes.len()))?;
        // Validate it is actually a point on the curve up front, rather than
        // deferring the failure to the first verification attempt.
        let _ = secp256k1::XOnlyPublicKey::from_slice(&arr)?;
        Ok(Self(arr))
    }

    /// Decode a bech32 `npub1...` identifier (NIP-19) into its raw key bytes.
    pub fn from_npub(npub: &str) -> Result<Self, CryptoError> {
        let (hrp, data, variant) = bech32::decode(npub)
            .map_err(|e| CryptoError::InvalidNpub(e.to_string()))?;
        if hrp != "npub" {
            return Err(CryptoError::InvalidNpub(format!(
                "unexpected human-readable part {hrp:?}"
            )));
        }
        if variant != bech32::Variant::Bech32 {
            return Err(CryptoError::InvalidNpub("expected bech32 variant".into()));
        }
        let bytes = Vec::<u8>::from_base32(&data)
            .map_err(|e| CryptoError::InvalidNpub(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    fn to_xonly(self) -> Result<secp256k1::XOnlyPublicKey, CryptoError> {
        Ok(secp256k1::XOnlyPublicKey::from_slice(&self.0)?)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// A 64-byte Schnorr signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_LEN]);

impl Signature {
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::BadSignatureLength(bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// Verify a Schnorr signature over `message` (typically an event id or DAG
/// root CID, always 32 bytes) against `pubkey`. Never panics on malformed
/// input — returns `false` instead, since a verification failure is a
/// routine occurrence (a hostile or buggy client), not an exceptional one.
#[must_use]
pub fn verify(pubkey: PublicKey, message: &[u8; 32], sig: Signature) -> bool {
    let Ok(xonly) = pubkey.to_xonly() else {
        return false;
    };
    let Ok(sig) = schnorr::Signature::from_slice(&sig.0) else {
        return false;
    };
    sig.verify(message, &xonly).is_ok()
}

/// SHA-256 of `data`, used both for event ids and content hashes.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Keypair, Secp256k1};

    fn signing_pair() -> (Keypair, PublicKey) {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let keypair = Keypair::new(&secp, &mut rng);
        let (xonly, _parity) = keypair.x_only_public_key();
        (keypair, PublicKey(xonly.serialize()))
    }

    #[test]
    fn verifies_a_genuine_signature() {
        let secp = Secp256k1::new();
        let (keypair, pubkey) = signing_pair();
        let message = sha256(b"hello relay");

        let sig = secp.sign_schnorr(&message, &keypair);
        let sig = Signature(sig.as_ref().try_into().unwrap());

        assert!(verify(pubkey, &message, sig));
    }

    #[test]
    fn rejects_a_signature_over_a_different_message() {
        let secp = Secp256k1::new();
        let (keypair, pubkey) = signing_pair();
        let message = sha256(b"hello relay");
        let other_message = sha256(b"goodbye relay");

        let sig = secp.sign_schnorr(&message, &keypair);
        let sig = Signature(sig.as_ref().try_into().unwrap());

        assert!(!verify(pubkey, &other_message, sig));
    }

    #[test]
    fn rejects_a_signature_from_a_different_key() {
        let secp = Secp256k1::new();
        let (keypair, _pubkey) = signing_pair();
        let (_other_keypair, other_pubkey) = signing_pair();
        let message = sha256(b"hello relay");

        let sig = secp.sign_schnorr(&message, &keypair);
        let sig = Signature(sig.as_ref().try_into().unwrap());

        assert!(!verify(other_pubkey, &message, sig));
    }

    #[test]
    fn public_key_hex_round_trips() {
        let (_keypair, pubkey) = signing_pair();
        let hex = pubkey.to_hex();
        let parsed = PublicKey::from_hex(&hex).unwrap();
        assert_eq!(pubkey, parsed);
    }

    #[test]
    fn rejects_undersized_public_keys() {
        let err = PublicKey::from_slice(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, CryptoError::BadPublicKeyLength(10)));
    }

    #[test]
    fn rejects_npub_with_wrong_human_readable_part() {
        // "npub" swapped for "nsec" over the same payload.
        let (_keypair, pubkey) = signing_pair();
        let bech = {
            use bech32::ToBase32;
            bech32::encode("nsec", pubkey.0.to_base32(), bech32::Variant::Bech32).unwrap()
        };
        let err = PublicKey::from_npub(&bech).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidNpub(_)));
    }
}

//! Validates a kind-22242 AUTH event against the session challenge issued
//! when the connection opened (§4.5 AUTH handshake).

use relay_events::Event;
use thiserror::Error;

pub const AUTH_KIND: u64 = 22242;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error("AUTH event must have kind 22242")]
    WrongKind,
    #[error("invalid: event creation date is too far off from the current time")]
    NotFresh,
    #[error("signature does not verify against pubkey")]
    BadSignature,
    #[error("AUTH event is missing a relay tag")]
    MissingRelayTag,
    #[error("Error checking session challenge")]
    ChallengeMismatch,
}

/// Generate a fresh, per-connection challenge: 16 random bytes, hex-encoded
/// (128 bits, as the spec requires at minimum).
#[must_use]
pub fn generate_challenge() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate an AUTH event against the issued `challenge`. `now` and
/// `window_secs` set the freshness check (§3, typically a tighter window
/// than general events).
pub fn validate(event: &Event, challenge: &str, now: i64, window_secs: i64) -> Result<(), AuthError> {
    if event.kind != AUTH_KIND {
        return Err(AuthError::WrongKind);
    }
    relay_events::check_freshness(event.created_at, now, window_secs).map_err(|_| AuthError::NotFresh)?;
    event.verify_integrity().map_err(|_| AuthError::BadSignature)?;

    let has_relay_tag = event.tags.iter().any(|t| t.first().is_some_and(|n| n == "relay"));
    if !has_relay_tag {
        return Err(AuthError::MissingRelayTag);
    }

    let challenge_tag = event
        .tags
        .iter()
        .find(|t| t.first().is_some_and(|n| n == "challenge"))
        .and_then(|t| t.get(1));
    match challenge_tag {
        Some(tag) if tag == challenge => Ok(()),
        _ => Err(AuthError::ChallengeMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Keypair, Secp256k1};

    fn signed_auth(created_at: i64, tags: Vec<Vec<String>>) -> Event {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let keypair = Keypair::new(&secp, &mut rng);
        let (xonly, _) = keypair.x_only_public_key();
        let pubkey = hex::encode(xonly.serialize());

        let mut event =
            Event { id: String::new(), pubkey, created_at, kind: AUTH_KIND, tags, content: String::new(), sig: String::new() };
        event.id = event.canonical_id();
        let id_bytes: [u8; 32] = hex::decode(&event.id).unwrap().try_into().unwrap();
        let sig = secp.sign_schnorr(&id_bytes, &keypair);
        event.sig = hex::encode(sig.as_ref());
        event
    }

    #[test]
    fn accepts_a_correct_challenge_response() {
        let tags = vec![vec!["relay".into(), "wss://relay.example".into()], vec!["challenge".into(), "CHAL".into()]];
        let event = signed_auth(1000, tags);
        assert!(validate(&event, "CHAL", 1000, 600).is_ok());
    }

    #[test]
    fn rejects_a_mismatched_challenge() {
        let tags = vec![vec!["relay".into(), "wss://relay.example".into()], vec!["challenge".into(), "WRONG".into()]];
        let event = signed_auth(1000, tags);
        assert_eq!(validate(&event, "CHAL", 1000, 600), Err(AuthError::ChallengeMismatch));
    }

    #[test]
    fn rejects_a_missing_relay_tag() {
        let tags = vec![vec!["challenge".into(), "CHAL".into()]];
        let event = signed_auth(1000, tags);
        assert_eq!(validate(&event, "CHAL", 1000, 600), Err(AuthError::MissingRelayTag));
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let tags = vec![vec!["relay".into(), "wss://relay.example".into()], vec!["challenge".into(), "CHAL".into()]];
        let event = signed_auth(1000, tags);
        assert_eq!(validate(&event, "CHAL", 1000 + 700, 600), Err(AuthError::NotFresh));
    }

    #[test]
    fn generated_challenges_are_128_bits_of_hex() {
        let challenge = generate_challenge();
        assert_eq!(challenge.len(), 32);
        assert!(challenge.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

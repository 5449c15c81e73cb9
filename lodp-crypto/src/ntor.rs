//! Modified ntor: one-way-authenticated key agreement over X25519 with
//! labeled BLAKE2s extract/expand steps.
//!
//! The responder proves possession of its long-term key `b`; the initiator
//! contributes only an ephemeral. Both sides end up with the same directional
//! session keys and the verifier the responder places in HANDSHAKE_ACK.

use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::{derive_session_keys, mac, mac_wide, CryptoError, Mac, SessionKeys};

const PROTOID: &[u8] = b"lodp-ntor-1";
const RESPONDER: &[u8] = b"Responder";
const KEY_EXTRACT: &[u8] = b"lodp-ntor-1:key_extract";
const KEY_EXPAND: &[u8] = b"lodp-ntor-1:key_expand";
const KEY_MAC: &[u8] = b"lodp-ntor-1:mac";

/// An X25519 keypair held for the duration of one handshake.
///
/// `StaticSecret` rather than `EphemeralSecret` because both ntor legs reuse
/// the same private scalar; the secret is wiped on drop.
pub struct EphemeralKeypair {
    pub secret: StaticSecret,
    pub public: PublicKey,
}

impl EphemeralKeypair {
    pub fn generate(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        let secret = StaticSecret::random_from_rng(&mut *rng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }
}

/// Initiator side: combine our ephemeral `x` with the responder's long-term
/// key `B` and its ephemeral `Y` from HANDSHAKE_ACK.
pub fn initiate(
    ephemeral: &EphemeralKeypair,
    responder_identity: &PublicKey,
    responder_ephemeral: &PublicKey,
) -> Result<(SessionKeys, Mac), CryptoError> {
    let s1 = ephemeral.secret.diffie_hellman(responder_ephemeral);
    let s2 = ephemeral.secret.diffie_hellman(responder_identity);
    if !(s1.was_contributory() && s2.was_contributory()) {
        return Err(CryptoError::Rejected);
    }
    Ok(transcript(
        s1.as_bytes(),
        s2.as_bytes(),
        responder_identity,
        &ephemeral.public,
        responder_ephemeral,
    ))
}

/// Responder side: combine our ephemeral `y` and long-term `b` with the
/// initiator's ephemeral `X` from HANDSHAKE.
pub fn respond(
    identity: &StaticSecret,
    identity_public: &PublicKey,
    ephemeral: &EphemeralKeypair,
    initiator_ephemeral: &PublicKey,
) -> Result<(SessionKeys, Mac), CryptoError> {
    let s1 = ephemeral.secret.diffie_hellman(initiator_ephemeral);
    let s2 = identity.diffie_hellman(initiator_ephemeral);
    if !(s1.was_contributory() && s2.was_contributory()) {
        return Err(CryptoError::Rejected);
    }
    Ok(transcript(
        s1.as_bytes(),
        s2.as_bytes(),
        identity_public,
        initiator_ephemeral,
        &ephemeral.public,
    ))
}

/// SecretInput = s1 || s2 || B || X || Y || PROTOID. Extract the shared
/// secret and the expand digest from it, then MAC the expand digest into the
/// wire verifier. Temporaries are wiped before returning.
fn transcript(
    s1: &[u8; 32],
    s2: &[u8; 32],
    identity: &PublicKey,
    initiator: &PublicKey,
    responder: &PublicKey,
) -> (SessionKeys, Mac) {
    let b = identity.as_bytes();
    let x = initiator.as_bytes();
    let y = responder.as_bytes();

    let mut shared = mac_wide(KEY_EXTRACT, [s1, s2, b, x, y, PROTOID]);
    let mut verify = mac_wide(KEY_EXPAND, [s1, s2, b, x, y, PROTOID]);
    let auth = mac(KEY_MAC, [&verify, b, y, x, PROTOID, RESPONDER]);

    let keys = derive_session_keys(&shared);
    shared.zeroize();
    verify.zeroize();
    (keys, auth)
}

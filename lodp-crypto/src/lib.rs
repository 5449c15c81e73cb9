#![no_std]

//! Crypto primitives consumed by the LODP core: keyed BLAKE2s MACs, the
//! XChaCha20 bulk cipher, X25519 agreement, and the session-key KDF.
//!
//! Everything here is deliberately small and allocation-free; the envelope
//! codec and the handshake in `lodp-core` are the only callers.

pub use x25519_dalek::{PublicKey, StaticSecret};

use blake2::digest::consts::{U16, U32};
use blake2::digest::Output;
use blake2::{Blake2s256, Blake2sMac};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::XChaCha20;
use hmac::SimpleHmac;
use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use lodp_types::{BULK_IV_LEN, BULK_KEY_LEN, ECDH_SECRET_LEN, MAC_DIGEST_LEN, MAC_KEY_LEN};

pub mod ntor;

/// MAC digest as carried on the wire.
pub type Mac = [u8; MAC_DIGEST_LEN];

#[derive(Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// Peer public key failed validation (identity / low-order point).
    Rejected,
}

/// Keyed BLAKE2s over the concatenation of `msg`, at the wire digest width.
pub fn mac<const M: usize>(key: &[u8], msg: [&[u8]; M]) -> Mac {
    use blake2::digest::Mac;
    let mut mac = Blake2sMac::<U16>::new_from_slice(key).unwrap();
    for msg in msg {
        mac.update(msg);
    }
    mac.finalize().into_bytes().into()
}

/// Keyed BLAKE2s at full width, for the handshake extract/expand transcripts.
pub fn mac_wide<const M: usize>(key: &[u8], msg: [&[u8]; M]) -> [u8; 32] {
    use blake2::digest::Mac;
    let mut mac = Blake2sMac::<U32>::new_from_slice(key).unwrap();
    for msg in msg {
        mac.update(msg);
    }
    mac.finalize().into_bytes().into()
}

fn hmac<const M: usize>(key: &[u8], msg: [&[u8]; M]) -> Output<Blake2s256> {
    use hmac::Mac;
    let mut hmac = <SimpleHmac<Blake2s256> as Mac>::new_from_slice(key).unwrap();
    for msg in msg {
        hmac.update(msg);
    }
    hmac.finalize().into_bytes()
}

/// HKDF-style expansion: extract with `key` over `msg`, then chain N blocks.
pub fn hkdf<const N: usize, const M: usize>(key: &[u8], msg: [&[u8]; M]) -> [[u8; 32]; N] {
    assert!(N <= 255);

    let mut output = [[0u8; 32]; N];

    if N == 0 {
        return output;
    }

    let mut t0: [u8; 32] = hmac(key, msg).into();
    let mut ti: [u8; 32] = hmac(&t0, [&[1]]).into();
    output[0] = ti;
    for i in 1..N as u8 {
        ti = hmac(&t0, [&ti, &[i + 1]]).into();
        output[i as usize] = ti;
    }
    t0.zeroize();
    ti.zeroize();

    output
}

/// XChaCha20 keystream XOR from `src` into `dst`.
pub fn stream_xor(key: &[u8; BULK_KEY_LEN], iv: &[u8; BULK_IV_LEN], src: &[u8], dst: &mut [u8]) {
    let mut cipher = XChaCha20::new(key.into(), iv.into());
    cipher
        .apply_keystream_b2b(src, dst)
        .expect("source and destination regions are the same length");
}

/// Constant-time equality. Length mismatch compares unequal.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// A symmetric MAC-key/bulk-key pair, the unit the envelope codec is keyed by.
#[derive(Clone, Debug, Zeroize, ZeroizeOnDrop)]
pub struct PacketKeys {
    pub mac: [u8; MAC_KEY_LEN],
    pub bulk: [u8; BULK_KEY_LEN],
}

impl PacketKeys {
    /// Fresh random pair, e.g. introduction keys to advertise out of band.
    pub fn random(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        let mut keys = Self { mac: [0; MAC_KEY_LEN], bulk: [0; BULK_KEY_LEN] };
        rng.fill_bytes(&mut keys.mac);
        rng.fill_bytes(&mut keys.bulk);
        keys
    }
}

/// The two directional key pairs produced by the session KDF.
#[derive(Debug, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Protects initiator-to-responder traffic.
    pub initiator: PacketKeys,
    /// Protects responder-to-initiator traffic.
    pub responder: PacketKeys,
}

/// Expands a shared secret into the two directional key pairs.
pub fn derive_session_keys(shared: &[u8; ECDH_SECRET_LEN]) -> SessionKeys {
    let [init_mac, init_bulk, resp_mac, resp_bulk] = hkdf(shared, []);
    SessionKeys {
        initiator: PacketKeys { mac: init_mac, bulk: init_bulk },
        responder: PacketKeys { mac: resp_mac, bulk: resp_bulk },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_widths() {
        let key = [7u8; MAC_KEY_LEN];
        assert_eq!(mac(&key, [b"abc"]).len(), MAC_DIGEST_LEN);
        assert_eq!(mac_wide(&key, [b"abc"]).len(), 32);
        // multi-part update matches the concatenation
        assert_eq!(mac(&key, [b"ab", b"c"]), mac(&key, [b"abc"]));
    }

    #[test]
    fn kdf_outputs_are_distinct() {
        let keys = derive_session_keys(&[0x55; ECDH_SECRET_LEN]);
        assert_ne!(keys.initiator.mac, keys.initiator.bulk);
        assert_ne!(keys.initiator.mac, keys.responder.mac);
        assert_ne!(keys.initiator.bulk, keys.responder.bulk);

        let again = derive_session_keys(&[0x55; ECDH_SECRET_LEN]);
        assert_eq!(keys.initiator.mac, again.initiator.mac);
        assert_eq!(keys.responder.bulk, again.responder.bulk);
    }

    #[test]
    fn stream_xor_round_trips() {
        let key = [1u8; BULK_KEY_LEN];
        let iv = [2u8; BULK_IV_LEN];
        let plain = *b"attack at dawn";
        let mut cipher = [0u8; 14];
        stream_xor(&key, &iv, &plain, &mut cipher);
        assert_ne!(cipher, plain);
        let mut back = [0u8; 14];
        stream_xor(&key, &iv, &cipher, &mut back);
        assert_eq!(back, plain);
    }

    #[test]
    fn ct_eq_handles_lengths() {
        assert!(ct_eq(b"same", b"same"));
        assert!(!ct_eq(b"same", b"off "));
        assert!(!ct_eq(b"same", b"longer"));
    }
}

//! Stateless address-validation cookies.
//!
//! A cookie is a MAC over the peer's address, port, and the introduction key
//! material it sent, so the responder holds no per-flow state between INIT
//! and HANDSHAKE. Keys rotate every 30 seconds with a 15 second grace window
//! for the previous key; rotation is lazy, sampled on every operation.

use std::net::{IpAddr, SocketAddr};

use lodp_crypto::{ct_eq, mac};
use lodp_types::{COOKIE_LEN, MAC_KEY_LEN};
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Error;

const ROTATE_INTERVAL_SECS: u64 = 30;
const GRACE_SECS: u64 = 15;

#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct CookieKeys {
    current: [u8; MAC_KEY_LEN],
    previous: [u8; MAC_KEY_LEN],
    rotated_at: u64,
    previous_expires_at: u64,
}

impl CookieKeys {
    pub fn new(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        let mut keys = Self {
            current: [0; MAC_KEY_LEN],
            previous: [0; MAC_KEY_LEN],
            rotated_at: 0,
            previous_expires_at: 0,
        };
        rng.fill_bytes(&mut keys.current);
        rng.fill_bytes(&mut keys.previous);
        keys
    }

    /// previous <- current, current <- fresh. The grace deadline anchors to
    /// when rotation became due, not when it ran, so a cookie never outlives
    /// its 45 second window even when operations are sparse.
    fn rotate_if_due(&mut self, now: u64, rng: &mut (impl CryptoRng + RngCore)) {
        let due = self.rotated_at + ROTATE_INTERVAL_SECS;
        if now > due {
            self.previous = self.current;
            rng.fill_bytes(&mut self.current);
            self.previous_expires_at = due + GRACE_SECS;
            self.rotated_at = now;
        }
    }

    pub fn generate(
        &mut self,
        now: u64,
        rng: &mut (impl CryptoRng + RngCore),
        peer: SocketAddr,
        intro_mac_key: &[u8],
        intro_bulk_key: &[u8],
    ) -> [u8; COOKIE_LEN] {
        self.rotate_if_due(now, rng);
        compute(&self.current, peer, intro_mac_key, intro_bulk_key)
    }

    /// Constant-time check against the current key, then against the
    /// previous key while it is inside its grace window.
    pub fn verify(
        &mut self,
        now: u64,
        rng: &mut (impl CryptoRng + RngCore),
        peer: SocketAddr,
        intro_mac_key: &[u8],
        intro_bulk_key: &[u8],
        presented: &[u8],
    ) -> Result<(), Error> {
        self.rotate_if_due(now, rng);
        let cookie = compute(&self.current, peer, intro_mac_key, intro_bulk_key);
        if ct_eq(&cookie, presented) {
            return Ok(());
        }
        if now <= self.previous_expires_at {
            let cookie = compute(&self.previous, peer, intro_mac_key, intro_bulk_key);
            if ct_eq(&cookie, presented) {
                return Ok(());
            }
        }
        Err(Error::InvalidCookie)
    }
}

fn compute(
    key: &[u8; MAC_KEY_LEN],
    peer: SocketAddr,
    intro_mac_key: &[u8],
    intro_bulk_key: &[u8],
) -> [u8; COOKIE_LEN] {
    let port = peer.port().to_be_bytes();
    match peer.ip() {
        IpAddr::V4(ip) => mac(key, [&ip.octets(), &port, intro_mac_key, intro_bulk_key]),
        IpAddr::V6(ip) => mac(key, [&ip.octets(), &port, intro_mac_key, intro_bulk_key]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const MAC_KEY: [u8; 32] = [0xa1; 32];
    const BULK_KEY: [u8; 32] = [0xb2; 32];

    fn peer() -> SocketAddr {
        "203.0.113.7:4433".parse().unwrap()
    }

    fn check(keys: &mut CookieKeys, now: u64, rng: &mut StdRng, cookie: &[u8]) -> bool {
        keys.verify(now, rng, peer(), &MAC_KEY, &BULK_KEY, cookie).is_ok()
    }

    #[test]
    fn acceptance_window() {
        let mut rng = StdRng::seed_from_u64(31);
        let mut keys = CookieKeys::new(&mut rng);
        let cookie = keys.generate(0, &mut rng, peer(), &MAC_KEY, &BULK_KEY);

        assert!(check(&mut keys, 30, &mut rng, &cookie)); // current key
        assert!(check(&mut keys, 31, &mut rng, &cookie)); // rotated, previous key
        assert!(check(&mut keys, 45, &mut rng, &cookie)); // end of grace
        assert!(!check(&mut keys, 46, &mut rng, &cookie)); // expired
    }

    #[test]
    fn stale_cookie_dies_with_sparse_traffic() {
        let mut rng = StdRng::seed_from_u64(32);
        let mut keys = CookieKeys::new(&mut rng);
        let cookie = keys.generate(0, &mut rng, peer(), &MAC_KEY, &BULK_KEY);

        // first operation after a long idle gap: the overdue rotation must
        // not grant the old key a fresh grace window
        assert!(!check(&mut keys, 120, &mut rng, &cookie));
    }

    #[test]
    fn cookie_binds_address_and_intro_material() {
        let mut rng = StdRng::seed_from_u64(33);
        let mut keys = CookieKeys::new(&mut rng);
        let cookie = keys.generate(0, &mut rng, peer(), &MAC_KEY, &BULK_KEY);

        let other_addr: SocketAddr = "203.0.113.7:4434".parse().unwrap();
        assert!(keys
            .verify(1, &mut rng, other_addr, &MAC_KEY, &BULK_KEY, &cookie)
            .is_err());
        assert!(keys
            .verify(1, &mut rng, peer(), &BULK_KEY, &MAC_KEY, &cookie)
            .is_err());
        assert!(keys
            .verify(1, &mut rng, peer(), &MAC_KEY, &BULK_KEY, &cookie)
            .is_ok());
    }

    #[test]
    fn ipv6_peers_are_supported() {
        let mut rng = StdRng::seed_from_u64(34);
        let mut keys = CookieKeys::new(&mut rng);
        let v6: SocketAddr = "[2001:db8::1]:4433".parse().unwrap();
        let cookie = keys.generate(0, &mut rng, v6, &MAC_KEY, &BULK_KEY);
        assert!(keys.verify(1, &mut rng, v6, &MAC_KEY, &BULK_KEY, &cookie).is_ok());
    }
}

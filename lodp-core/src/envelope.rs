//! Encrypt-then-MAC envelope over the common frame layout.
//!
//! Sealing works plaintext-image to ciphertext-image: a fresh random IV goes
//! into the IV slot, the stream cipher covers everything from the type byte
//! on, and the MAC covers everything from the IV on. The MAC therefore
//! authenticates the length field before any parsing trusts it.

use lodp_crypto::{ct_eq, mac, stream_xor, PacketKeys};
use lodp_types::{BULK_IV_LEN, MAC_DIGEST_LEN, MSS, PKT_IV_OFFSET, PKT_TLV_OFFSET};
use rand_core::{CryptoRng, RngCore};

use crate::buffer::PacketBuffer;
use crate::error::Error;

/// Seals `buffer.pt[..len]` into `buffer.ct[..len]`.
///
/// `pad` random bytes, clamped to the space left under the MSS, are appended
/// to the plaintext first. The header length field is left alone, so padding
/// is authenticated and encrypted but invisible to parsing.
pub(crate) fn seal(
    buffer: &mut PacketBuffer,
    keys: &PacketKeys,
    pad: usize,
    rng: &mut (impl CryptoRng + RngCore),
) {
    let pad = pad.min(MSS - buffer.len);
    if pad > 0 {
        rng.fill_bytes(&mut buffer.pt[buffer.len..buffer.len + pad]);
        buffer.len += pad;
    }

    let len = buffer.len;
    let mut iv = [0u8; BULK_IV_LEN];
    rng.fill_bytes(&mut iv);
    buffer.ct[PKT_IV_OFFSET..PKT_TLV_OFFSET].copy_from_slice(&iv);
    stream_xor(
        &keys.bulk,
        &iv,
        &buffer.pt[PKT_TLV_OFFSET..len],
        &mut buffer.ct[PKT_TLV_OFFSET..len],
    );
    let tag = mac(&keys.mac, [&buffer.ct[PKT_IV_OFFSET..len]]);
    buffer.ct[..MAC_DIGEST_LEN].copy_from_slice(&tag);
}

/// Verifies `buffer.ct[..len]` and opens it into the plaintext image.
///
/// The MAC compare is constant-time; on mismatch nothing is decrypted. The
/// caller has already bounded `len` below by the frame prefix.
pub(crate) fn open(buffer: &mut PacketBuffer, keys: &PacketKeys) -> Result<(), Error> {
    let len = buffer.len;
    let expected = mac(&keys.mac, [&buffer.ct[PKT_IV_OFFSET..len]]);
    if !ct_eq(&expected, &buffer.ct[..MAC_DIGEST_LEN]) {
        return Err(Error::InvalidMac);
    }
    let mut iv = [0u8; BULK_IV_LEN];
    iv.copy_from_slice(&buffer.ct[PKT_IV_OFFSET..PKT_TLV_OFFSET]);
    stream_xor(
        &keys.bulk,
        &iv,
        &buffer.ct[PKT_TLV_OFFSET..len],
        &mut buffer.pt[PKT_TLV_OFFSET..len],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use lodp_types::{PacketType, PKT_BODY_OFFSET};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sealed_frame(
        keys: &PacketKeys,
        payload: &[u8],
        pad: usize,
        rng: &mut StdRng,
    ) -> Box<crate::buffer::PacketBuffer> {
        let mut pool = BufferPool::new(1);
        let mut buffer = pool.acquire().unwrap();
        buffer.set_header(PacketType::Data, payload.len());
        buffer.pt[PKT_BODY_OFFSET..PKT_BODY_OFFSET + payload.len()].copy_from_slice(payload);
        seal(&mut buffer, keys, pad, rng);
        buffer
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let mut rng = StdRng::seed_from_u64(21);
        let keys = PacketKeys::random(&mut rng);
        let sent = sealed_frame(&keys, b"round trip", 0, &mut rng);

        let mut pool = BufferPool::new(1);
        let mut received = pool.acquire().unwrap();
        received.load(&sent.ct[..sent.len]);
        open(&mut received, &keys).unwrap();
        assert_eq!(
            &received.pt[PKT_TLV_OFFSET..received.len],
            &sent.pt[PKT_TLV_OFFSET..sent.len]
        );
    }

    #[test]
    fn wrong_key_yields_no_plaintext() {
        let mut rng = StdRng::seed_from_u64(22);
        let keys = PacketKeys::random(&mut rng);
        let other = PacketKeys::random(&mut rng);
        let sent = sealed_frame(&keys, b"secret", 0, &mut rng);

        let mut pool = BufferPool::new(1);
        let mut received = pool.acquire().unwrap();
        received.load(&sent.ct[..sent.len]);
        assert!(matches!(open(&mut received, &other), Err(Error::InvalidMac)));
        assert!(received.pt.iter().all(|b| *b == 0));
    }

    #[test]
    fn any_single_bit_flip_is_rejected() {
        let mut rng = StdRng::seed_from_u64(23);
        let keys = PacketKeys::random(&mut rng);
        let sent = sealed_frame(&keys, b"integrity", 0, &mut rng);
        let mut pool = BufferPool::new(1);

        for byte in 0..sent.len {
            for bit in 0..8 {
                let mut tampered = sent.ct[..sent.len].to_vec();
                tampered[byte] ^= 1 << bit;
                let mut received = pool.acquire().unwrap();
                received.load(&tampered);
                assert!(matches!(open(&mut received, &keys), Err(Error::InvalidMac)));
                pool.release(received);
            }
        }
    }

    #[test]
    fn padding_is_clamped_and_invisible() {
        let mut rng = StdRng::seed_from_u64(24);
        let keys = PacketKeys::random(&mut rng);
        let sent = sealed_frame(&keys, b"padded", MSS * 2, &mut rng);
        assert_eq!(sent.len, MSS);

        let mut pool = BufferPool::new(1);
        let mut received = pool.acquire().unwrap();
        received.load(&sent.ct[..sent.len]);
        open(&mut received, &keys).unwrap();
        // the header still frames only the real payload
        let framed = u16::from_be_bytes([
            received.pt[PKT_TLV_OFFSET + 2],
            received.pt[PKT_TLV_OFFSET + 3],
        ]);
        assert_eq!(usize::from(framed), PKT_BODY_OFFSET - PKT_TLV_OFFSET + 6);
    }
}

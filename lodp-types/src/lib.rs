#![no_std]

//! Wire layout shared by the LODP crates.
//!
//! Every packet is `MAC || IV || type || flags || length || body`. The MAC
//! authenticates everything from the IV onward, and the length field counts
//! bytes from the type byte to the end of the unpadded frame, so random
//! padding appended past `length` is covered by the MAC but invisible to
//! parsing.

use core::mem::size_of;

use zerocopy::big_endian;
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Keyed-MAC key size in bytes.
pub const MAC_KEY_LEN: usize = 32;
/// Wire MAC digest size in bytes.
pub const MAC_DIGEST_LEN: usize = 16;
/// Bulk stream-cipher key size in bytes.
pub const BULK_KEY_LEN: usize = 32;
/// Bulk stream-cipher IV size in bytes.
pub const BULK_IV_LEN: usize = 24;
/// X25519 public key size in bytes.
pub const ECDH_PUBLIC_KEY_LEN: usize = 32;
/// X25519 shared secret size in bytes.
pub const ECDH_SECRET_LEN: usize = 32;
/// Size of the cookies this implementation mints (one MAC digest).
pub const COOKIE_LEN: usize = MAC_DIGEST_LEN;

/// Largest datagram the protocol will produce or accept.
pub const MSS: usize = 1280;

/// Offset of the per-packet random IV.
pub const PKT_IV_OFFSET: usize = MAC_DIGEST_LEN;
/// Bytes of MAC + IV prefix ahead of the authenticated plaintext.
pub const PKT_TAG_LEN: usize = MAC_DIGEST_LEN + BULK_IV_LEN;
/// Offset of the type byte, where encryption starts.
pub const PKT_TLV_OFFSET: usize = PKT_TAG_LEN;
/// Type byte, flags byte, big-endian length.
pub const TLV_HEADER_LEN: usize = size_of::<TlvHeader>();
/// Offset of the type-specific body.
pub const PKT_BODY_OFFSET: usize = PKT_TLV_OFFSET + TLV_HEADER_LEN;

/// Most payload bytes one DATA / HEARTBEAT / HEARTBEAT_ACK can carry.
pub const MAX_PAYLOAD_LEN: usize = MSS - PKT_BODY_OFFSET;
/// Longest INIT_ACK cookie an initiator can echo with the HANDSHAKE still
/// fitting in one datagram.
pub const MAX_COOKIE_LEN: usize = MSS - PKT_BODY_OFFSET - HANDSHAKE_FIXED_LEN;

pub const INIT_BODY_LEN: usize = size_of::<InitBody>();
pub const HANDSHAKE_FIXED_LEN: usize = size_of::<HandshakeFixed>();
pub const HANDSHAKE_ACK_BODY_LEN: usize = size_of::<HandshakeAckBody>();

/// The nine packet types. REKEY and REKEY_ACK are reserved by numbering but
/// carry no defined behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Data = 0,
    Init = 1,
    InitAck = 2,
    Handshake = 3,
    HandshakeAck = 4,
    Heartbeat = 5,
    HeartbeatAck = 6,
    Rekey = 7,
    RekeyAck = 8,
}

impl PacketType {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Data),
            1 => Some(Self::Init),
            2 => Some(Self::InitAck),
            3 => Some(Self::Handshake),
            4 => Some(Self::HandshakeAck),
            5 => Some(Self::Heartbeat),
            6 => Some(Self::HeartbeatAck),
            7 => Some(Self::Rekey),
            8 => Some(Self::RekeyAck),
            _ => None,
        }
    }
}

/// Common header at the start of the authenticated plaintext.
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct TlvHeader {
    pub kind: u8,
    pub flags: u8,
    pub length: big_endian::U16,
}

/// INIT body: the initiator's introduction key material, bound into the
/// responder's cookie.
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct InitBody {
    pub intro_mac_key: [u8; MAC_KEY_LEN],
    pub intro_bulk_key: [u8; BULK_KEY_LEN],
}

/// Fixed prefix of the HANDSHAKE body; the echoed cookie trails it.
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct HandshakeFixed {
    pub intro_mac_key: [u8; MAC_KEY_LEN],
    pub intro_bulk_key: [u8; BULK_KEY_LEN],
    pub public_key: [u8; ECDH_PUBLIC_KEY_LEN],
}

/// HANDSHAKE_ACK body: the responder ephemeral and the ntor verifier.
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct HandshakeAckBody {
    pub public_key: [u8; ECDH_PUBLIC_KEY_LEN],
    pub verifier: [u8; MAC_DIGEST_LEN],
}

//! Scratch buffers for packet processing.

use lodp_types::{PacketType, TlvHeader, MSS, PKT_BODY_OFFSET, PKT_TLV_OFFSET, TLV_HEADER_LEN};
use zerocopy::{big_endian, AsBytes};
use zeroize::Zeroize;

/// Scratch space for exactly one packet: a plaintext image and a ciphertext
/// image of the same frame. The envelope codec always reads one image and
/// writes the other.
pub(crate) struct PacketBuffer {
    /// Plaintext image of the frame.
    pub pt: [u8; MSS],
    /// Ciphertext image of the frame.
    pub ct: [u8; MSS],
    /// Bytes in use, counted from offset zero of either image.
    pub len: usize,
}

impl PacketBuffer {
    fn new() -> Box<Self> {
        Box::new(Self { pt: [0; MSS], ct: [0; MSS], len: 0 })
    }

    /// Copies an inbound datagram into the ciphertext image.
    ///
    /// The caller has already bounded `datagram` by `MSS`.
    pub fn load(&mut self, datagram: &[u8]) {
        self.ct[..datagram.len()].copy_from_slice(datagram);
        self.len = datagram.len();
    }

    /// Writes the TLV header into the plaintext image and sizes the buffer
    /// for `body_len` body bytes.
    pub fn set_header(&mut self, kind: PacketType, body_len: usize) {
        let header = TlvHeader {
            kind: kind as u8,
            flags: 0,
            length: big_endian::U16::new((TLV_HEADER_LEN + body_len) as u16),
        };
        self.pt[PKT_TLV_OFFSET..PKT_BODY_OFFSET].copy_from_slice(header.as_bytes());
        self.len = PKT_BODY_OFFSET + body_len;
    }
}

/// Free list of boxed packet buffers. Acquire/release brackets exactly one
/// packet operation; a released buffer is zeroed before it can be reused.
pub(crate) struct BufferPool {
    free: Vec<Box<PacketBuffer>>,
}

impl BufferPool {
    pub fn new(count: usize) -> Self {
        Self { free: (0..count).map(|_| PacketBuffer::new()).collect() }
    }

    pub fn acquire(&mut self) -> Option<Box<PacketBuffer>> {
        self.free.pop()
    }

    pub fn release(&mut self, mut buffer: Box<PacketBuffer>) {
        buffer.pt.zeroize();
        buffer.ct.zeroize();
        buffer.len = 0;
        self.free.push(buffer);
    }
}

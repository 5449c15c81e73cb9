use std::{error, fmt, io};

/// Errors surfaced by the packet engine.
///
/// Receive-path failures are returned to the caller and never answered on
/// the wire; the peer learns nothing from a drop.
#[derive(Debug)]
pub enum Error {
    /// Authentication failed under every key that was tried.
    InvalidMac,
    /// Structural or semantic check failed: bad length, non-zero flags, a
    /// type outside its role/state window, or a reserved type.
    BadPacket,
    /// Cookie matched under neither the current nor the previous key.
    InvalidCookie,
    /// No session matched and this endpoint holds no introduction keys.
    NotResponder,
    /// Key agreement failed or the verifier did not match.
    BadHandshake,
    /// The packet buffer pool is exhausted.
    NoBufs,
    /// The payload would not fit in one datagram.
    MsgSize,
    /// The host send hook failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMac => f.write_str("packet authentication failed"),
            Self::BadPacket => f.write_str("malformed or unexpected packet"),
            Self::InvalidCookie => f.write_str("cookie verification failed"),
            Self::NotResponder => f.write_str("endpoint cannot accept unsolicited packets"),
            Self::BadHandshake => f.write_str("handshake verification failed"),
            Self::NoBufs => f.write_str("packet buffer pool exhausted"),
            Self::MsgSize => f.write_str("payload exceeds the maximum segment size"),
            Self::Io(e) => write!(f, "send hook failed: {e}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

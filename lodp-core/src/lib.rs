//! Wire-level core of the Lightweight Obfuscated Datagram Protocol: the
//! nine-type framing, the encrypt-then-MAC envelope, the cookie-gated
//! three-way handshake with a modified-ntor key agreement, and the per-peer
//! session state machine.
//!
//! The core rides on an unreliable datagram substrate it never touches
//! directly: socket I/O, session lookup by peer address, and timekeeping all
//! belong to the host and are wired in through the [`Host`] trait. One
//! packet is processed to completion at a time; nothing suspends, retries,
//! or queues.

mod buffer;
mod cookie;
mod endpoint;
mod envelope;
mod error;
mod host;
mod session;

pub use endpoint::{Endpoint, EndpointConfig, PeerConfig};
pub use error::Error;
pub use host::Host;
pub use session::{Role, Session, State};

pub use lodp_crypto::{PacketKeys, PublicKey, StaticSecret};
pub use lodp_types::{MAX_PAYLOAD_LEN, MSS};

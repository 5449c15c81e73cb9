use std::io;
use std::net::SocketAddr;

use crate::error::Error;
use crate::session::Session;

/// Integration surface between an [`Endpoint`](crate::Endpoint) and the code
/// hosting it.
///
/// The host owns the socket, the peer-address lookup table, and the sessions
/// themselves; the core calls back out through this trait and never blocks,
/// retries, or queues on its own.
pub trait Host: Sized {
    /// Arbitrary object carried by each session, e.g. connection state.
    type SessionData: Default;

    /// Hand a finished datagram to the substrate. A failure propagates out
    /// of the core as [`Error::Io`].
    fn send_to(&mut self, datagram: &[u8], peer: SocketAddr) -> io::Result<()>;

    /// A responder-side session completed its handshake. Ownership passes to
    /// the host, which must route future datagrams from `peer` back to it.
    fn on_accept(&mut self, session: Session<Self>, peer: SocketAddr);

    /// Handshake outcome for an initiator-side session, delivered exactly
    /// once per session.
    fn on_connect(&mut self, session: &mut Session<Self>, outcome: Result<(), Error>);

    /// Authenticated payload delivered on an established session.
    fn on_recv(&mut self, session: &mut Session<Self>, payload: &[u8]);

    /// The peer echoed one of our heartbeats.
    fn on_heartbeat_ack(&mut self, _session: &mut Session<Self>, _payload: &[u8]) {}

    /// How many random padding bytes to append before encryption. The result
    /// is clamped to what still fits under the MSS.
    fn pad_len(&mut self, _current_len: usize, _max_len: usize) -> usize {
        0
    }
}

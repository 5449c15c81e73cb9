//! Per-peer session state: the connection control block, its state machine,
//! and the outgoing senders.

use std::net::SocketAddr;

use lodp_crypto::ntor::EphemeralKeypair;
use lodp_crypto::{PacketKeys, PublicKey, SessionKeys};
use lodp_types::{
    HandshakeAckBody, HandshakeFixed, InitBody, PacketType, ECDH_PUBLIC_KEY_LEN, MAC_DIGEST_LEN,
    MSS, PKT_BODY_OFFSET,
};
use rand::rngs::StdRng;
use zerocopy::AsBytes;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::buffer::BufferPool;
use crate::endpoint::Endpoint;
use crate::envelope;
use crate::error::Error;
use crate::host::Host;

/// Which side of the handshake this session plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Session lifecycle. Responder-side sessions are born `Established`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Init,
    Handshake,
    Established,
    Error,
}

/// Material a responder keeps so it can retransmit HANDSHAKE_ACK until the
/// peer's first DATA proves the ack arrived.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct AckCache {
    pub public_key: [u8; ECDH_PUBLIC_KEY_LEN],
    pub verifier: [u8; MAC_DIGEST_LEN],
}

/// Per-peer connection control block.
///
/// Owned by the host; every operation that touches the wire borrows the
/// owning [`Endpoint`] alongside it, which is also what guarantees the
/// endpoint outlives its sessions.
pub struct Session<H: Host> {
    pub user_data: H::SessionData,
    peer: SocketAddr,
    pub(crate) role: Role,
    pub(crate) state: State,
    /// Long-term responder key `B` (initiator, during the handshake).
    pub(crate) remote_identity: Option<PublicKey>,
    /// Intro material we advertise in INIT and HANDSHAKE (initiator).
    local_intro: Option<PacketKeys>,
    /// Ephemeral `x`/`X` (initiator, during the handshake).
    pub(crate) ephemeral: Option<EphemeralKeypair>,
    /// Cookie received in INIT_ACK, echoed in HANDSHAKE (initiator).
    pub(crate) cookie: Option<Zeroizing<Vec<u8>>>,
    /// Outbound envelope keys. Until establishment this is the responder's
    /// introduction pair; afterwards the derived directional key.
    pub(crate) tx: PacketKeys,
    /// Inbound envelope keys, phased like `tx`.
    pub(crate) rx: PacketKeys,
    pub(crate) seen_peer_data: bool,
    ack_cache: Option<AckCache>,
}

impl<H: Host> Session<H> {
    pub(crate) fn new_initiator(
        peer: SocketAddr,
        remote_identity: PublicKey,
        remote_intro: PacketKeys,
        local_intro: PacketKeys,
        ephemeral: EphemeralKeypair,
        user_data: H::SessionData,
    ) -> Self {
        Self {
            user_data,
            peer,
            role: Role::Initiator,
            state: State::Init,
            remote_identity: Some(remote_identity),
            local_intro: Some(local_intro),
            ephemeral: Some(ephemeral),
            cookie: None,
            tx: remote_intro.clone(),
            rx: remote_intro,
            seen_peer_data: false,
            ack_cache: None,
        }
    }

    pub(crate) fn new_responder(
        peer: SocketAddr,
        keys: SessionKeys,
        ack_cache: AckCache,
        user_data: H::SessionData,
    ) -> Self {
        Self {
            user_data,
            peer,
            role: Role::Responder,
            state: State::Established,
            remote_identity: None,
            local_intro: None,
            ephemeral: None,
            cookie: None,
            tx: keys.responder.clone(),
            rx: keys.initiator.clone(),
            seen_peer_data: false,
            ack_cache: Some(ack_cache),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }

    /// Sends one DATA datagram to the peer.
    ///
    /// # Panics
    ///
    /// Panics if the session is not established; that is host misuse, not a
    /// peer-triggerable condition.
    pub fn send_data(
        &mut self,
        endpoint: &mut Endpoint,
        host: &mut H,
        payload: &[u8],
    ) -> Result<(), Error> {
        self.send_payload(endpoint, host, PacketType::Data, payload)
    }

    /// Sends a HEARTBEAT carrying `payload`. The peer echoes it back through
    /// [`Host::on_heartbeat_ack`].
    ///
    /// # Panics
    ///
    /// Panics if the session is not established.
    pub fn send_heartbeat(
        &mut self,
        endpoint: &mut Endpoint,
        host: &mut H,
        payload: &[u8],
    ) -> Result<(), Error> {
        self.send_payload(endpoint, host, PacketType::Heartbeat, payload)
    }

    pub(crate) fn send_heartbeat_ack(
        &mut self,
        endpoint: &mut Endpoint,
        host: &mut H,
        payload: &[u8],
    ) -> Result<(), Error> {
        self.send_payload(endpoint, host, PacketType::HeartbeatAck, payload)
    }

    fn send_payload(
        &mut self,
        endpoint: &mut Endpoint,
        host: &mut H,
        kind: PacketType,
        payload: &[u8],
    ) -> Result<(), Error> {
        assert_eq!(self.state, State::Established, "session is not established");
        emit(
            &mut endpoint.pool,
            &mut endpoint.rng,
            host,
            &self.tx,
            self.peer,
            kind,
            &[payload],
        )
    }

    pub(crate) fn send_init(&mut self, endpoint: &mut Endpoint, host: &mut H) -> Result<(), Error> {
        debug_assert_eq!(self.role, Role::Initiator);
        debug_assert_eq!(self.state, State::Init);
        let intro = self
            .local_intro
            .as_ref()
            .expect("initiator advertises intro material until established");
        let body = InitBody {
            intro_mac_key: intro.mac,
            intro_bulk_key: intro.bulk,
        };
        emit(
            &mut endpoint.pool,
            &mut endpoint.rng,
            host,
            &self.tx,
            self.peer,
            PacketType::Init,
            &[body.as_bytes()],
        )
    }

    pub(crate) fn send_handshake(
        &mut self,
        endpoint: &mut Endpoint,
        host: &mut H,
    ) -> Result<(), Error> {
        debug_assert_eq!(self.role, Role::Initiator);
        debug_assert_eq!(self.state, State::Handshake);
        let intro = self
            .local_intro
            .as_ref()
            .expect("initiator advertises intro material until established");
        let ephemeral = self
            .ephemeral
            .as_ref()
            .expect("initiator keeps its ephemeral during the handshake");
        let cookie = self
            .cookie
            .as_ref()
            .expect("cookie is held between INIT_ACK and HANDSHAKE");
        let fixed = HandshakeFixed {
            intro_mac_key: intro.mac,
            intro_bulk_key: intro.bulk,
            public_key: ephemeral.public.to_bytes(),
        };
        emit(
            &mut endpoint.pool,
            &mut endpoint.rng,
            host,
            &self.tx,
            self.peer,
            PacketType::Handshake,
            &[fixed.as_bytes(), &cookie[..]],
        )
    }

    /// Sends (or retransmits) HANDSHAKE_ACK from the cached verifier, under
    /// the endpoint introduction keys.
    pub(crate) fn send_handshake_ack(
        &mut self,
        endpoint: &mut Endpoint,
        host: &mut H,
    ) -> Result<(), Error> {
        debug_assert_eq!(self.role, Role::Responder);
        let cache = self
            .ack_cache
            .as_ref()
            .expect("handshake material is cached until first peer data");
        let body = HandshakeAckBody {
            public_key: cache.public_key,
            verifier: cache.verifier,
        };
        let intro = endpoint.intro.as_ref().ok_or(Error::NotResponder)?;
        emit(
            &mut endpoint.pool,
            &mut endpoint.rng,
            host,
            intro,
            self.peer,
            PacketType::HandshakeAck,
            &[body.as_bytes()],
        )
    }

    /// Re-emits the pending handshake packet (INIT or HANDSHAKE) after the
    /// host decides the previous one was lost. Retransmission timing is the
    /// host's business; the session keeps the material needed to rebuild
    /// either packet until the handshake concludes.
    ///
    /// # Panics
    ///
    /// Panics on a responder-role session or once the handshake concluded.
    pub fn retransmit_handshake(
        &mut self,
        endpoint: &mut Endpoint,
        host: &mut H,
    ) -> Result<(), Error> {
        assert_eq!(self.role, Role::Initiator, "only the initiator retransmits");
        match self.state {
            State::Init => self.send_init(endpoint, host),
            State::Handshake => self.send_handshake(endpoint, host),
            _ => panic!("nothing to retransmit once the handshake concluded"),
        }
    }

    /// Wipes the handshake transients: the ephemeral keypair, the stored
    /// cookie, the advertised intro material, and the peer identity copy.
    /// Each carries a zeroize-on-drop guarantee, so dropping is wiping.
    pub(crate) fn scrub_handshake(&mut self) {
        self.remote_identity = None;
        self.local_intro = None;
        self.ephemeral = None;
        self.cookie = None;
    }

    /// Drops the retransmit cache once the peer's first DATA proves the
    /// HANDSHAKE_ACK arrived.
    pub(crate) fn scrub_ack_cache(&mut self) {
        self.ack_cache = None;
    }
}

/// Common tail of every sender: frame the body, apply the padding policy,
/// seal, hand the datagram to the host, release the buffer on all paths.
pub(crate) fn emit<H: Host>(
    pool: &mut BufferPool,
    rng: &mut StdRng,
    host: &mut H,
    keys: &PacketKeys,
    peer: SocketAddr,
    kind: PacketType,
    parts: &[&[u8]],
) -> Result<(), Error> {
    let body_len: usize = parts.iter().map(|part| part.len()).sum();
    if PKT_BODY_OFFSET + body_len > MSS {
        return Err(Error::MsgSize);
    }
    let mut buffer = pool.acquire().ok_or(Error::NoBufs)?;
    buffer.set_header(kind, body_len);
    let mut offset = PKT_BODY_OFFSET;
    for part in parts {
        buffer.pt[offset..offset + part.len()].copy_from_slice(part);
        offset += part.len();
    }
    let pad = host.pad_len(buffer.len, MSS);
    envelope::seal(&mut buffer, keys, pad, rng);
    let result = host.send_to(&buffer.ct[..buffer.len], peer).map_err(Error::Io);
    pool.release(buffer);
    result
}

//! Process-wide responder identity and the inbound packet dispatcher.

use std::net::SocketAddr;

use lodp_crypto::ntor::{self, EphemeralKeypair};
use lodp_crypto::{ct_eq, PacketKeys, PublicKey, StaticSecret};
use lodp_types::{
    HandshakeAckBody, HandshakeFixed, InitBody, PacketType, TlvHeader, COOKIE_LEN,
    HANDSHAKE_ACK_BODY_LEN, HANDSHAKE_FIXED_LEN, INIT_BODY_LEN, MAX_COOKIE_LEN, MSS,
    PKT_BODY_OFFSET, PKT_TAG_LEN, PKT_TLV_OFFSET, TLV_HEADER_LEN,
};
use log::{debug, trace};
use rand::rngs::StdRng;
use zerocopy::FromBytes;
use zeroize::Zeroizing;

use crate::buffer::{BufferPool, PacketBuffer};
use crate::cookie::CookieKeys;
use crate::envelope;
use crate::error::Error;
use crate::host::Host;
use crate::session::{emit, AckCache, Role, Session, State};

/// Construction parameters for an [`Endpoint`].
pub struct EndpointConfig {
    /// Long-term X25519 identity (the `b`/`B` of the key agreement).
    pub identity: StaticSecret,
    /// Introduction keys to answer pre-session traffic with. `None` makes
    /// this a client-only endpoint that drops unsolicited datagrams.
    pub intro: Option<PacketKeys>,
    /// Buffers in the packet pool.
    pub buffers: usize,
}

impl EndpointConfig {
    pub fn new(identity: StaticSecret) -> Self {
        Self { identity, intro: None, buffers: 16 }
    }
}

/// What an initiator must know about a responder ahead of time, distributed
/// out of band.
pub struct PeerConfig {
    /// The responder's long-term public key.
    pub identity: PublicKey,
    /// The responder's introduction keys.
    pub intro: PacketKeys,
}

/// Which key authenticated an inbound packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyAuth {
    /// The session's receive keys.
    Session,
    /// The endpoint introduction keys.
    Intro,
}

/// Per-process protocol endpoint: identity, introduction keys, cookie keys,
/// the buffer pool, and the RNG. Sessions are owned by the host but every
/// wire operation routes through the endpoint that created them, so the host
/// must keep the endpoint alive until its sessions are gone.
pub struct Endpoint {
    identity: StaticSecret,
    public: PublicKey,
    pub(crate) intro: Option<PacketKeys>,
    cookie_keys: CookieKeys,
    pub(crate) pool: BufferPool,
    pub(crate) rng: StdRng,
}

impl Endpoint {
    /// # Panics
    ///
    /// Panics if `config.buffers < 2`; the dispatcher must be able to hold
    /// an inbound packet and a reply at the same time.
    pub fn new(config: EndpointConfig, mut rng: StdRng) -> Self {
        assert!(config.buffers >= 2, "pool too small to answer packets");
        let public = PublicKey::from(&config.identity);
        let cookie_keys = CookieKeys::new(&mut rng);
        Self {
            identity: config.identity,
            public,
            intro: config.intro,
            cookie_keys,
            pool: BufferPool::new(config.buffers),
            rng,
        }
    }

    /// Long-term public key, for out-of-band distribution to initiators.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Introduction keys, for out-of-band distribution to initiators.
    pub fn intro_keys(&self) -> Option<&PacketKeys> {
        self.intro.as_ref()
    }

    /// Creates an initiator-side session toward `peer` and emits its INIT.
    /// The handshake completes (or fails) inside [`Self::receive`], reported
    /// through [`Host::on_connect`].
    pub fn connect<H: Host>(
        &mut self,
        host: &mut H,
        peer_config: PeerConfig,
        peer: SocketAddr,
        user_data: H::SessionData,
    ) -> Result<Session<H>, Error> {
        let ephemeral = EphemeralKeypair::generate(&mut self.rng);
        let local_intro = PacketKeys::random(&mut self.rng);
        let mut session = Session::new_initiator(
            peer,
            peer_config.identity,
            peer_config.intro,
            local_intro,
            ephemeral,
            user_data,
        );
        session.send_init(self, host)?;
        debug!("connect: INIT sent to {peer}");
        Ok(session)
    }

    /// Feeds one inbound datagram through key selection, decryption,
    /// validation, and the per-type handler.
    ///
    /// `session` is the host's lookup result for `peer`; `now` is a coarse
    /// wall-clock seconds reading used for cookie-key rotation. Failures are
    /// reported to the caller only; nothing is ever answered on the wire.
    pub fn receive<H: Host>(
        &mut self,
        host: &mut H,
        session: Option<&mut Session<H>>,
        datagram: &[u8],
        peer: SocketAddr,
        now: u64,
    ) -> Result<(), Error> {
        if datagram.len() < PKT_BODY_OFFSET || datagram.len() > MSS {
            return Err(Error::BadPacket);
        }
        let mut buffer = self.pool.acquire().ok_or(Error::NoBufs)?;
        buffer.load(datagram);
        let result = self.dispatch(host, session, &mut buffer, peer, now);
        if let Err(error) = &result {
            trace!("dropped datagram from {peer}: {error}");
        }
        self.pool.release(buffer);
        result
    }

    fn dispatch<H: Host>(
        &mut self,
        host: &mut H,
        session: Option<&mut Session<H>>,
        buffer: &mut PacketBuffer,
        peer: SocketAddr,
        now: u64,
    ) -> Result<(), Error> {
        // Key selection: session receive keys first, endpoint introduction
        // keys as the fallback. Which attempt succeeded constrains the
        // admissible packet types below.
        let auth = match &session {
            Some(session) => {
                debug_assert_eq!(session.peer(), peer, "host routed a datagram to the wrong session");
                if envelope::open(buffer, &session.rx).is_ok() {
                    KeyAuth::Session
                } else {
                    let intro = self.intro.as_ref().ok_or(Error::InvalidMac)?;
                    envelope::open(buffer, intro)?;
                    KeyAuth::Intro
                }
            }
            None => {
                let intro = self.intro.as_ref().ok_or(Error::NotResponder)?;
                envelope::open(buffer, intro)?;
                KeyAuth::Intro
            }
        };

        let header = *TlvHeader::ref_from(&buffer.pt[PKT_TLV_OFFSET..PKT_BODY_OFFSET])
            .expect("header slice has the exact size");
        let length = usize::from(header.length.get());
        if length < TLV_HEADER_LEN || length > buffer.len - PKT_TAG_LEN {
            return Err(Error::BadPacket);
        }
        if header.flags != 0 {
            return Err(Error::BadPacket);
        }
        let kind = PacketType::from_wire(header.kind).ok_or(Error::BadPacket)?;
        let body = &buffer.pt[PKT_BODY_OFFSET..PKT_TLV_OFFSET + length];

        match kind {
            PacketType::Data | PacketType::Heartbeat | PacketType::HeartbeatAck => {
                let session = session.ok_or(Error::BadPacket)?;
                if auth != KeyAuth::Session || session.state != State::Established {
                    return Err(Error::BadPacket);
                }
                match kind {
                    PacketType::Data => {
                        if session.role == Role::Responder && !session.seen_peer_data {
                            session.seen_peer_data = true;
                            session.scrub_ack_cache();
                        }
                        host.on_recv(session, body);
                        Ok(())
                    }
                    PacketType::Heartbeat => session.send_heartbeat_ack(self, host, body),
                    _ => {
                        host.on_heartbeat_ack(session, body);
                        Ok(())
                    }
                }
            }

            PacketType::Init => {
                if session.is_some() || length != TLV_HEADER_LEN + INIT_BODY_LEN {
                    return Err(Error::BadPacket);
                }
                let init = InitBody::ref_from(body).expect("length was checked");
                let cookie = self.cookie_keys.generate(
                    now,
                    &mut self.rng,
                    peer,
                    &init.intro_mac_key,
                    &init.intro_bulk_key,
                );
                let intro = self.intro.as_ref().expect("intro keys exist on this path");
                emit(
                    &mut self.pool,
                    &mut self.rng,
                    host,
                    intro,
                    peer,
                    PacketType::InitAck,
                    &[&cookie],
                )?;
                trace!("INIT from {peer}: INIT_ACK issued");
                Ok(())
            }

            PacketType::InitAck => {
                let session = session.ok_or(Error::BadPacket)?;
                if auth != KeyAuth::Session
                    || session.role != Role::Initiator
                    || session.state != State::Init
                {
                    return Err(Error::BadPacket);
                }
                let cookie_len = length - TLV_HEADER_LEN;
                if cookie_len == 0 || cookie_len > MAX_COOKIE_LEN {
                    return Err(Error::BadPacket);
                }
                session.cookie = Some(Zeroizing::new(body.to_vec()));
                session.state = State::Handshake;
                let result = session.send_handshake(self, host);
                if matches!(result, Err(Error::NoBufs)) {
                    session.state = State::Error;
                    session.scrub_handshake();
                    host.on_connect(session, Err(Error::NoBufs));
                }
                result
            }

            PacketType::Handshake => match session {
                None => {
                    if length != TLV_HEADER_LEN + HANDSHAKE_FIXED_LEN + COOKIE_LEN {
                        return Err(Error::BadPacket);
                    }
                    let fixed = HandshakeFixed::ref_from(&body[..HANDSHAKE_FIXED_LEN])
                        .expect("length was checked");
                    let cookie = &body[HANDSHAKE_FIXED_LEN..];
                    self.cookie_keys.verify(
                        now,
                        &mut self.rng,
                        peer,
                        &fixed.intro_mac_key,
                        &fixed.intro_bulk_key,
                        cookie,
                    )?;
                    let initiator_public = PublicKey::from(fixed.public_key);
                    let ephemeral = EphemeralKeypair::generate(&mut self.rng);
                    let (keys, verifier) =
                        ntor::respond(&self.identity, &self.public, &ephemeral, &initiator_public)
                            .map_err(|_| Error::BadHandshake)?;
                    let cache = AckCache {
                        public_key: ephemeral.public.to_bytes(),
                        verifier,
                    };
                    let mut session =
                        Session::new_responder(peer, keys, cache, H::SessionData::default());
                    session.send_handshake_ack(self, host)?;
                    debug!("session from {peer} established");
                    host.on_accept(session, peer);
                    Ok(())
                }
                Some(session) => {
                    // The peer missed our HANDSHAKE_ACK and retransmitted.
                    if auth != KeyAuth::Intro
                        || session.role != Role::Responder
                        || session.seen_peer_data
                    {
                        return Err(Error::BadPacket);
                    }
                    trace!("HANDSHAKE retransmit from {peer}");
                    session.send_handshake_ack(self, host)
                }
            },

            PacketType::HandshakeAck => {
                let session = session.ok_or(Error::BadPacket)?;
                if auth != KeyAuth::Session
                    || session.role != Role::Initiator
                    || session.state != State::Handshake
                    || length != TLV_HEADER_LEN + HANDSHAKE_ACK_BODY_LEN
                {
                    return Err(Error::BadPacket);
                }
                let ack = HandshakeAckBody::ref_from(body).expect("length was checked");
                let responder_ephemeral = PublicKey::from(ack.public_key);
                let identity = session
                    .remote_identity
                    .as_ref()
                    .expect("initiator keeps the peer identity during the handshake");
                let ephemeral = session
                    .ephemeral
                    .as_ref()
                    .expect("initiator keeps its ephemeral during the handshake");
                let outcome = ntor::initiate(ephemeral, identity, &responder_ephemeral);
                match outcome {
                    Ok((keys, verifier)) if ct_eq(&verifier, &ack.verifier) => {
                        session.tx = keys.initiator.clone();
                        session.rx = keys.responder.clone();
                        session.scrub_handshake();
                        session.state = State::Established;
                        debug!("session to {peer} established");
                        host.on_connect(session, Ok(()));
                        Ok(())
                    }
                    _ => {
                        session.scrub_handshake();
                        session.state = State::Error;
                        host.on_connect(session, Err(Error::BadHandshake));
                        Err(Error::BadHandshake)
                    }
                }
            }

            PacketType::Rekey | PacketType::RekeyAck => Err(Error::BadPacket),
        }
    }
}

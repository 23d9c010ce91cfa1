use pki_types::CertificateDer;

use crate::hash_hs::{HandshakeHash, HandshakeHashBuffer};
use crate::key_schedule::{
    KeyScheduleEarly, KeyScheduleHandshake, KeyScheduleTrafficWithClientFinishedPending,
};
use crate::kx::KeyExchange;
use crate::msgs::base::PayloadU16;
use crate::msgs::enums::ExtensionType;
use crate::msgs::handshake::{HasServerExtensions, SessionId};
use crate::persist::Tls13ClientSessionValue;
use crate::rand;
use crate::sign::{CertifiedKey, Signer};
use crate::suites::Tls13CipherSuite;
use crate::enums::SignatureScheme;

pub(super) struct ConnectionRandoms {
    pub(super) client: [u8; 32],
    pub(super) server: [u8; 32],
}

impl ConnectionRandoms {
    pub(super) fn for_client() -> Result<Self, rand::GetRandomFailed> {
        Ok(Self {
            client: rand::random_array()?,
            server: [0u8; 32],
        })
    }
}

/// Tracks what extensions the current ClientHello offered, so the
/// server's responses can be policed: a response extension we did not
/// offer is unsolicited.
pub(super) struct ClientHelloDetails {
    pub(super) sent_extensions: Vec<ExtensionType>,
}

impl ClientHelloDetails {
    pub(super) fn new() -> Self {
        Self {
            sent_extensions: Vec::new(),
        }
    }

    pub(super) fn server_sent_unsolicited_extensions(
        &self,
        received: &impl HasServerExtensions,
        allowed_unsolicited: &[ExtensionType],
    ) -> bool {
        for ext in received.extensions() {
            let ext_type = ext.ext_type();
            if !self.sent_extensions.contains(&ext_type)
                && !allowed_unsolicited.contains(&ext_type)
            {
                log::trace!("Unsolicited extension {:?}", ext_type);
                return true;
            }
        }

        false
    }
}

pub(super) struct ServerCertDetails {
    pub(super) cert_chain: Vec<CertificateDer<'static>>,
}

/// The result of resolving a CertificateRequest against our
/// configuration: what the second flight's Certificate (and perhaps
/// CertificateVerify) will contain.
pub(super) enum ClientAuthDetails {
    /// Send an empty certificate message.
    Empty,
    /// Send the certificate chain and sign with the chosen scheme.
    Verify {
        certkey: CertifiedKey,
        signer: Box<dyn Signer>,
    },
}

impl ClientAuthDetails {
    pub(super) fn resolve(
        certkey: Option<&CertifiedKey>,
        sigschemes: &[SignatureScheme],
    ) -> Self {
        if let Some(certkey) = certkey {
            if let Some(signer) = certkey.key.choose_scheme(sigschemes) {
                log::debug!("Attempting client auth");
                return Self::Verify {
                    certkey: certkey.clone(),
                    signer,
                };
            }
        }

        log::debug!("Client auth requested but no cert/sigscheme available");
        Self::Empty
    }
}

pub(super) struct CertificateRequestDetails {
    pub(super) context: Vec<u8>,
}

/// The key-exchange arrangement the server's ServerHello committed to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum KeyExchangeMode {
    /// `pre_shared_key` only: no forward secrecy.
    Psk,
    /// `key_share` only: a full ECDHE handshake.
    Ephemeral,
    /// `pre_shared_key` plus `key_share`.
    PskEphemeral,
}

impl KeyExchangeMode {
    pub(super) fn uses_psk(&self) -> bool {
        matches!(self, Self::Psk | Self::PskEphemeral)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EarlyDataState {
    Disabled,
    Enabled,
    Offered,
    Rejected,
    Accepted,
}

/// Status of 0-RTT application data for this connection.
pub(super) struct EarlyData {
    state: EarlyDataState,
    queued: Vec<u8>,
    cap: usize,
}

impl EarlyData {
    pub(super) fn new() -> Self {
        Self {
            state: EarlyDataState::Disabled,
            queued: Vec::new(),
            cap: 0,
        }
    }

    pub(super) fn enable(&mut self, cap: usize) {
        if self.state == EarlyDataState::Disabled {
            self.state = EarlyDataState::Enabled;
            self.cap = cap;
        }
    }

    pub(super) fn is_enabled(&self) -> bool {
        matches!(self.state, EarlyDataState::Enabled)
    }

    pub(super) fn is_offered(&self) -> bool {
        matches!(
            self.state,
            EarlyDataState::Offered | EarlyDataState::Accepted
        )
    }

    pub(super) fn queue(&mut self, data: &[u8]) -> bool {
        match self.state {
            EarlyDataState::Enabled if self.queued.len() + data.len() <= self.cap => {
                self.queued.extend_from_slice(data);
                true
            }
            _ => false,
        }
    }

    pub(super) fn offered(&mut self) {
        debug_assert_eq!(self.state, EarlyDataState::Enabled);
        self.state = EarlyDataState::Offered;
    }

    pub(super) fn take_queued(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.queued)
    }

    pub(super) fn rejected(&mut self) {
        if self.state != EarlyDataState::Disabled {
            self.state = EarlyDataState::Rejected;
            self.queued = Vec::new();
        }
    }

    pub(super) fn accepted(&mut self) {
        debug_assert_eq!(self.state, EarlyDataState::Offered);
        self.state = EarlyDataState::Accepted;
    }

    pub(super) fn is_accepted(&self) -> bool {
        self.state == EarlyDataState::Accepted
    }
}

/// Everything with handshake lifetime.  Created when the connection
/// starts its first transition, torn down (and secret material wiped)
/// at success or fatal termination.
pub(super) struct HandshakeDetails {
    pub(super) randoms: ConnectionRandoms,
    pub(super) session_id: SessionId,

    /// Transcript, before the ciphersuite (and so the hash) is known.
    pub(super) transcript_buffer: Option<HandshakeHashBuffer>,
    /// Transcript, once the ciphersuite is known.
    pub(super) transcript: Option<HandshakeHash>,

    pub(super) suite: Option<&'static Tls13CipherSuite>,
    pub(super) offered_key_share: Option<KeyExchange>,
    pub(super) resuming: Option<Tls13ClientSessionValue>,
    pub(super) hello: ClientHelloDetails,

    pub(super) ks_early: Option<KeyScheduleEarly>,
    pub(super) ks_handshake: Option<KeyScheduleHandshake>,
    pub(super) ks_traffic_pending: Option<KeyScheduleTrafficWithClientFinishedPending>,

    pub(super) hello_retry_request_count: u32,
    pub(super) cookie: Option<PayloadU16>,
    pub(super) ccs_sent: bool,

    pub(super) key_exchange_mode: Option<KeyExchangeMode>,
    pub(super) cert_request: Option<CertificateRequestDetails>,
    pub(super) server_cert: Option<ServerCertDetails>,
    pub(super) peer_verified: bool,
    pub(super) client_auth: Option<ClientAuthDetails>,
    pub(super) alpn_protocol: Option<Vec<u8>>,
}

impl HandshakeDetails {
    pub(super) fn new(resuming: Option<Tls13ClientSessionValue>) -> Result<Self, rand::GetRandomFailed> {
        Ok(Self {
            randoms: ConnectionRandoms::for_client()?,
            session_id: SessionId::random()?,
            transcript_buffer: Some(HandshakeHashBuffer::new()),
            transcript: None,
            suite: None,
            offered_key_share: None,
            resuming,
            hello: ClientHelloDetails::new(),
            ks_early: None,
            ks_handshake: None,
            ks_traffic_pending: None,
            hello_retry_request_count: 0,
            cookie: None,
            ccs_sent: false,
            key_exchange_mode: None,
            cert_request: None,
            server_cert: None,
            peer_verified: false,
            client_auth: None,
            alpn_protocol: None,
        })
    }

    /// Fold a complete handshake message into the transcript,
    /// whichever representation is current.
    pub(super) fn transcript_add(&mut self, encoded: &[u8]) {
        match (&mut self.transcript, &mut self.transcript_buffer) {
            (Some(transcript), _) => transcript.add_message(encoded),
            (None, Some(buffer)) => buffer.add_message(encoded),
            (None, None) => debug_assert!(false, "transcript used after teardown"),
        }
    }

    /// Commit to `suite`'s hash, replaying the buffered messages.
    pub(super) fn start_transcript_hash(&mut self, suite: &'static Tls13CipherSuite) {
        if let Some(buffer) = self.transcript_buffer.take() {
            self.transcript = Some(buffer.start_hash(suite.hash_algorithm()));
        }
    }
}

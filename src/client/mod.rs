//! The client-side handshake engine: configuration, the connection
//! state machine, and the negotiated session it produces.

use std::sync::Arc;

use log::{debug, warn};
use pki_types::{CertificateDer, ServerName};
use ring::digest::Digest;

use crate::enums::{CipherSuite, HandshakeType, ProtocolVersion, SignatureScheme};
use crate::error::Error;
use crate::key_log::{KeyLog, NoKeyLog};
use crate::key_schedule::KeyScheduleTraffic;
use crate::kx::SupportedKxGroup;
use crate::msgs::codec::Codec;
use crate::msgs::enums::{MaxFragmentLength, PskKeyExchangeMode};
use crate::msgs::handshake::{HandshakeMessagePayload, HandshakePayload};
use crate::persist::Tls13ClientSessionValue;
use crate::sign::CertifiedKey;
use crate::suites::Tls13CipherSuite;
use crate::transport::{Inbound, MessageTransport};
use crate::verify::{FinishedMessageVerified, ServerCertVerifier};

mod common;
mod hs;
mod tls13;

#[cfg(test)]
mod test;

use common::{EarlyData, HandshakeDetails};

/// How thoroughly to insist on a valid server certificate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthMode {
    /// Do not verify the peer certificate at all.
    ///
    /// This is never the right choice outside of closed test setups.
    None,
    /// Verify the peer certificate, but tolerate failure (the result
    /// is recorded in the negotiated session).
    Optional,
    /// Verify the peer certificate; failure is fatal.
    Required,
}

/// Common configuration for all connections made by a program.
///
/// These are all the options the engine honours; each field has an
/// enumerable effect on the handshake.  The structure is immutable
/// once a handshake has started and may be shared between connections.
pub struct ClientConfig {
    /// Ordered list of ciphersuites, most preferred first.
    pub cipher_suites: Vec<&'static Tls13CipherSuite>,

    /// Ordered list of key exchange groups, most preferred first.
    /// The first entry is the one offered as a key share.
    pub kx_groups: Vec<&'static SupportedKxGroup>,

    /// Ordered list of signature schemes we accept from the peer,
    /// most preferred first.
    pub signature_algorithms: Vec<SignatureScheme>,

    /// Minimum accepted protocol version.  When this admits TLS 1.2 a
    /// legitimate downgrade surfaces as [`Error::Tls12Negotiated`]
    /// instead of an alert.
    pub min_version: ProtocolVersion,

    /// Maximum accepted protocol version.
    pub max_version: ProtocolVersion,

    /// How to verify the server certificate chain.
    pub verifier: Arc<dyn ServerCertVerifier>,

    /// How thoroughly to insist on a valid server certificate.
    pub authmode: AuthMode,

    /// Our own certificate chain and signing key, presented when the
    /// server asks for client authentication.
    pub client_auth: Option<CertifiedKey>,

    /// Which ALPN protocols we include in our `ClientHello`, in order
    /// of preference.
    pub alpn_protocols: Vec<Vec<u8>>,

    /// Which PSK key exchange modes we offer alongside a resumption
    /// ticket.  Empty disables resumption.
    pub psk_modes: Vec<PskKeyExchangeMode>,

    /// Whether 0-RTT application data may be offered when a suitable
    /// ticket is available.
    pub enable_early_data: bool,

    /// Our own cap on how much 0-RTT data we will send, further capped
    /// by the ticket's `max_early_data_size`.
    pub max_early_data_size: u32,

    /// Whether to send the Server Name Indication extension.
    pub enable_sni: bool,

    /// A maximum fragment length to negotiate, if any.
    pub max_fragment_length: Option<MaxFragmentLength>,

    /// Whether to emit the middlebox-compatibility dummy
    /// ChangeCipherSpec records.
    pub enable_middlebox_compat: bool,

    /// How to output key material for debugging.
    pub key_log: Arc<dyn KeyLog>,
}

impl ClientConfig {
    /// Make a configuration with safe defaults and the given verifier.
    pub fn new(verifier: Arc<dyn ServerCertVerifier>) -> Self {
        let signature_algorithms = verifier.supported_verify_schemes();
        Self {
            cipher_suites: crate::suites::DEFAULT_CIPHER_SUITES.to_vec(),
            kx_groups: crate::kx::ALL_KX_GROUPS.to_vec(),
            signature_algorithms,
            min_version: ProtocolVersion::TLSv1_3,
            max_version: ProtocolVersion::TLSv1_3,
            verifier,
            authmode: AuthMode::Required,
            client_auth: None,
            alpn_protocols: Vec::new(),
            psk_modes: vec![PskKeyExchangeMode::PSK_DHE_KE],
            enable_early_data: false,
            max_early_data_size: 0xffff_ffff,
            enable_sni: true,
            max_fragment_length: None,
            enable_middlebox_compat: true,
            key_log: Arc::new(NoKeyLog),
        }
    }

    pub(crate) fn supports_version(&self, v: ProtocolVersion) -> bool {
        u16::from(self.min_version) <= u16::from(v) && u16::from(v) <= u16::from(self.max_version)
    }

    pub(crate) fn find_cipher_suite(
        &self,
        suite: CipherSuite,
    ) -> Option<&'static Tls13CipherSuite> {
        self.cipher_suites
            .iter()
            .copied()
            .find(|cs| cs.suite() == suite)
    }
}

/// What a [`ClientConnection::step`] call produced.
#[derive(Debug, Eq, PartialEq)]
pub enum Status {
    /// A state transition happened; call again.
    Continue,
    /// The engine needs more bytes from the peer before it can
    /// continue.
    WantRead,
    /// The engine has queued records the transport has not flushed.
    WantWrite,
    /// A NewSessionTicket arrived and was attached to the session;
    /// the caller may keep stepping for more.
    ReceivedNewSessionTicket,
    /// The handshake is over (and this call was a no-op).
    Done,
}

/// The handshake proceeds through these states; compare RFC 8446
/// figure 1.  Every [`ClientConnection::step`] call performs at most
/// one state's worth of work.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum HandshakeState {
    HelloRequest,
    ClientHello,
    CcsAfterClientHello,
    EarlyAppData,
    ServerHello,
    EncryptedExtensions,
    CertificateRequest,
    ServerCertificate,
    CertificateVerify,
    ServerFinished,
    EndOfEarlyData,
    CcsAfterServerFinished,
    ClientCertificate,
    ClientCertificateVerify,
    ClientFinished,
    FlushBuffers,
    HandshakeWrapup,
    HandshakeOver,
}

/// Negotiated parameters of a completed handshake, handed to the
/// caller at HANDSHAKE_WRAPUP and updated by later NewSessionTickets.
pub struct NegotiatedSession {
    suite: &'static Tls13CipherSuite,
    alpn_protocol: Option<Vec<u8>>,
    peer_certificates: Vec<CertificateDer<'static>>,
    peer_verified: bool,
    early_data_accepted: bool,
    resumption: Option<Tls13ClientSessionValue>,
}

impl NegotiatedSession {
    /// The agreed ciphersuite.
    pub fn suite(&self) -> &'static Tls13CipherSuite {
        self.suite
    }

    /// The agreed ALPN protocol, if any.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.alpn_protocol.as_deref()
    }

    /// The certificate chain the server presented.  Empty for PSK
    /// resumptions.
    pub fn peer_certificates(&self) -> &[CertificateDer<'static>] {
        &self.peer_certificates
    }

    /// Whether the peer certificate chain passed verification.
    pub fn peer_verified(&self) -> bool {
        self.peer_verified
    }

    /// Whether the server accepted our 0-RTT data.
    pub fn early_data_accepted(&self) -> bool {
        self.early_data_accepted
    }

    /// Take the newest resumable session, if the server issued one.
    pub fn take_resumption(&mut self) -> Option<Tls13ClientSessionValue> {
        self.resumption.take()
    }
}

/// A client-side TLS 1.3 handshake in progress.
///
/// Drive it by calling [`step`] with the record-layer transport until
/// it reports [`Status::Done`] or fails.  The connection never blocks:
/// [`Status::WantRead`] and [`Status::WantWrite`] hand control back to
/// the caller's event loop.
///
/// [`step`]: ClientConnection::step
pub struct ClientConnection {
    pub(super) config: Arc<ClientConfig>,
    pub(super) server_name: ServerName<'static>,
    state: HandshakeState,
    pub(super) hs: Option<HandshakeDetails>,
    pub(super) early_data: EarlyData,
    pub(super) session: Option<NegotiatedSession>,
    pub(super) ks_traffic: Option<KeyScheduleTraffic>,
    pub(super) hash_at_client_finished: Option<Digest>,
    pub(super) resumption: Option<Tls13ClientSessionValue>,
    pub(super) fin_verified: Option<FinishedMessageVerified>,
    fatal: Option<Error>,
}

impl ClientConnection {
    /// Make a new connection to `server_name`, optionally offering
    /// `resumption` (a ticket from a previous session) to the server.
    pub fn new(
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
        resumption: Option<Tls13ClientSessionValue>,
    ) -> Self {
        let mut early_data = EarlyData::new();
        if config.enable_early_data {
            if let Some(resuming) = &resumption {
                if resuming.max_early_data_size() > 0 {
                    let cap = resuming
                        .max_early_data_size()
                        .min(config.max_early_data_size) as usize;
                    early_data.enable(cap);
                }
            }
        }

        Self {
            config,
            server_name,
            state: HandshakeState::HelloRequest,
            hs: None,
            early_data,
            session: None,
            ks_traffic: None,
            hash_at_client_finished: None,
            resumption,
            fin_verified: None,
            fatal: None,
        }
    }

    /// Queue bytes to send as 0-RTT application data.  Returns false
    /// if early data cannot be offered on this connection (no suitable
    /// ticket, disabled, cap exceeded, or the hello already went out).
    pub fn queue_early_data(&mut self, data: &[u8]) -> bool {
        self.early_data.queue(data)
    }

    /// Whether the handshake is still in progress.
    pub fn is_handshaking(&self) -> bool {
        self.state != HandshakeState::HandshakeOver
    }

    /// The negotiated session; available once the handshake is over.
    pub fn session(&self) -> Option<&NegotiatedSession> {
        self.session.as_ref()
    }

    /// Mutable access to the negotiated session (to take resumption
    /// tickets out of it).
    pub fn session_mut(&mut self) -> Option<&mut NegotiatedSession> {
        self.session.as_mut()
    }

    /// RFC 5705 style exporter, available once the handshake is over.
    pub fn export_keying_material(
        &self,
        output: &mut [u8],
        label: &[u8],
        context: Option<&[u8]>,
    ) -> Result<(), Error> {
        match &self.ks_traffic {
            Some(ks) => ks.export_keying_material(output, label, context),
            None => Err(Error::HandshakeNotComplete),
        }
    }

    /// Perform one state transition's worth of handshake work.
    ///
    /// Call repeatedly until [`Status::Done`]; re-enter after
    /// [`Status::WantRead`] / [`Status::WantWrite`] once the transport
    /// has made progress.  On a fatal error the mapped alert has been
    /// queued on the transport, all handshake secrets are destroyed,
    /// and the same error is returned from every later call.
    pub fn step(&mut self, transport: &mut dyn MessageTransport) -> Result<Status, Error> {
        if let Some(err) = &self.fatal {
            return Err(err.clone());
        }

        match self.single_transition(transport) {
            Ok(status) => Ok(status),
            Err(err) => {
                if let Some(alert) = err.alert_description() {
                    warn!("Sending fatal alert {:?}", alert);
                    transport.send_alert(alert);
                }
                // Tear down the handshake; secret material is wiped by
                // the drops.
                self.hs = None;
                self.fatal = Some(err.clone());
                Err(err)
            }
        }
    }

    fn single_transition(
        &mut self,
        transport: &mut dyn MessageTransport,
    ) -> Result<Status, Error> {
        use HandshakeState::*;

        match self.state {
            HelloRequest => {
                hs::start_handshake(self)?;
                self.state = ClientHello;
                Ok(Status::Continue)
            }

            ClientHello => {
                hs::emit_client_hello(self, transport)?;
                self.state = match self.config.enable_middlebox_compat {
                    true => CcsAfterClientHello,
                    false => EarlyAppData,
                };
                Ok(Status::Continue)
            }

            CcsAfterClientHello => {
                let hs = self.hs.as_mut().unwrap();
                if !hs.ccs_sent {
                    transport.write_change_cipher_spec()?;
                    hs.ccs_sent = true;
                }
                self.state = EarlyAppData;
                Ok(Status::Continue)
            }

            EarlyAppData => {
                if self.early_data.is_offered() {
                    let queued = self.early_data.take_queued();
                    if !queued.is_empty() {
                        transport.write_early_data(&queued)?;
                    }
                }
                self.state = ServerHello;
                Ok(Status::Continue)
            }

            ServerHello => {
                let raw = match self.read_message(transport)? {
                    Some(raw) => raw,
                    None => return Ok(Status::WantRead),
                };
                let parsed = HandshakeMessagePayload::read_bytes(&raw)?;
                match &parsed.payload {
                    HandshakePayload::HelloRetryRequest(hrr) => {
                        hs::handle_hello_retry_request(self, transport, hrr, &raw)?;
                        self.state = ClientHello;
                    }
                    HandshakePayload::ServerHello(sh) => {
                        hs::handle_server_hello(self, transport, sh, &raw)?;
                        self.state = EncryptedExtensions;
                    }
                    _ => {
                        return Err(inappropriate_message(
                            parsed.typ,
                            &[HandshakeType::ServerHello],
                        ));
                    }
                }
                Ok(Status::Continue)
            }

            EncryptedExtensions => {
                let raw = match self.read_message(transport)? {
                    Some(raw) => raw,
                    None => return Ok(Status::WantRead),
                };
                let parsed = HandshakeMessagePayload::read_bytes(&raw)?;
                match &parsed.payload {
                    HandshakePayload::EncryptedExtensions(exts) => {
                        tls13::handle_encrypted_extensions(self, exts, &raw)?;
                    }
                    _ => {
                        return Err(inappropriate_message(
                            parsed.typ,
                            &[HandshakeType::EncryptedExtensions],
                        ));
                    }
                }

                // PSK-mode handshakes are not certificate-authenticated.
                let mode = self.hs.as_ref().unwrap().key_exchange_mode.unwrap();
                self.state = match mode.uses_psk() {
                    true => ServerFinished,
                    false => CertificateRequest,
                };
                Ok(Status::Continue)
            }

            CertificateRequest => {
                let raw = match self.read_message(transport)? {
                    Some(raw) => raw,
                    None => return Ok(Status::WantRead),
                };
                let parsed = HandshakeMessagePayload::read_bytes(&raw)?;
                match &parsed.payload {
                    HandshakePayload::CertificateRequest(certreq) => {
                        tls13::handle_certificate_request(self, certreq, &raw)?;
                        self.state = ServerCertificate;
                    }
                    // The CertificateRequest is optional: the server
                    // may go straight to its Certificate.
                    HandshakePayload::Certificate(cert_chain) => {
                        tls13::handle_server_certificate(self, cert_chain, &raw)?;
                        self.state = CertificateVerify;
                    }
                    _ => {
                        return Err(inappropriate_message(
                            parsed.typ,
                            &[
                                HandshakeType::CertificateRequest,
                                HandshakeType::Certificate,
                            ],
                        ));
                    }
                }
                Ok(Status::Continue)
            }

            ServerCertificate => {
                let raw = match self.read_message(transport)? {
                    Some(raw) => raw,
                    None => return Ok(Status::WantRead),
                };
                let parsed = HandshakeMessagePayload::read_bytes(&raw)?;
                match &parsed.payload {
                    HandshakePayload::Certificate(cert_chain) => {
                        tls13::handle_server_certificate(self, cert_chain, &raw)?;
                        self.state = CertificateVerify;
                    }
                    _ => {
                        return Err(inappropriate_message(
                            parsed.typ,
                            &[HandshakeType::Certificate],
                        ));
                    }
                }
                Ok(Status::Continue)
            }

            CertificateVerify => {
                let raw = match self.read_message(transport)? {
                    Some(raw) => raw,
                    None => return Ok(Status::WantRead),
                };
                let parsed = HandshakeMessagePayload::read_bytes(&raw)?;
                match &parsed.payload {
                    HandshakePayload::CertificateVerify(cert_verify) => {
                        tls13::handle_certificate_verify(self, cert_verify, &raw)?;
                        self.state = ServerFinished;
                    }
                    _ => {
                        return Err(inappropriate_message(
                            parsed.typ,
                            &[HandshakeType::CertificateVerify],
                        ));
                    }
                }
                Ok(Status::Continue)
            }

            ServerFinished => {
                let raw = match self.read_message(transport)? {
                    Some(raw) => raw,
                    None => return Ok(Status::WantRead),
                };
                let parsed = HandshakeMessagePayload::read_bytes(&raw)?;
                match &parsed.payload {
                    HandshakePayload::Finished(finished) => {
                        tls13::handle_server_finished(self, finished, &raw, transport)?;
                        self.state = EndOfEarlyData;
                    }
                    _ => {
                        return Err(inappropriate_message(
                            parsed.typ,
                            &[HandshakeType::Finished],
                        ));
                    }
                }
                Ok(Status::Continue)
            }

            EndOfEarlyData => {
                tls13::emit_end_of_early_data(self, transport)?;
                if self.config.enable_middlebox_compat {
                    self.state = CcsAfterServerFinished;
                } else {
                    tls13::install_client_handshake_keys(self, transport);
                    self.state = ClientCertificate;
                }
                Ok(Status::Continue)
            }

            CcsAfterServerFinished => {
                let hs = self.hs.as_mut().unwrap();
                if !hs.ccs_sent {
                    transport.write_change_cipher_spec()?;
                    hs.ccs_sent = true;
                }
                tls13::install_client_handshake_keys(self, transport);
                self.state = ClientCertificate;
                Ok(Status::Continue)
            }

            ClientCertificate => {
                if self.hs.as_ref().unwrap().cert_request.is_some() {
                    let will_sign = tls13::emit_client_certificate(self, transport)?;
                    self.state = match will_sign {
                        true => ClientCertificateVerify,
                        false => ClientFinished,
                    };
                } else {
                    self.state = ClientFinished;
                }
                Ok(Status::Continue)
            }

            ClientCertificateVerify => {
                tls13::emit_client_certificate_verify(self, transport)?;
                self.state = ClientFinished;
                Ok(Status::Continue)
            }

            ClientFinished => {
                tls13::emit_client_finished(self, transport)?;
                self.state = FlushBuffers;
                Ok(Status::Continue)
            }

            FlushBuffers => {
                if transport.wants_flush() {
                    return Ok(Status::WantWrite);
                }
                self.state = HandshakeWrapup;
                Ok(Status::Continue)
            }

            HandshakeWrapup => {
                // Session capture is gated on the server Finished
                // witness produced at SERVER_FINISHED.
                let _fin_verified: FinishedMessageVerified = self
                    .fin_verified
                    .take()
                    .ok_or_else(|| Error::General("finished unverified at wrapup".to_string()))?;

                // Move the negotiated parameters out and destroy the
                // handshake structure (wiping its secrets).
                let hs = self.hs.take().unwrap();
                self.session = Some(NegotiatedSession {
                    suite: hs.suite.unwrap(),
                    alpn_protocol: hs.alpn_protocol.clone(),
                    peer_certificates: hs
                        .server_cert
                        .map(|sc| sc.cert_chain)
                        .unwrap_or_default(),
                    peer_verified: hs.peer_verified,
                    early_data_accepted: self.early_data.is_accepted(),
                    resumption: None,
                });
                debug!("Handshake complete");
                self.state = HandshakeOver;
                Ok(Status::Continue)
            }

            HandshakeOver => self.post_handshake(transport),
        }
    }

    /// After HANDSHAKE_OVER: stepping is a no-op unless the server has
    /// sent us a NewSessionTicket.
    fn post_handshake(&mut self, transport: &mut dyn MessageTransport) -> Result<Status, Error> {
        let raw = match transport.read_handshake()? {
            Some(Inbound::Message(raw)) => raw,
            Some(Inbound::ApplicationData) | None => return Ok(Status::Done),
        };

        let parsed = HandshakeMessagePayload::read_bytes(&raw)?;
        match &parsed.payload {
            HandshakePayload::NewSessionTicket(nst) => {
                tls13::handle_new_session_ticket(self, nst)?;
                Ok(Status::ReceivedNewSessionTicket)
            }
            _ => Err(inappropriate_message(
                parsed.typ,
                &[HandshakeType::NewSessionTicket],
            )),
        }
    }

    fn read_message(
        &mut self,
        transport: &mut dyn MessageTransport,
    ) -> Result<Option<Vec<u8>>, Error> {
        match transport.read_handshake()? {
            Some(Inbound::Message(raw)) => Ok(Some(raw)),
            Some(Inbound::ApplicationData) => Err(crate::error::InvalidMessage::UnexpectedMessage(
                "ApplicationData",
            )
            .into()),
            None => Ok(None),
        }
    }

    pub(super) fn sni_hostname(&self) -> Option<String> {
        match &self.server_name {
            ServerName::DnsName(dns) => Some(dns.as_ref().to_string()),
            _ => None,
        }
    }
}

fn inappropriate_message(got_type: HandshakeType, expect_types: &[HandshakeType]) -> Error {
    Error::InappropriateHandshakeMessage {
        expect_types: expect_types.to_vec(),
        got_type,
    }
}

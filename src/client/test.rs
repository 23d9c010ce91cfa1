//! End-to-end exercises of the handshake state machine against a
//! miniature in-process server built from this crate's own codec and
//! key schedule.  The server side mirrors every transcript and key
//! derivation, so a disagreement anywhere surfaces as a Finished or
//! key mismatch.

use std::collections::VecDeque;
use std::sync::Arc;

use pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use ring::signature::{self, EcdsaKeyPair, KeyPair};

use super::*;
use crate::cipher::{AeadKey, Iv};
use crate::enums::{AlertDescription, NamedGroup};
use crate::error::{CertificateError, PeerMisbehaved};
use crate::hash_hs::{HandshakeHash, HandshakeHashBuffer};
use crate::key_schedule::{
    derive_traffic_keys, KeyScheduleEarly, KeyScheduleHandshake, KeySchedulePreHandshake,
    KeyScheduleTraffic,
};
use crate::kx::{KeyExchange, SupportedKxGroup, SECP256R1, X25519};
use crate::msgs::base::{Payload, PayloadU8, PayloadU16};
use crate::msgs::enums::Compression;
use crate::msgs::handshake::{
    CertReqExtension, CertificateEntry, CertificatePayloadTls13,
    CertificateRequestPayloadTls13, ClientExtension, ClientHelloPayload, DigitallySignedStruct,
    HandshakeMessagePayload, HandshakePayload, HelloRetryExtension, HelloRetryRequest,
    KeyShareEntry, NewSessionTicketExtension, NewSessionTicketPayloadTls13, Random,
    ServerExtension, ServerHelloPayload,
};
use crate::persist::{TimeBase, Tls13ClientSessionValue};
use crate::suites::TLS13_AES_128_GCM_SHA256;
use crate::transport::{Direction, Inbound, MessageTransport};
use crate::verify::{
    construct_tls13_client_verify_message, construct_tls13_server_verify_message,
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};

// ---------------------------------------------------------------- transport

#[derive(Default)]
struct TestTransport {
    inbound: VecDeque<Inbound>,
    outbound: Vec<Vec<u8>>,
    early_data: Vec<u8>,
    ccs_count: u32,
    alerts: Vec<AlertDescription>,
    installs: Vec<(Direction, Vec<u8>, [u8; 12])>,
    plaintext_installs: Vec<Direction>,
    unflushed: bool,
}

impl TestTransport {
    fn new() -> Self {
        Self::default()
    }

    fn push_message(&mut self, encoded: Vec<u8>) {
        self.inbound
            .push_back(Inbound::Message(encoded));
    }

    fn installs_for(&self, direction: Direction) -> Vec<&(Direction, Vec<u8>, [u8; 12])> {
        self.installs
            .iter()
            .filter(|(d, _, _)| *d == direction)
            .collect()
    }
}

impl MessageTransport for TestTransport {
    fn read_handshake(&mut self) -> Result<Option<Inbound>, Error> {
        Ok(self.inbound.pop_front())
    }

    fn write_handshake(&mut self, encoded: &[u8]) -> Result<(), Error> {
        self.outbound.push(encoded.to_vec());
        Ok(())
    }

    fn write_change_cipher_spec(&mut self) -> Result<(), Error> {
        self.ccs_count += 1;
        Ok(())
    }

    fn write_early_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.early_data.extend_from_slice(data);
        Ok(())
    }

    fn install_keys(
        &mut self,
        direction: Direction,
        _suite: &'static Tls13CipherSuite,
        key: AeadKey,
        iv: Iv,
    ) {
        self.installs
            .push((direction, key.as_ref().to_vec(), *iv.value()));
    }

    fn install_plaintext(&mut self, direction: Direction) {
        self.plaintext_installs.push(direction);
    }

    fn send_alert(&mut self, alert: AlertDescription) {
        self.alerts.push(alert);
    }

    fn wants_flush(&self) -> bool {
        self.unflushed
    }
}

// ----------------------------------------------------------------- verifier

/// Accepts any chain whose end entity is a raw P-256 public key, and
/// checks handshake signatures against it.  Nothing here parses
/// X.509; the "certificate" in these tests is the bare public key.
struct TestVerifier;

impl ServerCertVerifier for TestVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        let key = signature::UnparsedPublicKey::new(
            &signature::ECDSA_P256_SHA256_ASN1,
            cert.as_ref(),
        );
        key.verify(message, dss.signature())
            .map(|_| HandshakeSignatureValid::assertion())
            .map_err(|_| CertificateError::BadSignature.into())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![SignatureScheme::ECDSA_NISTP256_SHA256]
    }
}

// ------------------------------------------------------------- test server

/// The server half of the handshakes driven in these tests.  It reuses
/// the crate's transcript and key schedule types directly: both sides
/// must arrive at identical digests and keys for the handshake to
/// conclude.
struct TestServer {
    suite: &'static Tls13CipherSuite,
    transcript: Option<HandshakeHash>,
    signing_key: EcdsaKeyPair,
    ks_handshake: Option<KeyScheduleHandshake>,
    psk: Option<Vec<u8>>,
    accept_early_data: bool,
    request_client_auth: bool,
}

fn generate_p256() -> (Vec<u8>, EcdsaKeyPair) {
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 =
        EcdsaKeyPair::generate_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
    let pair = EcdsaKeyPair::from_pkcs8(
        &signature::ECDSA_P256_SHA256_ASN1_SIGNING,
        pkcs8.as_ref(),
    )
    .unwrap();
    (pkcs8.as_ref().to_vec(), pair)
}

impl TestServer {
    fn new() -> Self {
        let (_, signing_key) = generate_p256();
        Self {
            suite: &TLS13_AES_128_GCM_SHA256,
            transcript: None,
            signing_key,
            ks_handshake: None,
            psk: None,
            accept_early_data: false,
            request_client_auth: false,
        }
    }

    fn cert_der(&self) -> CertificateDer<'static> {
        CertificateDer::from(
            self.signing_key
                .public_key()
                .as_ref()
                .to_vec(),
        )
    }

    fn parse_client_hello(encoded: &[u8]) -> ClientHelloPayload {
        let parsed = HandshakeMessagePayload::read_bytes(encoded).unwrap();
        match parsed.payload {
            HandshakePayload::ClientHello(ch) => ch,
            _ => panic!("expected ClientHello"),
        }
    }

    fn client_key_share(ch: &ClientHelloPayload, group: NamedGroup) -> Vec<u8> {
        for ext in &ch.extensions {
            if let ClientExtension::KeyShare(shares) = ext {
                for share in shares {
                    if share.group == group {
                        return share.payload.0.clone();
                    }
                }
            }
        }
        panic!("no key share for {:?}", group);
    }

    fn verify_binder(&self, ch_encoded: &[u8], ch: &ClientHelloPayload, psk: &[u8]) {
        let offer = ch.preshared_key_offer().expect("no psk offer");
        let parsed = HandshakeMessagePayload::read_bytes(ch_encoded).unwrap();
        let truncated = parsed.encoding_for_binder_signing();
        let hash = ring::digest::digest(self.suite.hash_algorithm(), &truncated);

        let ks_early = KeyScheduleEarly::new(self.suite.hkdf_algorithm, psk);
        let binder = ks_early.resumption_psk_binder_key_and_sign_verify_data(&hash);
        assert_eq!(
            binder.as_ref(),
            &offer.binders[0].0[..],
            "psk binder mismatch"
        );
    }

    /// Answer a ClientHello with a full server flight, queueing it for
    /// the client.  `ecdhe_group` picks the key exchange; `None` means
    /// PSK-only.
    fn respond(
        &mut self,
        transport: &mut TestTransport,
        ch_encoded: &[u8],
        ecdhe_group: Option<&'static SupportedKxGroup>,
    ) {
        let ch = Self::parse_client_hello(ch_encoded);
        self.add_transcript(ch_encoded);

        // -- key exchange
        let (server_share, shared_secret) = match ecdhe_group {
            Some(group) => {
                let client_pub = Self::client_key_share(&ch, group.name);
                let kx = KeyExchange::start(group).unwrap();
                let server_pub = kx.pubkey.as_ref().to_vec();
                let shared = kx.complete(&client_pub).unwrap();
                (
                    Some(KeyShareEntry::new(group.name, &server_pub)),
                    Some(shared.secret_bytes().to_vec()),
                )
            }
            None => (None, None),
        };

        // -- ServerHello
        let mut extensions = vec![ServerExtension::SupportedVersions(ProtocolVersion::TLSv1_3)];
        if let Some(share) = server_share {
            extensions.push(ServerExtension::KeyShare(share));
        }
        if self.psk.is_some() {
            extensions.push(ServerExtension::PresharedKey(0));
        }

        let sh = HandshakeMessagePayload {
            typ: HandshakeType::ServerHello,
            payload: HandshakePayload::ServerHello(ServerHelloPayload {
                legacy_version: ProtocolVersion::TLSv1_2,
                random: Random([0x12; 32]),
                session_id: ch.session_id,
                cipher_suite: self.suite.suite(),
                compression_method: Compression::Null,
                extensions,
            }),
        };
        let sh_encoded = sh.get_encoding();
        self.add_transcript(&sh_encoded);
        transport.push_message(sh_encoded);

        // -- key schedule to the handshake stage
        let ks_pre = match self.psk.clone() {
            Some(psk) => {
                self.verify_binder(ch_encoded, &ch, &psk);
                KeySchedulePreHandshake::from(KeyScheduleEarly::new(
                    self.suite.hkdf_algorithm,
                    &psk,
                ))
            }
            None => KeySchedulePreHandshake::new(self.suite.hkdf_algorithm),
        };

        let ks_start = match &shared_secret {
            Some(shared) => ks_pre.into_handshake(shared),
            None => ks_pre.into_handshake_without_dhe(),
        };

        let hash_at_sh = self.transcript().current_hash();
        let ks_handshake =
            ks_start.derive_handshake_secrets(&hash_at_sh, &crate::key_log::NoKeyLog, &[0u8; 32]);

        // -- EncryptedExtensions
        let mut ee: Vec<ServerExtension> = Vec::new();
        if self.accept_early_data {
            ee.push(ServerExtension::EarlyData);
        }
        let ee_msg = HandshakeMessagePayload {
            typ: HandshakeType::EncryptedExtensions,
            payload: HandshakePayload::EncryptedExtensions(ee),
        };
        self.add_and_send(transport, ee_msg);

        if self.psk.is_none() {
            if self.request_client_auth {
                // -- CertificateRequest
                let cr_msg = HandshakeMessagePayload {
                    typ: HandshakeType::CertificateRequest,
                    payload: HandshakePayload::CertificateRequest(
                        CertificateRequestPayloadTls13 {
                            context: PayloadU8::empty(),
                            extensions: vec![CertReqExtension::SignatureAlgorithms(vec![
                                SignatureScheme::ECDSA_NISTP256_SHA256,
                            ])],
                        },
                    ),
                };
                self.add_and_send(transport, cr_msg);
            }

            // -- Certificate
            let cert_msg = HandshakeMessagePayload {
                typ: HandshakeType::Certificate,
                payload: HandshakePayload::Certificate(CertificatePayloadTls13 {
                    context: PayloadU8::empty(),
                    entries: vec![CertificateEntry::new(self.cert_der())],
                }),
            };
            self.add_and_send(transport, cert_msg);

            // -- CertificateVerify
            let message =
                construct_tls13_server_verify_message(&self.transcript().current_hash());
            let rng = ring::rand::SystemRandom::new();
            let sig = self
                .signing_key
                .sign(&rng, &message)
                .unwrap();
            let cv_msg = HandshakeMessagePayload {
                typ: HandshakeType::CertificateVerify,
                payload: HandshakePayload::CertificateVerify(DigitallySignedStruct::new(
                    SignatureScheme::ECDSA_NISTP256_SHA256,
                    sig.as_ref().to_vec(),
                )),
            };
            self.add_and_send(transport, cv_msg);
        }

        // -- Finished
        let verify_data = ks_handshake.sign_server_finish(&self.transcript().current_hash());
        let fin_msg = HandshakeMessagePayload {
            typ: HandshakeType::Finished,
            payload: HandshakePayload::Finished(Payload::new(verify_data.as_ref().to_vec())),
        };
        self.add_and_send(transport, fin_msg);

        self.ks_handshake = Some(ks_handshake);
    }

    /// Consume the client's second flight, verifying the Finished MAC
    /// (and any client CertificateVerify), and cross-check every key
    /// the client installed into the transport.  Returns the traffic
    /// schedule plus the transcript hash at the client Finished
    /// boundary.
    fn finish(
        &mut self,
        client_flight: &[Vec<u8>],
        transport: &TestTransport,
    ) -> (KeyScheduleTraffic, ring::digest::Digest) {
        let ks_handshake = self.ks_handshake.take().unwrap();

        // inbound handshake protection was installed from the server
        // handshake traffic secret
        let inbound = transport.installs_for(Direction::Inbound);
        let (key, iv) = ks_handshake.server_handshake_keys(self.suite);
        assert_eq!(inbound[0].1, key.as_ref());
        assert_eq!(inbound[0].2, *iv.value());

        let hash_after_server_finished = self.transcript().current_hash();
        let ks_pending = ks_handshake.into_traffic_with_client_finished_pending(
            &hash_after_server_finished,
            &crate::key_log::NoKeyLog,
            &[0u8; 32],
        );

        // ... and inbound application protection from the server
        // application traffic secret
        let (key, iv) = ks_pending.server_application_keys(self.suite);
        assert_eq!(inbound[1].1, key.as_ref());
        assert_eq!(inbound[1].2, *iv.value());

        // the client's handshake-protected flight runs under the keys
        // we derived for it
        let outbound = transport.installs_for(Direction::Outbound);
        let (key, iv) = ks_pending.client_handshake_keys(self.suite);
        let client_hs_install = &outbound[outbound.len() - 2];
        assert_eq!(client_hs_install.1, key.as_ref());
        assert_eq!(client_hs_install.2, *iv.value());

        let mut client_cert: Option<Vec<u8>> = None;
        let mut finished_hash = None;
        let mut finished_tag: Option<Vec<u8>> = None;
        for encoded in client_flight {
            let parsed = HandshakeMessagePayload::read_bytes(encoded).unwrap();
            match &parsed.payload {
                HandshakePayload::Certificate(cert_payload) => {
                    client_cert = cert_payload
                        .entries
                        .first()
                        .map(|entry| entry.cert.as_ref().to_vec());
                }
                HandshakePayload::CertificateVerify(dss) => {
                    let message =
                        construct_tls13_client_verify_message(&self.transcript().current_hash());
                    let key = signature::UnparsedPublicKey::new(
                        &signature::ECDSA_P256_SHA256_ASN1,
                        client_cert.clone().expect("CertificateVerify without cert"),
                    );
                    key.verify(&message, dss.signature())
                        .expect("client CertificateVerify invalid");
                }
                HandshakePayload::Finished(payload) => {
                    finished_hash = Some(self.transcript().current_hash());
                    finished_tag = Some(payload.0.clone());
                }
                HandshakePayload::EndOfEarlyData => {}
                _ => panic!("unexpected message in client flight"),
            }
            self.add_transcript(encoded);
        }

        let (ks_traffic, tag) =
            ks_pending.sign_client_finish(&finished_hash.expect("no client Finished"));
        assert_eq!(
            tag.as_ref(),
            &finished_tag.unwrap()[..],
            "client Finished mismatch"
        );

        // outbound application protection from the client application
        // traffic secret
        let (key, iv) = ks_traffic.client_application_keys(self.suite);
        let client_app_install = &outbound[outbound.len() - 1];
        assert_eq!(client_app_install.1, key.as_ref());
        assert_eq!(client_app_install.2, *iv.value());

        (ks_traffic, self.transcript().current_hash())
    }

    fn add_and_send(&mut self, transport: &mut TestTransport, msg: HandshakeMessagePayload) {
        let encoded = msg.get_encoding();
        self.add_transcript(&encoded);
        transport.push_message(encoded);
    }

    fn add_transcript(&mut self, encoded: &[u8]) {
        if self.transcript.is_none() {
            self.transcript =
                Some(HandshakeHashBuffer::new().start_hash(self.suite.hash_algorithm()));
        }
        self.transcript
            .as_mut()
            .unwrap()
            .add_message(encoded);
    }

    fn transcript(&self) -> &HandshakeHash {
        self.transcript.as_ref().unwrap()
    }
}

// -------------------------------------------------------------- plumbing

fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new(Arc::new(TestVerifier));
    config.cipher_suites = vec![&TLS13_AES_128_GCM_SHA256];
    config.kx_groups = vec![&X25519];
    config
}

fn server_name() -> ServerName<'static> {
    ServerName::try_from("testserver.com")
        .unwrap()
        .to_owned()
}

/// Step until the engine wants I/O or finishes.
fn drive(conn: &mut ClientConnection, transport: &mut TestTransport) -> Result<Status, Error> {
    loop {
        match conn.step(transport)? {
            Status::Continue => continue,
            other => return Ok(other),
        }
    }
}

fn make_ticket(secret: Vec<u8>, max_early_data_size: u32) -> Tls13ClientSessionValue {
    Tls13ClientSessionValue::new(
        &TLS13_AES_128_GCM_SHA256,
        vec![0x74; 32],
        secret,
        TimeBase::now().unwrap(),
        3600,
        0x2a2a_2a2a,
        max_early_data_size,
    )
}

// ------------------------------------------------------------------ tests

#[test]
fn happy_ecdhe_handshake() {
    let config = Arc::new(test_config());
    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();
    let mut server = TestServer::new();

    // client flight one
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    assert_eq!(transport.outbound.len(), 1);
    assert_eq!(transport.ccs_count, 1);

    // server flight
    let ch = transport.outbound[0].clone();
    server.respond(&mut transport, &ch, Some(&X25519));

    // client runs to completion
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::Done);
    assert!(!conn.is_handshaking());

    // client second flight is just Finished
    assert_eq!(transport.outbound.len(), 2);

    // two installs inbound (handshake, application), two outbound
    assert_eq!(transport.installs_for(Direction::Inbound).len(), 2);
    assert_eq!(transport.installs_for(Direction::Outbound).len(), 2);

    // the server agrees about every key and the Finished MACs
    let client_flight = transport.outbound[1..].to_vec();
    server.finish(&client_flight, &transport);

    // session captured
    let session = conn.session().unwrap();
    assert_eq!(
        session.suite().suite(),
        CipherSuite::TLS13_AES_128_GCM_SHA256
    );
    assert!(session.peer_verified());
    assert_eq!(session.peer_certificates().len(), 1);
    assert!(!session.early_data_accepted());
    assert!(session.alpn_protocol().is_none());

    // no alerts on the happy path
    assert!(transport.alerts.is_empty());

    // idempotence: stepping a finished connection is a no-op
    assert_eq!(conn.step(&mut transport).unwrap(), Status::Done);
    assert_eq!(conn.step(&mut transport).unwrap(), Status::Done);
}

#[test]
fn hello_retry_request_path() {
    let mut config = test_config();
    config.kx_groups = vec![&X25519, &SECP256R1];
    let config = Arc::new(config);
    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let ch1 = transport.outbound[0].clone();

    // the first hello offers our preferred group only
    let parsed_ch1 = TestServer::parse_client_hello(&ch1);
    let _ = TestServer::client_key_share(&parsed_ch1, NamedGroup::X25519);

    // server demands secp256r1, with a cookie
    let hrr = HandshakeMessagePayload {
        typ: HandshakeType::HelloRetryRequest,
        payload: HandshakePayload::HelloRetryRequest(HelloRetryRequest {
            legacy_version: ProtocolVersion::TLSv1_2,
            session_id: parsed_ch1.session_id,
            cipher_suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
            extensions: vec![
                HelloRetryExtension::SupportedVersions(ProtocolVersion::TLSv1_3),
                HelloRetryExtension::KeyShare(NamedGroup::secp256r1),
                HelloRetryExtension::Cookie(PayloadU16::new(vec![0xc0, 0x0c, 0x1e])),
            ],
        }),
    };
    let hrr_encoded = hrr.get_encoding();
    transport.push_message(hrr_encoded.clone());

    // client retries
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    assert_eq!(transport.outbound.len(), 2);
    let ch2 = transport.outbound[1].clone();

    {
        let ch = TestServer::parse_client_hello(&ch2);

        // cookie echoed verbatim, new share for the requested group
        let cookie = ch
            .extensions
            .iter()
            .find_map(|ext| match ext {
                ClientExtension::Cookie(c) => Some(c.0.clone()),
                _ => None,
            })
            .expect("no cookie echoed");
        assert_eq!(cookie, vec![0xc0, 0x0c, 0x1e]);
        let _ = TestServer::client_key_share(&ch, NamedGroup::secp256r1);
    }

    // server transcript: message_hash(CH1) || HRR || CH2 ...
    let mut server = TestServer::new();
    {
        let mut buffer = HandshakeHashBuffer::new();
        buffer.add_message(&ch1);
        let mut transcript = buffer.start_hash(server.suite.hash_algorithm());
        transcript.rollup_for_hrr();
        transcript.add_message(&hrr_encoded);
        server.transcript = Some(transcript);
    }
    server.respond(&mut transport, &ch2, Some(&SECP256R1));

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::Done);

    let client_flight = transport.outbound[2..].to_vec();
    server.finish(&client_flight, &transport);

    let session = conn.session().unwrap();
    assert_eq!(
        session.suite().suite(),
        CipherSuite::TLS13_AES_128_GCM_SHA256
    );
    assert!(transport.alerts.is_empty());
}

#[test]
fn second_hello_retry_request_is_fatal() {
    let mut config = test_config();
    config.kx_groups = vec![&X25519, &SECP256R1];
    let config = Arc::new(config);
    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let session_id = TestServer::parse_client_hello(&transport.outbound[0]).session_id;

    let hrr = |group| HandshakeMessagePayload {
        typ: HandshakeType::HelloRetryRequest,
        payload: HandshakePayload::HelloRetryRequest(HelloRetryRequest {
            legacy_version: ProtocolVersion::TLSv1_2,
            session_id,
            cipher_suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
            extensions: vec![
                HelloRetryExtension::SupportedVersions(ProtocolVersion::TLSv1_3),
                HelloRetryExtension::KeyShare(group),
            ],
        }),
    };

    transport.push_message(hrr(NamedGroup::secp256r1).get_encoding());
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);

    transport.push_message(hrr(NamedGroup::X25519).get_encoding());
    let err = drive(&mut conn, &mut transport).unwrap_err();
    assert_eq!(
        err,
        Error::PeerMisbehaved(PeerMisbehaved::TooManyHelloRetryRequests)
    );
    assert_eq!(transport.alerts, vec![AlertDescription::UnexpectedMessage]);

    // the error is sticky
    assert_eq!(conn.step(&mut transport).unwrap_err(), err);
}

#[test]
fn psk_only_resumption() {
    let psk = vec![0x1a; 32];

    let mut config = test_config();
    config.psk_modes = vec![PskKeyExchangeMode::PSK_KE];
    let config = Arc::new(config);

    let mut conn =
        ClientConnection::new(config, server_name(), Some(make_ticket(psk.clone(), 0)));
    let mut transport = TestTransport::new();
    let mut server = TestServer::new();
    server.psk = Some(psk);

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let ch = transport.outbound[0].clone();

    // the hello carries the offer: modes, then the PSK itself last
    {
        let parsed = TestServer::parse_client_hello(&ch);
        let offer = parsed.preshared_key_offer().expect("no psk offered");
        assert_eq!(offer.identities[0].identity.0, vec![0x74; 32]);
        assert_eq!(
            parsed.extensions.last().map(ClientExtension::ext_type),
            Some(crate::msgs::enums::ExtensionType::PreSharedKey)
        );
    }

    // PSK-only: no key_share in the ServerHello, no certificates
    server.respond(&mut transport, &ch, None);
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::Done);

    let client_flight = transport.outbound[1..].to_vec();
    server.finish(&client_flight, &transport);

    let session = conn.session().unwrap();
    assert!(session.peer_certificates().is_empty());
    assert!(!session.peer_verified());
    assert!(transport.alerts.is_empty());
}

#[test]
fn early_data_accepted() {
    let psk = vec![0x3c; 32];

    let mut config = test_config();
    config.psk_modes = vec![PskKeyExchangeMode::PSK_DHE_KE];
    config.enable_early_data = true;
    let config = Arc::new(config);

    let mut conn = ClientConnection::new(
        config,
        server_name(),
        Some(make_ticket(psk.clone(), 16384)),
    );
    assert!(conn.queue_early_data(b"hi"));

    let mut transport = TestTransport::new();
    let mut server = TestServer::new();
    server.psk = Some(psk.clone());
    server.accept_early_data = true;

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let ch = transport.outbound[0].clone();
    assert_eq!(transport.early_data, b"hi");

    // the first outbound install is the early traffic keys
    {
        let hash = ring::digest::digest(TLS13_AES_128_GCM_SHA256.hash_algorithm(), &ch);
        let ks_early = KeyScheduleEarly::new(TLS13_AES_128_GCM_SHA256.hkdf_algorithm, &psk);
        let early_secret =
            ks_early.client_early_traffic_secret(&hash, &crate::key_log::NoKeyLog, &[0u8; 32]);
        let (key, iv) = derive_traffic_keys(&early_secret, &TLS13_AES_128_GCM_SHA256);
        let outbound = transport.installs_for(Direction::Outbound);
        assert_eq!(outbound[0].1, key.as_ref());
        assert_eq!(outbound[0].2, *iv.value());
    }

    server.respond(&mut transport, &ch, Some(&X25519));
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::Done);

    // EndOfEarlyData precedes Finished in the second flight
    let flight: Vec<_> = transport.outbound[1..]
        .iter()
        .map(|encoded| {
            HandshakeMessagePayload::read_bytes(encoded)
                .unwrap()
                .typ
        })
        .collect();
    assert_eq!(
        flight,
        vec![HandshakeType::EndOfEarlyData, HandshakeType::Finished]
    );

    let client_flight = transport.outbound[1..].to_vec();
    server.finish(&client_flight, &transport);

    assert!(conn.session().unwrap().early_data_accepted());
    assert!(transport.alerts.is_empty());
}

#[test]
fn early_data_is_abandoned_on_hello_retry() {
    let psk = vec![0x3c; 32];

    let mut config = test_config();
    config.kx_groups = vec![&X25519, &SECP256R1];
    config.psk_modes = vec![PskKeyExchangeMode::PSK_DHE_KE];
    config.enable_early_data = true;
    let config = Arc::new(config);

    let mut conn = ClientConnection::new(
        config,
        server_name(),
        Some(make_ticket(psk.clone(), 16384)),
    );
    assert!(conn.queue_early_data(b"hi"));

    let mut transport = TestTransport::new();
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let session_id = TestServer::parse_client_hello(&transport.outbound[0]).session_id;

    let hrr = HandshakeMessagePayload {
        typ: HandshakeType::HelloRetryRequest,
        payload: HandshakePayload::HelloRetryRequest(HelloRetryRequest {
            legacy_version: ProtocolVersion::TLSv1_2,
            session_id,
            cipher_suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
            extensions: vec![
                HelloRetryExtension::SupportedVersions(ProtocolVersion::TLSv1_3),
                HelloRetryExtension::KeyShare(NamedGroup::secp256r1),
            ],
        }),
    };
    transport.push_message(hrr.get_encoding());
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);

    // the engine reverted our sending direction to cleartext, and the
    // second hello no longer offers early data
    assert_eq!(transport.plaintext_installs, vec![Direction::Outbound]);
    let ch2 = TestServer::parse_client_hello(&transport.outbound[1]);
    assert!(!ch2
        .extensions
        .iter()
        .any(|ext| matches!(ext, ClientExtension::EarlyData)));
}

#[test]
fn client_authentication() {
    let (client_pkcs8, client_pair) = generate_p256();
    let client_cert = CertificateDer::from(client_pair.public_key().as_ref().to_vec());

    let mut config = test_config();
    let key = crate::sign::any_ecdsa_type(&PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        client_pkcs8,
    )))
    .unwrap();
    config.client_auth = Some(crate::sign::CertifiedKey::new(vec![client_cert], key));
    let config = Arc::new(config);

    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();
    let mut server = TestServer::new();
    server.request_client_auth = true;

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let ch = transport.outbound[0].clone();
    server.respond(&mut transport, &ch, Some(&X25519));
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::Done);

    // second flight: Certificate, CertificateVerify, Finished
    let flight: Vec<_> = transport.outbound[1..]
        .iter()
        .map(|encoded| {
            HandshakeMessagePayload::read_bytes(encoded)
                .unwrap()
                .typ
        })
        .collect();
    assert_eq!(
        flight,
        vec![
            HandshakeType::Certificate,
            HandshakeType::CertificateVerify,
            HandshakeType::Finished,
        ]
    );

    // the server verifies our CertificateVerify and Finished
    let client_flight = transport.outbound[1..].to_vec();
    server.finish(&client_flight, &transport);
    assert!(transport.alerts.is_empty());
}

#[test]
fn downgrade_sentinel_is_fatal() {
    let config = Arc::new(test_config());
    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let session_id = TestServer::parse_client_hello(&transport.outbound[0]).session_id;

    let mut random = [0x21; 32];
    random[24..].copy_from_slice(b"DOWNGRD\x01");

    let sh = HandshakeMessagePayload {
        typ: HandshakeType::ServerHello,
        payload: HandshakePayload::ServerHello(ServerHelloPayload {
            legacy_version: ProtocolVersion::TLSv1_2,
            random: Random(random),
            session_id,
            cipher_suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
            compression_method: Compression::Null,
            extensions: vec![],
        }),
    };
    transport.push_message(sh.get_encoding());

    let err = drive(&mut conn, &mut transport).unwrap_err();
    assert_eq!(
        err,
        Error::PeerMisbehaved(PeerMisbehaved::AttemptedDowngradeToTls12WhenTls13IsSupported)
    );
    assert_eq!(transport.alerts, vec![AlertDescription::IllegalParameter]);
}

#[test]
fn bad_finished_is_fatal() {
    let config = Arc::new(test_config());
    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();
    let mut server = TestServer::new();

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let ch = transport.outbound[0].clone();
    server.respond(&mut transport, &ch, Some(&X25519));

    // corrupt the last byte of the server Finished's verify_data
    if let Some(Inbound::Message(bytes)) = transport.inbound.back_mut() {
        *bytes.last_mut().unwrap() ^= 0x01;
    }

    let err = drive(&mut conn, &mut transport).unwrap_err();
    assert_eq!(err, Error::DecryptError);
    assert_eq!(transport.alerts, vec![AlertDescription::DecryptError]);

    // a failed handshake leaves no residual session state
    assert!(conn.session().is_none());
}

#[test]
fn new_session_ticket_after_handshake() {
    let config = Arc::new(test_config());
    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();
    let mut server = TestServer::new();

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let ch = transport.outbound[0].clone();
    server.respond(&mut transport, &ch, Some(&X25519));
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::Done);

    let client_flight = transport.outbound[1..].to_vec();
    let (ks_traffic, hash_at_client_finished) = server.finish(&client_flight, &transport);

    // server mints a ticket
    let nst = HandshakeMessagePayload {
        typ: HandshakeType::NewSessionTicket,
        payload: HandshakePayload::NewSessionTicket(NewSessionTicketPayloadTls13 {
            lifetime: 7200,
            age_add: 0x0705_0300,
            nonce: PayloadU8::new(vec![0, 0]),
            ticket: PayloadU16::new(vec![0x5e; 48]),
            exts: vec![NewSessionTicketExtension::EarlyData(1024)],
        }),
    };
    transport.push_message(nst.get_encoding());

    assert_eq!(
        drive(&mut conn, &mut transport).unwrap(),
        Status::ReceivedNewSessionTicket
    );

    // the attached resumption PSK matches the server's derivation
    let expected_psk = ks_traffic
        .resumption_master_secret_and_derive_ticket_psk(&hash_at_client_finished, &[0, 0]);

    let session = conn.session_mut().unwrap();
    let resumption = session.take_resumption().unwrap();
    assert_eq!(resumption.secret(), &expected_psk[..]);
    assert_eq!(resumption.ticket(), &[0x5e; 48][..]);
    assert_eq!(resumption.max_early_data_size(), 1024);

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::Done);
}

#[test]
fn unsolicited_encrypted_extension_is_fatal() {
    let config = Arc::new(test_config());
    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();
    let mut server = TestServer::new();

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let ch = transport.outbound[0].clone();
    // claims early data was accepted although none was offered
    server.accept_early_data = true;
    server.respond(&mut transport, &ch, Some(&X25519));

    let err = drive(&mut conn, &mut transport).unwrap_err();
    assert_eq!(
        err,
        Error::PeerMisbehaved(PeerMisbehaved::UnsolicitedEncryptedExtension)
    );
    assert_eq!(
        transport.alerts,
        vec![AlertDescription::UnsupportedExtension]
    );
}

#[test]
fn message_truncated_by_one_byte_is_decode_error() {
    let config = Arc::new(test_config());
    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();
    let mut server = TestServer::new();

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let ch = transport.outbound[0].clone();
    server.respond(&mut transport, &ch, Some(&X25519));

    // truncate the ServerHello: its header length now overruns
    if let Some(Inbound::Message(sh)) = transport.inbound.front_mut() {
        sh.pop();
    }

    let err = drive(&mut conn, &mut transport).unwrap_err();
    assert!(matches!(err, Error::InvalidMessage(_)));
    assert_eq!(transport.alerts, vec![AlertDescription::DecodeError]);
}

#[test]
fn flush_buffers_reports_want_write() {
    let config = Arc::new(test_config());
    let mut conn = ClientConnection::new(config, server_name(), None);
    let mut transport = TestTransport::new();
    let mut server = TestServer::new();

    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantRead);
    let ch = transport.outbound[0].clone();
    server.respond(&mut transport, &ch, Some(&X25519));

    // the transport claims its queue is backed up
    transport.unflushed = true;
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::WantWrite);
    assert!(conn.is_handshaking());

    // progress resumes once it drains
    transport.unflushed = false;
    assert_eq!(drive(&mut conn, &mut transport).unwrap(), Status::Done);
    assert!(conn.session().is_some());
}

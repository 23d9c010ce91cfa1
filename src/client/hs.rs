//! ClientHello-side of the handshake: hello emission (including the
//! HelloRetryRequest rebuild) and processing of the ServerHello-shaped
//! replies that arrive in cleartext.

use log::{debug, trace};

use super::common::KeyExchangeMode;
use super::{ClientConfig, ClientConnection};
use crate::enums::{CipherSuite, HandshakeType, ProtocolVersion};
use crate::error::{Error, InvalidMessage, PeerIncompatible, PeerMisbehaved};
use crate::key_schedule::{derive_traffic_keys, KeyScheduleEarly, KeySchedulePreHandshake};
use crate::kx::KeyExchange;
use crate::msgs::codec::Codec;
use crate::msgs::enums::{Compression, ExtensionType};
use crate::msgs::handshake::{
    ClientExtension, ClientHelloPayload, HandshakeMessagePayload, HandshakePayload,
    HasServerExtensions, HelloRetryRequest, KeyShareEntry, PresharedKeyIdentity,
    PresharedKeyOffer, ServerHelloPayload, DOWNGRADE_SENTINEL_TLS11_OR_BELOW,
    DOWNGRADE_SENTINEL_TLS12,
};
use crate::persist::TimeBase;
use crate::transport::{Direction, MessageTransport};

// Extensions we expect in plaintext in the ServerHello.
static ALLOWED_PLAINTEXT_EXTS: &[ExtensionType] = &[
    ExtensionType::KeyShare,
    ExtensionType::PreSharedKey,
    ExtensionType::SupportedVersions,
];

/// Set up the handshake structure and our initial key share.
pub(super) fn start_handshake(conn: &mut ClientConnection) -> Result<(), Error> {
    let mut hs = super::common::HandshakeDetails::new(conn.resumption.take())?;

    // Single key-share policy: offer our most preferred group only.
    // A server wanting something else costs one HelloRetryRequest.
    let group = conn
        .config
        .kx_groups
        .first()
        .copied()
        .ok_or_else(|| Error::General("no kx groups configured".to_string()))?;
    hs.offered_key_share = Some(KeyExchange::start(group).ok_or(Error::FailedToGetRandomBytes)?);

    // Drop a resumption value we cannot actually use.
    if let Some(resuming) = &hs.resuming {
        let now = TimeBase::now()?;
        let usable = conn
            .config
            .cipher_suites
            .contains(&resuming.suite())
            && !resuming.has_expired(now)
            && !conn.config.psk_modes.is_empty();
        if !usable {
            debug!("Not resuming: ticket unusable with this configuration");
            hs.resuming = None;
        }
    }

    match &hs.resuming {
        Some(_) => debug!("Resuming session"),
        None => debug!("Not resuming any session"),
    }

    conn.hs = Some(hs);
    Ok(())
}

/// Build and send a ClientHello; on the second call this is the
/// post-HelloRetryRequest retry and folds in the cookie and any
/// replacement key share.
pub(super) fn emit_client_hello(
    conn: &mut ClientConnection,
    transport: &mut dyn MessageTransport,
) -> Result<(), Error> {
    let config = conn.config.clone();
    let sni_hostname = conn.sni_hostname();
    let hs = conn.hs.as_mut().unwrap(); // set in HELLO_REQUEST

    let retrying = hs.hello_retry_request_count != 0;

    let mut supported_versions = vec![ProtocolVersion::TLSv1_3];
    if config.supports_version(ProtocolVersion::TLSv1_2) {
        supported_versions.push(ProtocolVersion::TLSv1_2);
    }

    let mut exts = vec![ClientExtension::SupportedVersions(supported_versions)];

    if config.enable_sni {
        if let Some(dns_name) = &sni_hostname {
            exts.push(ClientExtension::make_sni(dns_name));
        }
    }

    exts.push(ClientExtension::NamedGroups(
        config
            .kx_groups
            .iter()
            .map(|skxg| skxg.name)
            .collect(),
    ));
    exts.push(ClientExtension::SignatureAlgorithms(
        config.signature_algorithms.clone(),
    ));

    if let Some(mfl) = config.max_fragment_length {
        exts.push(ClientExtension::MaxFragmentLength(mfl));
    }

    // Single key-share policy, see start_handshake().
    let key_share = hs.offered_key_share.as_ref().unwrap();
    exts.push(ClientExtension::KeyShare(vec![KeyShareEntry::new(
        key_share.group(),
        key_share.pubkey.as_ref(),
    )]));

    if let Some(cookie) = &hs.cookie {
        exts.push(ClientExtension::Cookie(cookie.clone()));
    }

    if hs.resuming.is_some() {
        exts.push(ClientExtension::PresharedKeyModes(
            config.psk_modes.clone(),
        ));
    }

    if !config.alpn_protocols.is_empty() {
        exts.push(ClientExtension::Protocols(
            config
                .alpn_protocols
                .iter()
                .map(|proto| crate::msgs::base::PayloadU8::new(proto.clone()))
                .collect(),
        ));
    }

    // Early data can only ride on the first hello: RFC 8446 forbids it
    // after a HelloRetryRequest.
    let offer_early_data = conn.early_data.is_enabled() && !retrying;
    if offer_early_data {
        exts.push(ClientExtension::EarlyData);
    }

    // Finally the PSK offer, which must be last; the binder is zero
    // here and patched below, because it covers the message containing
    // it.
    let offering_psk = match &hs.resuming {
        Some(resuming) => {
            let obfuscated_ticket_age = resuming.obfuscated_ticket_age(TimeBase::now()?);
            let binder_len = resuming
                .suite()
                .hash_algorithm()
                .output_len;
            exts.push(ClientExtension::PresharedKey(PresharedKeyOffer::new(
                PresharedKeyIdentity::new(resuming.ticket().to_vec(), obfuscated_ticket_age),
                vec![0u8; binder_len],
            )));
            true
        }
        None => false,
    };

    hs.hello.sent_extensions = exts
        .iter()
        .map(ClientExtension::ext_type)
        .collect();

    let mut cipher_suites: Vec<_> = config
        .cipher_suites
        .iter()
        .map(|cs| cs.suite())
        .collect();
    // We don't do renegotiation at all, in fact.
    cipher_suites.push(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);

    let mut chp = HandshakeMessagePayload {
        typ: HandshakeType::ClientHello,
        payload: HandshakePayload::ClientHello(ClientHelloPayload {
            client_version: ProtocolVersion::TLSv1_2,
            random: hs.randoms.client.into(),
            session_id: hs.session_id,
            cipher_suites,
            compression_methods: vec![Compression::Null],
            extensions: exts,
        }),
    };

    if offering_psk {
        // The binder covers the hello up to (but excluding) the binder
        // list itself, hashed with the resumed session's hash.
        let resuming = hs.resuming.as_ref().unwrap();
        let suite = resuming.suite();
        let binder_plaintext = chp.encoding_for_binder_signing();
        let handshake_hash = match (&hs.transcript, &hs.transcript_buffer) {
            (Some(transcript), _) => transcript.hash_given(&binder_plaintext),
            (_, Some(buffer)) => buffer.hash_given(suite.hash_algorithm(), &binder_plaintext),
            _ => return Err(Error::General("no transcript".to_string())),
        };

        let ks_early = KeyScheduleEarly::new(suite.hkdf_algorithm, resuming.secret());
        let binder = ks_early.resumption_psk_binder_key_and_sign_verify_data(&handshake_hash);
        if let HandshakePayload::ClientHello(ch) = &mut chp.payload {
            ch.set_psk_binder(binder.as_ref());
        }
        hs.ks_early = Some(ks_early);
    }

    let encoded = chp.get_encoding();
    trace!("Sending ClientHello {:?}", chp);
    hs.transcript_add(&encoded);
    transport.write_handshake(&encoded)?;

    // With the hello on the wire we can start protecting early data.
    if offer_early_data {
        conn.early_data.offered();

        let resuming = hs.resuming.as_ref().unwrap();
        let suite = resuming.suite();
        let hello_hash = match (&hs.transcript, &hs.transcript_buffer) {
            (Some(transcript), _) => transcript.current_hash(),
            (_, Some(buffer)) => buffer.hash_given(suite.hash_algorithm(), &[]),
            _ => return Err(Error::General("no transcript".to_string())),
        };

        let ks_early = hs.ks_early.as_ref().unwrap(); // offering_psk implied
        let early_secret = ks_early.client_early_traffic_secret(
            &hello_hash,
            &*config.key_log,
            &hs.randoms.client,
        );
        ks_early.early_exporter_master_secret(&hello_hash, &*config.key_log, &hs.randoms.client);

        let (key, iv) = derive_traffic_keys(&early_secret, suite);
        transport.install_keys(Direction::Outbound, suite, key, iv);
        trace!("Starting early data traffic");
    }

    Ok(())
}

/// Process a HelloRetryRequest: validate it, rewrite the transcript
/// with the synthetic `message_hash` message, and prepare the retried
/// hello's parameters.
pub(super) fn handle_hello_retry_request(
    conn: &mut ClientConnection,
    transport: &mut dyn MessageTransport,
    hrr: &HelloRetryRequest,
    raw: &[u8],
) -> Result<(), Error> {
    trace!("Got HRR {:?}", hrr);

    let config = conn.config.clone();
    let hs = conn.hs.as_mut().unwrap();

    if hs.hello_retry_request_count != 0 {
        return Err(PeerMisbehaved::TooManyHelloRetryRequests.into());
    }
    hs.hello_retry_request_count += 1;

    if hrr.has_duplicate_extension() {
        return Err(PeerMisbehaved::DuplicateHelloRetryRequestExtensions.into());
    }

    if hrr.has_unknown_extension() {
        return Err(InvalidMessage::UnknownHelloRetryRequestExtension.into());
    }

    match hrr.supported_versions() {
        Some(ProtocolVersion::TLSv1_3) => {}
        _ => {
            return Err(PeerMisbehaved::IllegalHelloRetryRequestWithUnsupportedVersion.into());
        }
    }

    if hrr.session_id != hs.session_id {
        return Err(PeerMisbehaved::IllegalHelloRetryRequestWithWrongSessionId.into());
    }

    let cookie = hrr.cookie();
    if let Some(cookie) = cookie {
        if cookie.0.is_empty() {
            return Err(PeerMisbehaved::IllegalHelloRetryRequestWithEmptyCookie.into());
        }
    }

    // Single key-share policy, see start_handshake().
    let offered_group = hs.offered_key_share.as_ref().unwrap().group();
    let req_group = hrr.requested_key_share_group();

    // A retry that asks for what it was already given, or for nothing
    // at all, is not a retry.
    if cookie.is_none() && req_group == Some(offered_group) {
        return Err(PeerMisbehaved::IllegalHelloRetryRequestWithOfferedGroup.into());
    }

    if cookie.is_none() && req_group.is_none() {
        return Err(PeerMisbehaved::IllegalHelloRetryRequestWithNoChanges.into());
    }

    let suite = config
        .find_cipher_suite(hrr.cipher_suite)
        .ok_or(PeerMisbehaved::IllegalHelloRetryRequestWithUnofferedCipherSuite)?;

    // The retry selects the ciphersuite for the rest of the handshake.
    hs.suite = Some(suite);
    hs.start_transcript_hash(suite);

    // transcript <- message_hash(ClientHello1) || HelloRetryRequest
    if let Some(transcript) = &mut hs.transcript {
        transcript.rollup_for_hrr();
    }
    hs.transcript_add(raw);

    // Early data is not allowed after a HelloRetryRequest; the second
    // hello goes out in the clear.
    if conn.early_data.is_offered() {
        transport.install_plaintext(Direction::Outbound);
    }
    conn.early_data.rejected();

    if let Some(group) = req_group {
        if group != offered_group {
            let skxg = KeyExchange::choose(group, &config.kx_groups)
                .ok_or(PeerMisbehaved::IllegalHelloRetryRequestWithUnofferedNamedGroup)?;
            hs.offered_key_share =
                Some(KeyExchange::start(skxg).ok_or(Error::FailedToGetRandomBytes)?);
        }
    }

    hs.cookie = cookie.cloned();
    Ok(())
}

/// Process a real ServerHello: negotiate the version and suite, fix
/// the key-exchange mode, run the key exchange and move the key
/// schedule into the handshake stage, installing inbound handshake
/// protection.
pub(super) fn handle_server_hello(
    conn: &mut ClientConnection,
    transport: &mut dyn MessageTransport,
    server_hello: &ServerHelloPayload,
    raw: &[u8],
) -> Result<(), Error> {
    trace!("We got ServerHello {:?}", server_hello);

    let config = conn.config.clone();
    let hs = conn.hs.as_mut().unwrap();

    hs.randoms.server = server_hello.random.0;

    for ext in &server_hello.extensions {
        if !ALLOWED_PLAINTEXT_EXTS.contains(&ext.ext_type()) {
            return Err(PeerMisbehaved::UnexpectedCleartextExtension.into());
        }
    }

    if server_hello.has_duplicate_extension() {
        return Err(PeerMisbehaved::DuplicateServerHelloExtensions.into());
    }

    match server_hello.supported_versions() {
        Some(ProtocolVersion::TLSv1_3) => {}
        Some(_) => {
            return Err(PeerMisbehaved::SelectedTls12UsingTls13VersionExtension.into());
        }
        None => {
            // The server is speaking TLS 1.2 or below.
            return Err(negotiated_pre_tls13(conn, server_hello));
        }
    }

    if server_hello.session_id != hs.session_id {
        return Err(PeerMisbehaved::WrongSessionIdEchoed.into());
    }

    let suite = config
        .find_cipher_suite(server_hello.cipher_suite)
        .ok_or(PeerMisbehaved::SelectedUnofferedCipherSuite)?;

    match hs.suite {
        Some(prev_suite) if prev_suite != suite => {
            return Err(PeerMisbehaved::SelectedDifferentCipherSuiteAfterRetry.into());
        }
        _ => {}
    }
    debug!("Using ciphersuite {:?}", suite.suite());
    hs.suite = Some(suite);
    hs.start_transcript_hash(suite);
    hs.transcript_add(raw);

    let their_share = server_hello.key_share();
    let psk_index = server_hello.psk_index();

    let mode = match (psk_index.is_some(), their_share.is_some()) {
        (false, false) => {
            return Err(PeerIncompatible::NeitherKeyShareNorPskChosen.into());
        }
        (true, false) => KeyExchangeMode::Psk,
        (false, true) => KeyExchangeMode::Ephemeral,
        (true, true) => KeyExchangeMode::PskEphemeral,
    };

    let ks_pre = match psk_index {
        Some(selected_identity) => {
            let ks_early = hs
                .ks_early
                .take()
                .ok_or(PeerMisbehaved::SelectedUnofferedPsk)?;

            // We offer exactly one identity.
            if selected_identity != 0 {
                return Err(PeerMisbehaved::SelectedInvalidPsk.into());
            }

            let required_mode = match mode {
                KeyExchangeMode::Psk => crate::msgs::enums::PskKeyExchangeMode::PSK_KE,
                _ => crate::msgs::enums::PskKeyExchangeMode::PSK_DHE_KE,
            };
            if !config.psk_modes.contains(&required_mode) {
                return Err(PeerMisbehaved::SelectedPskKeyExchangeModeNotOffered.into());
            }

            // ks_early implies an offered resumption.
            let resuming = hs.resuming.as_ref().unwrap();
            if suite
                .can_resume_from(resuming.suite())
                .is_none()
            {
                return Err(PeerMisbehaved::ResumptionOfferedWithIncompatibleCipherSuite.into());
            }

            debug!("Resuming using PSK");
            KeySchedulePreHandshake::from(ks_early)
        }
        None => {
            debug!("Not resuming");
            // Discard the unused early data keys and resumption state.
            conn.early_data.rejected();
            hs.resuming = None;
            hs.ks_early = None;
            KeySchedulePreHandshake::new(suite.hkdf_algorithm)
        }
    };

    let ks_start = match their_share {
        Some(their_share) => {
            // Single key-share policy, see start_handshake().
            let our_share = hs.offered_key_share.take().unwrap();
            if their_share.group != our_share.group() {
                return Err(PeerMisbehaved::WrongGroupForKeyShare.into());
            }

            let shared = our_share
                .complete(&their_share.payload.0)
                .ok_or(PeerMisbehaved::InvalidKeyShare)?;
            ks_pre.into_handshake(shared.secret_bytes())
        }
        None => ks_pre.into_handshake_without_dhe(),
    };

    // transcript now covers ClientHello..ServerHello: handshake
    // traffic secrets are due.
    let hash_at_server_hello = hs
        .transcript
        .as_ref()
        .unwrap() // started above
        .current_hash();
    let ks_handshake = ks_start.derive_handshake_secrets(
        &hash_at_server_hello,
        &*config.key_log,
        &hs.randoms.client,
    );

    let (key, iv) = ks_handshake.server_handshake_keys(suite);
    transport.install_keys(Direction::Inbound, suite, key, iv);

    hs.ks_handshake = Some(ks_handshake);
    hs.key_exchange_mode = Some(mode);
    Ok(())
}

/// The server answered without `supported_versions`: it speaks TLS 1.2
/// or below.  Detect an illegitimate downgrade, then either hand the
/// connection to a TLS 1.2 stack or refuse.
fn negotiated_pre_tls13(conn: &ClientConnection, server_hello: &ServerHelloPayload) -> Error {
    let random = &server_hello.random.0;
    if random[24..] == DOWNGRADE_SENTINEL_TLS12 || random[24..] == DOWNGRADE_SENTINEL_TLS11_OR_BELOW
    {
        // A TLS 1.3-capable server marked this hello as downgraded;
        // since we offered 1.3, somebody is interfering.
        return PeerMisbehaved::AttemptedDowngradeToTls12WhenTls13IsSupported.into();
    }

    if conn.early_data.is_offered() {
        return PeerMisbehaved::OfferedEarlyDataWithOldProtocolVersion.into();
    }

    if conn
        .config
        .supports_version(ProtocolVersion::TLSv1_2)
        && server_hello.legacy_version == ProtocolVersion::TLSv1_2
    {
        Error::Tls12Negotiated
    } else {
        PeerIncompatible::ServerDoesNotSupportTls13.into()
    }
}

/// Check and record the ALPN protocol the server selected in its
/// EncryptedExtensions.
pub(super) fn process_alpn_protocol(
    config: &ClientConfig,
    hs: &mut super::common::HandshakeDetails,
    proto: Option<&[u8]>,
) -> Result<(), Error> {
    if let Some(alpn_protocol) = proto {
        if alpn_protocol.is_empty() {
            return Err(PeerMisbehaved::OfferedEmptyApplicationProtocol.into());
        }

        if !config
            .alpn_protocols
            .iter()
            .any(|offered| offered == alpn_protocol)
        {
            return Err(PeerMisbehaved::SelectedUnofferedApplicationProtocol.into());
        }

        hs.alpn_protocol = Some(alpn_protocol.to_vec());
    }

    debug!("ALPN protocol is {:?}", hs.alpn_protocol);
    Ok(())
}

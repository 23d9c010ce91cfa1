//! Processing of the server's encrypted flight and emission of the
//! client's second flight: EncryptedExtensions through Finished, plus
//! post-handshake NewSessionTicket consumption.

use log::{debug, trace, warn};
use pki_types::UnixTime;
use subtle::ConstantTimeEq;

use super::common::{ClientAuthDetails, ServerCertDetails};
use super::{AuthMode, ClientConnection};
use crate::enums::HandshakeType;
use crate::error::{Error, InvalidMessage, PeerIncompatible, PeerMisbehaved};
use crate::msgs::base::{Payload, PayloadU8};
use crate::msgs::codec::Codec;
use crate::msgs::enums::ExtensionType;
use crate::msgs::handshake::{
    CertificatePayloadTls13, CertificateRequestPayloadTls13, DigitallySignedStruct,
    HandshakeMessagePayload, HandshakePayload, HasServerExtensions,
    NewSessionTicketPayloadTls13, ServerExtension,
};
use crate::persist::{Tls13ClientSessionValue, TimeBase};
use crate::transport::{Direction, MessageTransport};
use crate::verify::{
    construct_tls13_client_verify_message, construct_tls13_server_verify_message,
    FinishedMessageVerified,
};

// Extensions the server may not move into EncryptedExtensions, plus
// everything it never offered: outside this closed set, nothing is
// tolerated there.
static DISALLOWED_ENCRYPTED_EXTS: &[ExtensionType] = &[
    ExtensionType::KeyShare,
    ExtensionType::PreSharedKey,
    ExtensionType::SupportedVersions,
    ExtensionType::Cookie,
    ExtensionType::PSKKeyExchangeModes,
    ExtensionType::SignatureAlgorithms,
];

pub(super) fn handle_encrypted_extensions(
    conn: &mut ClientConnection,
    exts: &Vec<ServerExtension>,
    raw: &[u8],
) -> Result<(), Error> {
    debug!("TLS1.3 encrypted extensions: {:?}", exts);

    let config = conn.config.clone();
    let hs = conn.hs.as_mut().unwrap();

    if exts.has_duplicate_extension() {
        return Err(PeerMisbehaved::DuplicateEncryptedExtensions.into());
    }

    if hs
        .hello
        .server_sent_unsolicited_extensions(exts, &[])
    {
        return Err(PeerMisbehaved::UnsolicitedEncryptedExtension.into());
    }

    for ext in exts.extensions() {
        if DISALLOWED_ENCRYPTED_EXTS.contains(&ext.ext_type()) {
            return Err(PeerMisbehaved::DisallowedEncryptedExtension.into());
        }
    }

    super::hs::process_alpn_protocol(&config, hs, exts.alpn_protocol())?;

    if exts.early_data_extension_offered() {
        if !conn.early_data.is_offered() {
            return Err(PeerMisbehaved::EarlyDataExtensionWithoutResumption.into());
        }
        conn.early_data.accepted();
        trace!("Server accepted early data");
    } else if conn.early_data.is_offered() {
        conn.early_data.rejected();
        trace!("Server rejected early data");
    }

    hs.transcript_add(raw);
    Ok(())
}

pub(super) fn handle_certificate_request(
    conn: &mut ClientConnection,
    certreq: &CertificateRequestPayloadTls13,
    raw: &[u8],
) -> Result<(), Error> {
    debug!("Got CertificateRequest {:?}", certreq);

    let config = conn.config.clone();
    let hs = conn.hs.as_mut().unwrap();

    // Must be empty during the handshake; nonempty contexts belong to
    // post-handshake authentication, which we do not offer.
    if !certreq.context.0.is_empty() {
        return Err(InvalidMessage::InvalidCertRequest.into());
    }

    let no_sigschemes = Vec::new();
    let compat_sigschemes = certreq
        .sigalgs_extension()
        .unwrap_or(&no_sigschemes)
        .iter()
        .copied()
        .filter(|scheme| scheme.supported_in_tls13())
        .collect::<Vec<_>>();

    if compat_sigschemes.is_empty() {
        return Err(PeerIncompatible::NoCertificateRequestSignatureSchemesInCommon.into());
    }

    hs.client_auth = Some(ClientAuthDetails::resolve(
        config.client_auth.as_ref(),
        &compat_sigschemes,
    ));
    hs.cert_request = Some(super::common::CertificateRequestDetails {
        context: certreq.context.0.clone(),
    });

    hs.transcript_add(raw);
    Ok(())
}

pub(super) fn handle_server_certificate(
    conn: &mut ClientConnection,
    cert_chain: &CertificatePayloadTls13,
    raw: &[u8],
) -> Result<(), Error> {
    let hs = conn.hs.as_mut().unwrap();

    // This context is only used for post-handshake auth; during the
    // handshake the server's value must be empty.
    if !cert_chain.context.0.is_empty() {
        return Err(InvalidMessage::InvalidCertRequest.into());
    }

    if cert_chain.any_entry_has_duplicate_extension() {
        return Err(PeerMisbehaved::BadCertChainExtensions.into());
    }

    if cert_chain.entries.is_empty() {
        return Err(Error::NoCertificatesPresented);
    }

    hs.server_cert = Some(ServerCertDetails {
        cert_chain: cert_chain
            .clone()
            .into_certificate_chain(),
    });

    hs.transcript_add(raw);
    Ok(())
}

pub(super) fn handle_certificate_verify(
    conn: &mut ClientConnection,
    cert_verify: &DigitallySignedStruct,
    raw: &[u8],
) -> Result<(), Error> {
    trace!("Server cert verify {:?}", cert_verify);

    let config = conn.config.clone();
    let hs = conn.hs.as_mut().unwrap();

    // The scheme must be one we offered, and one TLS 1.3 permits for
    // server signatures.
    if !config
        .signature_algorithms
        .contains(&cert_verify.scheme)
        || !cert_verify.scheme.supported_in_tls13()
    {
        return Err(PeerMisbehaved::SignedHandshakeWithUnadvertisedSigScheme.into());
    }

    let server_cert = hs.server_cert.as_ref().unwrap(); // state order

    // 1. Verify the certificate chain.
    let (end_entity, intermediates) = server_cert
        .cert_chain
        .split_first()
        .ok_or(Error::NoCertificatesPresented)?;

    match config.authmode {
        AuthMode::None => {
            warn!("Peer certificate NOT verified: authmode is None");
        }
        AuthMode::Optional | AuthMode::Required => {
            let now = UnixTime::now();
            let verified = config.verifier.verify_server_cert(
                end_entity,
                intermediates,
                &conn.server_name,
                now,
            );

            match verified {
                Ok(_) => hs.peer_verified = true,
                Err(e) if config.authmode == AuthMode::Required => return Err(e),
                Err(e) => {
                    warn!("Peer certificate verification failed (tolerated): {}", e);
                }
            }
        }
    }

    // 2. Verify their signature on the handshake.
    let handshake_hash = hs
        .transcript
        .as_ref()
        .unwrap()
        .current_hash();
    config
        .verifier
        .verify_tls13_signature(
            &construct_tls13_server_verify_message(&handshake_hash),
            end_entity,
            cert_verify,
        )?;

    hs.transcript_add(raw);
    Ok(())
}

pub(super) fn handle_server_finished(
    conn: &mut ClientConnection,
    finished: &Payload,
    raw: &[u8],
    transport: &mut dyn MessageTransport,
) -> Result<(), Error> {
    let config = conn.config.clone();
    let hs = conn.hs.as_mut().unwrap();

    let handshake_hash = hs
        .transcript
        .as_ref()
        .unwrap()
        .current_hash();

    let ks_handshake = hs.ks_handshake.take().unwrap(); // installed at SERVER_HELLO
    let expect_verify_data = ks_handshake.sign_server_finish(&handshake_hash);

    let fin = match ConstantTimeEq::ct_eq(expect_verify_data.as_ref(), &finished.0[..]).into() {
        true => FinishedMessageVerified::assertion(),
        false => return Err(Error::DecryptError),
    };

    hs.transcript_add(raw);

    // Application traffic secrets for both directions hang off the
    // transcript at this point (the server Finished boundary).
    let hash_after_server_finished = hs
        .transcript
        .as_ref()
        .unwrap()
        .current_hash();
    let ks_traffic_pending = ks_handshake.into_traffic_with_client_finished_pending(
        &hash_after_server_finished,
        &*config.key_log,
        &hs.randoms.client,
    );

    let suite = hs.suite.unwrap();
    let (key, iv) = ks_traffic_pending.server_application_keys(suite);
    transport.install_keys(Direction::Inbound, suite, key, iv);

    hs.ks_traffic_pending = Some(ks_traffic_pending);
    conn.fin_verified = Some(fin);
    Ok(())
}

/// Emit EndOfEarlyData if the server accepted our early data.  This is
/// still protected by the early traffic keys, even though it appears
/// in the transcript after the server Finished.
pub(super) fn emit_end_of_early_data(
    conn: &mut ClientConnection,
    transport: &mut dyn MessageTransport,
) -> Result<(), Error> {
    if !conn.early_data.is_accepted() {
        return Ok(());
    }

    let hs = conn.hs.as_mut().unwrap();
    let m = HandshakeMessagePayload {
        typ: HandshakeType::EndOfEarlyData,
        payload: HandshakePayload::EndOfEarlyData,
    };

    let encoded = m.get_encoding();
    hs.transcript_add(&encoded);
    transport.write_handshake(&encoded)?;
    Ok(())
}

/// Switch our sending direction to the handshake traffic keys.  Until
/// now outgoing records were cleartext (or early data under the early
/// keys); the rest of our flight is handshake-protected.
pub(super) fn install_client_handshake_keys(
    conn: &mut ClientConnection,
    transport: &mut dyn MessageTransport,
) {
    let hs = conn.hs.as_mut().unwrap();
    let suite = hs.suite.unwrap();
    let ks = hs.ks_traffic_pending.as_ref().unwrap();

    let (key, iv) = ks.client_handshake_keys(suite);
    transport.install_keys(Direction::Outbound, suite, key, iv);
}

/// Send our Certificate message answering the server's
/// CertificateRequest.  Returns true if we sent a certificate we can
/// also sign for (so a CertificateVerify must follow).
pub(super) fn emit_client_certificate(
    conn: &mut ClientConnection,
    transport: &mut dyn MessageTransport,
) -> Result<bool, Error> {
    let hs = conn.hs.as_mut().unwrap();

    let context = hs
        .cert_request
        .as_ref()
        .map(|req| req.context.clone())
        .unwrap_or_default();

    let (cert_payload, will_sign) = match &hs.client_auth {
        Some(ClientAuthDetails::Verify { certkey, .. }) => {
            let mut payload = CertificatePayloadTls13::new(certkey.cert.iter().cloned());
            payload.context = PayloadU8::new(context);
            (payload, true)
        }
        _ => {
            let mut payload = CertificatePayloadTls13::new(core::iter::empty());
            payload.context = PayloadU8::new(context);
            (payload, false)
        }
    };

    let m = HandshakeMessagePayload {
        typ: HandshakeType::Certificate,
        payload: HandshakePayload::Certificate(cert_payload),
    };

    let encoded = m.get_encoding();
    hs.transcript_add(&encoded);
    transport.write_handshake(&encoded)?;
    Ok(will_sign)
}

pub(super) fn emit_client_certificate_verify(
    conn: &mut ClientConnection,
    transport: &mut dyn MessageTransport,
) -> Result<(), Error> {
    let hs = conn.hs.as_mut().unwrap();

    let handshake_hash = hs
        .transcript
        .as_ref()
        .unwrap()
        .current_hash();
    let message = construct_tls13_client_verify_message(&handshake_hash);

    let dss = match &hs.client_auth {
        Some(ClientAuthDetails::Verify { signer, .. }) => {
            let scheme = signer.scheme();
            let sig = signer.sign(&message)?;
            DigitallySignedStruct::new(scheme, sig)
        }
        _ => return Err(Error::General("no client auth signer".to_string())),
    };

    let m = HandshakeMessagePayload {
        typ: HandshakeType::CertificateVerify,
        payload: HandshakePayload::CertificateVerify(dss),
    };

    let encoded = m.get_encoding();
    hs.transcript_add(&encoded);
    transport.write_handshake(&encoded)?;
    Ok(())
}

/// Send our Finished, move the key schedule to the traffic stage, and
/// switch our sending direction to the application traffic keys.
pub(super) fn emit_client_finished(
    conn: &mut ClientConnection,
    transport: &mut dyn MessageTransport,
) -> Result<(), Error> {
    let hs = conn.hs.as_mut().unwrap();

    let handshake_hash = hs
        .transcript
        .as_ref()
        .unwrap()
        .current_hash();

    let ks_traffic_pending = hs.ks_traffic_pending.take().unwrap(); // set at SERVER_FINISHED
    let (ks_traffic, verify_data) = ks_traffic_pending.sign_client_finish(&handshake_hash);

    let m = HandshakeMessagePayload {
        typ: HandshakeType::Finished,
        payload: HandshakePayload::Finished(Payload::new(verify_data.as_ref().to_vec())),
    };

    let encoded = m.get_encoding();
    hs.transcript_add(&encoded);
    transport.write_handshake(&encoded)?;

    // The resumption master secret hangs off the transcript at the
    // client Finished boundary; keep that digest for later tickets.
    conn.hash_at_client_finished = Some(
        hs.transcript
            .as_ref()
            .unwrap()
            .current_hash(),
    );

    let suite = hs.suite.unwrap();
    let (key, iv) = ks_traffic.client_application_keys(suite);
    transport.install_keys(Direction::Outbound, suite, key, iv);

    conn.ks_traffic = Some(ks_traffic);
    Ok(())
}

/// Consume a post-handshake NewSessionTicket: derive the resumption
/// PSK for it and attach the new resumable session to the negotiated
/// session.
pub(super) fn handle_new_session_ticket(
    conn: &mut ClientConnection,
    nst: &NewSessionTicketPayloadTls13,
) -> Result<(), Error> {
    debug!("Got NewSessionTicket {:?}", nst);

    if nst.has_duplicate_extension() {
        return Err(PeerMisbehaved::DuplicateNewSessionTicketExtensions.into());
    }

    let ks_traffic = conn
        .ks_traffic
        .as_ref()
        .ok_or(Error::HandshakeNotComplete)?;
    let hash_at_client_finished = conn
        .hash_at_client_finished
        .as_ref()
        .ok_or(Error::HandshakeNotComplete)?;

    let secret = ks_traffic
        .resumption_master_secret_and_derive_ticket_psk(hash_at_client_finished, &nst.nonce.0);

    let session = conn
        .session
        .as_mut()
        .ok_or(Error::HandshakeNotComplete)?;

    let now = TimeBase::now()?;
    session.resumption = Some(Tls13ClientSessionValue::new(
        session.suite,
        nst.ticket.0.clone(),
        secret,
        now,
        nst.lifetime,
        nst.age_add,
        nst.max_early_data_size()
            .unwrap_or_default(),
    ));

    Ok(())
}

use pki_types::{CertificateDer, ServerName, UnixTime};
use ring::digest::Digest;

use crate::enums::SignatureScheme;
use crate::error::Error;
use crate::msgs::handshake::DigitallySignedStruct;

/// Something that can verify a server certificate chain, and verify
/// signatures made by certificates.
///
/// This crate treats X.509 parsing and path building as an external
/// concern: implementations typically wrap a webpki-style validator,
/// a platform verifier, or (in tests) nothing at all.
pub trait ServerCertVerifier: Send + Sync {
    /// Verify the end-entity certificate `end_entity` is valid for the
    /// hostname `server_name` and chains to at least one trust anchor.
    ///
    /// `intermediates` contains all certificates other than `end_entity` that
    /// were sent as part of the server's Certificate message.  It is in the
    /// same order that the server sent them and may be empty.
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> Result<ServerCertVerified, Error>;

    /// Verify a signature allegedly by the given server certificate.
    ///
    /// `message` is not hashed, and needs hashing during the verification.
    /// The signature and algorithm are within `dss`.  `cert` contains the
    /// public key to use.
    ///
    /// `cert` has already been validated by [`ServerCertVerifier::verify_server_cert`].
    ///
    /// If and only if the signature is valid, return `Ok(HandshakeSignatureValid)`.
    /// Otherwise, return an error -- typically
    /// [`Error::InvalidCertificate(CertificateError::BadSignature)`].
    ///
    /// [`Error::InvalidCertificate(CertificateError::BadSignature)`]: crate::error::CertificateError::BadSignature
    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error>;

    /// Return the list of SignatureSchemes that this verifier will handle,
    /// in `verify_tls13_signature` calls.
    ///
    /// This should be in priority order, with the most preferred first.
    /// It is offered to the server in the `signature_algorithms` extension.
    fn supported_verify_schemes(&self) -> Vec<SignatureScheme>;
}

/// Zero-sized marker type representing verification of a signature.
#[derive(Debug)]
pub struct HandshakeSignatureValid(());

impl HandshakeSignatureValid {
    /// Make a `HandshakeSignatureValid`
    pub fn assertion() -> Self {
        Self(())
    }
}

/// Zero-sized marker type representing verification of a server cert chain.
#[derive(Debug)]
pub struct ServerCertVerified(());

impl ServerCertVerified {
    /// Make a `ServerCertVerified`
    pub fn assertion() -> Self {
        Self(())
    }
}

/// Zero-sized marker type representing verification of a Finished message.
#[derive(Debug)]
pub(crate) struct FinishedMessageVerified(());

impl FinishedMessageVerified {
    pub(crate) fn assertion() -> Self {
        Self(())
    }
}

/// Constructs the signature message specified in section 4.4.3 of RFC8446:
/// 64 bytes of 0x20, the context string, a single 0x00 separator, then the
/// transcript hash up to and including the Certificate message.
pub(crate) fn construct_tls13_server_verify_message(handshake_hash: &Digest) -> Vec<u8> {
    construct_tls13_verify_message(handshake_hash, b"TLS 1.3, server CertificateVerify\x00")
}

pub(crate) fn construct_tls13_client_verify_message(handshake_hash: &Digest) -> Vec<u8> {
    construct_tls13_verify_message(handshake_hash, b"TLS 1.3, client CertificateVerify\x00")
}

fn construct_tls13_verify_message(
    handshake_hash: &Digest,
    context_string_with_0: &[u8],
) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.resize(64, 0x20u8);
    msg.extend_from_slice(context_string_with_0);
    msg.extend_from_slice(handshake_hash.as_ref());
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_message_layout() {
        let hash = ring::digest::digest(&ring::digest::SHA256, b"transcript");
        let msg = construct_tls13_server_verify_message(&hash);

        assert_eq!(msg.len(), 64 + 34 + 32);
        assert!(msg[..64].iter().all(|&b| b == 0x20));
        // 33-byte context string plus NUL separator
        assert_eq!(&msg[64..98], b"TLS 1.3, server CertificateVerify\x00");
        assert_eq!(&msg[98..], hash.as_ref());
    }
}

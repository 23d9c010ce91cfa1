use std::error::Error as StdError;
use std::fmt;
use std::time::SystemTimeError;

use crate::enums::{AlertDescription, HandshakeType};
use crate::rand;

/// This crate reports protocol errors using this type.
#[non_exhaustive]
#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// We received a TLS handshake message that isn't valid right now.
    /// `expect_types` lists the handshake message types we can expect
    /// right now.  `got_type` is the type we found.
    InappropriateHandshakeMessage {
        /// Which handshake type we expected
        expect_types: Vec<HandshakeType>,
        /// What handshake type we received
        got_type: HandshakeType,
    },

    /// The peer sent us a TLS message with invalid contents.
    InvalidMessage(InvalidMessage),

    /// We couldn't verify a MAC or signature made by the peer.
    /// This is invariably fatal.
    DecryptError,

    /// The peer doesn't support a protocol version/feature we require.
    /// The parameter gives a hint as to what version/feature it is.
    PeerIncompatible(PeerIncompatible),

    /// The peer deviated from the standard TLS protocol.
    /// The parameter gives a hint where.
    PeerMisbehaved(PeerMisbehaved),

    /// We received a fatal alert.  This means the peer is unhappy.
    AlertReceived(AlertDescription),

    /// We saw an invalid certificate.
    ///
    /// The contained error is from the certificate validation trait
    /// implementation.
    InvalidCertificate(CertificateError),

    /// The peer didn't give us any certificates.
    NoCertificatesPresented,

    /// The server negotiated TLS 1.2 legitimately.  This engine only
    /// speaks TLS 1.3; the caller should hand the connection to a
    /// TLS 1.2 implementation.  No alert is queued for this case.
    Tls12Negotiated,

    /// We failed to figure out what time it currently is.
    FailedToGetCurrentTime,

    /// We failed to acquire random bytes from the system.
    FailedToGetRandomBytes,

    /// This function doesn't work until the TLS handshake
    /// is complete.
    HandshakeNotComplete,

    /// A catch-all error for unlikely errors.
    General(String),
}

impl Error {
    /// The alert to queue for the record layer when this error tears
    /// the connection down, or `None` if the error is not alert-worthy
    /// (for example, because the peer alerted us first).
    pub fn alert_description(&self) -> Option<AlertDescription> {
        match self {
            Self::InappropriateHandshakeMessage { .. } => {
                Some(AlertDescription::UnexpectedMessage)
            }
            Self::InvalidMessage(e) => Some((*e).into()),
            Self::DecryptError => Some(AlertDescription::DecryptError),
            Self::PeerIncompatible(e) => Some((*e).into()),
            Self::PeerMisbehaved(e) => Some((*e).into()),
            Self::InvalidCertificate(e) => Some(e.clone().into()),
            Self::NoCertificatesPresented => Some(AlertDescription::BadCertificate),
            Self::FailedToGetCurrentTime
            | Self::FailedToGetRandomBytes
            | Self::General(_) => Some(AlertDescription::InternalError),
            Self::AlertReceived(_) | Self::Tls12Negotiated | Self::HandshakeNotComplete => None,
        }
    }
}

fn join<T: fmt::Debug>(items: &[T]) -> String {
    items
        .iter()
        .map(|x| format!("{:?}", x))
        .collect::<Vec<String>>()
        .join(" or ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InappropriateHandshakeMessage {
                expect_types,
                got_type,
            } => write!(
                f,
                "received unexpected handshake message: got {:?} when expecting {}",
                got_type,
                join::<HandshakeType>(expect_types)
            ),
            Self::InvalidMessage(typ) => {
                write!(f, "received corrupt message of type {:?}", typ)
            }
            Self::DecryptError => write!(f, "cannot verify peer's cryptographic material"),
            Self::PeerIncompatible(why) => write!(f, "peer is incompatible: {:?}", why),
            Self::PeerMisbehaved(why) => write!(f, "peer misbehaved: {:?}", why),
            Self::AlertReceived(alert) => write!(f, "received fatal alert: {:?}", alert),
            Self::InvalidCertificate(e) => {
                write!(f, "invalid peer certificate: {:?}", e)
            }
            Self::NoCertificatesPresented => write!(f, "peer sent no certificates"),
            Self::Tls12Negotiated => {
                write!(f, "peer negotiated TLS 1.2; this engine only speaks TLS 1.3")
            }
            Self::FailedToGetCurrentTime => write!(f, "failed to get current time"),
            Self::FailedToGetRandomBytes => write!(f, "failed to get random bytes"),
            Self::HandshakeNotComplete => write!(f, "handshake not complete"),
            Self::General(err) => write!(f, "unexpected error: {}", err),
        }
    }
}

impl StdError for Error {}

impl From<SystemTimeError> for Error {
    fn from(_: SystemTimeError) -> Self {
        Self::FailedToGetCurrentTime
    }
}

impl From<rand::GetRandomFailed> for Error {
    fn from(_: rand::GetRandomFailed) -> Self {
        Self::FailedToGetRandomBytes
    }
}

impl From<InvalidMessage> for Error {
    fn from(e: InvalidMessage) -> Self {
        Self::InvalidMessage(e)
    }
}

impl From<PeerMisbehaved> for Error {
    fn from(e: PeerMisbehaved) -> Self {
        Self::PeerMisbehaved(e)
    }
}

impl From<PeerIncompatible> for Error {
    fn from(e: PeerIncompatible) -> Self {
        Self::PeerIncompatible(e)
    }
}

impl From<CertificateError> for Error {
    fn from(e: CertificateError) -> Self {
        Self::InvalidCertificate(e)
    }
}

/// A corrupt TLS message payload that resulted in an error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidMessage {
    /// A certificate payload exceeded this implementation's 64KB limit
    CertificatePayloadTooLarge,
    /// Context was incorrectly attached to a certificate request during a handshake.
    InvalidCertRequest,
    /// Message is shorter than the expected length
    MessageTooShort,
    /// Missing data for the named handshake payload value
    MissingData(&'static str),
    /// Trailing data found for the named handshake payload value
    TrailingData(&'static str),
    /// A peer sent an unexpected message type.
    UnexpectedMessage(&'static str),
    /// A peer sent a non-null compression method.
    UnsupportedCompression,
    /// A server sent an empty ticket
    EmptyTicketValue,
    /// A peer sent an empty list of items, but a non-empty list is required.
    ///
    /// The argument names the context.
    IllegalEmptyList(&'static str),
    /// A peer sent an empty value, but a non-empty value is required.
    IllegalEmptyValue,
    /// A peer sent a message where a given extension type was repeated
    DuplicateExtension(u16),
    /// A peer sent a message with a PSK offer extension in wrong position
    PreSharedKeyIsNotFinalExtension,
    /// A server sent a HelloRetryRequest with an unknown extension
    UnknownHelloRetryRequestExtension,
}

impl From<InvalidMessage> for AlertDescription {
    fn from(e: InvalidMessage) -> Self {
        match e {
            InvalidMessage::PreSharedKeyIsNotFinalExtension => Self::IllegalParameter,
            InvalidMessage::DuplicateExtension(_) => Self::IllegalParameter,
            InvalidMessage::UnknownHelloRetryRequestExtension => Self::UnsupportedExtension,
            InvalidMessage::UnexpectedMessage(_) => Self::UnexpectedMessage,
            InvalidMessage::CertificatePayloadTooLarge => Self::BadCertificate,
            _ => Self::DecodeError,
        }
    }
}

/// The set of cases where we failed to make a connection because we thought
/// the peer was misbehaving.
///
/// This is `non_exhaustive`: we might add or stop using items here in minor
/// versions.  We also don't document what they mean.  Generally a user of
/// this crate shouldn't vary its behaviour on these error codes, and there is
/// nothing it can do to improve matters.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PeerMisbehaved {
    AttemptedDowngradeToTls12WhenTls13IsSupported,
    BadCertChainExtensions,
    DisallowedEncryptedExtension,
    DuplicateEncryptedExtensions,
    DuplicateHelloRetryRequestExtensions,
    DuplicateNewSessionTicketExtensions,
    DuplicateServerHelloExtensions,
    EarlyDataExtensionWithoutResumption,
    IllegalHelloRetryRequestWithEmptyCookie,
    IllegalHelloRetryRequestWithNoChanges,
    IllegalHelloRetryRequestWithOfferedGroup,
    IllegalHelloRetryRequestWithUnofferedCipherSuite,
    IllegalHelloRetryRequestWithUnofferedNamedGroup,
    IllegalHelloRetryRequestWithUnsupportedVersion,
    IllegalHelloRetryRequestWithWrongSessionId,
    InvalidKeyShare,
    OfferedEarlyDataWithOldProtocolVersion,
    OfferedEmptyApplicationProtocol,
    ResumptionOfferedWithIncompatibleCipherSuite,
    SelectedDifferentCipherSuiteAfterRetry,
    SelectedInvalidPsk,
    SelectedPskKeyExchangeModeNotOffered,
    SelectedTls12UsingTls13VersionExtension,
    SelectedUnofferedApplicationProtocol,
    SelectedUnofferedCipherSuite,
    SelectedUnofferedPsk,
    SignedHandshakeWithUnadvertisedSigScheme,
    TooManyHelloRetryRequests,
    UnexpectedCleartextExtension,
    UnsolicitedEncryptedExtension,
    WrongGroupForKeyShare,
    WrongSessionIdEchoed,
}

impl From<PeerMisbehaved> for AlertDescription {
    fn from(e: PeerMisbehaved) -> Self {
        match e {
            PeerMisbehaved::DisallowedEncryptedExtension
            | PeerMisbehaved::UnexpectedCleartextExtension
            | PeerMisbehaved::UnsolicitedEncryptedExtension => Self::UnsupportedExtension,

            PeerMisbehaved::TooManyHelloRetryRequests => Self::UnexpectedMessage,

            _ => Self::IllegalParameter,
        }
    }
}

/// The set of cases where we failed to make a connection because a peer
/// doesn't support a TLS version/feature we require.
///
/// This is `non_exhaustive`: we might add or stop using items here in minor
/// versions.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PeerIncompatible {
    NeitherKeyShareNorPskChosen,
    NoCertificateRequestSignatureSchemesInCommon,
    ServerDoesNotSupportTls13,
}

impl From<PeerIncompatible> for AlertDescription {
    fn from(e: PeerIncompatible) -> Self {
        match e {
            PeerIncompatible::ServerDoesNotSupportTls13 => Self::ProtocolVersion,

            _ => Self::HandshakeFailure,
        }
    }
}

/// The ways in which certificate validators can express errors.
///
/// Note that the rustls-style certificate validation happens behind the
/// [`ServerCertVerifier`] trait; implementations signal failures using
/// this type so that the engine can map them onto the right alert.
///
/// [`ServerCertVerifier`]: crate::verify::ServerCertVerifier
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum CertificateError {
    /// The certificate is not correctly encoded.
    BadEncoding,

    /// The current time is after the `notAfter` time in the certificate.
    Expired,

    /// The current time is before the `notBefore` time in the certificate.
    NotValidYet,

    /// The certificate has been revoked.
    Revoked,

    /// The certificate chain is not signed by a known root certificate.
    UnknownIssuer,

    /// The signature in the certificate (or the handshake signature made
    /// with its key) is invalid.
    BadSignature,

    /// The subject names in an end-entity certificate do not include
    /// the expected name.
    NotValidForName,

    /// The application rejected the certificate for some reason of its own.
    ApplicationVerificationFailure,

    /// Any other error.
    Other(&'static str),
}

impl From<CertificateError> for AlertDescription {
    fn from(e: CertificateError) -> Self {
        use CertificateError::*;
        match e {
            BadEncoding => Self::DecodeError,
            Expired => Self::CertificateExpired,
            NotValidYet | Other(_) => Self::CertificateUnknown,
            Revoked => Self::CertificateRevoked,
            UnknownIssuer => Self::UnknownCa,
            BadSignature => Self::DecryptError,
            NotValidForName => Self::BadCertificate,
            ApplicationVerificationFailure => Self::BadCertificate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke() {
        let all = vec![
            Error::InappropriateHandshakeMessage {
                expect_types: vec![HandshakeType::ClientHello, HandshakeType::Finished],
                got_type: HandshakeType::ServerHello,
            },
            Error::InvalidMessage(InvalidMessage::TrailingData("ServerHelloPayload")),
            Error::DecryptError,
            Error::PeerIncompatible(PeerIncompatible::ServerDoesNotSupportTls13),
            Error::PeerMisbehaved(PeerMisbehaved::WrongGroupForKeyShare),
            Error::AlertReceived(AlertDescription::HandshakeFailure),
            Error::InvalidCertificate(CertificateError::UnknownIssuer),
            Error::NoCertificatesPresented,
            Error::Tls12Negotiated,
            Error::FailedToGetCurrentTime,
            Error::FailedToGetRandomBytes,
            Error::HandshakeNotComplete,
            Error::General("undocumented error".to_string()),
        ];

        for err in all {
            println!("{:?}:", err);
            println!("  fmt '{}'", err);
        }
    }

    #[test]
    fn alert_mapping_follows_taxonomy() {
        // decode failures => decode_error
        assert_eq!(
            Error::from(InvalidMessage::MessageTooShort).alert_description(),
            Some(AlertDescription::DecodeError)
        );
        // unexpected messages => unexpected_message
        assert_eq!(
            Error::PeerMisbehaved(PeerMisbehaved::TooManyHelloRetryRequests).alert_description(),
            Some(AlertDescription::UnexpectedMessage)
        );
        // auth failures => decrypt_error
        assert_eq!(
            Error::DecryptError.alert_description(),
            Some(AlertDescription::DecryptError)
        );
        // bad parameters => illegal_parameter
        assert_eq!(
            Error::PeerMisbehaved(PeerMisbehaved::WrongGroupForKeyShare).alert_description(),
            Some(AlertDescription::IllegalParameter)
        );
        // missing CA => unknown_ca
        assert_eq!(
            Error::from(CertificateError::UnknownIssuer).alert_description(),
            Some(AlertDescription::UnknownCa)
        );
        // protocol version mismatch => protocol_version
        assert_eq!(
            Error::PeerIncompatible(PeerIncompatible::ServerDoesNotSupportTls13)
                .alert_description(),
            Some(AlertDescription::ProtocolVersion)
        );
        // a legitimate downgrade carries no alert at all
        assert_eq!(Error::Tls12Negotiated.alert_description(), None);
    }
}

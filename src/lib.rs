//! # tls13-engine
//!
//! A client-side TLS 1.3 handshake engine.  This crate negotiates a
//! TLS 1.3 session with a server over an ordered, reliable byte
//! stream: it authenticates the peer, derives the shared traffic
//! secrets, establishes forward-secret record-protection keys,
//! optionally offers early (0-RTT) application data, and accepts
//! session-resumption tickets after the handshake completes.
//!
//! ## What this crate is not
//!
//! The record layer -- framing, encrypting and decrypting TLS records
//! -- is *not* here.  The engine drives a [`MessageTransport`]
//! collaborator that owns those concerns, and tells it when to switch
//! record protection for each direction.  Likewise X.509 parsing and
//! chain validation live behind the [`ServerCertVerifier`] trait, and
//! the server side of the protocol is out of scope entirely.
//!
//! ## Driving a handshake
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use tls13_engine::client::{ClientConfig, ClientConnection, Status};
//! # fn example(verifier: Arc<dyn tls13_engine::verify::ServerCertVerifier>,
//! #            transport: &mut dyn tls13_engine::transport::MessageTransport)
//! #            -> Result<(), tls13_engine::Error> {
//! let config = Arc::new(ClientConfig::new(verifier));
//! let name = pki_types::ServerName::try_from("example.com").unwrap().to_owned();
//! let mut conn = ClientConnection::new(config, name, None);
//!
//! loop {
//!     match conn.step(transport)? {
//!         Status::Continue => continue,
//!         Status::WantRead | Status::WantWrite => {
//!             // pump the underlying socket, then re-enter
//! #           break;
//!         }
//!         Status::ReceivedNewSessionTicket => continue,
//!         Status::Done => break,
//!     }
//! }
//! # Ok(()) }
//! ```
//!
//! The engine performs at most one state transition per [`step`] call
//! and never blocks: all I/O suspends via `WantRead`/`WantWrite`, so a
//! single thread can multiplex any number of connections.
//!
//! [`MessageTransport`]: transport::MessageTransport
//! [`ServerCertVerifier`]: verify::ServerCertVerifier
//! [`step`]: client::ClientConnection::step

#![forbid(unsafe_code)]
#![warn(clippy::use_self)]

// The wire-format model; keep these macro definitions ahead of every
// module that builds protocol enums with them.
#[macro_use]
mod msgs;

/// Protocol enumerations used throughout the public API.
pub mod enums;

mod cipher;
mod hash_hs;
mod key_log;
mod key_schedule;
mod rand;

/// The handshake engine proper.
pub mod client;
/// Error types.
pub mod error;
/// Key exchange groups.
pub mod kx;
/// Resumption values handed back to the caller.
pub mod persist;
/// Client authentication keys.
pub mod sign;
/// Supported ciphersuites.
pub mod suites;
/// The record-layer boundary.
pub mod transport;
/// Certificate verification traits.
pub mod verify;

/// Items for use in fuzzing.  This interface comes with no stability
/// promise whatsoever.
#[doc(hidden)]
pub mod internal {
    /// Low-level wire model.
    pub mod msgs {
        pub use crate::msgs::codec::{Codec, Reader};
        pub use crate::msgs::handshake::HandshakeMessagePayload;
    }
}

pub use crate::cipher::{AeadKey, Iv};
pub use crate::client::{AuthMode, ClientConfig, ClientConnection, NegotiatedSession, Status};
pub use crate::enums::{
    AlertDescription, CipherSuite, ContentType, HandshakeType, NamedGroup, ProtocolVersion,
    SignatureScheme,
};
pub use crate::error::Error;
pub use crate::key_log::{KeyLog, NoKeyLog};
pub use crate::msgs::enums::{MaxFragmentLength, PskKeyExchangeMode};
pub use crate::msgs::handshake::DigitallySignedStruct;
pub use crate::suites::{
    BulkAlgorithm, Tls13CipherSuite, ALL_CIPHER_SUITES, DEFAULT_CIPHER_SUITES,
    TLS13_AES_128_GCM_SHA256, TLS13_AES_256_GCM_SHA384, TLS13_CHACHA20_POLY1305_SHA256,
};

//! The boundary between the handshake engine and the record layer.
//!
//! The engine never frames, encrypts or decrypts records itself: it
//! consumes the operations below from a collaborator that does.  A
//! buffered TCP record layer is the obvious implementation; an
//! alternative message-processing stack can be dropped in behind the
//! same trait.

use crate::cipher::{AeadKey, Iv};
use crate::enums::AlertDescription;
use crate::error::Error;
use crate::suites::Tls13CipherSuite;

/// Which direction of record protection an [`install_keys`] call affects.
///
/// [`install_keys`]: MessageTransport::install_keys
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Protection of records we receive.
    Inbound,
    /// Protection of records we send.
    Outbound,
}

/// One item surfaced by [`MessageTransport::read_handshake`].
#[derive(Debug)]
pub enum Inbound {
    /// A complete handshake message: 1-byte type, 3-byte length, body.
    ///
    /// Reassembly across record boundaries is the transport's job; the
    /// engine always sees whole messages.
    Message(Vec<u8>),

    /// Application data was received.  Only legal after the handshake
    /// has completed; the data itself stays buffered in the record
    /// layer for the caller to read.
    ApplicationData,
}

/// The operations the handshake engine requires of its record layer.
///
/// Epoch ordering contract:
///
/// - `install_keys(Outbound, ..)` takes effect strictly after the last
///   record encrypted under the previous outbound epoch has been
///   flushed to the transmit queue.
/// - `install_keys(Inbound, ..)` takes effect strictly after the last
///   record decrypted under the previous inbound epoch has been
///   consumed from the receive buffer.
///
/// An implementation that encrypts lazily (at flush time) must
/// therefore tag queued records with their epoch.
pub trait MessageTransport {
    /// Fetch the next complete handshake message, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes from the peer are needed; the
    /// engine surfaces this as [`Status::WantRead`].  ChangeCipherSpec
    /// records received in compatibility mode are dropped silently by
    /// the transport and never surfaced here.
    ///
    /// [`Status::WantRead`]: crate::client::Status::WantRead
    fn read_handshake(&mut self) -> Result<Option<Inbound>, Error>;

    /// Enqueue a complete handshake message (header included) for
    /// transmission under the current outbound epoch.
    fn write_handshake(&mut self, encoded: &[u8]) -> Result<(), Error>;

    /// Emit a single dummy ChangeCipherSpec record, unprotected,
    /// for middlebox compatibility.
    fn write_change_cipher_spec(&mut self) -> Result<(), Error>;

    /// Enqueue early application data, protected under the current
    /// outbound epoch (which the engine has set to the early traffic
    /// keys before calling this).
    fn write_early_data(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Activate new record protection for one direction, starting with
    /// the next record processed in that direction.
    fn install_keys(
        &mut self,
        direction: Direction,
        suite: &'static Tls13CipherSuite,
        key: AeadKey,
        iv: Iv,
    );

    /// Return a direction to cleartext operation.
    ///
    /// Used once: when a HelloRetryRequest cancels offered early data,
    /// the early traffic keys are abandoned and the second ClientHello
    /// must leave in the clear.
    fn install_plaintext(&mut self, direction: Direction);

    /// Queue a fatal alert for transmission.  The engine calls this at
    /// most once, immediately before surfacing a fatal error; the
    /// record layer owns emitting it before teardown.
    fn send_alert(&mut self, alert: AlertDescription);

    /// Whether previously queued records are still waiting to be
    /// flushed to the peer.  The engine polls this in its final flush
    /// state and reports [`Status::WantWrite`] until it clears.
    ///
    /// [`Status::WantWrite`]: crate::client::Status::WantWrite
    fn wants_flush(&self) -> bool {
        false
    }
}

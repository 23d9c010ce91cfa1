//! Wire-level model of the TLS 1.3 handshake protocol: primitive
//! codec machinery, extension and message types.

#[macro_use]
mod macros;

pub mod alert;
pub mod base;
pub mod codec;
pub mod enums;
pub mod handshake;

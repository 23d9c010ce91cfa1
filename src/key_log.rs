/// This trait represents the ability to do something useful
/// with key material, such as logging it to a file for debugging.
///
/// Naturally, secrets passed over the interface are *extremely*
/// sensitive and can break the security of past, present and
/// future sessions.
///
/// You'll likely want some interior mutability in your
/// implementation to allow keys to be logged from multiple
/// connections.
pub trait KeyLog: Send + Sync {
    /// Log the given `secret`.  `client_random` is provided for
    /// session identification.  `label` describes precisely what
    /// `secret` means:
    ///
    /// - `CLIENT_EARLY_TRAFFIC_SECRET`: secret protecting client early data
    /// - `CLIENT_HANDSHAKE_TRAFFIC_SECRET`: secret protecting client handshake traffic
    /// - `SERVER_HANDSHAKE_TRAFFIC_SECRET`: secret protecting server handshake traffic
    /// - `CLIENT_TRAFFIC_SECRET_0`: secret protecting client application traffic
    /// - `SERVER_TRAFFIC_SECRET_0`: secret protecting server application traffic
    /// - `EARLY_EXPORTER_SECRET`: early exporter secret
    /// - `EXPORTER_SECRET`: exporter secret
    ///
    /// These are the labels defined in the NSS key log format.
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]);

    /// Indicates whether the secret with label `label` will be logged.
    ///
    /// If `will_log` returns true then `log` will be called with the secret.
    /// Otherwise, `log` will not be called for the secret. This is a
    /// performance optimization.
    fn will_log(&self, _label: &str) -> bool {
        true
    }
}

/// KeyLog that does exactly nothing.
pub struct NoKeyLog;

impl KeyLog for NoKeyLog {
    fn log(&self, _: &str, _: &[u8], _: &[u8]) {}

    #[inline]
    fn will_log(&self, _label: &str) -> bool {
        false
    }
}

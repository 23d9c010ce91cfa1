//! Client-side resumption state, as handed back to the caller after a
//! handshake and offered again on the next connection.  Actual storage
//! is the caller's concern.

use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use zeroize::Zeroizing;

use crate::suites::Tls13CipherSuite;

/// Tickets older than this are never offered, regardless of the
/// lifetime the server asked for (RFC 8446 section 4.6.1).
pub(crate) const MAX_TICKET_LIFETIME: u32 = 604_800;

/// A wall-clock instant, measured from the unix epoch.
#[derive(Clone, Copy, Debug)]
pub struct TimeBase {
    millis: u64,
}

impl TimeBase {
    /// The current time.
    pub fn now() -> Result<Self, SystemTimeError> {
        Ok(Self {
            millis: SystemTime::now()
                .duration_since(UNIX_EPOCH)?
                .as_millis() as u64,
        })
    }

    pub(crate) fn as_secs(&self) -> u64 {
        self.millis / 1000
    }

    pub(crate) fn as_millis(&self) -> u64 {
        self.millis
    }

    #[cfg(test)]
    pub(crate) fn from_millis(millis: u64) -> Self {
        Self { millis }
    }
}

/// A TLS1.3 session resumption value: an opaque server ticket together
/// with the PSK derived for it and its validity bookkeeping.
pub struct Tls13ClientSessionValue {
    suite: &'static Tls13CipherSuite,
    ticket: Vec<u8>,
    secret: Zeroizing<Vec<u8>>,
    issued: TimeBase,
    lifetime: u32,
    age_add: u32,
    max_early_data_size: u32,
}

impl Tls13ClientSessionValue {
    pub(crate) fn new(
        suite: &'static Tls13CipherSuite,
        ticket: Vec<u8>,
        secret: Vec<u8>,
        issued: TimeBase,
        lifetime: u32,
        age_add: u32,
        max_early_data_size: u32,
    ) -> Self {
        Self {
            suite,
            ticket,
            secret: Zeroizing::new(secret),
            issued,
            lifetime,
            age_add,
            max_early_data_size,
        }
    }

    /// The ciphersuite of the session this ticket resumes; its hash
    /// binds the PSK.
    pub fn suite(&self) -> &'static Tls13CipherSuite {
        self.suite
    }

    /// The server's opaque ticket bytes.
    pub fn ticket(&self) -> &[u8] {
        &self.ticket
    }

    pub(crate) fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// How much early data the server will accept under this ticket.
    pub fn max_early_data_size(&self) -> u32 {
        self.max_early_data_size
    }

    /// `obfuscated_ticket_age` for a ClientHello sent at `now`:
    /// the ticket's age in milliseconds plus `ticket_age_add`,
    /// modulo 2^32.
    pub(crate) fn obfuscated_ticket_age(&self, now: TimeBase) -> u32 {
        let age_millis = now
            .as_millis()
            .saturating_sub(self.issued.as_millis()) as u32;
        age_millis.wrapping_add(self.age_add)
    }

    /// Whether this ticket is still offerable at `now`.
    ///
    /// A zero lifetime means the server did not permit resumption with
    /// this ticket.  A ticket apparently issued in the future is
    /// treated as expired rather than offered with a nonsense age.
    pub(crate) fn has_expired(&self, now: TimeBase) -> bool {
        if self.lifetime == 0 || now.as_millis() < self.issued.as_millis() {
            return true;
        }

        let lifetime = self.lifetime.min(MAX_TICKET_LIFETIME);
        self.issued.as_secs() + u64::from(lifetime) < now.as_secs()
    }
}

impl core::fmt::Debug for Tls13ClientSessionValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // omit secret from output
        f.debug_struct("Tls13ClientSessionValue")
            .field("suite", &self.suite)
            .field("issued", &self.issued)
            .field("lifetime", &self.lifetime)
            .field("max_early_data_size", &self.max_early_data_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suites::TLS13_AES_128_GCM_SHA256;

    fn value_at(issued_millis: u64, lifetime: u32, age_add: u32) -> Tls13ClientSessionValue {
        Tls13ClientSessionValue::new(
            &TLS13_AES_128_GCM_SHA256,
            vec![1, 2, 3],
            vec![0x40; 32],
            TimeBase::from_millis(issued_millis),
            lifetime,
            age_add,
            0,
        )
    }

    #[test]
    fn obfuscated_age_wraps_modulo_2_32() {
        let v = value_at(1_000, 300, 0xffff_fffe);
        // 2500ms age + 0xfffffffe wraps around
        assert_eq!(
            v.obfuscated_ticket_age(TimeBase::from_millis(3_500)),
            2500u32.wrapping_add(0xffff_fffe)
        );
    }

    #[test]
    fn expiry_honours_lifetime_and_cap() {
        let v = value_at(1_000, 300, 0);
        assert!(!v.has_expired(TimeBase::from_millis(200_000)));
        assert!(v.has_expired(TimeBase::from_millis(302_000)));

        // lifetime is capped at 7 days even if the server says more
        let v = value_at(0, u32::MAX, 0);
        assert!(!v.has_expired(TimeBase::from_millis(
            u64::from(MAX_TICKET_LIFETIME) * 1000 - 1000
        )));
        assert!(v.has_expired(TimeBase::from_millis(
            (u64::from(MAX_TICKET_LIFETIME) + 2) * 1000
        )));
    }

    #[test]
    fn future_tickets_are_expired() {
        let v = value_at(10_000, 300, 0);
        assert!(v.has_expired(TimeBase::from_millis(9_000)));
    }

    #[test]
    fn zero_lifetime_is_unusable() {
        let v = value_at(1_000, 0, 0);
        assert!(v.has_expired(TimeBase::from_millis(1_000)));
    }
}

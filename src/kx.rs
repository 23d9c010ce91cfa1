use zeroize::Zeroizing;

use crate::enums::NamedGroup;

/// The result of a completed key exchange: the shared secret
/// ("Z" in RFC 8446 terms).  Wiped on drop.
pub(crate) struct SharedSecret(Zeroizing<Vec<u8>>);

impl SharedSecret {
    pub(crate) fn secret_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// An in-progress key exchange.  This has the group,
/// our private key, and our public key.
pub(crate) struct KeyExchange {
    skxg: &'static SupportedKxGroup,
    privkey: ring::agreement::EphemeralPrivateKey,
    pub(crate) pubkey: ring::agreement::PublicKey,
}

impl KeyExchange {
    /// Choose a SupportedKxGroup by name, from a list of supported groups.
    pub(crate) fn choose(
        name: NamedGroup,
        supported: &[&'static SupportedKxGroup],
    ) -> Option<&'static SupportedKxGroup> {
        supported
            .iter()
            .find(|skxg| skxg.name == name)
            .cloned()
    }

    /// Start a key exchange, using the given SupportedKxGroup.
    ///
    /// This generates an ephemeral key pair and stores it in the returned KeyExchange object.
    pub(crate) fn start(skxg: &'static SupportedKxGroup) -> Option<Self> {
        let rng = ring::rand::SystemRandom::new();
        let ours =
            ring::agreement::EphemeralPrivateKey::generate(skxg.agreement_algorithm, &rng).ok()?;

        let pubkey = ours.compute_public_key().ok()?;

        Some(Self {
            skxg,
            privkey: ours,
            pubkey,
        })
    }

    /// Return the group being used.
    pub(crate) fn group(&self) -> NamedGroup {
        self.skxg.name
    }

    /// Completes the key exchange, given the peer's public key.
    pub(crate) fn complete(self, peer: &[u8]) -> Option<SharedSecret> {
        let peer_key = ring::agreement::UnparsedPublicKey::new(self.skxg.agreement_algorithm, peer);
        ring::agreement::agree_ephemeral(self.privkey, &peer_key, (), |v| {
            Ok(SharedSecret(Zeroizing::new(Vec::from(v))))
        })
        .ok()
    }
}

/// A key-exchange group supported by this crate.
///
/// All possible instances of this type are provided by the library in
/// the [`ALL_KX_GROUPS`] array.
///
/// The single `agreement_algorithm` slot is where backend selection
/// happens: a group is whatever implementation the table entry names,
/// and every entry supports the same operations (generate a key pair,
/// export the public value, agree with a peer public value).
#[derive(Debug)]
pub struct SupportedKxGroup {
    /// The IANA "TLS Supported Groups" name of the group
    pub name: NamedGroup,

    /// The corresponding agreement algorithm
    agreement_algorithm: &'static ring::agreement::Algorithm,
}

/// Ephemeral ECDH on curve25519 (see RFC7748)
pub static X25519: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::X25519,
    agreement_algorithm: &ring::agreement::X25519,
};

/// Ephemeral ECDH on secp256r1 (aka NIST-P256)
pub static SECP256R1: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::secp256r1,
    agreement_algorithm: &ring::agreement::ECDH_P256,
};

/// Ephemeral ECDH on secp384r1 (aka NIST-P384)
pub static SECP384R1: SupportedKxGroup = SupportedKxGroup {
    name: NamedGroup::secp384r1,
    agreement_algorithm: &ring::agreement::ECDH_P384,
};

/// A list of all the key exchange groups supported by this crate.
pub static ALL_KX_GROUPS: [&SupportedKxGroup; 3] = [&X25519, &SECP256R1, &SECP384R1];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x25519_agreement_matches_both_ways() {
        let ours = KeyExchange::start(&X25519).unwrap();
        let theirs = KeyExchange::start(&X25519).unwrap();
        let our_pub = ours.pubkey.as_ref().to_vec();
        let their_pub = theirs.pubkey.as_ref().to_vec();

        let z1 = ours.complete(&their_pub).unwrap();
        let z2 = theirs.complete(&our_pub).unwrap();
        assert_eq!(z1.secret_bytes(), z2.secret_bytes());
        assert_eq!(z1.secret_bytes().len(), 32);
    }

    #[test]
    fn choose_honours_configured_groups() {
        assert!(KeyExchange::choose(NamedGroup::X25519, &[&SECP256R1]).is_none());
        let found = KeyExchange::choose(NamedGroup::secp256r1, &[&X25519, &SECP256R1]).unwrap();
        assert_eq!(found.name, NamedGroup::secp256r1);
    }

    #[test]
    fn garbage_peer_share_fails() {
        let ours = KeyExchange::start(&SECP256R1).unwrap();
        assert!(ours.complete(&[0x04, 0x01, 0x02]).is_none());
    }
}

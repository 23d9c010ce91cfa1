use core::fmt;

use crate::enums::CipherSuite;

/// Bulk symmetric encryption scheme used by a cipher suite.
#[allow(non_camel_case_types)]
#[derive(Debug, Eq, PartialEq)]
pub enum BulkAlgorithm {
    /// AES with 128-bit keys in Galois counter mode.
    Aes128Gcm,

    /// AES with 256-bit keys in Galois counter mode.
    Aes256Gcm,

    /// Chacha20 for confidentiality with poly1305 for authenticity.
    Chacha20Poly1305,
}

/// Common state for cipher suites.
pub struct CipherSuiteCommon {
    /// The TLS enumeration naming this cipher suite.
    pub suite: CipherSuite,

    /// How to do bulk encryption.
    pub bulk: BulkAlgorithm,

    pub(crate) hash_algorithm: &'static ring::digest::Algorithm,

    pub(crate) aead_algorithm: &'static ring::aead::Algorithm,
}

/// A TLS 1.3 cipher suite supported by this crate.
///
/// All possible instances of this type are provided by the library in
/// the [`ALL_CIPHER_SUITES`] array.
pub struct Tls13CipherSuite {
    /// Common cipher suite fields.
    pub common: CipherSuiteCommon,

    pub(crate) hkdf_algorithm: ring::hkdf::Algorithm,
}

impl Tls13CipherSuite {
    /// Which hash function to use with this suite.
    pub fn hash_algorithm(&self) -> &'static ring::digest::Algorithm {
        self.common.hash_algorithm
    }

    /// The cipher suite's identifier.
    pub fn suite(&self) -> CipherSuite {
        self.common.suite
    }

    /// Length of the keys this suite's AEAD algorithm uses.
    pub fn key_len(&self) -> usize {
        self.common.aead_algorithm.key_len()
    }

    /// Can a session using suite self resume from suite prev?
    ///
    /// A resumption PSK is bound to the hash, not the whole suite.
    pub fn can_resume_from(&self, prev: &'static Self) -> Option<&'static Self> {
        match core::ptr::eq(prev.common.hash_algorithm, self.common.hash_algorithm) {
            true => Some(prev),
            false => None,
        }
    }
}

impl PartialEq for Tls13CipherSuite {
    fn eq(&self, other: &Self) -> bool {
        self.common.suite == other.common.suite
    }
}

impl fmt::Debug for Tls13CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tls13CipherSuite")
            .field("suite", &self.common.suite)
            .finish()
    }
}

/// The TLS1.3 ciphersuite TLS_AES_128_GCM_SHA256
pub static TLS13_AES_128_GCM_SHA256: Tls13CipherSuite = Tls13CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
        bulk: BulkAlgorithm::Aes128Gcm,
        hash_algorithm: &ring::digest::SHA256,
        aead_algorithm: &ring::aead::AES_128_GCM,
    },
    hkdf_algorithm: ring::hkdf::HKDF_SHA256,
};

/// The TLS1.3 ciphersuite TLS_AES_256_GCM_SHA384
pub static TLS13_AES_256_GCM_SHA384: Tls13CipherSuite = Tls13CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS13_AES_256_GCM_SHA384,
        bulk: BulkAlgorithm::Aes256Gcm,
        hash_algorithm: &ring::digest::SHA384,
        aead_algorithm: &ring::aead::AES_256_GCM,
    },
    hkdf_algorithm: ring::hkdf::HKDF_SHA384,
};

/// The TLS1.3 ciphersuite TLS_CHACHA20_POLY1305_SHA256
pub static TLS13_CHACHA20_POLY1305_SHA256: Tls13CipherSuite = Tls13CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
        bulk: BulkAlgorithm::Chacha20Poly1305,
        hash_algorithm: &ring::digest::SHA256,
        aead_algorithm: &ring::aead::CHACHA20_POLY1305,
    },
    hkdf_algorithm: ring::hkdf::HKDF_SHA256,
};

/// A list of all the cipher suites supported by this crate.
pub static ALL_CIPHER_SUITES: &[&Tls13CipherSuite] = &[
    &TLS13_AES_256_GCM_SHA384,
    &TLS13_AES_128_GCM_SHA256,
    &TLS13_CHACHA20_POLY1305_SHA256,
];

/// The cipher suite configuration that an application should use by default.
///
/// This will be [`ALL_CIPHER_SUITES`] sans any supported cipher suites that
/// shouldn't be enabled by most applications.
pub static DEFAULT_CIPHER_SUITES: &[&Tls13CipherSuite] = ALL_CIPHER_SUITES;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_lengths_are_consistent() {
        assert_eq!(TLS13_AES_128_GCM_SHA256.key_len(), 16);
        assert_eq!(TLS13_AES_256_GCM_SHA384.key_len(), 32);
        assert_eq!(TLS13_CHACHA20_POLY1305_SHA256.key_len(), 32);
        assert_eq!(
            TLS13_AES_128_GCM_SHA256
                .hash_algorithm()
                .output_len,
            32
        );
        assert_eq!(
            TLS13_AES_256_GCM_SHA384
                .hash_algorithm()
                .output_len,
            48
        );
    }

    #[test]
    fn resumption_requires_matching_hash() {
        assert!(TLS13_AES_128_GCM_SHA256
            .can_resume_from(&TLS13_CHACHA20_POLY1305_SHA256)
            .is_some());
        assert!(TLS13_AES_256_GCM_SHA384
            .can_resume_from(&TLS13_AES_128_GCM_SHA256)
            .is_none());
    }

    #[test]
    fn debug_is_suite_name() {
        assert_eq!(
            format!("{:?}", TLS13_AES_128_GCM_SHA256),
            "Tls13CipherSuite { suite: TLS13_AES_128_GCM_SHA256 }"
        );
    }
}

use core::fmt;

use ring::aead;
use ring::hkdf;
use zeroize::Zeroize;

/// A raw AEAD key destined for the record layer.
///
/// Holds the largest supported key size; unused tail bytes are zero.
/// The whole buffer is wiped on drop.
pub struct AeadKey {
    buf: [u8; Self::MAX_LEN],
    used: usize,
}

impl AeadKey {
    const MAX_LEN: usize = 32;

    pub(crate) fn new(src: &[u8]) -> Self {
        debug_assert!(src.len() <= Self::MAX_LEN);
        let mut buf = [0; Self::MAX_LEN];
        buf[..src.len()].copy_from_slice(src);
        Self {
            buf,
            used: src.len(),
        }
    }
}

impl AsRef<[u8]> for AeadKey {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..self.used]
    }
}

impl Drop for AeadKey {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}

impl fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadKey").finish_non_exhaustive()
    }
}

/// A write or read IV for the record layer's per-record nonce
/// construction.
pub struct Iv(pub(crate) [u8; aead::NONCE_LEN]);

impl Iv {
    /// The IV bytes.
    pub fn value(&self) -> &[u8; aead::NONCE_LEN] {
        &self.0
    }
}

impl From<[u8; aead::NONCE_LEN]> for Iv {
    fn from(bytes: [u8; aead::NONCE_LEN]) -> Self {
        Self(bytes)
    }
}

impl Drop for Iv {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iv").finish_non_exhaustive()
    }
}

pub(crate) struct IvLen;

impl hkdf::KeyType for IvLen {
    fn len(&self) -> usize {
        aead::NONCE_LEN
    }
}

impl From<hkdf::Okm<'_, IvLen>> for Iv {
    fn from(okm: hkdf::Okm<IvLen>) -> Self {
        let mut r = Self([0; aead::NONCE_LEN]);
        okm.fill(&mut r.0[..]).unwrap();
        r
    }
}

pub(crate) struct AeadKeyLen(pub(crate) usize);

impl hkdf::KeyType for AeadKeyLen {
    fn len(&self) -> usize {
        self.0
    }
}

impl From<hkdf::Okm<'_, AeadKeyLen>> for AeadKey {
    fn from(okm: hkdf::Okm<AeadKeyLen>) -> Self {
        let len = okm.len().0;
        let mut key = Self {
            buf: [0; Self::MAX_LEN],
            used: len,
        };
        okm.fill(&mut key.buf[..len]).unwrap();
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aead_key_exposes_exact_length() {
        let key = AeadKey::new(&[0xab; 16]);
        assert_eq!(key.as_ref().len(), 16);
        assert_eq!(key.as_ref(), &[0xab; 16]);
    }
}

use core::mem;

use ring::digest;

use crate::msgs::codec::Codec;
use crate::msgs::handshake::HandshakeMessagePayload;

/// Early stage buffering of handshake payloads.
///
/// Before we know the hash algorithm of the negotiated ciphersuite, we just
/// buffer the raw messages.  During the handshake, we may restart the
/// transcript due to a HelloRetryRequest, reverting from the `HandshakeHash`
/// to a `HandshakeHashBuffer` again.
#[derive(Clone)]
pub(crate) struct HandshakeHashBuffer {
    buffer: Vec<u8>,
}

impl HandshakeHashBuffer {
    pub(crate) fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Buffer a complete handshake message, header included.
    pub(crate) fn add_message(&mut self, encoded: &[u8]) {
        self.buffer.extend_from_slice(encoded);
    }

    /// Get the hash value if we were to hash `extra` too.
    pub(crate) fn hash_given(
        &self,
        alg: &'static digest::Algorithm,
        extra: &[u8],
    ) -> digest::Digest {
        let mut ctx = digest::Context::new(alg);
        ctx.update(&self.buffer);
        ctx.update(extra);
        ctx.finish()
    }

    /// We now know what hash function the transcript uses.
    pub(crate) fn start_hash(self, alg: &'static digest::Algorithm) -> HandshakeHash {
        let mut ctx = digest::Context::new(alg);
        ctx.update(&self.buffer);
        HandshakeHash { alg, ctx }
    }
}

/// This deals with keeping a running hash of the handshake
/// payloads.  This is computed by buffering initially.  Once
/// we know what hash function we need to use we switch to
/// incremental hashing.
pub(crate) struct HandshakeHash {
    alg: &'static digest::Algorithm,
    ctx: digest::Context,
}

impl HandshakeHash {
    /// Hash a complete handshake message, header included.
    pub(crate) fn add_message(&mut self, encoded: &[u8]) {
        self.ctx.update(encoded);
    }

    /// Get the hash value if we were to hash `extra` too.
    pub(crate) fn hash_given(&self, extra: &[u8]) -> digest::Digest {
        let mut ctx = self.ctx.clone();
        ctx.update(extra);
        ctx.finish()
    }

    /// Take the current hash value, and encapsulate it in a
    /// 'message_hash' handshake message.  Start this hash
    /// again, with that message at the front.
    ///
    /// This is the transcript rewrite the client performs when it
    /// receives a HelloRetryRequest: both peers replace the first
    /// ClientHello by `MessageHash || 00 00 || len || Hash(ClientHello1)`
    /// so that the transcript converges even though the client hashed
    /// the first flight before learning the server's preferred hash.
    pub(crate) fn rollup_for_hrr(&mut self) {
        let old_ctx = mem::replace(&mut self.ctx, digest::Context::new(self.alg));
        let old_hash = old_ctx.finish();
        let old_handshake_hash_msg =
            HandshakeMessagePayload::build_handshake_hash(old_hash.as_ref());

        self.ctx
            .update(&old_handshake_hash_msg.get_encoding());
    }

    /// Get the current hash value.
    pub(crate) fn current_hash(&self) -> digest::Digest {
        self.ctx.clone().finish()
    }
}

impl Clone for HandshakeHash {
    fn clone(&self) -> Self {
        Self {
            alg: self.alg,
            ctx: self.ctx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_correctly() {
        let mut hhb = HandshakeHashBuffer::new();
        hhb.add_message(b"hello");
        assert_eq!(hhb.buffer.len(), 5);
        let mut hh = hhb.start_hash(&digest::SHA256);
        hh.add_message(b"world");
        let h = hh.current_hash();
        let h = h.as_ref();
        assert_eq!(h[0], 0x93);
        assert_eq!(h[1], 0x6a);
        assert_eq!(h[2], 0x18);
        assert_eq!(h[3], 0x5c);
    }

    #[test]
    fn buffer_and_incremental_hashing_agree() {
        let mut hhb = HandshakeHashBuffer::new();
        hhb.add_message(b"\x0e\x00\x00\x00");
        hhb.add_message(b"\x05\x00\x00\x00");
        assert_eq!(
            hhb.start_hash(&digest::SHA256)
                .current_hash()
                .as_ref(),
            digest::digest(&digest::SHA256, b"\x0e\x00\x00\x00\x05\x00\x00\x00").as_ref()
        );
    }

    #[test]
    fn hash_given_does_not_disturb_transcript() {
        let mut hhb = HandshakeHashBuffer::new();
        hhb.add_message(b"hello");
        let forked = hhb.hash_given(&digest::SHA256, b"world");
        assert_eq!(
            forked.as_ref(),
            digest::digest(&digest::SHA256, b"helloworld").as_ref()
        );

        let hh = hhb.start_hash(&digest::SHA256);
        let forked = hh.hash_given(b"world");
        assert_eq!(
            forked.as_ref(),
            digest::digest(&digest::SHA256, b"helloworld").as_ref()
        );
        assert_eq!(
            hh.current_hash().as_ref(),
            digest::digest(&digest::SHA256, b"hello").as_ref()
        );
    }

    #[test]
    fn rollup_matches_synthetic_message_hash() {
        let client_hello1 = b"\x01\x00\x00\x02\xab\xcd";

        let mut hhb = HandshakeHashBuffer::new();
        hhb.add_message(client_hello1);
        let mut hh = hhb.start_hash(&digest::SHA256);
        hh.rollup_for_hrr();

        // expected: Hash(0xfe || 00 00 || 32 || Hash(ClientHello1))
        let inner = digest::digest(&digest::SHA256, client_hello1);
        let mut synthetic = vec![0xfe, 0x00, 0x00, 0x20];
        synthetic.extend_from_slice(inner.as_ref());
        assert_eq!(
            hh.current_hash().as_ref(),
            digest::digest(&digest::SHA256, &synthetic).as_ref()
        );
    }

    #[test]
    fn clones_correctly() {
        let mut hhb = HandshakeHashBuffer::new();
        hhb.add_message(b"hello");

        let hh = hhb.start_hash(&digest::SHA256);
        let hh_hash = hh.current_hash();
        let hh_hash = hh_hash.as_ref();

        // Cloning the HH should result in the same current hash.
        let mut hh_prime = hh.clone();
        assert_eq!(hh_prime.current_hash().as_ref(), hh_hash);

        // Updating the HH clone shouldn't affect the original.
        hh_prime.add_message(b"goodbye");
        assert_eq!(hh.current_hash().as_ref(), hh_hash);
        assert_ne!(hh_prime.current_hash().as_ref(), hh_hash);
    }
}

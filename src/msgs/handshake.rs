use core::fmt;

use pki_types::CertificateDer;

use crate::enums::{
    CipherSuite, HandshakeType, NamedGroup, ProtocolVersion, SignatureScheme,
};
use crate::error::InvalidMessage;
use crate::msgs::base::{hex, Payload, PayloadU16, PayloadU8};
use crate::msgs::codec::{
    put_length_prefixed, u24, Codec, Reader, SizePrefix, TlsListElement,
};
use crate::msgs::enums::{
    Compression, ExtensionType, MaxFragmentLength, PskKeyExchangeMode, ServerNameType,
};
use crate::rand;

/// Individual certificates may not be larger than this.
///
/// This is a deliberately tighter cap than RFC 8446's 2^24-1: certificates
/// this large are a denial of service in practice, not a deployment.
pub(crate) const CERTIFICATE_MAX_SIZE_LIMIT: usize = 0x1_0000;

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Random(pub [u8; 32]);

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.0)
    }
}

/// The fixed "random" that marks a ServerHello-shaped message as a
/// HelloRetryRequest: SHA-256 of the ASCII string "HelloRetryRequest".
pub(crate) const HELLO_RETRY_REQUEST_RANDOM: Random = Random([
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8, 0x91,
    0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8, 0x33, 0x9c,
]);

/// The last 8 bytes of the server random carry one of these sentinels
/// when a TLS 1.3-capable server negotiates an older version.
pub(crate) const DOWNGRADE_SENTINEL_TLS12: [u8; 8] =
    [0x44, 0x4f, 0x57, 0x4e, 0x47, 0x52, 0x44, 0x01];
pub(crate) const DOWNGRADE_SENTINEL_TLS11_OR_BELOW: [u8; 8] =
    [0x44, 0x4f, 0x57, 0x4e, 0x47, 0x52, 0x44, 0x00];

impl Codec for Random {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let Some(bytes) = r.take(32) else {
            return Err(InvalidMessage::MissingData("Random"));
        };
        let mut opaque = [0; 32];
        opaque.clone_from_slice(bytes);

        Ok(Self(opaque))
    }
}

impl From<[u8; 32]> for Random {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[derive(Copy, Clone)]
pub struct SessionId {
    len: usize,
    data: [u8; 32],
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.data[..self.len])
    }
}

impl PartialEq for SessionId {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }

        let mut diff = 0u8;
        for i in 0..self.len {
            diff |= self.data[i] ^ other.data[i];
        }

        diff == 0u8
    }
}

impl Codec for SessionId {
    fn encode(&self, bytes: &mut Vec<u8>) {
        debug_assert!(self.len <= 32);
        bytes.push(self.len as u8);
        bytes.extend_from_slice(self.as_ref());
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let len = u8::read(r)? as usize;
        if len > 32 {
            return Err(InvalidMessage::TrailingData("SessionId"));
        }

        let Some(bytes) = r.take(len) else {
            return Err(InvalidMessage::MissingData("SessionId"));
        };

        let mut out = [0u8; 32];
        out[..len].clone_from_slice(&bytes[..len]);
        Ok(Self { data: out, len })
    }
}

impl SessionId {
    pub(crate) fn random() -> Result<Self, rand::GetRandomFailed> {
        let data = rand::random_array()?;
        Ok(Self { data, len: 32 })
    }

    pub(crate) fn empty() -> Self {
        Self {
            data: [0u8; 32],
            len: 0,
        }
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

#[derive(Clone, Debug)]
pub struct UnknownExtension {
    pub(crate) typ: ExtensionType,
    pub(crate) payload: Payload,
}

impl UnknownExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.payload.encode(bytes);
    }

    fn read(typ: ExtensionType, r: &mut Reader) -> Self {
        let payload = Payload::read_slice(r.rest());
        Self { typ, payload }
    }
}

#[derive(Clone, Debug)]
pub struct KeyShareEntry {
    pub(crate) group: NamedGroup,
    pub(crate) payload: PayloadU16,
}

impl KeyShareEntry {
    pub(crate) fn new(group: NamedGroup, payload: &[u8]) -> Self {
        Self {
            group,
            payload: PayloadU16::new(payload.to_vec()),
        }
    }
}

impl Codec for KeyShareEntry {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.group.encode(bytes);
        self.payload.encode(bytes);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let group = NamedGroup::read(r)?;
        let payload = PayloadU16::read(r)?;

        Ok(Self { group, payload })
    }
}

impl TlsListElement for KeyShareEntry {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

#[derive(Clone, Debug)]
pub struct PresharedKeyIdentity {
    pub(crate) identity: PayloadU16,
    pub(crate) obfuscated_ticket_age: u32,
}

impl PresharedKeyIdentity {
    pub(crate) fn new(id: Vec<u8>, age: u32) -> Self {
        Self {
            identity: PayloadU16::new(id),
            obfuscated_ticket_age: age,
        }
    }
}

impl Codec for PresharedKeyIdentity {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.identity.encode(bytes);
        self.obfuscated_ticket_age.encode(bytes);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        Ok(Self {
            identity: PayloadU16::read(r)?,
            obfuscated_ticket_age: u32::read(r)?,
        })
    }
}

impl TlsListElement for PresharedKeyIdentity {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

impl TlsListElement for PayloadU8 {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

#[derive(Clone, Debug)]
pub struct PresharedKeyOffer {
    pub(crate) identities: Vec<PresharedKeyIdentity>,
    pub(crate) binders: Vec<PayloadU8>,
}

impl PresharedKeyOffer {
    /// Make a new one with one entry.
    pub(crate) fn new(id: PresharedKeyIdentity, binder: Vec<u8>) -> Self {
        Self {
            identities: vec![id],
            binders: vec![PayloadU8::new(binder)],
        }
    }
}

impl Codec for PresharedKeyOffer {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.identities.encode(bytes);
        self.binders.encode(bytes);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        Ok(Self {
            identities: Vec::read(r)?,
            binders: Vec::read(r)?,
        })
    }
}

#[derive(Clone, Debug)]
pub(crate) enum ServerNamePayload {
    HostName(PayloadU16),
    Unknown(Payload),
}

#[derive(Clone, Debug)]
pub struct ServerName {
    pub(crate) typ: ServerNameType,
    pub(crate) payload: ServerNamePayload,
}

impl Codec for ServerName {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);

        match &self.payload {
            ServerNamePayload::HostName(name) => name.encode(bytes),
            ServerNamePayload::Unknown(payload) => payload.encode(bytes),
        }
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let typ = ServerNameType::read(r)?;

        let payload = match typ {
            ServerNameType::HostName => ServerNamePayload::HostName(PayloadU16::read(r)?),
            _ => ServerNamePayload::Unknown(Payload::read(r)?),
        };

        Ok(Self { typ, payload })
    }
}

impl TlsListElement for ServerName {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

impl TlsListElement for ProtocolVersion {
    const SIZE_LEN: SizePrefix = SizePrefix::U8;
}

impl TlsListElement for NamedGroup {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

impl TlsListElement for SignatureScheme {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

impl TlsListElement for PskKeyExchangeMode {
    const SIZE_LEN: SizePrefix = SizePrefix::U8;
}

impl TlsListElement for CipherSuite {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

impl TlsListElement for Compression {
    const SIZE_LEN: SizePrefix = SizePrefix::U8;
}

#[derive(Clone, Debug)]
pub enum ClientExtension {
    SupportedVersions(Vec<ProtocolVersion>),
    NamedGroups(Vec<NamedGroup>),
    SignatureAlgorithms(Vec<SignatureScheme>),
    KeyShare(Vec<KeyShareEntry>),
    PresharedKeyModes(Vec<PskKeyExchangeMode>),
    PresharedKey(PresharedKeyOffer),
    Cookie(PayloadU16),
    EarlyData,
    ServerName(Vec<ServerName>),
    Protocols(Vec<PayloadU8>),
    MaxFragmentLength(MaxFragmentLength),
    Unknown(UnknownExtension),
}

impl ClientExtension {
    pub(crate) fn ext_type(&self) -> ExtensionType {
        match self {
            Self::SupportedVersions(_) => ExtensionType::SupportedVersions,
            Self::NamedGroups(_) => ExtensionType::EllipticCurves,
            Self::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            Self::KeyShare(_) => ExtensionType::KeyShare,
            Self::PresharedKeyModes(_) => ExtensionType::PSKKeyExchangeModes,
            Self::PresharedKey(_) => ExtensionType::PreSharedKey,
            Self::Cookie(_) => ExtensionType::Cookie,
            Self::EarlyData => ExtensionType::EarlyData,
            Self::ServerName(_) => ExtensionType::ServerName,
            Self::Protocols(_) => ExtensionType::ALProtocolNegotiation,
            Self::MaxFragmentLength(_) => ExtensionType::MaxFragmentLength,
            Self::Unknown(r) => r.typ,
        }
    }

    /// Make a basic SNI extension quoting `dns_name`.
    pub(crate) fn make_sni(dns_name: &str) -> Self {
        let name = ServerName {
            typ: ServerNameType::HostName,
            payload: ServerNamePayload::HostName(PayloadU16::new(
                dns_name.as_bytes().to_vec(),
            )),
        };

        Self::ServerName(vec![name])
    }
}

impl Codec for ClientExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        put_length_prefixed(SizePrefix::U16, bytes, |buf| match self {
            Self::SupportedVersions(r) => r.encode(buf),
            Self::NamedGroups(r) => r.encode(buf),
            Self::SignatureAlgorithms(r) => r.encode(buf),
            Self::KeyShare(r) => r.encode(buf),
            Self::PresharedKeyModes(r) => r.encode(buf),
            Self::PresharedKey(r) => r.encode(buf),
            Self::Cookie(r) => r.encode(buf),
            Self::EarlyData => {}
            Self::ServerName(r) => r.encode(buf),
            Self::Protocols(r) => r.encode(buf),
            Self::MaxFragmentLength(r) => r.encode(buf),
            Self::Unknown(r) => r.encode(buf),
        });
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::SupportedVersions => Self::SupportedVersions(Vec::read(&mut sub)?),
            ExtensionType::EllipticCurves => Self::NamedGroups(Vec::read(&mut sub)?),
            ExtensionType::SignatureAlgorithms => Self::SignatureAlgorithms(Vec::read(&mut sub)?),
            ExtensionType::KeyShare => Self::KeyShare(Vec::read(&mut sub)?),
            ExtensionType::PSKKeyExchangeModes => Self::PresharedKeyModes(Vec::read(&mut sub)?),
            ExtensionType::PreSharedKey => Self::PresharedKey(PresharedKeyOffer::read(&mut sub)?),
            ExtensionType::Cookie => Self::Cookie(PayloadU16::read(&mut sub)?),
            ExtensionType::EarlyData if !sub.any_left() => Self::EarlyData,
            ExtensionType::ServerName => Self::ServerName(Vec::read(&mut sub)?),
            ExtensionType::ALProtocolNegotiation => Self::Protocols(Vec::read(&mut sub)?),
            ExtensionType::MaxFragmentLength => {
                Self::MaxFragmentLength(MaxFragmentLength::read(&mut sub)?)
            }
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("ClientExtension")
            .map(|_| ext)
    }
}

#[derive(Clone, Debug)]
pub enum ServerExtension {
    KeyShare(KeyShareEntry),
    PresharedKey(u16),
    SupportedVersions(ProtocolVersion),
    ServerNameAck,
    Protocols(Vec<PayloadU8>),
    EarlyData,
    MaxFragmentLength(MaxFragmentLength),
    Unknown(UnknownExtension),
}

impl ServerExtension {
    pub(crate) fn ext_type(&self) -> ExtensionType {
        match self {
            Self::KeyShare(_) => ExtensionType::KeyShare,
            Self::PresharedKey(_) => ExtensionType::PreSharedKey,
            Self::SupportedVersions(_) => ExtensionType::SupportedVersions,
            Self::ServerNameAck => ExtensionType::ServerName,
            Self::Protocols(_) => ExtensionType::ALProtocolNegotiation,
            Self::EarlyData => ExtensionType::EarlyData,
            Self::MaxFragmentLength(_) => ExtensionType::MaxFragmentLength,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for ServerExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        put_length_prefixed(SizePrefix::U16, bytes, |buf| match self {
            Self::KeyShare(r) => r.encode(buf),
            Self::PresharedKey(r) => r.encode(buf),
            Self::SupportedVersions(r) => r.encode(buf),
            Self::ServerNameAck => {}
            Self::Protocols(r) => r.encode(buf),
            Self::EarlyData => {}
            Self::MaxFragmentLength(r) => r.encode(buf),
            Self::Unknown(r) => r.encode(buf),
        });
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::KeyShare => Self::KeyShare(KeyShareEntry::read(&mut sub)?),
            ExtensionType::PreSharedKey => Self::PresharedKey(u16::read(&mut sub)?),
            ExtensionType::SupportedVersions => {
                Self::SupportedVersions(ProtocolVersion::read(&mut sub)?)
            }
            ExtensionType::ServerName if !sub.any_left() => Self::ServerNameAck,
            ExtensionType::ALProtocolNegotiation => Self::Protocols(Vec::read(&mut sub)?),
            ExtensionType::EarlyData if !sub.any_left() => Self::EarlyData,
            ExtensionType::MaxFragmentLength => {
                Self::MaxFragmentLength(MaxFragmentLength::read(&mut sub)?)
            }
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("ServerExtension")
            .map(|_| ext)
    }
}

#[derive(Clone, Debug)]
pub enum HelloRetryExtension {
    KeyShare(NamedGroup),
    Cookie(PayloadU16),
    SupportedVersions(ProtocolVersion),
    Unknown(UnknownExtension),
}

impl HelloRetryExtension {
    pub(crate) fn ext_type(&self) -> ExtensionType {
        match self {
            Self::KeyShare(_) => ExtensionType::KeyShare,
            Self::Cookie(_) => ExtensionType::Cookie,
            Self::SupportedVersions(_) => ExtensionType::SupportedVersions,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for HelloRetryExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        put_length_prefixed(SizePrefix::U16, bytes, |buf| match self {
            Self::KeyShare(r) => r.encode(buf),
            Self::Cookie(r) => r.encode(buf),
            Self::SupportedVersions(r) => r.encode(buf),
            Self::Unknown(r) => r.encode(buf),
        });
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::KeyShare => Self::KeyShare(NamedGroup::read(&mut sub)?),
            ExtensionType::Cookie => Self::Cookie(PayloadU16::read(&mut sub)?),
            ExtensionType::SupportedVersions => {
                Self::SupportedVersions(ProtocolVersion::read(&mut sub)?)
            }
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("HelloRetryExtension")
            .map(|_| ext)
    }
}

impl TlsListElement for ClientExtension {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

impl TlsListElement for ServerExtension {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

impl TlsListElement for HelloRetryExtension {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

fn has_duplicates(mut seen: Vec<u16>) -> bool {
    seen.sort_unstable();
    seen.windows(2)
        .any(|pair| pair[0] == pair[1])
}

#[derive(Clone, Debug)]
pub struct ClientHelloPayload {
    pub(crate) client_version: ProtocolVersion,
    pub(crate) random: Random,
    pub(crate) session_id: SessionId,
    pub(crate) cipher_suites: Vec<CipherSuite>,
    pub(crate) compression_methods: Vec<Compression>,
    pub(crate) extensions: Vec<ClientExtension>,
}

impl Codec for ClientHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.client_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suites.encode(bytes);
        self.compression_methods.encode(bytes);

        if !self.extensions.is_empty() {
            self.extensions.encode(bytes);
        }
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let mut ret = Self {
            client_version: ProtocolVersion::read(r)?,
            random: Random::read(r)?,
            session_id: SessionId::read(r)?,
            cipher_suites: Vec::read(r)?,
            compression_methods: Vec::read(r)?,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = Vec::read(r)?;
        }

        match (r.any_left(), ret.extensions.is_empty()) {
            (true, _) => return Err(InvalidMessage::TrailingData("ClientHelloPayload")),
            (_, true) => return Err(InvalidMessage::MissingData("ClientHelloPayload")),
            _ => {}
        }

        let mut seen = Vec::with_capacity(ret.extensions.len());
        for ext in &ret.extensions {
            let typ = u16::from(ext.ext_type());
            if seen.contains(&typ) {
                return Err(InvalidMessage::DuplicateExtension(typ));
            }
            seen.push(typ);
        }

        // `pre_shared_key` carries the binders over the tail of the
        // message; anywhere else it cannot be correct.
        if ret.preshared_key_offer().is_some()
            && !matches!(
                ret.extensions.last(),
                Some(ClientExtension::PresharedKey(_))
            )
        {
            return Err(InvalidMessage::PreSharedKeyIsNotFinalExtension);
        }

        Ok(ret)
    }
}

impl ClientHelloPayload {
    pub(crate) fn find_extension(&self, ext: ExtensionType) -> Option<&ClientExtension> {
        self.extensions
            .iter()
            .find(|x| x.ext_type() == ext)
    }

    pub(crate) fn has_duplicate_extension(&self) -> bool {
        has_duplicates(
            self.extensions
                .iter()
                .map(|ext| ext.ext_type().into())
                .collect(),
        )
    }

    pub(crate) fn preshared_key_offer(&self) -> Option<&PresharedKeyOffer> {
        match self.find_extension(ExtensionType::PreSharedKey) {
            Some(ClientExtension::PresharedKey(offer)) => Some(offer),
            _ => None,
        }
    }

    /// The binders belonging to a `pre_shared_key` offer occupy the tail
    /// of the encoded ClientHello.  This is the number of bytes they use.
    pub(crate) fn total_binder_length(&self) -> usize {
        match self.preshared_key_offer() {
            Some(offer) => {
                let mut len = 2; // binders list length prefix
                for binder in &offer.binders {
                    len += 1 + binder.0.len();
                }
                len
            }
            None => 0,
        }
    }

    pub(crate) fn set_psk_binder(&mut self, binder: impl Into<Vec<u8>>) {
        let last_extension = self.extensions.last_mut();
        if let Some(ClientExtension::PresharedKey(offer)) = last_extension {
            offer.binders[0] = PayloadU8::new(binder.into());
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerHelloPayload {
    pub(crate) legacy_version: ProtocolVersion,
    pub(crate) random: Random,
    pub(crate) session_id: SessionId,
    pub(crate) cipher_suite: CipherSuite,
    pub(crate) compression_method: Compression,
    pub(crate) extensions: Vec<ServerExtension>,
}

impl Codec for ServerHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.legacy_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        self.compression_method.encode(bytes);

        if !self.extensions.is_empty() {
            self.extensions.encode(bytes);
        }
    }

    // minus version and random, which have already been read.
    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let session_id = SessionId::read(r)?;
        let suite = CipherSuite::read(r)?;
        let compression = Compression::read(r)?;

        // RFC 8446: "legacy_compression_method: A single byte which
        // MUST have the value 0."
        if compression != Compression::Null {
            return Err(InvalidMessage::UnsupportedCompression);
        }

        let mut ret = Self {
            legacy_version: ProtocolVersion::Unknown(0),
            random: HELLO_RETRY_REQUEST_RANDOM,
            session_id,
            cipher_suite: suite,
            compression_method: compression,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = Vec::read(r)?;
        }

        r.expect_empty("ServerHelloPayload")
            .map(|_| ret)
    }
}

impl HasServerExtensions for ServerHelloPayload {
    fn extensions(&self) -> &[ServerExtension] {
        &self.extensions
    }
}

impl ServerHelloPayload {
    pub(crate) fn key_share(&self) -> Option<&KeyShareEntry> {
        let ext = self.find_extension(ExtensionType::KeyShare)?;
        match ext {
            ServerExtension::KeyShare(share) => Some(share),
            _ => None,
        }
    }

    pub(crate) fn psk_index(&self) -> Option<u16> {
        let ext = self.find_extension(ExtensionType::PreSharedKey)?;
        match ext {
            ServerExtension::PresharedKey(index) => Some(*index),
            _ => None,
        }
    }

    pub(crate) fn supported_versions(&self) -> Option<ProtocolVersion> {
        let ext = self.find_extension(ExtensionType::SupportedVersions)?;
        match ext {
            ServerExtension::SupportedVersions(vers) => Some(*vers),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HelloRetryRequest {
    pub(crate) legacy_version: ProtocolVersion,
    pub(crate) session_id: SessionId,
    pub(crate) cipher_suite: CipherSuite,
    pub(crate) extensions: Vec<HelloRetryExtension>,
}

impl Codec for HelloRetryRequest {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.legacy_version.encode(bytes);
        HELLO_RETRY_REQUEST_RANDOM.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        Compression::Null.encode(bytes);
        self.extensions.encode(bytes);
    }

    // minus version and random, which have already been read.
    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let session_id = SessionId::read(r)?;
        let cipher_suite = CipherSuite::read(r)?;
        let compression = Compression::read(r)?;

        if compression != Compression::Null {
            return Err(InvalidMessage::UnsupportedCompression);
        }

        let ret = Self {
            legacy_version: ProtocolVersion::Unknown(0),
            session_id,
            cipher_suite,
            extensions: Vec::read(r)?,
        };

        r.expect_empty("HelloRetryRequest")
            .map(|_| ret)
    }
}

impl HelloRetryRequest {
    /// Returns true if there is more than one extension of a given
    /// type.
    pub(crate) fn has_duplicate_extension(&self) -> bool {
        has_duplicates(
            self.extensions
                .iter()
                .map(|ext| ext.ext_type().into())
                .collect(),
        )
    }

    pub(crate) fn has_unknown_extension(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, HelloRetryExtension::Unknown(_)))
    }

    fn find_extension(&self, ext: ExtensionType) -> Option<&HelloRetryExtension> {
        self.extensions
            .iter()
            .find(|x| x.ext_type() == ext)
    }

    pub(crate) fn requested_key_share_group(&self) -> Option<NamedGroup> {
        let ext = self.find_extension(ExtensionType::KeyShare)?;
        match ext {
            HelloRetryExtension::KeyShare(grp) => Some(*grp),
            _ => None,
        }
    }

    pub(crate) fn cookie(&self) -> Option<&PayloadU16> {
        let ext = self.find_extension(ExtensionType::Cookie)?;
        match ext {
            HelloRetryExtension::Cookie(cookie) => Some(cookie),
            _ => None,
        }
    }

    pub(crate) fn supported_versions(&self) -> Option<ProtocolVersion> {
        let ext = self.find_extension(ExtensionType::SupportedVersions)?;
        match ext {
            HelloRetryExtension::SupportedVersions(vers) => Some(*vers),
            _ => None,
        }
    }
}

/// Operations common to structures carrying a list of
/// [`ServerExtension`]s (ServerHello and EncryptedExtensions).
pub(crate) trait HasServerExtensions {
    fn extensions(&self) -> &[ServerExtension];

    /// Returns true if there is more than one extension of a given
    /// type.
    fn has_duplicate_extension(&self) -> bool {
        has_duplicates(
            self.extensions()
                .iter()
                .map(|ext| ext.ext_type().into())
                .collect(),
        )
    }

    fn find_extension(&self, ext: ExtensionType) -> Option<&ServerExtension> {
        self.extensions()
            .iter()
            .find(|x| x.ext_type() == ext)
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        let ext = self.find_extension(ExtensionType::ALProtocolNegotiation)?;
        match ext {
            ServerExtension::Protocols(protos) if protos.len() == 1 => {
                Some(&protos[0].0)
            }
            _ => None,
        }
    }

    fn early_data_extension_offered(&self) -> bool {
        self.find_extension(ExtensionType::EarlyData)
            .is_some()
    }
}

impl HasServerExtensions for Vec<ServerExtension> {
    fn extensions(&self) -> &[ServerExtension] {
        self
    }
}

impl Codec for CertificateDer<'static> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        u24(self.as_ref().len() as u32).encode(bytes);
        bytes.extend_from_slice(self.as_ref());
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let len = usize::from(u24::read(r)?);
        if len == 0 {
            return Err(InvalidMessage::IllegalEmptyValue);
        }
        if len >= CERTIFICATE_MAX_SIZE_LIMIT {
            return Err(InvalidMessage::CertificatePayloadTooLarge);
        }
        let mut sub = r.sub(len)?;
        let body = sub.rest().to_vec();
        Ok(Self::from(body))
    }
}

#[derive(Clone, Debug)]
pub(crate) enum CertificateExtension {
    Unknown(UnknownExtension),
}

impl CertificateExtension {
    pub(crate) fn ext_type(&self) -> ExtensionType {
        match self {
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for CertificateExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        put_length_prefixed(SizePrefix::U16, bytes, |buf| match self {
            Self::Unknown(r) => r.encode(buf),
        });
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        // Unrecognised extensions on individual certificate entries are
        // skipped, not fatal.
        let ext = Self::Unknown(UnknownExtension::read(typ, &mut sub));

        sub.expect_empty("CertificateExtension")
            .map(|_| ext)
    }
}

impl TlsListElement for CertificateExtension {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

#[derive(Clone, Debug)]
pub struct CertificateEntry {
    pub(crate) cert: CertificateDer<'static>,
    pub(crate) exts: Vec<CertificateExtension>,
}

impl Codec for CertificateEntry {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.cert.encode(bytes);
        self.exts.encode(bytes);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        Ok(Self {
            cert: CertificateDer::read(r)?,
            exts: Vec::read(r)?,
        })
    }
}

impl CertificateEntry {
    pub(crate) fn new(cert: CertificateDer<'static>) -> Self {
        Self {
            cert,
            exts: Vec::new(),
        }
    }

    pub(crate) fn has_duplicate_extension(&self) -> bool {
        has_duplicates(
            self.exts
                .iter()
                .map(|ext| ext.ext_type().into())
                .collect(),
        )
    }
}

impl TlsListElement for CertificateEntry {
    const SIZE_LEN: SizePrefix = SizePrefix::U24;
}

#[derive(Clone, Debug)]
pub struct CertificatePayloadTls13 {
    pub(crate) context: PayloadU8,
    pub(crate) entries: Vec<CertificateEntry>,
}

impl Codec for CertificatePayloadTls13 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.context.encode(bytes);
        self.entries.encode(bytes);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        Ok(Self {
            context: PayloadU8::read(r)?,
            entries: Vec::read(r)?,
        })
    }
}

impl CertificatePayloadTls13 {
    pub(crate) fn new(certs: impl Iterator<Item = CertificateDer<'static>>) -> Self {
        Self {
            context: PayloadU8::empty(),
            entries: certs.map(CertificateEntry::new).collect(),
        }
    }

    pub(crate) fn any_entry_has_duplicate_extension(&self) -> bool {
        self.entries
            .iter()
            .any(CertificateEntry::has_duplicate_extension)
    }

    pub(crate) fn into_certificate_chain(self) -> Vec<CertificateDer<'static>> {
        self.entries
            .into_iter()
            .map(|entry| entry.cert)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DigitallySignedStruct {
    pub(crate) scheme: SignatureScheme,
    sig: PayloadU16,
}

impl DigitallySignedStruct {
    pub(crate) fn new(scheme: SignatureScheme, sig: Vec<u8>) -> Self {
        Self {
            scheme,
            sig: PayloadU16::new(sig),
        }
    }

    /// Which signature scheme the signature uses.
    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// The signature proper.
    pub fn signature(&self) -> &[u8] {
        &self.sig.0
    }
}

impl Codec for DigitallySignedStruct {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.scheme.encode(bytes);
        self.sig.encode(bytes);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let scheme = SignatureScheme::read(r)?;
        let sig = PayloadU16::read(r)?;

        Ok(Self { scheme, sig })
    }
}

#[derive(Clone, Debug)]
pub(crate) enum CertReqExtension {
    SignatureAlgorithms(Vec<SignatureScheme>),
    Unknown(UnknownExtension),
}

impl CertReqExtension {
    pub(crate) fn ext_type(&self) -> ExtensionType {
        match self {
            Self::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for CertReqExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        put_length_prefixed(SizePrefix::U16, bytes, |buf| match self {
            Self::SignatureAlgorithms(r) => r.encode(buf),
            Self::Unknown(r) => r.encode(buf),
        });
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::SignatureAlgorithms => {
                let schemes = Vec::read(&mut sub)?;
                if schemes.is_empty() {
                    return Err(InvalidMessage::IllegalEmptyList("SignatureSchemes"));
                }
                Self::SignatureAlgorithms(schemes)
            }
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("CertReqExtension")
            .map(|_| ext)
    }
}

impl TlsListElement for CertReqExtension {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

#[derive(Clone, Debug)]
pub struct CertificateRequestPayloadTls13 {
    pub(crate) context: PayloadU8,
    pub(crate) extensions: Vec<CertReqExtension>,
}

impl Codec for CertificateRequestPayloadTls13 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.context.encode(bytes);
        self.extensions.encode(bytes);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        Ok(Self {
            context: PayloadU8::read(r)?,
            extensions: Vec::read(r)?,
        })
    }
}

impl CertificateRequestPayloadTls13 {
    pub(crate) fn find_extension(&self, ext: ExtensionType) -> Option<&CertReqExtension> {
        self.extensions
            .iter()
            .find(|x| x.ext_type() == ext)
    }

    pub(crate) fn sigalgs_extension(&self) -> Option<&[SignatureScheme]> {
        let ext = self.find_extension(ExtensionType::SignatureAlgorithms)?;
        match ext {
            CertReqExtension::SignatureAlgorithms(sa) => Some(sa),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum NewSessionTicketExtension {
    EarlyData(u32),
    Unknown(UnknownExtension),
}

impl NewSessionTicketExtension {
    pub(crate) fn ext_type(&self) -> ExtensionType {
        match self {
            Self::EarlyData(_) => ExtensionType::EarlyData,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for NewSessionTicketExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        put_length_prefixed(SizePrefix::U16, bytes, |buf| match self {
            Self::EarlyData(r) => r.encode(buf),
            Self::Unknown(r) => r.encode(buf),
        });
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::EarlyData => Self::EarlyData(u32::read(&mut sub)?),
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("NewSessionTicketExtension")
            .map(|_| ext)
    }
}

impl TlsListElement for NewSessionTicketExtension {
    const SIZE_LEN: SizePrefix = SizePrefix::U16;
}

#[derive(Clone, Debug)]
pub struct NewSessionTicketPayloadTls13 {
    pub(crate) lifetime: u32,
    pub(crate) age_add: u32,
    pub(crate) nonce: PayloadU8,
    pub(crate) ticket: PayloadU16,
    pub(crate) exts: Vec<NewSessionTicketExtension>,
}

impl NewSessionTicketPayloadTls13 {
    pub(crate) fn has_duplicate_extension(&self) -> bool {
        has_duplicates(
            self.exts
                .iter()
                .map(|ext| ext.ext_type().into())
                .collect(),
        )
    }

    fn find_extension(&self, ext: ExtensionType) -> Option<&NewSessionTicketExtension> {
        self.exts
            .iter()
            .find(|x| x.ext_type() == ext)
    }

    pub(crate) fn max_early_data_size(&self) -> Option<u32> {
        let ext = self.find_extension(ExtensionType::EarlyData)?;
        match ext {
            NewSessionTicketExtension::EarlyData(sz) => Some(*sz),
            _ => None,
        }
    }
}

impl Codec for NewSessionTicketPayloadTls13 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.lifetime.encode(bytes);
        self.age_add.encode(bytes);
        self.nonce.encode(bytes);
        self.ticket.encode(bytes);
        self.exts.encode(bytes);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let lifetime = u32::read(r)?;
        let age_add = u32::read(r)?;
        let nonce = PayloadU8::read(r)?;
        let ticket = PayloadU16::read(r)?;
        if ticket.0.is_empty() {
            return Err(InvalidMessage::EmptyTicketValue);
        }
        let exts = Vec::read(r)?;

        Ok(Self {
            lifetime,
            age_add,
            nonce,
            ticket,
            exts,
        })
    }
}

#[derive(Debug)]
pub enum HandshakePayload {
    ClientHello(ClientHelloPayload),
    ServerHello(ServerHelloPayload),
    HelloRetryRequest(HelloRetryRequest),
    EncryptedExtensions(Vec<ServerExtension>),
    CertificateRequest(CertificateRequestPayloadTls13),
    Certificate(CertificatePayloadTls13),
    CertificateVerify(DigitallySignedStruct),
    EndOfEarlyData,
    Finished(Payload),
    NewSessionTicket(NewSessionTicketPayloadTls13),
    MessageHash(Payload),
    Unknown(Payload),
}

impl HandshakePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        use self::HandshakePayload::*;
        match self {
            ClientHello(x) => x.encode(bytes),
            ServerHello(x) => x.encode(bytes),
            HelloRetryRequest(x) => x.encode(bytes),
            EncryptedExtensions(x) => x.encode(bytes),
            CertificateRequest(x) => x.encode(bytes),
            Certificate(x) => x.encode(bytes),
            CertificateVerify(x) => x.encode(bytes),
            EndOfEarlyData => {}
            Finished(x) => x.encode(bytes),
            NewSessionTicket(x) => x.encode(bytes),
            MessageHash(x) => x.encode(bytes),
            Unknown(x) => x.encode(bytes),
        }
    }
}

#[derive(Debug)]
pub struct HandshakeMessagePayload {
    pub(crate) typ: HandshakeType,
    pub(crate) payload: HandshakePayload,
}

impl Codec for HandshakeMessagePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        // encode type.
        match self.typ {
            // A HelloRetryRequest is wire-identical to a ServerHello.
            HandshakeType::HelloRetryRequest => HandshakeType::ServerHello,
            _ => self.typ,
        }
        .encode(bytes);

        // 3-byte length.
        put_length_prefixed(SizePrefix::U24, bytes, |buf| self.payload.encode(buf));
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let mut typ = HandshakeType::read(r)?;
        let len = usize::from(u24::read(r)?);
        let mut sub = r.sub(len)?;

        let payload = match typ {
            HandshakeType::ClientHello => {
                HandshakePayload::ClientHello(ClientHelloPayload::read(&mut sub)?)
            }
            HandshakeType::ServerHello => {
                let version = ProtocolVersion::read(&mut sub)?;
                let random = Random::read(&mut sub)?;

                if random == HELLO_RETRY_REQUEST_RANDOM {
                    let mut hrr = HelloRetryRequest::read(&mut sub)?;
                    hrr.legacy_version = version;
                    typ = HandshakeType::HelloRetryRequest;
                    HandshakePayload::HelloRetryRequest(hrr)
                } else {
                    let mut shp = ServerHelloPayload::read(&mut sub)?;
                    shp.legacy_version = version;
                    shp.random = random;
                    HandshakePayload::ServerHello(shp)
                }
            }
            HandshakeType::EncryptedExtensions => {
                HandshakePayload::EncryptedExtensions(Vec::read(&mut sub)?)
            }
            HandshakeType::CertificateRequest => HandshakePayload::CertificateRequest(
                CertificateRequestPayloadTls13::read(&mut sub)?,
            ),
            HandshakeType::Certificate => {
                HandshakePayload::Certificate(CertificatePayloadTls13::read(&mut sub)?)
            }
            HandshakeType::CertificateVerify => {
                HandshakePayload::CertificateVerify(DigitallySignedStruct::read(&mut sub)?)
            }
            HandshakeType::EndOfEarlyData => {
                if sub.any_left() {
                    return Err(InvalidMessage::TrailingData("EndOfEarlyData"));
                }
                HandshakePayload::EndOfEarlyData
            }
            HandshakeType::Finished => HandshakePayload::Finished(Payload::read(&mut sub)?),
            HandshakeType::NewSessionTicket => {
                HandshakePayload::NewSessionTicket(NewSessionTicketPayloadTls13::read(&mut sub)?)
            }
            HandshakeType::MessageHash => {
                // does not appear on the wire
                return Err(InvalidMessage::UnexpectedMessage("MessageHash"));
            }
            HandshakeType::HelloRetryRequest => {
                // not legal on wire; arrives disguised as ServerHello
                return Err(InvalidMessage::UnexpectedMessage("HelloRetryRequest"));
            }
            _ => HandshakePayload::Unknown(Payload::read(&mut sub)?),
        };

        sub.expect_empty("HandshakeMessagePayload")
            .map(|_| Self { typ, payload })
    }
}

impl HandshakeMessagePayload {
    pub(crate) fn build_handshake_hash(hash: &[u8]) -> Self {
        Self {
            typ: HandshakeType::MessageHash,
            payload: HandshakePayload::MessageHash(Payload::new(hash.to_vec())),
        }
    }

    pub(crate) fn encoding_for_binder_signing(&self) -> Vec<u8> {
        let mut ret = self.get_encoding();
        let binder_len = match &self.payload {
            HandshakePayload::ClientHello(ch) => ch.total_binder_length(),
            _ => 0,
        };

        let ret_len = ret.len() - binder_len;
        ret.truncate(ret_len);
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_client_hello() -> ClientHelloPayload {
        ClientHelloPayload {
            client_version: ProtocolVersion::TLSv1_2,
            random: Random([0x55; 32]),
            session_id: SessionId::empty(),
            cipher_suites: vec![
                CipherSuite::TLS13_AES_128_GCM_SHA256,
                CipherSuite::TLS13_AES_256_GCM_SHA384,
            ],
            compression_methods: vec![Compression::Null],
            extensions: vec![
                ClientExtension::SupportedVersions(vec![ProtocolVersion::TLSv1_3]),
                ClientExtension::make_sni("localhost"),
                ClientExtension::NamedGroups(vec![NamedGroup::X25519]),
                ClientExtension::SignatureAlgorithms(vec![
                    SignatureScheme::ECDSA_NISTP256_SHA256,
                ]),
                ClientExtension::KeyShare(vec![KeyShareEntry::new(NamedGroup::X25519, &[0xab; 32])]),
                ClientExtension::PresharedKeyModes(vec![PskKeyExchangeMode::PSK_DHE_KE]),
            ],
        }
    }

    #[test]
    fn client_hello_round_trips_byte_for_byte() {
        let hmp = HandshakeMessagePayload {
            typ: HandshakeType::ClientHello,
            payload: HandshakePayload::ClientHello(sample_client_hello()),
        };
        let enc = hmp.get_encoding();

        let parsed = HandshakeMessagePayload::read_bytes(&enc).unwrap();
        assert_eq!(parsed.typ, HandshakeType::ClientHello);
        assert_eq!(parsed.get_encoding(), enc);
    }

    #[test]
    fn message_longer_than_header_length_is_rejected() {
        let hmp = HandshakeMessagePayload {
            typ: HandshakeType::ClientHello,
            payload: HandshakePayload::ClientHello(sample_client_hello()),
        };
        let enc = hmp.get_encoding();

        // the header length now extends exactly one byte past the
        // available bytes
        assert!(HandshakeMessagePayload::read_bytes(&enc[..enc.len() - 1]).is_err());
    }

    #[test]
    fn extension_with_trailing_byte_is_rejected() {
        // supported_versions carrying [0x0304] plus a stray byte
        let ext = [0x00, 0x2b, 0x00, 0x04, 0x02, 0x03, 0x04, 0xff];
        assert!(matches!(
            ClientExtension::read_bytes(&ext),
            Err(InvalidMessage::TrailingData("ClientExtension"))
        ));
    }

    #[test]
    fn server_hello_and_hrr_are_discriminated_by_random() {
        let sh = HandshakeMessagePayload {
            typ: HandshakeType::ServerHello,
            payload: HandshakePayload::ServerHello(ServerHelloPayload {
                legacy_version: ProtocolVersion::TLSv1_2,
                random: Random([0x12; 32]),
                session_id: SessionId::empty(),
                cipher_suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
                compression_method: Compression::Null,
                extensions: vec![ServerExtension::SupportedVersions(ProtocolVersion::TLSv1_3)],
            }),
        };
        let parsed = HandshakeMessagePayload::read_bytes(&sh.get_encoding()).unwrap();
        assert_eq!(parsed.typ, HandshakeType::ServerHello);

        let hrr = HandshakeMessagePayload {
            typ: HandshakeType::HelloRetryRequest,
            payload: HandshakePayload::HelloRetryRequest(HelloRetryRequest {
                legacy_version: ProtocolVersion::TLSv1_2,
                session_id: SessionId::empty(),
                cipher_suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
                extensions: vec![
                    HelloRetryExtension::SupportedVersions(ProtocolVersion::TLSv1_3),
                    HelloRetryExtension::KeyShare(NamedGroup::secp256r1),
                ],
            }),
        };
        let enc = hrr.get_encoding();
        // wire type is ServerHello
        assert_eq!(enc[0], u8::from(HandshakeType::ServerHello));
        let parsed = HandshakeMessagePayload::read_bytes(&enc).unwrap();
        assert_eq!(parsed.typ, HandshakeType::HelloRetryRequest);
        match parsed.payload {
            HandshakePayload::HelloRetryRequest(hrr) => {
                assert_eq!(
                    hrr.requested_key_share_group(),
                    Some(NamedGroup::secp256r1)
                );
                assert!(hrr.cookie().is_none());
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn duplicate_extensions_are_detected() {
        let mut ch = sample_client_hello();
        assert!(!ch.has_duplicate_extension());
        ch.extensions
            .push(ClientExtension::SupportedVersions(vec![
                ProtocolVersion::TLSv1_3,
            ]));
        assert!(ch.has_duplicate_extension());

        // ... and are a decode error when parsing
        let hmp = HandshakeMessagePayload {
            typ: HandshakeType::ClientHello,
            payload: HandshakePayload::ClientHello(ch),
        };
        assert!(matches!(
            HandshakeMessagePayload::read_bytes(&hmp.get_encoding()),
            Err(InvalidMessage::DuplicateExtension(0x002b))
        ));
    }

    #[test]
    fn psk_offer_must_be_the_final_extension() {
        let mut ch = sample_client_hello();
        ch.extensions
            .push(ClientExtension::PresharedKey(PresharedKeyOffer::new(
                PresharedKeyIdentity::new(vec![1, 2, 3], 0),
                vec![0u8; 32],
            )));
        ch.extensions.push(ClientExtension::EarlyData);

        let hmp = HandshakeMessagePayload {
            typ: HandshakeType::ClientHello,
            payload: HandshakePayload::ClientHello(ch),
        };
        assert!(matches!(
            HandshakeMessagePayload::read_bytes(&hmp.get_encoding()),
            Err(InvalidMessage::PreSharedKeyIsNotFinalExtension)
        ));
    }

    #[test]
    fn binder_encoding_is_stripped_for_signing() {
        let mut ch = sample_client_hello();
        ch.extensions
            .push(ClientExtension::PresharedKey(PresharedKeyOffer::new(
                PresharedKeyIdentity::new(vec![1, 2, 3], 0xaabbccdd),
                vec![0u8; 32],
            )));
        let hmp = HandshakeMessagePayload {
            typ: HandshakeType::ClientHello,
            payload: HandshakePayload::ClientHello(ch),
        };

        let full = hmp.get_encoding();
        let truncated = hmp.encoding_for_binder_signing();
        // 2 bytes binder list length + 1 byte binder length + 32 bytes binder
        assert_eq!(full.len(), truncated.len() + 2 + 1 + 32);
        assert_eq!(&full[..truncated.len()], &truncated[..]);
    }

    #[test]
    fn set_psk_binder_patches_the_offer() {
        let mut ch = sample_client_hello();
        ch.extensions
            .push(ClientExtension::PresharedKey(PresharedKeyOffer::new(
                PresharedKeyIdentity::new(vec![1, 2, 3], 7),
                vec![0u8; 32],
            )));
        ch.set_psk_binder(vec![0xee; 32]);
        let offer = ch.preshared_key_offer().unwrap();
        assert_eq!(offer.binders[0].0, vec![0xee; 32]);
    }

    #[test]
    fn oversized_certificate_entry_is_rejected() {
        let mut bytes = Vec::new();
        u24(CERTIFICATE_MAX_SIZE_LIMIT as u32).encode(&mut bytes);
        bytes.resize(3 + CERTIFICATE_MAX_SIZE_LIMIT, 0u8);
        assert!(matches!(
            CertificateDer::read_bytes(&bytes),
            Err(InvalidMessage::CertificatePayloadTooLarge)
        ));
    }

    #[test]
    fn new_session_ticket_with_empty_ticket_is_rejected() {
        let nst = NewSessionTicketPayloadTls13 {
            lifetime: 300,
            age_add: 1,
            nonce: PayloadU8::new(vec![0]),
            ticket: PayloadU16::new(vec![]),
            exts: Vec::new(),
        };
        assert!(matches!(
            NewSessionTicketPayloadTls13::read_bytes(&nst.get_encoding()),
            Err(InvalidMessage::EmptyTicketValue)
        ));
    }

    #[test]
    fn new_session_ticket_early_data_extension() {
        let nst = NewSessionTicketPayloadTls13 {
            lifetime: 300,
            age_add: 1,
            nonce: PayloadU8::new(vec![0, 1]),
            ticket: PayloadU16::new(vec![0xaa; 16]),
            exts: vec![NewSessionTicketExtension::EarlyData(16384)],
        };
        let parsed = NewSessionTicketPayloadTls13::read_bytes(&nst.get_encoding()).unwrap();
        assert_eq!(parsed.max_early_data_size(), Some(16384));
        assert!(!parsed.has_duplicate_extension());
    }

    #[test]
    fn certificate_der_read_rejects_err_on_empty() {
        let mut bytes = Vec::new();
        u24(0).encode(&mut bytes);
        assert!(matches!(
            CertificateDer::read_bytes(&bytes),
            Err(InvalidMessage::IllegalEmptyValue)
        ));
    }
}

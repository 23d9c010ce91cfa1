use core::fmt::Debug;

use crate::error::InvalidMessage;

/// A cursor over a borrowed byte slice.
///
/// Reads consume from the front of the slice; nested length-delimited
/// structures are handled by carving out a sub-`Reader` over exactly
/// the delimited bytes, so a child parser can never run past its
/// container.
pub struct Reader<'a> {
    /// Bytes not yet consumed.
    remaining: &'a [u8],
    /// How many bytes have been consumed so far.
    used: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the front of `bytes`.
    pub fn init(bytes: &'a [u8]) -> Self {
        Self {
            remaining: bytes,
            used: 0,
        }
    }

    /// Consume and return the next `length` bytes, or `None` if fewer
    /// remain.
    pub fn take(&mut self, length: usize) -> Option<&'a [u8]> {
        if self.remaining.len() < length {
            return None;
        }

        let (taken, rest) = self.remaining.split_at(length);
        self.remaining = rest;
        self.used += length;
        Some(taken)
    }

    /// Consume exactly `N` bytes as a fixed-size array reference.
    ///
    /// This is the primitive under the integer decoders: the array
    /// size makes the `to_be_bytes`/`from_be_bytes` round trips
    /// infallible.
    pub(crate) fn take_array<const N: usize>(&mut self) -> Option<&'a [u8; N]> {
        self.take(N)
            .and_then(|slice| slice.try_into().ok())
    }

    /// Consume and return everything left.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.remaining;
        self.used += rest.len();
        self.remaining = &[];
        rest
    }

    /// Carve out a child reader over the next `length` bytes.
    pub fn sub(&mut self, length: usize) -> Result<Reader<'a>, InvalidMessage> {
        match self.take(length) {
            Some(bytes) => Ok(Reader::init(bytes)),
            None => Err(InvalidMessage::MessageTooShort),
        }
    }

    /// Whether any bytes remain unread.
    pub fn any_left(&self) -> bool {
        !self.remaining.is_empty()
    }

    /// Error unless this reader was fully consumed; `name` identifies
    /// the enclosing structure in the error.
    pub fn expect_empty(&self, name: &'static str) -> Result<(), InvalidMessage> {
        match self.any_left() {
            true => Err(InvalidMessage::TrailingData(name)),
            false => Ok(()),
        }
    }

    /// The number of bytes consumed so far.
    pub fn used(&self) -> usize {
        self.used
    }

    /// The number of bytes still unread.
    pub fn left(&self) -> usize {
        self.remaining.len()
    }
}

/// Trait for implementing encoding and decoding functionality
/// on something.
pub trait Codec: Debug + Sized {
    /// Function for encoding itself by appending itself to
    /// the provided vec of bytes.
    fn encode(&self, bytes: &mut Vec<u8>);

    /// Function for decoding itself from the provided reader
    /// will return Some if the decoding was successful or
    /// None if it was not.
    fn read(r: &mut Reader) -> Result<Self, InvalidMessage>;

    /// Convenience function for encoding the implementation
    /// into a vec and returning it
    fn get_encoding(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.encode(&mut bytes);
        bytes
    }

    /// Function for wrapping a call to the read function in
    /// a Reader for the slice of bytes provided
    fn read_bytes(bytes: &[u8]) -> Result<Self, InvalidMessage> {
        let mut reader = Reader::init(bytes);
        Self::read(&mut reader)
    }
}

impl Codec for u8 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.push(*self);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        r.take_array::<1>()
            .map(|b| b[0])
            .ok_or(InvalidMessage::MissingData("u8"))
    }
}

impl Codec for u16 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.to_be_bytes());
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        r.take_array::<2>()
            .map(|b| Self::from_be_bytes(*b))
            .ok_or(InvalidMessage::MissingData("u16"))
    }
}

// Make a distinct type for u24, even though it's a u32 underneath
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone)]
pub struct u24(pub u32);

impl From<u24> for usize {
    #[inline]
    fn from(v: u24) -> Self {
        v.0 as Self
    }
}

impl Codec for u24 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0.to_be_bytes()[1..]);
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        r.take_array::<3>()
            .map(|&[a, b, c]| Self(u32::from_be_bytes([0, a, b, c])))
            .ok_or(InvalidMessage::MissingData("u24"))
    }
}

impl Codec for u32 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.to_be_bytes());
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        r.take_array::<4>()
            .map(|b| Self::from_be_bytes(*b))
            .ok_or(InvalidMessage::MissingData("u32"))
    }
}

/// The width of the length prefix in front of a length-delimited
/// structure.  The TLS wire format uses exactly three widths.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SizePrefix {
    U8,
    U16,
    U24,
}

impl SizePrefix {
    const fn octets(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U24 => 3,
        }
    }

    const fn max(&self) -> usize {
        match self {
            Self::U8 => 0xff,
            Self::U16 => 0xffff,
            Self::U24 => 0xff_ffff,
        }
    }

    /// Decode a length of this width.
    pub(crate) fn read_length(&self, r: &mut Reader) -> Result<usize, InvalidMessage> {
        Ok(match self {
            Self::U8 => usize::from(u8::read(r)?),
            Self::U16 => usize::from(u16::read(r)?),
            Self::U24 => usize::from(u24::read(r)?),
        })
    }
}

/// Encode a length-delimited structure in a single pass.
///
/// `body` appends the structure's contents to the output; a
/// placeholder length of the requested width is written first and
/// patched once the body's true size is known.  This avoids encoding
/// into a scratch buffer just to learn the length.
pub(crate) fn put_length_prefixed(
    prefix: SizePrefix,
    bytes: &mut Vec<u8>,
    body: impl FnOnce(&mut Vec<u8>),
) {
    let len_offset = bytes.len();
    bytes.resize(len_offset + prefix.octets(), 0);

    body(bytes);

    let len = bytes.len() - len_offset - prefix.octets();
    debug_assert!(len <= prefix.max());
    match prefix {
        SizePrefix::U8 => bytes[len_offset] = len as u8,
        SizePrefix::U16 => {
            bytes[len_offset..len_offset + 2].copy_from_slice(&(len as u16).to_be_bytes());
        }
        SizePrefix::U24 => {
            bytes[len_offset..len_offset + 3].copy_from_slice(&u32::to_be_bytes(len as u32)[1..]);
        }
    }
}

/// A type that can appear in a TLS wire-format list.
///
/// Lists are length-prefixed, and the width of that prefix depends on
/// the element type; this trait records the width so that `Codec` can
/// be implemented for `Vec<T>` generically.
pub(crate) trait TlsListElement {
    const SIZE_LEN: SizePrefix;
}

impl<T: Codec + TlsListElement> Codec for Vec<T> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        put_length_prefixed(T::SIZE_LEN, bytes, |buf| {
            for item in self {
                item.encode(buf);
            }
        });
    }

    fn read(r: &mut Reader) -> Result<Self, InvalidMessage> {
        let len = T::SIZE_LEN.read_length(r)?;
        let mut sub = r.sub(len)?;

        let mut ret = Self::new();
        while sub.any_left() {
            ret.push(T::read(&mut sub)?);
        }

        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_is_patched_after_the_body() {
        let mut buf = Vec::new();
        put_length_prefixed(SizePrefix::U16, &mut buf, |body| {
            body.push(0xaa);
            body.push(0xbb);
        });
        assert_eq!(buf, vec![0x00, 0x02, 0xaa, 0xbb]);

        let mut buf = Vec::new();
        put_length_prefixed(SizePrefix::U24, &mut buf, |_| {});
        assert_eq!(buf, vec![0x00, 0x00, 0x00]);

        // nesting patches inner and outer independently
        let mut buf = Vec::new();
        put_length_prefixed(SizePrefix::U16, &mut buf, |outer| {
            put_length_prefixed(SizePrefix::U8, outer, |inner| inner.push(0x01));
        });
        assert_eq!(buf, vec![0x00, 0x02, 0x01, 0x01]);
    }

    #[test]
    fn reader_take_and_sub() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        let mut rd = Reader::init(&bytes);
        assert_eq!(rd.take(2), Some(&bytes[..2]));
        assert_eq!(rd.left(), 2);
        assert_eq!(rd.used(), 2);
        assert!(rd.sub(3).is_err());
        let mut sub = rd.sub(2).unwrap();
        assert_eq!(sub.rest(), &bytes[2..]);
        assert!(!rd.any_left());
        assert!(rd.expect_empty("test").is_ok());
    }

    #[test]
    fn take_array_is_exact() {
        let bytes = [0x0a, 0x0b, 0x0c];
        let mut rd = Reader::init(&bytes);
        assert_eq!(rd.take_array::<2>(), Some(&[0x0a, 0x0b]));
        assert_eq!(rd.take_array::<2>(), None);
        assert_eq!(rd.take_array::<1>(), Some(&[0x0c]));
    }

    #[test]
    fn integer_round_trips() {
        let mut buf = Vec::new();
        u24(0x00c0_ffee).encode(&mut buf);
        assert_eq!(buf, vec![0xc0, 0xff, 0xee]);
        assert_eq!(u24::read_bytes(&buf).unwrap().0, 0x00c0_ffee);

        assert_eq!(0xbeef_u16.get_encoding(), vec![0xbe, 0xef]);
        assert_eq!(u16::read_bytes(&[0xbe, 0xef]).unwrap(), 0xbeef);
        assert!(u32::read_bytes(&[0x01, 0x02, 0x03]).is_err());
    }
}

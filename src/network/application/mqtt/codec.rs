//! Resumable wire encoders and byte-at-a-time decoders.
//!
//! Encoders take the value to encode, the number of bytes of that field already
//! produced (`offset`) and an output slice. Calling an encoder repeatedly with a
//! growing offset yields exactly the bytes a single call with a large enough
//! buffer would have produced, so the caller can stop at any byte boundary and
//! resume later. The only cached state is the small scratch buffer holding a
//! pre-built header, which the caller rebuilds at offset 0 of each packet.
//!
//! Decoders are fed one byte at a time and return `Ok(None)` until a value is
//! complete.

use heapless::Vec;

use super::error::{DecodeError, Error, Invalid};
use super::packet::{
    CONNECT_HEADER_LEN, Connect, FixedHeader, MAX_REMAINING_LENGTH, PROTOCOL_LEVEL,
    PROTOCOL_NAME, PacketType,
};
use super::string::{ByteStr, StreamError};

/// Scratch space for memoized headers.
pub type Scratch = Vec<u8, 16>;

/// Outcome of one encoder call.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Encode {
    /// The field is complete; this many bytes were written by this call.
    Finished(usize),
    /// The output slice is full; this many bytes were written.
    Partial(usize),
    /// A streamed field has no data yet; this many bytes were written.
    WouldBlock(usize),
    /// A streamed field failed.
    Failed(Error),
}

/// Appends the remaining-length varint to `buf`.
///
/// Each byte carries 7 bits, least significant group first, with the high bit
/// set on every byte but the last.
pub fn encode_remaining_length<const N: usize>(
    buf: &mut Vec<u8, N>,
    mut len: usize,
) -> Result<(), Error> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Error::InvalidRequest(Invalid::PacketTooLarge));
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte)
            .map_err(|_| Error::InvalidRequest(Invalid::PacketTooLarge))?;
        if len == 0 {
            return Ok(());
        }
    }
}

/// Number of bytes the remaining-length varint of `len` occupies.
pub fn remaining_length_size(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Incremental remaining-length decoder.
#[derive(Debug, Default, Clone)]
pub struct RemainingLengthDecoder {
    value: usize,
    multiplier: usize,
    count: u8,
}

impl RemainingLengthDecoder {
    /// Creates a decoder awaiting the first byte.
    pub const fn new() -> Self {
        RemainingLengthDecoder {
            value: 0,
            multiplier: 1,
            count: 0,
        }
    }

    /// Feeds one byte.
    ///
    /// Rejects a fourth byte with the continuation bit set and a zero byte
    /// following a continuation, which would be a non-minimal encoding.
    pub fn push(&mut self, byte: u8) -> Result<Option<usize>, DecodeError> {
        if self.count > 0 && byte == 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }
        if self.count == 3 && byte & 0x80 != 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }
        if self.count == 0 {
            self.multiplier = 1;
        }
        self.value += (byte & 0x7f) as usize * self.multiplier;
        self.multiplier *= 128;
        self.count += 1;
        if byte & 0x80 != 0 {
            return Ok(None);
        }
        let value = self.value;
        *self = Self::new();
        Ok(Some(value))
    }
}

/// Incremental fixed-header decoder.
#[derive(Debug, Default, Clone)]
pub struct FixedHeaderDecoder {
    first: Option<(PacketType, u8)>,
    length: RemainingLengthDecoder,
}

impl FixedHeaderDecoder {
    /// Creates a decoder awaiting the first byte.
    pub const fn new() -> Self {
        FixedHeaderDecoder {
            first: None,
            length: RemainingLengthDecoder::new(),
        }
    }

    /// Feeds one byte, validating type and flags in the first.
    pub fn push(&mut self, byte: u8) -> Result<Option<FixedHeader>, DecodeError> {
        let Some((packet_type, flags)) = self.first else {
            self.first = Some(FixedHeader::parse_first_byte(byte)?);
            return Ok(None);
        };
        match self.length.push(byte)? {
            None => Ok(None),
            Some(remaining_length) => {
                self.first = None;
                Ok(Some(FixedHeader {
                    packet_type,
                    flags,
                    remaining_length,
                }))
            }
        }
    }

    /// Forgets any partially decoded header.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Copies `src[offset..]` into `out`.
pub fn encode_slice(src: &[u8], offset: usize, out: &mut [u8]) -> Encode {
    let left = src.len().saturating_sub(offset);
    let n = left.min(out.len());
    out[..n].copy_from_slice(&src[offset..offset + n]);
    if n == left {
        Encode::Finished(n)
    } else {
        Encode::Partial(n)
    }
}

/// Encodes a big-endian 16-bit integer.
pub fn encode_u16(value: u16, offset: usize, out: &mut [u8]) -> Encode {
    encode_slice(&value.to_be_bytes(), offset, out)
}

/// Encodes the raw bytes of `s` with no length prefix.
pub fn encode_bytes(s: &mut ByteStr<'_>, offset: usize, out: &mut [u8]) -> Encode {
    let len = s.len();
    let mut written = 0;
    while offset + written < len {
        if written == out.len() {
            return Encode::Partial(written);
        }
        match s.read(offset + written, &mut out[written..]) {
            Ok(n) => written += n,
            Err(StreamError::WouldBlock) => return Encode::WouldBlock(written),
            Err(StreamError::Failed(code)) => return Encode::Failed(Error::Stream(code)),
        }
    }
    Encode::Finished(written)
}

/// Encodes a length-prefixed string.
///
/// With `skip_if_empty` an empty string produces no bytes at all; otherwise the
/// two-byte prefix is always written. `offset` may point into the prefix or
/// into the body.
pub fn encode_string(
    s: &mut ByteStr<'_>,
    skip_if_empty: bool,
    offset: usize,
    out: &mut [u8],
) -> Encode {
    let len = s.len();
    if skip_if_empty && len == 0 {
        return Encode::Finished(0);
    }
    let mut written = 0;
    if offset < 2 {
        // len was validated to fit in 16 bits
        match encode_u16(len as u16, offset, out) {
            Encode::Finished(n) => written = n,
            other => return other,
        }
    }
    let body = (offset + written) - 2;
    match encode_bytes(s, body, &mut out[written..]) {
        Encode::Finished(n) => Encode::Finished(written + n),
        Encode::Partial(n) => Encode::Partial(written + n),
        Encode::WouldBlock(n) => Encode::WouldBlock(written + n),
        failed => failed,
    }
}

/// Builds a fixed header into `scratch`.
pub fn build_fixed_header(
    scratch: &mut Scratch,
    first_byte: u8,
    remaining_length: usize,
) -> Result<(), Error> {
    scratch.clear();
    scratch
        .push(first_byte)
        .map_err(|_| Error::InvalidRequest(Invalid::PacketTooLarge))?;
    encode_remaining_length(scratch, remaining_length)
}

/// Builds the 10-byte CONNECT variable header into `scratch`.
pub fn build_connect_header(scratch: &mut Scratch, connect: &Connect<'_>) {
    let mut header = [0u8; CONNECT_HEADER_LEN];
    header[..2].copy_from_slice(&(PROTOCOL_NAME.len() as u16).to_be_bytes());
    header[2..6].copy_from_slice(PROTOCOL_NAME);
    header[6] = PROTOCOL_LEVEL;
    header[7] = connect.flags();
    header[8..].copy_from_slice(&connect.keep_alive.to_be_bytes());
    scratch.clear();
    // 10 bytes always fit in the scratch buffer
    let _ = scratch.extend_from_slice(&header);
}

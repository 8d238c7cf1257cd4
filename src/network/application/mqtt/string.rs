//! Byte strings for topics, payloads and credentials.
//!
//! A [`ByteStr`] is either a borrowed slice or a fixed-length stream pulled
//! from a [`ByteSource`] while the packet is being encoded. Streams let large
//! payloads come from files or producers that are not ready yet without
//! buffering the whole value in memory.

use core::fmt;

/// Failure reported by a [`ByteSource`] or an inbound message sink.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError {
    /// No data can be moved right now; the engine retries on the next call.
    WouldBlock,
    /// Hard failure with an application or OS error code.
    Failed(i32),
}

/// Supplies the bytes of a streamed [`ByteStr`].
///
/// `offset` is the position of `buf[0]` within the string. The engine asks for
/// increasing offsets while a packet is encoded and starts again from 0 when a
/// packet is retransmitted after a reconnect, so a source that cannot seek
/// only has to rewind when it sees offset 0 again.
pub trait ByteSource {
    /// Copies up to `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// Returning `Ok(0)` for a non-empty `buf` is treated like
    /// [`StreamError::WouldBlock`].
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<usize, StreamError>;
}

/// A string field whose length is known before encoding starts.
pub enum ByteStr<'a> {
    /// In-memory bytes.
    Bytes(&'a [u8]),
    /// `len` bytes produced on demand by `source`.
    Stream {
        /// Total length; must not change while the packet is in flight.
        len: usize,
        /// Where the bytes come from.
        source: &'a mut dyn ByteSource,
    },
}

impl<'a> ByteStr<'a> {
    /// An empty string.
    pub const fn empty() -> Self {
        ByteStr::Bytes(&[])
    }

    /// A string of `len` bytes read from `source` on demand.
    pub fn stream(len: usize, source: &'a mut dyn ByteSource) -> Self {
        ByteStr::Stream { len, source }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        match self {
            ByteStr::Bytes(bytes) => bytes.len(),
            ByteStr::Stream { len, .. } => *len,
        }
    }

    /// Whether the string has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes if the string lives in memory.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            ByteStr::Bytes(bytes) => Some(*bytes),
            ByteStr::Stream { .. } => None,
        }
    }

    /// Copies bytes starting at `offset` into `buf`, returning how many were
    /// copied. Never copies past the end of the string.
    pub(crate) fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<usize, StreamError> {
        let want = self.len().saturating_sub(offset).min(buf.len());
        if want == 0 {
            return Ok(0);
        }
        match self {
            ByteStr::Bytes(bytes) => {
                buf[..want].copy_from_slice(&bytes[offset..offset + want]);
                Ok(want)
            }
            ByteStr::Stream { source, .. } => match source.read(offset, &mut buf[..want])? {
                0 => Err(StreamError::WouldBlock),
                n => Ok(n.min(want)),
            },
        }
    }
}

impl Default for ByteStr<'_> {
    fn default() -> Self {
        ByteStr::empty()
    }
}

impl<'a> From<&'a str> for ByteStr<'a> {
    fn from(value: &'a str) -> Self {
        ByteStr::Bytes(value.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for ByteStr<'a> {
    fn from(value: &'a [u8]) -> Self {
        ByteStr::Bytes(value)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for ByteStr<'a> {
    fn from(value: &'a [u8; N]) -> Self {
        ByteStr::Bytes(value)
    }
}

impl fmt::Debug for ByteStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteStr::Bytes(bytes) => match core::str::from_utf8(bytes) {
                Ok(text) => f.debug_tuple("Bytes").field(&text).finish(),
                Err(_) => f.debug_tuple("Bytes").field(bytes).finish(),
            },
            ByteStr::Stream { len, .. } => f.debug_struct("Stream").field("len", len).finish(),
        }
    }
}

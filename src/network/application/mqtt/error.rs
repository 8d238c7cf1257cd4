//! Error types for the MQTT engine.

use super::packet::ConnackCode;

/// Reasons a request is rejected before it is queued.
///
/// A request failing validation never reaches a store, so no bytes are
/// emitted and no completion callback fires for it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Invalid {
    /// A string field is longer than 65535 bytes.
    FieldTooLong,
    /// Exactly one of will topic and will message is empty.
    WillMismatch,
    /// Will retain or a non-zero will QoS was requested without a will topic.
    WillWithoutTopic,
    /// An empty client identifier requires a clean session.
    EmptyClientId,
    /// A password was given without a user name.
    PasswordWithoutUserName,
    /// A QoS value outside 0..=2.
    InvalidQos,
    /// A SUBSCRIBE or UNSUBSCRIBE with no topic filters.
    EmptySubscription,
    /// The packet would not fit in the maximum remaining length.
    PacketTooLarge,
}

/// Protocol violations detected while decoding bytes from the broker.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Packet type outside 1..=14.
    InvalidPacketType,
    /// Flag nibble does not match the pattern mandated for the packet type.
    InvalidFlags,
    /// Remaining length longer than four bytes or not minimally encoded.
    InvalidRemainingLength,
    /// Remaining length inconsistent with the packet type.
    InvalidLength,
    /// A packet a client never receives, or one arriving out of sequence.
    UnexpectedPacket,
    /// CONNACK acknowledge flags with reserved bits set.
    InvalidConnackFlags,
    /// Return code outside the range defined for CONNACK or SUBACK.
    InvalidReturnCode,
    /// An acknowledgement whose packet identifier matches no sent request.
    UnknownPacketId,
    /// Inbound topic name longer than the receive buffer.
    TopicTooLong,
    /// Too many inbound QoS 2 messages awaiting PUBREL.
    TooManyInflight,
}

/// Errors reported by the MQTT engine.
///
/// `InvalidRequest`, `InvalidState` and `StoreFull` are returned synchronously
/// and leave the session untouched (a `StoreFull` raised while queueing an
/// acknowledgement for inbound traffic is the exception). Every other variant is terminal for the
/// session (except `ConnectionRefused`, which only ends the current
/// connection) and is also available afterwards through
/// [`Client::last_error`](super::client::Client::last_error).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Request parameters failed validation.
    InvalidRequest(Invalid),
    /// The operation is not allowed in the current session state.
    InvalidState,
    /// The store has no free slot; retry later.
    StoreFull,
    /// The broker sent malformed or illegal bytes.
    Decode(DecodeError),
    /// A streamed outbound field failed, with its error code.
    Stream(i32),
    /// The inbound message handler failed, with its error code.
    Sink(i32),
    /// Reading from the transport failed, with the OS error code.
    Read(i32),
    /// Writing to the transport failed, with the OS error code.
    Write(i32),
    /// No CONNACK arrived within the default timeout.
    ConnectTimeout,
    /// No PINGRESP arrived in time.
    PingTimeout,
    /// The broker refused the connection.
    ConnectionRefused(ConnackCode),
    /// The configuration could not be parsed or serialized.
    Config,
}

impl Error {
    /// The auxiliary OS-level code carried by I/O and stream errors, 0 otherwise.
    pub fn os_error(&self) -> i32 {
        match *self {
            Error::Stream(code) | Error::Sink(code) | Error::Read(code) | Error::Write(code) => code,
            _ => 0,
        }
    }
}

impl From<Invalid> for Error {
    fn from(value: Invalid) -> Self {
        Error::InvalidRequest(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Error::Decode(value)
    }
}

/// A request the [`Client`](super::client::Client) refused to queue, handed
/// back to the caller together with the reason.
#[derive(Debug)]
pub struct Rejected<T> {
    /// Why the request was refused.
    pub error: Error,
    /// The request, untouched.
    pub request: T,
}

impl<T> Rejected<T> {
    pub(crate) fn new(error: impl Into<Error>, request: T) -> Self {
        Rejected {
            error: error.into(),
            request,
        }
    }
}

//! MQTT 3.1.1 control packet types and request validation.
//!
//! The request structs ([`Connect`], [`Publish`], [`Subscribe`]) are owned by the
//! application until they are handed to the [`Client`](super::Client). The engine
//! keeps them in its store while they are in flight and gives them back through
//! the matching [`Handler`](super::Handler) callback.

use super::error::{DecodeError, Invalid};
use super::string::ByteStr;

/// MQTT protocol name as defined in the specification.
pub const PROTOCOL_NAME: &[u8] = b"MQTT";
/// MQTT protocol level for version 3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;
/// Largest value the remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;
/// Largest length-prefixed string.
pub const MAX_STRING_LENGTH: usize = 65_535;

/// Size of the CONNECT variable header.
pub(crate) const CONNECT_HEADER_LEN: usize = 10;

const CLEAN_SESSION: u8 = 0x02;
const WILL_FLAG: u8 = 0x04;
const WILL_RETAIN: u8 = 0x20;
const PASSWORD_FLAG: u8 = 0x40;
const USER_NAME_FLAG: u8 = 0x80;

/// Quality of Service levels for MQTT messages.
///
/// QoS defines the guarantee of delivery for a specific message. Higher QoS levels
/// provide stronger delivery guarantees but require more network overhead and
/// client state management.
///
/// # Examples
///
/// ```rust
/// use libmqtt::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));
/// assert!(QoS::try_from(3).is_err());
/// ```
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// **QoS 0**: At most once delivery.
    #[default]
    AtMostOnce = 0,
    /// **QoS 1**: At least once delivery. Duplicates can occur.
    AtLeastOnce = 1,
    /// **QoS 2**: Exactly once delivery.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = Invalid;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Invalid::InvalidQos),
        }
    }
}

/// Control packet type, the high nibble of the first fixed-header byte.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    /// Client request to connect.
    Connect = 1,
    /// Connect acknowledgment.
    Connack = 2,
    /// Publish message.
    Publish = 3,
    /// Publish acknowledgment (QoS 1).
    Puback = 4,
    /// Publish received (QoS 2, part 1).
    Pubrec = 5,
    /// Publish release (QoS 2, part 2).
    Pubrel = 6,
    /// Publish complete (QoS 2, part 3).
    Pubcomp = 7,
    /// Subscribe request.
    Subscribe = 8,
    /// Subscribe acknowledgment.
    Suback = 9,
    /// Unsubscribe request.
    Unsubscribe = 10,
    /// Unsubscribe acknowledgment.
    Unsuback = 11,
    /// Ping request.
    Pingreq = 12,
    /// Ping response.
    Pingresp = 13,
    /// Client is disconnecting.
    Disconnect = 14,
}

impl PacketType {
    /// Maps the 4-bit type field, rejecting the reserved values 0 and 15.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => PacketType::Connect,
            2 => PacketType::Connack,
            3 => PacketType::Publish,
            4 => PacketType::Puback,
            5 => PacketType::Pubrec,
            6 => PacketType::Pubrel,
            7 => PacketType::Pubcomp,
            8 => PacketType::Subscribe,
            9 => PacketType::Suback,
            10 => PacketType::Unsubscribe,
            11 => PacketType::Unsuback,
            12 => PacketType::Pingreq,
            13 => PacketType::Pingresp,
            14 => PacketType::Disconnect,
            _ => return None,
        })
    }

    /// Flag nibble mandated for every type except PUBLISH.
    pub fn fixed_flags(self) -> u8 {
        match self {
            PacketType::Pubrel | PacketType::Subscribe | PacketType::Unsubscribe => 0x02,
            _ => 0x00,
        }
    }

    /// Types whose remaining length is always zero.
    pub fn is_zero_length(self) -> bool {
        matches!(
            self,
            PacketType::Pingreq | PacketType::Pingresp | PacketType::Disconnect
        )
    }

    /// Types a broker may send to a client.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            PacketType::Connack
                | PacketType::Publish
                | PacketType::Puback
                | PacketType::Pubrec
                | PacketType::Pubrel
                | PacketType::Pubcomp
                | PacketType::Suback
                | PacketType::Unsuback
                | PacketType::Pingresp
        )
    }

    /// First fixed-header byte with the mandated flags.
    pub fn header_byte(self) -> u8 {
        ((self as u8) << 4) | self.fixed_flags()
    }
}

/// A decoded fixed header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FixedHeader {
    /// Packet type.
    pub packet_type: PacketType,
    /// Low nibble of the first byte.
    pub flags: u8,
    /// Length of variable header plus payload.
    pub remaining_length: usize,
}

impl FixedHeader {
    /// Validates the first byte of a fixed header.
    pub fn parse_first_byte(byte: u8) -> Result<(PacketType, u8), DecodeError> {
        let packet_type = PacketType::from_u8(byte >> 4).ok_or(DecodeError::InvalidPacketType)?;
        let flags = byte & 0x0f;
        let valid = match packet_type {
            PacketType::Publish => (flags >> 1) & 0x03 != 0x03,
            other => flags == other.fixed_flags(),
        };
        if valid {
            Ok((packet_type, flags))
        } else {
            Err(DecodeError::InvalidFlags)
        }
    }

    /// DUP flag of a PUBLISH.
    pub fn dup(&self) -> bool {
        self.flags & 0x08 != 0
    }

    /// QoS of a PUBLISH.
    pub fn qos(&self) -> QoS {
        match (self.flags >> 1) & 0x03 {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }

    /// RETAIN flag of a PUBLISH.
    pub fn retain(&self) -> bool {
        self.flags & 0x01 != 0
    }
}

/// CONNACK return codes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConnackCode {
    /// Connection accepted.
    Accepted = 0,
    /// The server does not support the requested protocol level.
    UnacceptableProtocolVersion = 1,
    /// The client identifier is not allowed by the server.
    IdentifierRejected = 2,
    /// The MQTT service is unavailable.
    ServerUnavailable = 3,
    /// Malformed user name or password.
    BadUserNameOrPassword = 4,
    /// The client is not authorized to connect.
    NotAuthorized = 5,
}

impl TryFrom<u8> for ConnackCode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ConnackCode::Accepted,
            1 => ConnackCode::UnacceptableProtocolVersion,
            2 => ConnackCode::IdentifierRejected,
            3 => ConnackCode::ServerUnavailable,
            4 => ConnackCode::BadUserNameOrPassword,
            5 => ConnackCode::NotAuthorized,
            _ => return Err(DecodeError::InvalidReturnCode),
        })
    }
}

/// A decoded CONNACK.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Connack {
    /// The broker resumed a stored session.
    pub session_present: bool,
    /// Result of the connection attempt.
    pub return_code: ConnackCode,
}

impl Connack {
    /// Decodes the two-byte CONNACK variable header.
    pub fn decode(bytes: [u8; 2]) -> Result<Self, DecodeError> {
        if bytes[0] & !0x01 != 0 {
            return Err(DecodeError::InvalidConnackFlags);
        }
        Ok(Connack {
            session_present: bytes[0] & 0x01 != 0,
            return_code: ConnackCode::try_from(bytes[1])?,
        })
    }
}

/// Per-filter SUBACK result.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubackCode {
    /// Subscription accepted with the given maximum QoS.
    Granted(QoS),
    /// Subscription refused.
    Failure,
}

impl TryFrom<u8> for SubackCode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x80 => Ok(SubackCode::Failure),
            qos => QoS::try_from(qos)
                .map(SubackCode::Granted)
                .map_err(|_| DecodeError::InvalidReturnCode),
        }
    }
}

/// Parameters of a CONNECT request.
///
/// Every optional string is omitted from the packet when empty, and its
/// presence toggles the matching connect flag.
///
/// # Examples
///
/// ```rust
/// use libmqtt::network::application::mqtt::Connect;
///
/// let connect = Connect {
///     client_id: "sensor_node_1".into(),
///     keep_alive: 60,
///     clean_session: true,
///     ..Default::default()
/// };
/// assert!(connect.validate().is_ok());
/// ```
#[derive(Debug, Default)]
pub struct Connect<'a> {
    /// Keep-alive interval in seconds; 0 disables keep-alive.
    pub keep_alive: u16,
    /// Ask the broker to discard any previous session.
    pub clean_session: bool,
    /// Client identifier, always encoded even when empty.
    pub client_id: ByteStr<'a>,
    /// Will topic.
    pub will_topic: ByteStr<'a>,
    /// Will message.
    pub will_message: ByteStr<'a>,
    /// QoS for the will message.
    pub will_qos: QoS,
    /// Retain the will message.
    pub will_retain: bool,
    /// User name.
    pub user_name: ByteStr<'a>,
    /// Password.
    pub password: ByteStr<'a>,
    /// CONNACK received for this request, filled in by the engine.
    pub response: Option<Connack>,
}

impl Connect<'_> {
    /// Checks the request against the CONNECT rules of MQTT 3.1.1.
    pub fn validate(&self) -> Result<(), Invalid> {
        let fields = [
            &self.client_id,
            &self.will_topic,
            &self.will_message,
            &self.user_name,
            &self.password,
        ];
        if fields.iter().any(|s| s.len() > MAX_STRING_LENGTH) {
            return Err(Invalid::FieldTooLong);
        }
        if self.will_topic.is_empty() != self.will_message.is_empty() {
            return Err(Invalid::WillMismatch);
        }
        if self.will_topic.is_empty() && (self.will_retain || self.will_qos != QoS::AtMostOnce) {
            return Err(Invalid::WillWithoutTopic);
        }
        if self.client_id.is_empty() && !self.clean_session {
            return Err(Invalid::EmptyClientId);
        }
        if !self.password.is_empty() && self.user_name.is_empty() {
            return Err(Invalid::PasswordWithoutUserName);
        }
        Ok(())
    }

    /// Connect flags byte of the variable header.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= CLEAN_SESSION;
        }
        if !self.will_topic.is_empty() {
            flags |= WILL_FLAG | ((self.will_qos as u8) << 3);
            if self.will_retain {
                flags |= WILL_RETAIN;
            }
        }
        if !self.user_name.is_empty() {
            flags |= USER_NAME_FLAG;
        }
        if !self.password.is_empty() {
            flags |= PASSWORD_FLAG;
        }
        flags
    }

    /// Remaining length of the encoded packet.
    pub fn remaining_length(&self) -> usize {
        let optional = [&self.will_topic, &self.will_message, &self.user_name, &self.password]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| 2 + s.len())
            .sum::<usize>();
        CONNECT_HEADER_LEN + 2 + self.client_id.len() + optional
    }
}

/// An outgoing PUBLISH request.
///
/// # Examples
///
/// ```rust
/// use libmqtt::network::application::mqtt::{Publish, QoS};
///
/// let publish = Publish::new("sensors/temperature", b"23.5", QoS::AtLeastOnce).retain(true);
/// assert!(publish.validate().is_ok());
/// assert_eq!(publish.packet_id(), 0);
/// ```
#[derive(Debug)]
pub struct Publish<'a> {
    /// Topic name.
    pub topic: ByteStr<'a>,
    /// Application message, sent without a length prefix.
    pub payload: ByteStr<'a>,
    /// Delivery guarantee.
    pub qos: QoS,
    /// Ask the broker to retain the message.
    pub retain: bool,
    pub(crate) packet_id: u16,
    pub(crate) encode_count: u8,
}

impl<'a> Publish<'a> {
    /// Creates a publish request.
    pub fn new(topic: impl Into<ByteStr<'a>>, payload: impl Into<ByteStr<'a>>, qos: QoS) -> Self {
        Publish {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
            packet_id: 0,
            encode_count: 0,
        }
    }

    /// Sets the retain flag.
    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Packet identifier assigned when queued, 0 for QoS 0.
    pub fn packet_id(&self) -> u16 {
        self.packet_id
    }

    /// How many times the packet has been put on the wire.
    pub fn encode_count(&self) -> u8 {
        self.encode_count
    }

    /// Checks field lengths and the total packet size.
    pub fn validate(&self) -> Result<(), Invalid> {
        if self.topic.len() > MAX_STRING_LENGTH {
            return Err(Invalid::FieldTooLong);
        }
        if self.remaining_length() > MAX_REMAINING_LENGTH {
            return Err(Invalid::PacketTooLarge);
        }
        Ok(())
    }

    /// Remaining length of the encoded packet.
    pub fn remaining_length(&self) -> usize {
        let id = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        2 + self.topic.len() + id + self.payload.len()
    }

    /// First fixed-header byte; DUP is set on a QoS 1 or 2 packet once it has
    /// been sent. QoS 0 never carries DUP.
    pub(crate) fn header_byte(&self) -> u8 {
        let mut byte = (PacketType::Publish as u8) << 4 | (self.qos as u8) << 1;
        if self.qos != QoS::AtMostOnce && self.encode_count > 0 {
            byte |= 0x08;
        }
        if self.retain {
            byte |= 0x01;
        }
        byte
    }
}

/// One topic filter of a SUBSCRIBE or UNSUBSCRIBE.
#[derive(Debug, Default)]
pub struct Subscription<'a> {
    /// Topic filter.
    pub topic: ByteStr<'a>,
    /// Requested maximum QoS (SUBSCRIBE only).
    pub qos: QoS,
    /// Broker's answer, filled in from the SUBACK.
    pub return_code: Option<SubackCode>,
}

impl<'a> Subscription<'a> {
    /// Creates a subscription to `topic`.
    pub fn new(topic: impl Into<ByteStr<'a>>, qos: QoS) -> Self {
        Subscription {
            topic: topic.into(),
            qos,
            return_code: None,
        }
    }
}

/// A SUBSCRIBE or UNSUBSCRIBE request over a caller-owned list of filters.
#[derive(Debug)]
pub struct Subscribe<'a> {
    /// Topic filters, in the order they are sent.
    pub subscriptions: &'a mut [Subscription<'a>],
    pub(crate) packet_id: u16,
}

/// UNSUBSCRIBE requests share the SUBSCRIBE layout; requested QoS is ignored.
pub type Unsubscribe<'a> = Subscribe<'a>;

impl<'a> Subscribe<'a> {
    /// Wraps a list of filters.
    pub fn new(subscriptions: &'a mut [Subscription<'a>]) -> Self {
        Subscribe {
            subscriptions,
            packet_id: 0,
        }
    }

    /// Packet identifier assigned when queued.
    pub fn packet_id(&self) -> u16 {
        self.packet_id
    }

    /// Checks the filter list; `unsubscribe` selects the UNSUBSCRIBE layout.
    pub fn validate(&self, unsubscribe: bool) -> Result<(), Invalid> {
        if self.subscriptions.is_empty() {
            return Err(Invalid::EmptySubscription);
        }
        if self
            .subscriptions
            .iter()
            .any(|s| s.topic.len() > MAX_STRING_LENGTH)
        {
            return Err(Invalid::FieldTooLong);
        }
        if self.remaining_length(unsubscribe) > MAX_REMAINING_LENGTH {
            return Err(Invalid::PacketTooLarge);
        }
        Ok(())
    }

    /// Remaining length of the encoded packet.
    pub fn remaining_length(&self, unsubscribe: bool) -> usize {
        let qos = if unsubscribe { 0 } else { 1 };
        2 + self
            .subscriptions
            .iter()
            .map(|s| 2 + s.topic.len() + qos)
            .sum::<usize>()
    }
}

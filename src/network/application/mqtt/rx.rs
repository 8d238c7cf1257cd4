//! Inbound buffer: parses broker bytes and settles the matching requests.
//!
//! Bytes can arrive split at any point. The parser keeps the partially decoded
//! fixed header, the position inside the current packet and whatever fields it
//! needs to remember (packet identifier, inbound topic) between calls.

use heapless::Vec;

use super::codec::FixedHeaderDecoder;
use super::error::{DecodeError, Error};
use super::handler::{self, Handler, Message};
use super::packet::{Connack, FixedHeader, PacketType, QoS, SubackCode};
use super::store::{Entry, Kind, MessageStore, Value};
use super::string::StreamError;

/// Longest inbound topic name kept for the [`Handler`].
pub const MAX_TOPIC_LEN: usize = 256;
/// Inbound QoS 2 messages that can await PUBREL at the same time.
pub const MAX_RECEIVED: usize = 16;
/// Replies to the broker held back while the store is full.
pub const MAX_HELD_REPLIES: usize = 16;

/// Why [`RxBuffer::decode`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// All input was consumed; no session-level event happened.
    Pending,
    /// A CONNACK arrived; decoding stopped right after it.
    Connack(Connack),
    /// A PINGRESP arrived; decoding stopped right after it.
    Pingresp,
    /// The message handler cannot take payload bytes right now.
    WouldBlock,
    /// The input is malformed or illegal; the buffer stays failed until reset.
    Failed(Error),
}

#[derive(Debug, Default)]
struct Inbound {
    topic: Vec<u8, MAX_TOPIC_LEN>,
    topic_len: usize,
    packet_id: u16,
    duplicate: bool,
}

/// Resumable decoder for packets sent by the broker.
#[derive(Debug)]
pub struct RxBuffer {
    header: FixedHeaderDecoder,
    current: Option<FixedHeader>,
    pos: usize,
    scratch: [u8; 2],
    inbound: Inbound,
    received: Vec<u16, MAX_RECEIVED>,
    // PUBACK, PUBREC or PUBCOMP owed to the broker, oldest first
    held: Vec<(Kind, u16), MAX_HELD_REPLIES>,
    awaiting_connack: bool,
    failed: Option<Error>,
}

impl Default for RxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RxBuffer {
    /// Creates an idle parser.
    pub const fn new() -> Self {
        RxBuffer {
            header: FixedHeaderDecoder::new(),
            current: None,
            pos: 0,
            scratch: [0; 2],
            inbound: Inbound {
                topic: Vec::new(),
                topic_len: 0,
                packet_id: 0,
                duplicate: false,
            },
            received: Vec::new(),
            held: Vec::new(),
            awaiting_connack: false,
            failed: None,
        }
    }

    /// Drops any partial packet, any held reply and the failed state.
    ///
    /// Identifiers of inbound QoS 2 messages awaiting PUBREL survive, since
    /// the broker resends the PUBREL in a resumed session.
    pub fn reset(&mut self) {
        self.header.reset();
        self.current = None;
        self.pos = 0;
        self.inbound.topic.clear();
        self.held.clear();
        self.awaiting_connack = false;
        self.failed = None;
    }

    /// Forgets the inbound QoS 2 identifiers; used for clean sessions.
    pub fn forget_received(&mut self) {
        self.received.clear();
    }

    /// The next packet must be a CONNACK.
    pub fn expect_connack(&mut self) {
        self.awaiting_connack = true;
    }

    /// Replies waiting for a free slot in the store.
    pub fn held_replies(&self) -> usize {
        self.held.len()
    }

    /// Moves held replies into `store`, oldest first, while it has room.
    pub fn release_replies<const N: usize>(&mut self, store: &mut MessageStore<'_, N>) {
        while let Some(&(kind, id)) = self.held.first() {
            if store.append_with_id(kind, id, Value::None).is_err() {
                break;
            }
            self.held.remove(0);
        }
    }

    /// Queues a reply behind any held ones. Fails only when the store and the
    /// held replies are both full.
    fn reply<const N: usize>(&mut self, kind: Kind, id: u16, store: &mut MessageStore<'_, N>) -> Result<(), Error> {
        self.release_replies(store);
        if self.held.is_empty() && store.append_with_id(kind, id, Value::None).is_ok() {
            return Ok(());
        }
        debug!("store full, holding {:?} {}", kind, id);
        self.held.push((kind, id)).map_err(|_| Error::StoreFull)
    }

    /// Whether a packet has been partly parsed.
    pub fn in_progress(&self) -> bool {
        self.current.is_some() || self.pos > 0
    }

    /// Parses `input`, settling acknowledged requests in `store` and feeding
    /// inbound messages to `handler`. Returns how many bytes were consumed.
    ///
    /// Replies owed to the broker (PUBACK, PUBREC, PUBREL, PUBCOMP) are queued
    /// in `store`. PUBACK, PUBREC and PUBCOMP wait in the buffer while the
    /// store is full.
    pub fn decode<'a, H: Handler<'a>, const N: usize>(
        &mut self,
        input: &[u8],
        store: &mut MessageStore<'a, N>,
        handler: &mut H,
    ) -> (usize, Decoded) {
        if let Some(error) = self.failed {
            return (0, Decoded::Failed(error));
        }
        self.release_replies(store);
        let mut used = 0;
        while used < input.len() {
            let step = match self.current {
                None => self.header_byte(input[used]).map(|event| (1, event)),
                Some(header) => self.body(header, &input[used..], store, handler),
            };
            match step {
                Ok((n, Decoded::Pending)) => used += n,
                Ok((n, event)) => return (used + n, event),
                Err(error) => {
                    warn!("decode failed: {:?}", error);
                    self.failed = Some(error);
                    return (used, Decoded::Failed(error));
                }
            }
        }
        (used, Decoded::Pending)
    }

    fn header_byte(&mut self, byte: u8) -> Result<Decoded, Error> {
        let Some(header) = self.header.push(byte)? else {
            return Ok(Decoded::Pending);
        };
        self.check(&header)?;
        trace!("received {:?}", header.packet_type);
        self.pos = 0;
        self.inbound.topic.clear();
        self.inbound.topic_len = 0;
        self.inbound.packet_id = 0;
        self.inbound.duplicate = false;
        if header.remaining_length == 0 {
            // only PINGRESP passes the checks with an empty body
            return Ok(Decoded::Pingresp);
        }
        self.current = Some(header);
        Ok(Decoded::Pending)
    }

    fn check(&mut self, header: &FixedHeader) -> Result<(), DecodeError> {
        let packet_type = header.packet_type;
        if !packet_type.is_response() {
            return Err(DecodeError::UnexpectedPacket);
        }
        if self.awaiting_connack != (packet_type == PacketType::Connack) {
            return Err(DecodeError::UnexpectedPacket);
        }
        let len = header.remaining_length;
        if packet_type.is_zero_length() != (len == 0) {
            return Err(DecodeError::InvalidLength);
        }
        let valid = match packet_type {
            PacketType::Pingresp => true,
            PacketType::Suback => len >= 3,
            PacketType::Publish if header.qos() == QoS::AtMostOnce => len >= 2,
            PacketType::Publish => len >= 4,
            _ => len == 2,
        };
        if valid {
            Ok(())
        } else {
            Err(DecodeError::InvalidLength)
        }
    }

    fn body<'a, H: Handler<'a>, const N: usize>(
        &mut self,
        header: FixedHeader,
        input: &[u8],
        store: &mut MessageStore<'a, N>,
        handler: &mut H,
    ) -> Result<(usize, Decoded), Error> {
        if header.packet_type == PacketType::Publish {
            return self.publish(header, input, store, handler);
        }
        let byte = input[0];
        if self.pos < 2 {
            self.scratch[self.pos] = byte;
        } else {
            // SUBACK return codes
            let code = SubackCode::try_from(byte)?;
            let id = self.packet_id();
            let index = self.pos - 2;
            if let Some(Value::Subscribe(subscribe)) =
                store.find_marked_mut(Kind::Subscribe, id).map(|e| &mut e.value)
            {
                if let Some(subscription) = subscribe.subscriptions.get_mut(index) {
                    subscription.return_code = Some(code);
                }
            }
        }
        self.pos += 1;
        if header.packet_type == PacketType::Suback && self.pos == 2 {
            let id = self.packet_id();
            let entry = store
                .find_marked_mut(Kind::Subscribe, id)
                .ok_or(DecodeError::UnknownPacketId)?;
            let filters = match &entry.value {
                Value::Subscribe(subscribe) => subscribe.subscriptions.len(),
                _ => 0,
            };
            if filters != header.remaining_length - 2 {
                return Err(DecodeError::InvalidLength.into());
            }
        }
        if self.pos < header.remaining_length {
            return Ok((1, Decoded::Pending));
        }
        self.current = None;
        self.pos = 0;
        self.settle(header.packet_type, store, handler)
            .map(|event| (1, event))
    }

    fn packet_id(&self) -> u16 {
        u16::from_be_bytes(self.scratch)
    }

    /// Completes a non-PUBLISH packet.
    fn settle<'a, H: Handler<'a>, const N: usize>(
        &mut self,
        packet_type: PacketType,
        store: &mut MessageStore<'a, N>,
        handler: &mut H,
    ) -> Result<Decoded, Error> {
        let id = self.packet_id();
        let acknowledged = match packet_type {
            PacketType::Connack => {
                self.awaiting_connack = false;
                return Ok(Decoded::Connack(Connack::decode(self.scratch)?));
            }
            PacketType::Puback => Kind::Publish1,
            PacketType::Pubrec => Kind::Publish2,
            PacketType::Pubcomp => Kind::Pubrel,
            PacketType::Suback => Kind::Subscribe,
            PacketType::Unsuback => Kind::Unsubscribe,
            PacketType::Pubrel => {
                if let Some(index) = self.received.iter().position(|&r| r == id) {
                    self.received.swap_remove(index);
                }
                self.reply(Kind::Pubcomp, id, store)?;
                return Ok(Decoded::Pending);
            }
            _ => return Err(DecodeError::UnexpectedPacket.into()),
        };
        let value = store
            .pop_marked_by(acknowledged, id)
            .ok_or(DecodeError::UnknownPacketId)?;
        if acknowledged == Kind::Publish2 {
            // the popped slot is free again
            if let Err(value) = store.append_with_id(Kind::Pubrel, id, value) {
                finish(handler, Kind::Publish2, id, value, false);
                return Err(Error::StoreFull);
            }
        } else {
            finish(handler, acknowledged, id, value, true);
        }
        Ok(Decoded::Pending)
    }

    fn publish<'a, H: Handler<'a>, const N: usize>(
        &mut self,
        header: FixedHeader,
        input: &[u8],
        store: &mut MessageStore<'a, N>,
        handler: &mut H,
    ) -> Result<(usize, Decoded), Error> {
        let len = header.remaining_length;
        let id_len = if header.qos() == QoS::AtMostOnce { 0 } else { 2 };
        let topic_end = 2 + self.inbound.topic_len;
        let used;

        if self.pos < 2 {
            self.scratch[self.pos] = input[0];
            self.pos += 1;
            used = 1;
            if self.pos == 2 {
                let topic_len = self.packet_id() as usize;
                if 2 + topic_len + id_len > len {
                    return Err(DecodeError::InvalidLength.into());
                }
                if topic_len > MAX_TOPIC_LEN {
                    return Err(DecodeError::TopicTooLong.into());
                }
                self.inbound.topic_len = topic_len;
            }
        } else if self.pos < topic_end {
            let n = (topic_end - self.pos).min(input.len());
            self.inbound
                .topic
                .extend_from_slice(&input[..n])
                .map_err(|_| DecodeError::TopicTooLong)?;
            self.pos += n;
            used = n;
        } else if self.pos < topic_end + id_len {
            self.scratch[self.pos - topic_end] = input[0];
            self.pos += 1;
            used = 1;
            if self.pos == topic_end + id_len {
                let id = self.packet_id();
                self.inbound.packet_id = id;
                self.inbound.duplicate =
                    header.qos() == QoS::ExactlyOnce && self.received.contains(&id);
            }
        } else {
            let payload_start = topic_end + id_len;
            let n = (len - self.pos).min(input.len());
            let consumed = if self.inbound.duplicate {
                n
            } else {
                let message = self.message(&header);
                match handler.on_message_data(&message, self.pos - payload_start, &input[..n]) {
                    Ok(k) => k.min(n),
                    Err(StreamError::WouldBlock) => 0,
                    Err(StreamError::Failed(code)) => return Err(Error::Sink(code)),
                }
            };
            self.pos += consumed;
            if consumed == 0 {
                return Ok((0, Decoded::WouldBlock));
            }
            used = consumed;
        }

        if self.pos == len {
            self.current = None;
            self.pos = 0;
            self.deliver(&header, store, handler)?;
        }
        Ok((used, Decoded::Pending))
    }

    fn message(&self, header: &FixedHeader) -> Message<'_> {
        let id_len = if header.qos() == QoS::AtMostOnce { 0 } else { 2 };
        Message {
            topic: &self.inbound.topic,
            qos: header.qos(),
            retain: header.retain(),
            dup: header.dup(),
            packet_id: self.inbound.packet_id,
            payload_len: header.remaining_length - 2 - self.inbound.topic_len - id_len,
        }
    }

    fn deliver<'a, H: Handler<'a>, const N: usize>(
        &mut self,
        header: &FixedHeader,
        store: &mut MessageStore<'a, N>,
        handler: &mut H,
    ) -> Result<(), Error> {
        let qos = header.qos();
        let id = self.inbound.packet_id;
        let duplicate = self.inbound.duplicate;
        if qos != QoS::AtMostOnce {
            self.release_replies(store);
            if self.held.is_full() {
                return Err(Error::StoreFull);
            }
        }
        if qos == QoS::ExactlyOnce && !duplicate && self.received.is_full() {
            return Err(DecodeError::TooManyInflight.into());
        }
        if duplicate {
            debug!("duplicate QoS 2 message {}", id);
        } else {
            handler.on_message(&self.message(header));
        }
        let reply = match qos {
            QoS::AtMostOnce => return Ok(()),
            QoS::AtLeastOnce => Kind::Puback,
            QoS::ExactlyOnce => {
                if !duplicate {
                    self.received
                        .push(id)
                        .map_err(|_| DecodeError::TooManyInflight)?;
                }
                Kind::Pubrec
            }
        };
        self.reply(reply, id, store)
    }
}

fn finish<'a, H: Handler<'a>>(handler: &mut H, kind: Kind, packet_id: u16, value: Value<'a>, succeeded: bool) {
    let entry = Entry {
        kind,
        packet_id,
        value,
        sent: true,
    };
    handler::complete(handler, entry, succeeded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::application::mqtt::packet::{ConnackCode, Publish, Subscribe, Subscription};

    #[derive(Default)]
    struct Recorder {
        published: Vec<(u16, bool), 8>,
        subscribed: Vec<(u16, bool), 8>,
        unsubscribed: Vec<(u16, bool), 8>,
        messages: Vec<(Vec<u8, 32>, QoS, u16), 8>,
        payload: Vec<u8, 64>,
        block: bool,
    }

    impl<'a> Handler<'a> for Recorder {
        fn on_publish(&mut self, publish: Publish<'a>, succeeded: bool) {
            self.published.push((publish.packet_id(), succeeded)).unwrap();
        }

        fn on_subscribe(&mut self, subscribe: Subscribe<'a>, succeeded: bool) {
            self.subscribed.push((subscribe.packet_id(), succeeded)).unwrap();
        }

        fn on_unsubscribe(&mut self, unsubscribe: Subscribe<'a>, succeeded: bool) {
            self.unsubscribed.push((unsubscribe.packet_id(), succeeded)).unwrap();
        }

        fn on_message_data(
            &mut self,
            message: &Message<'_>,
            offset: usize,
            data: &[u8],
        ) -> Result<usize, StreamError> {
            if self.block {
                return Err(StreamError::WouldBlock);
            }
            assert!(offset + data.len() <= message.payload_len);
            self.payload.extend_from_slice(data).unwrap();
            Ok(data.len())
        }

        fn on_message(&mut self, message: &Message<'_>) {
            let topic = Vec::from_slice(message.topic).unwrap();
            self.messages.push((topic, message.qos, message.packet_id)).unwrap();
        }
    }

    fn sent_publish<'a, const N: usize>(store: &mut MessageStore<'a, N>, qos: QoS) -> u16 {
        let kind = if qos == QoS::ExactlyOnce { Kind::Publish2 } else { Kind::Publish1 };
        let id = store.append(kind, Value::Publish(Publish::new("t", "p", qos))).unwrap();
        store.mark_current();
        id
    }

    #[test]
    fn test_connack_stops_decoding() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        rx.expect_connack();
        let input = [0x20, 0x02, 0x01, 0x00, 0xd0, 0x00];
        let (used, decoded) = rx.decode(&input, &mut store, &mut ());
        assert_eq!(used, 4);
        assert_eq!(
            decoded,
            Decoded::Connack(Connack {
                session_present: true,
                return_code: ConnackCode::Accepted
            })
        );
        assert_eq!(rx.decode(&input[4..], &mut store, &mut ()), (2, Decoded::Pingresp));
    }

    #[test]
    fn test_connack_only_when_expected() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let (_, decoded) = rx.decode(&[0x20, 0x02, 0x00, 0x00], &mut store, &mut ());
        assert_eq!(decoded, Decoded::Failed(Error::Decode(DecodeError::UnexpectedPacket)));
        // sticky until reset
        assert_eq!(rx.decode(&[0xd0, 0x00], &mut store, &mut ()).0, 0);

        rx.reset();
        rx.expect_connack();
        let (_, decoded) = rx.decode(&[0xd0, 0x00], &mut store, &mut ());
        assert_eq!(decoded, Decoded::Failed(Error::Decode(DecodeError::UnexpectedPacket)));
    }

    #[test]
    fn test_rejects_bad_headers() {
        let cases: &[(&[u8], DecodeError)] = &[
            (&[0x10, 0x00], DecodeError::UnexpectedPacket),
            (&[0xc0, 0x00], DecodeError::UnexpectedPacket),
            (&[0x40, 0x03], DecodeError::InvalidLength),
            (&[0x90, 0x02], DecodeError::InvalidLength),
            (&[0xd0, 0x01], DecodeError::InvalidLength),
            (&[0x32, 0x03], DecodeError::InvalidLength),
            (&[0x42, 0x02], DecodeError::InvalidFlags),
            (&[0x40, 0x80, 0x00], DecodeError::InvalidRemainingLength),
        ];
        for &(input, expected) in cases {
            let mut rx = RxBuffer::new();
            let mut store: MessageStore<'_, 4> = MessageStore::new();
            let (_, decoded) = rx.decode(input, &mut store, &mut ());
            assert_eq!(decoded, Decoded::Failed(Error::Decode(expected)), "{:02x?}", input);
        }
    }

    #[test]
    fn test_puback_settles_publish() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let mut handler = Recorder::default();
        let id = sent_publish(&mut store, QoS::AtLeastOnce);
        let input = [0x40, 0x02, 0x00, id as u8];
        for byte in input {
            assert_eq!(rx.decode(&[byte], &mut store, &mut handler), (1, Decoded::Pending));
        }
        assert_eq!(&handler.published[..], &[(id, true)]);
        assert_eq!(store.count(), 0);

        let (_, decoded) = rx.decode(&input, &mut store, &mut handler);
        assert_eq!(decoded, Decoded::Failed(Error::Decode(DecodeError::UnknownPacketId)));
    }

    #[test]
    fn test_qos2_outbound_flow() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let mut handler = Recorder::default();
        let id = sent_publish(&mut store, QoS::ExactlyOnce);

        rx.decode(&[0x50, 0x02, 0x00, id as u8], &mut store, &mut handler);
        assert!(handler.published.is_empty());
        let entry = store.peek_current().unwrap();
        assert_eq!((entry.kind, entry.packet_id), (Kind::Pubrel, id));

        // PUBCOMP before the PUBREL was written matches nothing
        let (_, decoded) = rx.decode(&[0x70, 0x02, 0x00, id as u8], &mut store, &mut handler);
        assert_eq!(decoded, Decoded::Failed(Error::Decode(DecodeError::UnknownPacketId)));

        rx.reset();
        store.mark_current();
        rx.decode(&[0x70, 0x02, 0x00, id as u8], &mut store, &mut handler);
        assert_eq!(&handler.published[..], &[(id, true)]);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_suback_fills_return_codes() {
        let mut subs = [
            Subscription::new("a", QoS::ExactlyOnce),
            Subscription::new("b", QoS::AtLeastOnce),
        ];
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let mut handler = Recorder::default();
        let id = store
            .append(Kind::Subscribe, Value::Subscribe(Subscribe::new(&mut subs)))
            .unwrap();
        store.mark_current();

        let (used, decoded) = rx.decode(&[0x90, 0x04, 0x00, id as u8, 0x01, 0x80], &mut store, &mut handler);
        assert_eq!((used, decoded), (6, Decoded::Pending));
        assert_eq!(&handler.subscribed[..], &[(id, true)]);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_suback_count_mismatch() {
        let mut subs = [Subscription::new("a", QoS::AtMostOnce)];
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let id = store
            .append(Kind::Subscribe, Value::Subscribe(Subscribe::new(&mut subs)))
            .unwrap();
        store.mark_current();
        let (_, decoded) = rx.decode(&[0x90, 0x04, 0x00, id as u8, 0x00, 0x00], &mut store, &mut ());
        assert_eq!(decoded, Decoded::Failed(Error::Decode(DecodeError::InvalidLength)));
    }

    #[test]
    fn test_unsuback() {
        let mut subs = [Subscription::new("a", QoS::AtMostOnce)];
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let mut handler = Recorder::default();
        let id = store
            .append(Kind::Unsubscribe, Value::Subscribe(Subscribe::new(&mut subs)))
            .unwrap();
        store.mark_current();
        rx.decode(&[0xb0, 0x02, 0x00, id as u8], &mut store, &mut handler);
        assert_eq!(&handler.unsubscribed[..], &[(id, true)]);
    }

    #[test]
    fn test_inbound_publish_qos1_split() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let mut handler = Recorder::default();
        let input = b"\x32\x0c\x00\x03a/b\x12\x34hello";
        for chunk in input.chunks(3) {
            assert_eq!(rx.decode(chunk, &mut store, &mut handler), (chunk.len(), Decoded::Pending));
        }
        assert_eq!(&handler.payload[..], b"hello");
        assert_eq!(handler.messages.len(), 1);
        assert_eq!(&handler.messages[0].0[..], b"a/b");
        assert_eq!(handler.messages[0].2, 0x1234);
        let entry = store.peek_current().unwrap();
        assert_eq!((entry.kind, entry.packet_id), (Kind::Puback, 0x1234));
    }

    #[test]
    fn test_inbound_publish_empty_payload() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let mut handler = Recorder::default();
        rx.decode(b"\x30\x03\x00\x01t", &mut store, &mut handler);
        assert_eq!(handler.messages.len(), 1);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_inbound_qos2_duplicate_and_release() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 8> = MessageStore::new();
        let mut handler = Recorder::default();
        let input = b"\x34\x06\x00\x01t\x00\x07x";
        rx.decode(input, &mut store, &mut handler);
        // redelivery before PUBREL is acknowledged again but not delivered
        rx.decode(b"\x3c\x06\x00\x01t\x00\x07x", &mut store, &mut handler);
        assert_eq!(handler.messages.len(), 1);
        assert_eq!(&handler.payload[..], b"x");
        assert_eq!(store.count(), 2);

        rx.decode(b"\x62\x02\x00\x07", &mut store, &mut handler);
        assert_eq!(store.count(), 3);
        rx.decode(input, &mut store, &mut handler);
        assert_eq!(handler.messages.len(), 2);
    }

    #[test]
    fn test_replies_held_while_store_full() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 2> = MessageStore::new();
        let mut handler = Recorder::default();
        let first = sent_publish(&mut store, QoS::AtLeastOnce);
        sent_publish(&mut store, QoS::AtLeastOnce);

        let input = b"\x32\x06\x00\x01m\x00\x09x\x34\x06\x00\x01m\x00\x0ay";
        assert_eq!(rx.decode(input, &mut store, &mut handler), (input.len(), Decoded::Pending));
        assert_eq!(handler.messages.len(), 2);
        assert_eq!(rx.held_replies(), 2);
        assert_eq!(store.count(), 2);

        rx.decode(&[0x40, 0x02, 0x00, first as u8], &mut store, &mut handler);
        assert_eq!(&handler.published[..], &[(first, true)]);
        rx.release_replies(&mut store);
        assert_eq!(rx.held_replies(), 1);
        let entry = store.peek_current().unwrap();
        assert_eq!((entry.kind, entry.packet_id), (Kind::Puback, 0x09));
        store.drop_current();
        rx.release_replies(&mut store);
        let entry = store.peek_current().unwrap();
        assert_eq!((entry.kind, entry.packet_id), (Kind::Pubrec, 0x0a));
        assert_eq!(rx.held_replies(), 0);
    }

    #[test]
    fn test_held_replies_exhausted() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 1> = MessageStore::new();
        sent_publish(&mut store, QoS::AtLeastOnce);
        let input = b"\x32\x06\x00\x01m\x00\x09x";
        for _ in 0..MAX_HELD_REPLIES {
            assert_eq!(rx.decode(input, &mut store, &mut ()), (input.len(), Decoded::Pending));
        }
        let (_, decoded) = rx.decode(input, &mut store, &mut ());
        assert_eq!(decoded, Decoded::Failed(Error::StoreFull));
        assert_eq!(rx.held_replies(), MAX_HELD_REPLIES);
    }

    #[test]
    fn test_sink_would_block_resumes() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let mut handler = Recorder {
            block: true,
            ..Default::default()
        };
        let input = b"\x30\x05\x00\x01tab";
        let (used, decoded) = rx.decode(input, &mut store, &mut handler);
        assert_eq!((used, decoded), (5, Decoded::WouldBlock));
        handler.block = false;
        assert_eq!(rx.decode(&input[used..], &mut store, &mut handler), (2, Decoded::Pending));
        assert_eq!(&handler.payload[..], b"ab");
    }

    #[test]
    fn test_topic_too_long() {
        let mut rx = RxBuffer::new();
        let mut store: MessageStore<'_, 4> = MessageStore::new();
        let (_, decoded) = rx.decode(&[0x30, 0x84, 0x02, 0x01, 0x01], &mut store, &mut ());
        assert_eq!(decoded, Decoded::Failed(Error::Decode(DecodeError::TopicTooLong)));
    }
}

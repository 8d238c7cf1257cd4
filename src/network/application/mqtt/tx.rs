//! Outbound buffer: turns queued store entries into bytes.
//!
//! Each [`Kind`] maps to a fixed recipe of encoding steps. The buffer remembers
//! the step it is in and how many bytes of that step were already produced, so
//! an output slice of any size (even one byte) can be filled and the packet
//! resumed on the next call.

use super::codec::{self, Encode, Scratch};
use super::error::Error;
use super::handler::{self, Handler};
use super::packet::PacketType;
use super::store::{Entry, Kind, MessageStore, Value};

/// One step of a packet recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Header,
    ConnectHeader,
    ClientId,
    WillTopic,
    WillMessage,
    UserName,
    Password,
    Topic,
    PacketId,
    Payload,
    Filter(usize),
    FilterQos(usize),
}

const CONNECT: &[Step] = &[
    Step::Header,
    Step::ConnectHeader,
    Step::ClientId,
    Step::WillTopic,
    Step::WillMessage,
    Step::UserName,
    Step::Password,
];
const PUBLISH_0: &[Step] = &[Step::Header, Step::Topic, Step::Payload];
const PUBLISH_N: &[Step] = &[Step::Header, Step::Topic, Step::PacketId, Step::Payload];
const ACK: &[Step] = &[Step::Header, Step::PacketId];
const BARE: &[Step] = &[Step::Header];

/// Step `pos` of the recipe for `entry`, or `None` once the packet is done.
fn recipe(entry: &Entry<'_>, pos: usize) -> Option<Step> {
    let table = match entry.kind {
        Kind::Connect => CONNECT,
        Kind::Publish0 => PUBLISH_0,
        Kind::Publish1 | Kind::Publish2 => PUBLISH_N,
        Kind::Puback | Kind::Pubrec | Kind::Pubrel | Kind::Pubcomp => ACK,
        Kind::Pingreq | Kind::Disconnect => BARE,
        Kind::Subscribe | Kind::Unsubscribe => {
            let filters = match &entry.value {
                Value::Subscribe(subscribe) => subscribe.subscriptions.len(),
                _ => 0,
            };
            return match pos {
                0 => Some(Step::Header),
                1 => Some(Step::PacketId),
                n if entry.kind == Kind::Unsubscribe => {
                    (n - 2 < filters).then_some(Step::Filter(n - 2))
                }
                n => {
                    let index = (n - 2) / 2;
                    (index < filters).then(|| {
                        if (n - 2) % 2 == 0 {
                            Step::Filter(index)
                        } else {
                            Step::FilterQos(index)
                        }
                    })
                }
            };
        }
    };
    table.get(pos).copied()
}

/// Status of an [`TxBuffer::encode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// The buffer is full, the store is drained, or the output is closed.
    Ok,
    /// A streamed field has no data yet.
    WouldBlock,
    /// Encoding failed; the buffer is now closed.
    Failed(Error),
}

/// Result of an [`TxBuffer::encode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    /// Bytes written into the output slice, valid even on failure.
    pub written: usize,
    /// Why encoding stopped.
    pub status: TxStatus,
    /// Packets completed during the call.
    pub packets: usize,
    /// A DISCONNECT was completed; the buffer is now closed.
    pub disconnect: bool,
}

/// Resumable encoder over a [`MessageStore`].
#[derive(Debug)]
pub struct TxBuffer {
    pos: usize,
    offset: usize,
    scratch: Scratch,
    // the fixed or CONNECT header of the current packet is in `scratch`
    header_built: bool,
    closed: bool,
    error: Option<Error>,
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TxBuffer {
    /// Creates an open buffer.
    pub const fn new() -> Self {
        TxBuffer {
            pos: 0,
            offset: 0,
            scratch: Scratch::new(),
            header_built: false,
            closed: false,
            error: None,
        }
    }

    /// Reopens the buffer and forgets any partially encoded packet.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Stops producing bytes; later calls write nothing.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the buffer is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the current packet has been partly written.
    pub fn in_progress(&self) -> bool {
        self.pos > 0 || self.offset > 0
    }

    /// The error that closed the buffer, if any.
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    /// Encodes pending entries of `store` into `out`.
    ///
    /// Fire-and-forget entries are removed as soon as their last byte is
    /// produced; a QoS 0 PUBLISH is reported to `handler` as succeeded at that
    /// point. Entries expecting a response are marked as sent and stay in the
    /// store.
    pub fn encode<'a, H: Handler<'a>, const N: usize>(
        &mut self,
        store: &mut MessageStore<'a, N>,
        handler: &mut H,
        out: &mut [u8],
    ) -> Encoded {
        let mut result = Encoded {
            written: 0,
            status: TxStatus::Ok,
            packets: 0,
            disconnect: false,
        };
        if let Some(error) = self.error {
            result.status = TxStatus::Failed(error);
            return result;
        }

        while !self.closed {
            let Some(entry) = store.peek_current() else {
                break;
            };
            let Some(step) = recipe(entry, self.pos) else {
                self.pos = 0;
                self.offset = 0;
                self.header_built = false;
                self.finish(store, handler, &mut result);
                continue;
            };
            match self.encode_step(step, entry, &mut out[result.written..]) {
                Encode::Finished(n) => {
                    result.written += n;
                    self.pos += 1;
                    self.offset = 0;
                }
                Encode::Partial(n) => {
                    result.written += n;
                    self.offset += n;
                    break;
                }
                Encode::WouldBlock(n) => {
                    result.written += n;
                    self.offset += n;
                    result.status = TxStatus::WouldBlock;
                    break;
                }
                Encode::Failed(error) => {
                    warn!("encode failed: {:?}", error);
                    self.error = Some(error);
                    self.closed = true;
                    result.status = TxStatus::Failed(error);
                    break;
                }
            }
        }
        result
    }

    fn finish<'a, H: Handler<'a>, const N: usize>(
        &mut self,
        store: &mut MessageStore<'a, N>,
        handler: &mut H,
        result: &mut Encoded,
    ) {
        result.packets += 1;
        let Some(kind) = store.peek_current().map(|e| e.kind) else {
            return;
        };
        trace!("sent {:?}", kind);
        if kind.awaits_response() {
            store.mark_current();
            return;
        }
        let Some(entry) = store.drop_current() else {
            return;
        };
        match kind {
            Kind::Publish0 => handler::complete(handler, entry, true),
            Kind::Disconnect => {
                self.closed = true;
                result.disconnect = true;
            }
            _ => {}
        }
    }

    fn encode_step(&mut self, step: Step, entry: &mut Entry<'_>, out: &mut [u8]) -> Encode {
        let offset = self.offset;
        match (step, &mut entry.value) {
            (Step::Header, value) => {
                if !self.header_built {
                    if let Err(error) = self.build_header(entry.kind, value) {
                        return Encode::Failed(error);
                    }
                    self.header_built = true;
                }
                codec::encode_slice(&self.scratch, offset, out)
            }
            (Step::ConnectHeader, Value::Connect(connect)) => {
                codec::build_connect_header(&mut self.scratch, connect);
                codec::encode_slice(&self.scratch, offset, out)
            }
            (Step::ClientId, Value::Connect(c)) => codec::encode_string(&mut c.client_id, false, offset, out),
            (Step::WillTopic, Value::Connect(c)) => codec::encode_string(&mut c.will_topic, true, offset, out),
            (Step::WillMessage, Value::Connect(c)) => codec::encode_string(&mut c.will_message, true, offset, out),
            (Step::UserName, Value::Connect(c)) => codec::encode_string(&mut c.user_name, true, offset, out),
            (Step::Password, Value::Connect(c)) => codec::encode_string(&mut c.password, true, offset, out),
            (Step::Topic, Value::Publish(p)) => codec::encode_string(&mut p.topic, false, offset, out),
            (Step::Payload, Value::Publish(p)) => codec::encode_bytes(&mut p.payload, offset, out),
            (Step::PacketId, _) => codec::encode_u16(entry.packet_id, offset, out),
            (Step::Filter(i), Value::Subscribe(s)) => match s.subscriptions.get_mut(i) {
                Some(sub) => codec::encode_string(&mut sub.topic, false, offset, out),
                None => Encode::Finished(0),
            },
            (Step::FilterQos(i), Value::Subscribe(s)) => match s.subscriptions.get(i) {
                Some(sub) => codec::encode_slice(&[sub.qos as u8], offset, out),
                None => Encode::Finished(0),
            },
            // a step whose value is missing contributes nothing
            _ => Encode::Finished(0),
        }
    }

    fn build_header(&mut self, kind: Kind, value: &mut Value<'_>) -> Result<(), Error> {
        let (first, remaining) = match (kind, value) {
            (Kind::Connect, Value::Connect(connect)) => {
                (PacketType::Connect.header_byte(), connect.remaining_length())
            }
            (Kind::Publish0 | Kind::Publish1 | Kind::Publish2, Value::Publish(publish)) => {
                let first = publish.header_byte();
                publish.encode_count = publish.encode_count.saturating_add(1);
                (first, publish.remaining_length())
            }
            (Kind::Subscribe, Value::Subscribe(subscribe)) => {
                (PacketType::Subscribe.header_byte(), subscribe.remaining_length(false))
            }
            (Kind::Unsubscribe, Value::Subscribe(subscribe)) => {
                (PacketType::Unsubscribe.header_byte(), subscribe.remaining_length(true))
            }
            (Kind::Puback, _) => (PacketType::Puback.header_byte(), 2),
            (Kind::Pubrec, _) => (PacketType::Pubrec.header_byte(), 2),
            (Kind::Pubrel, _) => (PacketType::Pubrel.header_byte(), 2),
            (Kind::Pubcomp, _) => (PacketType::Pubcomp.header_byte(), 2),
            (Kind::Pingreq, _) => (PacketType::Pingreq.header_byte(), 0),
            (Kind::Disconnect, _) => (PacketType::Disconnect.header_byte(), 0),
            (kind, _) => {
                warn!("no value to encode for {:?}", kind);
                return Err(Error::InvalidState);
            }
        };
        codec::build_fixed_header(&mut self.scratch, first, remaining)
    }
}

//! Completion and inbound-message callbacks.

use super::packet::{Connect, Publish, QoS, Subscribe};
use super::store::{Entry, Kind, Value};
use super::string::StreamError;

/// An inbound PUBLISH as seen by the [`Handler`].
#[derive(Debug, Clone, Copy)]
pub struct Message<'m> {
    /// Topic name bytes.
    pub topic: &'m [u8],
    /// Delivery guarantee requested by the sender.
    pub qos: QoS,
    /// The broker delivered a retained message.
    pub retain: bool,
    /// The broker flagged this as a possible redelivery.
    pub dup: bool,
    /// Packet identifier, 0 for QoS 0.
    pub packet_id: u16,
    /// Total payload length.
    pub payload_len: usize,
}

impl<'m> Message<'m> {
    /// Topic as UTF-8, if valid.
    pub fn topic_str(&self) -> Option<&'m str> {
        core::str::from_utf8(self.topic).ok()
    }
}

/// Receives the outcome of every queued request and every inbound message.
///
/// Each request admitted by the [`Client`](super::Client) comes back through
/// exactly one of the completion methods, with `succeeded == false` when the
/// session failed or was finalized before the request completed. All methods
/// have empty defaults.
pub trait Handler<'a> {
    /// A CONNECT was acknowledged (or refused, or abandoned).
    fn on_connect(&mut self, _connect: Connect<'a>, _succeeded: bool) {}

    /// A SUBSCRIBE completed; per-filter results are in each subscription.
    fn on_subscribe(&mut self, _subscribe: Subscribe<'a>, _succeeded: bool) {}

    /// An UNSUBSCRIBE completed.
    fn on_unsubscribe(&mut self, _unsubscribe: Subscribe<'a>, _succeeded: bool) {}

    /// A PUBLISH completed: written for QoS 0, PUBACK for QoS 1, PUBCOMP for QoS 2.
    fn on_publish(&mut self, _publish: Publish<'a>, _succeeded: bool) {}

    /// A DISCONNECT was written, or dropped.
    fn on_disconnect(&mut self, _succeeded: bool) {}

    /// Payload bytes of an inbound PUBLISH, `offset` bytes into the payload.
    ///
    /// Return how many bytes were consumed. [`StreamError::WouldBlock`] pauses
    /// decoding until the next `process_input` call; [`StreamError::Failed`]
    /// fails the session.
    fn on_message_data(
        &mut self,
        _message: &Message<'_>,
        _offset: usize,
        data: &[u8],
    ) -> Result<usize, StreamError> {
        Ok(data.len())
    }

    /// An inbound PUBLISH was received completely.
    fn on_message(&mut self, _message: &Message<'_>) {}
}

impl Handler<'_> for () {}

/// Hands the request in `entry` back through its completion callback.
pub(crate) fn complete<'a, H: Handler<'a>>(handler: &mut H, entry: Entry<'a>, succeeded: bool) {
    match (entry.kind, entry.value) {
        (_, Value::Connect(connect)) => handler.on_connect(connect, succeeded),
        (_, Value::Publish(publish)) => handler.on_publish(publish, succeeded),
        (Kind::Unsubscribe, Value::Subscribe(unsubscribe)) => {
            handler.on_unsubscribe(unsubscribe, succeeded)
        }
        (_, Value::Subscribe(subscribe)) => handler.on_subscribe(subscribe, succeeded),
        (Kind::Disconnect, Value::None) => handler.on_disconnect(succeeded),
        (_, Value::None) => {}
    }
}

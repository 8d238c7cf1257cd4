//! Fixed-capacity store of in-flight requests.
//!
//! Entries are kept in the order they were queued. The outbound buffer walks
//! them front to back, encoding the first entry not yet marked as sent; the
//! inbound buffer removes sent entries when their acknowledgement arrives.
//! Removing from the middle shifts the tail down, so the relative order of
//! everything left behind never changes.

use heapless::Vec;

use super::packet::{Connect, Publish, Subscribe};

/// What a store entry represents on the wire.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Kind {
    /// CONNECT, awaiting CONNACK.
    Connect,
    /// PUBLISH with QoS 0, dropped once written.
    Publish0,
    /// PUBLISH with QoS 1, awaiting PUBACK.
    Publish1,
    /// PUBLISH with QoS 2, awaiting PUBREC.
    Publish2,
    /// PUBACK reply to an inbound QoS 1 PUBLISH.
    Puback,
    /// PUBREC reply to an inbound QoS 2 PUBLISH.
    Pubrec,
    /// PUBREL of an outbound QoS 2 flow, awaiting PUBCOMP.
    Pubrel,
    /// PUBCOMP reply to an inbound PUBREL.
    Pubcomp,
    /// SUBSCRIBE, awaiting SUBACK.
    Subscribe,
    /// UNSUBSCRIBE, awaiting UNSUBACK.
    Unsubscribe,
    /// PINGREQ; the response is tracked by the session, not the store.
    Pingreq,
    /// DISCONNECT; closes the outbound side once written.
    Disconnect,
}

impl Kind {
    /// Kinds that get a fresh packet identifier when appended.
    pub fn needs_id(self) -> bool {
        matches!(
            self,
            Kind::Publish1 | Kind::Publish2 | Kind::Subscribe | Kind::Unsubscribe
        )
    }

    /// Kinds that stay in the store after being written, until acknowledged.
    pub fn awaits_response(self) -> bool {
        matches!(
            self,
            Kind::Connect
                | Kind::Publish1
                | Kind::Publish2
                | Kind::Pubrel
                | Kind::Subscribe
                | Kind::Unsubscribe
        )
    }
}

/// The request carried by an entry.
#[derive(Debug, Default)]
pub enum Value<'a> {
    /// Internal packets (acks, PINGREQ, DISCONNECT) carry nothing.
    #[default]
    None,
    /// A CONNECT request.
    Connect(Connect<'a>),
    /// A PUBLISH request; also carried by its PUBREL.
    Publish(Publish<'a>),
    /// A SUBSCRIBE or UNSUBSCRIBE request.
    Subscribe(Subscribe<'a>),
}

impl Value<'_> {
    fn set_packet_id(&mut self, id: u16) {
        match self {
            Value::Publish(publish) => publish.packet_id = id,
            Value::Subscribe(subscribe) => subscribe.packet_id = id,
            Value::None | Value::Connect(_) => {}
        }
    }
}

/// One queued request.
#[derive(Debug)]
pub struct Entry<'a> {
    /// Packet kind.
    pub kind: Kind,
    /// Packet identifier, 0 when the kind has none.
    pub packet_id: u16,
    /// The request itself.
    pub value: Value<'a>,
    /// Set once the packet has been fully encoded.
    pub sent: bool,
}

/// An ordered, fixed-capacity collection of [`Entry`] values.
///
/// # Examples
///
/// ```rust
/// use libmqtt::network::application::mqtt::store::{Kind, MessageStore, Value};
///
/// let mut store: MessageStore<'_, 2> = MessageStore::new();
/// assert_eq!(store.append(Kind::Pingreq, Value::None).ok(), Some(0));
/// assert_eq!(store.append(Kind::Publish1, Value::None).ok(), Some(1));
/// assert!(store.append(Kind::Pingreq, Value::None).is_err());
/// assert_eq!(store.count(), 2);
/// ```
#[derive(Debug)]
pub struct MessageStore<'a, const N: usize> {
    entries: Vec<Entry<'a>, N>,
    next_id: u16,
}

impl<const N: usize> Default for MessageStore<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize> MessageStore<'a, N> {
    /// Creates an empty store.
    pub const fn new() -> Self {
        MessageStore {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Whether another entry fits.
    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Queues `value` at the back, assigning a packet identifier when `kind`
    /// needs one. Returns the identifier (0 if none), or the value back when
    /// the store is full.
    pub fn append(&mut self, kind: Kind, mut value: Value<'a>) -> Result<u16, Value<'a>> {
        if self.is_full() {
            return Err(value);
        }
        let id = if kind.needs_id() { self.get_id() } else { 0 };
        value.set_packet_id(id);
        self.append_with_id(kind, id, value).map(|()| id)
    }

    /// Queues `value` at the back with a caller-chosen identifier.
    pub fn append_with_id(&mut self, kind: Kind, packet_id: u16, value: Value<'a>) -> Result<(), Value<'a>> {
        self.entries
            .push(Entry {
                kind,
                packet_id,
                value,
                sent: false,
            })
            .map_err(|entry| entry.value)
    }

    /// Advances the identifier counter and returns the next identifier not
    /// held by any live entry. Never returns 0; wraps after 65535.
    pub fn get_id(&mut self) -> u16 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            let id = self.next_id;
            if id != 0 && !self.entries.iter().any(|e| e.packet_id == id) {
                return id;
            }
        }
    }

    /// The oldest entry not yet marked as sent.
    pub fn peek_current(&mut self) -> Option<&mut Entry<'a>> {
        self.entries.iter_mut().find(|e| !e.sent)
    }

    /// Marks the current entry as sent. Returns `false` if there is none.
    pub fn mark_current(&mut self) -> bool {
        match self.peek_current() {
            Some(entry) => {
                entry.sent = true;
                true
            }
            None => false,
        }
    }

    /// Removes and returns the current entry.
    pub fn drop_current(&mut self) -> Option<Entry<'a>> {
        let index = self.entries.iter().position(|e| !e.sent)?;
        Some(self.entries.remove(index))
    }

    /// The oldest sent entry of `kind` holding `packet_id`.
    pub fn find_marked_mut(&mut self, kind: Kind, packet_id: u16) -> Option<&mut Entry<'a>> {
        self.entries
            .iter_mut()
            .find(|e| e.sent && e.kind == kind && e.packet_id == packet_id)
    }

    /// Removes the oldest sent entry of `kind` holding `packet_id` and returns
    /// its value.
    pub fn pop_marked_by(&mut self, kind: Kind, packet_id: u16) -> Option<Value<'a>> {
        let index = self
            .entries
            .iter()
            .position(|e| e.sent && e.kind == kind && e.packet_id == packet_id)?;
        Some(self.entries.remove(index).value)
    }

    /// Removes the oldest entry regardless of state.
    pub fn shift(&mut self) -> Option<Entry<'a>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Removes the oldest entry matching `predicate`.
    pub fn remove_first<F>(&mut self, predicate: F) -> Option<Entry<'a>>
    where
        F: FnMut(&Entry<'a>) -> bool,
    {
        let index = self.entries.iter().position(predicate)?;
        Some(self.entries.remove(index))
    }

    #[cfg(test)]
    pub(crate) fn set_next_id(&mut self, id: u16) {
        self.next_id = id;
    }

    /// Clears every sent marker so all entries are written again.
    pub fn unmark_all(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.sent = false;
        }
    }
}

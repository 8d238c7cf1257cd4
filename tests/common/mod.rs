//! Mock transport, clock and handler shared by the integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::time::Duration;

use libmqtt::network::application::mqtt::{
    Client, Clock, Connack, Connect, Handler, Message, Publish, QoS, StreamError, SubackCode,
    Subscribe,
};
use libmqtt::network::{Close, Connection, Read, TransportError, Write};
use rand::Rng;
use rand::rngs::StdRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    WouldBlock,
    Os(i32),
}

impl TransportError for MockError {
    fn is_would_block(&self) -> bool {
        *self == MockError::WouldBlock
    }

    fn os_error(&self) -> i32 {
        match self {
            MockError::WouldBlock => 0,
            MockError::Os(code) => *code,
        }
    }
}

/// A scripted socket.
///
/// Reads drain `inbound`, at most `max_read` bytes per call, then would block,
/// or report a close once `peer_closed` is set. Writes append to `written`, at
/// most `max_write` bytes per call and `write_budget` bytes overall. With
/// `chunking` set every call moves a random short chunk, and sometimes
/// pretends the socket would block.
#[derive(Debug)]
pub struct MockConnection {
    pub inbound: Vec<u8>,
    pub written: Vec<u8>,
    pub max_read: usize,
    pub max_write: usize,
    pub write_budget: usize,
    pub peer_closed: bool,
    pub read_error: Option<i32>,
    pub write_error: Option<i32>,
    pub chunking: Option<StdRng>,
}

impl Default for MockConnection {
    fn default() -> Self {
        MockConnection {
            inbound: Vec::new(),
            written: Vec::new(),
            max_read: usize::MAX,
            max_write: usize::MAX,
            write_budget: usize::MAX,
            peer_closed: false,
            read_error: None,
            write_error: None,
            chunking: None,
        }
    }
}

impl MockConnection {
    /// Queues bytes for the client to read.
    pub fn push(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
    }

    /// Returns and forgets everything written so far.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }

    /// Per-call limit, or `None` for a spurious would-block.
    fn chunk(&mut self, max: usize) -> Option<usize> {
        match &mut self.chunking {
            Some(rng) => {
                if rng.gen_bool(0.2) {
                    None
                } else {
                    Some(rng.gen_range(1..=16))
                }
            }
            None => Some(max),
        }
    }
}

impl Read for MockConnection {
    type Error = MockError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if let Some(code) = self.read_error {
            return Err(MockError::Os(code));
        }
        if self.inbound.is_empty() {
            return if self.peer_closed {
                Ok(0)
            } else {
                Err(MockError::WouldBlock)
            };
        }
        let Some(limit) = self.chunk(self.max_read) else {
            return Err(MockError::WouldBlock);
        };
        let n = buf.len().min(self.inbound.len()).min(limit);
        buf[..n].copy_from_slice(&self.inbound[..n]);
        self.inbound.drain(..n);
        Ok(n)
    }
}

impl Write for MockConnection {
    type Error = MockError;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if let Some(code) = self.write_error {
            return Err(MockError::Os(code));
        }
        let Some(limit) = self.chunk(self.max_write) else {
            return Err(MockError::WouldBlock);
        };
        let n = buf.len().min(limit).min(self.write_budget);
        if n == 0 {
            return Err(MockError::WouldBlock);
        }
        self.written.extend_from_slice(&buf[..n]);
        if self.write_budget != usize::MAX {
            self.write_budget -= n;
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = MockError;

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for MockConnection {}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(Cell<u64>);

impl ManualClock {
    pub fn at(secs: u64) -> Self {
        ManualClock(Cell::new(secs))
    }

    pub fn set(&self, secs: u64) {
        self.0.set(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_secs(self.0.get())
    }
}

/// Everything the handler was told, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect {
        succeeded: bool,
        response: Option<Connack>,
    },
    Subscribe {
        id: u16,
        succeeded: bool,
        codes: Vec<Option<SubackCode>>,
    },
    Unsubscribe {
        id: u16,
        succeeded: bool,
    },
    Publish {
        id: u16,
        succeeded: bool,
        encode_count: u8,
    },
    Disconnect(bool),
    Message {
        topic: Vec<u8>,
        payload: Vec<u8>,
        qos: QoS,
        packet_id: u16,
        dup: bool,
    },
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
    pub payload: Vec<u8>,
    /// Payload bytes accepted per call; `Some(0)` blocks.
    pub sink_limit: Option<usize>,
}

impl Recorder {
    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Number of completions reporting failure.
    pub fn failures(&self) -> usize {
        self.events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::Connect { succeeded: false, .. }
                        | Event::Subscribe { succeeded: false, .. }
                        | Event::Unsubscribe { succeeded: false, .. }
                        | Event::Publish { succeeded: false, .. }
                        | Event::Disconnect(false)
                )
            })
            .count()
    }
}

impl<'a> Handler<'a> for Recorder {
    fn on_connect(&mut self, connect: Connect<'a>, succeeded: bool) {
        self.events.push(Event::Connect {
            succeeded,
            response: connect.response,
        });
    }

    fn on_subscribe(&mut self, subscribe: Subscribe<'a>, succeeded: bool) {
        let codes = subscribe.subscriptions.iter().map(|s| s.return_code).collect();
        self.events.push(Event::Subscribe {
            id: subscribe.packet_id(),
            succeeded,
            codes,
        });
    }

    fn on_unsubscribe(&mut self, unsubscribe: Subscribe<'a>, succeeded: bool) {
        self.events.push(Event::Unsubscribe {
            id: unsubscribe.packet_id(),
            succeeded,
        });
    }

    fn on_publish(&mut self, publish: Publish<'a>, succeeded: bool) {
        self.events.push(Event::Publish {
            id: publish.packet_id(),
            succeeded,
            encode_count: publish.encode_count(),
        });
    }

    fn on_disconnect(&mut self, succeeded: bool) {
        self.events.push(Event::Disconnect(succeeded));
    }

    fn on_message_data(
        &mut self,
        _message: &Message<'_>,
        offset: usize,
        data: &[u8],
    ) -> Result<usize, StreamError> {
        assert_eq!(offset, self.payload.len());
        let n = match self.sink_limit {
            Some(0) => return Err(StreamError::WouldBlock),
            Some(limit) => data.len().min(limit),
            None => data.len(),
        };
        self.payload.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn on_message(&mut self, message: &Message<'_>) {
        let payload = std::mem::take(&mut self.payload);
        assert_eq!(payload.len(), message.payload_len);
        self.events.push(Event::Message {
            topic: message.topic.to_vec(),
            payload,
            qos: message.qos,
            packet_id: message.packet_id,
            dup: message.dup,
        });
    }
}

pub type TestClient<'a, 'c, const MAIN: usize = 16> =
    Client<'a, MockConnection, &'c ManualClock, Recorder, MAIN>;

pub fn new_client<'a, 'c, const MAIN: usize>(clock: &'c ManualClock) -> TestClient<'a, 'c, MAIN> {
    Client::new(MockConnection::default(), clock, Recorder::default())
}

pub const CONNACK_ACCEPTED: &[u8] = b"\x20\x02\x00\x00";

pub fn simple_connect<'a>(keep_alive: u16) -> Connect<'a> {
    Connect {
        client_id: "test".into(),
        keep_alive,
        clean_session: true,
        ..Default::default()
    }
}

/// Connects and drives the handshake to `Connected`.
pub fn connected<'a, 'c, const MAIN: usize>(client: &mut TestClient<'a, 'c, MAIN>, keep_alive: u16) {
    use libmqtt::network::application::mqtt::{IoStatus, State};

    client.connect(simple_connect(keep_alive)).unwrap();
    assert_eq!(client.process_output(), IoStatus::BlockData);
    client.connection_mut().push(CONNACK_ACCEPTED);
    assert_eq!(client.process_input(), IoStatus::BlockConn);
    assert_eq!(client.state(), State::Connected);
    client.connection_mut().take_written();
    client.handler_mut().take();
}

//! Non-blocking MQTT 3.1.1 client engine.
//!
//! The engine performs no I/O of its own and never waits. An application event
//! loop owns the socket readiness logic and drives a [`Client`] through four
//! calls: [`Client::process_output`], [`Client::process_input`],
//! [`Client::keep_alive`] and [`Client::get_timeout`]. Each returns an
//! [`IoStatus`] describing what the loop should wait for next.
//!
//! # Layers
//!
//! - [`codec`]: resumable encoders and byte-at-a-time decoders for the wire
//!   format (remaining-length varint, strings, headers).
//! - [`store`]: fixed-capacity ordered store of in-flight requests that
//!   assigns packet identifiers and matches acknowledgements.
//! - [`tx`] and [`rx`]: outbound and inbound buffers that walk the store and
//!   the byte stream, resumable at any byte boundary.
//! - [`client`]: the session state machine tying it together.
//!
//! # Ownership
//!
//! Requests ([`Connect`], [`Publish`], [`Subscribe`]) are moved into the client
//! when queued and handed back through exactly one [`Handler`] callback, with
//! a `succeeded` flag, when they complete or the session is torn down. Topic
//! and payload bytes are borrowed for the lifetime `'a` of the client, or
//! pulled on demand from a [`ByteSource`].
//!
//! # Example
//!
//! ```rust
//! use core::cell::Cell;
//! use core::time::Duration;
//! use libmqtt::network::application::mqtt::{
//!     Client, Clock, Connect, Handler, IoStatus, Publish, QoS, State,
//! };
//! use libmqtt::network::error::Error;
//! use libmqtt::network::{Close, Connection, Read, Write};
//!
//! /// A broker answering CONNECT with CONNACK and PUBLISH (QoS 1) with PUBACK.
//! #[derive(Default)]
//! struct Loopback {
//!     inbound: Vec<u8>,
//! }
//!
//! impl Read for Loopback {
//!     type Error = Error;
//!     fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
//!         if self.inbound.is_empty() {
//!             return Err(Error::WouldBlock);
//!         }
//!         let n = buf.len().min(self.inbound.len());
//!         buf[..n].copy_from_slice(&self.inbound[..n]);
//!         self.inbound.drain(..n);
//!         Ok(n)
//!     }
//! }
//!
//! impl Write for Loopback {
//!     type Error = Error;
//!     fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
//!         match buf[0] {
//!             0x10 => self.inbound.extend_from_slice(b"\x20\x02\x00\x00"),
//!             0x32 => self.inbound.extend_from_slice(b"\x40\x02\x00\x01"),
//!             _ => {}
//!         }
//!         Ok(buf.len())
//!     }
//!     fn flush(&mut self) -> Result<(), Error> { Ok(()) }
//! }
//!
//! impl Close for Loopback {
//!     type Error = Error;
//!     fn close(self) -> Result<(), Error> { Ok(()) }
//! }
//!
//! impl Connection for Loopback {}
//!
//! struct Ticks(Cell<u64>);
//! impl Clock for Ticks {
//!     fn now(&self) -> Duration { Duration::from_secs(self.0.get()) }
//! }
//!
//! #[derive(Default)]
//! struct Acks(usize);
//! impl<'a> Handler<'a> for Acks {
//!     fn on_publish(&mut self, _publish: Publish<'a>, succeeded: bool) {
//!         if succeeded {
//!             self.0 += 1;
//!         }
//!     }
//! }
//!
//! let broker = Loopback::default();
//! let clock = Ticks(Cell::new(0));
//! let mut client: Client<'_, _, _, _> = Client::new(broker, &clock, Acks::default());
//!
//! client
//!     .connect(Connect { client_id: "probe".into(), clean_session: true, ..Default::default() })
//!     .unwrap();
//! client.publish(Publish::new("probe/state", "up", QoS::AtLeastOnce)).unwrap();
//!
//! assert_eq!(client.process_output(), IoStatus::BlockData);
//! assert_eq!(client.process_input(), IoStatus::BlockConn);
//! assert_eq!(client.state(), State::Connected);
//! assert_eq!(client.process_output(), IoStatus::BlockData);
//! assert_eq!(client.process_input(), IoStatus::BlockConn);
//! assert_eq!(client.handler().0, 1);
//! ```

/// Resumable wire encoders and decoders.
pub mod codec;

/// Request and packet types.
pub mod packet;

/// In-flight request store.
pub mod store;

/// Byte strings backed by memory or by a [`ByteSource`].
pub mod string;

/// Outbound buffer.
pub mod tx;

/// Inbound buffer.
pub mod rx;

/// Completion and inbound-message callbacks.
pub mod handler;

/// Session state machine.
pub mod client;

/// Session configuration.
pub mod config;

/// Error types.
pub mod error;

pub use client::{Client, Clock, IO_BUFFER_SIZE, IoStatus, State};
#[cfg(feature = "std")]
pub use client::StdClock;
pub use config::ClientConfig;
pub use error::{DecodeError, Error, Invalid, Rejected};
pub use handler::{Handler, Message};
pub use packet::{
    Connack, ConnackCode, Connect, Publish, QoS, Subscribe, SubackCode, Subscription, Unsubscribe,
};
pub use string::{ByteSource, ByteStr, StreamError};

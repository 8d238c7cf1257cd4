//! # libmqtt - non-blocking MQTT client engine
//!
//! A sans-IO MQTT 3.1.1 client for event-loop driven applications and embedded
//! systems. The engine never owns a socket and never blocks: the application
//! performs the reads and writes, and the engine encodes, decodes and keeps
//! track of every request in flight. It supports `no_std` environments and
//! never allocates.
//!
//! ## Features
//!
//! - Byte-exact MQTT 3.1.1 encoding and decoding, resumable at any byte
//!   boundary in both directions
//! - QoS 0, 1 and 2 in both directions, with DUP on retransmission
//! - Fixed-capacity request store with packet identifier management
//! - Connect and keep-alive timers driven by an injected [`Clock`](network::application::mqtt::Clock)
//! - Streaming payloads and topics through [`ByteSource`](network::application::mqtt::ByteSource)
//! - Exactly one completion callback per admitted request
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libmqtt = "0.1.0"
//! ```
//!
//! An event loop alternates between the socket and the engine:
//!
//! ```rust,no_run
//! use libmqtt::network::application::mqtt::{Client, Connect, IoStatus};
//! # use core::time::Duration;
//! # use libmqtt::network::application::mqtt::Clock;
//! # use libmqtt::network::error::Error;
//! # struct Socket;
//! # impl libmqtt::network::Connection for Socket {}
//! # impl libmqtt::network::Read for Socket {
//! #     type Error = Error;
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Error> { Err(Error::WouldBlock) }
//! # }
//! # impl libmqtt::network::Write for Socket {
//! #     type Error = Error;
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Error> { Ok(()) }
//! # }
//! # impl libmqtt::network::Close for Socket {
//! #     type Error = Error;
//! #     fn close(self) -> Result<(), Error> { Ok(()) }
//! # }
//! # struct Uptime;
//! # impl Clock for Uptime { fn now(&self) -> Duration { Duration::ZERO } }
//! # fn wait_for_socket(_timeout: Option<Duration>) {}
//!
//! let mut client: Client<'_, _, _, ()> = Client::new(Socket, Uptime, ());
//! client
//!     .connect(Connect { client_id: "my_device".into(), keep_alive: 60, ..Default::default() })
//!     .unwrap();
//!
//! loop {
//!     if client.process_output() == IoStatus::Error
//!         || client.process_input() == IoStatus::Error
//!         || client.keep_alive() == IoStatus::Error
//!     {
//!         break;
//!     }
//!     wait_for_socket(client.get_timeout());
//! }
//! client.finalize();
//! ```
//!
//! ## Optional Features
//!
//! - `std`: `StdClock` and a [`Connection`](network::Connection) for
//!   `std::net::TcpStream` (default: disabled)
//! - `defmt`: `defmt::Format` for public types and logging through defmt
//! - `log`: logging through the `log` facade

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Network abstraction layer: transport traits and the MQTT engine.
///
/// The engine only talks to the transport through the [`Read`](network::Read)
/// and [`Write`](network::Write) traits, so it runs over TCP, TLS or any other
/// byte stream the application provides.
pub mod network;

//! # Application Layer Network Protocols
//!
//! Protocols built on top of the transport traits in [`network`](crate::network).
//! They are connection agnostic and use fixed-size buffers only.

/// MQTT 3.1.1 client engine.
///
/// A non-blocking publish-subscribe client driven by an external event loop.
pub mod mqtt;

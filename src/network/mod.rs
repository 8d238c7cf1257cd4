//! Transport abstraction consumed by the protocol engine.
//!
//! The engine never owns a socket in the usual sense: it only calls [`Read::read`]
//! and [`Write::write`] on whatever the application hands it, and expects both
//! to return immediately. A call that cannot make progress must fail with an
//! error whose [`TransportError::is_would_block`] is `true`; the engine then
//! reports the condition to its caller instead of waiting.
//!

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// Application layer protocols
pub mod application;

pub use error::TransportError;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connection, Read, TransportError, Write};
}

pub trait Read {
    /// Associated error type
    type Error: TransportError;
    /// Read data from the connection.
    ///
    /// `Ok(0)` means the peer closed the connection.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: TransportError;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous, non-blocking connection
pub trait Connection: Read + Write + Close {}

#[cfg(feature = "std")]
mod tcp {
    use super::{Close, Connection, Read, Write};
    use std::net::{Shutdown, TcpStream};

    impl Read for TcpStream {
        type Error = std::io::Error;

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            std::io::Read::read(self, buf)
        }
    }

    impl Write for TcpStream {
        type Error = std::io::Error;

        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            std::io::Write::write(self, buf)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            std::io::Write::flush(self)
        }
    }

    impl Close for TcpStream {
        type Error = std::io::Error;

        fn close(self) -> Result<(), Self::Error> {
            self.shutdown(Shutdown::Both)
        }
    }

    impl Connection for TcpStream {}
}

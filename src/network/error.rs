//! Common error types for network operations

/// A common error type for network operations.
///
/// Transports without an error type of their own can report through this
/// enum. It is simple and portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The operation cannot complete right now; retry once the socket is ready.
    WouldBlock,
    /// A hard failure carrying the platform error code.
    Os(i32),
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::WouldBlock => defmt::write!(f, "WouldBlock"),
            Error::Os(code) => defmt::write!(f, "Os({})", code),
        }
    }
}

/// Classifies a transport error for a non-blocking caller.
///
/// Every `Read`/`Write` error type has to tell whether a failed call merely
/// would have blocked, and may expose the OS error code behind a hard failure.
pub trait TransportError: core::fmt::Debug {
    /// Returns `true` if the operation should be retried once the transport
    /// becomes ready again.
    fn is_would_block(&self) -> bool;

    /// The platform error code behind this error, or 0 when there is none.
    fn os_error(&self) -> i32 {
        0
    }
}

impl TransportError for Error {
    fn is_would_block(&self) -> bool {
        matches!(self, Error::WouldBlock)
    }

    fn os_error(&self) -> i32 {
        match self {
            Error::WouldBlock => 0,
            Error::Os(code) => *code,
        }
    }
}

#[cfg(feature = "std")]
impl TransportError for std::io::Error {
    fn is_would_block(&self) -> bool {
        self.kind() == std::io::ErrorKind::WouldBlock
    }

    fn os_error(&self) -> i32 {
        self.raw_os_error().unwrap_or(0)
    }
}

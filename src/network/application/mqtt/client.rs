//! The MQTT session state machine.
//!
//! A [`Client`] never blocks and never waits. The application runs the event
//! loop: it calls [`Client::process_output`] when the socket is writable,
//! [`Client::process_input`] when it is readable and [`Client::keep_alive`]
//! when the deadline reported by [`Client::get_timeout`] expires. Every call
//! returns an [`IoStatus`] telling the loop what to wait for next.
//!
//! # Session states
//!
//! ```text
//! Disconnected --connect()--> Connecting --CONNACK--> Connected
//!      ^                          |                      |
//!      |                       refused              disconnect()
//!      |                          |                      v
//!      +--------------------------+-------------- Disconnecting
//!
//! any state --protocol, I/O or timeout error--> Failed
//! any state --finalize()--> Finalized
//! ```
//!
//! Requests queued before the CONNACK wait in the main store and are only
//! written once the broker has accepted the connection.

use core::time::Duration;

use super::config::ClientConfig;
use super::error::{DecodeError, Error, Rejected};
use super::handler::{self, Handler};
use super::packet::{Connack, ConnackCode, Connect, Publish, QoS, Subscribe};
use super::rx::{Decoded, RxBuffer};
use super::store::{Kind, MessageStore, Value};
use super::tx::{TxBuffer, TxStatus};
use crate::network::{Connection, TransportError};

/// Bytes moved to or from the connection per socket call.
pub const IO_BUFFER_SIZE: usize = 512;

/// Monotonic time source.
///
/// Only differences between readings matter; the epoch is arbitrary.
pub trait Clock {
    /// Time elapsed since the clock's epoch.
    fn now(&self) -> Duration;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// [`Clock`] backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// A clock whose epoch is the moment of creation.
    pub fn new() -> Self {
        StdClock {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// What the event loop should do after a `process_*` or `keep_alive` call.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoStatus {
    /// Nothing more to do in this direction right now.
    Ready,
    /// The connection would block; wait until it is readable or writable.
    BlockConn,
    /// A streamed field or the inbound message handler is not ready; call
    /// again once it is.
    BlockData,
    /// The session failed; see [`Client::last_error`].
    Error,
}

/// Session state.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No connection attempt is in progress.
    Disconnected,
    /// CONNECT queued or written, CONNACK not yet received.
    Connecting,
    /// The broker accepted the connection.
    Connected,
    /// DISCONNECT queued but not yet written.
    Disconnecting,
    /// A terminal error occurred; only [`Client::finalize`] is useful now.
    Failed,
    /// The session was torn down with [`Client::finalize`].
    Finalized,
}

/// Non-blocking MQTT 3.1.1 client session.
///
/// `MAIN` is the capacity of the store holding publish, subscribe and
/// protocol traffic; `HANDSHAKE` the capacity of the store holding the
/// CONNECT request.
///
/// # Examples
///
/// ```rust
/// use core::time::Duration;
/// use libmqtt::network::application::mqtt::{Client, Clock, Connect, IoStatus, Publish, QoS};
/// use libmqtt::network::error::Error;
/// use libmqtt::network::{Close, Connection, Read, Write};
///
/// struct Idle;
/// impl Read for Idle {
///     type Error = Error;
///     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Error> { Err(Error::WouldBlock) }
/// }
/// impl Write for Idle {
///     type Error = Error;
///     fn write(&mut self, buf: &[u8]) -> Result<usize, Error> { Ok(buf.len()) }
///     fn flush(&mut self) -> Result<(), Error> { Ok(()) }
/// }
/// impl Close for Idle {
///     type Error = Error;
///     fn close(self) -> Result<(), Error> { Ok(()) }
/// }
/// impl Connection for Idle {}
///
/// struct Frozen;
/// impl Clock for Frozen {
///     fn now(&self) -> Duration { Duration::ZERO }
/// }
///
/// let mut client: Client<'_, _, _, ()> = Client::new(Idle, Frozen, ());
/// client
///     .connect(Connect { client_id: "sensor".into(), keep_alive: 30, ..Default::default() })
///     .unwrap();
/// let id = client.publish(Publish::new("sensors/temp", "21.5", QoS::AtLeastOnce)).unwrap();
/// assert_eq!(id, 1);
///
/// // CONNECT goes out, the publish waits for the CONNACK
/// assert_eq!(client.process_output(), IoStatus::BlockData);
/// assert_eq!(client.process_input(), IoStatus::BlockConn);
/// assert_eq!(client.pending_requests(), 2);
/// ```
#[derive(Debug)]
pub struct Client<'a, C, T, H, const MAIN: usize = 16, const HANDSHAKE: usize = 1> {
    connection: C,
    clock: T,
    handler: H,
    config: ClientConfig,
    state: State,
    connect_store: MessageStore<'a, HANDSHAKE>,
    store: MessageStore<'a, MAIN>,
    tx: TxBuffer,
    rx: RxBuffer,
    write_buf: [u8; IO_BUFFER_SIZE],
    write_start: usize,
    write_end: usize,
    read_buf: [u8; IO_BUFFER_SIZE],
    read_start: usize,
    read_end: usize,
    disconnect_written: bool,
    keep_alive: Duration,
    connect_at: Duration,
    last_sent: Duration,
    ping_at: Option<Duration>,
    last_error: Option<Error>,
}

impl<'a, C, T, H, const MAIN: usize, const HANDSHAKE: usize> Client<'a, C, T, H, MAIN, HANDSHAKE>
where
    C: Connection,
    T: Clock,
    H: Handler<'a>,
{
    /// Creates a disconnected session with the default configuration.
    pub fn new(connection: C, clock: T, handler: H) -> Self {
        Self::with_config(connection, clock, handler, ClientConfig::default())
    }

    /// Creates a disconnected session.
    pub fn with_config(connection: C, clock: T, handler: H, config: ClientConfig) -> Self {
        let mut tx = TxBuffer::new();
        tx.close();
        Client {
            connection,
            clock,
            handler,
            config,
            state: State::Disconnected,
            connect_store: MessageStore::new(),
            store: MessageStore::new(),
            tx,
            rx: RxBuffer::new(),
            write_buf: [0; IO_BUFFER_SIZE],
            write_start: 0,
            write_end: 0,
            read_buf: [0; IO_BUFFER_SIZE],
            read_start: 0,
            read_end: 0,
            disconnect_written: false,
            keep_alive: Duration::ZERO,
            connect_at: Duration::ZERO,
            last_sent: Duration::ZERO,
            ping_at: None,
            last_error: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The error that failed the session or refused the last connection.
    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    /// OS-level code attached to [`last_error`](Self::last_error), 0 if none.
    pub fn os_error(&self) -> i32 {
        self.last_error.map_or(0, |e| e.os_error())
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sets the CONNACK and PINGRESP timeout in seconds; 0 disables the
    /// connect timeout and makes the ping timeout equal the keep-alive.
    pub fn set_default_timeout(&mut self, seconds: u16) {
        self.config.default_timeout = seconds;
    }

    /// The completion handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The completion handler, mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The transport.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Requests admitted and not yet completed, across both stores.
    pub fn pending_requests(&self) -> usize {
        self.store.count() + self.connect_store.count()
    }

    /// Takes the session apart. Call [`finalize`](Self::finalize) first to get
    /// every pending request back through the handler.
    pub fn into_parts(self) -> (C, T, H) {
        (self.connection, self.clock, self.handler)
    }

    /// Starts a connection attempt.
    ///
    /// Only allowed while [`State::Disconnected`]. Buffered bytes of the
    /// previous connection are discarded. Requests left in the main store are
    /// written again, with DUP set on PUBLISH packets, after the CONNACK.
    pub fn connect(&mut self, connect: Connect<'a>) -> Result<(), Rejected<Connect<'a>>> {
        if self.state != State::Disconnected {
            return Err(Rejected::new(Error::InvalidState, connect));
        }
        if let Err(invalid) = connect.validate() {
            return Err(Rejected::new(invalid, connect));
        }
        if self.connect_store.is_full() {
            return Err(Rejected::new(Error::StoreFull, connect));
        }
        let clean_session = connect.clean_session;
        let keep_alive = connect.keep_alive;

        self.tx.reset();
        self.rx.reset();
        self.rx.expect_connack();
        if clean_session {
            self.rx.forget_received();
        }
        self.write_start = 0;
        self.write_end = 0;
        self.read_start = 0;
        self.read_end = 0;
        self.disconnect_written = false;

        // capacity checked above
        let _ = self
            .connect_store
            .append(Kind::Connect, Value::Connect(connect));

        let now = self.clock.now();
        self.state = State::Connecting;
        self.keep_alive = Duration::from_secs(keep_alive.into());
        self.connect_at = now;
        self.last_sent = now;
        self.ping_at = None;
        self.last_error = None;
        debug!("connecting, keep alive {}s", keep_alive);
        Ok(())
    }

    /// Queues a PUBLISH and returns its packet identifier (0 for QoS 0).
    pub fn publish(&mut self, publish: Publish<'a>) -> Result<u16, Rejected<Publish<'a>>> {
        if let Err(invalid) = publish.validate() {
            return Err(Rejected::new(invalid, publish));
        }
        let kind = match publish.qos {
            QoS::AtMostOnce => Kind::Publish0,
            QoS::AtLeastOnce => Kind::Publish1,
            QoS::ExactlyOnce => Kind::Publish2,
        };
        if let Err(error) = self.admit() {
            return Err(Rejected::new(error, publish));
        }
        let id = self.store.append(kind, Value::Publish(publish)).unwrap_or_default();
        trace!("queued publish {}", id);
        Ok(id)
    }

    /// Queues a SUBSCRIBE and returns its packet identifier.
    pub fn subscribe(&mut self, subscribe: Subscribe<'a>) -> Result<u16, Rejected<Subscribe<'a>>> {
        self.queue_subscription(Kind::Subscribe, subscribe)
    }

    /// Queues an UNSUBSCRIBE and returns its packet identifier.
    pub fn unsubscribe(&mut self, unsubscribe: Subscribe<'a>) -> Result<u16, Rejected<Subscribe<'a>>> {
        self.queue_subscription(Kind::Unsubscribe, unsubscribe)
    }

    fn queue_subscription(
        &mut self,
        kind: Kind,
        subscribe: Subscribe<'a>,
    ) -> Result<u16, Rejected<Subscribe<'a>>> {
        if let Err(invalid) = subscribe.validate(kind == Kind::Unsubscribe) {
            return Err(Rejected::new(invalid, subscribe));
        }
        if let Err(error) = self.admit() {
            return Err(Rejected::new(error, subscribe));
        }
        let id = self
            .store
            .append(kind, Value::Subscribe(subscribe))
            .unwrap_or_default();
        trace!("queued {:?} {}", kind, id);
        Ok(id)
    }

    fn admit(&self) -> Result<(), Error> {
        match self.state {
            State::Failed | State::Finalized => Err(Error::InvalidState),
            _ if self.store.is_full() => Err(Error::StoreFull),
            _ => Ok(()),
        }
    }

    /// Queues a DISCONNECT behind everything already queued.
    ///
    /// Only allowed while [`State::Connected`]. The handler's
    /// [`on_disconnect`](Handler::on_disconnect) fires once the packet has
    /// been written to the connection.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        if self.state != State::Connected {
            return Err(Error::InvalidState);
        }
        self.store
            .append(Kind::Disconnect, Value::None)
            .map_err(|_| Error::StoreFull)?;
        self.state = State::Disconnecting;
        debug!("disconnecting");
        Ok(())
    }

    /// Encodes queued packets and writes them to the connection until it
    /// would block or nothing is left.
    pub fn process_output(&mut self) -> IoStatus {
        if matches!(self.state, State::Failed | State::Finalized) {
            return IoStatus::Error;
        }
        loop {
            while self.write_start < self.write_end {
                match self
                    .connection
                    .write(&self.write_buf[self.write_start..self.write_end])
                {
                    Ok(0) => return IoStatus::BlockConn,
                    Ok(n) => self.write_start += n,
                    Err(e) if e.is_would_block() => return IoStatus::BlockConn,
                    Err(e) => return self.fail(Error::Write(e.os_error())),
                }
            }
            self.write_start = 0;
            self.write_end = 0;

            if self.disconnect_written {
                self.disconnect_written = false;
                self.state = State::Disconnected;
                self.store.unmark_all();
                info!("disconnected");
                self.handler.on_disconnect(true);
            }
            if self.tx.is_closed() {
                return IoStatus::Ready;
            }

            let encoded = if self.state == State::Connecting {
                self.tx
                    .encode(&mut self.connect_store, &mut self.handler, &mut self.write_buf)
            } else {
                self.rx.release_replies(&mut self.store);
                self.tx
                    .encode(&mut self.store, &mut self.handler, &mut self.write_buf)
            };
            self.write_end = encoded.written;
            if encoded.packets > 0 {
                self.last_sent = self.clock.now();
            }
            if encoded.disconnect {
                self.disconnect_written = true;
            }
            match encoded.status {
                TxStatus::Failed(error) => return self.fail(error),
                TxStatus::WouldBlock if encoded.written == 0 => return IoStatus::BlockData,
                TxStatus::Ok if encoded.written == 0 && !self.disconnect_written => {
                    return IoStatus::BlockData;
                }
                _ => {}
            }
        }
    }

    /// Reads from the connection and decodes until it would block.
    ///
    /// A zero-byte read means the broker closed the connection: the session
    /// returns to [`State::Disconnected`] and `Ready` is reported.
    pub fn process_input(&mut self) -> IoStatus {
        if matches!(self.state, State::Failed | State::Finalized) {
            return IoStatus::Error;
        }
        loop {
            if self.read_start < self.read_end {
                let (used, decoded) = self.rx.decode(
                    &self.read_buf[self.read_start..self.read_end],
                    &mut self.store,
                    &mut self.handler,
                );
                self.read_start += used;
                match decoded {
                    Decoded::Pending => {}
                    Decoded::Connack(connack) => {
                        if let Err(error) = self.on_connack(connack) {
                            return self.fail(error);
                        }
                    }
                    Decoded::Pingresp => {
                        if self.ping_at.take().is_none() {
                            return self.fail(DecodeError::UnexpectedPacket.into());
                        }
                        trace!("pong");
                    }
                    Decoded::WouldBlock => return IoStatus::BlockData,
                    Decoded::Failed(error) => return self.fail(error),
                }
                continue;
            }

            self.read_start = 0;
            self.read_end = 0;
            match self.connection.read(&mut self.read_buf) {
                Ok(0) => {
                    self.close();
                    return IoStatus::Ready;
                }
                Ok(n) => self.read_end = n,
                Err(e) if e.is_would_block() => return IoStatus::BlockConn,
                Err(e) => return self.fail(Error::Read(e.os_error())),
            }
        }
    }

    fn on_connack(&mut self, connack: Connack) -> Result<(), Error> {
        let Some(Value::Connect(mut connect)) = self.connect_store.pop_marked_by(Kind::Connect, 0)
        else {
            return Err(DecodeError::UnexpectedPacket.into());
        };
        connect.response = Some(connack);
        if connack.return_code == ConnackCode::Accepted {
            info!("connected, session present: {}", connack.session_present);
            self.state = State::Connected;
            self.handler.on_connect(connect, true);
        } else {
            warn!("connection refused: {:?}", connack.return_code);
            self.state = State::Disconnected;
            self.tx.close();
            self.last_error = Some(Error::ConnectionRefused(connack.return_code));
            self.handler.on_connect(connect, false);
        }
        Ok(())
    }

    /// The broker closed the connection.
    fn close(&mut self) {
        info!("connection closed by peer");
        // tx only ever works on the main store outside the handshake
        let partial = self.tx.in_progress() && self.state != State::Connecting;
        self.state = State::Disconnected;
        self.tx.close();
        self.rx.reset();
        self.write_start = 0;
        self.write_end = 0;
        self.ping_at = None;
        self.abandon_disconnect();

        while let Some(entry) = self.connect_store.shift() {
            handler::complete(&mut self.handler, entry, false);
        }
        if partial && self.store.peek_current().is_some_and(|e| e.kind == Kind::Publish0) {
            if let Some(entry) = self.store.drop_current() {
                handler::complete(&mut self.handler, entry, false);
            }
        }
        while let Some(entry) = self.store.remove_first(|e| {
            matches!(
                e.kind,
                Kind::Pingreq | Kind::Disconnect | Kind::Puback | Kind::Pubrec | Kind::Pubcomp
            )
        }) {
            handler::complete(&mut self.handler, entry, false);
        }
        self.store.unmark_all();
    }

    fn fail(&mut self, error: Error) -> IoStatus {
        warn!("session failed: {:?}", error);
        self.last_error = Some(error);
        self.state = State::Failed;
        self.tx.close();
        self.abandon_disconnect();
        self.drain();
        IoStatus::Error
    }

    // a DISCONNECT encoded but never flushed completes as failed
    fn abandon_disconnect(&mut self) {
        if self.disconnect_written {
            self.disconnect_written = false;
            self.handler.on_disconnect(false);
        }
    }

    fn drain(&mut self) {
        while let Some(entry) = self.connect_store.shift() {
            handler::complete(&mut self.handler, entry, false);
        }
        while let Some(entry) = self.store.shift() {
            handler::complete(&mut self.handler, entry, false);
        }
    }

    /// Drives the connect and keep-alive timers.
    ///
    /// While connected with a non-zero keep-alive, a PINGREQ is queued once
    /// the keep-alive interval has passed since the last packet was written.
    /// The session fails when the CONNACK or the PINGRESP is overdue.
    pub fn keep_alive(&mut self) -> IoStatus {
        let now = self.clock.now();
        match self.state {
            State::Failed | State::Finalized => return IoStatus::Error,
            State::Connecting => {
                if self.connect_deadline().is_some_and(|deadline| now >= deadline) {
                    return self.fail(Error::ConnectTimeout);
                }
            }
            State::Connected if !self.keep_alive.is_zero() => match self.ping_at {
                Some(_) => {
                    if self.ping_deadline().is_some_and(|deadline| now >= deadline) {
                        return self.fail(Error::PingTimeout);
                    }
                }
                None if now >= self.last_sent + self.keep_alive => {
                    match self.store.append(Kind::Pingreq, Value::None) {
                        Ok(_) => {
                            trace!("ping");
                            self.ping_at = Some(now);
                        }
                        Err(_) => debug!("store full, ping deferred"),
                    }
                }
                None => {}
            },
            _ => {}
        }
        IoStatus::Ready
    }

    fn connect_deadline(&self) -> Option<Duration> {
        let timeout = self.config.default_timeout;
        (self.state == State::Connecting && timeout > 0)
            .then(|| self.connect_at + Duration::from_secs(timeout.into()))
    }

    fn ping_deadline(&self) -> Option<Duration> {
        if self.state != State::Connected || self.keep_alive.is_zero() {
            return None;
        }
        Some(match self.ping_at {
            Some(at) => {
                let window = match self.config.default_timeout {
                    0 => self.keep_alive,
                    secs => Duration::from_secs(secs.into()),
                };
                at + window
            }
            None => self.last_sent + self.keep_alive,
        })
    }

    /// Time left until [`keep_alive`](Self::keep_alive) has work to do, or
    /// `None` when no timer is running.
    pub fn get_timeout(&self) -> Option<Duration> {
        let deadline = self.connect_deadline().or_else(|| self.ping_deadline())?;
        Some(deadline.saturating_sub(self.clock.now()))
    }

    /// Fails every pending request and shuts the session down for good.
    ///
    /// Each request still held by the session gets exactly one completion
    /// callback with `succeeded == false`.
    pub fn finalize(&mut self) {
        debug!("finalizing with {} pending", self.pending_requests());
        self.abandon_disconnect();
        self.drain();
        self.state = State::Finalized;
        self.tx.close();
        self.ping_at = None;
    }
}

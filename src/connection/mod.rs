//! The connection engine: one logical session slot driven by a background task.
//!
//! `connect` performs the TCP/TLS connect and the upgrade handshake in the calling task. Once
//! the connection is open a session task takes over the socket. It reads frames, answers control
//! frames, writes everything queued by the `send_*` functions, runs the close handshake and,
//! when configured, reconnects after a lost connection. Observer callbacks are delivered by a
//! separate dispatcher task.

mod dispatch;
mod handshake;
mod session;
mod split;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{frame::Frame, ConnectionObserver, Options, Result, WebSocketError};

use handshake::Target;
use session::{Command, Session};

/// Lifecycle of a connection.
///
/// ```text
/// Disconnected -> Connecting -> Handshaking -> Open -> Closing -> Disconnected
/// ```
///
/// A connection waiting to reconnect is `Disconnected`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Handshaking,
    Open,
    Closing,
}

#[derive(Default)]
struct Slot {
    state: ConnectionState,
    /// Bumped whenever the slot is handed to a new session or taken away from the current one.
    generation: u64,
    /// Queue of the open session.
    commands: Option<mpsc::UnboundedSender<Command>>,
    /// Cancels the in-flight connect or pending reconnect of the current session.
    cancel: CancellationToken,
    /// Fired by `disconnect` while open or closing; bounds the writes still in flight.
    closing: CancellationToken,
    /// The caller asked to close; the session must not reconnect.
    close_requested: bool,
}

/// State shared between the handles and the session task.
///
/// Sessions carry the generation they were started with and may only update the slot while it
/// still matches, so a superseded session can never touch it.
#[derive(Default)]
pub(crate) struct Shared {
    slot: Mutex<Slot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the slot for a new session.
    fn begin(&self) -> Result<(u64, CancellationToken)> {
        let mut slot = self.lock();
        if slot.state != ConnectionState::Disconnected {
            return Err(WebSocketError::AlreadyConnected);
        }

        // a reconnect may still be pending
        slot.cancel.cancel();
        slot.cancel = CancellationToken::new();
        slot.generation += 1;
        slot.state = ConnectionState::Connecting;
        slot.commands = None;
        slot.close_requested = false;

        Ok((slot.generation, slot.cancel.clone()))
    }

    pub(crate) fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        slot.state = state;
        true
    }

    pub(crate) fn open(
        &self,
        generation: u64,
        commands: mpsc::UnboundedSender<Command>,
        closing: CancellationToken,
    ) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        slot.state = ConnectionState::Open;
        slot.commands = Some(commands);
        slot.closing = closing;
        true
    }

    /// Returns `true` once the caller has asked to close, or the session was superseded.
    pub(crate) fn close_requested(&self, generation: u64) -> bool {
        let slot = self.lock();
        slot.generation != generation || slot.close_requested
    }

    /// Returns the slot to `Disconnected` ahead of a reconnect. Returns `false`, leaving the slot
    /// alone, if the caller asked to close or the session was superseded.
    pub(crate) fn suspend(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation || slot.close_requested {
            return false;
        }
        slot.state = ConnectionState::Disconnected;
        slot.commands = None;
        true
    }

    /// Returns the slot to `Disconnected`. Returns `false` if the session was superseded.
    pub(crate) fn release(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        slot.state = ConnectionState::Disconnected;
        slot.commands = None;
        true
    }
}

/// Releases the slot if `connect` is dropped before it finishes.
struct PendingConnect<'a> {
    shared: &'a Shared,
    generation: u64,
    armed: bool,
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release(self.generation);
        }
    }
}

/// A client WebSocket connection.
///
/// The handle is cheap to clone; all clones drive the same connection. A connection can be
/// opened again after it was closed.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use securews::{CloseNotification, ConnectionObserver, Options, WebSocketConnection};
///
/// struct Echo(WebSocketConnection);
///
/// impl ConnectionObserver for Echo {
///     fn on_open(&self) {}
///     fn on_close(&self, _code: CloseNotification, _reason: &str) {}
///
///     fn on_text_message(&self, payload: String) {
///         // callbacks may call back into the connection
///         let _ = self.0.send_text_message(payload);
///     }
///
///     fn on_binary_message(&self, _payload: Bytes) {}
/// }
///
/// # async fn run() -> securews::Result<()> {
/// let connection = WebSocketConnection::new();
/// let observer = Arc::new(Echo(connection.clone()));
/// connection
///     .connect("wss://echo.example.com".parse()?, observer, Options::default())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct WebSocketConnection {
    shared: Arc<Shared>,
    connector: Option<TlsConnector>,
}

impl WebSocketConnection {
    /// Creates a disconnected connection using the webpki root certificates for `wss://`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a disconnected connection using `connector` for `wss://`.
    pub fn with_connector(connector: TlsConnector) -> Self {
        Self {
            shared: Arc::default(),
            connector: Some(connector),
        }
    }

    /// Opens the connection.
    ///
    /// Resolves once the handshake has completed (after `on_open` was queued) or failed. Failures
    /// are both returned and reported to `observer` through `on_close`, except
    /// [`WebSocketError::AlreadyConnected`] and [`WebSocketError::Cancelled`], which are only
    /// returned. `options` is copied; later changes to it have no effect on this connection.
    pub async fn connect(
        &self,
        url: Url,
        observer: Arc<dyn ConnectionObserver>,
        options: Options,
    ) -> Result<()> {
        let (generation, cancel) = self.shared.begin()?;
        let mut pending = PendingConnect {
            shared: &self.shared,
            generation,
            armed: true,
        };
        let events = dispatch::spawn(observer);

        #[cfg(feature = "logging")]
        log::debug!("connecting to {url}");

        if let Err(err) = handshake::check_url(&url) {
            if self.shared.release(generation) {
                events.close(err.notification(), err.reason());
            }
            pending.armed = false;
            return Err(err);
        }

        let session = Session::new(
            Arc::clone(&self.shared),
            generation,
            cancel,
            Target {
                url,
                options,
                connector: self.connector.clone(),
            },
            events.clone(),
        );

        let result = session.establish().await;
        pending.armed = false;

        match result {
            Ok(stream) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let closing = CancellationToken::new();
                if !self.shared.open(generation, tx, closing.clone()) {
                    return Err(WebSocketError::Cancelled);
                }
                events.open();
                tokio::spawn(session.run(stream, rx, closing));
                Ok(())
            }
            Err(WebSocketError::Cancelled) => Err(WebSocketError::Cancelled),
            Err(err) => {
                #[cfg(feature = "logging")]
                log::debug!("connect failed: {err}");

                if self.shared.release(generation) {
                    events.close(err.notification(), err.reason());
                }
                Err(err)
            }
        }
    }

    /// Closes the connection.
    ///
    /// An open connection sends a normal closure (1000) after everything already queued, and
    /// reports `on_close(ConnectionLost, ..)` once the close handshake ends. Writes still in
    /// flight get at most the close timeout to finish. A connection closed this way, or while
    /// the server is closing it, never reconnects. In any other state this cancels an in-flight
    /// connect or a pending reconnect. Calling it again is a no-op.
    pub fn disconnect(&self) {
        let mut slot = self.shared.lock();
        match slot.state {
            ConnectionState::Open => {
                let queued = slot
                    .commands
                    .as_ref()
                    .is_some_and(|commands| commands.send(Command::Close).is_ok());
                if queued {
                    slot.state = ConnectionState::Closing;
                    slot.close_requested = true;
                    slot.closing.cancel();
                } else {
                    slot.cancel.cancel();
                    slot.generation += 1;
                    slot.state = ConnectionState::Disconnected;
                    slot.commands = None;
                }
            }
            ConnectionState::Closing => {
                slot.close_requested = true;
                slot.closing.cancel();
            }
            ConnectionState::Disconnected
            | ConnectionState::Connecting
            | ConnectionState::Handshaking => {
                slot.cancel.cancel();
                slot.generation += 1;
                slot.state = ConnectionState::Disconnected;
                slot.commands = None;
            }
        }
    }

    /// Returns `true` while the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Queues a text message.
    ///
    /// # Errors
    /// [`WebSocketError::NotConnected`] unless the connection is open; nothing is sent then.
    pub fn send_text_message(&self, text: impl Into<String>) -> Result<()> {
        let text: String = text.into();
        self.send(Frame::text(text))
    }

    /// Queues a text message whose payload is already UTF-8 encoded.
    pub fn send_raw_text_message(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.send(Frame::text(payload))
    }

    /// Queues a binary message.
    pub fn send_binary_message(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.send(Frame::binary(payload))
    }

    /// Serializes `value` to JSON and queues it as a text message.
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    pub fn send_json<T: serde::Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.send_text_message(text)
    }

    fn send(&self, frame: Frame) -> Result<()> {
        let slot = self.shared.lock();
        if slot.state != ConnectionState::Open {
            return Err(WebSocketError::NotConnected);
        }
        let commands = slot.commands.as_ref().ok_or(WebSocketError::NotConnected)?;
        commands
            .send(Command::Send(frame))
            .map_err(|_| WebSocketError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_requires_open() {
        let connection = WebSocketConnection::new();
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(!connection.is_connected());
        assert!(matches!(
            connection.send_text_message("hello"),
            Err(WebSocketError::NotConnected)
        ));
        assert!(matches!(
            connection.send_binary_message(vec![1, 2, 3]),
            Err(WebSocketError::NotConnected)
        ));
        assert!(matches!(
            connection.send_raw_text_message("raw"),
            Err(WebSocketError::NotConnected)
        ));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let connection = WebSocketConnection::new();
        connection.disconnect();
        connection.disconnect();
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_begin_claims_slot_once() {
        let shared = Shared::default();
        let (generation, cancel) = shared.begin().unwrap();
        assert!(matches!(
            shared.begin(),
            Err(WebSocketError::AlreadyConnected)
        ));

        assert!(shared.release(generation));
        let (next, _) = shared.begin().unwrap();
        assert!(cancel.is_cancelled());
        assert!(next > generation);
        assert!(!shared.transition(generation, ConnectionState::Open));
    }

    #[test]
    fn test_disconnect_supersedes_pending_session() {
        let connection = WebSocketConnection::new();
        let (generation, cancel) = connection.shared.begin().unwrap();
        assert_eq!(connection.state(), ConnectionState::Connecting);

        connection.disconnect();
        assert!(cancel.is_cancelled());
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!connection.shared.open(generation, tx, CancellationToken::new()));
        assert!(!connection.is_connected());
    }

    #[test]
    fn test_disconnect_during_server_close_blocks_reconnect() {
        let connection = WebSocketConnection::new();
        let (generation, _) = connection.shared.begin().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let closing = CancellationToken::new();
        assert!(connection.shared.open(generation, tx, closing.clone()));
        assert!(!connection.shared.close_requested(generation));

        // the server started the close handshake
        assert!(connection
            .shared
            .transition(generation, ConnectionState::Closing));
        connection.disconnect();

        assert!(closing.is_cancelled());
        assert!(connection.shared.close_requested(generation));
        assert_eq!(connection.state(), ConnectionState::Closing);

        connection.disconnect();
        assert!(connection.shared.close_requested(generation));

        // the session may not hand the slot over to a reconnect, only finish
        assert!(!connection.shared.suspend(generation));
        assert_eq!(connection.state(), ConnectionState::Closing);
        assert!(connection.shared.release(generation));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_close_request_cleared_by_next_connect() {
        let shared = Shared::default();
        let (generation, _) = shared.begin().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(shared.open(generation, tx, CancellationToken::new()));
        shared.lock().close_requested = true;
        assert!(shared.release(generation));

        let (next, _) = shared.begin().unwrap();
        assert!(!shared.close_requested(next));
        assert!(shared.close_requested(generation));
    }

    #[test]
    fn test_disconnect_from_open_queues_close() {
        let connection = WebSocketConnection::new();
        let (generation, _) = connection.shared.begin().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(connection.shared.open(generation, tx, CancellationToken::new()));

        connection.send_text_message("first").unwrap();
        connection.disconnect();
        assert_eq!(connection.state(), ConnectionState::Closing);
        assert!(connection.shared.close_requested(generation));
        assert!(matches!(
            connection.send_text_message("late"),
            Err(WebSocketError::NotConnected)
        ));

        assert!(matches!(rx.try_recv(), Ok(Command::Send(_))));
        assert!(matches!(rx.try_recv(), Ok(Command::Close)));
        assert!(rx.try_recv().is_err());
    }
}

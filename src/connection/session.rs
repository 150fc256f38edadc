//! The task that owns an open connection.
use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    close::CloseCode, frame::Frame, CloseNotification, Result, WebSocketError,
};

use super::{
    dispatch::{Event, EventSender},
    handshake::{Target, WsStream},
    split::{Incoming, ReadHalf, WriteHalf},
    ConnectionState, Shared,
};

/// How long the close handshake may take before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Work queued for the session by the connection handles.
#[derive(Debug)]
pub(crate) enum Command {
    Send(Frame),
    /// Start the closing handshake with a normal closure.
    Close,
}

/// How one open period of the connection ended.
enum Outcome {
    /// The close handshake we started has finished.
    Closed,
    /// The transport failed or the server closed; a reconnect may follow.
    Lost(String),
    /// The server broke the protocol; a close frame was sent.
    Failed(WebSocketError),
    /// A write made no progress in time. The socket is dropped without flushing.
    Stalled {
        /// A close had been requested when the write gave up.
        closing: bool,
    },
    /// Superseded by a newer session.
    Cancelled,
}

/// Result of waiting for the next frame.
enum Read {
    Frame(Frame),
    Timeout,
    Eof,
    Error(WebSocketError),
}

async fn next_frame(stream: &mut WsStream, timeout: Option<Duration>) -> Read {
    let next = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Read::Timeout,
        },
        None => stream.next().await,
    };

    match next {
        Some(Ok(frame)) => Read::Frame(frame),
        Some(Err(err)) => Read::Error(err),
        None => Read::Eof,
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

pub(crate) struct Session {
    shared: Arc<Shared>,
    generation: u64,
    cancel: CancellationToken,
    /// Fired by `disconnect` for the currently open socket.
    closing: CancellationToken,
    target: Target,
    events: EventSender,
}

impl Session {
    pub fn new(
        shared: Arc<Shared>,
        generation: u64,
        cancel: CancellationToken,
        target: Target,
        events: EventSender,
    ) -> Self {
        Self {
            shared,
            generation,
            cancel,
            closing: CancellationToken::new(),
            target,
            events,
        }
    }

    /// Connects and performs the handshake unless cancelled first.
    pub async fn establish(&self) -> Result<WsStream> {
        let on_handshake = || {
            self.shared
                .transition(self.generation, ConnectionState::Handshaking);
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WebSocketError::Cancelled),
            result = self.target.establish(on_handshake) => result,
        }
    }

    /// Drives the connection until it is closed for good.
    pub async fn run(
        mut self,
        mut stream: WsStream,
        mut commands: UnboundedReceiver<Command>,
        closing: CancellationToken,
    ) {
        self.closing = closing;

        loop {
            let outcome = self.serve(&mut stream, &mut commands).await;
            if !matches!(outcome, Outcome::Stalled { .. }) {
                // the close frame, if any, is already out
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, stream.close()).await;
            }

            let reason = match outcome {
                Outcome::Cancelled => return,
                Outcome::Closed | Outcome::Stalled { closing: true } => {
                    self.finish(
                        CloseNotification::ConnectionLost,
                        "WebSockets connection closed",
                    );
                    return;
                }
                Outcome::Failed(err) => {
                    self.finish(err.notification(), err.reason());
                    return;
                }
                Outcome::Stalled { closing: false } => {
                    "WebSockets connection lost: write timed out".to_string()
                }
                Outcome::Lost(reason) => reason,
            };

            match self.target.options.reconnect_interval() {
                Some(interval) => match self.reconnect(interval, reason).await {
                    Some((next_stream, next_commands)) => {
                        stream = next_stream;
                        commands = next_commands;
                    }
                    None => return,
                },
                None => {
                    self.finish(CloseNotification::ConnectionLost, reason);
                    return;
                }
            }
        }
    }

    async fn serve(
        &mut self,
        stream: &mut WsStream,
        commands: &mut UnboundedReceiver<Command>,
    ) -> Outcome {
        let options = self.target.options;
        let receive_timeout = options.socket_receive_timeout();
        let max_missed = options.max_missed_receive_timeouts();

        let mut read_half = ReadHalf::new(&options);
        let mut write_half = WriteHalf::new(&options);
        // pongs owed to the server, written before anything else
        let mut obligated_sends = VecDeque::new();
        let mut missed = 0u32;
        let mut close_deadline: Option<Instant> = None;

        loop {
            while let Some(frame) = obligated_sends.pop_front() {
                if let Err(outcome) = self
                    .write(stream, &mut write_half, frame, close_deadline)
                    .await
                {
                    return outcome;
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                command = commands.recv(), if close_deadline.is_none() => match command {
                    Some(Command::Send(frame)) => {
                        if let Err(outcome) = self.write(stream, &mut write_half, frame, None).await {
                            return outcome;
                        }
                    }
                    Some(Command::Close) | None => {
                        #[cfg(feature = "logging")]
                        log::debug!("closing connection");

                        let deadline = Instant::now() + CLOSE_TIMEOUT;
                        let frame = Frame::close(CloseCode::Normal, "");
                        if let Err(outcome) = self
                            .write(stream, &mut write_half, frame, Some(deadline))
                            .await
                        {
                            return outcome;
                        }
                        close_deadline = Some(deadline);
                    }
                },
                _ = tokio::time::sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                    #[cfg(feature = "logging")]
                    log::debug!("close handshake timed out");
                    return Outcome::Closed;
                }
                read = next_frame(stream, receive_timeout) => match read {
                    Read::Timeout => {
                        if close_deadline.is_none() {
                            missed += 1;
                            if max_missed > 0 && missed >= max_missed {
                                return Outcome::Lost(format!(
                                    "WebSockets connection lost (no data for {missed} receive timeouts)"
                                ));
                            }
                        }
                    }
                    Read::Eof => {
                        if close_deadline.is_some() {
                            return Outcome::Closed;
                        }
                        return Outcome::Lost("WebSockets connection lost".to_string());
                    }
                    Read::Error(_err) if close_deadline.is_some() => {
                        #[cfg(feature = "logging")]
                        log::debug!("error while closing: {_err}");
                        return Outcome::Closed;
                    }
                    Read::Error(err) if err.is_protocol_violation() => {
                        return self.fail(stream, &mut write_half, err).await;
                    }
                    Read::Error(err) => return lost(err),
                    Read::Frame(frame) => {
                        missed = 0;
                        let event = match read_half.on_frame(frame) {
                            Ok(Some(event)) => event,
                            Ok(None) => continue,
                            Err(_) if close_deadline.is_some() => return Outcome::Closed,
                            Err(err) => return self.fail(stream, &mut write_half, err).await,
                        };

                        match event {
                            Incoming::Text(text) => self.events.send(Event::Text(text)),
                            Incoming::RawText(payload) => self.events.send(Event::RawText(payload)),
                            Incoming::Binary(payload) => self.events.send(Event::Binary(payload)),
                            Incoming::Ping(payload) => {
                                if !write_half.is_close_sent() {
                                    obligated_sends.push_back(Frame::pong(payload));
                                }
                            }
                            Incoming::Pong(_payload) => {
                                #[cfg(feature = "logging")]
                                log::trace!("pong: {} bytes", _payload.len());
                            }
                            Incoming::Close { code, reason, payload } => {
                                if write_half.is_close_sent() {
                                    return Outcome::Closed;
                                }

                                #[cfg(feature = "logging")]
                                log::debug!("server closed the connection: {code:?} {reason}");

                                self.shared.transition(self.generation, ConnectionState::Closing);
                                let echo = Frame::close_raw(payload);
                                let deadline = Instant::now() + CLOSE_TIMEOUT;
                                if let Err(outcome @ (Outcome::Cancelled | Outcome::Stalled { .. })) = self
                                    .write(stream, &mut write_half, echo, Some(deadline))
                                    .await
                                {
                                    return outcome;
                                }

                                let code = code.map_or_else(|| "no status".to_string(), |code| code.to_string());
                                return Outcome::Lost(format!("closed by server ({code}): {reason}"));
                            }
                        }
                    }
                },
            }
        }
    }

    /// How long a single write may take before the peer is considered dead, when the receive
    /// policy declares dead peers at all.
    fn write_timeout(&self) -> Option<Duration> {
        let options = &self.target.options;
        match options.max_missed_receive_timeouts() {
            0 => None,
            missed => options.socket_receive_timeout().map(|timeout| timeout * missed),
        }
    }

    /// Writes one frame.
    ///
    /// The write gives up once the session is cancelled, once it outlasts the write timeout, or
    /// once it passes `close_deadline`. A `disconnect` while the write is pending starts a close
    /// deadline of its own.
    async fn write(
        &self,
        stream: &mut WsStream,
        write_half: &mut WriteHalf,
        frame: Frame,
        mut close_deadline: Option<Instant>,
    ) -> std::result::Result<(), Outcome> {
        let frame = match write_half.prepare(frame) {
            Ok(frame) => frame,
            Err(_) => return Err(Outcome::Closed),
        };
        let stall_deadline = self.write_timeout().map(|timeout| Instant::now() + timeout);

        let send = stream.send(frame);
        tokio::pin!(send);

        loop {
            let deadline = earliest(stall_deadline, close_deadline);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Outcome::Cancelled),
                result = &mut send => {
                    return match result {
                        Ok(()) => Ok(()),
                        Err(_) if close_deadline.is_some() => Err(Outcome::Closed),
                        Err(err) => Err(lost(err)),
                    };
                }
                _ = self.closing.cancelled(), if close_deadline.is_none() => {
                    close_deadline = Some(Instant::now() + CLOSE_TIMEOUT);
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    #[cfg(feature = "logging")]
                    log::debug!("write timed out");
                    return Err(Outcome::Stalled {
                        closing: close_deadline.is_some(),
                    });
                }
            }
        }
    }

    /// Reports a protocol violation to the server before giving up on the connection.
    async fn fail(
        &self,
        stream: &mut WsStream,
        write_half: &mut WriteHalf,
        err: WebSocketError,
    ) -> Outcome {
        #[cfg(feature = "logging")]
        log::warn!("protocol violation: {err}");

        if !write_half.is_close_sent() {
            let frame = Frame::close(err.close_code(), err.to_string());
            let deadline = Instant::now() + CLOSE_TIMEOUT;
            if let Err(Outcome::Cancelled) = self.write(stream, write_half, frame, Some(deadline)).await {
                return Outcome::Cancelled;
            }
        }

        Outcome::Failed(err)
    }

    /// Keeps reopening the connection after a loss until it opens, fails for a reason other
    /// than the transport, the caller closes it, or the session is cancelled.
    async fn reconnect(
        &mut self,
        interval: Duration,
        mut reason: String,
    ) -> Option<(WsStream, UnboundedReceiver<Command>)> {
        loop {
            if !self.shared.suspend(self.generation) {
                // closed by the caller, unless superseded
                self.finish(CloseNotification::ConnectionLost, reason);
                return None;
            }

            #[cfg(feature = "logging")]
            log::info!("reconnecting in {interval:?}: {reason}");

            self.events.close(CloseNotification::Reconnect, reason);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(interval) => {}
            }

            if !self
                .shared
                .transition(self.generation, ConnectionState::Connecting)
            {
                return None;
            }

            match self.establish().await {
                Ok(stream) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let closing = CancellationToken::new();
                    if !self.shared.open(self.generation, tx, closing.clone()) {
                        return None;
                    }
                    self.closing = closing;
                    self.events.open();
                    return Some((stream, rx));
                }
                Err(WebSocketError::Cancelled) => return None,
                Err(err) if err.is_transport() => reason = err.reason(),
                Err(err) => {
                    self.finish(err.notification(), err.reason());
                    return None;
                }
            }
        }
    }

    fn finish(&self, code: CloseNotification, reason: impl Into<String>) {
        if self.shared.release(self.generation) {
            #[cfg(feature = "logging")]
            log::debug!("connection ended: {code}");

            self.events.close(code, reason);
        }
    }
}

fn lost(err: WebSocketError) -> Outcome {
    #[cfg(feature = "logging")]
    log::debug!("transport error: {err}");

    Outcome::Lost(format!("WebSockets connection lost: {err}"))
}

use std::fmt;

use bytes::Bytes;

/// Why a connection ended, or why it never opened.
///
/// Passed to [`ConnectionObserver::on_close`] together with a human readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseNotification {
    /// The TCP/TLS connection could not be established.
    CannotConnect,
    /// An open connection was lost, or closed by either side.
    ConnectionLost,
    /// The server violated the WebSocket protocol, in the handshake or on an open connection.
    ProtocolError,
    /// Something unexpected happened inside the engine.
    InternalError,
    /// The server answered the handshake with a 5xx status.
    ServerError,
    /// The connection was lost and a reconnect attempt is scheduled.
    Reconnect,
}

impl fmt::Display for CloseNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CannotConnect => "CANNOT_CONNECT",
            Self::ConnectionLost => "CONNECTION_LOST",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::Reconnect => "RECONNECT",
        };
        f.write_str(name)
    }
}

/// Callbacks invoked by a [`WebSocketConnection`](crate::WebSocketConnection).
///
/// Callbacks run one at a time, in the order the events happened, on a task separate from the
/// connection's I/O. They may freely call back into the connection, for example to send a reply
/// or to disconnect.
pub trait ConnectionObserver: Send + Sync + 'static {
    /// The opening handshake (or a reconnect) completed.
    fn on_open(&self);

    /// The connection closed, failed to open, or is about to be reopened.
    fn on_close(&self, code: CloseNotification, reason: &str);

    /// A complete text message arrived.
    fn on_text_message(&self, payload: String);

    /// A complete text message arrived while raw text delivery is enabled.
    ///
    /// The payload has been validated as UTF-8 unless validation is disabled. The default
    /// implementation forwards to [`on_text_message`](Self::on_text_message).
    fn on_raw_text_message(&self, payload: Bytes) {
        self.on_text_message(String::from_utf8_lossy(&payload).into_owned());
    }

    /// A complete binary message arrived.
    fn on_binary_message(&self, payload: Bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ConnectionObserver for Recorder {
        fn on_open(&self) {}

        fn on_close(&self, _code: CloseNotification, _reason: &str) {}

        fn on_text_message(&self, payload: String) {
            self.0.lock().unwrap().push(payload);
        }

        fn on_binary_message(&self, _payload: Bytes) {}
    }

    #[test]
    fn test_raw_text_defaults_to_text() {
        let recorder = Recorder::default();
        recorder.on_raw_text_message(Bytes::from_static("grüße".as_bytes()));
        assert_eq!(*recorder.0.lock().unwrap(), vec!["grüße".to_string()]);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(CloseNotification::CannotConnect.to_string(), "CANNOT_CONNECT");
        assert_eq!(CloseNotification::Reconnect.to_string(), "RECONNECT");
    }
}

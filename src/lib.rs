//! # securews
//! Client-side implementation of the WebSocket protocol (RFC 6455) built around a long-lived
//! connection object and an observer callback interface.
//!
//! The crate takes care of everything between "connect to this URL" and "here is a complete text
//! message": TCP and TLS connection setup, the HTTP upgrade handshake, frame decoding and encoding,
//! reassembly of fragmented messages, incremental UTF-8 validation of text payloads, automatic
//! answers to control frames, the closing handshake and optional reconnection after a lost
//! connection.
//!
//! # Features
//! The crate provides a couple of optional features that can be enabled in your `Cargo.toml`:
//!
//! - `logging`: Enables debug logging for connection negotiation and frame processing using the `log` crate.
//!   Useful for debugging WebSocket connections.
//!
//! - `json`: Enables [`WebSocketConnection::send_json`] and the JSON file backed settings store.
//!
//! # Observer Example
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use securews::{CloseNotification, ConnectionObserver, Options, WebSocketConnection};
//!
//! struct Printer;
//!
//! impl ConnectionObserver for Printer {
//!     fn on_open(&self) {
//!         println!("connected");
//!     }
//!
//!     fn on_close(&self, code: CloseNotification, reason: &str) {
//!         println!("closed: {code} ({reason})");
//!     }
//!
//!     fn on_text_message(&self, payload: String) {
//!         println!("{payload}");
//!     }
//!
//!     fn on_binary_message(&self, payload: Bytes) {
//!         println!("<{} bytes>", payload.len());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> securews::Result<()> {
//!     let connection = WebSocketConnection::new();
//!     let options = Options::default().with_reconnect_interval(5_000);
//!
//!     connection
//!         .connect("ws://localhost:9000".parse()?, Arc::new(Printer), options)
//!         .await?;
//!
//!     connection.send_text_message("hello")?;
//!     Ok(())
//! }
//! ```
//!
//! # Memory Safety
//! The crate implements several safety measures:
//! - Frame and message payload size limits, checked before any payload is buffered
//! - Automatic handling of control frames
//! - Incremental UTF-8 validation for text messages, failing on the first bad octet
//! - Masking of every client frame with a fresh random key

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod close;
pub mod codec;
mod connection;
pub mod frame;
mod mask;
pub mod notify;
mod observer;
mod options;
pub mod settings;
mod stream;
pub mod utf8;

use thiserror::Error;

pub use close::CloseCode;
pub use connection::{ConnectionState, WebSocketConnection};
pub use frame::{Frame, FrameHeader, OpCode};
pub use observer::{CloseNotification, ConnectionObserver};
pub use options::Options;
pub use utf8::Utf8Validator;

/// A result type for WebSocket operations, using `WebSocketError` as the error type.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Represents errors that can occur during WebSocket operations.
///
/// The variants fall into five groups, which decide how the error surfaces:
///
/// - Connect errors (bad URL, DNS/TCP failure, connect timeout): returned from
///   [`WebSocketConnection::connect`] and reported as [`CloseNotification::CannotConnect`].
/// - Handshake errors (bad status, missing or incorrect headers): returned from `connect` and
///   reported as [`CloseNotification::ProtocolError`] (or `ServerError` for 5xx responses).
/// - Frame protocol errors: always fatal to the connection; a close frame is sent and the observer
///   is told [`CloseNotification::ProtocolError`].
/// - Transport errors while open: reported as [`CloseNotification::ConnectionLost`] and eligible
///   for automatic reconnection.
/// - Caller misuse (sending while not open): returned synchronously, no notification.
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// Returned when attempting to establish a WebSocket connection with an invalid URL scheme.
    /// Only "ws://" and "wss://" schemes are valid.
    #[error("Invalid http scheme")]
    InvalidHttpScheme,

    /// The WebSocket URL has no host component.
    #[error("URL has no host")]
    MissingHost,

    /// Wraps errors from URL parsing that may occur when processing WebSocket URLs.
    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    /// The TCP (and TLS) connection could not be established within the connect timeout.
    #[error("Connect timed out")]
    ConnectTimeout,

    /// The server did not complete the opening handshake within the connect timeout.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Returned when receiving an HTTP status code that is not valid for WebSocket handshake.
    /// Only 101 (Switching Protocols) is accepted.
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// Indicates that the HTTP "Upgrade" header is either missing or does not contain
    /// the required "websocket" value during connection handshake.
    #[error("Invalid upgrade header")]
    InvalidUpgradeHeader,

    /// Indicates that the HTTP "Connection" header is either missing or does not contain
    /// the required "upgrade" value during connection handshake.
    #[error("Invalid connection header")]
    InvalidConnectionHeader,

    /// The "Sec-WebSocket-Accept" header is missing or does not match the key we sent.
    #[error("Invalid Sec-WebSocket-Accept")]
    InvalidAcceptKey,

    /// Indicates that reserved bits in the WebSocket frame header are set when they
    /// should be 0 by RFC 6455.
    #[error("Reserved bits are not zero")]
    ReservedBitsNotZero,

    /// Indicates receipt of a frame with an invalid opcode value.
    #[error("Invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// A server sent a masked frame. Only client-to-server frames are masked.
    #[error("Server frames must not be masked")]
    MaskedFrame,

    /// Occurs when a control frame (ping, pong, or close) is received with the FIN bit
    /// not set. RFC 6455 requires that control frames must not be fragmented.
    #[error("Control frame must not be fragmented")]
    ControlFrameFragmented,

    /// A control frame carried more than 125 bytes of payload.
    #[error("Control frame too large")]
    ControlFrameTooLarge,

    /// Occurs when a received frame's payload length exceeds the maximum configured size.
    #[error("Frame too large")]
    FrameTooLarge,

    /// The reassembled payload of a fragmented message exceeds the maximum configured size.
    #[error("Message too large")]
    MessageTooLarge,

    /// Occurs when receiving a new data frame before completing the previous fragmented message.
    #[error("Invalid fragment")]
    InvalidFragment,

    /// Occurs when receiving a continuation frame without a preceding initial frame.
    #[error("Invalid continuation frame")]
    InvalidContinuationFrame,

    /// Indicates that a text message or close frame reason contains invalid UTF-8 data.
    #[error("Invalid UTF-8")]
    InvalidUTF8,

    /// Indicates that a received close frame has an invalid format, such as
    /// containing a payload of 1 byte (close frames must be either empty or ≥2 bytes).
    #[error("Invalid close frame")]
    InvalidCloseFrame,

    /// Occurs when a close frame contains a status code that is not valid according to
    /// RFC 6455 (e.g., using reserved codes or codes in invalid ranges).
    #[error("Invalid close code")]
    InvalidCloseCode,

    /// Returned by the send functions when the connection is not open.
    #[error("Not connected")]
    NotConnected,

    /// Returned by `connect` when the connection is already connecting or open.
    #[error("Already connected")]
    AlreadyConnected,

    /// Returned when attempting to write on a connection whose close frame was already sent.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// An in-flight `connect` was aborted by `disconnect` or superseded by another `connect`.
    #[error("Connect cancelled")]
    Cancelled,

    /// Wraps standard I/O errors that may occur during WebSocket communication,
    /// such as connection resets or network timeouts.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Wraps errors from the hyper HTTP library that may occur during the WebSocket
    /// handshake process or connection upgrade.
    #[error(transparent)]
    HTTPError(#[from] hyper::Error),

    /// The upgrade request could not be built from the URL.
    #[error(transparent)]
    HttpRequest(#[from] hyper::http::Error),

    /// Occurs when serialization of JSON data fails.
    /// Only available when the `json` feature is enabled.
    #[cfg(feature = "json")]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WebSocketError {
    /// Returns `true` for errors raised while decoding or reassembling frames.
    ///
    /// These always end the connection with a close frame and a
    /// [`CloseNotification::ProtocolError`].
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::ReservedBitsNotZero
                | Self::InvalidOpCode(_)
                | Self::MaskedFrame
                | Self::ControlFrameFragmented
                | Self::ControlFrameTooLarge
                | Self::FrameTooLarge
                | Self::MessageTooLarge
                | Self::InvalidFragment
                | Self::InvalidContinuationFrame
                | Self::InvalidUTF8
                | Self::InvalidCloseFrame
                | Self::InvalidCloseCode
        )
    }

    /// Returns `true` for failures of the underlying transport, the only kind that is retried
    /// automatically.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::IoError(_) | Self::ConnectTimeout)
    }

    /// The status code sent in the close frame when this error ends a connection.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::FrameTooLarge | Self::MessageTooLarge => CloseCode::Size,
            Self::InvalidUTF8 => CloseCode::Invalid,
            Self::InvalidOpCode(_) => CloseCode::Unsupported,
            err if err.is_protocol_violation() => CloseCode::Protocol,
            _ => CloseCode::Error,
        }
    }

    /// The reason text passed to [`ConnectionObserver::on_close`] along with
    /// [`notification`](Self::notification).
    pub fn reason(&self) -> String {
        match self {
            Self::InvalidStatusCode(status) if *status >= 500 => {
                let text = hyper::StatusCode::from_u16(*status)
                    .ok()
                    .and_then(|status| status.canonical_reason())
                    .unwrap_or("unknown");
                format!("Server error {status} ({text})")
            }
            err if err.is_protocol_violation() => format!("WebSockets protocol violation: {err}"),
            err => err.to_string(),
        }
    }

    /// The observer notification reported when this error ends (or prevents) a connection.
    pub fn notification(&self) -> CloseNotification {
        match self {
            Self::InvalidHttpScheme
            | Self::MissingHost
            | Self::UrlParseError(_)
            | Self::ConnectTimeout
            | Self::IoError(_) => CloseNotification::CannotConnect,
            Self::InvalidStatusCode(status) if *status >= 500 => CloseNotification::ServerError,
            Self::InvalidStatusCode(_)
            | Self::InvalidUpgradeHeader
            | Self::InvalidConnectionHeader
            | Self::InvalidAcceptKey
            | Self::HandshakeTimeout
            | Self::HTTPError(_) => CloseNotification::ProtocolError,
            err if err.is_protocol_violation() => CloseNotification::ProtocolError,
            _ => CloseNotification::InternalError,
        }
    }
}

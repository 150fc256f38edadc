//! # Frame
//!
//! Wire-level descriptors for WebSocket frames as defined in
//! [RFC 6455 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |        Extended payload length continued, if payload len == 127|
//! +---------------------------------------------------------------+
//! |                               |   Masking-key, if MASK set to 1|
//! +-------------------------------+-------------------------------+
//! |     Masking-key (continued)       |          Payload Data      |
//! +-----------------------------------+ - - - - - - - - - - - - - -+
//! ```
//!
//! The module has two halves:
//!
//! - [`FrameHeader`]: everything before the payload. It is parsed from (or encoded into) a byte
//!   buffer and knows its own length, so the decoder can reject a frame before any payload byte
//!   is buffered.
//! - [`Frame`]: a header's worth of metadata together with the payload, as produced by the decoder
//!   and consumed by the encoder.
//!
//! ```rust
//! use securews::frame::{Frame, FrameHeader, OpCode};
//! use securews::CloseCode;
//!
//! let text = Frame::text("Hello, WebSocket!");
//! let close = Frame::close(CloseCode::Normal, "bye");
//!
//! let header = FrameHeader::new(true, OpCode::Binary, None, 300);
//! assert_eq!(header.header_length(), 4);
//! assert_eq!(header.total_length(), 304);
//! ```
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{close::CloseCode, Result, WebSocketError};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Largest possible header: 2 base bytes, 8 extended length bytes and a 4 byte key.
pub const MAX_HEADER_SIZE: usize = 14;

/// WebSocket operation code (OpCode) that determines the semantic meaning and handling of a frame.
///
/// # Data Frame OpCodes
/// - `Continuation`: Continues a fragmented message started by another data frame
/// - `Text`: Contains UTF-8 encoded text data
/// - `Binary`: Contains raw binary data
///
/// # Control Frame OpCodes
/// - `Close`: Initiates or confirms connection closure
/// - `Ping`: Tests connection liveness, requiring a `Pong` response
/// - `Pong`: Responds to a `Ping` frame
///
/// The ranges 0x3-0x7 and 0xB-0xF are reserved and rejected with
/// [`WebSocketError::InvalidOpCode`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    /// Returns `true` if the `OpCode` represents a control frame (`Close`, `Ping`, or `Pong`).
    ///
    /// Control frames cannot be fragmented and carry at most 125 bytes of payload.
    pub fn is_control(&self) -> bool {
        matches!(*self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = WebSocketError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(WebSocketError::InvalidOpCode(value)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// Descriptor of one frame on the wire, without its payload.
///
/// `header_length` counts the 2 base bytes, the extended length bytes (0, 2 or 8) and the masking
/// key (0 or 4). It is always derived from the other fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    fin: bool,
    reserved: u8,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    payload_length: u64,
    header_length: usize,
}

fn extended_length_size(payload_length: u64) -> usize {
    match payload_length {
        0..=125 => 0,
        126..=0xFFFF => 2,
        _ => 8,
    }
}

impl FrameHeader {
    /// Creates a header with the reserved bits cleared.
    pub fn new(fin: bool, opcode: OpCode, mask: Option<[u8; 4]>, payload_length: u64) -> Self {
        let header_length =
            2 + extended_length_size(payload_length) + if mask.is_some() { 4 } else { 0 };
        Self {
            fin,
            reserved: 0,
            opcode,
            mask,
            payload_length,
            header_length,
        }
    }

    /// Parses a header from the start of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold the complete header. Nothing is consumed;
    /// the caller advances by [`header_length`](Self::header_length) once it accepts the header.
    /// Only the structure is checked here: an unknown opcode is an error, while reserved bits,
    /// masking and sizes are left to the caller's policy.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let fin = buf[0] & 0x80 != 0;
        let reserved = (buf[0] >> 4) & 0x07;
        let opcode = OpCode::try_from(buf[0] & 0x0F)?;
        let masked = buf[1] & 0x80 != 0;
        let length_code = buf[1] & 0x7F;

        let extra = match length_code {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let header_length = 2 + extra + if masked { 4 } else { 0 };
        if buf.len() < header_length {
            return Ok(None);
        }

        let mut rest = &buf[2..header_length];
        let payload_length = match extra {
            2 => u64::from(rest.get_u16()),
            8 => rest.get_u64(),
            _ => u64::from(length_code),
        };
        let mask = masked.then(|| {
            let mut key = [0u8; 4];
            rest.copy_to_slice(&mut key);
            key
        });

        Ok(Some(Self {
            fin,
            reserved,
            opcode,
            mask,
            payload_length,
            header_length,
        }))
    }

    /// Appends the header to `dst`, using the shortest length encoding.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.header_length);
        dst.put_u8((self.fin as u8) << 7 | (self.reserved & 0x07) << 4 | u8::from(self.opcode));

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0 };
        match extended_length_size(self.payload_length) {
            0 => dst.put_u8(mask_bit | self.payload_length as u8),
            2 => {
                dst.put_u8(mask_bit | 126);
                dst.put_u16(self.payload_length as u16);
            }
            _ => {
                dst.put_u8(mask_bit | 127);
                dst.put_u64(self.payload_length);
            }
        }

        if let Some(key) = self.mask {
            dst.put_slice(&key);
        }
    }

    /// Checks a header received from a server before its payload is read.
    pub(crate) fn check(&self, max_frame_payload_size: usize) -> Result<()> {
        if self.reserved != 0 {
            return Err(WebSocketError::ReservedBitsNotZero);
        }
        if self.mask.is_some() {
            return Err(WebSocketError::MaskedFrame);
        }
        if self.opcode.is_control() {
            if !self.fin {
                return Err(WebSocketError::ControlFrameFragmented);
            }
            if self.payload_length > MAX_CONTROL_PAYLOAD {
                return Err(WebSocketError::ControlFrameTooLarge);
            }
        }
        if self.payload_length > max_frame_payload_size as u64 {
            return Err(WebSocketError::FrameTooLarge);
        }
        Ok(())
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn is_fin(&self) -> bool {
        self.fin
    }

    /// The three RSV bits, in the low bits of the returned value.
    pub fn reserved(&self) -> u8 {
        self.reserved
    }

    pub fn mask(&self) -> Option<[u8; 4]> {
        self.mask
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    pub fn payload_length(&self) -> u64 {
        self.payload_length
    }

    /// Bytes the whole frame occupies on the wire.
    pub fn total_length(&self) -> u64 {
        self.header_length as u64 + self.payload_length
    }
}

/// A WebSocket frame: header metadata plus an unmasked payload.
///
/// Frames handed to the encoder may carry a masking key, in which case the payload is masked on
/// its way to the wire; the `payload` field itself always holds the plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Indicates if this is the final frame in a message.
    pub fin: bool,
    /// The opcode of the frame, defining its type.
    pub opcode: OpCode,
    mask: Option<[u8; 4]>,
    /// The payload of the frame.
    pub payload: Bytes,
}

impl Frame {
    /// Creates an unmasked frame.
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, payload)
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    /// Creates a close frame with a status code and a reason.
    pub fn close(code: CloseCode, reason: impl AsRef<[u8]>) -> Self {
        let reason = reason.as_ref();
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code.into());
        payload.put_slice(reason);
        Self::new(true, OpCode::Close, payload.freeze())
    }

    /// Creates a close frame without validating the payload.
    pub fn close_raw(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Close, payload)
    }

    /// Attaches a masking key, applied when the frame is encoded.
    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    pub fn mask(&self) -> Option<[u8; 4]> {
        self.mask
    }

    /// Status code of a close frame, `None` if the payload is shorter than two bytes.
    pub fn close_code(&self) -> Option<CloseCode> {
        let bytes = self.payload.get(0..2)?;
        Some(CloseCode::from(u16::from_be_bytes([bytes[0], bytes[1]])))
    }

    /// The bytes after the status code of a close frame.
    pub fn close_reason(&self) -> &[u8] {
        self.payload.get(2..).unwrap_or_default()
    }

    /// The header this frame is written with.
    pub fn header(&self) -> FrameHeader {
        FrameHeader::new(self.fin, self.opcode, self.mask, self.payload.len() as u64)
    }
}

//! Read and write policy of an open connection, free of any I/O.
//!
//! [`ReadHalf`] turns decoded frames into complete messages and control events; [`WriteHalf`]
//! prepares outgoing frames. The session owns both and performs the actual reads and writes.

use bytes::{Bytes, BytesMut};

use crate::{
    close::CloseCode,
    frame::{Frame, OpCode},
    mask, Options, Result, Utf8Validator, WebSocketError,
};

/// What a received frame amounts to once reassembly is accounted for.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Incoming {
    Text(String),
    RawText(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close {
        code: Option<CloseCode>,
        reason: String,
        payload: Bytes,
    },
}

// ================ ReadHalf ====================

pub(crate) struct ReadHalf {
    /// Opcode of the message being reassembled.
    fragment: Option<OpCode>,
    /// Payload of the fragments received so far.
    accumulated: BytesMut,
    utf8: Utf8Validator,
    max_message_payload_size: usize,
    validate_utf8: bool,
    raw_text: bool,
}

impl ReadHalf {
    pub fn new(options: &Options) -> Self {
        Self {
            fragment: None,
            accumulated: BytesMut::new(),
            utf8: Utf8Validator::new(),
            max_message_payload_size: options.max_message_payload_size(),
            validate_utf8: options.validate_incoming_utf8(),
            raw_text: options.receive_text_messages_raw(),
        }
    }

    /// Processes a frame and returns an event once there is something to act on.
    ///
    /// Control frames may arrive between the fragments of a message; they are returned right
    /// away and leave the reassembly untouched. Text is validated fragment by fragment, so an
    /// invalid message fails on the first bad fragment.
    pub fn on_frame(&mut self, frame: Frame) -> Result<Option<Incoming>> {
        match frame.opcode {
            OpCode::Text | OpCode::Binary => {
                if self.fragment.is_some() {
                    return Err(WebSocketError::InvalidFragment);
                }
                if frame.payload.len() > self.max_message_payload_size {
                    return Err(WebSocketError::MessageTooLarge);
                }

                let is_text = frame.opcode == OpCode::Text;
                if is_text && self.validate_utf8 {
                    self.utf8.reset();
                    if !self.utf8.validate(&frame.payload) {
                        return Err(WebSocketError::InvalidUTF8);
                    }
                }

                if frame.fin {
                    return self.complete(frame.opcode, frame.payload).map(Some);
                }

                self.fragment = Some(frame.opcode);
                self.accumulated.extend_from_slice(&frame.payload);
                Ok(None)
            }
            OpCode::Continuation => {
                let opcode = self
                    .fragment
                    .ok_or(WebSocketError::InvalidContinuationFrame)?;

                if self.accumulated.len() + frame.payload.len() > self.max_message_payload_size {
                    return Err(WebSocketError::MessageTooLarge);
                }
                if opcode == OpCode::Text
                    && self.validate_utf8
                    && !self.utf8.validate(&frame.payload)
                {
                    return Err(WebSocketError::InvalidUTF8);
                }

                self.accumulated.extend_from_slice(&frame.payload);
                if !frame.fin {
                    return Ok(None);
                }

                self.fragment = None;
                let payload = self.accumulated.split().freeze();
                self.complete(opcode, payload).map(Some)
            }
            OpCode::Ping => Ok(Some(Incoming::Ping(frame.payload))),
            OpCode::Pong => Ok(Some(Incoming::Pong(frame.payload))),
            OpCode::Close => on_close(frame).map(Some),
        }
    }

    fn complete(&mut self, opcode: OpCode, payload: Bytes) -> Result<Incoming> {
        if opcode == OpCode::Binary {
            return Ok(Incoming::Binary(payload));
        }

        if self.validate_utf8 && !self.utf8.is_valid() {
            return Err(WebSocketError::InvalidUTF8);
        }

        if self.raw_text {
            return Ok(Incoming::RawText(payload));
        }

        let text = match String::from_utf8(Vec::from(payload)) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        };
        Ok(Incoming::Text(text))
    }

    /// Returns `true` while a fragmented message is being reassembled.
    #[cfg(test)]
    fn is_reassembling(&self) -> bool {
        self.fragment.is_some()
    }
}

fn on_close(frame: Frame) -> Result<Incoming> {
    let code = match frame.payload.len() {
        0 => None,
        1 => return Err(WebSocketError::InvalidCloseFrame),
        _ => frame.close_code(),
    };

    if code.is_some_and(|code| !code.is_allowed()) {
        return Err(WebSocketError::InvalidCloseCode);
    }

    let reason = std::str::from_utf8(frame.close_reason())
        .map_err(|_| WebSocketError::InvalidUTF8)?
        .to_owned();

    Ok(Incoming::Close {
        code,
        reason,
        payload: frame.payload,
    })
}

// ================ WriteHalf ====================

pub(crate) struct WriteHalf {
    mask_frames: bool,
    close_sent: bool,
}

impl WriteHalf {
    pub fn new(options: &Options) -> Self {
        Self {
            mask_frames: options.mask_client_frames(),
            close_sent: false,
        }
    }

    /// Readies a frame for the wire. Nothing may follow a close frame.
    pub fn prepare(&mut self, frame: Frame) -> Result<Frame> {
        if self.close_sent {
            return Err(WebSocketError::ConnectionClosed);
        }
        if frame.opcode == OpCode::Close {
            self.close_sent = true;
        }

        if self.mask_frames {
            Ok(frame.with_mask(mask::random_key()))
        } else {
            Ok(frame)
        }
    }

    pub fn is_close_sent(&self) -> bool {
        self.close_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(options: Options) -> ReadHalf {
        ReadHalf::new(&options)
    }

    fn frame(fin: bool, opcode: OpCode, payload: &'static [u8]) -> Frame {
        Frame::new(fin, opcode, Bytes::from_static(payload))
    }

    #[test]
    fn test_single_frame_text() {
        let mut read = reader(Options::default());
        let event = read.on_frame(frame(true, OpCode::Text, b"hello")).unwrap();
        assert_eq!(event, Some(Incoming::Text("hello".into())));
    }

    #[test]
    fn test_reassembles_fragments() {
        let mut read = reader(Options::default());
        assert_eq!(read.on_frame(frame(false, OpCode::Text, b"he")).unwrap(), None);
        assert!(read.is_reassembling());

        let event = read
            .on_frame(frame(true, OpCode::Continuation, b"llo"))
            .unwrap();
        assert_eq!(event, Some(Incoming::Text("hello".into())));
        assert!(!read.is_reassembling());
    }

    #[test]
    fn test_binary_fragments() {
        let mut read = reader(Options::default());
        assert_eq!(read.on_frame(frame(false, OpCode::Binary, &[1])).unwrap(), None);
        assert_eq!(
            read.on_frame(frame(false, OpCode::Continuation, &[2])).unwrap(),
            None
        );
        let event = read
            .on_frame(frame(true, OpCode::Continuation, &[3]))
            .unwrap();
        assert_eq!(event, Some(Incoming::Binary(Bytes::from_static(&[1, 2, 3]))));
    }

    #[test]
    fn test_ping_between_fragments() {
        let mut read = reader(Options::default());
        read.on_frame(frame(false, OpCode::Text, b"he")).unwrap();

        let ping = read.on_frame(frame(true, OpCode::Ping, b"beat")).unwrap();
        assert_eq!(ping, Some(Incoming::Ping(Bytes::from_static(b"beat"))));
        assert!(read.is_reassembling());

        let event = read
            .on_frame(frame(true, OpCode::Continuation, b"llo"))
            .unwrap();
        assert_eq!(event, Some(Incoming::Text("hello".into())));
    }

    #[test]
    fn test_code_point_split_across_fragments() {
        let mut read = reader(Options::default());
        // "€" is E2 82 AC
        read.on_frame(frame(false, OpCode::Text, &[b'a', 0xE2])).unwrap();
        read.on_frame(frame(false, OpCode::Continuation, &[0x82]))
            .unwrap();
        let event = read
            .on_frame(frame(true, OpCode::Continuation, &[0xAC]))
            .unwrap();
        assert_eq!(event, Some(Incoming::Text("a€".into())));
    }

    #[test]
    fn test_invalid_utf8_fails_on_first_bad_fragment() {
        let mut read = reader(Options::default());
        read.on_frame(frame(false, OpCode::Text, b"ok")).unwrap();
        assert!(matches!(
            read.on_frame(frame(false, OpCode::Continuation, &[0xFF])),
            Err(WebSocketError::InvalidUTF8)
        ));
    }

    #[test]
    fn test_truncated_code_point_at_message_end() {
        let mut read = reader(Options::default());
        assert!(matches!(
            read.on_frame(frame(true, OpCode::Text, &[b'a', 0xE2, 0x82])),
            Err(WebSocketError::InvalidUTF8)
        ));
    }

    #[test]
    fn test_validation_disabled_is_lossy() {
        let mut read = reader(Options::default().with_validate_incoming_utf8(false));
        let event = read.on_frame(frame(true, OpCode::Text, &[b'a', 0xFF])).unwrap();
        assert_eq!(event, Some(Incoming::Text("a\u{FFFD}".into())));
    }

    #[test]
    fn test_raw_text() {
        let mut read = reader(Options::default().with_receive_text_messages_raw(true));
        let event = read.on_frame(frame(true, OpCode::Text, b"raw")).unwrap();
        assert_eq!(event, Some(Incoming::RawText(Bytes::from_static(b"raw"))));

        assert!(matches!(
            read.on_frame(frame(true, OpCode::Text, &[0xC0, 0x80])),
            Err(WebSocketError::InvalidUTF8)
        ));
    }

    #[test]
    fn test_message_limit() {
        let mut read = reader(
            Options::default()
                .with_max_frame_payload_size(4)
                .with_max_message_payload_size(6),
        );
        read.on_frame(frame(false, OpCode::Binary, b"1234")).unwrap();
        read.on_frame(frame(false, OpCode::Continuation, b"56"))
            .unwrap();
        assert!(matches!(
            read.on_frame(frame(true, OpCode::Continuation, b"7")),
            Err(WebSocketError::MessageTooLarge)
        ));
    }

    #[test]
    fn test_message_at_limit_accepted() {
        let mut read = reader(Options::default().with_max_message_payload_size(4));
        read.on_frame(frame(false, OpCode::Text, b"ab")).unwrap();
        let event = read
            .on_frame(frame(true, OpCode::Continuation, b"cd"))
            .unwrap();
        assert_eq!(event, Some(Incoming::Text("abcd".into())));
    }

    #[test]
    fn test_new_message_during_reassembly() {
        let mut read = reader(Options::default());
        read.on_frame(frame(false, OpCode::Text, b"he")).unwrap();
        assert!(matches!(
            read.on_frame(frame(true, OpCode::Binary, b"x")),
            Err(WebSocketError::InvalidFragment)
        ));
    }

    #[test]
    fn test_continuation_without_start() {
        let mut read = reader(Options::default());
        assert!(matches!(
            read.on_frame(frame(true, OpCode::Continuation, b"x")),
            Err(WebSocketError::InvalidContinuationFrame)
        ));
    }

    #[test]
    fn test_close_frames() {
        let mut read = reader(Options::default());

        let event = read
            .on_frame(Frame::close(CloseCode::Away, "restart"))
            .unwrap();
        assert!(matches!(
            event,
            Some(Incoming::Close { code: Some(CloseCode::Away), ref reason, .. }) if reason == "restart"
        ));

        let event = read.on_frame(Frame::close_raw(Bytes::new())).unwrap();
        assert!(matches!(event, Some(Incoming::Close { code: None, .. })));

        assert!(matches!(
            read.on_frame(Frame::close_raw(Bytes::from_static(&[0x03]))),
            Err(WebSocketError::InvalidCloseFrame)
        ));
        assert!(matches!(
            read.on_frame(Frame::close(CloseCode::from(1005), "")),
            Err(WebSocketError::InvalidCloseCode)
        ));
        assert!(matches!(
            read.on_frame(Frame::close(CloseCode::Normal, [0xFF])),
            Err(WebSocketError::InvalidUTF8)
        ));
    }

    #[test]
    fn test_writer_masks_by_default() {
        let mut write = WriteHalf::new(&Options::default());
        let frame = write.prepare(Frame::text("hello")).unwrap();
        assert!(frame.mask().is_some());
        assert_eq!(&frame.payload[..], b"hello");

        let mut write = WriteHalf::new(&Options::default().with_mask_client_frames(false));
        assert!(write.prepare(Frame::text("hello")).unwrap().mask().is_none());
    }

    #[test]
    fn test_writer_refuses_after_close() {
        let mut write = WriteHalf::new(&Options::default());
        assert!(!write.is_close_sent());
        write.prepare(Frame::close(CloseCode::Normal, "")).unwrap();
        assert!(write.is_close_sent());
        assert!(matches!(
            write.prepare(Frame::text("late")),
            Err(WebSocketError::ConnectionClosed)
        ));
    }
}

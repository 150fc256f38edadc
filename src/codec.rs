//! `tokio_util` codec for the client side of a WebSocket connection.
//!
//! The [`Decoder`] accepts unmasked server frames and rejects anything the client role must not
//! receive as soon as the header is complete. The [`Encoder`] writes frames as given, masking the
//! payload when the frame carries a key.
use bytes::{Buf, BytesMut};
use tokio_util::codec;

use crate::{
    frame::{Frame, FrameHeader},
    mask::apply_mask,
    WebSocketError,
};

/// A combined codec that provides both encoding and decoding of WebSocket frames,
/// for use with [`tokio_util::codec::Framed`].
pub struct Codec {
    decoder: Decoder,
    encoder: Encoder,
}

impl Codec {
    /// Creates a codec rejecting frames whose payload is larger than `max_frame_payload_size`.
    pub fn new(max_frame_payload_size: usize) -> Self {
        Self::from((Decoder::new(max_frame_payload_size), Encoder))
    }
}

impl From<(Decoder, Encoder)> for Codec {
    fn from((decoder, encoder): (Decoder, Encoder)) -> Self {
        Self { decoder, encoder }
    }
}

impl codec::Decoder for Codec {
    type Item = <Decoder as codec::Decoder>::Item;
    type Error = <Decoder as codec::Decoder>::Error;

    #[inline]
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode(src)
    }
}

impl codec::Encoder<Frame> for Codec {
    type Error = <Encoder as codec::Encoder<Frame>>::Error;

    #[inline]
    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encoder.encode(item, dst)
    }
}

/// Decoder for frames sent by a server.
///
/// Decoding happens in two steps. Once the header is complete it is checked against the frame
/// policy and consumed; the decoder then waits for the payload. A frame that fails the policy is
/// reported before any of its payload is buffered.
pub struct Decoder {
    /// Header of the frame whose payload is still arriving.
    pending: Option<FrameHeader>,
    max_frame_payload_size: usize,
}

impl Decoder {
    pub fn new(max_frame_payload_size: usize) -> Self {
        Self {
            pending: None,
            max_frame_payload_size,
        }
    }
}

impl codec::Decoder for Decoder {
    type Item = Frame;
    type Error = WebSocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending.take() {
            Some(header) => header,
            None => {
                let Some(header) = FrameHeader::parse(src)? else {
                    return Ok(None);
                };
                header.check(self.max_frame_payload_size)?;
                src.advance(header.header_length());
                header
            }
        };

        // checked against max_frame_payload_size, fits in usize
        let payload_length = header.payload_length() as usize;
        if src.len() < payload_length {
            src.reserve(payload_length - src.len());
            self.pending = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_length).freeze();
        Ok(Some(Frame::new(header.is_fin(), header.opcode(), payload)))
    }
}

/// Encoder for frames sent by the client.
pub struct Encoder;

impl codec::Encoder<Frame> for Encoder {
    type Error = WebSocketError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header = frame.header();
        dst.reserve(header.header_length() + frame.payload.len());
        header.encode(dst);

        let start = dst.len();
        dst.extend_from_slice(&frame.payload);
        if let Some(key) = header.mask() {
            apply_mask(&mut dst[start..], key);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{close::CloseCode, frame::OpCode};
    use bytes::BufMut;
    use tokio_util::codec::{Decoder as _, Encoder as _};

    fn server_frame(fin: bool, opcode: OpCode, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameHeader::new(fin, opcode, None, payload.len() as u64).encode(&mut buf);
        buf.put_slice(payload);
        buf
    }

    #[test]
    fn test_decode_text() {
        let mut codec = Codec::new(1024);
        let mut src = server_frame(true, OpCode::Text, b"hello");

        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(&frame.payload[..], b"hello");
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let mut codec = Codec::new(1024);
        let payload = vec![7u8; 300];
        let wire = server_frame(false, OpCode::Binary, &payload);

        let mut src = BytesMut::new();
        for (i, byte) in wire.iter().enumerate() {
            src.put_u8(*byte);
            let decoded = codec.decode(&mut src).unwrap();
            if i + 1 < wire.len() {
                assert!(decoded.is_none(), "frame emitted early at byte {i}");
            } else {
                let frame = decoded.unwrap();
                assert!(!frame.fin);
                assert_eq!(frame.payload.len(), 300);
            }
        }
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut codec = Codec::new(1024);
        let mut src = server_frame(false, OpCode::Text, b"he");
        src.extend_from_slice(&server_frame(true, OpCode::Continuation, b"llo"));

        let first = codec.decode(&mut src).unwrap().unwrap();
        let second = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&first.payload[..], b"he");
        assert_eq!(second.opcode, OpCode::Continuation);
        assert_eq!(&second.payload[..], b"llo");
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn test_oversized_frame_rejected_from_header() {
        let mut codec = Codec::new(100);
        let mut src = BytesMut::new();
        FrameHeader::new(true, OpCode::Binary, None, 101).encode(&mut src);

        assert!(matches!(
            codec.decode(&mut src),
            Err(WebSocketError::FrameTooLarge)
        ));
    }

    #[test]
    fn test_frame_at_limit_accepted() {
        let mut codec = Codec::new(100);
        let mut src = server_frame(true, OpCode::Binary, &[1; 100]);
        assert!(codec.decode(&mut src).unwrap().is_some());
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let mut codec = Codec::new(100);
        let mut src = BytesMut::from(&[0x91u8, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(WebSocketError::ReservedBitsNotZero)
        ));
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut codec = Codec::new(100);
        let mut src = BytesMut::from(&[0x83u8, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(WebSocketError::InvalidOpCode(3))
        ));
    }

    #[test]
    fn test_masked_server_frame_rejected() {
        let mut codec = Codec::new(100);
        let mut src = BytesMut::from(&[0x81u8, 0x81, 1, 2, 3, 4, 0x41][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(WebSocketError::MaskedFrame)
        ));
    }

    #[test]
    fn test_encode_masks_payload() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let mut dst = BytesMut::new();
        Encoder
            .encode(Frame::text("Hello").with_mask(key), &mut dst)
            .unwrap();

        assert_eq!(
            &dst[..],
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_encode_unmasked() {
        let mut dst = BytesMut::new();
        Encoder
            .encode(Frame::close(CloseCode::Normal, ""), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], &[0x88, 0x02, 0x03, 0xE8]);
    }
}

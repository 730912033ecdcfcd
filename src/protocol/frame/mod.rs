//! Utilities to work with raw WebSocket frames.

pub mod coding;

#[allow(clippy::module_inception)]
mod frame;
mod mask;

pub use self::{
    frame::{CloseFrame, Frame, FrameHeader},
    mask::apply_mask,
};

use bytes::Buf;
use log::*;
use std::io::Read;

use crate::{
    error::{CapacityError, Error, ProtocolError, Result},
    ReadBuffer,
};

/// An incremental WebSocket frame parser.
///
/// Bytes are pushed in with [`feed`](Self::feed) or pulled from a stream with
/// [`read_from`](Self::read_from); [`next`](Self::next) yields complete frames and never
/// blocks. A frame is only consumed from the buffer once it is complete, so a partially
/// received frame stays buffered until more data arrives.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Buffer to read data from the stream.
    in_buffer: ReadBuffer,
    /// Maximum size of a single frame payload.
    max_frame_size: Option<usize>,
    /// Accept frames carrying a mask.
    accept_masked_frames: bool,
}

impl FrameDecoder {
    /// Create a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::from_partially_read(Vec::new())
    }

    /// Create a new decoder from partially read data, e.g. the bytes received past
    /// the end of the handshake response.
    pub fn from_partially_read(part: Vec<u8>) -> Self {
        FrameDecoder {
            in_buffer: ReadBuffer::from_partially_read(part),
            max_frame_size: None,
            accept_masked_frames: false,
        }
    }

    /// Set the maximum payload size of a single frame. `None` means no limit.
    pub fn max_frame_size(mut self, max_frame_size: Option<usize>) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Allow frames with the mask bit set. Servers must not mask their frames, so by
    /// default such a frame is a protocol error.
    pub fn accept_masked_frames(mut self, accept: bool) -> Self {
        self.accept_masked_frames = accept;
        self
    }

    /// Push raw bytes into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.in_buffer.extend_from_slice(data);
    }

    /// Read one chunk from the stream into the decoder. Returns the number of bytes read,
    /// zero meaning the stream reached its end.
    pub fn read_from<S: Read>(&mut self, stream: &mut S) -> std::io::Result<usize> {
        self.in_buffer.read_from(stream)
    }

    /// Number of buffered bytes not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.in_buffer.remaining()
    }

    /// Consume the decoder and return the bytes not yet decoded.
    pub fn into_vec(self) -> Vec<u8> {
        self.in_buffer.into_vec()
    }

    /// Try to decode one frame from the buffered data. Returns `None` if the buffer does
    /// not yet hold a complete frame; nothing is consumed in that case, so calling again
    /// after more data has been fed in resumes from the start of the frame.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Frame>> {
        let cursor = self.in_buffer.as_cursor_mut();
        let initial = cursor.position();

        let Some((header, length)) = FrameHeader::parse(cursor)? else {
            return Ok(None);
        };

        if header.mask.is_some() && !self.accept_masked_frames {
            return Err(Error::Protocol(ProtocolError::MaskedFrameFromServer));
        }

        // Enforce frame size limit early and make sure `length`
        // is not too big (fits into `usize`).
        let length = match usize::try_from(length) {
            Ok(length) => length,
            Err(_) => {
                return Err(Error::Capacity(CapacityError::MessageTooLong {
                    size: usize::MAX,
                    max_size: self.max_frame_size.unwrap_or(usize::MAX),
                }))
            }
        };
        if let Some(max_size) = self.max_frame_size {
            if length > max_size {
                return Err(Error::Capacity(CapacityError::MessageTooLong {
                    size: length,
                    max_size,
                }));
            }
        }

        if cursor.remaining() < length {
            trace!("frame incomplete, {} of {} payload bytes", cursor.remaining(), length);
            cursor.set_position(initial);
            return Ok(None);
        }

        let mut payload = vec![0; length];
        cursor.copy_to_slice(&mut payload);

        let mut frame = Frame::from_payload(header, payload);
        if frame.is_masked() {
            frame.apply_mask();
        }
        trace!("received frame {frame}");
        Ok(Some(frame))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{CapacityError, Error, ProtocolError};

    use super::{
        coding::{Control, Data, OpCode},
        Frame, FrameDecoder,
    };

    use std::io::Cursor;

    fn encode(frame: Frame) -> Vec<u8> {
        let mut buf = Vec::new();
        frame.format_into_buf(&mut buf).unwrap();
        buf
    }

    #[test]
    fn read_frames() {
        let mut raw = Cursor::new(vec![
            0x82, 0x07, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x82, 0x03, 0x03, 0x02, 0x01,
            0x99,
        ]);
        let mut decoder = FrameDecoder::new();
        assert!(decoder.next().unwrap().is_none());
        assert_eq!(decoder.read_from(&mut raw).unwrap(), 15);

        assert_eq!(
            decoder.next().unwrap().unwrap().into_data(),
            vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]
        );
        assert_eq!(decoder.next().unwrap().unwrap().into_data(), vec![0x03, 0x02, 0x01]);
        assert!(decoder.next().unwrap().is_none());

        assert_eq!(decoder.into_vec(), vec![0x99]);
    }

    #[test]
    fn from_partially_read() {
        let mut decoder = FrameDecoder::from_partially_read(vec![0x82, 0x07, 0x01]);
        assert!(decoder.next().unwrap().is_none());
        decoder.feed(&[0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(
            decoder.next().unwrap().unwrap().into_data(),
            vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]
        );
    }

    #[test]
    fn round_trip_through_encoder() {
        let mut frame = Frame::message(b"Hello, World!".to_vec(), OpCode::Data(Data::Text), true);
        frame.set_random_mask();

        let mut decoder = FrameDecoder::new().accept_masked_frames(true);
        decoder.feed(&encode(frame));
        let decoded = decoder.next().unwrap().unwrap();
        assert_eq!(decoded.header().opcode, OpCode::Data(Data::Text));
        assert!(decoded.header().mask.is_none());
        assert_eq!(decoded.payload(), b"Hello, World!");
    }

    #[test]
    fn byte_by_byte_matches_all_at_once() {
        let frames = vec![
            Frame::message(b"first".to_vec(), OpCode::Data(Data::Text), true),
            Frame::ping(vec![1, 2, 3]),
            Frame::message(vec![0xab; 300], OpCode::Data(Data::Binary), true),
            Frame::message(vec![0x5a; 70_000], OpCode::Data(Data::Binary), true),
            Frame::pong(Vec::new()),
        ];
        let wire: Vec<u8> = frames.iter().cloned().flat_map(encode).collect();

        let mut whole = FrameDecoder::new();
        whole.feed(&wire);
        let mut expected = Vec::new();
        while let Some(frame) = whole.next().unwrap() {
            expected.push(frame);
        }
        assert_eq!(expected, frames);

        let mut trickle = FrameDecoder::new();
        let mut decoded = Vec::new();
        for byte in &wire {
            trickle.feed(std::slice::from_ref(byte));
            while let Some(frame) = trickle.next().unwrap() {
                decoded.push(frame);
            }
        }
        assert_eq!(decoded, expected);
        assert_eq!(trickle.buffered(), 0);
    }

    #[test]
    fn incomplete_payload_is_not_consumed() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0x81, 0x05, b'H', b'e']);
        assert!(decoder.next().unwrap().is_none());
        assert!(decoder.next().unwrap().is_none());
        decoder.feed(b"llo");
        let frame = decoder.next().unwrap().unwrap();
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn masked_frame_from_server_is_rejected() {
        let mut frame = Frame::pong(vec![0x01]);
        frame.set_random_mask();
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode(frame));
        assert!(matches!(
            decoder.next(),
            Err(Error::Protocol(ProtocolError::MaskedFrameFromServer))
        ));
    }

    #[test]
    fn size_limit() {
        let mut decoder = FrameDecoder::new().max_frame_size(Some(4));
        decoder.feed(&[0x82, 0x05, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert!(matches!(
            decoder.next(),
            Err(Error::Capacity(CapacityError::MessageTooLong { size: 5, max_size: 4 }))
        ));
    }

    #[test]
    fn control_opcodes() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0x89, 0x02, 0x04, 0x05, 0x8a, 0x01, 0x01, 0x88, 0x00]);
        let ping = decoder.next().unwrap().unwrap();
        assert_eq!(ping.header().opcode, OpCode::Control(Control::Ping));
        assert_eq!(ping.payload(), &[0x04, 0x05]);
        let pong = decoder.next().unwrap().unwrap();
        assert_eq!(pong.header().opcode, OpCode::Control(Control::Pong));
        let close = decoder.next().unwrap().unwrap();
        assert_eq!(close.header().opcode, OpCode::Control(Control::Close));
        assert!(close.payload().is_empty());
    }
}

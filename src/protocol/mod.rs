//! Client-side WebSocket protocol implementation.

pub mod frame;

mod message;

pub use self::{
    frame::CloseFrame,
    message::{Message, Outcome},
};

use std::{
    io::{ErrorKind as IoErrorKind, Read, Write},
    net::TcpStream,
    time::Duration,
};

use self::{
    frame::{
        coding::{Control as OpCtl, Data as OpData, OpCode},
        Frame, FrameDecoder, FrameHeader,
    },
    message::{IncompleteMessage, IncompleteMessageType},
};
use crate::{
    client::IntoTarget,
    error::{CapacityError, Error, ProtocolError, Result},
    stream::Shutdown,
};
use log::*;

/// How operations report a connection that is already closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClosedPolicy {
    /// Report it as an error: [`Error::ConnectionClosed`] the first time the peer's close is
    /// observed, [`Error::AlreadyClosed`] afterwards.
    #[default]
    Fail,
    /// Report it as [`Outcome::Closed`].
    Sentinel,
}

/// The configuration for a WebSocket client.
///
/// This may be used to tune the limits and the closed-connection reporting.
///
/// # Example
/// ```
/// # use ws_sync::{ClosedPolicy, WsConfig};
/// let conf = WsConfig::default()
///     .closed_policy(ClosedPolicy::Sentinel)
///     .max_message_size(Some(1 << 20));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WsConfig {
    /// How a closed connection is reported. Defaults to [`ClosedPolicy::Fail`].
    pub closed_policy: ClosedPolicy,
    /// The maximum size of an incoming message. `None` means no size limit. The default value is
    /// 64 MiB which should be reasonably big for all normal use-cases but small enough to prevent
    /// memory eating by a malicious user. Outgoing messages above this size are refused as well.
    pub max_message_size: Option<usize>,
    /// The maximum size of a single incoming message frame. `None` means no size limit. The limit
    /// is for frame payload NOT including the frame header. The default value is 16 MiB which
    /// should be reasonably big for all normal use-cases but small enough to prevent memory
    /// eating by a malicious user.
    pub max_frame_size: Option<usize>,
    /// The maximum size of the server's handshake response header block. Defaults to 64 KiB.
    pub max_handshake_size: usize,
    /// When set to `true`, the client will accept and unmask frames that the server masked,
    /// which violates RFC 6455. The default value is `false`.
    pub accept_masked_frames: bool,
    /// Timeout for each TCP connection attempt made by [`WsClient::connect`].
    /// `None` uses the operating system default.
    pub connect_timeout: Option<Duration>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            closed_policy: ClosedPolicy::Fail,
            max_message_size: Some(64 << 20),
            max_frame_size: Some(16 << 20),
            max_handshake_size: 64 << 10,
            accept_masked_frames: false,
            connect_timeout: None,
        }
    }
}

impl WsConfig {
    /// Set [`Self::closed_policy`].
    pub fn closed_policy(mut self, closed_policy: ClosedPolicy) -> Self {
        self.closed_policy = closed_policy;
        self
    }

    /// Set [`Self::max_message_size`].
    pub fn max_message_size(mut self, max_message_size: Option<usize>) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Set [`Self::max_frame_size`].
    pub fn max_frame_size(mut self, max_frame_size: Option<usize>) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Set [`Self::max_handshake_size`].
    pub fn max_handshake_size(mut self, max_handshake_size: usize) -> Self {
        self.max_handshake_size = max_handshake_size;
        self
    }

    /// Set [`Self::accept_masked_frames`].
    pub fn accept_masked_frames(mut self, accept_masked_frames: bool) -> Self {
        self.accept_masked_frames = accept_masked_frames;
        self
    }

    /// Set [`Self::connect_timeout`].
    pub fn connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// A blocking WebSocket client connection.
///
/// Created by one of the constructors, which perform the opening handshake before
/// returning. Every operation blocks until it made progress or the connection became
/// unusable. Once the connection is closed no byte is read from or written to the stream
/// again.
#[derive(Debug)]
pub struct WsClient<Stream> {
    /// The underlying stream.
    stream: Stream,
    /// Incoming frames parsed from the stream.
    decoder: FrameDecoder,
    /// Scratch buffer for outgoing frames.
    out_buffer: Vec<u8>,
    /// Negotiated protocol version.
    version: u8,
    config: WsConfig,
    state: ConnectionState,
    /// Receive: an incomplete message being processed.
    incomplete: Option<IncompleteMessage>,
    /// The close frame the server sent, if any.
    peer_close: Option<CloseFrame<'static>>,
}

impl WsClient<TcpStream> {
    /// Resolve the URL, connect over TCP and perform the handshake.
    pub fn connect<T: IntoTarget>(target: T) -> Result<Self> {
        Self::connect_with_config(target, None)
    }

    /// Like [`connect`](Self::connect) with a custom configuration.
    pub fn connect_with_config<T: IntoTarget>(target: T, config: Option<WsConfig>) -> Result<Self> {
        crate::client::connect_with_config(target, config).map(|(client, _)| client)
    }
}

impl<Stream: Read + Write + Shutdown> WsClient<Stream> {
    /// Perform the handshake for the URL over an already established stream.
    pub fn client<T: IntoTarget>(target: T, stream: Stream) -> Result<Self> {
        Self::client_with_config(target, stream, None)
    }

    /// Like [`client`](Self::client) with a custom configuration.
    pub fn client_with_config<T: IntoTarget>(
        target: T,
        stream: Stream,
        config: Option<WsConfig>,
    ) -> Result<Self> {
        crate::client::client_with_config(target, stream, config).map(|(client, _)| client)
    }
}

impl<Stream> WsClient<Stream> {
    /// Wrap a stream on which the handshake has already been performed.
    ///
    /// `part` holds the bytes that were read past the end of the handshake response.
    pub fn from_partially_read(
        stream: Stream,
        part: Vec<u8>,
        version: u8,
        config: Option<WsConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        let decoder = FrameDecoder::from_partially_read(part)
            .max_frame_size(config.max_frame_size)
            .accept_masked_frames(config.accept_masked_frames);
        WsClient {
            stream,
            decoder,
            out_buffer: Vec::new(),
            version,
            config,
            state: ConnectionState::Open,
            incomplete: None,
            peer_close: None,
        }
    }

    /// Returns a shared reference to the inner stream.
    pub fn get_ref(&self) -> &Stream {
        &self.stream
    }

    /// Returns a mutable reference to the inner stream.
    pub fn get_mut(&mut self) -> &mut Stream {
        &mut self.stream
    }

    /// Read the configuration.
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// The protocol version negotiated during the handshake.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Check if the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// The close frame the server sent, if it sent one with a payload.
    pub fn peer_close_frame(&self) -> Option<&CloseFrame<'static>> {
        self.peer_close.as_ref()
    }

    /// Outcome of an operation attempted on a connection that is already closed.
    fn already_closed<T>(&self) -> Result<Outcome<T>> {
        match self.config.closed_policy {
            ClosedPolicy::Fail => Err(Error::AlreadyClosed),
            ClosedPolicy::Sentinel => Ok(Outcome::Closed),
        }
    }

    /// Outcome of observing the peer's close.
    fn closed_by_peer<T>(&self) -> Result<Outcome<T>> {
        match self.config.closed_policy {
            ClosedPolicy::Fail => Err(Error::ConnectionClosed),
            ClosedPolicy::Sentinel => Ok(Outcome::Closed),
        }
    }
}

impl<Stream: Read + Write + Shutdown> WsClient<Stream> {
    /// Send a data message as one masked frame.
    ///
    /// Returns once the frame is written and flushed. On a closed connection nothing is
    /// written. A failed write closes the connection.
    pub fn send_frame<M: Into<Message>>(&mut self, message: M) -> Result<Outcome<()>> {
        if self.is_closed() {
            return self.already_closed();
        }

        let message = message.into();
        if let Some(max_size) = self.config.max_message_size {
            if message.len() > max_size {
                return Err(Error::Capacity(CapacityError::MessageTooLong {
                    size: message.len(),
                    max_size,
                }));
            }
        }

        let opcode = message.opcode();
        let frame = Frame::message(message.into_data(), OpCode::Data(opcode), true);
        if let Err(err) = self.write_frame(frame) {
            self.terminate();
            return Err(err);
        }
        Ok(Outcome::Done(()))
    }

    /// Receive the next data message.
    ///
    /// Pings are answered and pongs are dropped without returning. A close frame or the end
    /// of the stream closes the connection.
    pub fn recv_frame(&mut self) -> Result<Outcome<Message>> {
        if self.is_closed() {
            return self.already_closed();
        }

        loop {
            let frame = match self.decoder.next() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    match self.decoder.read_from(&mut self.stream) {
                        Ok(0) => {
                            debug!("Stream ended without a close frame");
                            self.terminate();
                            return self.closed_by_peer();
                        }
                        Ok(_) => {}
                        Err(err) if err.kind() == IoErrorKind::Interrupted => {}
                        Err(err)
                            if matches!(
                                err.kind(),
                                IoErrorKind::WouldBlock | IoErrorKind::TimedOut
                            ) =>
                        {
                            return Err(err.into())
                        }
                        Err(err) => {
                            self.terminate();
                            return Err(err.into());
                        }
                    }
                    continue;
                }
                Err(err) => {
                    self.terminate();
                    return Err(err);
                }
            };

            match self.handle_frame(frame) {
                Ok(Received::Message(message)) => {
                    trace!("Received message {message}");
                    return Ok(Outcome::Done(message));
                }
                Ok(Received::Nothing) => {}
                Ok(Received::Close) => {
                    debug!("Connection closed by peer");
                    self.terminate();
                    return self.closed_by_peer();
                }
                Err(err) => {
                    self.terminate();
                    return Err(err);
                }
            }
        }
    }

    /// Close the connection.
    ///
    /// Sends one close frame and shuts the stream down without waiting for the server to
    /// answer. Calling it on a closed connection does nothing.
    ///
    /// Codes that must not appear on the wire (1005, 1006, 1015 and codes outside the
    /// registered ranges) are refused with [`ProtocolError::InvalidCloseSequence`] and
    /// nothing is written.
    pub fn close(&mut self, close: Option<CloseFrame>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        if let Some(CloseFrame { code, .. }) = &close {
            if !code.is_allowed() {
                return Err(Error::Protocol(ProtocolError::InvalidCloseSequence));
            }
        }

        let frame = Frame::close(close);
        // All control frames MUST have a payload length of 125 bytes or less. (RFC 6455)
        if frame.payload().len() > 125 {
            return Err(Error::Protocol(ProtocolError::ControlFrameTooBig));
        }

        let result = match self.write_frame(frame) {
            Err(Error::Io(err))
                if matches!(
                    err.kind(),
                    IoErrorKind::BrokenPipe
                        | IoErrorKind::ConnectionReset
                        | IoErrorKind::ConnectionAborted
                        | IoErrorKind::NotConnected
                ) =>
            {
                debug!("Peer already gone while closing: {err}");
                Ok(())
            }
            other => other,
        };
        self.terminate();
        result
    }

    /// Apply control semantics to one incoming frame.
    fn handle_frame(&mut self, frame: Frame) -> Result<Received> {
        // MUST be 0 unless an extension is negotiated that defines meanings
        // for non-zero values.  If a nonzero value is received and none of
        // the negotiated extensions defines the meaning of such a nonzero
        // value, the receiving endpoint MUST _Fail the WebSocket
        // Connection_.
        let FrameHeader { is_final, rsv1, rsv2, rsv3, opcode, .. } = *frame.header();
        if rsv1 || rsv2 || rsv3 {
            return Err(Error::Protocol(ProtocolError::NonZeroReservedBits));
        }

        match opcode {
            OpCode::Control(ctl) => {
                // All control frames MUST have a payload length of 125 bytes or less
                // and MUST NOT be fragmented. (RFC 6455)
                if !is_final {
                    return Err(Error::Protocol(ProtocolError::FragmentedControlFrame));
                }
                if frame.payload().len() > 125 {
                    return Err(Error::Protocol(ProtocolError::ControlFrameTooBig));
                }
                match ctl {
                    OpCtl::Close => {
                        let close = frame.into_close()?;
                        if let Some(close) = &close {
                            if !close.code.is_allowed() {
                                return Err(Error::Protocol(ProtocolError::InvalidCloseSequence));
                            }
                            debug!("Received close frame: {close}");
                        }
                        self.peer_close = close;
                        Ok(Received::Close)
                    }
                    OpCtl::Reserved(i) => Err(Error::Protocol(ProtocolError::InvalidOpcode(i))),
                    OpCtl::Ping => {
                        // Upon receipt of a Ping frame, an endpoint MUST send a Pong frame in
                        // response. (RFC 6455)
                        self.write_frame(Frame::pong(frame.into_data()))?;
                        Ok(Received::Nothing)
                    }
                    OpCtl::Pong => {
                        // A Pong frame MAY be sent unsolicited. A response to an unsolicited
                        // Pong frame is not expected. (RFC 6455)
                        trace!("Dropping pong with {} bytes", frame.payload().len());
                        Ok(Received::Nothing)
                    }
                }
            }

            OpCode::Data(data) => {
                let fin = is_final;
                let max_size = self.config.max_message_size;
                match data {
                    OpData::Continue => {
                        let Some(msg) = self.incomplete.as_mut() else {
                            return Err(Error::Protocol(ProtocolError::UnexpectedContinueFrame));
                        };
                        msg.extend(frame.into_data(), max_size)?;
                        if fin {
                            match self.incomplete.take() {
                                Some(msg) => Ok(Received::Message(msg.complete()?)),
                                None => {
                                    Err(Error::Protocol(ProtocolError::UnexpectedContinueFrame))
                                }
                            }
                        } else {
                            Ok(Received::Nothing)
                        }
                    }
                    c if self.incomplete.is_some() => {
                        Err(Error::Protocol(ProtocolError::ExpectedFragment(c)))
                    }
                    OpData::Text | OpData::Binary => {
                        let message_type = if data == OpData::Text {
                            IncompleteMessageType::Text
                        } else {
                            IncompleteMessageType::Binary
                        };
                        let mut msg = IncompleteMessage::new(message_type);
                        msg.extend(frame.into_data(), max_size)?;
                        if fin {
                            Ok(Received::Message(msg.complete()?))
                        } else {
                            self.incomplete = Some(msg);
                            Ok(Received::Nothing)
                        }
                    }
                    OpData::Reserved(i) => Err(Error::Protocol(ProtocolError::InvalidOpcode(i))),
                }
            }
        }
    }

    /// Mask, encode, write and flush a single frame.
    fn write_frame(&mut self, mut frame: Frame) -> Result<()> {
        // 5.  If the data is being sent by the client, the frame(s) MUST be
        // masked as defined in Section 5.3. (RFC 6455)
        frame.set_random_mask();
        trace!("writing frame {frame}");
        self.out_buffer.clear();
        frame.format_into_buf(&mut self.out_buffer)?;
        self.stream.write_all(&self.out_buffer)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Move to the closed state and shut the stream down.
    fn terminate(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = ConnectionState::Closed;
        self.incomplete = None;
        if let Err(err) = self.stream.shutdown() {
            trace!("Shutting down the stream failed: {err}");
        }
        debug!("Connection closed");
    }
}

/// What a single incoming frame amounted to.
enum Received {
    Message(Message),
    Nothing,
    Close,
}

/// The current connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    /// The handshake is done and messages can be exchanged.
    Open,
    /// Closed locally, by the peer or because of an error. Final.
    Closed,
}

#[cfg(test)]
mod tests {
    use super::{ClosedPolicy, Message, Outcome, WsClient, WsConfig};
    use crate::{
        error::{CapacityError, Error, ProtocolError},
        protocol::frame::{
            coding::{CloseCode, Control, OpCode},
            CloseFrame, Frame, FrameDecoder,
        },
        stream::Shutdown,
    };

    use std::io::{self, Cursor, Read, Write};

    /// Reads from a fixed buffer, records writes and shutdowns.
    struct MockStream {
        incoming: Cursor<Vec<u8>>,
        written: Vec<u8>,
        writes: usize,
        reads: usize,
        shutdowns: usize,
        write_error: Option<io::ErrorKind>,
    }

    impl MockStream {
        fn new(incoming: Vec<u8>) -> Self {
            MockStream {
                incoming: Cursor::new(incoming),
                written: Vec::new(),
                writes: 0,
                reads: 0,
                shutdowns: 0,
                write_error: None,
            }
        }

        /// Decode the frames the client wrote; they must be masked.
        fn written_frames(&self) -> Vec<Frame> {
            let mut decoder = FrameDecoder::new().accept_masked_frames(true);
            decoder.feed(&self.written);
            let mut frames = Vec::new();
            while let Some(frame) = decoder.next().unwrap() {
                frames.push(frame);
            }
            assert_eq!(decoder.buffered(), 0);
            frames
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            self.incoming.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(kind) = self.write_error {
                return Err(kind.into());
            }
            self.writes += 1;
            self.written.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Shutdown for MockStream {
        fn shutdown(&mut self) -> io::Result<()> {
            self.shutdowns += 1;
            Ok(())
        }
    }

    fn client(incoming: Vec<u8>) -> WsClient<MockStream> {
        WsClient::from_partially_read(MockStream::new(incoming), Vec::new(), 13, None)
    }

    fn sentinel_client(incoming: Vec<u8>) -> WsClient<MockStream> {
        let config = WsConfig::default().closed_policy(ClosedPolicy::Sentinel);
        WsClient::from_partially_read(MockStream::new(incoming), Vec::new(), 13, Some(config))
    }

    #[test]
    fn receive_messages() {
        let incoming = vec![
            0x01, 0x07, 0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x2c, 0x20, 0x80, 0x06, 0x57, 0x6f, 0x72,
            0x6c, 0x64, 0x21, 0x82, 0x03, 0x01, 0x02, 0x03,
        ];
        let mut socket = client(incoming);
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Done(Message::text("Hello, World!")));
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Done(Message::binary(vec![1, 2, 3])));
    }

    #[test]
    fn leftover_is_the_first_frame() {
        let stream = MockStream::new(vec![0x81, 0x02, b'!', b'!']);
        let mut socket =
            WsClient::from_partially_read(stream, vec![0x81, 0x02, b'h', b'i'], 13, None);
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Done(Message::text("hi")));
        assert_eq!(socket.get_ref().reads, 0);
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Done(Message::text("!!")));
    }

    #[test]
    fn ping_is_answered_once_and_not_returned() {
        let incoming = vec![0x89, 0x02, 0x01, 0x02, 0x81, 0x02, b'o', b'k'];
        let mut socket = client(incoming);
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Done(Message::text("ok")));

        let written = socket.get_ref().written_frames();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].header().opcode, OpCode::Control(Control::Pong));
        assert_eq!(written[0].payload(), &[0x01, 0x02]);
    }

    #[test]
    fn pong_is_dropped() {
        let incoming = vec![0x8a, 0x01, 0x07, 0x82, 0x01, 0x09];
        let mut socket = client(incoming);
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Done(Message::binary(vec![9])));
        assert!(socket.get_ref().written.is_empty());
    }

    #[test]
    fn sent_frames_are_masked() {
        let mut socket = client(Vec::new());
        assert_eq!(socket.send_frame("hello").unwrap(), Outcome::Done(()));
        assert_eq!(socket.send_frame(vec![1u8, 2, 3]).unwrap(), Outcome::Done(()));

        let raw = &socket.get_ref().written;
        assert_eq!(raw[0], 0x81);
        assert_eq!(raw[1] & 0x80, 0x80);

        let frames = socket.get_ref().written_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload(), b"hello");
        assert_eq!(frames[1].payload(), &[1, 2, 3]);
    }

    #[test]
    fn close_frame_from_peer() {
        // Close with code 4321 and reason "bye".
        let incoming = vec![0x88, 0x05, 0x10, 0xe1, b'b', b'y', b'e', 0x81, 0x01, b'x'];
        let mut socket = client(incoming);
        assert!(matches!(socket.recv_frame(), Err(Error::ConnectionClosed)));
        assert!(socket.is_closed());
        assert_eq!(socket.get_ref().shutdowns, 1);

        let close = socket.peer_close_frame().unwrap();
        assert_eq!(close.code, CloseCode::Library(4321));
        assert_eq!(close.reason, "bye");

        // Nothing is echoed back, nothing more is read.
        let reads = socket.get_ref().reads;
        assert!(socket.get_ref().written.is_empty());
        assert!(matches!(socket.recv_frame(), Err(Error::AlreadyClosed)));
        assert!(matches!(socket.send_frame("late"), Err(Error::AlreadyClosed)));
        assert_eq!(socket.get_ref().reads, reads);
        assert!(socket.get_ref().written.is_empty());
    }

    #[test]
    fn close_frame_from_peer_with_sentinel() {
        let mut socket = sentinel_client(vec![0x88, 0x00]);
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Closed);
        assert!(socket.peer_close_frame().is_none());
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Closed);
        assert_eq!(socket.send_frame("late").unwrap(), Outcome::Closed);
        assert!(socket.get_ref().written.is_empty());
    }

    #[test]
    fn end_of_stream_closes() {
        let mut socket = client(vec![0x81, 0x05, b'H', b'e']);
        assert!(matches!(socket.recv_frame(), Err(Error::ConnectionClosed)));
        assert!(socket.is_closed());
        assert_eq!(socket.get_ref().shutdowns, 1);

        let mut socket = sentinel_client(Vec::new());
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Closed);
    }

    #[test]
    fn local_close_is_final() {
        let mut socket = client(vec![0x81, 0x01, b'x']);
        socket
            .close(Some(CloseFrame { code: CloseCode::Normal, reason: "done".into() }))
            .unwrap();
        socket.close(None).unwrap();
        assert!(socket.is_closed());
        assert_eq!(socket.get_ref().writes, 1);
        assert_eq!(socket.get_ref().shutdowns, 1);

        let frames = socket.get_ref().written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header().opcode, OpCode::Control(Control::Close));
        assert_eq!(frames[0].payload(), &[0x03, 0xe8, b'd', b'o', b'n', b'e']);

        assert!(matches!(socket.send_frame("x"), Err(Error::AlreadyClosed)));
        assert!(matches!(socket.recv_frame(), Err(Error::AlreadyClosed)));
        assert_eq!(socket.get_ref().reads, 0);
        assert_eq!(socket.get_ref().writes, 1);
    }

    #[test]
    fn close_reason_too_long() {
        let mut socket = client(Vec::new());
        let reason = "x".repeat(124);
        assert!(matches!(
            socket.close(Some(CloseFrame { code: CloseCode::Normal, reason: reason.into() })),
            Err(Error::Protocol(ProtocolError::ControlFrameTooBig))
        ));
        assert!(!socket.is_closed());
        assert!(socket.get_ref().written.is_empty());
    }

    #[test]
    fn close_with_reserved_code_is_refused() {
        let mut socket = client(Vec::new());
        for code in [CloseCode::Status, CloseCode::Abnormal, CloseCode::Tls, CloseCode::from(999)] {
            assert!(matches!(
                socket.close(Some(CloseFrame { code, reason: "".into() })),
                Err(Error::Protocol(ProtocolError::InvalidCloseSequence))
            ));
        }
        assert!(!socket.is_closed());
        assert!(socket.get_ref().written.is_empty());

        let close = CloseFrame { code: CloseCode::Library(4321), reason: "".into() };
        socket.close(Some(close)).unwrap();
        assert!(socket.is_closed());
        assert_eq!(socket.get_ref().written_frames()[0].payload(), &[0x10, 0xe1]);
    }

    #[test]
    fn close_ignores_broken_pipe() {
        let mut socket = client(Vec::new());
        socket.get_mut().write_error = Some(io::ErrorKind::BrokenPipe);
        socket.close(None).unwrap();
        assert!(socket.is_closed());
    }

    #[test]
    fn write_failure_closes() {
        let mut socket = client(Vec::new());
        socket.get_mut().write_error = Some(io::ErrorKind::ConnectionReset);
        assert!(matches!(socket.send_frame("x"), Err(Error::Io(_))));
        assert!(socket.is_closed());
    }

    #[test]
    fn masked_frame_is_fatal() {
        let mut frame = Frame::message(b"hi".to_vec(), OpCode::Data(super::OpData::Text), true);
        frame.set_random_mask();
        let mut incoming = Vec::new();
        frame.format(&mut incoming).unwrap();

        let mut socket = client(incoming);
        assert!(matches!(
            socket.recv_frame(),
            Err(Error::Protocol(ProtocolError::MaskedFrameFromServer))
        ));
        assert!(socket.is_closed());
    }

    #[test]
    fn masked_frame_accepted_when_configured() {
        let mut frame = Frame::message(b"hi".to_vec(), OpCode::Data(super::OpData::Text), true);
        frame.set_random_mask();
        let mut incoming = Vec::new();
        frame.format(&mut incoming).unwrap();

        let config = WsConfig::default().accept_masked_frames(true);
        let mut socket =
            WsClient::from_partially_read(MockStream::new(incoming), Vec::new(), 13, Some(config));
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Done(Message::text("hi")));
    }

    #[test]
    fn protocol_violations_close() {
        let cases: Vec<(Vec<u8>, ProtocolError)> = vec![
            (vec![0xc1, 0x00], ProtocolError::NonZeroReservedBits),
            (vec![0x09, 0x00], ProtocolError::FragmentedControlFrame),
            (vec![0x80, 0x00], ProtocolError::UnexpectedContinueFrame),
            (vec![0x88, 0x01, 0x03], ProtocolError::InvalidCloseSequence),
            // 1005 must never be sent.
            (vec![0x88, 0x02, 0x03, 0xed], ProtocolError::InvalidCloseSequence),
            (vec![0x88, 0x02, 0x00, 0x01], ProtocolError::InvalidCloseSequence),
            (vec![0x81, 0x02, 0xff, 0xfe], ProtocolError::InvalidUtf8),
            (vec![0x82, 0x7f, 0x80, 0, 0, 0, 0, 0, 0, 0x01], ProtocolError::InvalidPayloadLength),
        ];
        let mut oversized_ping = vec![0x89, 0x7e, 0x00, 0x7e];
        oversized_ping.extend([0u8; 126]);
        let cases = cases
            .into_iter()
            .chain(std::iter::once((oversized_ping, ProtocolError::ControlFrameTooBig)));

        for (incoming, expected) in cases {
            let mut socket = client(incoming);
            match socket.recv_frame() {
                Err(Error::Protocol(err)) => assert_eq!(err, expected),
                other => panic!("expected {expected:?}, got {other:?}"),
            }
            assert!(socket.is_closed());
            assert!(socket.peer_close_frame().is_none());
            assert!(socket.get_ref().written.is_empty());
            assert_eq!(socket.get_ref().shutdowns, 1);
        }
    }

    #[test]
    fn invalid_text_split_over_fragments() {
        // Two-byte code point cut short by the final fragment.
        let mut socket = client(vec![0x01, 0x01, b'a', 0x80, 0x01, 0xc3]);
        assert!(matches!(
            socket.recv_frame(),
            Err(Error::Protocol(ProtocolError::InvalidUtf8))
        ));
        assert!(socket.is_closed());
    }

    #[test]
    fn data_while_fragment_pending() {
        let mut socket = client(vec![0x01, 0x01, b'a', 0x81, 0x01, b'b']);
        assert!(matches!(
            socket.recv_frame(),
            Err(Error::Protocol(ProtocolError::ExpectedFragment(super::OpData::Text)))
        ));
    }

    #[test]
    fn ping_between_fragments() {
        let incoming = vec![0x01, 0x01, b'a', 0x89, 0x00, 0x80, 0x01, b'b'];
        let mut socket = client(incoming);
        assert_eq!(socket.recv_frame().unwrap(), Outcome::Done(Message::text("ab")));
        assert_eq!(socket.get_ref().written_frames().len(), 1);
    }

    #[test]
    fn message_size_limits() {
        let config = WsConfig::default().max_message_size(Some(3));
        let incoming = vec![0x02, 0x02, 1, 2, 0x80, 0x02, 3, 4];
        let mut socket =
            WsClient::from_partially_read(MockStream::new(incoming), Vec::new(), 13, Some(config));
        assert!(matches!(
            socket.send_frame(vec![0u8; 4]),
            Err(Error::Capacity(CapacityError::MessageTooLong { size: 4, max_size: 3 }))
        ));
        assert!(!socket.is_closed());
        assert!(matches!(
            socket.recv_frame(),
            Err(Error::Capacity(CapacityError::MessageTooLong { size: 4, max_size: 3 }))
        ));
        assert!(socket.is_closed());
    }

    #[test]
    fn would_block_keeps_connection() {
        struct Blocking;
        impl Read for Blocking {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::ErrorKind::WouldBlock.into())
            }
        }
        impl Write for Blocking {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        impl Shutdown for Blocking {
            fn shutdown(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut socket = WsClient::from_partially_read(Blocking, vec![0x81, 0x03, b'a'], 13, None);
        match socket.recv_frame() {
            Err(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::WouldBlock),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!socket.is_closed());
    }
}

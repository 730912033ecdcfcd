//! Error handling.

use std::{io, result, str, string};

use http::StatusCode;
use thiserror::Error;

use crate::protocol::frame::coding::Data;

/// Result type of all ws-sync library calls.
pub type Result<T, E = Error> = result::Result<T, E>;

/// Possible WebSocket errors.
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket connection closed by the peer. This informs you of the close.
    /// It's not an error as such and nothing wrong happened.
    ///
    /// Returned by [`WsClient::recv_frame`](crate::WsClient::recv_frame) under
    /// [`ClosedPolicy::Fail`](crate::ClosedPolicy::Fail) as soon as the server sent a
    /// close frame or shut the stream down. The underlying stream has already been
    /// shut down at this point.
    #[error("Connection closed normally")]
    ConnectionClosed,
    /// Trying to work with already closed connection.
    ///
    /// Trying to read or write after the connection has been closed, locally or by the
    /// peer, causes this. No I/O is performed.
    #[error("Trying to work with closed connection")]
    AlreadyClosed,
    /// Input-output error. Apart from `WouldBlock` and `TimedOut` these are fatal and
    /// the connection is closed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// - When reading: frame or handshake exceeded the configured limit.
    /// - When writing: your message is bigger than the configured max message size.
    #[error("Space limit exceeded: {0}")]
    Capacity(#[from] CapacityError),
    /// Protocol violation.
    #[error("WebSocket protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The opening handshake was malformed or rejected. No connection was produced.
    #[error("WebSocket handshake error: {0}")]
    Handshake(#[from] HandshakeError),
    /// UTF coding error.
    #[error("UTF-8 encoding error")]
    Utf8,
    /// Invalid URL.
    #[error("URL error: {0}")]
    Url(#[from] UrlError),
}

impl From<str::Utf8Error> for Error {
    fn from(_: str::Utf8Error) -> Self {
        Error::Utf8
    }
}

impl From<string::FromUtf8Error> for Error {
    fn from(_: string::FromUtf8Error) -> Self {
        Error::Utf8
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        match err {
            url::ParseError::EmptyHost => Error::Url(UrlError::EmptyHostName),
            err => Error::Url(UrlError::Parse(err)),
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(err: httparse::Error) -> Self {
        match err {
            httparse::Error::TooManyHeaders => Error::Handshake(HandshakeError::TooManyHeaders),
            e => Error::Handshake(HandshakeError::Malformed(e)),
        }
    }
}

/// Indicates the specific type/cause of a capacity error.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum CapacityError {
    /// Message is bigger than the maximum allowed size.
    #[error("Message too long: {size} > {max_size}")]
    MessageTooLong {
        /// The size of the message.
        size: usize,
        /// The maximum allowed message size.
        max_size: usize,
    },
}

/// Indicates the specific type/cause of a handshake failure.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum HandshakeError {
    /// Wrong HTTP version used (the WebSocket protocol requires version 1.1 or higher).
    #[error("HTTP version must be 1.1 or higher")]
    WrongHttpVersion,
    /// The server answered with something other than `101 Switching Protocols`.
    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(StatusCode),
    /// Missing `Connection: upgrade` HTTP header.
    #[error("No \"Connection: upgrade\" header")]
    MissingConnectionUpgradeHeader,
    /// Missing `Upgrade: websocket` HTTP header.
    #[error("No \"Upgrade: websocket\" header")]
    MissingUpgradeWebSocketHeader,
    /// The `Sec-WebSocket-Accept` header is either not present or does not specify the correct
    /// key value.
    #[error("Key mismatch in \"Sec-WebSocket-Accept\" header")]
    SecWebSocketAcceptKeyMismatch,
    /// No more data while still performing handshake.
    #[error("Handshake not finished")]
    Incomplete,
    /// The response header block is bigger than the configured limit.
    #[error("Header too long")]
    HeaderTooLong,
    /// Too many headers provided (see [`httparse::Error::TooManyHeaders`]).
    #[error("Too many headers")]
    TooManyHeaders,
    /// Wrapper around a [`httparse::Error`] value.
    #[error("httparse error: {0}")]
    Malformed(httparse::Error),
}

/// Indicates the specific type/cause of a protocol error.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProtocolError {
    /// Reserved bits in frame header are non-zero.
    #[error("Reserved bits are non-zero")]
    NonZeroReservedBits,
    /// The client must close the connection when a masked frame is received.
    #[error("Received a masked frame from server")]
    MaskedFrameFromServer,
    /// Control frames must not be fragmented.
    #[error("Fragmented control frame")]
    FragmentedControlFrame,
    /// Control frames must have a payload of 125 bytes or less.
    #[error("Control frame too big (payload must be 125 bytes or less)")]
    ControlFrameTooBig,
    /// Received a continue frame despite there being nothing to continue.
    #[error("Continue frame but nothing to continue")]
    UnexpectedContinueFrame,
    /// Received data while waiting for more fragments.
    #[error("While waiting for more fragments received: {0}")]
    ExpectedFragment(Data),
    /// Encountered an invalid opcode.
    #[error("Encountered invalid opcode: {0}")]
    InvalidOpcode(u8),
    /// The payload for the closing frame is invalid.
    #[error("Invalid close sequence")]
    InvalidCloseSequence,
    /// A text message is not valid UTF-8.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,
    /// The most significant bit of a 64-bit payload length is set.
    #[error("Payload length has the most significant bit set")]
    InvalidPayloadLength,
}

/// Indicates the specific type/cause of URL error.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlError {
    /// The URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Parse(url::ParseError),
    /// `wss://` was requested, TLS is not supported by this crate.
    #[error("TLS support not compiled in")]
    TlsFeatureNotEnabled,
    /// The URL does not include a host name.
    #[error("No host name in the URL")]
    NoHostName,
    /// Failed to connect with this URL.
    #[error("Unable to connect to {0}")]
    UnableToConnect(String),
    /// Unsupported URL scheme used (only `ws://` may be used).
    #[error("URL scheme not supported")]
    UnsupportedUrlScheme,
    /// The URL host name, though included, is empty.
    #[error("URL contains empty host name")]
    EmptyHostName,
}

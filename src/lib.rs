//! Blocking WebSocket client for Rust.
//!
//! A [`WsClient`] performs the opening handshake over any `Read + Write` stream and then
//! exchanges messages synchronously: [`WsClient::send_frame`], [`WsClient::recv_frame`] and
//! [`WsClient::close`] block until they made progress. Pings are answered automatically.
#![deny(
    missing_docs,
    missing_copy_implementations,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_must_use,
    unused_mut,
    unused_imports,
    unused_import_braces
)]

pub use http;

pub mod buffer;
pub mod client;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod stream;

const READ_BUFFER_CHUNK_SIZE: usize = 4096;
type ReadBuffer = buffer::ReadBuffer<READ_BUFFER_CHUNK_SIZE>;

pub use crate::{
    client::{client, connect, Target},
    error::{Error, Result},
    handshake::client::ClientHandshake,
    protocol::{
        frame::{coding::CloseCode, CloseFrame, FrameDecoder},
        ClosedPolicy, Message, Outcome, WsClient, WsConfig,
    },
};

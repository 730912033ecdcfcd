#![no_main]
use libfuzzer_sys::fuzz_target;

use std::io::{self, Cursor, Read, Write};
use ws_sync::{stream::Shutdown, Outcome, WsClient};

/// Replays the fuzz input as server traffic and discards everything written.
struct WriteMoc<Stream>(Stream);

impl<Stream> Write for WriteMoc<Stream> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<Stream: Read> Read for WriteMoc<Stream> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<Stream> Shutdown for WriteMoc<Stream> {
    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let stream = WriteMoc(Cursor::new(data));
    let mut socket = WsClient::from_partially_read(stream, Vec::new(), 13, None);
    while let Ok(Outcome::Done(_)) = socket.recv_frame() {}
});

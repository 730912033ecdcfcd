//! Convenience wrappers for the byte streams a client runs over.
//!
//! Any `Read + Write` stream will do, as long as it can be shut down once the
//! connection is closed.

use std::io::Result as IoResult;
use std::net::{Shutdown as NetShutdown, TcpStream};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Trait to switch TCP_NODELAY.
pub trait NoDelay {
    /// Set the TCP_NODELAY option to the given value.
    fn set_nodelay(&mut self, nodelay: bool) -> IoResult<()>;
}

impl NoDelay for TcpStream {
    fn set_nodelay(&mut self, nodelay: bool) -> IoResult<()> {
        TcpStream::set_nodelay(self, nodelay)
    }
}

/// Trait to close the transport once the WebSocket connection is done with it.
pub trait Shutdown {
    /// Shut down both directions of the stream.
    fn shutdown(&mut self) -> IoResult<()>;
}

impl Shutdown for TcpStream {
    fn shutdown(&mut self) -> IoResult<()> {
        TcpStream::shutdown(self, NetShutdown::Both)
    }
}

#[cfg(unix)]
impl Shutdown for UnixStream {
    fn shutdown(&mut self) -> IoResult<()> {
        UnixStream::shutdown(self, NetShutdown::Both)
    }
}

impl<S: Shutdown + ?Sized> Shutdown for &mut S {
    fn shutdown(&mut self) -> IoResult<()> {
        (**self).shutdown()
    }
}

impl<S: Shutdown + ?Sized> Shutdown for Box<S> {
    fn shutdown(&mut self) -> IoResult<()> {
        (**self).shutdown()
    }
}

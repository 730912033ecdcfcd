//! Methods to connect to a WebSocket server as a client.

use std::fmt;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::*;
use url::Url;

use crate::{
    error::{Error, Result, UrlError},
    handshake::client::{ClientHandshake, Response},
    protocol::{WsClient, WsConfig},
    stream::{NoDelay, Shutdown},
};

/// A parsed `ws://` URL the client can connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    host: String,
    port: u16,
}

impl Target {
    /// Parse and validate a WebSocket URL.
    pub fn parse(url: &str) -> Result<Self> {
        Self::from_url(Url::parse(url)?)
    }

    /// Validate an already parsed URL.
    pub fn from_url(url: Url) -> Result<Self> {
        match url.scheme() {
            "ws" => {}
            "wss" => return Err(Error::Url(UrlError::TlsFeatureNotEnabled)),
            _ => return Err(Error::Url(UrlError::UnsupportedUrlScheme)),
        }

        // `ws` is a special scheme, so a parsed URL always has a non-empty host.
        let host = url.host_str().ok_or(Error::Url(UrlError::NoHostName))?.to_owned();
        let port = url.port_or_known_default().unwrap_or(80);

        Ok(Target { url, host, port })
    }

    /// The host name or address literal (IPv6 addresses are bracketed).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The TCP port, 80 unless the URL names one.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The value of the `Host` request header. The port is only included when the URL
    /// states a non-default one.
    pub fn host_header(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// The request target of the opening `GET`: path plus query, `/` if the URL has no path.
    pub fn request_path(&self) -> String {
        let path = match self.url.path() {
            "" => "/",
            path => path,
        };
        match self.url.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        }
    }

    /// The full URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Resolve the target into socket addresses.
    pub fn socket_addrs(&self) -> Result<Vec<SocketAddr>> {
        let host = self.url.host().ok_or(Error::Url(UrlError::NoHostName))?;
        let addrs: Vec<SocketAddr> = match host {
            url::Host::Domain(domain) => (domain, self.port).to_socket_addrs()?.collect(),
            url::Host::Ipv4(ip) => vec![(ip, self.port).into()],
            url::Host::Ipv6(ip) => vec![(ip, self.port).into()],
        };
        Ok(addrs)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Trait for converting various types into a [`Target`].
pub trait IntoTarget {
    /// Convert into a validated target.
    fn into_target(self) -> Result<Target>;
}

impl<'a> IntoTarget for &'a str {
    fn into_target(self) -> Result<Target> {
        Target::parse(self)
    }
}

impl<'a> IntoTarget for &'a String {
    fn into_target(self) -> Result<Target> {
        Target::parse(self)
    }
}

impl IntoTarget for String {
    fn into_target(self) -> Result<Target> {
        Target::parse(&self)
    }
}

impl IntoTarget for Url {
    fn into_target(self) -> Result<Target> {
        Target::from_url(self)
    }
}

impl<'a> IntoTarget for &'a Url {
    fn into_target(self) -> Result<Target> {
        Target::from_url(self.clone())
    }
}

impl IntoTarget for Target {
    fn into_target(self) -> Result<Target> {
        Ok(self)
    }
}

/// Connect to the given WebSocket in blocking mode.
///
/// Uses a websocket configuration passed as an argument to the function. Calling it with `None` is
/// equal to calling `connect()` function.
///
/// Only `ws://` URLs are supported. This function "just works" for those who want a simple
/// blocking solution similar to `std::net::TcpStream`. If you want a custom stream, call
/// [`client_with_config`] instead.
pub fn connect_with_config<T: IntoTarget>(
    target: T,
    config: Option<WsConfig>,
) -> Result<(WsClient<TcpStream>, Response)> {
    let target = target.into_target()?;
    let config = config.unwrap_or_default();
    let addrs = target.socket_addrs()?;
    let mut stream = connect_to_some(&addrs, &target, config.connect_timeout)?;
    NoDelay::set_nodelay(&mut stream, true)?;
    client_with_config(target, stream, Some(config))
}

/// Connect to the given WebSocket in blocking mode.
///
/// See [`connect_with_config`].
pub fn connect<T: IntoTarget>(target: T) -> Result<(WsClient<TcpStream>, Response)> {
    connect_with_config(target, None)
}

/// Try each address in order and return the first stream that connects.
pub fn connect_to_some(
    addrs: &[SocketAddr],
    target: &Target,
    timeout: Option<Duration>,
) -> Result<TcpStream> {
    for addr in addrs {
        debug!("Trying to contact {target} at {addr}...");
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => debug!("Failed to connect to {addr}: {err}"),
        }
    }
    Err(Error::Url(UrlError::UnableToConnect(target.to_string())))
}

/// Do the client handshake over the given stream given a web socket configuration. Passing `None`
/// as configuration is equal to calling `client()` function.
///
/// Use this function if you want to use a custom stream like a `UnixStream` or a TLS stream
/// established elsewhere. Any stream supporting `Read + Write + Shutdown` will do.
pub fn client_with_config<T, Stream>(
    target: T,
    mut stream: Stream,
    config: Option<WsConfig>,
) -> Result<(WsClient<Stream>, Response)>
where
    T: IntoTarget,
    Stream: Read + Write + Shutdown,
{
    let target = target.into_target()?;
    let config = config.unwrap_or_default();
    let outcome = ClientHandshake::new(&target).perform(&mut stream, config.max_handshake_size)?;
    let client =
        WsClient::from_partially_read(stream, outcome.leftover, outcome.version, Some(config));
    Ok((client, outcome.response))
}

/// Do the client handshake over the given stream.
///
/// See [`client_with_config`].
pub fn client<T, Stream>(target: T, stream: Stream) -> Result<(WsClient<Stream>, Response)>
where
    T: IntoTarget,
    Stream: Read + Write + Shutdown,
{
    client_with_config(target, stream, None)
}

//! Client handshake machine.

use std::io::{ErrorKind, Read, Write};

use bytes::Buf;
use http::{HeaderMap, HeaderName, HeaderValue, Response as HttpResponse, StatusCode};
use httparse::Status;
use log::*;

use super::{derive_accept_key, generate_key, MAX_HEADERS, WEBSOCKET_VERSION};
use crate::{
    client::Target,
    error::{Error, HandshakeError, Result},
    ReadBuffer,
};

/// Server response.
pub type Response = HttpResponse<()>;

/// What a successful handshake hands over to the connection.
#[derive(Debug)]
pub struct HandshakeOutcome {
    /// The negotiated protocol version.
    pub version: u8,
    /// The server's `101 Switching Protocols` response.
    pub response: Response,
    /// Bytes received past the end of the response headers. They belong to the first
    /// WebSocket frame(s) and must be fed to the frame decoder.
    pub leftover: Vec<u8>,
}

/// Client handshake.
#[derive(Debug)]
pub struct ClientHandshake {
    request: Vec<u8>,
    verify_data: VerifyData,
}

impl ClientHandshake {
    /// Prepare a handshake for the given target with a fresh random key.
    pub fn new(target: &Target) -> Self {
        Self::with_key(target, generate_key())
    }

    /// Prepare a handshake for the given target using the given `Sec-WebSocket-Key`.
    pub fn with_key(target: &Target, key: String) -> Self {
        let request = generate_request(target, &key);
        let accept_key = derive_accept_key(key.as_bytes());
        ClientHandshake { request, verify_data: VerifyData { accept_key } }
    }

    /// The raw request this handshake sends.
    pub fn request(&self) -> &[u8] {
        &self.request
    }

    /// Run the handshake to the end over a blocking stream.
    ///
    /// Writes the request, then reads until a complete response header block arrived
    /// and verifies it. `max_size` bounds the size of the response header block.
    pub fn perform<S: Read + Write>(
        self,
        stream: &mut S,
        max_size: usize,
    ) -> Result<HandshakeOutcome> {
        debug!("Performing client handshake...");
        stream.write_all(&self.request)?;
        stream.flush()?;

        let mut buf = ReadBuffer::new();
        loop {
            match buf.read_from(stream) {
                Ok(0) => return Err(Error::Handshake(HandshakeError::Incomplete)),
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }

            if let Some((size, response)) = Response::try_parse(Buf::chunk(&buf))? {
                self.verify_data.verify_response(&response)?;
                buf.advance(size);
                let leftover = buf.into_vec();
                debug!("Client handshake done, {} bytes past the response.", leftover.len());
                return Ok(HandshakeOutcome { version: WEBSOCKET_VERSION, response, leftover });
            }

            if buf.remaining() > max_size {
                return Err(Error::Handshake(HandshakeError::HeaderTooLong));
            }
        }
    }
}

/// Generate the opening request for the given target and key.
fn generate_request(target: &Target, key: &str) -> Vec<u8> {
    let mut req = Vec::new();
    write!(
        req,
        "\
         GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: {version}\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         \r\n",
        path = target.request_path(),
        host = target.host_header(),
        version = WEBSOCKET_VERSION,
        key = key,
    )
    .expect("Bug: writing to a Vec never fails");
    trace!("Request: {:?}", String::from_utf8_lossy(&req));
    req
}

/// Information for handshake verification.
#[derive(Debug)]
struct VerifyData {
    /// Accepted server key.
    accept_key: String,
}

impl VerifyData {
    fn verify_response(&self, response: &Response) -> Result<()> {
        // 1. If the status code received from the server is not 101, the
        // client handles the response per HTTP [RFC2616] procedures. (RFC 6455)
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(Error::Handshake(HandshakeError::UnexpectedStatus(response.status())));
        }

        let headers = response.headers();

        // 2. If the response lacks an |Upgrade| header field or the |Upgrade|
        // header field contains a value that is not an ASCII case-
        // insensitive match for the value "websocket", the client MUST
        // _Fail the WebSocket Connection_. (RFC 6455)
        if !headers
            .get("Upgrade")
            .and_then(|h| h.to_str().ok())
            .map(|h| h.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
        {
            return Err(Error::Handshake(HandshakeError::MissingUpgradeWebSocketHeader));
        }
        // 3.  If the response lacks a |Connection| header field or the
        // |Connection| header field doesn't contain a token that is an
        // ASCII case-insensitive match for the value "Upgrade", the client
        // MUST _Fail the WebSocket Connection_. (RFC 6455)
        if !headers
            .get("Connection")
            .and_then(|h| h.to_str().ok())
            .map(|h| h.split(|c| c == ' ' || c == ',').any(|p| p.eq_ignore_ascii_case("Upgrade")))
            .unwrap_or(false)
        {
            return Err(Error::Handshake(HandshakeError::MissingConnectionUpgradeHeader));
        }
        // 4.  If the response lacks a |Sec-WebSocket-Accept| header field or
        // the |Sec-WebSocket-Accept| contains a value other than the
        // base64-encoded SHA-1 of ... the client MUST _Fail the WebSocket
        // Connection_. (RFC 6455)
        if !headers.get("Sec-WebSocket-Accept").map(|h| h == &self.accept_key).unwrap_or(false) {
            return Err(Error::Handshake(HandshakeError::SecWebSocketAcceptKeyMismatch));
        }

        Ok(())
    }
}

/// Trait to read HTTP parseable objects.
trait TryParse: Sized {
    /// Return Ok(None) if incomplete, Err on syntax error.
    fn try_parse(data: &[u8]) -> Result<Option<(usize, Self)>>;
}

impl TryParse for Response {
    fn try_parse(buf: &[u8]) -> Result<Option<(usize, Self)>> {
        let mut hbuffer = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Response::new(&mut hbuffer);
        Ok(match req.parse(buf)? {
            Status::Partial => None,
            Status::Complete(size) => Some((size, Response::from_httparse(req)?)),
        })
    }
}

/// Trait to convert raw objects into HTTP parseables.
trait FromHttparse<T>: Sized {
    /// Convert raw object into parsed HTTP headers.
    fn from_httparse(raw: T) -> Result<Self>;
}

impl<'h, 'b: 'h> FromHttparse<httparse::Response<'h, 'b>> for Response {
    fn from_httparse(raw: httparse::Response<'h, 'b>) -> Result<Self> {
        if raw.version.expect("Bug: no HTTP version") < /*1.*/1 {
            return Err(Error::Handshake(HandshakeError::WrongHttpVersion));
        }

        let status = StatusCode::from_u16(raw.code.expect("Bug: no HTTP status code"))
            .map_err(|_| Error::Handshake(HandshakeError::Malformed(httparse::Error::Status)))?;

        let mut response = Response::new(());
        *response.status_mut() = status;
        *response.headers_mut() = HeaderMap::from_httparse(raw.headers)?;
        *response.version_mut() = http::Version::HTTP_11;

        Ok(response)
    }
}

impl<'b: 'h, 'h> FromHttparse<&'b [httparse::Header<'h>]> for HeaderMap {
    fn from_httparse(raw: &'b [httparse::Header<'h>]) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for h in raw {
            headers.append(
                HeaderName::from_bytes(h.name.as_bytes()).map_err(|_| {
                    Error::Handshake(HandshakeError::Malformed(httparse::Error::HeaderName))
                })?,
                HeaderValue::from_bytes(h.value).map_err(|_| {
                    Error::Handshake(HandshakeError::Malformed(httparse::Error::HeaderValue))
                })?,
            );
        }

        Ok(headers)
    }
}

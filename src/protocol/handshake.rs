//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! Parsing and writing of the HTTP/1.1 upgrade request and response. No I/O
//! happens here; see [`crate::codec::http`] for reading the head off a channel.

use std::collections::HashMap;
use std::fmt::Write as _;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::config::Limits;
use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Parse header lines into a map keyed by lowercase name.
///
/// Repeating one of `unique` is an error.
fn parse_headers<'a, I>(lines: I, unique: &[&str]) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name_lower = name.trim().to_ascii_lowercase();
            if unique.contains(&name_lower.as_str()) && headers.contains_key(&name_lower) {
                return Err(Error::InvalidHandshake(format!(
                    "Duplicate header: {}",
                    name.trim()
                )));
            }
            headers.insert(name_lower, value.trim().to_string());
        }
    }

    Ok(headers)
}

fn require<'h>(headers: &'h HashMap<String, String>, name: &str, display: &str) -> Result<&'h str> {
    headers
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidHandshake(format!("Missing {display} header")))
}

fn check_upgrade_headers(headers: &HashMap<String, String>) -> Result<()> {
    let upgrade = require(headers, "upgrade", "Upgrade")?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Upgrade header: {upgrade}"
        )));
    }

    let connection = require(headers, "connection", "Connection")?;
    let has_upgrade = connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if !has_upgrade {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Connection header: {connection}"
        )));
    }
    Ok(())
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use simple_ws::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh Sec-WebSocket-Key: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns `Error::Io` if the operating system RNG is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Opening handshake request sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The request target, including any query string.
    pub path: String,
    /// The Host header value.
    pub host: String,
    /// The Sec-WebSocket-Key header value.
    pub key: String,
    /// The Sec-WebSocket-Version (must be 13).
    pub version: u8,
}

impl HandshakeRequest {
    /// Build a client request with version 13.
    #[must_use]
    pub fn new(host: impl Into<String>, path: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host: host.into(),
            key: key.into(),
            version: 13,
        }
    }

    /// Parse a handshake request from the raw HTTP head.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - The data is not valid UTF-8 or the request line is malformed.
    /// - The method is not `GET` or the version is not `HTTP/1.1`.
    /// - `Upgrade`, `Connection`, `Host`, `Sec-WebSocket-Key` or
    ///   `Sec-WebSocket-Version` is missing, invalid or duplicated.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let &[method, target, http_version] = parts.as_slice() else {
            return Err(Error::InvalidHandshake("Invalid request line".into()));
        };
        if method != "GET" {
            return Err(Error::InvalidHandshake(format!(
                "Expected GET method, got {method}"
            )));
        }
        if http_version != "HTTP/1.1" {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP/1.1, got {http_version}"
            )));
        }

        let headers = parse_headers(
            lines,
            &[
                "host",
                "upgrade",
                "connection",
                "sec-websocket-key",
                "sec-websocket-version",
            ],
        )?;
        check_upgrade_headers(&headers)?;

        let host = require(&headers, "host", "Host")?.to_string();
        let key = require(&headers, "sec-websocket-key", "Sec-WebSocket-Key")?.to_string();
        let version_str = require(&headers, "sec-websocket-version", "Sec-WebSocket-Version")?;
        let version = version_str
            .parse()
            .map_err(|_| Error::InvalidHandshake(format!("Invalid version: {version_str}")))?;

        Ok(Self {
            path: target.to_string(),
            host,
            key,
            version,
        })
    }

    /// Parse a request, rejecting heads above `limits.max_handshake_size`.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeTooLarge` if data exceeds the limit
    /// - Other handshake errors as per `parse()`
    pub fn parse_with_limit(data: &[u8], limits: &Limits) -> Result<Self> {
        limits.check_handshake_size(data.len())?;
        Self::parse(data)
    }

    /// Check the version, key and host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the version is not 13, the key
    /// does not decode to 16 bytes, or the host is empty.
    pub fn validate(&self) -> Result<()> {
        if self.version != 13 {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {} (expected 13)",
                self.version
            )));
        }

        let decoded = BASE64.decode(&self.key).map_err(|_| {
            Error::InvalidHandshake("Invalid Sec-WebSocket-Key: not valid Base64".into())
        })?;
        if decoded.len() != 16 {
            return Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Key must be 16 bytes, got {}",
                decoded.len()
            )));
        }

        if self.host.is_empty() {
            return Err(Error::InvalidHandshake("Host header cannot be empty".into()));
        }

        Ok(())
    }

    /// The path used for routing: the request target without its query string.
    #[must_use]
    pub fn route_path(&self) -> &str {
        self.path
            .split_once('?')
            .map_or(self.path.as_str(), |(path, _)| path)
    }

    /// Write the request head to `buf`.
    pub fn write(&self, buf: &mut Vec<u8>) {
        let mut head = String::with_capacity(192);
        let _ = write!(
            head,
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: {}\r\n\
             \r\n",
            self.path, self.host, self.key, self.version
        );
        buf.extend_from_slice(head.as_bytes());
    }
}

/// `101 Switching Protocols` response sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
}

impl HandshakeResponse {
    /// Create the response answering `req`.
    #[must_use]
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
        }
    }

    /// Write the response head to `buf`.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    /// Parse the server's response head.
    ///
    /// # Errors
    ///
    /// - `Error::UpgradeRejected` if the server answered with another status
    /// - `Error::InvalidHandshake` if the head is malformed or the upgrade
    ///   headers are missing
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        let mut parts = status_line.split_whitespace();
        if parts.next() != Some("HTTP/1.1") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid status line: {status_line}"
            )));
        }
        let status: u16 = parts
            .next()
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| Error::InvalidHandshake(format!("Invalid status line: {status_line}")))?;
        if status != 101 {
            return Err(Error::UpgradeRejected(status));
        }

        let headers = parse_headers(lines, &["sec-websocket-accept"])?;
        check_upgrade_headers(&headers)?;
        let accept = require(&headers, "sec-websocket-accept", "Sec-WebSocket-Accept")?.to_string();

        Ok(Self { accept })
    }

    /// Check that the accept value answers the key the client sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] on mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept == compute_accept_key(key) {
            Ok(())
        } else {
            Err(Error::InvalidHandshake("Sec-WebSocket-Accept mismatch".into()))
        }
    }
}

/// Write a bodiless HTTP error response that refuses the upgrade.
pub fn write_rejection(status: u16, buf: &mut Vec<u8>) {
    let reason = match status {
        400 => "Bad Request",
        404 => "Not Found",
        426 => "Upgrade Required",
        431 => "Request Header Fields Too Large",
        503 => "Service Unavailable",
        _ => "Error",
    };
    buf.extend_from_slice(
        format!("HTTP/1.1 {status} {reason}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n")
            .as_bytes(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    // Test 1: RFC 6455 example verification
    #[test]
    fn test_compute_accept_key_rfc_example() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    // Test 2: Full client request parsing
    #[test]
    fn test_parse_valid_request() {
        let req = HandshakeRequest::parse(RFC_REQUEST).unwrap();
        assert_eq!(req.path, "/chat");
        assert_eq!(req.host, "server.example.com");
        assert_eq!(req.key, "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(req.version, 13);
        assert!(req.validate().is_ok());
    }

    // Test 3: Missing headers
    #[test]
    fn test_parse_request_missing_key() {
        let request = b"GET /chat HTTP/1.1\r\n\
            Host: server.example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Version: 13\r\n\
            \r\n";
        assert!(matches!(
            HandshakeRequest::parse(request),
            Err(Error::InvalidHandshake(msg)) if msg.contains("Sec-WebSocket-Key")
        ));
    }

    #[test]
    fn test_parse_request_missing_upgrade() {
        let request = b"GET /chat HTTP/1.1\r\n\
            Host: server.example.com\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\
            \r\n";
        assert!(matches!(
            HandshakeRequest::parse(request),
            Err(Error::InvalidHandshake(_))
        ));
    }

    // Test 4: Request line
    #[test]
    fn test_invalid_method_and_version() {
        let post = b"POST /chat HTTP/1.1\r\nHost: a\r\n\r\n";
        assert!(matches!(
            HandshakeRequest::parse(post),
            Err(Error::InvalidHandshake(msg)) if msg.contains("GET")
        ));
        let old = b"GET /chat HTTP/1.0\r\nHost: a\r\n\r\n";
        assert!(matches!(
            HandshakeRequest::parse(old),
            Err(Error::InvalidHandshake(msg)) if msg.contains("HTTP/1.1")
        ));
    }

    // Test 5: Validation
    #[test]
    fn test_validate_request() {
        let mut req = HandshakeRequest::parse(RFC_REQUEST).unwrap();
        req.version = 8;
        assert!(req.validate().is_err());

        let mut req = HandshakeRequest::parse(RFC_REQUEST).unwrap();
        req.key = "c2hvcnQ=".into();
        assert!(req.validate().is_err());

        let mut req = HandshakeRequest::parse(RFC_REQUEST).unwrap();
        req.key = "not base64!!".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_case_insensitive_headers() {
        let request = b"GET / HTTP/1.1\r\n\
            HOST: example.com\r\n\
            upgrade: WebSocket\r\n\
            connection: keep-alive, Upgrade\r\n\
            sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            SEC-WEBSOCKET-VERSION: 13\r\n\
            \r\n";
        let req = HandshakeRequest::parse(request).unwrap();
        assert_eq!(req.host, "example.com");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_duplicate_key_header_rejected() {
        let request = b"GET / HTTP/1.1\r\n\
            Host: example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Key: AAAAAAAAAAAAAAAAAAAAAA==\r\n\
            Sec-WebSocket-Version: 13\r\n\
            \r\n";
        assert!(matches!(
            HandshakeRequest::parse(request),
            Err(Error::InvalidHandshake(msg)) if msg.contains("Duplicate")
        ));
    }

    #[test]
    fn test_handshake_size_limit() {
        let exact = Limits {
            max_handshake_size: RFC_REQUEST.len(),
            ..Limits::default()
        };
        assert!(HandshakeRequest::parse_with_limit(RFC_REQUEST, &exact).is_ok());
        let tiny = Limits {
            max_handshake_size: 10,
            ..Limits::default()
        };
        assert!(matches!(
            HandshakeRequest::parse_with_limit(RFC_REQUEST, &tiny),
            Err(Error::HandshakeTooLarge { max: 10, .. })
        ));
    }

    #[test]
    fn test_route_path_strips_query() {
        let mut req = HandshakeRequest::parse(RFC_REQUEST).unwrap();
        assert_eq!(req.route_path(), "/chat");
        req.path = "/chat?room=1".into();
        assert_eq!(req.route_path(), "/chat");
    }

    // Test 6: Client request and server response round trip
    #[test]
    fn test_client_request_round_trip() {
        let key = generate_key().unwrap();
        let req = HandshakeRequest::new("localhost:8080", "/echo", key.clone());
        let mut buf = Vec::new();
        req.write(&mut buf);

        let parsed = HandshakeRequest::parse(&buf).unwrap();
        assert_eq!(parsed, req);
        assert!(parsed.validate().is_ok());

        let mut response = Vec::new();
        HandshakeResponse::from_request(&parsed).write(&mut response);
        let accepted = HandshakeResponse::parse(&response).unwrap();
        assert!(accepted.verify(&key).is_ok());
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let a = generate_key().unwrap();
        let b = generate_key().unwrap();
        assert_eq!(BASE64.decode(&a).unwrap().len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_response_write() {
        let req = HandshakeRequest::parse(RFC_REQUEST).unwrap();
        let mut buf = Vec::new();
        HandshakeResponse::from_request(&req).write(&mut buf);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_response_accept_mismatch() {
        let response = HandshakeResponse {
            accept: "bogus".into(),
        };
        assert!(matches!(
            response.verify("dGhlIHNhbXBsZSBub25jZQ=="),
            Err(Error::InvalidHandshake(_))
        ));
    }

    #[test]
    fn test_response_missing_accept() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            \r\n";
        assert!(matches!(
            HandshakeResponse::parse(response),
            Err(Error::InvalidHandshake(_))
        ));
    }

    #[test]
    fn test_rejection_is_parsed_as_upgrade_rejected() {
        let mut buf = Vec::new();
        write_rejection(404, &mut buf);
        assert!(buf.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
        assert!(matches!(
            HandshakeResponse::parse(&buf),
            Err(Error::UpgradeRejected(404))
        ));
    }
}

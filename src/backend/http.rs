//! Blocking HTTP/1.1 JSON client for the backend API.

use crate::backend::{BackendError, Envelope, PredictionBackend, SavePredictionRequest};
use crate::readings::Reading;
use std::fmt;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    timeout: Duration,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn send(&self, method: &str, path: &str, body: Option<&str>) -> Result<String, BackendError> {
        let url = self.url(path);
        debug!(method, url = %url, "Backend request");
        send_http_json(method, &url, body, self.token.as_deref(), self.timeout)
    }
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl PredictionBackend for HttpBackend {
    fn fetch_historical(&self, container_id: u32, limit: usize) -> Result<Vec<Reading>, BackendError> {
        let body = self.send(
            "GET",
            &format!("/predictions/data/historical/{container_id}?limit={limit}"),
            None,
        )?;
        let envelope: Envelope<Vec<Reading>> = serde_json::from_str(&body)?;
        envelope.into_data()
    }

    fn save_prediction(&self, record: &SavePredictionRequest) -> Result<(), BackendError> {
        let payload = serde_json::to_string(record)?;
        let body = self.send("POST", "/predictions/save", Some(&payload))?;
        let envelope: Envelope<serde_json::Value> = serde_json::from_str(&body)?;
        if envelope.success {
            Ok(())
        } else {
            envelope.into_data().map(|_| ())
        }
    }
}

#[derive(Debug, PartialEq)]
struct ParsedUrl {
    host: String,
    port: u16,
    path: String,
}

fn parse_http_url(endpoint: &str) -> Result<ParsedUrl, BackendError> {
    let trimmed = endpoint
        .strip_prefix("http://")
        .ok_or_else(|| BackendError::InvalidUrl("only http:// supported".to_string()))?;

    let (host_port, path) = match trimmed.split_once('/') {
        Some((host_port, path)) => (host_port, format!("/{path}")),
        None => (trimmed, "/".to_string()),
    };
    if host_port.is_empty() {
        return Err(BackendError::InvalidUrl("missing host".to_string()));
    }

    let (host, port) = match host_port.split_once(':') {
        Some((host, port)) if !port.is_empty() => (
            host,
            port.parse::<u16>()
                .map_err(|_| BackendError::InvalidUrl("invalid port".to_string()))?,
        ),
        Some((host, _)) => (host, 80),
        None => (host_port, 80),
    };
    if host.is_empty() {
        return Err(BackendError::InvalidUrl("missing host".to_string()));
    }

    Ok(ParsedUrl {
        host: host.to_string(),
        port,
        path,
    })
}

fn send_http_json(
    method: &str,
    endpoint: &str,
    body: Option<&str>,
    token: Option<&str>,
    timeout: Duration,
) -> Result<String, BackendError> {
    let parsed = parse_http_url(endpoint)?;
    let addr = (parsed.host.as_str(), parsed.port)
        .to_socket_addrs()
        .map_err(|err| BackendError::Dns(err.to_string()))?
        .next()
        .ok_or_else(|| BackendError::Dns("no addresses resolved".to_string()))?;

    let mut stream = TcpStream::connect_timeout(&addr, timeout).map_err(BackendError::Connect)?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(BackendError::Io)?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(BackendError::Io)?;

    let request = build_request(method, &parsed, body, token);
    stream
        .write_all(request.as_bytes())
        .map_err(BackendError::Io)?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).map_err(BackendError::Io)?;

    parse_response(&response)
}

fn build_request(method: &str, url: &ParsedUrl, body: Option<&str>, token: Option<&str>) -> String {
    let body = body.unwrap_or("");
    let mut request = format!(
        "{method} {} HTTP/1.1\r\nHost: {}\r\nAccept: application/json\r\nConnection: close\r\n",
        url.path, url.host
    );
    if let Some(token) = token {
        request.push_str(&format!("Authorization: Bearer {token}\r\n"));
    }
    if !body.is_empty() {
        request.push_str("Content-Type: application/json\r\n");
    }
    request.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    request
}

fn parse_response(response: &[u8]) -> Result<String, BackendError> {
    let split = find_subslice(response, b"\r\n\r\n")
        .ok_or_else(|| BackendError::Http(0, "invalid http response".to_string()))?;
    let headers = std::str::from_utf8(&response[..split])
        .map_err(|_| BackendError::Http(0, "non-utf8 response headers".to_string()))?;
    let body = &response[split + 4..];

    let mut lines = headers.lines();
    let status_code = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| BackendError::Http(0, "missing status code".to_string()))?
        .parse::<u16>()
        .map_err(|_| BackendError::Http(0, "invalid status code".to_string()))?;

    let chunked = lines.any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("transfer-encoding")
                && value.trim().eq_ignore_ascii_case("chunked")
        })
    });
    let body = if chunked {
        decode_chunked(body)?
    } else {
        body.to_vec()
    };
    let body = String::from_utf8(body)
        .map_err(|_| BackendError::Http(status_code, "non-utf8 response body".to_string()))?;

    if status_code >= 400 {
        return Err(BackendError::Http(status_code, body.trim().to_string()));
    }
    Ok(body)
}

fn decode_chunked(mut body: &[u8]) -> Result<Vec<u8>, BackendError> {
    let mut decoded = Vec::new();
    loop {
        let line_end = find_subslice(body, b"\r\n")
            .ok_or_else(|| BackendError::Http(0, "truncated chunked body".to_string()))?;
        let size_line = std::str::from_utf8(&body[..line_end])
            .map_err(|_| BackendError::Http(0, "invalid chunk size".to_string()))?;
        let rest = &body[line_end + 2..];
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| BackendError::Http(0, "invalid chunk size".to_string()))?;
        if size == 0 {
            return Ok(decoded);
        }
        let chunk = rest
            .get(..size)
            .ok_or_else(|| BackendError::Http(0, "truncated chunk".to_string()))?;
        decoded.extend_from_slice(chunk);
        body = rest
            .get(size..)
            .and_then(|tail| tail.strip_prefix(b"\r\n".as_slice()))
            .ok_or_else(|| BackendError::Http(0, "missing chunk terminator".to_string()))?;
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

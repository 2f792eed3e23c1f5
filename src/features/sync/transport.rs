//! Outbound HTTP for replaying queued requests.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;

use super::request::QueuedRequest;
use crate::error::SyncError;

/// Sends a queued request and reports the HTTP status code.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Issue the call. `Err` means no response was received.
    fn send(&self, request: &QueuedRequest) -> Result<u16, SyncError>;
}

/// Whether a status code counts as delivered.
#[must_use]
pub const fn is_success(status: u16) -> bool {
    matches!(status, 200..=299)
}

/// Blocking reqwest transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &QueuedRequest) -> Result<u16, SyncError> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            SyncError::InvalidRequest(format!("Invalid method {}: {e}", request.method))
        })?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(build_headers(request)?);

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().map_err(|e| {
            SyncError::Transport(format!("{} {}: {e}", request.method, request.url))
        })?;

        Ok(response.status().as_u16())
    }
}

/// Headers for a replay: the stored ones, or a JSON content type when none were stored.
///
/// # Errors
///
/// Returns an error if a stored header name or value is not valid HTTP.
pub fn build_headers(request: &QueuedRequest) -> Result<HeaderMap, SyncError> {
    let mut map = HeaderMap::new();

    let Some(headers) = &request.headers else {
        map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        return Ok(map);
    };

    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            SyncError::InvalidRequest(format!("Invalid header name {name:?}: {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            SyncError::InvalidRequest(format!("Invalid header value for {name}: {e}"))
        })?;
        map.insert(name, value);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use crate::features::sync::request::NewRequest;

    /// Accept one connection, capture the raw request and answer with `status`.
    fn serve_once(status: &'static str) -> (String, thread::JoinHandle<(String, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);

            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                let done = line == "\r\n";
                head.push_str(&line);
                if done {
                    break;
                }
            }

            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
            .unwrap();
            stream.flush().unwrap();

            (head, body)
        });

        (url, handle)
    }

    #[test]
    fn test_missing_headers_default_to_json() {
        let req = NewRequest::new("POST", "http://x").stamp(1, 3);
        let headers = build_headers(&req).unwrap();

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_stored_headers_are_used_verbatim() {
        let req = NewRequest::new("POST", "http://x")
            .header("Content-Type", "text/plain")
            .header("X-Branch", "nairobi-01")
            .stamp(1, 3);
        let headers = build_headers(&req).unwrap();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[CONTENT_TYPE], "text/plain");
        assert_eq!(headers["x-branch"], "nairobi-01");
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let req = NewRequest::new("POST", "http://x")
            .header("Bad Header", "v")
            .stamp(1, 3);
        assert!(matches!(
            build_headers(&req).unwrap_err(),
            SyncError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_is_success() {
        assert!(is_success(200));
        assert!(is_success(204));
        assert!(!is_success(199));
        assert!(!is_success(304));
        assert!(!is_success(500));
    }

    #[test]
    fn test_send_puts_stored_request_on_the_wire() {
        let (base, server) = serve_once("201 Created");
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let body = r#"{"member":7,"phone":"0712 000 000"}"#;
        let req = NewRequest::new("put", format!("{base}/members/7?branch=nairobi"))
            .body(body)
            .stamp(1, 3);

        assert_eq!(transport.send(&req).unwrap(), 201);

        let (head, received) = server.join().unwrap();
        let head = head.to_lowercase();
        assert!(head.starts_with("put /members/7?branch=nairobi http/1.1\r\n"));
        assert!(head.contains("content-type: application/json\r\n"));
        assert_eq!(received, body.as_bytes());
    }

    #[test]
    fn test_send_uses_stored_headers_and_reports_error_status() {
        let (base, server) = serve_once("409 Conflict");
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let req = NewRequest::new("POST", format!("{base}/visits"))
            .header("Content-Type", "text/plain")
            .header("X-Branch", "nairobi-01")
            .body("visit")
            .stamp(1, 3);

        assert_eq!(transport.send(&req).unwrap(), 409);

        let (head, received) = server.join().unwrap();
        let head = head.to_lowercase();
        assert!(head.starts_with("post /visits http/1.1\r\n"));
        assert!(head.contains("content-type: text/plain\r\n"));
        assert!(head.contains("x-branch: nairobi-01\r\n"));
        assert!(!head.contains("application/json"));
        assert_eq!(received, b"visit");
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let transport = HttpTransport::new(Duration::from_millis(500)).unwrap();
        // Port 9 (discard) on loopback refuses connections
        let req = NewRequest::new("GET", "http://127.0.0.1:9/").stamp(1, 3);

        assert!(matches!(
            transport.send(&req).unwrap_err(),
            SyncError::Transport(_)
        ));
    }
}

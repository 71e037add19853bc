//! Hand-rolled HTTP/1.1 response parser and chunked-transfer decoder
//!
//! Used by the raw-TLS transport (`transport::raw_tls`), which reads an
//! entire socket into one buffer and hands it here rather than relying on
//! a framework's HTTP client.

use std::collections::HashMap;

use crate::error::GatewayError;

/// A fully parsed HTTP/1.1 response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub message: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

fn codec_error(message: impl Into<String>) -> GatewayError {
    GatewayError::error("transport.codec_error")
        .with_status(500)
        .with_data(serde_json::json!({ "message": message.into() }))
}

/// Parse a complete HTTP/1.1 response out of raw bytes read from a socket.
///
/// `buf` must already contain the full response: header block plus whatever
/// of the body framing (`Content-Length` or chunked) demands.
pub fn parse_response(buf: &[u8]) -> Result<HttpResponse, GatewayError> {
    const SEP: &[u8] = b"\r\n\r\n";
    let split_at = buf
        .windows(SEP.len())
        .position(|w| w == SEP)
        .ok_or_else(|| codec_error("no header terminator"))?;

    let head = &buf[..split_at];
    let rest = &buf[split_at + SEP.len()..];

    let head_str = String::from_utf8_lossy(head);
    let mut lines = head_str.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let (status, message) = parse_status_line(status_line)?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let colon = line.find(':').ok_or_else(|| codec_error("header line with no colon"))?;
        let key = line[..colon].trim().to_ascii_lowercase();
        let mut value = &line[colon + 1..];
        if let Some(stripped) = value.strip_prefix(' ') {
            value = stripped;
        }
        headers.insert(key, value.to_string());
    }

    let is_chunked = headers
        .get("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);

    let body = if is_chunked {
        decode_chunked(rest)?
    } else if let Some(len) = headers.get("content-length") {
        let len: usize = len
            .trim()
            .parse()
            .map_err(|_| codec_error("content-length not a non-negative integer"))?;
        if rest.len() != len {
            return Err(codec_error(format!(
                "content-length mismatch: header said {len}, body is {} bytes",
                rest.len()
            )));
        }
        rest.to_vec()
    } else {
        return Err(codec_error("unable to determine body length"));
    };

    Ok(HttpResponse { status, message, headers, body })
}

fn parse_status_line(line: &str) -> Result<(u16, String), GatewayError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    let message = parts.next().unwrap_or_default();

    let valid_version = version == "HTTP/1.0" || version == "HTTP/1.1";
    let valid_code = code.len() == 3 && code.chars().all(|c| c.is_ascii_digit());
    if !valid_version || !valid_code {
        return Err(codec_error("invalid status line"));
    }

    let status: u16 = code.parse().map_err(|_| codec_error("invalid status line"))?;
    Ok((status, message.to_string()))
}

/// Decode an HTTP/1.1 chunked-transfer body.
pub fn decode_chunked(mut buf: &[u8]) -> Result<Vec<u8>, GatewayError> {
    let mut out = Vec::new();
    loop {
        let line_end = find_crlf(buf).ok_or_else(|| codec_error("chunk size line missing CRLF"))?;
        let size_line = &buf[..line_end];
        let size_str = std::str::from_utf8(size_line).map_err(|_| codec_error("chunk size not valid utf-8"))?;
        let size_str = size_str.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| codec_error("chunk size not hex"))?;

        buf = &buf[line_end + 2..];

        if size == 0 {
            return Ok(out);
        }

        if buf.len() < size + 2 {
            return Err(codec_error("claimed chunk size exceeds remaining buffer"));
        }

        out.extend_from_slice(&buf[..size]);
        buf = &buf[size + 2..];
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_chunked_concatenates_chunks() {
        let input = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        assert_eq!(decode_chunked(input).unwrap(), b"hello world");
    }

    #[test]
    fn decode_chunked_fails_without_terminator() {
        let input = b"5\r\nhello\r\n";
        assert!(decode_chunked(input).is_err());
    }

    #[test]
    fn decode_chunked_fails_on_oversized_claim() {
        let input = b"ff\r\nhello\r\n0\r\n\r\n";
        assert!(decode_chunked(input).is_err());
    }

    #[test]
    fn decode_chunked_fails_on_non_hex_size() {
        let input = b"zz\r\nhello\r\n0\r\n\r\n";
        assert!(decode_chunked(input).is_err());
    }

    #[test]
    fn parse_response_round_trips_content_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"a\":\"bcd\"}\r\n";
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.len(), 13);
    }

    #[test]
    fn parse_response_fails_on_missing_header_terminator() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 0";
        assert!(parse_response(raw).is_err());
    }

    #[test]
    fn parse_response_fails_on_invalid_status_line() {
        let raw = b"NOT-HTTP 200 OK\r\n\r\n";
        assert!(parse_response(raw).is_err());
    }

    #[test]
    fn parse_response_fails_on_header_without_colon() {
        let raw = b"HTTP/1.1 200 OK\r\nbroken-header\r\n\r\n";
        assert!(parse_response(raw).is_err());
    }

    #[test]
    fn parse_response_fails_on_length_mismatch() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 99\r\n\r\nshort";
        assert!(parse_response(raw).is_err());
    }

    #[test]
    fn parse_response_fails_when_length_absent_and_not_chunked() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nbody";
        assert!(parse_response(raw).is_err());
    }

    #[test]
    fn parse_response_decodes_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.body, b"hello");
    }
}

//! The raw-TLS transport: opens a TLS socket directly to the upstream host,
//! issues a minimal GET, and parses the response with the hand-rolled codec
//! (spec §4.D.2). Bypassing the usual HTTP client evades some IP-level rate
//! limits that key off a common client fingerprint.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

use super::{parse_json_body, timeout_error, UpstreamRequest};
use crate::error::GatewayError;
use crate::httpcodec;

static TLS_CONFIG: Lazy<Arc<ClientConfig>> = Lazy::new(|| {
    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    Arc::new(config)
});

pub struct RawTlsTransport;

impl RawTlsTransport {
    /// GET `req.url` over a raw TLS socket to `host:443`. The socket is
    /// closed on every exit path (success, timeout, error) because it is
    /// owned exclusively by this call and dropped at function return.
    pub async fn get(
        host: &str,
        req: &UpstreamRequest,
        timeout: Duration,
        non_json_code: &'static str,
        api_failure_code: &'static str,
    ) -> Result<super::UpstreamResponse, GatewayError> {
        let fut = Self::get_inner(host, req);
        let result = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| timeout_error(api_failure_code))?;

        let raw = result.map_err(|_| timeout_error(api_failure_code))?;
        let parsed = httpcodec::parse_response(&raw)?;
        let content_type = parsed.header("content-type").map(str::to_string);
        let body = parse_json_body(content_type.as_deref(), &parsed.body, non_json_code)?;

        Ok(super::UpstreamResponse { status: parsed.status, body, request_type: "tcp" })
    }

    async fn get_inner(host: &str, req: &UpstreamRequest) -> std::io::Result<Vec<u8>> {
        let connector = TlsConnector::from(TLS_CONFIG.clone());
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let tcp = tokio::net::TcpStream::connect((host, 443)).await?;
        let mut tls = connector.connect(server_name, tcp).await?;

        let path = path_of(&req.url);
        let mut request = format!(
            "GET {path} HTTP/1.1\r\nHost: {host}\r\nAccept: application/json\r\nConnection: close\r\n"
        );
        for (name, value) in &req.headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        request.push_str("\r\n");

        tls.write_all(request.as_bytes()).await?;
        tls.flush().await?;

        // Read all bytes before decoding so frames split mid-UTF-8-sequence
        // are reassembled before anything tries to interpret them as text.
        let mut buf = Vec::new();
        tls.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

fn path_of(url: &str) -> String {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    match without_scheme.find('/') {
        Some(idx) => without_scheme[idx..].to_string(),
        None => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_of_strips_scheme_and_host() {
        assert_eq!(path_of("https://api.example.com/foo/bar?x=1"), "/foo/bar?x=1");
        assert_eq!(path_of("https://api.example.com"), "/");
    }
}

// ABOUTME: Page fetching with SSRF protection, content-length limits, and charset decoding.
// ABOUTME: Also hosts the private-network guard shared with the HEAD prober.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use bytes::Bytes;
use ipnet::{Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use url::Url;

use crate::error::{ErrorCode, ResolveError};

/// Maximum allowed page size (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

static PRIVATE_V4: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "0.0.0.0/8",
    ]
    .iter()
    .map(|s| s.parse().unwrap())
    .collect()
});
static PRIVATE_V6: Lazy<Vec<Ipv6Net>> = Lazy::new(|| {
    ["fc00::/7", "fe80::/10"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect()
});

/// Options for fetching a page.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            allow_private_networks: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Result of a successful page fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResult {
    /// Decode the body as text, using the charset from the content-type header or detection.
    pub fn text(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

/// Check if an IP address is in a private, loopback or link-local range.
pub(crate) fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => PRIVATE_V4.iter().any(|net| net.contains(ip)),
        IpAddr::V6(ip) => {
            if ip.is_loopback() || ip.is_unspecified() {
                return true;
            }
            if let Some(v4) = ip.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            PRIVATE_V6.iter().any(|net| net.contains(ip))
        }
    }
}

/// Parse a URL and require an http(s) scheme.
pub(crate) fn parse_http_url(url: &str, op: &str) -> Result<Url, ResolveError> {
    if url.is_empty() {
        return Err(ResolveError::invalid_url(url, op, None));
    }

    let parsed = Url::parse(url).map_err(|e| {
        ResolveError::invalid_url(url, op, Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(ResolveError::invalid_url(
            url,
            op,
            Some(anyhow::anyhow!("scheme must be http or https")),
        )),
    }
}

/// Reject hosts that are, or resolve to, private addresses.
pub(crate) async fn ensure_public_host(url: &Url, op: &str) -> Result<(), ResolveError> {
    let Some(host) = url.host_str() else {
        return Err(ResolveError::invalid_url(
            url.as_str(),
            op,
            Some(anyhow::anyhow!("URL has no host")),
        ));
    };

    // Bracketed IPv6 literals come back from host_str() with their brackets.
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(ResolveError::ssrf(
                url.as_str(),
                op,
                Some(anyhow::anyhow!("private IP addresses are not allowed")),
            ));
        }
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        ResolveError::fetch(
            url.as_str(),
            op,
            Some(anyhow::anyhow!("DNS lookup failed: {}", e)),
        )
    })?;

    for socket_addr in addrs {
        if is_private_ip(&socket_addr.ip()) {
            return Err(ResolveError::ssrf(
                url.as_str(),
                op,
                Some(anyhow::anyhow!("private IP addresses are not allowed")),
            ));
        }
    }

    Ok(())
}

/// Decode body bytes to a String using charset from content-type header or detection.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(ct) = content_type {
        if let Some(charset) = extract_charset(ct) {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(body);
                return decoded.into_owned();
            }
        }
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    for part in lower.split(';') {
        let trimmed = part.trim();
        if let Some(charset) = trimmed.strip_prefix("charset=") {
            let charset = charset.trim_matches('"').trim_matches('\'');
            return Some(charset.to_string());
        }
    }
    None
}

/// Fetch a page's HTML. Any non-2xx status is an error.
pub async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<FetchResult, ResolveError> {
    const OP: &str = "FetchPage";

    let parsed_url = parse_http_url(url, OP)?;
    if !opts.allow_private_networks {
        ensure_public_host(&parsed_url, OP).await?;
    }

    let mut request = client.get(parsed_url).timeout(opts.timeout);
    for (key, value) in &opts.headers {
        request = request.header(key, value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ResolveError::from_reqwest(e, url, OP, ErrorCode::Fetch))?;

    // Redirects are followed by the client; the landing host gets the same check.
    if !opts.allow_private_networks {
        ensure_public_host(response.url(), OP).await?;
    }

    let status = response.status();
    if !status.is_success() {
        return Err(ResolveError::fetch(
            url,
            OP,
            Some(anyhow::anyhow!("HTTP status {}", status.as_u16())),
        ));
    }

    if let Some(len) = header_content_length(response.headers()) {
        if len as usize > MAX_CONTENT_LENGTH {
            return Err(ResolveError::fetch(
                url,
                OP,
                Some(anyhow::anyhow!("content too large")),
            ));
        }
    }

    let final_url = response.url().to_string();
    let content_type = header_content_type(response.headers());

    let body = response
        .bytes()
        .await
        .map_err(|e| ResolveError::from_reqwest(e, url, OP, ErrorCode::Fetch))?;

    if body.len() > MAX_CONTENT_LENGTH {
        return Err(ResolveError::fetch(
            url,
            OP,
            Some(anyhow::anyhow!("content too large")),
        ));
    }

    Ok(FetchResult {
        status: status.as_u16(),
        final_url,
        content_type,
        body,
    })
}

/// Content-Length as declared by the server.
///
/// Read from the header map rather than `Response::content_length()`, which
/// reports the body size hint and is always zero for HEAD responses.
pub(crate) fn header_content_length(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Lowercased Content-Type header, if present and valid.
pub(crate) fn header_content_type(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase())
}

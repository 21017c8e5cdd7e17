// ABOUTME: Concurrent HEAD probing of candidate image URLs.
// ABOUTME: Each probe carries its own timeout and degrades to an unreachable ProbeInfo on any failure.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::resource::{
    ensure_public_host, header_content_length, header_content_type, parse_http_url,
};

/// What a HEAD request revealed about one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeInfo {
    pub reachable: bool,
    /// Declared size in bytes; 0 when unknown.
    pub content_length: u64,
    /// Lowercased Content-Type; empty when unknown.
    pub content_type: String,
}

impl ProbeInfo {
    /// The result recorded for timeouts, network errors and non-2xx responses.
    pub fn unreachable() -> Self {
        Self::default()
    }
}

/// Options applied to every probe in a batch.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub timeout: Duration,
    pub allow_private_networks: bool,
    pub headers: HashMap<String, String>,
}

/// Probe all URLs concurrently and return one ProbeInfo per URL, in input order.
///
/// Probes are independent: a slow or failing candidate only affects its own slot.
pub async fn probe_all(
    client: &reqwest::Client,
    urls: &[String],
    opts: &ProbeOptions,
) -> Vec<ProbeInfo> {
    join_all(urls.iter().map(|url| probe(client, url, opts))).await
}

/// Issue a single HEAD request bounded by `opts.timeout`.
pub async fn probe(client: &reqwest::Client, url: &str, opts: &ProbeOptions) -> ProbeInfo {
    match tokio::time::timeout(opts.timeout, head(client, url, opts)).await {
        Ok(Ok(info)) => info,
        Ok(Err(reason)) => {
            debug!(url, %reason, "probe failed");
            ProbeInfo::unreachable()
        }
        Err(_) => {
            debug!(url, timeout_ms = opts.timeout.as_millis() as u64, "probe timed out");
            ProbeInfo::unreachable()
        }
    }
}

async fn head(
    client: &reqwest::Client,
    url: &str,
    opts: &ProbeOptions,
) -> Result<ProbeInfo, anyhow::Error> {
    let parsed = parse_http_url(url, "Probe")?;
    if !opts.allow_private_networks {
        ensure_public_host(&parsed, "Probe").await?;
    }

    let mut request = client.head(parsed);
    for (key, value) in &opts.headers {
        request = request.header(key, value);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP status {}", status.as_u16());
    }

    let info = ProbeInfo {
        reachable: true,
        content_length: header_content_length(response.headers()).unwrap_or(0),
        content_type: header_content_type(response.headers()).unwrap_or_default(),
    };
    debug!(
        url,
        content_length = info.content_length,
        content_type = %info.content_type,
        "probe ok"
    );
    Ok(info)
}

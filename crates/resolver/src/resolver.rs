// ABOUTME: The Resolver: fetches a page, extracts and probes image candidates, and picks the best one.
// ABOUTME: Failures never escape; they are reported through the Resolution enum.

use std::fmt;
use std::net::ToSocketAddrs;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::ResolveError;
use crate::extract::extract_candidates;
use crate::options::{ResolverBuilder, ResolverOptions};
use crate::probe::{probe_all, ProbeOptions};
use crate::resource::{fetch_page, is_private_ip, FetchOptions};
use crate::score::{is_image_extension, probe_order, select_best, ScoredCandidate, Selection};

/// Why a page could not be resolved to an image.
#[derive(Debug)]
pub enum Unresolved {
    /// The page was fetched but held no usable image candidates.
    NoCandidates,
    /// The page itself could not be fetched.
    PageFetch(ResolveError),
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unresolved::NoCandidates => write!(f, "no image candidates found"),
            Unresolved::PageFetch(err) => write!(f, "{}", err),
        }
    }
}

/// The outcome of resolving one page URL.
#[derive(Debug)]
pub enum Resolution {
    /// A viable candidate won on score.
    Resolved(ScoredCandidate),
    /// No candidate was viable; this is the first one extracted.
    LastResort(String),
    /// Nothing usable; callers should fall back to the original URL.
    Unresolved(Unresolved),
}

impl Resolution {
    /// The chosen image URL, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(c) => Some(&c.url),
            Resolution::LastResort(url) => Some(url),
            Resolution::Unresolved(_) => None,
        }
    }

    /// The chosen image URL, or `original` when resolution failed.
    pub fn url_or(self, original: &str) -> String {
        match self {
            Resolution::Resolved(c) => c.url,
            Resolution::LastResort(url) => url,
            Resolution::Unresolved(_) => original.to_string(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved(_))
    }

    /// Short machine-readable label for logs and JSON output.
    pub fn outcome(&self) -> Outcome {
        match self {
            Resolution::Resolved(_) => Outcome::Resolved,
            Resolution::LastResort(_) => Outcome::LastResort,
            Resolution::Unresolved(Unresolved::NoCandidates) => Outcome::NoCandidates,
            Resolution::Unresolved(Unresolved::PageFetch(_)) => Outcome::PageFetchFailed,
        }
    }

    /// Score of the winner, when there was a scored winner.
    pub fn score(&self) -> Option<f64> {
        match self {
            Resolution::Resolved(c) => Some(c.score),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Resolved,
    LastResort,
    NoCandidates,
    PageFetchFailed,
}

/// Resolves web pages to the URL of their most prominent image.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Resolver {
    opts: ResolverOptions,
    http_client: reqwest::Client,
    // Decompression off (unless injected), so HEAD replies keep their Content-Length.
    probe_client: reqwest::Client,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ResolverOptions::default())
    }
}

impl Resolver {
    /// Create a new ResolverBuilder for configuring a Resolver.
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Create a new Resolver with the given options.
    pub fn new(opts: ResolverOptions) -> Self {
        let (http_client, probe_client) = match &opts.http_client {
            Some(client) => (client.clone(), client.clone()),
            None => (build_http_client(&opts, true), build_http_client(&opts, false)),
        };

        Self {
            opts,
            http_client,
            probe_client,
        }
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Resolve a page URL to its best image.
    pub async fn resolve(&self, page_url: &str) -> Resolution {
        info!(page_url, "resolving image from page");

        let fetch_opts = FetchOptions {
            headers: self.opts.headers.clone(),
            allow_private_networks: self.opts.allow_private_networks,
            timeout: self.opts.page_timeout,
        };
        let page = match fetch_page(&self.http_client, page_url, &fetch_opts).await {
            Ok(page) => page,
            Err(err) => {
                warn!(page_url, error = %err, "page fetch failed");
                return Resolution::Unresolved(Unresolved::PageFetch(err));
            }
        };

        // Relative references resolve against where the page actually lives.
        let candidates = extract_candidates(&page.text(), &page.final_url);
        if candidates.is_empty() {
            warn!(page_url, "no image candidates found on page");
            return Resolution::Unresolved(Unresolved::NoCandidates);
        }

        let resolution = self.rank(&candidates).await;
        match &resolution {
            Resolution::Resolved(winner) => info!(
                page_url,
                image_url = %winner.url,
                score = winner.score,
                content_length = winner.probe.content_length,
                content_type = %winner.probe.content_type,
                candidates = candidates.len(),
                "resolved image"
            ),
            Resolution::LastResort(url) => warn!(
                page_url,
                image_url = %url,
                "no viable candidate, using first extracted"
            ),
            Resolution::Unresolved(_) => {}
        }
        resolution
    }

    /// Probe and score already-extracted candidates.
    async fn rank(&self, candidates: &[String]) -> Resolution {
        let to_probe = probe_order(candidates, self.opts.max_probes);
        let probe_opts = ProbeOptions {
            timeout: self.opts.probe_timeout,
            allow_private_networks: self.opts.allow_private_networks,
            headers: self.opts.headers.clone(),
        };
        let infos = probe_all(&self.probe_client, &to_probe, &probe_opts).await;

        let scored = to_probe
            .into_iter()
            .zip(infos)
            .map(|(url, info)| ScoredCandidate::new(url, info, &self.opts.weights))
            .collect();

        match select_best(scored, candidates) {
            Selection::Best(winner) => Resolution::Resolved(winner),
            Selection::LastResort(url) => Resolution::LastResort(url),
            Selection::Empty => Resolution::Unresolved(Unresolved::NoCandidates),
        }
    }

    /// The image URL to analyze for a user-supplied URL.
    ///
    /// URLs that already look like images are used as-is without touching the
    /// network. Anything else is treated as a page and resolved; when that
    /// fails the input comes back unchanged.
    pub async fn image_url_for(&self, input: &str) -> String {
        if is_image_extension(input) {
            return input.to_string();
        }
        self.resolve(input).await.url_or(input)
    }
}

/// Build a client with the private-network redirect policy.
///
/// With `decompress` off, reqwest leaves `Content-Encoding` responses alone
/// instead of stripping their `Content-Length` header.
fn build_http_client(opts: &ResolverOptions, decompress: bool) -> reqwest::Client {
    let allow_private = opts.allow_private_networks;
    let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= 10 {
            return attempt.error("too many redirects");
        }
        if !allow_private && redirects_to_private(attempt.url()) {
            return attempt.error("redirect to private IP blocked");
        }
        attempt.follow()
    });

    reqwest::Client::builder()
        .redirect(redirect_policy)
        .user_agent(&opts.user_agent)
        .gzip(decompress)
        .brotli(decompress)
        .deflate(decompress)
        .build()
        .expect("failed to build HTTP client")
}

/// Synchronous DNS check used from the redirect policy, which cannot await.
fn redirects_to_private(next: &url::Url) -> bool {
    let Some(host) = next.host_str() else {
        return false;
    };
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<std::net::IpAddr>() {
        return is_private_ip(&ip);
    }
    let port = next.port_or_known_default().unwrap_or(80);
    match (host, port).to_socket_addrs() {
        Ok(mut addrs) => addrs.any(|sa| is_private_ip(&sa.ip())),
        Err(_) => false,
    }
}

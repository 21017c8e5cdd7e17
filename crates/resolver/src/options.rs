// ABOUTME: Configuration for the resolver: ScoringWeights, ResolverOptions, and ResolverBuilder.
// ABOUTME: ResolverBuilder provides a fluent API for constructing Resolver instances with custom settings.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resolver::Resolver;

/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default number of candidates probed per resolution.
pub const DEFAULT_MAX_PROBES: usize = 12;

/// Additive weights used by [`crate::score::score_candidate`].
///
/// The defaults are hand-tuned; keep them unless you are deliberately changing
/// which image wins on real pages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Bonus when the URL ends in a recognized image extension.
    pub image_extension: f64,
    /// Bonus when the URL carries a large/high-res token.
    pub large_hint: f64,
    /// Penalty when the URL carries a thumbnail/small token.
    pub thumbnail_penalty: f64,
    /// Bonus when the probe reported an `image/*` content type.
    pub image_content_type: f64,
    /// Penalty when the probe reported some other content type.
    pub non_image_content_type: f64,
    /// Upper bound of the content-length contribution.
    pub content_length_cap: f64,
    /// Points per order of magnitude of content length.
    pub content_length_per_decade: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            image_extension: 500.0,
            large_hint: 250.0,
            thumbnail_penalty: 300.0,
            image_content_type: 400.0,
            non_image_content_type: 100.0,
            content_length_cap: 600.0,
            content_length_per_decade: 120.0,
        }
    }
}

/// Configuration options for the Resolver.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub page_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_probes: usize,
    pub user_agent: String,
    pub allow_private_networks: bool,
    pub http_client: Option<reqwest::Client>,
    pub headers: HashMap<String, String>,
    pub weights: ScoringWeights,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(30),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_probes: DEFAULT_MAX_PROBES,
            user_agent: concat!("sightsound/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_private_networks: false,
            http_client: None,
            headers: HashMap::new(),
            weights: ScoringWeights::default(),
        }
    }
}

/// Builder for constructing Resolver instances with custom configuration.
#[derive(Debug, Clone)]
pub struct ResolverBuilder {
    opts: ResolverOptions,
}

impl ResolverBuilder {
    /// Create a new ResolverBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: ResolverOptions::default(),
        }
    }

    /// Set the timeout for fetching the page HTML.
    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.opts.page_timeout = timeout;
        self
    }

    /// Set the timeout applied to each HEAD probe independently.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.opts.probe_timeout = timeout;
        self
    }

    /// Cap the number of candidates probed per resolution. Zero is treated as one.
    pub fn max_probes(mut self, max: usize) -> Self {
        self.opts.max_probes = max.max(1);
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Use a custom HTTP client for page fetches and probes.
    ///
    /// Probes read Content-Length from HEAD replies, so the client should not
    /// decompress responses.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Add a custom header to the page fetch and every probe.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Replace the scoring weights.
    pub fn weights(mut self, weights: ScoringWeights) -> Self {
        self.opts.weights = weights;
        self
    }

    /// Build the Resolver with the configured options.
    pub fn build(self) -> Resolver {
        Resolver::new(self.opts)
    }
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let opts = ResolverOptions::default();
        assert_eq!(opts.probe_timeout, Duration::from_millis(3000));
        assert_eq!(opts.max_probes, 12);
        assert!(!opts.allow_private_networks);
        assert!(opts.user_agent.starts_with("sightsound/"));

        let w = ScoringWeights::default();
        assert_eq!(w.image_extension, 500.0);
        assert_eq!(w.large_hint, 250.0);
        assert_eq!(w.thumbnail_penalty, 300.0);
        assert_eq!(w.image_content_type, 400.0);
        assert_eq!(w.non_image_content_type, 100.0);
        assert_eq!(w.content_length_cap, 600.0);
        assert_eq!(w.content_length_per_decade, 120.0);
    }

    #[test]
    fn partial_weights_deserialize_onto_defaults() {
        let w: ScoringWeights = serde_json::from_str(r#"{"large_hint": 10}"#).unwrap();
        assert_eq!(w.large_hint, 10.0);
        assert_eq!(w.image_extension, 500.0);
    }

    #[test]
    fn max_probes_never_zero() {
        let b = ResolverBuilder::new().max_probes(0);
        assert_eq!(b.opts.max_probes, 1);
    }
}

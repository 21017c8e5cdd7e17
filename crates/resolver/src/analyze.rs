// ABOUTME: Forwards images to Azure Computer Vision Image Analysis and relays the JSON response.
// ABOUTME: Page URLs are first narrowed to their best image through the Resolver.

use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

use crate::error::{ErrorCode, ResolveError};
use crate::resolver::Resolver;

pub const DEFAULT_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_FEATURES: &str = "caption,objects,read";

const ANALYZE_PATH: &str = "/computervision/imageanalysis:analyze";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Connection settings for the Vision resource.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    pub key: String,
    pub api_version: String,
    pub model_version: String,
    pub language: String,
    pub default_features: String,
    pub timeout: Duration,
}

impl VisionConfig {
    /// Validates the endpoint and key and fills in the remaining defaults.
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Result<Self, ResolveError> {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        let key = key.into().trim().to_string();
        if endpoint.is_empty() || key.is_empty() {
            return Err(ResolveError::config(
                "VisionConfig",
                Some(anyhow::anyhow!("missing Vision endpoint or key")),
            ));
        }
        Url::parse(&endpoint).map_err(|e| {
            ResolveError::config(
                "VisionConfig",
                Some(anyhow::anyhow!("invalid Vision endpoint {}: {}", endpoint, e)),
            )
        })?;

        Ok(Self {
            endpoint,
            key,
            api_version: DEFAULT_API_VERSION.to_string(),
            model_version: "latest".to_string(),
            language: "en".to_string(),
            default_features: DEFAULT_FEATURES.to_string(),
            timeout: Duration::from_secs(30),
        })
    }

    /// The full analyze URL for the given comma-separated features.
    pub fn analyze_url(&self, features: &str) -> Result<Url, ResolveError> {
        let raw = format!("{}{}", self.endpoint, ANALYZE_PATH);
        let mut url = Url::parse(&raw).map_err(|e| {
            ResolveError::config("AnalyzeUrl", Some(anyhow::anyhow!("{}: {}", raw, e)))
        })?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version)
            .append_pair("features", features)
            .append_pair("modelVersion", &self.model_version)
            .append_pair("language", &self.language);
        Ok(url)
    }
}

/// The image to analyze.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// An image URL, or a page URL to be resolved to one.
    Url(String),
    /// Raw image bytes.
    Bytes(Bytes),
}

/// Vision's answer, relayed as-is.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    /// Upstream HTTP status; non-2xx statuses are relayed, not raised.
    pub status: u16,
    /// The URL actually sent for analysis, when the source was a URL.
    pub image_url: Option<String>,
    /// Parsed JSON body, or `{"raw": <text>}` when the body is not JSON.
    pub body: Value,
}

impl AnalyzeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends images to Vision, resolving page URLs first.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: VisionConfig,
    resolver: Resolver,
}

impl Analyzer {
    pub fn new(config: VisionConfig, resolver: Resolver) -> Self {
        Self { config, resolver }
    }

    /// Analyze an image. `features` overrides the configured default when non-blank.
    pub async fn analyze(
        &self,
        source: ImageSource,
        features: Option<&str>,
    ) -> Result<AnalyzeResponse, ResolveError> {
        let start = Instant::now();
        let result = self.analyze_inner(source, features).await;
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "analyze finished"
        );
        result
    }

    async fn analyze_inner(
        &self,
        source: ImageSource,
        features: Option<&str>,
    ) -> Result<AnalyzeResponse, ResolveError> {
        const OP: &str = "Analyze";

        let features = features
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(self.config.default_features.as_str());
        let url = self.config.analyze_url(features)?;

        let request = self
            .resolver
            .http_client()
            .post(url.clone())
            .timeout(self.config.timeout)
            .header(KEY_HEADER, &self.config.key);

        let (request, image_url) = match source {
            ImageSource::Url(input) => {
                let input = input.trim();
                if input.is_empty() {
                    return Err(no_image());
                }
                let image_url = self.resolver.image_url_for(input).await;
                if image_url != input {
                    info!(input, image_url = %image_url, "analyzing resolved image");
                }
                let body = json!({ "url": image_url });
                (request.json(&body), Some(image_url))
            }
            ImageSource::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(no_image());
                }
                let request = request
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(bytes);
                (request, None)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| ResolveError::from_reqwest(e, url.as_str(), OP, ErrorCode::Upstream))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ResolveError::from_reqwest(e, url.as_str(), OP, ErrorCode::Upstream))?;

        let preview: String = text.chars().take(200).collect();
        if (200..300).contains(&status) {
            info!(status, body = %preview, "vision responded");
        } else {
            warn!(status, body = %preview, "vision returned an error status");
        }

        Ok(AnalyzeResponse {
            status,
            image_url,
            body: parse_body(&text),
        })
    }
}

fn no_image() -> ResolveError {
    ResolveError::invalid_url(
        "",
        "Analyze",
        Some(anyhow::anyhow!("provide an image URL or image bytes")),
    )
}

/// JSON when it parses, otherwise the text wrapped as `{"raw": ...}`.
fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::HEAD;
    use pretty_assertions::assert_eq;

    fn analyzer(server: &MockServer) -> Analyzer {
        let config = VisionConfig::new(format!("{}/", server.base_url()), "secret").unwrap();
        let resolver = Resolver::builder().allow_private_networks(true).build();
        Analyzer::new(config, resolver)
    }

    #[test]
    fn test_config_rejects_missing_values() {
        assert!(VisionConfig::new("", "k").unwrap_err().is_config());
        assert!(VisionConfig::new("https://cv.example.com", "  ")
            .unwrap_err()
            .is_config());
        assert!(VisionConfig::new("not a url", "k").unwrap_err().is_config());
    }

    #[test]
    fn test_analyze_url_shape() {
        let config = VisionConfig::new("https://cv.example.com/", "k").unwrap();
        let url = config.analyze_url("caption,read").unwrap();
        assert_eq!(
            url.as_str(),
            "https://cv.example.com/computervision/imageanalysis:analyze?api-version=2024-02-01&features=caption%2Cread&modelVersion=latest&language=en"
        );
    }

    #[test]
    fn test_parse_body_wraps_non_json() {
        assert_eq!(parse_body(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_body("oops"), json!({"raw": "oops"}));
    }

    #[tokio::test]
    async fn test_analyze_direct_image_url() {
        let server = MockServer::start();
        let image_url = "https://images.example.com/cat.jpg";
        let vision = server.mock(|when, then| {
            when.method(POST)
                .path("/computervision/imageanalysis:analyze")
                .query_param("api-version", "2024-02-01")
                .query_param("features", "caption,objects,read")
                .header("Ocp-Apim-Subscription-Key", "secret")
                .json_body(json!({ "url": image_url }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "captionResult": { "text": "a cat" } }));
        });

        let resp = analyzer(&server)
            .analyze(ImageSource::Url(image_url.to_string()), None)
            .await
            .unwrap();
        vision.assert();
        assert!(resp.is_success());
        assert_eq!(resp.image_url.as_deref(), Some(image_url));
        assert_eq!(resp.body["captionResult"]["text"], "a cat");
    }

    #[tokio::test]
    async fn test_analyze_resolves_page_urls_first() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/article");
            then.status(200)
                .body(r#"<html><body><img src="/media/hero.jpg"></body></html>"#);
        });
        server.mock(|when, then| {
            when.method(HEAD).path("/media/hero.jpg");
            then.status(200).header("content-type", "image/jpeg");
        });
        let resolved = server.url("/media/hero.jpg");
        let vision = server.mock(|when, then| {
            when.method(POST)
                .path("/computervision/imageanalysis:analyze")
                .query_param("features", "tags")
                .json_body(json!({ "url": resolved }));
            then.status(200).json_body(json!({ "ok": true }));
        });

        let resp = analyzer(&server)
            .analyze(ImageSource::Url(server.url("/article")), Some(" tags "))
            .await
            .unwrap();
        vision.assert();
        assert_eq!(resp.image_url, Some(server.url("/media/hero.jpg")));
    }

    #[tokio::test]
    async fn test_analyze_unresolvable_page_sends_original_url() {
        let server = MockServer::start();
        let page = server.url("/broken");
        let vision = server.mock(|when, then| {
            when.method(POST)
                .path("/computervision/imageanalysis:analyze")
                .json_body(json!({ "url": page }));
            then.status(400)
                .body("InvalidImageUrl");
        });

        let resp = analyzer(&server)
            .analyze(ImageSource::Url(server.url("/broken")), None)
            .await
            .unwrap();
        vision.assert();
        assert_eq!(resp.status, 400);
        assert!(!resp.is_success());
        assert_eq!(resp.body, json!({ "raw": "InvalidImageUrl" }));
    }

    #[tokio::test]
    async fn test_analyze_unreachable_vision_is_upstream_error() {
        let config = VisionConfig::new("http://127.0.0.1:9", "secret").unwrap();
        let analyzer = Analyzer::new(config, Resolver::default());

        let err = analyzer
            .analyze(ImageSource::Bytes(Bytes::from_static(&[1, 2, 3])), None)
            .await
            .unwrap_err();
        assert!(err.is_upstream());
        assert_eq!(err.op, "Analyze");
    }

    #[tokio::test]
    async fn test_analyze_bytes() {
        let server = MockServer::start();
        let vision = server.mock(|when, then| {
            when.method(POST)
                .path("/computervision/imageanalysis:analyze")
                .header("content-type", "application/octet-stream")
                .body("\u{1}\u{2}\u{3}");
            then.status(200).json_body(json!({ "readResult": null }));
        });

        let resp = analyzer(&server)
            .analyze(ImageSource::Bytes(Bytes::from_static(&[1, 2, 3])), None)
            .await
            .unwrap();
        vision.assert();
        assert_eq!(resp.image_url, None);
    }

    #[tokio::test]
    async fn test_analyze_requires_an_image() {
        let server = MockServer::start();
        let a = analyzer(&server);
        let err = a
            .analyze(ImageSource::Url("  ".to_string()), None)
            .await
            .unwrap_err();
        assert!(err.is_invalid_url());

        let err = a
            .analyze(ImageSource::Bytes(Bytes::new()), None)
            .await
            .unwrap_err();
        assert!(err.is_invalid_url());
    }
}

// ABOUTME: Library entry point for sightsound: best-image resolution and Vision analyze forwarding.
// ABOUTME: Re-exports the public API: Resolver, Resolution, Analyzer, VisionConfig, ResolveError, ScoringWeights.

//! Sightsound - pick the real photo out of a web page and send it to Vision.
//!
//! Given a page URL, the [`Resolver`] scrapes image candidates from the HTML,
//! probes them with concurrent HEAD requests, and scores them to find the image
//! most likely to be the page's subject rather than an icon or a thumbnail.
//!
//! # Example
//!
//! ```no_run
//! use sightsound_resolver::Resolver;
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = Resolver::builder().build();
//!     let page = "https://example.com/article";
//!     let image = resolver.resolve(page).await.url_or(page);
//!     println!("{}", image);
//! }
//! ```

pub mod analyze;
pub mod error;
pub mod extract;
pub mod options;
pub mod probe;
pub mod resolver;
pub mod resource;
pub mod score;

pub use crate::analyze::{AnalyzeResponse, Analyzer, ImageSource, VisionConfig};
pub use crate::error::{ErrorCode, ResolveError};
pub use crate::extract::extract_candidates;
pub use crate::options::{ResolverBuilder, ResolverOptions, ScoringWeights};
pub use crate::probe::ProbeInfo;
pub use crate::resolver::{Outcome, Resolution, Resolver, Unresolved};
pub use crate::score::{is_image_extension, score_candidate, select_best, ScoredCandidate};

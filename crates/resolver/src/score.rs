// ABOUTME: Heuristic scoring of probed image candidates and best-candidate selection.
// ABOUTME: Combines URL token signals with probe metadata; ties go to the earlier candidate.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::options::ScoringWeights;
use crate::probe::ProbeInfo;

static IMAGE_EXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|webp|gif|bmp|tiff?)($|\?)").unwrap());
// Token hints use ASCII word boundaries and case folding: a non-ASCII letter
// next to a token (`fotoéxl`) still counts as a delimiter.
static LARGE_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i-u)(\b|_)(large|xlarge|xl|1920|1080|1200|2048|hires|original)(\b|_)")
        .unwrap()
});
// Alternation binds loosely here: only `thumb` needs a leading delimiter and
// only `sm` a trailing one; `thumbnail` and `small` match anywhere.
static THUMBNAIL_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i-u)(\b|[_\-])thumb|thumbnail|small|sm(\b|[_\-])").unwrap());

/// A candidate together with its probe result and score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub url: String,
    pub probe: ProbeInfo,
    pub score: f64,
}

impl ScoredCandidate {
    pub fn new(url: String, probe: ProbeInfo, weights: &ScoringWeights) -> Self {
        let score = score_candidate(&url, &probe, weights);
        Self { url, probe, score }
    }
}

/// True when the URL ends in a known image extension, optionally followed by a query.
pub fn is_image_extension(url: &str) -> bool {
    IMAGE_EXT_RE.is_match(url)
}

/// Higher is better. See [`ScoringWeights`] for the individual signals.
pub fn score_candidate(url: &str, probe: &ProbeInfo, weights: &ScoringWeights) -> f64 {
    let mut score = 0.0;

    if is_image_extension(url) {
        score += weights.image_extension;
    }
    if LARGE_HINT_RE.is_match(url) {
        score += weights.large_hint;
    }
    if THUMBNAIL_HINT_RE.is_match(url) {
        score -= weights.thumbnail_penalty;
    }

    if probe.content_type.starts_with("image/") {
        score += weights.image_content_type;
    } else if !probe.content_type.is_empty() {
        score -= weights.non_image_content_type;
    }

    if probe.content_length > 0 {
        let magnitude = ((probe.content_length as f64) + 1.0).log10();
        score += (magnitude * weights.content_length_per_decade).min(weights.content_length_cap);
    }

    score
}

/// Orders candidates so that ones with an image extension come first,
/// keeping extraction order within each group, and keeps at most `limit`.
pub fn probe_order(candidates: &[String], limit: usize) -> Vec<String> {
    let mut ordered: Vec<String> = candidates.to_vec();
    ordered.sort_by_key(|u| !is_image_extension(u));
    ordered.truncate(limit);
    ordered
}

/// Outcome of selecting among scored candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// The highest-scoring viable candidate.
    Best(ScoredCandidate),
    /// Nothing was viable; the first extracted candidate is returned as-is.
    LastResort(String),
    /// There were no candidates at all.
    Empty,
}

/// Picks the winner among `scored`, which must be in probe order.
///
/// A candidate is viable when its probe succeeded or its URL has an image
/// extension. The first of `extracted` is the fallback when none are viable.
pub fn select_best(scored: Vec<ScoredCandidate>, extracted: &[String]) -> Selection {
    let mut best: Option<ScoredCandidate> = None;
    for candidate in scored {
        if !(candidate.probe.reachable || is_image_extension(&candidate.url)) {
            continue;
        }
        // Strictly greater, so earlier candidates win ties.
        if best.as_ref().map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }

    match (best, extracted.first()) {
        (Some(winner), _) => Selection::Best(winner),
        (None, Some(first)) => Selection::LastResort(first.clone()),
        (None, None) => Selection::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn image_probe(len: u64) -> ProbeInfo {
        ProbeInfo {
            reachable: true,
            content_length: len,
            content_type: "image/jpeg".to_string(),
        }
    }

    fn scored(url: &str, probe: ProbeInfo) -> ScoredCandidate {
        ScoredCandidate::new(url.to_string(), probe, &ScoringWeights::default())
    }

    #[test]
    fn test_is_image_extension() {
        assert!(is_image_extension("https://e.com/a.jpg"));
        assert!(is_image_extension("https://e.com/a.JPEG"));
        assert!(is_image_extension("https://e.com/a.tif"));
        assert!(is_image_extension("https://e.com/a.tiff?w=100"));
        assert!(is_image_extension("https://e.com/a.webp?"));
        assert!(!is_image_extension("https://e.com/a.jpg.html"));
        assert!(!is_image_extension("https://e.com/a.svg"));
        assert!(!is_image_extension("https://e.com/page"));
    }

    #[test]
    fn test_score_extension_only() {
        let s = score_candidate(
            "https://e.com/a.png",
            &ProbeInfo::unreachable(),
            &ScoringWeights::default(),
        );
        assert_eq!(s, 500.0);
    }

    #[test]
    fn test_score_large_and_thumbnail_tokens() {
        let w = ScoringWeights::default();
        let none = ProbeInfo::unreachable();
        assert_eq!(score_candidate("https://e.com/img/large/a", &none, &w), 250.0);
        assert_eq!(score_candidate("https://e.com/a_original_b", &none, &w), 250.0);
        assert_eq!(score_candidate("https://e.com/largest", &none, &w), 0.0);
        assert_eq!(score_candidate("https://e.com/thumb/a", &none, &w), -300.0);
        assert_eq!(score_candidate("https://e.com/a-sm-b", &none, &w), -300.0);
        assert_eq!(score_candidate("https://e.com/smallville", &none, &w), -300.0);
    }

    #[test]
    fn test_token_hints_treat_non_ascii_letters_as_delimiters() {
        let w = ScoringWeights::default();
        let none = ProbeInfo::unreachable();
        assert_eq!(score_candidate("https://e.com/fotoéxl.jpg", &none, &w), 750.0);
        assert_eq!(score_candidate("https://e.com/éthumb.jpg", &none, &w), 200.0);
        assert_eq!(score_candidate("https://e.com/größe-1200ü", &none, &w), 250.0);
        assert_eq!(score_candidate("https://e.com/a_LARGE_b", &none, &w), 250.0);
        // Case folding is ASCII only: the long s does not fold to `s`.
        assert_eq!(score_candidate("https://e.com/ſmall", &none, &w), 0.0);
    }

    #[test]
    fn test_score_content_type() {
        let w = ScoringWeights::default();
        let html = ProbeInfo {
            reachable: true,
            content_length: 0,
            content_type: "text/html; charset=utf-8".to_string(),
        };
        assert_eq!(score_candidate("https://e.com/p", &html, &w), -100.0);
        assert_eq!(score_candidate("https://e.com/p", &image_probe(0), &w), 400.0);
    }

    #[test]
    fn test_score_content_length_is_logarithmic_and_capped() {
        let w = ScoringWeights::default();
        let probe = |len| ProbeInfo {
            reachable: true,
            content_length: len,
            content_type: String::new(),
        };
        let s = score_candidate("https://e.com/p", &probe(999), &w);
        assert!((s - 360.0).abs() < 1e-9, "got {}", s);
        assert_eq!(score_candidate("https://e.com/p", &probe(u64::MAX), &w), 600.0);
        assert_eq!(score_candidate("https://e.com/p", &probe(0), &w), 0.0);
    }

    #[test]
    fn test_custom_weights_apply() {
        let w = ScoringWeights {
            image_extension: 1.0,
            ..ScoringWeights::default()
        };
        assert_eq!(
            score_candidate("https://e.com/a.jpg", &ProbeInfo::unreachable(), &w),
            1.0
        );
    }

    #[test]
    fn test_large_photo_beats_thumbnail() {
        let big = scored("https://e.com/photo-1920.jpg", image_probe(2_000_000));
        let thumb = scored("https://e.com/thumb.jpg", image_probe(3_000));
        assert!(big.score > thumb.score);

        let extracted = vec![thumb.url.clone(), big.url.clone()];
        let selection = select_best(vec![thumb, big.clone()], &extracted);
        assert_eq!(selection, Selection::Best(big));
    }

    #[test]
    fn test_failed_probe_with_extension_still_selected() {
        let page = scored("https://e.com/gallery", ProbeInfo::unreachable());
        let img = scored("https://e.com/a.jpg", ProbeInfo::unreachable());
        let extracted = vec![page.url.clone(), img.url.clone()];

        match select_best(vec![img, page], &extracted) {
            Selection::Best(c) => assert_eq!(c.url, "https://e.com/a.jpg"),
            other => panic!("expected Best, got {:?}", other),
        }
    }

    #[test]
    fn test_last_resort_when_nothing_viable() {
        let a = scored("https://e.com/one", ProbeInfo::unreachable());
        let b = scored("https://e.com/two", ProbeInfo::unreachable());
        let extracted = vec![a.url.clone(), b.url.clone()];
        assert_eq!(
            select_best(vec![a, b], &extracted),
            Selection::LastResort("https://e.com/one".to_string())
        );
    }

    #[test]
    fn test_empty_selection() {
        assert_eq!(select_best(Vec::new(), &[]), Selection::Empty);
    }

    #[test]
    fn test_ties_go_to_earlier_candidate() {
        let a = scored("https://e.com/a.jpg", ProbeInfo::unreachable());
        let b = scored("https://e.com/b.jpg", ProbeInfo::unreachable());
        assert_eq!(a.score, b.score);
        let extracted = vec![a.url.clone(), b.url.clone()];
        match select_best(vec![a, b], &extracted) {
            Selection::Best(c) => assert_eq!(c.url, "https://e.com/a.jpg"),
            other => panic!("expected Best, got {:?}", other),
        }
    }

    #[test]
    fn test_tie_between_extension_and_plain_url_goes_to_extension() {
        let plain = scored(
            "https://e.com/a",
            ProbeInfo {
                reachable: true,
                content_length: 0,
                content_type: "image/png".to_string(),
            },
        );
        let with_ext = scored(
            "https://e.com/b.jpg",
            ProbeInfo {
                reachable: true,
                content_length: 0,
                content_type: "text/html".to_string(),
            },
        );
        assert_eq!(plain.score, 400.0);
        assert_eq!(with_ext.score, 400.0);

        // Extracted first, but probed (and so ranked) after the extension URL.
        let extracted = vec![plain.url.clone(), with_ext.url.clone()];
        let order = probe_order(&extracted, 12);
        assert_eq!(order, vec![with_ext.url.clone(), plain.url.clone()]);

        match select_best(vec![with_ext, plain], &extracted) {
            Selection::Best(c) => assert_eq!(c.url, "https://e.com/b.jpg"),
            other => panic!("expected Best, got {:?}", other),
        }
    }

    #[test]
    fn test_probe_order_puts_extensions_first_and_caps() {
        let candidates: Vec<String> = vec![
            "https://e.com/p1".into(),
            "https://e.com/a.jpg".into(),
            "https://e.com/p2".into(),
            "https://e.com/b.png".into(),
        ];
        assert_eq!(
            probe_order(&candidates, 3),
            vec![
                "https://e.com/a.jpg".to_string(),
                "https://e.com/b.png".to_string(),
                "https://e.com/p1".to_string(),
            ]
        );
    }
}

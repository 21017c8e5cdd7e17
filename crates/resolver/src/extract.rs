// ABOUTME: Candidate image URL extraction from raw page HTML.
// ABOUTME: Scans img src/srcset and og/twitter image meta tags, absolutizes, filters junk, dedupes.

use std::collections::HashSet;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

// Raw-text patterns, not a DOM parse. Attribute order and quoting rules here
// decide which tags count, so they must stay exactly as written.
static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"'>]+)["'][^>]*>"#).unwrap()
});
static IMG_SRCSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrcset\s*=\s*["']([^"']+)["'][^>]*>"#).unwrap()
});
static META_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<meta\s+property=["'](?:og:image|twitter:image)["']\s+content=["']([^"']+)["'][^>]*>"#,
    )
    .unwrap()
});

/// Substrings that mark sprites, icons, spacers and tracking pixels.
const JUNK_PATTERNS: &[&str] = &[
    "sprite",
    "icon",
    "logo",
    "favicon",
    "transparent",
    "1x1",
    "pixel",
];

static JUNK_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(JUNK_PATTERNS)
        .unwrap()
});

/// Extracts candidate image URLs from page HTML.
///
/// Order is first-seen: all `<img src>` values, then `srcset` entries, then
/// OpenGraph/Twitter meta images. Duplicates, data URIs and junk-looking URLs
/// are dropped. Never fails; malformed markup just yields fewer candidates.
pub fn extract_candidates(html: &str, base_url: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |raw: &str| {
        if let Some(url) = resolve_candidate_url(base_url, raw) {
            if seen.insert(url.clone()) {
                out.push(url);
            }
        }
    };

    for caps in IMG_SRC_RE.captures_iter(html) {
        push(&caps[1]);
    }

    for caps in IMG_SRCSET_RE.captures_iter(html) {
        for raw in srcset_urls(&caps[1]) {
            push(raw);
        }
    }

    for caps in META_IMAGE_RE.captures_iter(html) {
        push(&caps[1]);
    }

    out.retain(|u| !is_junk_url(u));
    out
}

/// Splits a `srcset` value into its URL tokens, dropping the width/density descriptors.
fn srcset_urls(srcset: &str) -> impl Iterator<Item = &str> {
    srcset
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
}

/// Resolves a raw attribute value against the page URL.
///
/// Protocol-relative values get `https:`; absolute http(s) values are returned
/// untouched; anything else is joined onto the base. Returns None for empty
/// input or when the join fails.
pub fn resolve_candidate_url(base_url: &str, raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with("//") {
        return Some(format!("https:{}", raw));
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }

    let base = Url::parse(base_url).ok()?;
    let resolved = base.join(raw).ok()?;
    Some(resolved.to_string())
}

/// Returns true for data URIs and URLs that look like sprites, icons or pixels.
pub fn is_junk_url(url: &str) -> bool {
    url.starts_with("data:") || JUNK_MATCHER.is_match(url)
}

//! Discovered-manifest aggregation.
//!
//! Capture sets are only ever mutated by the orchestrator at round
//! barriers, so no interior locking is needed.

use std::collections::BTreeMap;

use url::Url;

/// Normalized membership key for a manifest URL: lowercased
/// `scheme://host[:port]/path`, query and fragment stripped. URLs that
/// differ only by query string collapse to the same key.
pub fn normalize_manifest_key(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => {
            let host = url.host_str().unwrap_or_default();
            let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
            format!("{}://{}{}{}", url.scheme(), host, port, url.path()).to_lowercase()
        }
        // Not a parseable URL; fall back to a query-stripped lowercase form.
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or(raw)
            .to_lowercase(),
    }
}

/// True when the URL's normalized path points at an HLS playlist.
pub fn is_manifest_url(raw: &str) -> bool {
    normalize_manifest_key(raw).ends_with(".m3u8")
}

/// Deduplicated set of manifest URLs discovered for one site.
///
/// Membership is tested on the normalized key; the first raw URL observed
/// for a key is retained for export. Grows monotonically by union.
#[derive(Debug, Clone, Default)]
pub struct CaptureSet {
    entries: BTreeMap<String, String>,
}

impl CaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a discovered URL. Returns true if it was new. Idempotent:
    /// re-inserting a URL (or a query-varying duplicate) changes nothing.
    pub fn insert(&mut self, raw: impl Into<String>) -> bool {
        let raw = raw.into();
        let key = normalize_manifest_key(&raw);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, raw);
        true
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.entries.contains_key(&normalize_manifest_key(raw))
    }

    /// Union another set into this one.
    pub fn merge(&mut self, other: &CaptureSet) {
        for raw in other.urls() {
            self.insert(raw);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained raw URLs, ordered by normalized key.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }
}

/// Per-site capture mapping for one job, handed to the export boundary.
#[derive(Debug, Clone, Default)]
pub struct JobCaptures {
    sites: BTreeMap<String, CaptureSet>,
}

impl JobCaptures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union a round's discoveries into the site's set.
    pub fn merge_site(&mut self, site: &str, discovered: &CaptureSet) {
        self.sites.entry(site.to_string()).or_default().merge(discovered);
    }

    pub fn site(&self, site: &str) -> Option<&CaptureSet> {
        self.sites.get(site)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CaptureSet)> {
        self.sites.iter().map(|(s, c)| (s.as_str(), c))
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn total_urls(&self) -> usize {
        self.sites.values().map(CaptureSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_query_and_lowercases() {
        assert_eq!(
            normalize_manifest_key("HTTPS://CDN.Example.COM/Live/Stream.M3U8?token=abc"),
            "https://cdn.example.com/live/stream.m3u8"
        );
        assert_eq!(
            normalize_manifest_key("https://cdn.example.com:8443/a.m3u8"),
            "https://cdn.example.com:8443/a.m3u8"
        );
    }

    #[test]
    fn test_normalize_unparseable_falls_back() {
        assert_eq!(normalize_manifest_key("not a url?x=1"), "not a url");
    }

    #[test]
    fn test_is_manifest_url() {
        assert!(is_manifest_url("https://cdn.test/live/index.m3u8"));
        assert!(is_manifest_url("https://cdn.test/live/index.m3u8?auth=1"));
        assert!(!is_manifest_url("https://cdn.test/live/segment-001.ts"));
        assert!(!is_manifest_url("https://cdn.test/player.js"));
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut set = CaptureSet::new();
        assert!(set.insert("https://cdn.test/a.m3u8"));
        assert!(!set.insert("https://cdn.test/a.m3u8"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_query_variants_collapse() {
        let mut set = CaptureSet::new();
        set.insert("https://cdn.test/a.m3u8?session=1");
        set.insert("https://cdn.test/a.m3u8?session=2");
        set.insert("https://cdn.test/A.m3u8");
        assert_eq!(set.len(), 1);
        // First-seen raw URL is retained.
        assert_eq!(
            set.urls().collect::<Vec<_>>(),
            vec!["https://cdn.test/a.m3u8?session=1"]
        );
    }

    #[test]
    fn test_merge_unions() {
        let mut a = CaptureSet::new();
        a.insert("https://cdn.test/a.m3u8");
        let mut b = CaptureSet::new();
        b.insert("https://cdn.test/a.m3u8?v=2");
        b.insert("https://cdn.test/b.m3u8");
        a.merge(&b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_job_captures_accumulates_per_site() {
        let mut captures = JobCaptures::new();
        let mut round1 = CaptureSet::new();
        round1.insert("https://cdn.test/a.m3u8");
        let mut round2 = CaptureSet::new();
        round2.insert("https://cdn.test/a.m3u8?v=2");
        round2.insert("https://cdn.test/b.m3u8");

        captures.merge_site("https://site.test", &round1);
        captures.merge_site("https://site.test", &round2);

        assert_eq!(captures.site_count(), 1);
        assert_eq!(captures.site("https://site.test").unwrap().len(), 2);
        assert_eq!(captures.total_urls(), 2);
    }
}

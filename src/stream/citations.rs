//! Citation accumulation, domain filtering and reference block rendering.
//!
//! Records are collected per response in arrival order and deduplicated as
//! they arrive. Source preference, exclusion and trusted-domain partitioning
//! run once, when the upstream stream has ended.

use rustc_hash::FxHashSet;

use crate::config::CitationConfig;

/// Where a citation record came from.
///
/// Bare `citations` lists only carry URLs in provider order; the other
/// sources carry titles and are preferred when both appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationSource {
    CitationList,
    SearchResult,
    Annotation,
    WebSearchTool,
}

impl CitationSource {
    #[inline]
    #[must_use]
    pub fn is_rich(self) -> bool {
        !matches!(self, CitationSource::CitationList)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationRecord {
    pub url: String,
    /// Empty when the provider supplied no title.
    pub title: String,
    pub source: CitationSource,
}

impl CitationRecord {
    /// Normalize a raw url/title pair; `None` when the URL is blank.
    #[must_use]
    pub fn new(url: &str, title: Option<&str>, source: CitationSource) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            title: title.map(str::trim).unwrap_or_default().to_string(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Domain rules
// ---------------------------------------------------------------------------

/// Hostname suffix rule. `kr` matches `kr`, `snu.ac.kr` and `x.co.kr` but not
/// `notkr.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRule {
    suffix: String,
}

impl DomainRule {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let suffix = raw
            .trim()
            .trim_start_matches('.')
            .trim_end_matches('.')
            .to_ascii_lowercase();
        if suffix.is_empty() {
            return None;
        }
        Some(Self { suffix })
    }

    #[must_use]
    pub fn matches_host(&self, host: &str) -> bool {
        let suffix = self.suffix.as_str();
        if host.len() == suffix.len() {
            return host == suffix;
        }
        host.len() > suffix.len()
            && host.ends_with(suffix)
            && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
    }
}

#[derive(Debug, Clone, Default)]
pub struct DomainRules {
    rules: Vec<DomainRule>,
}

impl DomainRules {
    #[must_use]
    pub fn from_config(entries: &[String]) -> Self {
        Self {
            rules: entries.iter().filter_map(|e| DomainRule::parse(e)).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the URL's hostname matches any rule. URLs without a parsable
    /// host never match.
    #[must_use]
    pub fn matches_url(&self, url: &str) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let Some(host) = url_host(url) else {
            return false;
        };
        self.rules.iter().any(|rule| rule.matches_host(&host))
    }
}

/// Lowercased hostname of `url`. Scheme-less inputs such as `a.edu/p` are
/// parsed as `https://a.edu/p`.
#[must_use]
pub fn url_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url)
        .ok()
        .filter(|parsed| parsed.host_str().is_some())
        .or_else(|| url::Url::parse(&format!("https://{url}")).ok())?;
    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Read-only citation settings shared by all requests.
#[derive(Debug, Clone)]
pub struct CitationPolicy {
    pub header: String,
    pub exclude: DomainRules,
    pub trusted: DomainRules,
    pub trusted_label: String,
    pub other_label: String,
    pub prefer_rich_sources: bool,
}

impl CitationPolicy {
    /// A blank header falls back to the default one so the reference block
    /// always starts with a header line the linker can find.
    #[must_use]
    pub fn from_config(config: &CitationConfig) -> Self {
        let header = match config.header.trim() {
            "" => CitationConfig::default().header,
            header => header.to_string(),
        };
        Self {
            header,
            exclude: DomainRules::from_config(&config.exclude_domains),
            trusted: DomainRules::from_config(&config.trusted_domains),
            trusted_label: config.trusted_label.clone(),
            other_label: config.other_label.clone(),
            prefer_rich_sources: config.prefer_search_results,
        }
    }
}

impl Default for CitationPolicy {
    fn default() -> Self {
        Self::from_config(&CitationConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Request-scoped citation collector.
///
/// Providers repeat their full citation lists on every chunk, so records are
/// deduplicated on insert, separately for rich and bare sources. A URL can
/// therefore be held twice (once per class); `citation_set` resolves that.
#[derive(Debug, Default)]
pub struct CitationAccumulator {
    records: Vec<CitationRecord>,
    seen_rich: FxHashSet<String>,
    seen_bare: FxHashSet<String>,
}

impl CitationAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `record` unless its URL was already seen from the same source
    /// class. Returns whether it was kept.
    pub fn push(&mut self, record: CitationRecord) -> bool {
        let seen = if record.source.is_rich() {
            &mut self.seen_rich
        } else {
            &mut self.seen_bare
        };
        if seen.contains(record.url.as_str()) {
            return false;
        }
        seen.insert(record.url.clone());
        self.records.push(record);
        true
    }

    pub fn extend<I: IntoIterator<Item = CitationRecord>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Deduplicated set in first-seen order, before domain filtering.
    #[must_use]
    pub fn citation_set(&self, prefer_rich_sources: bool) -> Vec<CitationRecord> {
        let use_rich_only =
            prefer_rich_sources && self.records.iter().any(|r| r.source.is_rich());
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut out = Vec::with_capacity(self.records.len());
        for record in &self.records {
            if use_rich_only && !record.source.is_rich() {
                continue;
            }
            if seen.insert(record.url.as_str()) {
                out.push(record.clone());
            }
        }
        out
    }

    /// Build the final reference block, or `None` when nothing survives
    /// filtering.
    #[must_use]
    pub fn finish(&self, policy: &CitationPolicy) -> Option<ReferenceBlock> {
        let survivors: Vec<CitationRecord> = self
            .citation_set(policy.prefer_rich_sources)
            .into_iter()
            .filter(|record| !policy.exclude.matches_url(&record.url))
            .collect();
        if survivors.is_empty() {
            return None;
        }

        let groups = if policy.trusted.is_empty() {
            vec![ReferenceGroup {
                label: None,
                entries: survivors,
            }]
        } else {
            let (trusted, other): (Vec<_>, Vec<_>) = survivors
                .into_iter()
                .partition(|record| policy.trusted.matches_url(&record.url));
            [
                (policy.trusted_label.as_str(), trusted),
                (policy.other_label.as_str(), other),
            ]
            .into_iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(label, entries)| ReferenceGroup {
                label: Some(label.to_string()),
                entries,
            })
            .collect()
        };

        Some(ReferenceBlock {
            header: policy.header.clone(),
            groups,
        })
    }
}

// ---------------------------------------------------------------------------
// Reference block
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceGroup {
    pub label: Option<String>,
    pub entries: Vec<CitationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceBlock {
    pub header: String,
    pub groups: Vec<ReferenceGroup>,
}

impl ReferenceBlock {
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    /// Render as the trailing text section. Numbering runs across groups.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(64 + self.entry_count() * 96);
        out.push_str("\n\n");
        out.push_str(&self.header);
        out.push('\n');
        let mut n = 0usize;
        for group in &self.groups {
            if let Some(label) = group.label.as_deref() {
                out.push('\n');
                out.push_str(label);
                out.push('\n');
            }
            for record in &group.entries {
                n += 1;
                push_reference_line(&mut out, n, record);
            }
        }
        if out.ends_with('\n') {
            out.pop();
        }
        out
    }
}

fn push_reference_line(out: &mut String, n: usize, record: &CitationRecord) {
    use std::fmt::Write as _;

    let url = escape_link_target(&record.url);
    if record.title.is_empty() {
        let _ = writeln!(out, "- [{n}] {url}");
    } else {
        let title = escape_link_text(&record.title);
        let _ = writeln!(out, "- [{n}] [{title}]({url})");
    }
}

fn escape_link_text(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '[' => '(',
            ']' => ')',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

fn escape_link_target(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            ' ' => out.push_str("%20"),
            '\n' | '\r' => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rich(url: &str, title: &str) -> CitationRecord {
        CitationRecord::new(url, Some(title), CitationSource::SearchResult).unwrap()
    }

    fn bare(url: &str) -> CitationRecord {
        CitationRecord::new(url, None, CitationSource::CitationList).unwrap()
    }

    fn policy(exclude: &[&str], trusted: &[&str]) -> CitationPolicy {
        CitationPolicy::from_config(&CitationConfig {
            exclude_domains: exclude.iter().map(ToString::to_string).collect(),
            trusted_domains: trusted.iter().map(ToString::to_string).collect(),
            ..CitationConfig::default()
        })
    }

    #[test]
    fn test_domain_rule_suffix_on_hostname() {
        let rule = DomainRule::parse(".kr").unwrap();
        assert!(rule.matches_host("kr"));
        assert!(rule.matches_host("snu.ac.kr"));
        assert!(!rule.matches_host("notkr.com"));
        assert!(!rule.matches_host("kr.example.com"));
        assert!(!rule.matches_host("xkr"));
    }

    #[test]
    fn test_url_host_without_scheme() {
        assert_eq!(url_host("a.edu/p").as_deref(), Some("a.edu"));
        assert_eq!(
            url_host("https://WWW.Nature.com/articles/1").as_deref(),
            Some("www.nature.com")
        );
        assert_eq!(url_host("localhost:8080/x").as_deref(), Some("localhost"));
        assert_eq!(url_host(""), None);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_and_title() {
        let mut acc = CitationAccumulator::new();
        acc.push(rich("https://x.org", "X first"));
        acc.push(rich("https://y.org", "Y"));
        acc.push(rich("https://x.org", "X second"));
        let set = acc.citation_set(true);
        let urls: Vec<_> = set.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.org", "https://y.org"]);
        assert_eq!(set[0].title, "X first");
    }

    #[test]
    fn test_repeated_lists_are_held_once() {
        let mut acc = CitationAccumulator::new();
        let urls = ["https://a.org", "https://b.org", "https://c.org"];
        for _ in 0..500 {
            acc.extend(urls.iter().map(|u| bare(u)));
            acc.extend(urls.iter().map(|u| rich(u, "later title")));
        }
        assert_eq!(acc.len(), urls.len() * 2);
        let set = acc.citation_set(true);
        assert_eq!(set.len(), urls.len());
        assert!(set.iter().all(|r| r.title == "later title"));
        assert_eq!(acc.citation_set(false).len(), urls.len());
    }

    #[test]
    fn test_push_reports_duplicates_per_source_class() {
        let mut acc = CitationAccumulator::new();
        assert!(acc.push(bare("https://x.org")));
        assert!(!acc.push(bare("https://x.org")));
        assert!(acc.push(rich("https://x.org", "X")));
        assert!(!acc.push(rich("https://x.org", "X again")));
        assert_eq!(acc.citation_set(true)[0].title, "X");
    }

    #[test]
    fn test_dedup_is_case_sensitive() {
        let mut acc = CitationAccumulator::new();
        acc.push(bare("https://x.org/A"));
        acc.push(bare("https://x.org/a"));
        assert_eq!(acc.citation_set(true).len(), 2);
    }

    #[test]
    fn test_rich_sources_preferred_over_bare_list() {
        let mut acc = CitationAccumulator::new();
        acc.push(bare("https://only-bare.org"));
        acc.push(rich("https://titled.org", "T"));
        let set = acc.citation_set(true);
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].url, "https://titled.org");

        let all = acc.citation_set(false);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_bare_list_used_when_no_rich_sources() {
        let mut acc = CitationAccumulator::new();
        acc.push(bare("https://a.org"));
        acc.push(bare("https://b.org"));
        let block = acc.finish(&policy(&[], &[])).unwrap();
        assert_eq!(
            block.render(),
            "\n\n참고문헌:\n- [1] https://a.org\n- [2] https://b.org"
        );
    }

    #[test]
    fn test_excluded_only_citation_yields_no_block() {
        let mut acc = CitationAccumulator::new();
        acc.push(rich("https://news.example.co.kr/1", "KR news"));
        assert!(acc.finish(&policy(&["kr"], &[])).is_none());
    }

    #[test]
    fn test_exclusion_does_not_hit_lookalike_domains() {
        let mut acc = CitationAccumulator::new();
        acc.push(rich("https://notkr.com/page", "Lookalike"));
        let block = acc.finish(&policy(&["kr"], &[])).unwrap();
        assert_eq!(block.entry_count(), 1);
    }

    #[test]
    fn test_empty_accumulator_yields_no_block() {
        assert!(CitationAccumulator::new().finish(&policy(&[], &[])).is_none());
    }

    #[test]
    fn test_partition_trusted_first_preserving_order() {
        let mut acc = CitationAccumulator::new();
        acc.push(rich("https://blog.example.com/a", "Blog"));
        acc.push(rich("https://cs.stanford.edu/p", "Stanford"));
        acc.push(rich("https://wiki.example.org/b", "Wiki"));
        acc.push(rich("https://www.nature.com/x", "Nature"));
        let block = acc.finish(&policy(&[], &["edu", "nature.com"])).unwrap();
        assert_eq!(block.groups.len(), 2);
        assert_eq!(block.groups[0].label.as_deref(), Some("📚 학술 자료"));
        let trusted: Vec<_> = block.groups[0].entries.iter().map(|r| r.title.as_str()).collect();
        let other: Vec<_> = block.groups[1].entries.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(trusted, vec!["Stanford", "Nature"]);
        assert_eq!(other, vec!["Blog", "Wiki"]);

        let rendered = block.render();
        assert!(rendered.contains("📚 학술 자료\n- [1] [Stanford](https://cs.stanford.edu/p)"));
        assert!(rendered.contains("🌐 기타 자료\n- [3] [Blog](https://blog.example.com/a)"));
        assert!(rendered.ends_with("- [4] [Wiki](https://wiki.example.org/b)"));
    }

    #[test]
    fn test_partition_skips_empty_group() {
        let mut acc = CitationAccumulator::new();
        acc.push(rich("https://mit.edu/x", "MIT"));
        let block = acc.finish(&policy(&[], &["edu"])).unwrap();
        assert_eq!(block.groups.len(), 1);
        assert_eq!(block.groups[0].label.as_deref(), Some("📚 학술 자료"));
    }

    #[test]
    fn test_render_escapes_brackets_and_parens() {
        let mut acc = CitationAccumulator::new();
        acc.push(rich(
            "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "Rust [language]",
        ));
        let rendered = acc.finish(&policy(&[], &[])).unwrap().render();
        assert!(rendered.ends_with(
            "- [1] [Rust (language)](https://en.wikipedia.org/wiki/Rust_%28programming_language%29)"
        ));
    }

    #[test]
    fn test_blank_header_falls_back_to_default() {
        let policy = CitationPolicy::from_config(&CitationConfig {
            header: "   ".to_string(),
            ..CitationConfig::default()
        });
        assert_eq!(policy.header, "참고문헌:");

        let mut acc = CitationAccumulator::new();
        acc.push(rich("https://a.org", "A"));
        let rendered = acc.finish(&policy).unwrap().render();
        assert_eq!(rendered, "\n\n참고문헌:\n- [1] [A](https://a.org)");

        let linker = crate::linker::CitationLinker::new(
            &policy.header,
            crate::linker::DisplayMode::Hidden,
        )
        .unwrap();
        let linked = linker.render(&format!("Fact [1].{rendered}"));
        assert_eq!(linked.main, "Fact [[1]](https://a.org).");
    }

    #[test]
    fn test_blank_url_is_rejected() {
        assert!(CitationRecord::new("   ", Some("t"), CitationSource::Annotation).is_none());
    }
}

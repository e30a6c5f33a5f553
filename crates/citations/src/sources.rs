//! Source-definition display parsing.
//!
//! A footnote definition line can carry several display forms. Parsing
//! prefers a title+URL pair, then a wiki-style link, then a best-effort
//! fallback that strips trailing parenthetical metadata.

use std::sync::LazyLock;

use regex::Regex;

static TITLE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<title>.+?)\s*\(\s*(?P<url>https?://[^\s)]+)\s*\)\s*$").unwrap());

static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[(?P<inner>[^\]]+)\]\]").unwrap());

static TRAILING_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<title>.+?)\s*\([^)]*\)\s*$").unwrap());

/// A source definition in display form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDisplay {
    /// Identity used for duplicate consolidation (case-insensitive match).
    pub title: String,

    /// The markdown rendering emitted in the source list.
    pub rendered: String,
}

/// Parse one definition body (the text after `[^N]:`) into display form.
pub fn parse_source_line(raw: &str) -> SourceDisplay {
    let raw = raw.trim();

    if let Some(caps) = TITLE_URL_RE.captures(raw) {
        let title = caps["title"].trim().to_string();
        let url = caps["url"].to_string();
        return SourceDisplay {
            rendered: format!("[{title}]({url})"),
            title,
        };
    }

    if let Some(caps) = WIKI_LINK_RE.captures(raw) {
        let inner = caps["inner"].to_string();
        // An alias form ([[path|alias]]) identifies by its target.
        let title = inner.split('|').next().unwrap_or(&inner).trim().to_string();
        return SourceDisplay {
            rendered: format!("[[{inner}]]"),
            title,
        };
    }

    let title = TRAILING_PAREN_RE
        .captures(raw)
        .map(|caps| caps["title"].trim().to_string())
        .unwrap_or_else(|| raw.to_string());

    SourceDisplay {
        rendered: title.clone(),
        title,
    }
}

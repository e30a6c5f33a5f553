//! Citation marker normalization.
//!
//! The model emits footnote-style markers (`[^7]`, `[^6, ^1, ^4]`) and a
//! trailing definition section in whatever numbering it happened to use.
//! This module rewrites the answer into a contiguous, first-mention-ordered,
//! deduplicated numbering scheme and re-emits the source list to match.

use std::collections::HashMap;
use std::sync::LazyLock;

use inklore_core::retrieval::SourceRef;
use regex::Regex;
use tracing::debug;

use crate::sources::{SourceDisplay, parse_source_line};

/// An inline marker: one or more `^N` references inside one bracket pair.
static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*\^\d+(?:\s*,\s*\^\d+)*\s*\]").unwrap());

static MARKER_NUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\^(\d+)").unwrap());

/// A "Sources" section heading, tolerant of several spellings.
static SECTION_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^(?:#{1,6}\s*)?(?:\*\*)?\s*(?:sources?|citations?|references?)\s*(?:\*\*)?\s*:?\s*$")
        .unwrap()
});

static FOOTNOTE_DEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[\^(\d+)\]:[ \t]*(.+)$").unwrap());

/// A rewritten numeric marker immediately followed by a period. The period
/// is dropped so a line-leading `[1].` is not mis-rendered as a markdown
/// ordered-list item downstream.
static MARKER_PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\[\d+(?:,\s*\d+)*\])\.").unwrap());

static BULLET_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*]\s+(.+)$").unwrap());

/// Rewrite footnote citations in `text` into contiguous first-mention
/// numbering with a consolidated source list. Returns the text unchanged
/// when citations are disabled.
///
/// Idempotent: normalizing already-normalized output is a no-op.
pub fn process_inline_citations(text: &str, enable_inline: bool) -> String {
    if !enable_inline {
        return text.to_string();
    }

    let (mut body, section) = split_sources_section(text);
    let def_source = section.as_deref().unwrap_or(text);

    // Definition order is preserved; the first definition for a number wins.
    let mut definitions: Vec<(u32, SourceDisplay)> = Vec::new();
    for caps in FOOTNOTE_DEF_RE.captures_iter(def_source) {
        let num: u32 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        if definitions.iter().all(|(existing, _)| *existing != num) {
            definitions.push((num, parse_source_line(&caps[2])));
        }
    }

    if definitions.is_empty() {
        // No recognizable footnote definitions: fall back to whatever
        // simple bullet-style source lines exist, with no renumbering.
        if let Some(section) = &section {
            let bullets: Vec<String> = BULLET_LINE_RE
                .captures_iter(section)
                .map(|c| c[1].trim().to_string())
                .collect();
            if !bullets.is_empty() {
                return format!(
                    "{}\n\n{}",
                    body.trim_end(),
                    render_bullet_section(&bullets)
                );
            }
        }
        return text.to_string();
    }

    // Definitions found outside any labelled section live in the body
    // itself; remove them before rewriting.
    if section.is_none() {
        body = FOOTNOTE_DEF_RE.replace_all(&body, "").to_string();
    }

    // Numbering by first-mention order in the body; definitions never
    // mentioned fall back to definition order.
    let defined: HashMap<u32, &SourceDisplay> =
        definitions.iter().map(|(n, d)| (*n, d)).collect();
    let mut order: Vec<u32> = Vec::new();
    for m in MARKER_RE.find_iter(&body) {
        for num in marker_numbers(m.as_str()) {
            if defined.contains_key(&num) && !order.contains(&num) {
                order.push(num);
            }
        }
    }
    for (num, _) in &definitions {
        if !order.contains(num) {
            order.push(*num);
        }
    }

    // Consolidate duplicates by case-insensitive title, keeping the first
    // occurrence's position, and compact to contiguous numbering in the
    // same pass. Title-only identity can merge distinct documents sharing
    // a title; a stable path would be stronger, but no path survives into
    // the model's definitions.
    let mut final_map: HashMap<u32, usize> = HashMap::new();
    let mut index_by_title: HashMap<String, usize> = HashMap::new();
    let mut list: Vec<String> = Vec::new();
    for num in order {
        let display = defined[&num];
        let key = display.title.to_lowercase();
        let idx = *index_by_title.entry(key).or_insert_with(|| {
            list.push(display.rendered.clone());
            list.len()
        });
        if idx != list.len() {
            debug!(original = num, merged_into = idx, "Consolidated duplicate source");
        }
        final_map.insert(num, idx);
    }

    // Rewrite inline markers. Rewriting can re-trigger adjacent matches, so
    // iterate to a fixed point rather than trusting a single pass.
    let mut rewritten = body;
    loop {
        let next = MARKER_RE
            .replace_all(&rewritten, |caps: &regex::Captures| {
                rewrite_marker(&caps[0], &final_map)
            })
            .to_string();
        if next == rewritten {
            break;
        }
        rewritten = next;
    }

    let rewritten = MARKER_PERIOD_RE.replace_all(&rewritten, "$1");

    format!(
        "{}\n\n{}",
        rewritten.trim_end(),
        render_source_section(&list)
    )
}

/// Append a synthesized source list built from the catalog, but only when
/// the text carries no pre-existing citation section.
pub fn add_fallback_sources(text: &str, sources: &[SourceRef], enable_inline: bool) -> String {
    if sources.is_empty() || has_citation_section(text) {
        return text.to_string();
    }

    let mut out = text.trim_end().to_string();
    if enable_inline {
        let rendered: Vec<String> = sources.iter().map(|s| format!("[[{}]]", s.title)).collect();
        out.push_str("\n\n");
        out.push_str(&render_source_section(&rendered));
    } else {
        out.push_str("\n\nSources:\n");
        let lines: Vec<String> = sources.iter().map(|s| format!("- [[{}]]", s.title)).collect();
        out.push_str(&lines.join("\n"));
    }
    out
}

/// Whether the text already carries some citation section.
pub fn has_citation_section(text: &str) -> bool {
    text.contains("<summary>Sources</summary>")
        || SECTION_HEADING_RE.is_match(text)
        || FOOTNOTE_DEF_RE.is_match(text)
}

fn split_sources_section(text: &str) -> (String, Option<String>) {
    match SECTION_HEADING_RE.find_iter(text).last() {
        Some(m) => (
            text[..m.start()].to_string(),
            Some(text[m.end()..].to_string()),
        ),
        None => (text.to_string(), None),
    }
}

fn marker_numbers(marker: &str) -> Vec<u32> {
    MARKER_NUM_RE
        .captures_iter(marker)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

fn rewrite_marker(marker: &str, final_map: &HashMap<u32, usize>) -> String {
    let mapped: Option<Vec<usize>> = marker_numbers(marker)
        .iter()
        .map(|n| final_map.get(n).copied())
        .collect();
    match mapped {
        Some(mut nums) => {
            // Grouped markers render sorted ascending.
            nums.sort_unstable();
            nums.dedup();
            let joined = nums
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{joined}]")
        }
        // A reference with no matching definition is left untouched.
        None => marker.to_string(),
    }
}

fn render_source_section(rendered: &[String]) -> String {
    let mut out = String::from("<details>\n<summary>Sources</summary>\n\n");
    for (i, entry) in rendered.iter().enumerate() {
        out.push_str(&format!("{}. {entry}\n", i + 1));
    }
    out.push_str("\n</details>");
    out
}

fn render_bullet_section(bullets: &[String]) -> String {
    let mut out = String::from("<details>\n<summary>Sources</summary>\n\n");
    for entry in bullets {
        out.push_str(&format!("- {entry}\n"));
    }
    out.push_str("\n</details>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_mention_order_wins_over_definition_order() {
        let input = "claim [^9] and [^1]\n\nSources:\n[^1]: [[A]]\n[^9]: [[B]]";
        let out = process_inline_citations(input, true);
        assert!(out.contains("claim [1] and [2]"));
        assert!(out.contains("1. [[B]]"));
        assert!(out.contains("2. [[A]]"));
        let b_pos = out.find("1. [[B]]").unwrap();
        let a_pos = out.find("2. [[A]]").unwrap();
        assert!(b_pos < a_pos);
    }

    #[test]
    fn consecutive_markers_both_rewritten() {
        let input = "text [^7][^8]\n\nSources:\n[^7]: [[X]]\n[^8]: [[Y]]";
        let out = process_inline_citations(input, true);
        assert!(out.contains("text [1][2]"), "got: {out}");
    }

    #[test]
    fn grouped_marker_renders_sorted_ascending() {
        let input = "claim [^6, ^1, ^4]\n\nSources:\n[^1]: [[A]]\n[^4]: [[B]]\n[^6]: [[C]]";
        let out = process_inline_citations(input, true);
        // 6 → 1, 1 → 2, 4 → 3 by first mention inside the group; rendered sorted.
        assert!(out.contains("claim [1, 2, 3]"), "got: {out}");
    }

    #[test]
    fn renumbered_set_is_contiguous() {
        let input = "a [^12] b [^3] c [^7]\n\nSources:\n[^3]: [[S3]]\n[^7]: [[S7]]\n[^12]: [[S12]]";
        let out = process_inline_citations(input, true);
        let nums: Vec<u32> = Regex::new(r"\[(\d+)\]")
            .unwrap()
            .captures_iter(&out)
            .filter_map(|c| c[1].parse().ok())
            .collect();
        let mut distinct: Vec<u32> = nums.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct, vec![1, 2, 3]);
    }

    #[test]
    fn trailing_period_stripped_after_marker() {
        let input = "The claim holds [^2].\n\nSources:\n[^2]: [[Proof]]";
        let out = process_inline_citations(input, true);
        assert!(out.contains("holds [1]\n") || out.contains("holds [1]"));
        assert!(!out.contains("[1]."));
    }

    #[test]
    fn unmentioned_definitions_fall_back_to_definition_order() {
        let input = "only [^5] cited\n\nSources:\n[^5]: [[First]]\n[^2]: [[Second]]\n[^8]: [[Third]]";
        let out = process_inline_citations(input, true);
        assert!(out.contains("only [1] cited"));
        assert!(out.contains("1. [[First]]"));
        assert!(out.contains("2. [[Second]]"));
        assert!(out.contains("3. [[Third]]"));
    }

    #[test]
    fn duplicate_titles_consolidated_case_insensitively() {
        let input = "a [^1] b [^2]\n\nSources:\n[^1]: [[Alpha]]\n[^2]: [[alpha]]";
        let out = process_inline_citations(input, true);
        assert!(out.contains("a [1] b [1]"), "got: {out}");
        assert!(out.contains("1. [[Alpha]]"));
        assert!(!out.contains("2."));
    }

    #[test]
    fn idempotent_on_own_output() {
        let input = "claim [^9] and [^1].\n\nSources:\n[^1]: [[A]]\n[^9]: [[B]]";
        let once = process_inline_citations(input, true);
        let twice = process_inline_citations(&once, true);
        assert_eq!(once, twice);
    }

    #[test]
    fn disabled_returns_unchanged() {
        let input = "claim [^9]\n\nSources:\n[^9]: [[B]]";
        assert_eq!(process_inline_citations(input, false), input);
    }

    #[test]
    fn undefined_reference_left_untouched() {
        let input = "known [^1] unknown [^99]\n\nSources:\n[^1]: [[A]]";
        let out = process_inline_citations(input, true);
        assert!(out.contains("known [1]"));
        assert!(out.contains("unknown [^99]"));
    }

    #[test]
    fn heading_spellings_tolerated() {
        for heading in ["Sources:", "#### Sources", "**Sources**", "References:", "Citations"] {
            let input = format!("claim [^1]\n\n{heading}\n[^1]: [[A]]");
            let out = process_inline_citations(&input, true);
            assert!(out.contains("claim [1]"), "heading {heading:?} not handled: {out}");
        }
    }

    #[test]
    fn no_definitions_renders_bullet_lines_without_renumbering() {
        let input = "some answer\n\nSources:\n- [[A]]\n- [[B]]";
        let out = process_inline_citations(input, true);
        assert!(out.contains("- [[A]]"));
        assert!(out.contains("- [[B]]"));
        assert!(out.contains("<summary>Sources</summary>"));
    }

    #[test]
    fn no_citations_at_all_returns_unchanged() {
        let input = "plain answer, nothing cited";
        assert_eq!(process_inline_citations(input, true), input);
    }

    #[test]
    fn title_url_definitions_render_as_links() {
        let input = "see [^1]\n\nSources:\n[^1]: Rust Blog (https://blog.rust-lang.org)";
        let out = process_inline_citations(input, true);
        assert!(out.contains("1. [Rust Blog](https://blog.rust-lang.org)"));
    }

    #[test]
    fn fallback_sources_appended_when_no_section_exists() {
        let sources = vec![
            SourceRef {
                title: "A".into(),
                path: "a.md".into(),
            },
            SourceRef {
                title: "B".into(),
                path: "b.md".into(),
            },
        ];
        let out = add_fallback_sources("answer text", &sources, true);
        assert!(out.contains("<summary>Sources</summary>"));
        assert!(out.contains("1. [[A]]"));
        assert!(out.contains("2. [[B]]"));
    }

    #[test]
    fn fallback_sources_not_duplicated() {
        let sources = vec![SourceRef {
            title: "A".into(),
            path: "a.md".into(),
        }];
        let already = "answer\n\n<details>\n<summary>Sources</summary>\n\n1. [[A]]\n\n</details>";
        assert_eq!(add_fallback_sources(already, &sources, true), already);
    }

    #[test]
    fn fallback_sources_plain_list_when_inline_disabled() {
        let sources = vec![SourceRef {
            title: "A".into(),
            path: "a.md".into(),
        }];
        let out = add_fallback_sources("answer", &sources, false);
        assert!(out.contains("Sources:\n- [[A]]"));
        assert!(!out.contains("<details>"));
    }

    #[test]
    fn fallback_with_empty_catalog_is_noop() {
        assert_eq!(add_fallback_sources("answer", &[], true), "answer");
    }
}

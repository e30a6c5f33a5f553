//! Citation normalization engine for Inklore.
//!
//! Operates once on the finalized text produced by the agent loop (or by
//! the simpler non-agentic answer path): rewrites footnote-style citation
//! markers into a contiguous, first-mention-ordered, deduplicated numbering
//! scheme consistent with the declared source catalog.
//!
//! Pure text transformation: no I/O and no failure path.

pub mod normalize;
pub mod sources;

pub use normalize::{add_fallback_sources, has_citation_section, process_inline_citations};
pub use sources::{SourceDisplay, parse_source_line};

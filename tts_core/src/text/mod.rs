//! Text side of the pipeline: cleanup, clause segmentation and token budgets.

mod budget;
mod clean;
mod segment;

pub use budget::{enforce_budget, whitespace_tokens, DEFAULT_MAX_TOKENS};
pub use clean::clean_for_speech;
pub use segment::{
    segment, Clause, Segments, PAUSE_EXCLAIM_MS, PAUSE_NEWLINE_MS, PAUSE_PERIOD_MS,
    PAUSE_TRAILING_MS,
};

/// Segment `text` and split the clauses to fit `max_tokens` whitespace tokens.
pub fn speakable_clauses(text: &str, max_tokens: usize) -> Vec<Clause> {
    enforce_budget(segment(text), whitespace_tokens, max_tokens)
}

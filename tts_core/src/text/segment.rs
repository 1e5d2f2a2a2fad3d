//! Clause segmentation.
//!
//! Splits incoming text at sentence punctuation and newlines into
//! [`Clause`]s, each carrying the pause that should follow it. Periods that
//! close a known abbreviation ("Dr.", "e.g.") do not end a clause.

use std::iter::Peekable;
use std::str::Chars;

use serde::{Deserialize, Serialize};

/// Pause after a clause ending in `?` or `!`
pub const PAUSE_EXCLAIM_MS: u32 = 250;
/// Pause after a clause ending in `.`
pub const PAUSE_PERIOD_MS: u32 = 180;
/// Pause after a line break
pub const PAUSE_NEWLINE_MS: u32 = 200;
/// Pause after a trailing fragment without terminal punctuation
pub const PAUSE_TRAILING_MS: u32 = 80;

const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "inc.", "etc.", "e.g.", "i.e.", "u.s.", "u.k.",
];

const CLOSERS: &[char] = &['"', '\'', '\u{201D}', '\u{2019}', ')', ']'];

/// A speakable span of text and the pause that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub text: String,
    pub pause_ms: u32,
}

impl Clause {
    pub fn new(text: impl Into<String>, pause_ms: u32) -> Self {
        Self {
            text: text.into(),
            pause_ms,
        }
    }
}

/// Segment `text` into clauses, in input order.
pub fn segment(text: &str) -> Segments<'_> {
    Segments {
        chars: text.chars().peekable(),
        buffer: String::new(),
    }
}

/// Single-pass clause iterator returned by [`segment`].
pub struct Segments<'a> {
    chars: Peekable<Chars<'a>>,
    buffer: String,
}

impl Segments<'_> {
    /// Emit the buffer as a clause, or nothing if it is blank.
    fn take_clause(&mut self, pause_ms: u32) -> Option<Clause> {
        let text = self.buffer.trim();
        let clause = (!text.is_empty()).then(|| Clause::new(text, pause_ms));
        self.buffer.clear();
        clause
    }
}

impl Iterator for Segments<'_> {
    type Item = Clause;

    fn next(&mut self) -> Option<Clause> {
        while let Some(ch) = self.chars.next() {
            if ch == '\n' {
                if let Some(clause) = self.take_clause(PAUSE_NEWLINE_MS) {
                    return Some(clause);
                }
                continue;
            }

            self.buffer.push(ch);

            if is_terminator(ch) {
                // "3.14", "e.g", "...", "?!" all keep going until the run ends
                let inside_token = self
                    .chars
                    .peek()
                    .is_some_and(|&next| next.is_alphanumeric() || is_terminator(next));
                if inside_token || ends_with_abbreviation(&self.buffer) {
                    continue;
                }
                // closing quotes and brackets stay with the sentence they close
                while let Some(closer) = self.chars.next_if(|next| CLOSERS.contains(next)) {
                    self.buffer.push(closer);
                }
                let pause = if ch == '.' { PAUSE_PERIOD_MS } else { PAUSE_EXCLAIM_MS };
                if let Some(clause) = self.take_clause(pause) {
                    return Some(clause);
                }
            }
        }

        self.take_clause(PAUSE_TRAILING_MS)
    }
}

fn is_terminator(ch: char) -> bool {
    matches!(ch, '.' | '?' | '!')
}

/// True if the last one or two words of `buffer` form a known abbreviation.
fn ends_with_abbreviation(buffer: &str) -> bool {
    let lowered = buffer.trim().to_lowercase();
    let mut words = lowered.split_whitespace().rev();

    let Some(last) = words.next() else {
        return false;
    };
    if ABBREVIATIONS.contains(&last) {
        return true;
    }
    match words.next() {
        Some(prev) => {
            let pair = format!("{prev}{last}");
            ABBREVIATIONS.contains(&pair.as_str())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        segment(input).map(|c| c.text).collect()
    }

    #[test]
    fn test_abbreviation_does_not_split() {
        let clauses: Vec<Clause> = segment("Dr. Smith left. He returned.").collect();
        assert_eq!(
            clauses,
            vec![
                Clause::new("Dr. Smith left.", PAUSE_PERIOD_MS),
                Clause::new("He returned.", PAUSE_PERIOD_MS),
            ]
        );
    }

    #[test]
    fn test_question_and_exclamation_pause() {
        let clauses: Vec<Clause> = segment("Ready? Go!").collect();
        assert_eq!(clauses[0].pause_ms, PAUSE_EXCLAIM_MS);
        assert_eq!(clauses[1].pause_ms, PAUSE_EXCLAIM_MS);
    }

    #[test]
    fn test_trailing_fragment() {
        let clauses: Vec<Clause> = segment("First sentence. and then some").collect();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[1], Clause::new("and then some", PAUSE_TRAILING_MS));
    }

    #[test]
    fn test_newline_terminates_regardless_of_abbreviation() {
        let clauses: Vec<Clause> = segment("Ask Dr.\nShe knows").collect();
        assert_eq!(clauses[0], Clause::new("Ask Dr.", PAUSE_NEWLINE_MS));
        assert_eq!(clauses[1], Clause::new("She knows", PAUSE_TRAILING_MS));
    }

    #[test]
    fn test_blank_lines_produce_no_clauses() {
        assert_eq!(texts("One.\n\n\nTwo."), vec!["One.", "Two."]);
        assert_eq!(segment("   \n  ").count(), 0);
        assert_eq!(segment("").count(), 0);
    }

    #[test]
    fn test_dotted_abbreviation_and_decimals() {
        assert_eq!(
            texts("Use tools, e.g. a hammer. Pi is 3.14 today."),
            vec!["Use tools, e.g. a hammer.", "Pi is 3.14 today."]
        );
        assert_eq!(texts("Born in the U.S. in May."), vec!["Born in the U.S. in May."]);
    }

    #[test]
    fn test_punctuation_runs_close_once() {
        let clauses: Vec<Clause> = segment("Wait... what?! Fine.").collect();
        assert_eq!(clauses[0].text, "Wait...");
        assert_eq!(clauses[1], Clause::new("what?!", PAUSE_EXCLAIM_MS));
        assert_eq!(clauses[2].text, "Fine.");
    }

    #[test]
    fn test_sentence_ends_inside_quotes_and_brackets() {
        assert_eq!(
            texts("He said \"Stop.\" Then he left."),
            vec!["He said \"Stop.\"", "Then he left."]
        );
        let clauses: Vec<Clause> = segment("(See above.) Next point?) Yes.").collect();
        assert_eq!(clauses[0], Clause::new("(See above.)", PAUSE_PERIOD_MS));
        assert_eq!(clauses[1], Clause::new("Next point?)", PAUSE_EXCLAIM_MS));
        assert_eq!(clauses[2].text, "Yes.");
    }

    #[test]
    fn test_abbreviation_followed_by_comma() {
        assert_eq!(texts("Tools, etc., are here."), vec!["Tools, etc., are here."]);
    }

    #[test]
    fn test_unknown_abbreviation_over_splits() {
        // Only the fixed list is recognised; "Gen." ends a clause.
        assert_eq!(texts("Gen. Grant won."), vec!["Gen.", "Grant won."]);
    }
}

//! Token-budget enforcement for clauses.

use super::Clause;

/// Default token budget per clause
pub const DEFAULT_MAX_TOKENS: usize = 120;

/// Whitespace tokenizer used when the caller has no model tokenizer.
pub fn whitespace_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Split every clause whose token count exceeds `max_tokens`.
///
/// Oversized clauses are bisected at the token midpoint, each half rejoined
/// with single spaces and checked again. Both halves keep the original pause.
/// A clause of one token is accepted even if it still exceeds the budget.
pub fn enforce_budget<I, F>(clauses: I, tokenize: F, max_tokens: usize) -> Vec<Clause>
where
    I: IntoIterator<Item = Clause>,
    F: Fn(&str) -> Vec<String>,
{
    let mut out = Vec::new();
    for clause in clauses {
        split_into(clause, &tokenize, max_tokens, &mut out);
    }
    out
}

fn split_into<F>(clause: Clause, tokenize: &F, max_tokens: usize, out: &mut Vec<Clause>)
where
    F: Fn(&str) -> Vec<String>,
{
    let tokens = tokenize(&clause.text);
    if tokens.len() <= max_tokens || tokens.len() <= 1 {
        out.push(clause);
        return;
    }

    let (left, right) = tokens.split_at(tokens.len() / 2);
    split_into(Clause::new(left.join(" "), clause.pause_ms), tokenize, max_tokens, out);
    split_into(Clause::new(right.join(" "), clause.pause_ms), tokenize, max_tokens, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(words: usize) -> String {
        (0..words).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_short_clause_passes_through() {
        let clause = Clause::new("Hello  there,   friend.", 180);
        let out = enforce_budget(vec![clause.clone()], whitespace_tokens, 10);
        assert_eq!(out, vec![clause]);
    }

    #[test]
    fn test_every_output_fits_budget() {
        for words in [2usize, 7, 31, 120, 257] {
            for max_tokens in [1usize, 2, 3, 8, 50] {
                let out = enforce_budget(
                    vec![Clause::new(sentence(words), 250)],
                    whitespace_tokens,
                    max_tokens,
                );
                for clause in &out {
                    assert!(whitespace_tokens(&clause.text).len() <= max_tokens);
                    assert_eq!(clause.pause_ms, 250);
                }
                let rebuilt: Vec<String> = out.iter().map(|c| c.text.clone()).collect();
                assert_eq!(rebuilt.join(" "), sentence(words));
            }
        }
    }

    #[test]
    fn test_bisects_at_midpoint() {
        let out = enforce_budget(vec![Clause::new("a b c d e", 80)], whitespace_tokens, 4);
        assert_eq!(out, vec![Clause::new("a b", 80), Clause::new("c d e", 80)]);
    }

    #[test]
    fn test_single_token_accepted_with_zero_budget() {
        let out = enforce_budget(vec![Clause::new("word", 80)], whitespace_tokens, 0);
        assert_eq!(out, vec![Clause::new("word", 80)]);
    }

    #[test]
    fn test_custom_tokenizer() {
        let chars = |text: &str| {
            text.chars()
                .filter(|c| !c.is_whitespace())
                .map(String::from)
                .collect::<Vec<String>>()
        };
        let out = enforce_budget(vec![Clause::new("abcdef", 180)], chars, 2);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|c| c.text.split(' ').count() <= 2));
    }
}

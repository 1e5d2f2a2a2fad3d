//! Text cleanup before speech.
//!
//! LLM replies arrive as markdown. Formatting marks, links, code and symbols
//! the phonemizer cannot voice are removed so the segmenter only sees prose.

use std::sync::OnceLock;

use regex::Regex;

fn markdown_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            // fenced code is not read out
            (r"```[\s\S]*?```", " code block "),
            (r"`([^`]+)`", "$1"),
            (r"!\[[^\]]*\]\([^)]+\)", ""),
            (r"\[([^\]]+)\]\([^)]+\)", "$1"),
            (r"(?m)^[ \t]*#+[ \t]*", ""),
            (r"\*{1,2}([^*]+)\*{1,2}", "$1"),
            (r"_{1,2}([^_]+)_{1,2}", "$1"),
            (r"~~([^~]+)~~", "$1"),
            (r"<[^>]+>", ""),
            // anything outside the voiced character set, emoji included
            (r"[^A-Za-z0-9 !.,?\n]", ""),
            (r"([.!?])[ \t]*\n+", "$1 "),
            (r"([^.!?\s])[ \t]*\n+", "$1. "),
            (r"\s+", " "),
        ]
        .into_iter()
        .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid regex"), replacement))
        .collect()
    })
}

/// Strip markdown, markup and unvoiced symbols from `text`.
///
/// Line breaks become sentence ends so the pause survives the cleanup.
pub fn clean_for_speech(text: &str) -> String {
    let mut cleaned = text.to_string();
    for (pattern, replacement) in markdown_rules() {
        cleaned = pattern.replace_all(&cleaned, *replacement).into_owned();
    }
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_removed() {
        let input = "## Title\nThis is **bold** and _italic_ with a [link](http://x.y).";
        assert_eq!(clean_for_speech(input), "Title. This is bold and italic with a link.");
    }

    #[test]
    fn test_code_blocks() {
        assert_eq!(
            clean_for_speech("Run ```rm -rf /``` or `ls` now"),
            "Run code block or ls now"
        );
    }

    #[test]
    fn test_symbols_and_emoji_dropped() {
        assert_eq!(clean_for_speech("Great job 🎉 <b>really</b> ~~not~~!"), "Great job really not!");
    }

    #[test]
    fn test_newlines_after_punctuation_collapse() {
        assert_eq!(clean_for_speech("Done.\n\nNext item\nLast"), "Done. Next item. Last");
    }

    #[test]
    fn test_images_removed() {
        assert_eq!(clean_for_speech("See ![chart](c.png) above"), "See above");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clean_for_speech(""), "");
        assert_eq!(clean_for_speech("***"), "");
    }
}

//! Word-count tokenization.
//!
//! Word counts are persisted on documents and surfaced in usage analytics,
//! so the rule is load-bearing: split on whitespace runs, strip leading and
//! trailing ASCII punctuation from each token, drop tokens that end up
//! empty, count the remainder.

/// Count the words in extracted document text.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|token| !token.is_empty())
        .count()
}

/// Count the characters in extracted document text.
pub fn character_count(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_zero_words() {
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn punctuation_is_stripped_from_tokens() {
        assert_eq!(word_count("hello, world!"), 2);
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(word_count("  a  b   c  "), 3);
    }

    #[test]
    fn pure_punctuation_tokens_are_dropped() {
        assert_eq!(word_count("!!!"), 0);
    }

    #[test]
    fn interior_punctuation_is_kept() {
        assert_eq!(word_count("it's a mid-sentence test"), 4);
    }

    #[test]
    fn newlines_separate_words() {
        assert_eq!(word_count("Paragraph one.\n\nParagraph two."), 4);
    }

    #[test]
    fn character_count_counts_chars_not_bytes() {
        assert_eq!(character_count("abc\n\ndef"), 8);
        assert_eq!(character_count("héllo"), 5);
    }
}

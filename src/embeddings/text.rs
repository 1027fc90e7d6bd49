//! Text normalization for the local embedder
//!
//! lowercase → non-alphanumerics to spaces → whitespace split → stop-word and
//! single-character filter → suffix stemming → unigrams + adjacent bigrams.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
        "any", "are", "aren", "as", "at", "be", "because", "been", "before", "being", "below",
        "between", "both", "but", "by", "can", "could", "did", "didn", "do", "does", "doesn",
        "doing", "don", "down", "during", "each", "even", "few", "for", "from", "further", "get",
        "got", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
        "himself", "his", "how", "i", "if", "in", "into", "is", "isn", "it", "its", "itself",
        "just", "let", "like", "ll", "me", "might", "more", "most", "much", "must", "my",
        "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other",
        "our", "ours", "ourselves", "out", "over", "own", "really", "re", "same", "she",
        "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
        "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
        "um", "uh", "under", "until", "up", "us", "ve", "very", "was", "wasn", "we", "well",
        "were", "weren", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
        "with", "won", "would", "yeah", "you", "your", "yours", "yourself", "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Suffixes stripped by the stemmer, longest first.
static SUFFIXES: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut suffixes = vec![
        "ational", "ization", "fulness", "ousness", "iveness", "ations", "ements", "ation",
        "ement", "ments", "ness", "ment", "able", "ible", "ings", "ing", "tion", "sion", "ies",
        "ied", "ful", "ous", "ive", "ize", "ise", "ly", "ed", "er", "es", "s",
    ];
    suffixes.sort_by_key(|s| std::cmp::Reverse(s.len()));
    suffixes
});

/// Minimum stem length left after stripping a suffix.
const MIN_STEM_LEN: usize = 3;

/// Strip the longest matching suffix, keeping at least [`MIN_STEM_LEN`] chars.
pub fn stem(word: &str) -> String {
    for suffix in SUFFIXES.iter() {
        if let Some(stem) = word.strip_suffix(suffix) {
            if stem.chars().count() >= MIN_STEM_LEN {
                return stem.to_string();
            }
        }
    }
    word.to_string()
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Normalized, stemmed tokens of `text` in order.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    lowered
        .split_whitespace()
        .filter(|t| t.chars().count() > 1 && !is_stop_word(t))
        .map(stem)
        .collect()
}

/// Raw term frequencies over unigrams and adjacent bigrams (`a_b`).
pub fn term_frequencies(tokens: &[String]) -> HashMap<String, u32> {
    let mut tf: HashMap<String, u32> = HashMap::new();
    for token in tokens {
        *tf.entry(token.clone()).or_default() += 1;
    }
    for pair in tokens.windows(2) {
        *tf.entry(format!("{}_{}", pair[0], pair[1])).or_default() += 1;
    }
    tf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_filters_and_stems() {
        let tokens = tokenize("The Meetings were REALLY productive, and we're planning!");
        assert_eq!(tokens, vec!["meet", "product", "plann"]);
    }

    #[test]
    fn test_stop_word_only_input_is_empty() {
        assert!(tokenize("the and of a I").is_empty());
        assert!(tokenize("").is_empty());
        assert!(tokenize("!!! ...").is_empty());
    }

    #[test]
    fn test_stem_longest_suffix_first() {
        assert_eq!(stem("organization"), "organ");
        assert_eq!(stem("happiness"), "happi");
        assert_eq!(stem("cats"), "cat");
        // Too short to strip
        assert_eq!(stem("is"), "is");
        assert_eq!(stem("bed"), "bed");
    }

    #[test]
    fn test_term_frequencies_include_bigrams() {
        let tokens: Vec<String> = ["rust", "async", "rust"].iter().map(|s| s.to_string()).collect();
        let tf = term_frequencies(&tokens);
        assert_eq!(tf["rust"], 2);
        assert_eq!(tf["async"], 1);
        assert_eq!(tf["rust_async"], 1);
        assert_eq!(tf["async_rust"], 1);
        assert_eq!(tf.len(), 4);
    }
}

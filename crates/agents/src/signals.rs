//! Text normalization shared by registry matching and request classification.

use std::collections::BTreeSet;

/// Lowercase the text and split it on anything that is not alphanumeric.
///
/// "End-to-end" and "end to end" produce the same token stream.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// Token set used for keyword matching, with simple plurals folded.
pub fn keyword_set(tokens: &[String]) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    for token in tokens {
        if let Some(singular) = fold_plural(token) {
            set.insert(singular.to_string());
        }
        set.insert(token.clone());
    }
    set
}

fn fold_plural(token: &str) -> Option<&str> {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        Some(&token[..token.len() - 1])
    } else {
        None
    }
}

/// Whether the normalized phrase occurs as a contiguous run of tokens.
pub fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let needle = tokenize(phrase);
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|window| window == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_punctuation() {
        assert_eq!(
            tokenize("Review src/App.tsx, please!"),
            vec!["review", "src", "app", "tsx", "please"]
        );
    }

    #[test]
    fn keyword_set_folds_plurals() {
        let set = keyword_set(&tokenize("fix the bugs in tests"));
        assert!(set.contains("bug"));
        assert!(set.contains("bugs"));
        assert!(set.contains("test"));
        // short words and double-s endings are left alone
        assert!(!set.contains("i"));
        let set = keyword_set(&tokenize("access class"));
        assert!(!set.contains("acces"));
    }

    #[test]
    fn phrases_match_across_separators() {
        let tokens = tokenize("Build it end-to-end with a full-stack setup");
        assert!(contains_phrase(&tokens, "end to end"));
        assert!(contains_phrase(&tokens, "full stack"));
        assert!(!contains_phrase(&tokens, "comprehensive"));
        assert!(!contains_phrase(&tokens, ""));
    }

    #[test]
    fn phrase_requires_whole_tokens() {
        let tokens = tokenize("fullscreen mode");
        assert!(!contains_phrase(&tokens, "full"));
    }
}

//! Narration script shortening.

use regex::Regex;
use std::sync::OnceLock;

fn sentence_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            // A sentence runs to its terminal punctuation plus any closing quotes
            Regex::new(r#"[^.!?]+(?:[.!?]+["')\]]*|$)"#).ok()
        })
        .as_ref()
}

/// Splits narration into trimmed, non-empty sentences.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let Some(pattern) = sentence_pattern() else {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    };
    pattern
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Number of whitespace-separated words.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Words that fit in `video_seconds` of narration.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn target_words(video_seconds: f64, words_per_second: f64) -> usize {
    (video_seconds * words_per_second).max(0.0).floor() as usize
}

/// Shortens `script` to roughly `target_words`, keeping the first (hook) and
/// last (call to action) sentences verbatim.
///
/// Middle sentences are kept in order, word by word, until the budget left
/// after the hook and call to action is spent. Returns `None` when the script
/// has fewer than two sentences.
#[must_use]
pub fn shorten_script(script: &str, target_words: usize) -> Option<String> {
    let sentences = split_sentences(script);
    if sentences.len() < 2 {
        return None;
    }

    let hook = &sentences[0];
    let cta = &sentences[sentences.len() - 1];
    let middle = &sentences[1..sentences.len() - 1];

    let fixed = word_count(hook) + word_count(cta);
    let mut budget = target_words.saturating_sub(fixed);

    let mut parts = vec![hook.clone()];
    for sentence in middle {
        if budget == 0 {
            break;
        }
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if words.len() <= budget {
            budget -= words.len();
            parts.push(sentence.clone());
        } else {
            let mut cut = words[..budget].join(" ");
            cut = cut.trim_end_matches(&[',', ';', ':'][..]).to_string();
            if !cut.ends_with(&['.', '!', '?'][..]) {
                cut.push('.');
            }
            parts.push(cut);
            budget = 0;
        }
    }
    parts.push(cta.clone());

    Some(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCRIPT: &str = "Ever wondered why tide pools glow? \
        At night, tiny plankton light up when the water moves. \
        Scientists call this bioluminescence and it is everywhere. \
        Follow for more ocean secrets!";

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences(SCRIPT);
        assert_eq!(sentences.len(), 4);
        assert_eq!(sentences[0], "Ever wondered why tide pools glow?");
        assert_eq!(sentences[3], "Follow for more ocean secrets!");
    }

    #[test]
    fn test_split_keeps_unterminated_tail() {
        assert_eq!(
            split_sentences("First one. Then a fragment"),
            vec!["First one.".to_string(), "Then a fragment".to_string()]
        );
    }

    #[test]
    fn test_target_words_floors() {
        assert_eq!(target_words(8.0, 2.5), 20);
        assert_eq!(target_words(8.3, 2.5), 20);
        assert_eq!(target_words(0.0, 2.5), 0);
    }

    #[test]
    fn test_shorten_keeps_hook_and_cta_verbatim() {
        // hook 6 words + cta 5 words, leaves 5 for the middle
        let shortened = shorten_script(SCRIPT, 16).unwrap();
        assert!(shortened.starts_with("Ever wondered why tide pools glow?"));
        assert!(shortened.ends_with("Follow for more ocean secrets!"));
        assert_eq!(
            shortened,
            "Ever wondered why tide pools glow? At night, tiny plankton light. Follow for more ocean secrets!"
        );
        assert_eq!(word_count(&shortened), 16);
    }

    #[test]
    fn test_shorten_without_budget_keeps_only_hook_and_cta() {
        let shortened = shorten_script(SCRIPT, 5).unwrap();
        assert_eq!(
            shortened,
            "Ever wondered why tide pools glow? Follow for more ocean secrets!"
        );
    }

    #[test]
    fn test_shorten_with_ample_budget_keeps_everything() {
        let shortened = shorten_script(SCRIPT, 200).unwrap();
        assert_eq!(split_sentences(&shortened), split_sentences(SCRIPT));
    }

    #[test]
    fn test_shorten_requires_two_sentences() {
        assert!(shorten_script("Just one sentence here.", 3).is_none());
        assert!(shorten_script("", 3).is_none());
    }
}

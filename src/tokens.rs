use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::models::ChatMessage;

static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn tokenizer() -> Option<&'static CoreBPE> {
    CL100K
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(err) => {
                tracing::warn!("cl100k tokenizer unavailable, using character estimate: {err:#}");
                None
            }
        })
        .as_ref()
}

/// Token count under cl100k. Falls back to [`rough_estimate`] when the
/// tokenizer cannot be loaded.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    match tokenizer() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => rough_estimate(text),
    }
}

/// Upper-leaning estimate: the larger of words x 4/3 and one token per
/// non-ASCII char plus one per four ASCII chars.
fn rough_estimate(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let by_words = (words * 4).div_ceil(3);

    let (ascii, other) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(ascii, other), c| {
            if c.is_ascii() {
                (ascii + 1, other)
            } else {
                (ascii, other + 1)
            }
        });
    let by_chars = other + ascii.div_ceil(4);

    by_words.max(by_chars)
}

/// Keeps the most recent messages whose combined estimate fits `budget`.
pub fn trim_history_to_budget(history: &[ChatMessage], budget: usize) -> Vec<ChatMessage> {
    let mut kept = Vec::new();
    let mut used = 0usize;

    for message in history.iter().rev() {
        let cost = estimate_tokens(&message.content);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(message.clone());
    }

    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    const KOREAN_NO_SPACES: &str = "오늘은날씨가정말좋아서친구들과함께공원에산책하러갔습니다";

    #[test]
    fn counts_cl100k_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("hello world"), 2);
    }

    #[test]
    fn korean_without_spaces_is_not_undercounted() {
        let chars = KOREAN_NO_SPACES.chars().count();
        assert!(estimate_tokens(KOREAN_NO_SPACES) >= chars / 2);
        assert!(rough_estimate(KOREAN_NO_SPACES) >= chars);
    }

    #[test]
    fn rough_estimate_takes_the_larger_measure() {
        assert_eq!(rough_estimate("one two three"), 4);
        assert_eq!(rough_estimate("abcdefgh"), 2);
        assert_eq!(rough_estimate("안녕 하세요"), 5);
    }

    #[test]
    fn trimming_drops_oldest_messages_first() {
        let history = vec![
            ChatMessage::user("first question with quite a few words in it"),
            ChatMessage::assistant("first answer"),
            ChatMessage::user("second"),
        ];

        let kept = trim_history_to_budget(&history, 5);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].content, "first answer");
        assert_eq!(kept[1].content, "second");
    }

    #[test]
    fn zero_budget_keeps_nothing() {
        let history = vec![ChatMessage::user("hello")];
        assert!(trim_history_to_budget(&history, 0).is_empty());
    }
}

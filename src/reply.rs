use regex::Regex;
use std::sync::OnceLock;

/// A raw reply split into its reasoning and answer parts
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplyParts {
    pub reasoning: String,
    pub answer: String,
}

fn think_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Literal pattern, always compiles
    RE.get_or_init(|| Regex::new(r"(?is)<think>(.*?)</think>").expect("think marker pattern"))
}

/// Split `raw` on `<think>...</think>` markers.
///
/// Both parts keep only the LAST segment of their kind: every marker overwrites
/// `reasoning` and every non-empty plain segment overwrites `answer`. `answer`
/// starts out as the whole reply.
pub fn split(raw: &str) -> ReplyParts {
    let mut parts = ReplyParts {
        reasoning: String::new(),
        answer: raw.to_string(),
    };

    let mut cursor = 0;
    for caps in think_marker().captures_iter(raw) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let plain = &raw[cursor..whole.start()];
        if !plain.is_empty() {
            parts.answer = plain.to_string();
        }
        parts.reasoning = inner.as_str().to_string();
        cursor = whole.end();
    }

    if cursor > 0 {
        let tail = &raw[cursor..];
        if !tail.is_empty() {
            parts.answer = tail.to_string();
        }
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_marker() {
        let parts = split("plain answer");
        assert_eq!(parts.reasoning, "");
        assert_eq!(parts.answer, "plain answer");
    }

    #[test]
    fn test_single_marker() {
        let parts = split("<think>\nstep one\nstep two\n</think>\n\nThe answer is 4.");
        assert_eq!(parts.reasoning, "\nstep one\nstep two\n");
        assert_eq!(parts.answer, "\n\nThe answer is 4.");
    }

    #[test]
    fn test_second_marker_wins() {
        let parts = split("<think>first</think>middle<think>second</think>end");
        assert_eq!(parts.reasoning, "second");
        assert_eq!(parts.answer, "end");
    }

    #[test]
    fn test_last_plain_segment_wins() {
        let parts = split("intro text<think>why</think>final text");
        assert_eq!(parts.reasoning, "why");
        assert_eq!(parts.answer, "final text");
    }

    #[test]
    fn test_leading_plain_kept_when_marker_trails() {
        let parts = split("only answer<think>why</think>");
        assert_eq!(parts.reasoning, "why");
        assert_eq!(parts.answer, "only answer");
    }

    #[test]
    fn test_marker_only_keeps_raw_answer() {
        let raw = "<think>just thinking</think>";
        let parts = split(raw);
        assert_eq!(parts.reasoning, "just thinking");
        assert_eq!(parts.answer, raw);
    }

    #[test]
    fn test_case_insensitive_markers() {
        let parts = split("<THINK>loud</Think>quiet");
        assert_eq!(parts.reasoning, "loud");
        assert_eq!(parts.answer, "quiet");
    }

    #[test]
    fn test_unclosed_marker_is_plain_text() {
        let parts = split("<think>never closed");
        assert_eq!(parts.reasoning, "");
        assert_eq!(parts.answer, "<think>never closed");
    }
}

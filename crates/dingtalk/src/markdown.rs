use std::sync::LazyLock;

use {
    regex::Regex,
    serde::{Deserialize, Serialize},
};

/// Title used when a chunk has no plain-text content.
pub const DEFAULT_OUTBOUND_TITLE: &str = "[新的消息]";

/// Characters of plain text kept for the notification title.
pub const OUTBOUND_TITLE_PREVIEW_LENGTH: usize = 15;

/// How outbound replies are split.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    /// Fill each chunk up to the limit, preferring newline/space breaks.
    #[default]
    Length,
    /// Keep paragraphs together, splitting only between blank lines.
    Newline,
}

const PLAIN_TEXT_PATTERNS: [(&str, &str); 12] = [
    (r"(?s)```.*?```", " "),
    (r"`([^`]+)`", "$1"),
    (r"!\[([^\]]*)\]\([^)]+\)", "$1"),
    (r"\[([^\]]+)\]\([^)]+\)", "$1"),
    (r"<https?://[^>]+>", " "),
    (r"(?m)^#{1,6}\s+", ""),
    (r"(?m)^\s{0,3}>\s?", ""),
    (r"(?m)^\s*([-*+]|[0-9]+\.)\s+", ""),
    (r"(\*\*|__|\*|_|~~)", ""),
    (r"</?[^>]+>", " "),
    (r"\r?\n+", " "),
    (r"\s+", " "),
];

/// Ordered rewrite rules turning markdown/HTML into one line of plain text.
#[allow(clippy::expect_used)]
static PLAIN_TEXT_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    PLAIN_TEXT_PATTERNS
        .into_iter()
        .map(|(pattern, replacement)| {
            let regex = Regex::new(pattern).expect("plain-text rule must compile");
            (regex, replacement)
        })
        .collect()
});

#[allow(clippy::expect_used)]
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("paragraph break must compile"));

/// Strip code fences, links, headings, list markers, emphasis and tags,
/// collapsing whitespace.
pub fn strip_markdown_to_plain_text(input: &str) -> String {
    let mut text = input.to_string();
    for (regex, replacement) in PLAIN_TEXT_RULES.iter() {
        text = regex.replace_all(&text, *replacement).into_owned();
    }
    text.trim().to_string()
}

/// Notification title for a markdown message: a short plain-text preview.
pub fn build_outbound_title(text: &str) -> String {
    let plain = strip_markdown_to_plain_text(text);
    if plain.is_empty() {
        return DEFAULT_OUTBOUND_TITLE.to_string();
    }
    plain.chars().take(OUTBOUND_TITLE_PREVIEW_LENGTH).collect()
}

/// Split `text` into chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize, mode: ChunkMode) -> Vec<String> {
    if max_chars == 0 || text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }
    match mode {
        ChunkMode::Length => chunk_by_length(text, max_chars),
        ChunkMode::Newline => chunk_by_paragraph(text, max_chars),
    }
}

/// Split at the last newline or space inside each window, hard-splitting
/// when neither exists.
fn chunk_by_length(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let Some((window_end, _)) = remaining.char_indices().nth(max_chars) else {
            if !remaining.trim().is_empty() {
                chunks.push(remaining.to_string());
            }
            break;
        };

        let window = &remaining[..window_end];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&idx| idx > 0)
            .unwrap_or(window_end);

        let chunk = &remaining[..split_at];
        if !chunk.trim().is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

fn chunk_by_paragraph(text: &str, max_chars: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = PARAGRAPH_BREAK.split(text).collect();

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in paragraphs {
        let paragraph = paragraph.trim_matches('\n');
        if paragraph.trim().is_empty() {
            continue;
        }
        let len = paragraph.chars().count();

        if len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.extend(chunk_by_length(paragraph, max_chars));
            continue;
        }

        if !current.is_empty() && current_len + 2 + len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(paragraph);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn every_plain_text_rule_compiles() {
        assert_eq!(PLAIN_TEXT_RULES.len(), PLAIN_TEXT_PATTERNS.len());
        assert_eq!(PARAGRAPH_BREAK.split("a\n \nb").count(), 2);
    }

    #[rstest]
    #[case("**hello** world", "hello world")]
    #[case("# Title\nbody", "Title body")]
    #[case("see [docs](https://example.com) now", "see docs now")]
    #[case("![chart](https://example.com/c.png)", "chart")]
    #[case("use `cargo test`", "use cargo test")]
    #[case("```rust\nfn main() {}\n```\nafter", "after")]
    #[case("> quoted\n- item one\n2. item two", "quoted item one item two")]
    #[case("<b>bold</b> ~~gone~~", "bold gone")]
    #[case("visit <https://example.com> today", "visit today")]
    #[case("   \n\n  ", "")]
    fn strips_markup(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_markdown_to_plain_text(input), expected);
    }

    #[test]
    fn title_truncates_to_preview_length() {
        assert_eq!(build_outbound_title("## 今天天气很好，适合出去散步，也适合在家写代码"), "今天天气很好，适合出去散步，也");
        assert_eq!(build_outbound_title("short"), "short");
    }

    #[test]
    fn title_falls_back_when_empty() {
        assert_eq!(build_outbound_title("```\n```"), DEFAULT_OUTBOUND_TITLE);
        assert_eq!(build_outbound_title(""), DEFAULT_OUTBOUND_TITLE);
    }

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(chunk_text("hello", 4000, ChunkMode::Length), vec!["hello"]);
        assert!(chunk_text("", 4000, ChunkMode::Length).is_empty());
        assert!(chunk_text("hello", 0, ChunkMode::Length).is_empty());
    }

    #[test]
    fn length_mode_prefers_newline_then_space() {
        let chunks = chunk_text("aaaa bbbb\ncccc dddd", 12, ChunkMode::Length);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc dddd"]);

        let chunks = chunk_text("aaaa bbbb cccc", 10, ChunkMode::Length);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn length_mode_skips_whitespace_runs() {
        assert_eq!(chunk_text("aaaa     bbbb", 5, ChunkMode::Length), vec!["aaaa", "bbbb"]);
        assert_eq!(chunk_text("aaaa\n\n  \n   bbbb", 5, ChunkMode::Length), vec!["aaaa", "bbbb"]);
        let chunks = chunk_text("word          ", 5, ChunkMode::Length);
        assert_eq!(chunks, vec!["word"]);
    }

    #[test]
    fn length_mode_hard_splits_long_words() {
        let chunks = chunk_text(&"x".repeat(25), 10, ChunkMode::Length);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn length_mode_counts_characters_not_bytes() {
        let text = "中".repeat(7);
        let chunks = chunk_text(&text, 3, ChunkMode::Length);
        assert_eq!(chunks, vec!["中中中", "中中中", "中"]);
    }

    #[test]
    fn newline_mode_packs_paragraphs() {
        let text = "para one\n\npara two\n\npara three";
        let chunks = chunk_text(text, 20, ChunkMode::Newline);
        assert_eq!(chunks, vec!["para one\n\npara two", "para three"]);
    }

    #[test]
    fn newline_mode_splits_oversized_paragraph() {
        let text = format!("intro\n\n{}", "word ".repeat(6).trim_end());
        let chunks = chunk_text(&text, 12, ChunkMode::Newline);
        assert_eq!(chunks, vec!["intro", "word word", "word word", "word word"]);
    }

    #[test]
    fn chunks_preserve_content_order() {
        let text: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let chunks = chunk_text(&text, 40, ChunkMode::Length);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        let rejoined = chunks.join("\n");
        assert_eq!(rejoined.trim_end(), text.trim_end());
    }
}

//! Cleanup for free-text LLM output.
//!
//! LLM-backed engines routinely wrap the real answer in code fences, preface
//! it with "Here is the extracted text:", or leave stray format labels behind.
//! None of that is OCR content.

use std::sync::LazyLock;

use regex::Regex;

/// Fenced blocks, with an optional language tag after the opening fence.
static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:\w+)?[ \t]*\r?\n?([\s\S]*?)```").expect("failed to compile regex")
});

/// Preface lines some models emit before the actual content.
const PREFACE_LINES: &[&str] = &[
    "here is the extracted text",
    "extracted text",
    "ocr output",
    "output",
    "result",
];

/// Residual fence-language tags, dropped when they appear as bare lines.
const FORMAT_LABELS: &[&str] = &["markdown", "json", "text"];

/// Maximum length of a line we'll treat as a bare format label.
const MAX_LABEL_LEN: usize = 12;

/// Strip formatting noise from free-text model output.
///
/// When the text contains fenced blocks, we keep the content of the *longest*
/// one, never the first: models sometimes emit a short preamble fence next to
/// the fence holding the real answer.
pub fn clean_model_text(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let mut working = if text.contains("```") {
        FENCED_BLOCK_RE
            .captures_iter(text)
            .map(|caps| caps.get(1).map(|m| m.as_str().trim()).unwrap_or(""))
            .max_by_key(|block| block.len())
            .filter(|block| !block.is_empty())
            .unwrap_or(text)
            .to_owned()
    } else {
        text.to_owned()
    };

    // Strip any fence markers that survived (e.g. an unclosed fence).
    working = working.replace("```", "");

    let mut lines = Vec::new();
    for (idx, line) in working.lines().enumerate() {
        let trimmed = line.trim();
        let lowered = trimmed.trim_end_matches(':').to_ascii_lowercase();
        if idx == 0 && PREFACE_LINES.contains(&lowered.as_str()) {
            continue;
        }
        if trimmed.len() <= MAX_LABEL_LEN
            && FORMAT_LABELS.contains(&trimmed.to_ascii_lowercase().as_str())
        {
            continue;
        }
        lines.push(line.trim_end());
    }

    lines.join("\n").trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_markdown_block() {
        assert_eq!(clean_model_text("```markdown\nHello\nWorld\n```"), "Hello\nWorld");
    }

    #[test]
    fn test_longest_fence_wins() {
        let input = "```\nshort\n```\nnoise\n```markdown\nthe real\nanswer here\n```";
        assert_eq!(clean_model_text(input), "the real\nanswer here");
    }

    #[test]
    fn test_preface_line_dropped() {
        assert_eq!(
            clean_model_text("Here is the extracted text:\nINVOICE #42"),
            "INVOICE #42"
        );
    }

    #[test]
    fn test_format_label_lines_dropped() {
        assert_eq!(clean_model_text("markdown\nTotal: $5\nJSON"), "Total: $5");
    }

    #[test]
    fn test_blank_lines_preserved() {
        assert_eq!(clean_model_text("Para one\n\nPara two"), "Para one\n\nPara two");
    }

    #[test]
    fn test_preface_only_matches_first_line() {
        // "Result" further down is content, not a preface.
        assert_eq!(clean_model_text("Title\nResult"), "Title\nResult");
    }

    #[test]
    fn test_stray_fences_stripped() {
        assert_eq!(clean_model_text("```markdown\nHello"), "Hello");
    }
}

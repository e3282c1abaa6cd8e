//! Normalizing heterogeneous engine output into one Markdown representation.
//!
//! Every engine produces something different: word boxes, free text with LLM
//! artifacts, or HTML-ish markup. This module is the single entry point that
//! turns all of it into one canonical text blob per result.

use std::sync::LazyLock;

use regex::Regex;

pub mod cleanup;
pub mod table;
pub mod token;

pub use cleanup::clean_model_text;
pub use table::{TableOpts, tokens_to_markdown_table};
pub use token::Token;

static BOLD_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*b\s*>").expect("failed to compile regex"));
static BOLD_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*/\s*b\s*>").expect("failed to compile regex"));
static OTHER_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[^>]+>").expect("failed to compile regex"));
static EXCESS_BLANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("failed to compile regex"));

/// Convert simple HTML markup to Markdown.
///
/// `<b>`/`</b>` become `**`; every other tag is stripped with its content
/// preserved; runs of blank lines collapse to exactly one.
pub fn html_to_markdown(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = BOLD_OPEN_RE.replace_all(text, "**");
    let text = BOLD_CLOSE_RE.replace_all(&text, "**");
    let text = OTHER_TAG_RE.replace_all(&text, "");
    EXCESS_BLANK_RE.replace_all(&text, "\n\n").trim().to_owned()
}

/// Produce the canonical Markdown form of an engine result.
///
/// With spatial tokens and an accepted table reconstruction, the output is
/// the cleaned free text followed by the rendered table after a blank line.
/// The free text is deliberately not deduplicated against the table. Without
/// tokens, or when reconstruction rejects the layout, we fall back to
/// HTML-to-Markdown cleanup of the text alone.
pub fn normalize_to_markdown(
    text: &str,
    tokens: Option<&[Token]>,
    opts: &TableOpts,
) -> String {
    if let Some(tokens) = tokens {
        if let Some(table) = tokens_to_markdown_table(tokens, opts) {
            let cleaned = html_to_markdown(text);
            if cleaned.is_empty() {
                return table;
            }
            return format!("{}\n\n{}", cleaned, table);
        }
    }
    html_to_markdown(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_tags_become_markdown() {
        assert_eq!(
            normalize_to_markdown("<b>Ship To:</b> Acme", None, &TableOpts::default()),
            "**Ship To:** Acme"
        );
    }

    #[test]
    fn test_other_tags_stripped_content_kept() {
        assert_eq!(html_to_markdown("<div><i>Total</i>: 5</div>"), "Total: 5");
    }

    #[test]
    fn test_excess_blank_lines_collapse() {
        assert_eq!(html_to_markdown("a\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_table_appended_after_blank_line() {
        let tokens = vec![
            Token::new("Name", 0.0, 0.0, 40.0, 10.0).unwrap(),
            Token::new("Qty", 100.0, 0.0, 130.0, 10.0).unwrap(),
            Token::new("Pen", 0.0, 20.0, 40.0, 30.0).unwrap(),
            Token::new("3", 100.0, 20.0, 130.0, 30.0).unwrap(),
        ];
        let out = normalize_to_markdown(
            "Name Qty Pen 3",
            Some(&tokens),
            &TableOpts::default(),
        );
        assert_eq!(
            out,
            "Name Qty Pen 3\n\n| Name | Qty |\n| --- | --- |\n| Pen | 3 |"
        );
    }

    #[test]
    fn test_rejected_table_falls_back_to_text() {
        let tokens = vec![Token::new("only", 0.0, 0.0, 10.0, 10.0).unwrap()];
        assert_eq!(
            normalize_to_markdown("only", Some(&tokens), &TableOpts::default()),
            "only"
        );
    }
}

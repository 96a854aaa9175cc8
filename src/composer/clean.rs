// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strips Markdown emphasis and list markers from model output.

use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid bold regex"));
static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[\*\-\u{2022}]\s*").expect("valid bullet regex"));
static NUMBERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\d+[\.\)]\s*").expect("valid numbering regex"));

/// Removes `**bold**` markers, leading `*`/`-`/`•` bullets and `N.`/`N)`
/// numbering from every line, then trims the result.
///
/// Bold markers do not span lines.
pub fn clean_response(text: &str) -> String {
    let text = BOLD.replace_all(text, "$1");
    let text = BULLET.replace_all(&text, "");
    let text = NUMBERING.replace_all(&text, "");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bold_bullets_and_numbering() {
        assert_eq!(
            clean_response("**Important**\n- point one\n1. point two"),
            "Important\npoint one\npoint two"
        );
    }

    #[test]
    fn handles_other_markers() {
        assert_eq!(
            clean_response("  * first\n\u{2022} second\n2) third\n10. tenth"),
            "first\nsecond\nthird\ntenth"
        );
    }

    #[test]
    fn keeps_plain_text_and_inline_numbers() {
        assert_eq!(
            clean_response("  The office opens at 8.30 and closes at 17.00.  "),
            "The office opens at 8.30 and closes at 17.00."
        );
        assert_eq!(clean_response(""), "");
    }

    #[test]
    fn bold_inside_a_line() {
        assert_eq!(
            clean_response("Bring your **student card** to the desk"),
            "Bring your student card to the desk"
        );
    }
}

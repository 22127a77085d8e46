//! Extraction of code actions from raw model text.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::protocol::FINAL_ANSWER;

/// `<code>...</code>`, tolerating a missing close tag left by a stop sequence.
static CODE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<code>(.*?)(?:</code>|$)").unwrap());

/// Fenced markdown block, optionally tagged as python.
static FENCED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:python|py)?\n?(.*?)(?:```|$)").unwrap());

/// Return the first non-empty code block, trying `<code>` tags before fences.
pub fn extract_code_block(text: &str) -> Option<String> {
    [&*CODE_TAG_RE, &*FENCED_RE].into_iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|code| !code.is_empty())
            .map(str::to_string)
    })
}

/// Whether the code invokes the final-answer primitive.
pub fn invokes_final_answer(code: &str) -> bool {
    code.contains(&format!("{FINAL_ANSWER}("))
}

use std::collections::HashMap;

use crate::placeholder::TokenMatcher;

/// Markdown preview of the template text: filled tokens become `**value**`, unfilled ones
/// `_token_`. Pure and repeatable; nothing is written back anywhere.
pub fn render_preview(
    full_text: &str,
    values: &HashMap<String, String>,
    placeholders: &[String],
) -> String {
    let tokens = placeholders
        .iter()
        .map(String::as_str)
        .chain(values.keys().map(String::as_str));
    let Some(matcher) = TokenMatcher::new(tokens) else {
        return full_text.to_string();
    };
    matcher.replace_all(full_text, |tok| match values.get(tok) {
        Some(v) => format!("**{v}**"),
        None => format!("_{tok}_"),
    })
}

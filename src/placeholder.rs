//! Placeholder discovery over the visible text of a template document.
//!
//! Placeholders are opaque strings: identity is exact string equality and nothing looks
//! inside the delimiters.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::docx::layout::DocumentLayout;
use crate::docx::package::DocxPackage;
use crate::docx::xml::XmlPart;
use crate::error::ScanError;

/// `{x}` / `{{x}}`, `[x]`, `<x>`, `%x%`, `__x__` and bare `$identifier`, all non-greedy.
pub static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{{1,2}.*?\}{1,2}|\[.*?\]|<.*?>|%.*?%|__.*?__|\$[a-zA-Z0-9_]+")
        .expect("placeholder regex")
});

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Paragraph texts joined with `\n`, body first then table cells.
    pub full_text: String,
    /// Distinct tokens in order of first appearance.
    pub placeholders: Vec<String>,
    /// First paragraph (or cell paragraph) each token was seen in.
    pub contexts: HashMap<String, String>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.placeholders.is_empty()
    }

    pub fn context_of(&self, placeholder: &str) -> &str {
        self.contexts.get(placeholder).map(String::as_str).unwrap_or("")
    }
}

/// Scans a `.docx` payload. Zero placeholders is a normal result, not an error.
pub fn scan(document: &[u8]) -> Result<ScanResult, ScanError> {
    let pkg = DocxPackage::from_bytes(document).map_err(ScanError::Unreadable)?;
    let main = pkg
        .main_document()
        .map_err(|_| ScanError::MissingMainPart)?;
    let part = XmlPart::parse(&main.name, &main.data).map_err(ScanError::Unreadable)?;
    let layout = DocumentLayout::from_part(&part);
    Ok(scan_paragraphs(
        layout.paragraphs.iter().map(|p| p.text()),
    ))
}

/// Token extraction over already-flattened paragraph texts. Each paragraph is matched on its
/// own so a token is attributed to the paragraph it appears in.
pub fn scan_paragraphs<I>(paragraphs: I) -> ScanResult
where
    I: IntoIterator<Item = String>,
{
    let mut texts: Vec<String> = Vec::new();
    let mut placeholders: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut contexts: HashMap<String, String> = HashMap::new();

    for text in paragraphs {
        for m in PLACEHOLDER_RE.find_iter(&text) {
            let token = m.as_str();
            if seen.insert(token.to_string()) {
                placeholders.push(token.to_string());
                contexts.insert(token.to_string(), text.clone());
            }
        }
        texts.push(text);
    }

    ScanResult {
        full_text: texts.join("\n"),
        placeholders,
        contexts,
    }
}

/// Single-pass replacer for a fixed set of tokens. Longer tokens win over their own
/// substrings (`{{Name}}` before `{Name}`), and replaced text is never rescanned, so a value
/// that happens to look like another token stays literal.
pub struct TokenMatcher {
    re: Regex,
}

impl TokenMatcher {
    pub fn new<'a, I>(tokens: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut tokens: Vec<&str> = tokens.into_iter().filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            return None;
        }
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        tokens.dedup();
        let pattern = tokens
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        // Escaped literals always compile; a failure here means the alternation was too large.
        Regex::new(&pattern).ok().map(|re| Self { re })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.re.is_match(text)
    }

    pub fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.re.find_iter(text).map(|m| m.as_str()).collect()
    }

    pub fn replace_all<F>(&self, text: &str, mut render: F) -> String
    where
        F: FnMut(&str) -> String,
    {
        self.re
            .replace_all(text, |caps: &regex::Captures<'_>| render(&caps[0]))
            .into_owned()
    }
}

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::{PromptsSection, ResolvedConfig};

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_SYSTEM: &str = "system.txt";
pub const DEFAULT_FIRST_QUESTION: &str = "first_question.txt";
pub const DEFAULT_NEXT_QUESTION: &str = "next_question.txt";
pub const DEFAULT_ALL_DONE: &str = "all_done.txt";

/// Persona plus the three instruction templates sent as user-role turns.
///
/// Template variables: `{{placeholder}}`, `{{context}}`, and for `next_question` also
/// `{{previous}}` and `{{answer}}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSet {
    pub system: String,
    pub first_question: String,
    pub next_question: String,
    pub all_done: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_TEXT.to_string(),
            first_question: DEFAULT_FIRST_QUESTION_TEXT.to_string(),
            next_question: DEFAULT_NEXT_QUESTION_TEXT.to_string(),
            all_done: DEFAULT_ALL_DONE_TEXT.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in prompts, with any file configured under `[prompts]` taking precedence.
    pub fn load(cfg: &ResolvedConfig) -> anyhow::Result<Self> {
        let dir = cfg.config_dir();
        let p: &PromptsSection = &cfg.app.prompts;
        let defaults = Self::default();
        Ok(Self {
            system: read_prompt(dir, "system", p.system.as_deref())?.unwrap_or(defaults.system),
            first_question: read_prompt(dir, "first_question", p.first_question.as_deref())?
                .unwrap_or(defaults.first_question),
            next_question: read_prompt(dir, "next_question", p.next_question.as_deref())?
                .unwrap_or(defaults.next_question),
            all_done: read_prompt(dir, "all_done", p.all_done.as_deref())?
                .unwrap_or(defaults.all_done),
        })
    }

    pub fn first_instruction(&self, placeholder: &str, context: &str) -> String {
        render_template(
            &self.first_question,
            &[("placeholder", placeholder), ("context", context)],
        )
    }

    pub fn next_instruction(
        &self,
        previous: &str,
        answer: &str,
        placeholder: &str,
        context: &str,
    ) -> String {
        render_template(
            &self.next_question,
            &[
                ("previous", previous),
                ("answer", answer),
                ("placeholder", placeholder),
                ("context", context),
            ],
        )
    }

    pub fn done_instruction(&self, previous: &str, answer: &str) -> String {
        render_template(&self.all_done, &[("previous", previous), ("answer", answer)])
    }
}

fn read_prompt(config_dir: &Path, key: &str, configured: Option<&str>) -> anyhow::Result<Option<String>> {
    let Some(rel) = configured.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let mut p = PathBuf::from(rel);
    if p.is_relative() {
        p = config_dir.join(&p);
    }
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found for {key}: {} (run: docfill --init-config)",
            p.display()
        ));
    }
    let text = std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))?;
    Ok(Some(text))
}

/// Single pass over the template, so substituted values are never expanded again.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, v)) => out.push_str(v),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_SYSTEM, DEFAULT_SYSTEM_TEXT),
        (DEFAULT_FIRST_QUESTION, DEFAULT_FIRST_QUESTION_TEXT),
        (DEFAULT_NEXT_QUESTION, DEFAULT_NEXT_QUESTION_TEXT),
        (DEFAULT_ALL_DONE, DEFAULT_ALL_DONE_TEXT),
    ]
}

pub const DEFAULT_SYSTEM_TEXT: &str = r#"You are a friendly legal assistant helping a user fill in a document template.
I will send you one placeholder at a time (for example '{ClientName}' or '[DocumentDate]') together with the paragraph of the document it appears in.
Your job is to ask the user for the value of that placeholder.

Rules:
1. Use the context. Do not ask "What is {ClientName}?". If the context is "This agreement is between {ClientName} and ACME Corp", ask who the other party to the agreement with ACME Corp is.
2. Be conversational and natural.
3. Ask for exactly ONE piece of information per message.
4. After the question, add a new line with a short italicized example answer, e.g. *Jane Doe*.
5. Keep questions short and clear.
6. When I tell you an answer was saved, confirm it briefly ("Got it.", "Perfect.") and then ask the next question.
"#;

pub const DEFAULT_FIRST_QUESTION_TEXT: &str = r#"Hello! Let's start filling this document. The first placeholder is '{{placeholder}}'. The context is: "{{context}}". Please ask me the first question."#;

pub const DEFAULT_NEXT_QUESTION_TEXT: &str = r#"I answered "{{answer}}" for '{{previous}}' and it has been saved. The next placeholder is '{{placeholder}}'. The context is: "{{context}}". Please ask me the question for this one."#;

pub const DEFAULT_ALL_DONE_TEXT: &str = r#"I answered "{{answer}}" for '{{previous}}' and it has been saved. That was the last placeholder! Please give me a brief, friendly message saying I'm all done and can review and download the completed document."#;

use crate::chat::{ChatBackend, ChatMessage};
use crate::dialogue::{Conversation, DialogueDriver, PromptSet, Transcript};
use crate::docx::render::materialize as render_document;
use crate::error::SessionError;
use crate::fill::{FillPhase, FillState};
use crate::placeholder::{scan, ScanResult};
use crate::preview::render_preview;
use crate::progress::ConsoleProgress;

pub const MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BeginOutcome {
    Started {
        placeholder_count: usize,
        first_question: String,
    },
    NoPlaceholders,
}

/// A materialized document with download metadata. `is_final` is false while placeholders
/// remain unfilled.
#[derive(Clone, Debug)]
pub struct CompletedDocument {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: &'static str,
    pub is_final: bool,
    pub substitutions: usize,
    pub split_tokens: Vec<String>,
}

struct LoadedDocument {
    name: String,
    bytes: Vec<u8>,
    scan: ScanResult,
}

/// One document being filled by one user.
pub struct Session<B> {
    document: Option<LoadedDocument>,
    fill: FillState,
    driver: DialogueDriver<B>,
    conversation: Conversation,
    progress: ConsoleProgress,
}

impl<B: ChatBackend> Session<B> {
    pub fn new(backend: B, prompts: PromptSet, progress: ConsoleProgress) -> Self {
        Self {
            document: None,
            fill: FillState::new(),
            driver: DialogueDriver::new(backend, prompts),
            conversation: Conversation::default(),
            progress,
        }
    }

    /// Replaces whatever was loaded before, scans `document` and asks the first question.
    ///
    /// If the first question cannot be obtained the document stays loaded and the error is
    /// returned. Answers are refused with `NotStarted` until `restart` gets a first question.
    pub fn begin_session(
        &mut self,
        original_name: &str,
        document: Vec<u8>,
    ) -> Result<BeginOutcome, SessionError> {
        self.document = None;
        self.fill.clear();
        self.driver.reset();
        self.conversation.clear();

        let scan = scan(&document)?;
        if scan.is_empty() {
            self.progress
                .info(format!("{original_name}: no placeholders found"));
            return Ok(BeginOutcome::NoPlaceholders);
        }
        self.progress.info(format!(
            "{original_name}: {} placeholder(s): {}",
            scan.placeholders.len(),
            scan.placeholders.join(", ")
        ));

        let placeholder_count = scan.placeholders.len();
        self.fill.initialize(scan.placeholders.clone());
        self.document = Some(LoadedDocument {
            name: original_name.to_string(),
            bytes: document,
            scan,
        });
        let first_question = self.kick_off()?;
        Ok(BeginOutcome::Started {
            placeholder_count,
            first_question,
        })
    }

    /// Records `text` as the answer to the current question and returns the next reply.
    ///
    /// On a collaborator failure the answer is not counted; resubmitting it retries the turn.
    pub fn submit_answer(&mut self, text: &str) -> Result<String, SessionError> {
        let doc = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        if self.fill.phase() == FillPhase::Complete {
            return Err(SessionError::AlreadyComplete);
        }
        if self.driver.transcript().last_reply().is_none() {
            return Err(SessionError::NotStarted);
        }
        let placeholder = self.fill.current_placeholder()?.to_string();
        self.conversation.push_user(text);

        match self.driver.answer(&mut self.fill, &doc.scan, text) {
            Ok(reply) => {
                let (filled, total) = self.fill.progress();
                self.progress.progress(&placeholder, filled, total);
                match self.fill.current_placeholder() {
                    Ok(next) => self.progress.info(format!("asked for {next}")),
                    Err(_) => self.progress.info("all placeholders filled"),
                }
                self.conversation.push_assistant(reply.clone());
                Ok(reply)
            }
            Err(e) => {
                self.progress
                    .warn(format!("rolled back {placeholder} after failed turn: {e}"));
                Err(e.into())
            }
        }
    }

    /// Overwrites an already-filled value. Progress and the current question are unchanged.
    pub fn edit_value(&mut self, placeholder: &str, value: &str) -> Result<(), SessionError> {
        if self.document.is_none() {
            return Err(SessionError::NoDocument);
        }
        self.fill.edit(placeholder, value)?;
        self.progress.info(format!("edited {placeholder}"));
        Ok(())
    }

    /// Clears collected values and the conversation, then asks the first question again.
    pub fn restart(&mut self) -> Result<String, SessionError> {
        let placeholders = self
            .document
            .as_ref()
            .ok_or(SessionError::NoDocument)?
            .scan
            .placeholders
            .clone();
        self.fill.initialize(placeholders);
        self.driver.reset();
        self.conversation.clear();
        self.progress.info("restarting from the first placeholder");
        self.kick_off()
    }

    fn kick_off(&mut self) -> Result<String, SessionError> {
        let doc = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        match self.driver.start(&self.fill, &doc.scan) {
            Ok(reply) => {
                if let Ok(first) = self.fill.current_placeholder() {
                    self.progress.info(format!("asked for {first}"));
                }
                self.conversation.push_assistant(reply.clone());
                Ok(reply)
            }
            Err(e) => {
                self.progress
                    .warn(format!("could not get the first question: {e}"));
                Err(e.into())
            }
        }
    }

    /// Substitutes the values collected so far. Allowed at any point; only a document
    /// produced after the last answer is marked final.
    pub fn materialize(&self) -> Result<CompletedDocument, SessionError> {
        let doc = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        let out = render_document(&doc.bytes, self.fill.values())?;
        let is_final = self.is_ready_to_download();
        self.progress.info(format!(
            "materialized {} substitution(s){}",
            out.substitutions,
            if is_final { "" } else { " (partial)" }
        ));
        if !out.split_tokens.is_empty() {
            self.progress.warn(format!(
                "left in place, split by formatting: {}",
                out.split_tokens.join(", ")
            ));
        }
        Ok(CompletedDocument {
            bytes: out.bytes,
            file_name: output_file_name(&doc.name),
            mime_type: MIME_TYPE,
            is_final,
            substitutions: out.substitutions,
            split_tokens: out.split_tokens,
        })
    }

    /// Markdown rendering of the template text with the current values.
    pub fn preview(&self) -> Option<String> {
        let doc = self.document.as_ref()?;
        Some(render_preview(
            &doc.scan.full_text,
            self.fill.values(),
            &doc.scan.placeholders,
        ))
    }

    pub fn progress(&self) -> (usize, usize) {
        self.fill.progress()
    }

    /// Filled fraction in `0.0..=1.0`; zero when nothing is loaded.
    pub fn progress_ratio(&self) -> f64 {
        match self.fill.progress() {
            (_, 0) => 0.0,
            (filled, total) => filled as f64 / total as f64,
        }
    }

    pub fn is_ready_to_download(&self) -> bool {
        self.document.is_some() && self.fill.is_complete()
    }

    pub fn current_placeholder(&self) -> Option<&str> {
        self.fill.current_placeholder().ok()
    }

    pub fn placeholders(&self) -> &[String] {
        self.fill.placeholders()
    }

    pub fn context_of(&self, placeholder: &str) -> Option<&str> {
        self.document
            .as_ref()
            .map(|d| d.scan.context_of(placeholder))
    }

    pub fn filled_entries(&self) -> Vec<(&str, &str)> {
        self.fill.filled_entries()
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        self.conversation.entries()
    }

    pub fn transcript(&self) -> &Transcript {
        self.driver.transcript()
    }

    pub fn document_name(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.name.as_str())
    }

}

/// `completed_<name>`, using only the final path component of `original_name`.
pub fn output_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("document.docx");
    format!("completed_{base}")
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::{output_file_name, BeginOutcome, Session, MIME_TYPE};
    use crate::chat::{ChatBackend, ChatMessage, Role};
    use crate::dialogue::PromptSet;
    use crate::docx::testutil::{build_docx, paragraph};
    use crate::error::{ChatError, FillError, ScanError, SessionError};
    use crate::placeholder::scan;
    use crate::progress::ConsoleProgress;

    struct Scripted(RefCell<VecDeque<Result<String, ChatError>>>);

    impl Scripted {
        fn replies(items: &[&str]) -> Self {
            Self(RefCell::new(items.iter().map(|s| Ok(s.to_string())).collect()))
        }

        fn with(items: Vec<Result<&str, ChatError>>) -> Self {
            Self(RefCell::new(items.into_iter().map(|r| r.map(String::from)).collect()))
        }
    }

    impl ChatBackend for Scripted {
        fn complete(&self, _transcript: &[ChatMessage]) -> Result<String, ChatError> {
            self.0
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok("next?".to_string()))
        }
    }

    fn session(backend: Scripted) -> Session<Scripted> {
        Session::new(backend, PromptSet::default(), ConsoleProgress::new(false))
    }

    fn two_slot_doc() -> Vec<u8> {
        build_docx(&format!(
            "{}{}",
            paragraph(&["This agreement is between {Client} and ACME."]),
            paragraph(&["Signed on [Date]."]),
        ))
    }

    #[test]
    fn full_flow_produces_final_document() {
        let mut s = session(Scripted::replies(&["Who is the client?", "When?", "All done!"]));
        let outcome = s.begin_session("nda.docx", two_slot_doc()).expect("begin");
        assert_eq!(
            outcome,
            BeginOutcome::Started {
                placeholder_count: 2,
                first_question: "Who is the client?".into()
            }
        );
        assert_eq!(s.current_placeholder(), Some("{Client}"));
        assert!(!s.is_ready_to_download());

        assert_eq!(s.submit_answer("Globex").expect("a1"), "When?");
        assert_eq!(s.progress(), (1, 2));
        assert!((s.progress_ratio() - 0.5).abs() < f64::EPSILON);
        assert_eq!(s.submit_answer("1 May 2025").expect("a2"), "All done!");
        assert!(s.is_ready_to_download());

        let out = s.materialize().expect("materialize");
        assert!(out.is_final);
        assert_eq!(out.file_name, "completed_nda.docx");
        assert_eq!(out.mime_type, MIME_TYPE);
        assert_eq!(out.substitutions, 2);
        let rescan = scan(&out.bytes).expect("rescan");
        assert!(rescan.placeholders.is_empty());
        assert!(rescan.full_text.contains("between Globex and ACME"));

        assert!(matches!(
            s.submit_answer("more"),
            Err(SessionError::AlreadyComplete)
        ));
    }

    #[test]
    fn no_placeholders_is_not_an_error() {
        let mut s = session(Scripted::replies(&[]));
        let doc = build_docx(&paragraph(&["Nothing to fill."]));
        assert_eq!(
            s.begin_session("plain.docx", doc).expect("begin"),
            BeginOutcome::NoPlaceholders
        );
        assert!(matches!(s.submit_answer("x"), Err(SessionError::NoDocument)));
        assert_eq!(s.progress(), (0, 0));
        assert!(s.preview().is_none());
    }

    #[test]
    fn unreadable_upload_clears_previous_session() {
        let mut s = session(Scripted::replies(&["q1"]));
        s.begin_session("a.docx", two_slot_doc()).expect("begin");
        let err = s.begin_session("b.docx", b"not a zip".to_vec()).expect_err("scan");
        assert!(matches!(err, SessionError::Scan(ScanError::Unreadable(_))));
        assert!(s.document_name().is_none());
        assert_eq!(s.progress(), (0, 0));
        assert!(s.conversation().is_empty());
    }

    #[test]
    fn failed_turn_keeps_user_message_but_not_value() {
        let mut s = session(Scripted::with(vec![
            Ok("Who is the client?"),
            Err(ChatError::Transport("connection reset".into())),
            Ok("When?"),
        ]));
        s.begin_session("nda.docx", two_slot_doc()).expect("begin");

        let err = s.submit_answer("Globex").expect_err("fails");
        assert!(err.is_retryable());
        assert_eq!(s.progress(), (0, 2));
        assert_eq!(s.current_placeholder(), Some("{Client}"));
        let last = s.conversation().last().expect("entry");
        assert_eq!((last.role, last.content.as_str()), (Role::User, "Globex"));
        assert_eq!(s.transcript().messages().len(), 3);

        assert_eq!(s.submit_answer("Globex").expect("retry"), "When?");
        assert_eq!(s.progress(), (1, 2));
    }

    #[test]
    fn kick_off_failure_keeps_document_for_restart() {
        let mut s = session(Scripted::with(vec![
            Err(ChatError::Timeout { secs: 60 }),
            Ok("Who is the client?"),
        ]));
        let err = s.begin_session("nda.docx", two_slot_doc()).expect_err("kick-off");
        assert!(err.is_retryable());
        assert_eq!(s.document_name(), Some("nda.docx"));
        assert_eq!(s.transcript().messages().len(), 1);
        assert!(matches!(s.submit_answer("Globex"), Err(SessionError::NotStarted)));
        assert_eq!(s.progress(), (0, 2));

        assert_eq!(s.restart().expect("restart"), "Who is the client?");
        assert_eq!(s.conversation().len(), 1);
    }

    #[test]
    fn edit_and_partial_materialize() {
        let mut s = session(Scripted::replies(&["q1", "q2"]));
        s.begin_session("nda.docx", two_slot_doc()).expect("begin");
        s.submit_answer("Globex").expect("a1");

        assert!(matches!(
            s.edit_value("[Date]", "today"),
            Err(SessionError::Fill(FillError::EditOutOfRange(_)))
        ));
        s.edit_value("{Client}", "Initech").expect("edit");
        assert_eq!(s.progress(), (1, 2));
        assert_eq!(s.current_placeholder(), Some("[Date]"));
        assert_eq!(s.filled_entries(), vec![("{Client}", "Initech")]);

        let preview = s.preview().expect("preview");
        assert!(preview.contains("**Initech**"));
        assert!(preview.contains("_[Date]_"));

        let out = s.materialize().expect("partial");
        assert!(!out.is_final);
        let rescan = scan(&out.bytes).expect("rescan");
        assert_eq!(rescan.placeholders, vec!["[Date]".to_string()]);
    }

    #[test]
    fn restart_clears_values_and_conversation() {
        let mut s = session(Scripted::replies(&["q1", "q2", "q1 again"]));
        s.begin_session("nda.docx", two_slot_doc()).expect("begin");
        s.submit_answer("Globex").expect("a1");
        assert_eq!(s.restart().expect("restart"), "q1 again");
        assert_eq!(s.progress(), (0, 2));
        assert_eq!(s.current_placeholder(), Some("{Client}"));
        assert_eq!(s.conversation().len(), 1);
        assert_eq!(s.transcript().messages().len(), 3);
    }

    #[test]
    fn operations_without_document_are_rejected() {
        let mut s = session(Scripted::replies(&[]));
        assert!(matches!(s.restart(), Err(SessionError::NoDocument)));
        assert!(matches!(s.materialize(), Err(SessionError::NoDocument)));
        assert!(matches!(s.edit_value("{A}", "x"), Err(SessionError::NoDocument)));
        assert!(!s.is_ready_to_download());
        assert_eq!(s.progress_ratio(), 0.0);
    }

    #[test]
    fn output_name_uses_base_name() {
        assert_eq!(output_file_name("dir/sub/lease.docx"), "completed_lease.docx");
        assert_eq!(output_file_name(r"C:\docs\nda.docx"), "completed_nda.docx");
        assert_eq!(output_file_name(""), "completed_document.docx");
    }
}

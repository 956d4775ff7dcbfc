use crate::chat::{ChatBackend, ChatMessage};
use crate::error::{ChatError, DriverError};
use crate::fill::FillState;
use crate::placeholder::ScanResult;

use super::prompts::PromptSet;
use super::transcript::Transcript;

/// Turns fill-state transitions into chat instructions and returns the assistant's replies.
///
/// Each exchange is all-or-nothing: on a collaborator failure the transcript is cut back to
/// where it was, and during `answer` the recorded value is rolled back as well.
pub struct DialogueDriver<B> {
    backend: B,
    prompts: PromptSet,
    transcript: Transcript,
}

impl<B: ChatBackend> DialogueDriver<B> {
    pub fn new(backend: B, prompts: PromptSet) -> Self {
        let transcript = Transcript::new(prompts.system.clone());
        Self {
            backend,
            prompts,
            transcript,
        }
    }

    /// Clears the transcript and asks for the first placeholder.
    pub fn start(&mut self, fill: &FillState, scan: &ScanResult) -> Result<String, DriverError> {
        self.transcript.reset();
        let placeholder = fill.current_placeholder()?;
        let instruction = self
            .prompts
            .first_instruction(placeholder, scan.context_of(placeholder));
        Ok(self.exchange(instruction)?)
    }

    /// Records `answer` for the current placeholder, then asks for the next one (or for the
    /// closing message once the last slot is filled).
    pub fn answer(
        &mut self,
        fill: &mut FillState,
        scan: &ScanResult,
        answer: &str,
    ) -> Result<String, DriverError> {
        let previous = fill.record_answer(answer)?.to_string();
        let instruction = match fill.current_placeholder() {
            Ok(next) => self
                .prompts
                .next_instruction(&previous, answer, next, scan.context_of(next)),
            Err(_) => self.prompts.done_instruction(&previous, answer),
        };
        match self.exchange(instruction) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                fill.rollback()?;
                Err(e.into())
            }
        }
    }

    fn exchange(&mut self, instruction: String) -> Result<String, ChatError> {
        let mark = self.transcript.mark();
        self.transcript.push(ChatMessage::user(instruction));
        match self.backend.complete(self.transcript.messages()) {
            Ok(reply) => {
                self.transcript.push(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.transcript.truncate(mark);
                Err(e)
            }
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn reset(&mut self) {
        self.transcript.reset();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

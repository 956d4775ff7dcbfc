//! Conversational filling of `.docx` templates.
//!
//! A template is scanned for placeholder tokens, a chat collaborator asks the user for
//! one value at a time, and the collected values are substituted back into the document
//! with its formatting intact.

pub mod chat;
pub mod config;
pub mod dialogue;
pub mod docx;
pub mod error;
pub mod fill;
pub mod placeholder;
pub mod preview;
pub mod progress;
pub mod session;

pub use error::{ChatError, DriverError, FillError, RenderError, ScanError, SessionError};
pub use session::{BeginOutcome, CompletedDocument, Session};

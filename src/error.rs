use thiserror::Error;

/// The template could not be read. Fatal for the session being started.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("document is not a readable .docx: {0:#}")]
    Unreadable(anyhow::Error),
    #[error("document has no main body part (word/document.xml)")]
    MissingMainPart,
}

/// The completed document could not be produced. Collected values are untouched.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template is not a readable .docx: {0:#}")]
    Unreadable(anyhow::Error),
    #[error("template has no main body part (word/document.xml)")]
    MissingMainPart,
    #[error("substitution altered non-text markup in {part}")]
    StructureChanged { part: String },
    #[error("failed to write completed document: {0:#}")]
    Write(anyhow::Error),
}

/// Failure of the external chat collaborator. Always a single error, never a partial reply.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Transport(String),
    #[error("chat request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("chat endpoint returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed chat response: {0}")]
    MalformedResponse(String),
    #[error("chat client misconfigured: {0}")]
    Config(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FillError {
    #[error("no placeholder is awaiting an answer")]
    NotCollecting,
    #[error("no recorded answer to roll back")]
    NothingToRollback,
    #[error("placeholder {0} has not been filled yet")]
    EditOutOfRange(String),
}

/// One dialogue turn failed. Fill state has already been rolled back when this is returned.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Fill(#[from] FillError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no document loaded")]
    NoDocument,
    #[error("all placeholders are already filled")]
    AlreadyComplete,
    #[error("no question has been asked yet; restart the session")]
    NotStarted,
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Fill(#[from] FillError),
}

impl SessionError {
    /// True when resubmitting the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Driver(DriverError::Chat(_)))
    }
}

pub mod driver;
pub mod prompts;
pub mod transcript;

pub use driver::DialogueDriver;
pub use prompts::PromptSet;
pub use transcript::{Conversation, Transcript};

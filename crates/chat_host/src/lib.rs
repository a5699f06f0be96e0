//! Conversation runtime: prompt assembly, backend dispatch and the session
//! state machine the UI drives.

pub mod dispatcher;
pub mod prompts;
pub mod session;

pub use dispatcher::Dispatcher;
pub use session::{Notice, NoticeLevel, Phase, Session, Speaker, TranscriptEntry};

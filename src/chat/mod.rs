//! The energy assistant's conversation model and turn protocol.

pub mod orchestrator;
pub mod transcript;

pub use orchestrator::{ChatOrchestrator, ChatState, Phase, ToolExchange, TurnObserver, TurnOutcome, TurnReport};
pub use transcript::{DisplayRole, Entry, Transcript};

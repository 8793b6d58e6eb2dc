// Daybook Core Library
// Streaming generation sessions and daily-activity extraction

pub mod engine;
pub mod error;
pub mod extract;
pub mod prompt;
pub mod session;
pub mod stop;
pub mod store;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use engine::{EngineHandle, GenerationEngine};
pub use error::{EngineError, SessionError};
pub use extract::{ActivityExtractor, RawExtraction};
pub use prompt::{build_prompt, STOP_MARKER};
pub use session::{Session, SessionOutcome};
pub use stop::{EosStop, StopPredicate};
pub use store::ActivityStore;
pub use stream::{spawn_worker, GenerationWorker, StreamAssembler};
pub use types::{ActivityRecord, ConversationTurn, GenerationParams, Mood};

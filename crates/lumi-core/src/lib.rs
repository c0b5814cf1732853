//! Lumi core library.
//! Prompt assembly, the RAG chat relay, foundation-model journal analysis,
//! and the sled-backed journal / habit / emotion stores behind the gateway.

pub mod analysis;
pub mod chat;
pub mod config;
pub mod generation;
pub mod habits;
pub mod journal;
pub mod memory;
pub mod prompts;
pub mod relay;
pub mod store;

pub use analysis::{
    error_sentinel, extract_analysis, AnalysisError, ChatbotContextItem, JournalAnalysis,
    JournalEntryResponse,
};
pub use chat::{ChatMessage, ChatResponse, LumiChat};
pub use config::LumiConfig;
pub use generation::{GenerationError, TextGenerator, WatsonxGenerator};
pub use habits::HabitRecord;
pub use journal::JournalAnalyzer;
pub use memory::ChatMemory;
pub use relay::{HttpRagRelay, RagRelay, RelayError};
pub use store::{is_valid_user_id, CueSchedule, EmotionLog, LumiStore, StoreError, StoredJournalEntry};

/// User id applied when a request does not name one.
pub const DEMO_USER_ID: &str = "demo_user";

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod llm;
pub mod prompt;
pub mod parser;
pub mod degraded;
pub mod identity;
pub mod conversation;

pub use llm::build_gateway;
pub use conversation::ConversationSynth;

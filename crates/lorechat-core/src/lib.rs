pub mod ai;
pub mod chat;
pub mod config;
pub mod markup;
pub mod prompt;
pub mod secrets;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use ai::{ChatProvider, ClaudeClient, CompletionRequest, CompletionSettings, ContentBlock};
pub use chat::{ChatError, ChatSession, Notice, NoticeKind, Phase, ReplyOutcome};
pub use config::{Config, DataPaths};
pub use markup::{render_message, split_segments, MessageBody, Segment};
pub use secrets::{resolve_api_key, SecretSources};
pub use state::{ChatMessage, ChatRole, LorebookConfig};

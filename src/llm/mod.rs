//! Text completion providers used by agents
//!
//! - `LlmProvider` trait: `complete(system, messages, max_tokens) -> Option<String>`
//! - `HttpLlmProvider`: OpenAI-compatible `/v1/chat/completions` client
//! - `MockLlmProvider`: scriptable provider for tests and offline runs

pub mod mock;
pub mod provider;
pub mod traits;

pub use mock::{MockLlmProvider, MockReply};
pub use provider::HttpLlmProvider;
pub use traits::{ChatMessage, LlmProvider, Role};

//! LLM provider abstraction, retry/backoff, and lenient JSON extraction.

pub mod compatible;
pub mod error;
pub mod extract;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;
pub mod retry;

pub use compatible::CompatibleProvider;
pub use error::LlmError;
pub use provider::{ChatOptions, LlmProvider, Message, Role, invoke};
pub use retry::RetryPolicy;

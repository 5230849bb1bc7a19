pub mod provider;
pub mod router;
pub mod types;

pub use provider::{LLMProvider, ProviderSet};
pub use router::{ModelRoute, ModelRouter, ModelTier, RouteDecision};
pub use types::{
    CompletionRequest, CompletionResponse, Message, MessageRole, TokenUsage, ToolCall, ToolSpec,
};

pub mod backend;
pub mod claude_cli;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod resilient;
pub mod roles;

pub mod test_support;

pub use backend::{Completion, CompletionRequest, ReasoningBackend, ToolCall, ToolSpec};
pub use claude_cli::ClaudeCliBackend;
pub use error::AgentError;
pub use parser::DebateTurn;
pub use pipeline::DeliberationPipeline;
pub use resilient::{ResilientBackend, RetryPolicy};
pub use roles::{Role, RoleContext, RoleOutput, RolePayload, RoleRunner};

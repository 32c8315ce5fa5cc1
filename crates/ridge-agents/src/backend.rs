use async_trait::async_trait;
use ridge_models::RoleKind;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

pub const HISTORICAL_CONTEXT_TOOL: &str = "historical_context";
pub const SNAPSHOT_INDICATOR_TOOL: &str = "snapshot_indicator";

/// A tool the backend may ask for while reasoning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

/// Tools advertised to every role.
pub fn default_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: HISTORICAL_CONTEXT_TOOL.to_string(),
            description: "Retrieved analyses of similar past setups with realized outcomes"
                .to_string(),
        },
        ToolSpec {
            name: SNAPSHOT_INDICATOR_TOOL.to_string(),
            description: "Look up one named indicator from the current snapshot".to_string(),
        },
    ]
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub role: RoleKind,
    pub system_prompt: String,
    pub user_prompt: String,
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Raw backend output: free text plus any tool invocations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// The language-model capability the pipeline reasons through.
///
/// Latency is nondeterministic and output may be malformed; callers go
/// through [`crate::resilient::ResilientBackend`] rather than calling this directly.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AgentError>;
}

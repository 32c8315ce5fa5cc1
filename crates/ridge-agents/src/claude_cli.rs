use std::time::Duration;

use async_trait::async_trait;
use ridge_models::{DeliberationConfig, RoleKind};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::{Completion, CompletionRequest, ReasoningBackend};
use crate::error::AgentError;
use crate::parser::tool_calls_in;
use crate::prompts::tools_section;

const CLI: &str = "claude";

/// Whether the `claude` binary is on PATH and answers `--version`.
pub async fn cli_available() -> bool {
    Command::new(CLI)
        .arg("--version")
        .output()
        .await
        .is_ok_and(|out| out.status.success())
}

/// Reasoning backend that shells out to the Claude CLI in print mode.
///
/// The CLI has no native tool channel, so advertised tools are appended to the
/// system prompt and requested tools are read back from a `tool_calls` field.
#[derive(Debug, Clone)]
pub struct ClaudeCliBackend {
    model: String,
    synthesis_model: String,
    timeout: Duration,
}

impl ClaudeCliBackend {
    pub fn new(model: &str, synthesis_model: &str, timeout: Duration) -> Self {
        Self {
            model: model.to_string(),
            synthesis_model: synthesis_model.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &DeliberationConfig) -> Self {
        Self::new(
            &config.model,
            &config.synthesis_model,
            Duration::from_millis(config.call_timeout_ms),
        )
    }

    /// Trader and risk judge run on the synthesis model; everyone else on the analyst model.
    pub fn model_for(&self, role: RoleKind) -> &str {
        match role {
            RoleKind::Trader | RoleKind::RiskJudge => &self.synthesis_model,
            _ => &self.model,
        }
    }

    /// One `claude -p` run. The child is killed if the timeout drops the future.
    async fn print(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AgentError> {
        debug!(model, prompt_chars = user_prompt.len(), "Invoking claude CLI");
        let child = Command::new(CLI)
            .arg("-p")
            .arg(user_prompt)
            .args(["--system-prompt", system_prompt])
            .args(["--model", model])
            .args(["--output-format", "text"])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| AgentError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| AgentError::Cli(format!("cannot spawn {CLI}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(model, status = %output.status, stderr = %stderr.trim(), "Claude CLI failed");
            return Err(AgentError::Cli(format!(
                "{CLI} exited {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl ReasoningBackend for ClaudeCliBackend {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AgentError> {
        let system_prompt = if request.tools.is_empty() {
            request.system_prompt.clone()
        } else {
            format!("{}\n\n{}", request.system_prompt, tools_section(&request.tools))
        };
        let text = self
            .print(self.model_for(request.role), &system_prompt, &request.user_prompt)
            .await?;
        let tool_calls = tool_calls_in(&text);
        Ok(Completion { text, tool_calls })
    }
}

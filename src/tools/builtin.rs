//! 内置工具：直接回复与澄清提问

use async_trait::async_trait;

use crate::react::Decision;
use crate::tools::{Tool, ToolOutput};

/// respond：把 action_input 作为回复文本
pub struct RespondTool;

#[async_trait]
impl Tool for RespondTool {
    fn name(&self) -> &str {
        "respond"
    }

    fn description(&self) -> &str {
        "Reply to the user. action_input is the reply text."
    }

    async fn execute(&self, decision: &Decision) -> Result<ToolOutput, String> {
        Ok(ToolOutput::Done(decision.text()))
    }
}

/// ask_clarification：向用户提问，结果为 needs_input
pub struct ClarifyTool;

#[async_trait]
impl Tool for ClarifyTool {
    fn name(&self) -> &str {
        "ask_clarification"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question. action_input is the question."
    }

    async fn execute(&self, decision: &Decision) -> Result<ToolOutput, String> {
        let question = decision.text();
        if question.trim().is_empty() {
            return Ok(ToolOutput::NeedsInput("Could you clarify, Sir?".to_string()));
        }
        Ok(ToolOutput::NeedsInput(question))
    }
}

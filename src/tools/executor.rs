//! 工具执行器
//!
//! 持有 ToolRegistry、全局超时与确认策略；dispatch(decision) 依次做确认门控、按动作名查找、
//! 超时内执行，结果统一转为 ActionOutcome，每次调用输出一行 JSON 审计日志。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::timeout;

use crate::react::{format_action_input, Decision};
use crate::tools::{ToolOutput, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Cancelled,
    NeedsInput,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Cancelled => "cancelled",
            OutcomeStatus::NeedsInput => "needs_input",
        }
    }
}

/// 一次分发的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub status: OutcomeStatus,
    pub error: Option<String>,
    /// 要展示给用户的文本
    pub output: Option<String>,
}

impl ActionOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            status: OutcomeStatus::Success,
            error: None,
            output: (!output.is_empty()).then_some(output),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            error: Some(error.into()),
            output: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: OutcomeStatus::Cancelled,
            error: Some("Action cancelled by user".to_string()),
            output: None,
        }
    }

    pub fn needs_input(question: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::NeedsInput,
            error: None,
            output: Some(question.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// 执行循环依赖的分发接口
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(&self, decision: &Decision) -> ActionOutcome;
}

/// 危险动作执行前的确认（终端实现读 stdin）
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// 固定应答的确认器（测试与非交互环境）
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    require_confirmations: bool,
    confirmer: Option<Arc<dyn Confirm>>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            require_confirmations: false,
            confirmer: None,
        }
    }

    /// 开启确认门控；needs_confirmation 的决策须经 confirmer 同意才执行
    pub fn with_confirmations(mut self, confirmer: Arc<dyn Confirm>) -> Self {
        self.require_confirmations = true;
        self.confirmer = Some(confirmer);
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    async fn confirmed(&self, decision: &Decision) -> bool {
        if !decision.needs_confirmation || !self.require_confirmations {
            return true;
        }
        let prompt = format!(
            "{} {}",
            decision.action,
            format_action_input(&decision.action_input)
        );
        match &self.confirmer {
            Some(confirmer) => confirmer.confirm(&prompt).await,
            None => false,
        }
    }

    async fn run(&self, decision: &Decision) -> (ActionOutcome, &'static str) {
        if !self.confirmed(decision).await {
            tracing::info!(action = %decision.action, "Action cancelled by user");
            return (ActionOutcome::cancelled(), "cancelled");
        }

        let action = decision.action.as_str();
        let Some(tool) = self.registry.get(action) else {
            return (
                ActionOutcome::failed(format!("Unknown action: {}", action)),
                "unknown",
            );
        };

        match timeout(self.timeout, tool.execute(decision)).await {
            Ok(Ok(ToolOutput::Done(text))) => (ActionOutcome::success(text), "ok"),
            Ok(Ok(ToolOutput::NeedsInput(question))) => {
                (ActionOutcome::needs_input(question), "needs_input")
            }
            Ok(Err(e)) => (ActionOutcome::failed(e), "error"),
            Err(_) => (
                ActionOutcome::failed(format!("Tool timeout: {}", action)),
                "timeout",
            ),
        }
    }
}

#[async_trait]
impl ToolDispatcher for ToolExecutor {
    async fn dispatch(&self, decision: &Decision) -> ActionOutcome {
        let start = Instant::now();
        let (outcome, label) = self.run(decision).await;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "action": decision.action.as_str(),
            "ok": outcome.is_success(),
            "outcome": label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&decision.action_input),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        outcome
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = format_action_input(args);
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：步骤失败后根据经验教训决定 RetryWithLessons 或 Abort。

use thiserror::Error;

/// 计划执行的终止错误：死锁或步骤失败
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// 没有可执行的步骤但仍有待执行步骤：依赖成环或依赖不存在的步骤
    #[error("No ready steps. Dependency issue or cyclic plan (pending: {})", .pending.join(", "))]
    Deadlock { pending: Vec<String> },

    #[error("Step {step_id} failed: {reason}")]
    StepFailed { step_id: String, reason: String },
}

impl AgentError {
    /// 面向用户与反思的错误描述：步骤失败只给出原因本身
    pub fn detail(&self) -> String {
        match self {
            AgentError::StepFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// 恢复引擎根据失败情况给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 带着相关经验教训重试一次
    RetryWithLessons,
    /// 终止整个计划
    Abort,
}

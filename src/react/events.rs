//! 执行过程事件：宿主据此打印 STATUS 行或推送给前端

use serde::Serialize;

/// 计划执行中的单个事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// 规划完成
    PlanReady { steps: usize },
    /// 开始执行某步
    StepStarted { step_id: String, description: String },
    /// 模型把 respond 当作思考过程
    Thinking { text: String },
    /// 一次分发的结果
    ActionResult {
        step_id: String,
        action: String,
        status: String,
        error: Option<String>,
    },
    /// 带着经验教训重试
    Retry { step_id: String },
    StepDone { step_id: String },
    StepFailed { step_id: String, error: String },
    PlanComplete,
    /// 计划失败（死锁或步骤失败）
    PlanFailed { error: String },
}

impl ExecutionEvent {
    /// 面向终端的 STATUS 行；不需要展示的事件返回 None
    pub fn status_line(&self) -> Option<String> {
        match self {
            ExecutionEvent::StepStarted {
                step_id,
                description,
            } => Some(format!("STATUS: Step {} - {}", step_id, description)),
            ExecutionEvent::Retry { step_id } => {
                Some(format!("STATUS: Step {} retrying with lessons", step_id))
            }
            ExecutionEvent::StepDone { step_id } => Some(format!("STATUS: Step {} done", step_id)),
            ExecutionEvent::StepFailed { step_id, .. } => {
                Some(format!("STATUS: Step {} failed", step_id))
            }
            ExecutionEvent::PlanComplete => Some("STATUS: Plan complete".to_string()),
            ExecutionEvent::PlanFailed { .. } => Some("STATUS: Planning failed".to_string()),
            ExecutionEvent::PlanReady { .. }
            | ExecutionEvent::Thinking { .. }
            | ExecutionEvent::ActionResult { .. } => None,
        }
    }
}

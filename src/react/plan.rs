//! 计划步骤：id / 描述 / 依赖 / 状态
//!
//! 由 Planner 从模型输出构造（或合成单步兜底计划），只有执行循环会修改 status。

use serde::{Deserialize, Serialize};

/// 兜底计划唯一步骤的 id
pub const FALLBACK_STEP_ID: &str = "step_1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub status: StepStatus,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            depends_on: Vec::new(),
            status: StepStatus::Pending,
        }
    }

    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// 单步兜底计划：描述即原始目标
    pub fn fallback(goal: &str) -> Self {
        Self::new(FALLBACK_STEP_ID, goal)
    }

    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }

    pub fn is_done(&self) -> bool {
        self.status == StepStatus::Done
    }
}

/// 每行一个步骤描述，用于决策 prompt
pub fn describe_plan(steps: &[PlanStep]) -> String {
    steps
        .iter()
        .map(|s| s.description.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

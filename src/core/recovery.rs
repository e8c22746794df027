//! 错误恢复引擎
//!
//! 步骤失败后只做一次重试，且仅当存在相关经验教训时才重试；无教训或已重试过则终止计划。

use crate::core::RecoveryAction;
use crate::memory::SkillLesson;

/// 每个步骤最多重试次数
pub const MAX_STEP_RETRIES: u32 = 1;

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// retries_used：该步骤已经做过的重试次数
    pub fn after_step_failure(&self, lessons: &[SkillLesson], retries_used: u32) -> RecoveryAction {
        if !lessons.is_empty() && retries_used < MAX_STEP_RETRIES {
            RecoveryAction::RetryWithLessons
        } else {
            RecoveryAction::Abort
        }
    }
}

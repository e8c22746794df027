//! 计划执行循环
//!
//! 调度 -> 决策 -> 分发 -> 记录 -> （带经验教训重试一次）-> 下一批，直到计划完成、死锁或某步失败。
//! 所有 await 顺序执行，同一时刻只运行一个步骤。可选 event_tx 向宿主推送 ExecutionEvent。

use std::collections::HashSet;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::memory::{ActionLog, LessonSource, LongTermMemory, MemoryHit, SkillLesson};
use crate::react::decision::{Decision, DecisionEngine};
use crate::react::events::ExecutionEvent;
use crate::react::plan::{PlanStep, StepStatus};
use crate::react::scheduler::{next_batch, Batch};
use crate::tools::{ActionOutcome, OutcomeStatus, ToolDispatcher};

/// 每步检索的经验教训上限
pub const LESSON_LIMIT: usize = 5;
/// 每步检索的长期记忆条数
pub const MEMORY_TOP_K: usize = 3;
/// 重试时追加在目标后的标记
pub const RETRY_SUFFIX: &str = " (retry using lessons)";

/// 执行一次计划所需的协作者
pub struct ExecutionSession<'a> {
    pub decider: &'a DecisionEngine,
    pub dispatcher: &'a dyn ToolDispatcher,
    pub lessons: &'a dyn LessonSource,
    pub memory: &'a dyn LongTermMemory,
    pub action_log: &'a dyn ActionLog,
    pub recovery: &'a RecoveryEngine,
    pub event_tx: Option<&'a UnboundedSender<ExecutionEvent>>,
}

impl<'a> ExecutionSession<'a> {
    pub fn new(
        decider: &'a DecisionEngine,
        dispatcher: &'a dyn ToolDispatcher,
        lessons: &'a dyn LessonSource,
        memory: &'a dyn LongTermMemory,
        action_log: &'a dyn ActionLog,
        recovery: &'a RecoveryEngine,
    ) -> Self {
        Self {
            decider,
            dispatcher,
            lessons,
            memory,
            action_log,
            recovery,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ExecutionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send(&self, ev: ExecutionEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

/// 一次执行的结果：成功或终止错误，以及期间产生的面向用户的文本
#[derive(Debug)]
pub struct ExecutionReport {
    pub result: Result<(), AgentError>,
    pub replies: Vec<String>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// 写入动作日志与任务记录的结果标签
    pub fn outcome_label(&self) -> &'static str {
        if self.is_success() {
            "success"
        } else {
            "failed"
        }
    }

    pub fn error_detail(&self) -> Option<String> {
        self.result.as_ref().err().map(AgentError::detail)
    }
}

struct StepContext<'s> {
    step: &'s PlanStep,
    lessons: Vec<SkillLesson>,
    hits: Vec<MemoryHit>,
}

async fn attempt(
    session: &ExecutionSession<'_>,
    goal: &str,
    plan: &[PlanStep],
    ctx: &StepContext<'_>,
    task_label: &str,
) -> ActionOutcome {
    let decision: Decision = session
        .decider
        .decide(goal, plan, ctx.step, &ctx.lessons, &ctx.hits)
        .await;
    if decision.intent == "thinking" {
        session.send(ExecutionEvent::Thinking {
            text: decision.text(),
        });
    }

    let outcome = session.dispatcher.dispatch(&decision).await;
    session.action_log.log(
        task_label,
        &decision.summary(),
        outcome.status.as_str(),
        outcome.error.as_deref(),
    );
    session.send(ExecutionEvent::ActionResult {
        step_id: ctx.step.id.clone(),
        action: decision.action.to_string(),
        status: outcome.status.as_str().to_string(),
        error: outcome.error.clone(),
    });
    if outcome.status != OutcomeStatus::Success {
        tracing::warn!(
            step_id = %ctx.step.id,
            action = %decision.action,
            status = outcome.status.as_str(),
            error = outcome.error.as_deref().unwrap_or(""),
            "Step attempt did not succeed"
        );
    }
    outcome
}

fn collect_reply(replies: &mut Vec<String>, outcome: &ActionOutcome) {
    if let Some(text) = &outcome.output {
        if !text.trim().is_empty() {
            replies.push(text.clone());
        }
    }
}

fn mark(steps: &mut [PlanStep], id: &str, status: StepStatus) {
    if let Some(step) = steps.iter_mut().find(|s| s.id == id) {
        step.status = status;
    }
}

/// 执行计划；steps 的状态在原地更新
pub async fn execute_plan(
    session: &ExecutionSession<'_>,
    goal: &str,
    steps: &mut [PlanStep],
) -> ExecutionReport {
    let mut replies = Vec::new();
    let result = run_steps(session, goal, steps, &mut replies).await;
    match &result {
        Ok(()) => {
            tracing::info!(steps = steps.len(), "Plan complete");
            session.send(ExecutionEvent::PlanComplete);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Plan failed");
            session.send(ExecutionEvent::PlanFailed {
                error: e.detail(),
            });
        }
    }
    ExecutionReport { result, replies }
}

async fn run_steps(
    session: &ExecutionSession<'_>,
    goal: &str,
    steps: &mut [PlanStep],
    replies: &mut Vec<String>,
) -> Result<(), AgentError> {
    let mut pending: HashSet<String> = steps
        .iter()
        .filter(|s| s.is_pending())
        .map(|s| s.id.clone())
        .collect();

    loop {
        let ready = match next_batch(steps, &pending) {
            Batch::Complete => return Ok(()),
            Batch::Deadlock { pending } => return Err(AgentError::Deadlock { pending }),
            Batch::Ready(ids) => ids,
        };

        for id in ready {
            let Some(step) = steps.iter().find(|s| s.id == id).cloned() else {
                continue;
            };
            tracing::info!(step_id = %step.id, description = %step.description, "Executing step");
            session.send(ExecutionEvent::StepStarted {
                step_id: step.id.clone(),
                description: step.description.clone(),
            });

            let ctx = StepContext {
                step: &step,
                lessons: session.lessons.relevant(&step.description, LESSON_LIMIT),
                hits: session.memory.search(&step.description, MEMORY_TOP_K),
            };

            let mut retries_used = 0;
            let mut reason: Option<String> = None;
            let succeeded = loop {
                let (attempt_goal, task_label) = if retries_used == 0 {
                    (
                        goal.to_string(),
                        format!("step:{}:{}", step.id, step.description),
                    )
                } else {
                    (
                        format!("{}{}", goal, RETRY_SUFFIX),
                        format!("step:{}:retry", step.id),
                    )
                };
                let outcome = attempt(session, &attempt_goal, steps, &ctx, &task_label).await;
                collect_reply(replies, &outcome);
                if outcome.is_success() {
                    break true;
                }
                // 后一次尝试的错误更具体
                if outcome.error.is_some() {
                    reason = outcome.error;
                }
                match session.recovery.after_step_failure(&ctx.lessons, retries_used) {
                    RecoveryAction::RetryWithLessons => {
                        retries_used += 1;
                        tracing::info!(step_id = %step.id, lessons = ctx.lessons.len(), "Retrying step with lessons");
                        session.send(ExecutionEvent::Retry {
                            step_id: step.id.clone(),
                        });
                    }
                    RecoveryAction::Abort => break false,
                }
            };

            if succeeded {
                mark(steps, &step.id, StepStatus::Done);
                pending.remove(&step.id);
                session.send(ExecutionEvent::StepDone {
                    step_id: step.id.clone(),
                });
                continue;
            }

            mark(steps, &step.id, StepStatus::Failed);
            let reason = reason.unwrap_or_else(|| "step failed".to_string());
            session.send(ExecutionEvent::StepFailed {
                step_id: step.id.clone(),
                error: reason.clone(),
            });
            return Err(AgentError::StepFailed {
                step_id: step.id,
                reason,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::{InMemoryActionLog, NoopLongTerm, SkillLesson, SkillMemory};
    use crate::tools::{ClarifyTool, RespondTool, ToolExecutor, ToolRegistry};

    fn respond(text: &str) -> String {
        serde_json::json!({"intent": "respond", "action": "respond", "action_input": text}).to_string()
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(RespondTool);
        registry.register(ClarifyTool);
        ToolExecutor::new(registry, 5)
    }

    fn browser_lessons() -> SkillMemory {
        let mut skills = SkillMemory::in_memory();
        skills.upsert(SkillLesson {
            context: "browser".to_string(),
            problem: "open_app missing".to_string(),
            lesson: "try another action".to_string(),
            confidence: 0.7,
        });
        skills
    }

    #[tokio::test]
    async fn test_steps_run_in_dependency_order() {
        let llm = Arc::new(
            MockLlmClient::default()
                .with_reply(respond("one"))
                .with_reply(respond("two")),
        );
        let decider = DecisionEngine::new(llm.clone());
        let dispatcher = executor();
        let lessons = SkillMemory::in_memory();
        let log = InMemoryActionLog::new();
        let recovery = RecoveryEngine::new();
        let session =
            ExecutionSession::new(&decider, &dispatcher, &lessons, &NoopLongTerm, &log, &recovery);

        let mut steps = vec![
            PlanStep::new("b", "Second").with_deps(["a"]),
            PlanStep::new("a", "First"),
        ];
        let report = execute_plan(&session, "goal", &mut steps).await;

        assert!(report.is_success());
        assert_eq!(report.replies, vec!["one", "two"]);
        assert!(steps.iter().all(PlanStep::is_done));
        let tasks: Vec<String> = log.records().into_iter().map(|r| r.task).collect();
        assert_eq!(tasks, vec!["step:a:First", "step:b:Second"]);
        assert!(llm.prompts()[0].contains("Current step:\nFirst"));
    }

    #[tokio::test]
    async fn test_failure_without_lessons_aborts() {
        let llm = Arc::new(
            MockLlmClient::default().with_reply(r#"{"action": "open_app", "action_input": {"app": "x"}}"#),
        );
        let decider = DecisionEngine::new(llm.clone());
        let dispatcher = executor();
        let lessons = SkillMemory::in_memory();
        let log = InMemoryActionLog::new();
        let recovery = RecoveryEngine::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session =
            ExecutionSession::new(&decider, &dispatcher, &lessons, &NoopLongTerm, &log, &recovery)
                .with_event_tx(&tx);

        let mut steps = vec![PlanStep::new("a", "Open it"), PlanStep::new("b", "Then").with_deps(["a"])];
        let report = execute_plan(&session, "goal", &mut steps).await;

        assert_eq!(report.error_detail().as_deref(), Some("Unknown action: open_app"));
        assert_eq!(steps[0].status, StepStatus::Failed);
        assert!(steps[1].is_pending());
        assert_eq!(llm.call_count(), 1);
        assert_eq!(log.records().len(), 1);

        drop(tx);
        let mut last = None;
        while let Some(ev) = rx.recv().await {
            last = Some(ev);
        }
        assert!(matches!(last, Some(ExecutionEvent::PlanFailed { .. })));
    }

    #[tokio::test]
    async fn test_deadlock_reports_pending() {
        let llm = Arc::new(MockLlmClient::default());
        let decider = DecisionEngine::new(llm.clone());
        let dispatcher = executor();
        let lessons = SkillMemory::in_memory();
        let log = InMemoryActionLog::new();
        let recovery = RecoveryEngine::new();
        let session =
            ExecutionSession::new(&decider, &dispatcher, &lessons, &NoopLongTerm, &log, &recovery);

        let mut steps = vec![PlanStep::new("a", "Orphan").with_deps(["missing"])];
        let report = execute_plan(&session, "goal", &mut steps).await;

        match report.result {
            Err(AgentError::Deadlock { pending }) => assert_eq!(pending, vec!["a"]),
            other => panic!("expected deadlock, got {other:?}"),
        }
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_retry_reports_retry_error() {
        let llm = Arc::new(
            MockLlmClient::default()
                .with_reply(r#"{"action": "open_app", "action_input": {"app": "browser"}}"#)
                .with_reply(r#"{"action": "kill_process", "action_input": {"pid": 1}}"#),
        );
        let decider = DecisionEngine::new(llm.clone());
        let dispatcher = executor();
        let lessons = browser_lessons();
        let log = InMemoryActionLog::new();
        let recovery = RecoveryEngine::new();
        let session =
            ExecutionSession::new(&decider, &dispatcher, &lessons, &NoopLongTerm, &log, &recovery);

        let mut steps = vec![
            PlanStep::new("a", "Open the browser"),
            PlanStep::new("b", "Then search").with_deps(["a"]),
        ];
        let report = execute_plan(&session, "goal", &mut steps).await;

        assert_eq!(report.error_detail().as_deref(), Some("Unknown action: kill_process"));
        assert_eq!(llm.call_count(), 2);
        assert!(llm.prompts()[1].contains("goal (retry using lessons)"));

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].task, "step:a:Open the browser");
        assert_eq!(records[1].task, "step:a:retry");
        assert_eq!(records[1].error.as_deref(), Some("Unknown action: kill_process"));

        assert_eq!(steps[0].status, StepStatus::Failed);
        assert!(steps[1].is_pending());
    }

    #[tokio::test]
    async fn test_retry_without_error_keeps_original_error() {
        let llm = Arc::new(
            MockLlmClient::default()
                .with_reply(r#"{"action": "open_app", "action_input": {"app": "browser"}}"#)
                .with_reply(r#"{"action": "ask_clarification", "action_input": "Which browser?"}"#),
        );
        let decider = DecisionEngine::new(llm.clone());
        let dispatcher = executor();
        let lessons = browser_lessons();
        let log = InMemoryActionLog::new();
        let recovery = RecoveryEngine::new();
        let session =
            ExecutionSession::new(&decider, &dispatcher, &lessons, &NoopLongTerm, &log, &recovery);

        let mut steps = vec![PlanStep::new("a", "Open the browser")];
        let report = execute_plan(&session, "goal", &mut steps).await;

        assert_eq!(report.error_detail().as_deref(), Some("Unknown action: open_app"));
        assert_eq!(report.replies, vec!["Which browser?"]);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(log.records()[1].outcome, "needs_input");
    }
}

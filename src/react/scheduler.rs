//! 依赖调度：每轮从头计算哪些步骤可以执行
//!
//! 一个步骤就绪当且仅当它仍是 pending，且每个依赖 id 都指向状态为 done 的步骤；
//! 不存在的依赖 id 永远不满足。待执行集合非空却没有就绪步骤即为死锁。

use std::collections::{HashMap, HashSet};

use crate::react::plan::{PlanStep, StepStatus};

/// 调度结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch {
    /// 本轮可执行的步骤 id（计划顺序）
    Ready(Vec<String>),
    /// 没有待执行步骤
    Complete,
    /// 仍有待执行步骤但都无法就绪
    Deadlock { pending: Vec<String> },
}

/// 依赖全部完成的 pending 步骤（计划顺序）
pub fn ready_steps(steps: &[PlanStep]) -> Vec<&PlanStep> {
    let status: HashMap<&str, StepStatus> =
        steps.iter().map(|s| (s.id.as_str(), s.status)).collect();
    steps
        .iter()
        .filter(|s| s.is_pending())
        .filter(|s| {
            s.depends_on
                .iter()
                .all(|dep| status.get(dep.as_str()) == Some(&StepStatus::Done))
        })
        .collect()
}

/// pending：执行循环维护的待执行 id 集合
pub fn next_batch(steps: &[PlanStep], pending: &HashSet<String>) -> Batch {
    if pending.is_empty() {
        return Batch::Complete;
    }
    let ready: Vec<String> = ready_steps(steps)
        .into_iter()
        .filter(|s| pending.contains(&s.id))
        .map(|s| s.id.clone())
        .collect();
    if !ready.is_empty() {
        return Batch::Ready(ready);
    }

    let mut blocked: Vec<String> = steps
        .iter()
        .filter(|s| pending.contains(&s.id))
        .map(|s| s.id.clone())
        .collect();
    // 集合里可能有计划中不存在的 id
    for id in pending {
        if !blocked.contains(id) {
            blocked.push(id.clone());
        }
    }
    Batch::Deadlock { pending: blocked }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_of(steps: &[PlanStep]) -> HashSet<String> {
        steps
            .iter()
            .filter(|s| s.is_pending())
            .map(|s| s.id.clone())
            .collect()
    }

    fn ids(steps: Vec<&PlanStep>) -> Vec<&str> {
        steps.into_iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_ready_respects_dependencies() {
        let mut steps = vec![
            PlanStep::new("a", "first"),
            PlanStep::new("b", "second").with_deps(["a"]),
            PlanStep::new("c", "third"),
        ];
        assert_eq!(ids(ready_steps(&steps)), vec!["a", "c"]);

        steps[0].status = StepStatus::Done;
        assert_eq!(ids(ready_steps(&steps)), vec!["b", "c"]);
    }

    #[test]
    fn test_failed_dependency_never_ready() {
        let mut steps = vec![
            PlanStep::new("a", "first"),
            PlanStep::new("b", "second").with_deps(["a"]),
        ];
        steps[0].status = StepStatus::Failed;
        assert!(ready_steps(&steps).is_empty());
    }

    #[test]
    fn test_unknown_dependency_deadlocks() {
        let steps = vec![PlanStep::new("a", "first").with_deps(["ghost"])];
        let batch = next_batch(&steps, &pending_of(&steps));
        assert_eq!(
            batch,
            Batch::Deadlock {
                pending: vec!["a".to_string()]
            }
        );
    }

    #[test]
    fn test_cycle_deadlocks() {
        let steps = vec![
            PlanStep::new("a", "first").with_deps(["b"]),
            PlanStep::new("b", "second").with_deps(["a"]),
        ];
        match next_batch(&steps, &pending_of(&steps)) {
            Batch::Deadlock { pending } => assert_eq!(pending, vec!["a", "b"]),
            other => panic!("expected deadlock, got {other:?}"),
        }
    }

    #[test]
    fn test_acyclic_plan_drains() {
        let mut steps = vec![
            PlanStep::new("c", "third").with_deps(["a", "b"]),
            PlanStep::new("b", "second").with_deps(["a"]),
            PlanStep::new("a", "first"),
        ];
        let mut pending = pending_of(&steps);
        let mut order = Vec::new();
        loop {
            match next_batch(&steps, &pending) {
                Batch::Complete => break,
                Batch::Ready(ready) => {
                    for id in ready {
                        if let Some(step) = steps.iter_mut().find(|s| s.id == id) {
                            step.status = StepStatus::Done;
                        }
                        pending.remove(&id);
                        order.push(id);
                    }
                }
                Batch::Deadlock { pending } => panic!("unexpected deadlock: {pending:?}"),
            }
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(steps.iter().all(PlanStep::is_done));
    }
}

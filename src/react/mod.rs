//! 认知层：规划、依赖调度、单步决策、执行循环与反思

pub mod decision;
pub mod events;
pub mod loop_;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod reflection;
pub mod scheduler;

pub use decision::{format_action_input, parse_decision, Action, Decision, DecisionEngine};
pub use events::ExecutionEvent;
pub use loop_::{execute_plan, ExecutionReport, ExecutionSession};
pub use plan::{PlanStep, StepStatus};
pub use planner::{parse_plan_output, Planner, PlannerOutput};
pub use reflection::{reflect, Reflection};
pub use scheduler::{next_batch, ready_steps, Batch};

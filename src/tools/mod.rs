//! 工具层：注册表、执行器（确认 / 超时 / 审计）与内置工具
//!
//! 具体的系统、浏览器、凭据等工具由宿主注册。

pub mod builtin;
pub mod executor;
pub mod registry;

pub use builtin::{ClarifyTool, RespondTool};
pub use executor::{
    ActionOutcome, AutoConfirm, Confirm, OutcomeStatus, ToolDispatcher, ToolExecutor,
};
pub use registry::{Tool, ToolOutput, ToolRegistry};

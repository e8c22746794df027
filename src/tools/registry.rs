//! 工具注册表
//!
//! 每个工具实现 Tool trait，按动作名（与 Decision.action 一致）注册与查找；
//! ToolExecutor 在调用时做确认、超时与审计。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::react::Decision;

/// 工具执行成功后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    /// 完成，附带要展示给用户的文本（可为空）
    Done(String),
    /// 需要用户补充信息（例如澄清问题）
    NeedsInput(String),
}

/// 工具 trait：动作名、描述、异步执行（直接读取 Decision 的 action_input）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 对应的动作名，如 "respond" / "open_app"
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 执行；Err 为面向用户的失败原因
    async fn execute(&self, decision: &Decision) -> Result<ToolOutput, String>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 已注册的动作名（排序后）
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect();
        list.sort();
        list
    }
}

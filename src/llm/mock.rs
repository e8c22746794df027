//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序回放预置回复（文本或错误）；可按 prompt 关键字固定回复（如规划 prompt）；
//! 队列耗尽后回显 prompt 末行，包装为 respond 决策 JSON，便于本地跑通规划与执行流程。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{LlmClient, LlmResponse, ProviderError};

/// Mock 客户端：关键字规则 > 回复队列 > 回显
pub struct MockLlmClient {
    name: &'static str,
    rules: Vec<(String, String)>,
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
    reachable: bool,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl MockLlmClient {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            reachable: true,
        }
    }

    /// prompt 含 needle 时总是返回 reply（不消耗队列）
    pub fn with_rule(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), reply.into()));
        self
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn with_error(self, err: ProviderError) -> Self {
        self.push_error(err);
        self
    }

    /// 模拟不可达的本地后端（health_check 返回 false）
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    pub fn push_error(&self, err: ProviderError) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
    }

    /// 已收到的 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(
        &self,
        prompt: &str,
        _system: Option<&str>,
    ) -> Result<LlmResponse, ProviderError> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }

        if let Some((_, reply)) = self.rules.iter().find(|(needle, _)| prompt.contains(needle)) {
            return Ok(LlmResponse::new(reply.clone(), json!({"mock": self.name})));
        }

        let queued = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match queued {
            Some(Ok(text)) => Ok(LlmResponse::new(text, json!({"mock": self.name}))),
            Some(Err(e)) => Err(e),
            None => {
                let last_line = prompt.lines().last().unwrap_or("(no input)");
                let text = json!({
                    "intent": "echo",
                    "action": "respond",
                    "action_input": format!("Echo from Mock: {}", last_line),
                    "needs_confirmation": false,
                })
                .to_string();
                Ok(LlmResponse::new(text, json!({"mock": self.name})))
            }
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }

    async fn health_check(&self) -> bool {
        self.reachable
    }
}

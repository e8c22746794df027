//! LLM 客户端抽象
//!
//! 所有后端（Ollama 本地 / Groq / OpenAI / FallbackCoordinator / Mock）实现 LlmClient：
//! generate(prompt, system) 返回文本与原始响应体；空文本视为失败而不是合法的空回复。

use async_trait::async_trait;

use crate::llm::ProviderError;

/// 一次生成的结果：回复文本 + 原始 JSON 响应
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub raw: serde_json::Value,
}

impl LlmResponse {
    pub fn new(text: impl Into<String>, raw: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            raw,
        }
    }
}

/// LLM 客户端 trait：单次生成，可选 system 指令
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, ProviderError>;

    /// 后端标识（日志与兜底提示中使用）
    fn name(&self) -> &'static str;

    /// 可达性探测；远端默认视为可达，本地后端覆盖为真实的 HTTP 探测
    async fn health_check(&self) -> bool {
        true
    }
}

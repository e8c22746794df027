//! OpenAI 兼容 Chat Completions 客户端
//!
//! Groq 与 OpenAI 共用此实现，仅 base_url / model / api_key 不同：
//! POST {base_url}/chat/completions，body 为 {model, messages: [{role, content}, ...]}，
//! Bearer Token 鉴权，回复文本取 `choices[0].message.content`。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::http::{non_empty_text, send_json};
use crate::llm::{LlmClient, LlmResponse, ProviderError};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
const USER_AGENT: &str = concat!("jarvis/", env!("CARGO_PKG_VERSION"));

/// OpenAI 兼容客户端：持有 HTTP Client、端点、模型名与 Key
pub struct OpenAiClient {
    http: Client,
    provider: &'static str,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        provider: &'static str,
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Self {
        Self {
            http: Client::new(),
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// 构造 chat 请求体：有 system 时先放 system 消息，再放 user 消息
pub fn chat_body(model: &str, prompt: &str, system: Option<&str>) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(s) = system.filter(|s| !s.is_empty()) {
        messages.push(json!({"role": "system", "content": s}));
    }
    messages.push(json!({"role": "user", "content": prompt}));
    json!({
        "model": model,
        "messages": messages,
    })
}

/// 取 choices[0].message.content；缺失或为空均为失败
pub fn extract_reply(provider: &'static str, payload: &Value) -> Result<String, ProviderError> {
    let content = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str);
    non_empty_text(provider, content)
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, ProviderError> {
        let request = self
            .http
            .post(self.endpoint())
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&chat_body(&self.model, prompt, system));
        let payload = send_json(self.provider, request).await?;

        let text = extract_reply(self.provider, &payload)?;
        Ok(LlmResponse::new(text, payload))
    }

    fn name(&self) -> &'static str {
        self.provider
    }
}

//! 本地 Ollama 客户端（第三层兜底）
//!
//! - 生成：POST {base_url}/api/generate，body 为 {model, prompt, stream: false, system?}，文本取 `response`
//! - 探测：GET {base_url}/api/tags，超时不超过 5 秒
//! - 超时上限 120 秒：首次加载模型可能很慢，但不能无限挂起

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::http::{non_empty_text, send_json};
use crate::llm::{LlmClient, LlmResponse, ProviderError};

pub const PROVIDER: &str = "ollama";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "mistral";
/// 本地请求超时上限（秒），与配置无关
pub const LOCAL_TIMEOUT_CAP_SECS: u64 = 120;
const HEALTH_TIMEOUT_CAP_SECS: u64 = 5;

/// 本地单次补全客户端
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs.min(LOCAL_TIMEOUT_CAP_SECS)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// 构造 /api/generate 请求体；system 为空时不带该字段
pub fn generate_body(model: &str, prompt: &str, system: Option<&str>) -> Value {
    let mut body = json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
    });
    if let Some(s) = system.filter(|s| !s.is_empty()) {
        body["system"] = Value::String(s.to_string());
    }
    body
}

/// 从 Ollama 响应中取回复文本
pub fn extract_reply(payload: &Value) -> Result<String, ProviderError> {
    non_empty_text(PROVIDER, payload.get("response").and_then(Value::as_str))
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, ProviderError> {
        let request = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .json(&generate_body(&self.model, prompt, system));
        let payload = send_json(PROVIDER, request).await?;
        let text = extract_reply(&payload)?;
        Ok(LlmResponse::new(text, payload))
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn health_check(&self) -> bool {
        let probe_timeout = self
            .timeout
            .min(Duration::from_secs(HEALTH_TIMEOUT_CAP_SECS));
        let result = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(probe_timeout)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "Ollama health check failed");
                false
            }
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                false
            }
        }
    }
}

//! Groq API 客户端（OpenAI 兼容格式）
//!
//! Groq 提供与 OpenAI 兼容的 Chat Completions 接口，作为第一层（主）远端后端。
//! - Base URL: https://api.groq.com/openai/v1
//! - 默认模型: llama-3.3-70b-versatile

use crate::llm::OpenAiClient;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// 创建 Groq 客户端；base_url 为 None 时使用官方端点
pub fn create_groq_client(
    base_url: Option<&str>,
    model: &str,
    api_key: &str,
    timeout_secs: u64,
) -> OpenAiClient {
    OpenAiClient::new(
        "groq",
        base_url.unwrap_or(GROQ_BASE_URL),
        model,
        api_key,
        timeout_secs,
    )
}

//! Provider 错误类型
//!
//! 网络失败、非 2xx 状态、响应体无法解析、回复为空都会成为 ProviderError；
//! FallbackCoordinator 依据 is_rate_limited 决定冷却时长（限流 300s / 其它 30s）。

use thiserror::Error;

/// 单个后端调用失败的原因
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("{provider} connection error: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    /// 429 单独给出可读的限流提示，其余状态码原样带上响应体
    #[error("{}", status_message(provider, *status, body))]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid JSON response from {provider}: {message}")]
    InvalidBody {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned an empty response")]
    EmptyReply { provider: &'static str },

    #[error("{provider} not reachable: {message}")]
    Unreachable {
        provider: &'static str,
        message: String,
    },
}

fn status_message(provider: &str, status: u16, body: &str) -> String {
    if status == 429 {
        format!("Rate limit reached (429): {}", body)
    } else {
        format!("{} HTTP error {}: {}", provider, status, body)
    }
}

impl ProviderError {
    /// 是否为限流：状态码 429，或错误文本含 "429" / "rate limit"（大小写不敏感）
    pub fn is_rate_limited(&self) -> bool {
        if let ProviderError::Status { status: 429, .. } = self {
            return true;
        }
        let text = self.to_string().to_lowercase();
        text.contains("429") || text.contains("rate limit")
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Transport { provider, .. }
            | ProviderError::Status { provider, .. }
            | ProviderError::InvalidBody { provider, .. }
            | ProviderError::EmptyReply { provider }
            | ProviderError::Unreachable { provider, .. } => provider,
        }
    }
}

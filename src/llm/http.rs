//! 三个后端共用的 HTTP 往返：发送请求、检查状态码、解析 JSON

use reqwest::RequestBuilder;
use serde_json::Value;

use crate::llm::ProviderError;

/// 发送请求并把响应体解析为 JSON；网络失败 / 非 2xx / 非法 JSON 分别映射为对应的 ProviderError
pub(crate) async fn send_json(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Transport {
            provider,
            message: e.to_string(),
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Transport {
            provider,
            message: e.to_string(),
        })?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| ProviderError::InvalidBody {
        provider,
        message: e.to_string(),
    })
}

/// 取非空文本；空白字符串视为 EmptyReply
pub(crate) fn non_empty_text(
    provider: &'static str,
    text: Option<&str>,
) -> Result<String, ProviderError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t.to_string()),
        _ => Err(ProviderError::EmptyReply { provider }),
    }
}

//! LLM 层：客户端抽象、三个后端（Ollama 本地 / Groq / OpenAI）、三层降级协调器与 Mock

pub mod error;
pub mod fallback;
pub mod groq;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

pub use error::ProviderError;
pub use fallback::{CooldownPolicy, FallbackCoordinator, ProviderMode, RemoteTier};
pub use groq::{create_groq_client, GROQ_BASE_URL, GROQ_DEFAULT_MODEL};
pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
pub use openai::{OpenAiClient, OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL};
pub use traits::{LlmClient, LlmResponse};

//! Jarvis - 本地个人助理的控制核心
//!
//! 模块划分：
//! - **agent**: 一轮对话的处理（记忆指令、规划、执行、反思、持久化）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复策略、可注入时钟
//! - **llm**: LLM 客户端抽象、Groq / OpenAI / Ollama 后端与三层降级协调器
//! - **memory**: 短期对话、长期向量记忆、经验教训与动作日志
//! - **observability**: tracing 初始化
//! - **react**: 规划、依赖调度、单步决策、执行循环与反思
//! - **tools**: 工具注册表与执行器（确认、超时、审计）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

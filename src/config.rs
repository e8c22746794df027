//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `JARVIS__*` 覆盖（双下划线表示嵌套，如 `JARVIS__LLM__PROVIDER=groq`）。
//! 远端 API Key 未在配置中给出时，回退到 `GROQ_API_KEY` / `OPENAI_API_KEY`。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::{ollama, CooldownPolicy, GROQ_BASE_URL, GROQ_DEFAULT_MODEL, OPENAI_BASE_URL};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub memory: MemorySection,
    pub safety: SafetySection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 记忆与日志路径的基准目录
    pub data_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "jarvis".to_string(),
            data_dir: PathBuf::from("."),
        }
    }
}

/// [llm] 段：模式、超时、三个后端与冷却策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// hybrid / groq / openai / local（ollama）
    pub provider: String,
    /// 远端请求超时（秒）；本地未单独配置时也用它（上限 120）
    pub timeout: u64,
    pub groq: RemoteProviderSection,
    pub openai: RemoteProviderSection,
    pub ollama: OllamaSection,
    pub cooldown: CooldownSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "hybrid".to_string(),
            timeout: 60,
            groq: RemoteProviderSection::default(),
            openai: RemoteProviderSection::default(),
            ollama: OllamaSection::default(),
            cooldown: CooldownSection::default(),
        }
    }
}

impl LlmSection {
    pub fn groq_model(&self) -> &str {
        self.groq.model.as_deref().unwrap_or(GROQ_DEFAULT_MODEL)
    }

    pub fn groq_base_url(&self) -> &str {
        self.groq.base_url.as_deref().unwrap_or(GROQ_BASE_URL)
    }

    pub fn openai_model(&self) -> &str {
        self.openai
            .model
            .as_deref()
            .unwrap_or(crate::llm::OPENAI_DEFAULT_MODEL)
    }

    pub fn openai_base_url(&self) -> &str {
        self.openai.base_url.as_deref().unwrap_or(OPENAI_BASE_URL)
    }

    /// 本地超时：[llm.ollama].timeout，否则 [llm].timeout
    pub fn local_timeout(&self) -> u64 {
        self.ollama.timeout.unwrap_or(self.timeout)
    }
}

/// [llm.groq] / [llm.openai] 段
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteProviderSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl RemoteProviderSection {
    /// 非空的 Key
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

/// [llm.ollama] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaSection {
    pub base_url: String,
    pub model: String,
    pub timeout: Option<u64>,
}

impl Default for OllamaSection {
    fn default() -> Self {
        Self {
            base_url: ollama::DEFAULT_BASE_URL.to_string(),
            model: ollama::DEFAULT_MODEL.to_string(),
            timeout: None,
        }
    }
}

/// [llm.cooldown] 段（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CooldownSection {
    pub rate_limited_secs: u64,
    pub failure_secs: u64,
}

impl Default for CooldownSection {
    fn default() -> Self {
        Self {
            rate_limited_secs: 300,
            failure_secs: 30,
        }
    }
}

impl CooldownSection {
    pub fn policy(&self) -> CooldownPolicy {
        CooldownPolicy {
            rate_limited: std::time::Duration::from_secs(self.rate_limited_secs),
            failure: std::time::Duration::from_secs(self.failure_secs),
        }
    }
}

/// [memory] 段：相对路径以 app.data_dir 为基准
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub long_term_path: PathBuf,
    pub skills_path: PathBuf,
    pub logs_path: PathBuf,
    /// 短期记忆保留条数
    pub short_term_max_items: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            long_term_path: PathBuf::from("memory/long_term.json"),
            skills_path: PathBuf::from("memory/skills.json"),
            logs_path: PathBuf::from("logs/actions.jsonl"),
            short_term_max_items: 50,
        }
    }
}

/// [safety] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetySection {
    pub require_confirmations: bool,
    pub kill_switch_commands: Vec<String>,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            require_confirmations: true,
            kill_switch_commands: ["exit", "quit", "kill", "stop"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SafetySection {
    /// 输入（忽略大小写与首尾空白）是否为终止命令；列表为空时用默认命令
    pub fn is_kill_switch(&self, input: &str) -> bool {
        let input = input.trim().to_lowercase();
        if self.kill_switch_commands.is_empty() {
            return SafetySection::default()
                .kill_switch_commands
                .iter()
                .any(|c| *c == input);
        }
        self.kill_switch_commands
            .iter()
            .any(|c| c.trim().to_lowercase() == input)
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    pub fn data_path(&self, relative: &std::path::Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.app.data_dir.join(relative)
        }
    }

    /// 配置中缺失的 Key 用环境变量补上
    fn apply_key_fallbacks(&mut self) {
        fill_key(&mut self.llm.groq, "GROQ_API_KEY");
        fill_key(&mut self.llm.openai, "OPENAI_API_KEY");
    }
}

fn fill_key(section: &mut RemoteProviderSection, var: &str) {
    if section.key().is_some() {
        return;
    }
    if let Ok(key) = std::env::var(var) {
        if !key.trim().is_empty() {
            section.api_key = Some(key);
        }
    }
}

/// 从 config 目录加载配置，环境变量 JARVIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 JARVIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("JARVIS")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.apply_key_fallbacks();
    Ok(cfg)
}

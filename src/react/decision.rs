//! 决策引擎：为单个步骤向模型要一个动作，并把半结构化回复规整成 Decision
//!
//! 退化阶梯：调用失败或空回复 -> 通用"需要更多信息"的 respond；非 JSON 文本 -> 以原文 respond；
//! respond 的输入里出现 "analyz" / "think" 时 intent 改为 thinking。

use std::sync::Arc;

use serde_json::Value;

use crate::llm::LlmClient;
use crate::memory::{format_hits, format_lessons, MemoryHit, SkillLesson};
use crate::react::plan::{describe_plan, PlanStep};
use crate::react::planner::parse_json_payload;
use crate::react::prompts::{decision_prompt, SYSTEM_PROMPT};

/// 模型不可用或回复为空时的回复文本
pub const NEED_DETAILS_TEXT: &str =
    "I need more details or the local model is unavailable. Please clarify or check Ollama.";

macro_rules! actions {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// 工具动作；未知名称原样保留，在分发时失败
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum Action {
            $($variant,)+
            Unknown(String),
        }

        impl Action {
            /// 全部已知动作名（用于决策 prompt）
            pub const KNOWN: &'static [&'static str] = &[$($name),+];

            pub fn from_name(name: &str) -> Self {
                match name.trim() {
                    $($name => Action::$variant,)+
                    other => Action::Unknown(other.to_string()),
                }
            }

            pub fn as_str(&self) -> &str {
                match self {
                    $(Action::$variant => $name,)+
                    Action::Unknown(name) => name.as_str(),
                }
            }
        }
    };
}

actions! {
    Respond => "respond",
    AskClarification => "ask_clarification",
    OpenApp => "open_app",
    SendKeys => "send_keys",
    Hotkey => "hotkey",
    MoveMouse => "move_mouse",
    ClickMouse => "click_mouse",
    SystemStats => "system_stats",
    ListProcesses => "list_processes",
    KillProcess => "kill_process",
    ReadScreen => "read_screen",
    FetchUrl => "fetch_url",
    HttpPost => "http_post",
    DownloadFile => "download_file",
    ExtractLinks => "extract_links",
    PdfText => "pdf_text",
    SniffTokens => "sniff_tokens",
    MissionRun => "mission_run",
    BrowserOpen => "browser_open",
    BrowserFill => "browser_fill",
    BrowserClick => "browser_click",
    BrowserSubmit => "browser_submit",
    BrowserWait => "browser_wait",
    BrowserText => "browser_text",
    BrowserScreenshot => "browser_screenshot",
    CredSave => "cred_save",
    CredGet => "cred_get",
    CredDelete => "cred_delete",
    MoltbookPost => "moltbook_post",
    ReadFile => "read_file",
    WriteFile => "write_file",
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 动作输入的展示形式：字符串原样，对象等序列化为 JSON
pub fn format_action_input(input: &Value) -> String {
    match input {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 单次决策结果
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub intent: String,
    pub action: Action,
    /// 字符串或对象，仅在使用处校验
    pub action_input: Value,
    pub needs_confirmation: bool,
}

impl Decision {
    pub fn respond(intent: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            action: Action::Respond,
            action_input: Value::String(text.into()),
            needs_confirmation: false,
        }
    }

    /// 调用失败或空回复时的兜底决策
    pub fn need_details() -> Self {
        Self::respond("unknown", NEED_DETAILS_TEXT)
    }

    /// 输入为对象且字段为字符串（数字会转成字符串）时返回之，否则为空串
    pub fn input_str(&self, key: &str) -> String {
        match self.action_input.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    /// 输入为对象且字段为数组时返回其中的字符串元素，否则为空
    pub fn input_list(&self, key: &str) -> Vec<String> {
        match self.action_input.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// 输入为对象且字段为整数（或可解析为整数的字符串）时返回之
    pub fn input_int(&self, key: &str) -> Option<i64> {
        match self.action_input.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// respond / ask_clarification 的文本
    pub fn text(&self) -> String {
        format_action_input(&self.action_input)
    }

    /// 日志中的决策描述："<action>(<input>)"
    pub fn summary(&self) -> String {
        format!("{}({})", self.action, format_action_input(&self.action_input))
    }

    fn apply_thinking_heuristic(mut self) -> Self {
        if self.action == Action::Respond {
            let input = format_action_input(&self.action_input).to_lowercase();
            if input.contains("analyz") || input.contains("think") {
                tracing::info!(text = %self.text(), "Thinking");
                self.intent = "thinking".to_string();
                self.needs_confirmation = false;
            }
        }
        self
    }
}

fn field_string(payload: &serde_json::Map<String, Value>, key: &str, default: &str) -> String {
    match payload.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => default.to_string(),
    }
}

fn field_bool(payload: &serde_json::Map<String, Value>, key: &str) -> bool {
    match payload.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// 把模型回复规整为 Decision；不会失败
pub fn parse_decision(text: &str) -> Decision {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Decision::need_details();
    }

    let decision = match parse_json_payload(trimmed) {
        Some(payload) => Decision {
            intent: field_string(&payload, "intent", "unknown"),
            action: Action::from_name(&field_string(&payload, "action", "respond")),
            action_input: match payload.get("action_input") {
                None | Some(Value::Null) => Value::String(String::new()),
                Some(v) => v.clone(),
            },
            needs_confirmation: field_bool(&payload, "needs_confirmation"),
        },
        None => Decision::respond("respond", trimmed),
    };
    decision.apply_thinking_heuristic()
}

/// 决策引擎：持有 LLM 与 system prompt
pub struct DecisionEngine {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl DecisionEngine {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub async fn decide(
        &self,
        goal: &str,
        plan: &[PlanStep],
        step: &PlanStep,
        lessons: &[SkillLesson],
        hits: &[MemoryHit],
    ) -> Decision {
        let prompt = decision_prompt(
            goal,
            &step.description,
            &describe_plan(plan),
            &format_lessons(lessons),
            &format_hits(hits),
        );
        tracing::debug!(step_id = %step.id, prompt_len = prompt.len(), "Deciding");
        match self.llm.generate(&prompt, Some(&self.system_prompt)).await {
            Ok(resp) => parse_decision(&resp.text),
            Err(e) => {
                tracing::warn!(step_id = %step.id, error = %e, "Decision request failed, using fallback");
                Decision::need_details()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ProviderError};
    use serde_json::json;

    #[test]
    fn test_action_names_round_trip() {
        for name in Action::KNOWN {
            let action = Action::from_name(name);
            assert!(!matches!(action, Action::Unknown(_)), "{name}");
            assert_eq!(action.as_str(), *name);
        }
        assert_eq!(
            Action::from_name("launch_rocket"),
            Action::Unknown("launch_rocket".to_string())
        );
    }

    #[test]
    fn test_parse_full_payload() {
        let d = parse_decision(
            r#"{"intent": "open", "action": "open_app", "action_input": {"app": "chrome"}, "needs_confirmation": true}"#,
        );
        assert_eq!(d.intent, "open");
        assert_eq!(d.action, Action::OpenApp);
        assert_eq!(d.input_str("app"), "chrome");
        assert!(d.needs_confirmation);
        assert_eq!(d.summary(), r#"open_app({"app":"chrome"})"#);
    }

    #[test]
    fn test_parse_defaults() {
        let d = parse_decision("{}");
        assert_eq!(d.intent, "unknown");
        assert_eq!(d.action, Action::Respond);
        assert_eq!(d.action_input, json!(""));
        assert!(!d.needs_confirmation);
    }

    #[test]
    fn test_empty_reply_needs_details() {
        let d = parse_decision("  \n ");
        assert_eq!(d.intent, "unknown");
        assert_eq!(d.text(), NEED_DETAILS_TEXT);
    }

    #[test]
    fn test_plain_text_becomes_respond() {
        let d = parse_decision("Chrome is already open, Sir.");
        assert_eq!(d.intent, "respond");
        assert_eq!(d.action, Action::Respond);
        assert_eq!(d.text(), "Chrome is already open, Sir.");
    }

    #[test]
    fn test_thinking_heuristic() {
        let d = parse_decision(r#"{"intent": "x", "action": "respond", "action_input": "Analyzing the screen first"}"#);
        assert_eq!(d.intent, "thinking");
        assert_eq!(d.action, Action::Respond);

        let d = parse_decision("Let me THINK about that");
        assert_eq!(d.intent, "thinking");

        // 非 respond 动作不受影响
        let d = parse_decision(r#"{"intent": "x", "action": "send_keys", "action_input": {"text": "think"}}"#);
        assert_eq!(d.intent, "x");
    }

    #[test]
    fn test_input_accessors_tolerate_wrong_shapes() {
        let d = Decision::respond("respond", "just text");
        assert_eq!(d.input_str("app"), "");
        assert!(d.input_list("keys").is_empty());
        assert_eq!(d.input_int("pid"), None);

        let d = parse_decision(
            r#"{"action": "hotkey", "action_input": {"keys": ["ctrl", "s", 1], "pid": "1234", "x": 10.7, "app": ["no"]}}"#,
        );
        assert_eq!(d.input_list("keys"), vec!["ctrl", "s", "1"]);
        assert_eq!(d.input_int("pid"), Some(1234));
        assert_eq!(d.input_int("x"), Some(10));
        assert_eq!(d.input_str("app"), "");
    }

    #[tokio::test]
    async fn test_decide_error_falls_back() {
        let llm = Arc::new(MockLlmClient::default().with_error(ProviderError::EmptyReply {
            provider: "mock",
        }));
        let engine = DecisionEngine::new(llm);
        let step = PlanStep::new("s1", "Open Chrome");
        let d = engine.decide("open chrome", &[step.clone()], &step, &[], &[]).await;
        assert_eq!(d, Decision::need_details());
    }

    #[tokio::test]
    async fn test_decide_prompt_includes_lessons() {
        let llm = Arc::new(MockLlmClient::default().with_reply(
            r#"{"intent": "open", "action": "open_app", "action_input": {"app": "chrome"}}"#,
        ));
        let engine = DecisionEngine::new(llm.clone());
        let step = PlanStep::new("s1", "Open Chrome");
        let lesson = SkillLesson {
            context: "chrome".to_string(),
            problem: "wrong name".to_string(),
            lesson: "use chrome".to_string(),
            confidence: 0.9,
        };
        let d = engine
            .decide("open chrome", &[step.clone()], &step, &[lesson], &[])
            .await;
        assert_eq!(d.action, Action::OpenApp);
        assert!(llm.prompts()[0].contains("lesson: use chrome"));
    }
}

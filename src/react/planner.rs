//! Planner：把自由文本目标变成带依赖的步骤列表，或直接给出回复
//!
//! 模型输出不可信：parse_plan_output 先严格解析 JSON，失败再截取第一个配平的 {…}；
//! 非 JSON 文本视为直接回复，空回复或调用失败退化为单步兜底计划。

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::llm::LlmClient;
use crate::react::plan::PlanStep;
use crate::react::prompts::{plan_prompt, SYSTEM_PROMPT};

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复用户，不执行任何步骤
    Respond(String),
    /// 需要执行的步骤（至少一个）
    Steps(Vec<PlanStep>),
}

/// 从文本中截取第一个括号配平的 JSON 对象
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 严格解析为 JSON 对象，失败则解析截取出的第一个对象；都不是对象时返回 None
pub fn parse_json_payload(text: &str) -> Option<serde_json::Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return Some(map);
    }
    let candidate = extract_json_object(text)?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// 字符串或数字转为字符串；其它类型视为缺失
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_step(item: &Value) -> Option<PlanStep> {
    let obj = item.as_object()?;
    let id = obj.get("id").and_then(scalar_to_string)?;
    let description = obj.get("description").and_then(scalar_to_string)?;
    let depends_on = match obj.get("depends_on") {
        Some(Value::Array(deps)) => deps.iter().filter_map(scalar_to_string).collect(),
        Some(single) => scalar_to_string(single).into_iter().collect(),
        None => Vec::new(),
    };
    Some(PlanStep::new(id, description).with_deps(depends_on))
}

fn parse_steps(items: &[Value]) -> Vec<PlanStep> {
    let mut seen = HashSet::new();
    let mut steps = Vec::with_capacity(items.len());
    for step in items.iter().filter_map(parse_step) {
        if !seen.insert(step.id.clone()) {
            tracing::warn!(step_id = %step.id, "Dropping duplicate plan step id");
            continue;
        }
        steps.push(step);
    }
    steps
}

/// 把模型回复规整为 PlannerOutput；不会失败
pub fn parse_plan_output(text: &str, goal: &str) -> PlannerOutput {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return PlannerOutput::Steps(vec![PlanStep::fallback(goal)]);
    }

    let Some(payload) = parse_json_payload(trimmed) else {
        return PlannerOutput::Respond(trimmed.to_string());
    };

    if let Some(Value::String(response)) = payload.get("response") {
        if !response.trim().is_empty() {
            return PlannerOutput::Respond(response.clone());
        }
    }

    let steps = payload
        .get("steps")
        .and_then(Value::as_array)
        .map(|items| parse_steps(items))
        .unwrap_or_default();

    if steps.is_empty() {
        PlannerOutput::Steps(vec![PlanStep::fallback(goal)])
    } else {
        PlannerOutput::Steps(steps)
    }
}

/// Planner：持有（通常是 FallbackCoordinator 的）LLM 与 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
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

    /// history：最近对话；memory：格式化后的长期记忆段落
    pub async fn plan(&self, goal: &str, history: &str, memory: &str) -> PlannerOutput {
        let prompt = plan_prompt(goal, history, memory);
        tracing::debug!(prompt_len = prompt.len(), "Planning");
        match self.llm.generate(&prompt, Some(&self.system_prompt)).await {
            Ok(resp) => {
                let output = parse_plan_output(&resp.text, goal);
                match &output {
                    PlannerOutput::Steps(steps) => {
                        tracing::info!(steps = steps.len(), "Plan ready")
                    }
                    PlannerOutput::Respond(_) => tracing::info!("Planner answered directly"),
                }
                output
            }
            Err(e) => {
                tracing::warn!(error = %e, "Planning failed, using single-step plan");
                PlannerOutput::Steps(vec![PlanStep::fallback(goal)])
            }
        }
    }
}

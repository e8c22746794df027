//! 反思：计划结束后让模型总结，并提炼可复用的经验教训
//!
//! 任何失败（调用出错、非 JSON、字段缺失）都退化为 "Task: <task> -> <outcome>" 且无教训。

use serde_json::Value;

use crate::llm::LlmClient;
use crate::memory::SkillLesson;
use crate::react::planner::{parse_json_payload, scalar_to_string};
use crate::react::prompts::reflection_prompt;

#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    pub summary: String,
    pub lessons: Vec<SkillLesson>,
}

fn parse_lesson(item: &Value) -> Option<SkillLesson> {
    let obj = item.as_object()?;
    let field = |key: &str| obj.get(key).and_then(scalar_to_string).unwrap_or_default();
    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .unwrap_or(0.5)
    .clamp(0.0, 1.0);
    Some(SkillLesson {
        context: field("context"),
        problem: field("problem"),
        lesson: field("lesson"),
        confidence,
    })
}

/// 解析反思回复；fallback_summary 用于回复不可用时
pub fn parse_reflection(text: &str, fallback_summary: &str) -> Reflection {
    let Some(payload) = parse_json_payload(text.trim()) else {
        return Reflection {
            summary: fallback_summary.to_string(),
            lessons: Vec::new(),
        };
    };
    let summary = payload
        .get("summary")
        .and_then(scalar_to_string)
        .unwrap_or_else(|| fallback_summary.to_string());
    let lessons = payload
        .get("lessons")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_lesson).collect())
        .unwrap_or_default();
    Reflection { summary, lessons }
}

pub async fn reflect(
    llm: &dyn LlmClient,
    task: &str,
    decision: &str,
    outcome: &str,
    error: Option<&str>,
) -> Reflection {
    let fallback_summary = format!("Task: {} -> {}", task, outcome);
    let prompt = reflection_prompt(task, decision, outcome, error);
    match llm.generate(&prompt, None).await {
        Ok(resp) => parse_reflection(&resp.text, &fallback_summary),
        Err(e) => {
            tracing::warn!(error = %e, "Reflection failed");
            Reflection {
                summary: fallback_summary,
                lessons: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ProviderError};

    #[test]
    fn test_parse_reflection_with_lessons() {
        let text = r#"{"summary": "Opened Chrome", "lessons": [
            {"context": "open chrome", "problem": "not allowlisted", "lesson": "use chrome", "confidence": 1.7},
            {"context": "x", "problem": "y", "lesson": "z"},
            "junk"
        ]}"#;
        let r = parse_reflection(text, "fallback");
        assert_eq!(r.summary, "Opened Chrome");
        assert_eq!(r.lessons.len(), 2);
        assert_eq!(r.lessons[0].confidence, 1.0);
        assert_eq!(r.lessons[1].confidence, 0.5);
    }

    #[test]
    fn test_parse_reflection_non_json() {
        let r = parse_reflection("I did my best", "Task: t -> failed");
        assert_eq!(r.summary, "Task: t -> failed");
        assert!(r.lessons.is_empty());
    }

    #[tokio::test]
    async fn test_reflect_error_degrades() {
        let llm = MockLlmClient::default().with_error(ProviderError::Transport {
            provider: "mock",
            message: "down".to_string(),
        });
        let r = reflect(&llm, "open chrome", "plan_execution", "failed", Some("boom")).await;
        assert_eq!(r.summary, "Task: open chrome -> failed");
        assert!(r.lessons.is_empty());
    }
}

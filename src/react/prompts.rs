//! Prompt 模板：系统角色、规划、单步决策、反思

use crate::react::decision::Action;

/// 所有模型调用共用的系统 prompt
pub const SYSTEM_PROMPT: &str = r#"You are J.A.R.V.I.S., a local desktop agent backed by three model tiers:
Groq (primary cloud), OpenAI (secondary cloud) and Ollama (local, offline).
You are a concise, professional digital butler and address the user as "Sir".

You work in a loop: plan, act, observe, reflect. Break goals into ordered,
actionable steps, pick exactly one allowed action per step, and adapt when a
step fails. Short-term history, long-term memory snippets and learned lessons
are provided in the prompts; use them.

Safety:
- Never expose secrets or sensitive local files.
- Respect the application allowlist and the file root.
- Respect confirmations requested by the agent.
- Only use action names listed in the decision prompt.

When a prompt asks for JSON, return STRICT JSON in exactly the requested shape
and do not include your reasoning in it."#;

/// 规划 prompt 的固定开头（测试中的 mock 依此识别规划请求）
pub const PLAN_MARKER: &str = "Create a concise, dependency-aware plan";

/// 决策 prompt 的固定开头
pub const DECISION_MARKER: &str = "You are deciding the next action";

/// 反思 prompt 的固定开头
pub const REFLECTION_MARKER: &str = "You are reflecting on a completed task";

pub fn plan_prompt(goal: &str, history: &str, memory: &str) -> String {
    let history = if history.trim().is_empty() {
        "(none)"
    } else {
        history
    };
    format!(
        r#"{PLAN_MARKER} OR a direct response.
Return ONLY valid JSON with key "steps" OR "response".
- If the goal is a question or chat, return {{"response": "your answer"}}.
- If the goal requires tools or actions, return {{"steps": [...]}}.

Each step must be a concrete, physical task such as "Open Chrome" or "Type text".
Do not create abstract steps like "Analyze objective".
Each step has: id, description, depends_on (list of ids).

Goal: {goal}

Conversation History:
{history}

Long-term Memory (IMPORTANT):
{memory}"#
    )
}

pub fn decision_prompt(
    goal: &str,
    current_step: &str,
    plan: &str,
    lessons: &str,
    long_term: &str,
) -> String {
    let actions = Action::KNOWN.join(", ");
    format!(
        r#"{DECISION_MARKER} for a local assistant.
Return ONLY valid JSON with keys: intent, action, action_input, needs_confirmation.
If you cannot comply, return a JSON object with action "respond" and a short message.
Valid actions: {actions}.

If the current step is purely cognitive, use "respond" to say what you concluded.

Use an object as action_input for tool actions, for example:
- open_app: {{"app": "chrome"}}
- send_keys: {{"text": "hello"}}
- hotkey: {{"keys": ["ctrl", "s"]}}
- move_mouse: {{"x": 100, "y": 200, "duration": 0.2}}
- kill_process: {{"pid": 1234}}
- read_file: {{"path": "notes/todo.txt"}}
- fetch_url: {{"url": "https://example.com"}}
For respond and ask_clarification, action_input is a string.

User input:
{goal}

Current step:
{current_step}

Plan:
{plan}

Relevant lessons:
{lessons}

Long-term memory (USE THIS TO ANSWER QUESTIONS ABOUT THE USER):
{long_term}"#
    )
}

pub fn reflection_prompt(task: &str, decision: &str, outcome: &str, error: Option<&str>) -> String {
    let error = error.unwrap_or("(none)");
    format!(
        r#"{REFLECTION_MARKER} for a local assistant.
Return ONLY valid JSON with keys: summary, lessons.
The lessons field is a list of objects with keys: context, problem, lesson, confidence.
Use confidence values between 0.0 and 1.0.

Task: {task}
Decision: {decision}
Outcome: {outcome}
Error: {error}"#
    )
}

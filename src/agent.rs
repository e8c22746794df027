//! Agent 运行时：处理一轮用户输入
//!
//! 记忆指令（"remember that …" 等）直接写入长期记忆，寒暄与姓名询问不经模型作答；其余输入先规划，
//! 直接回复或执行计划，然后反思并持久化短期、长期与技能记忆。
//! 任何一轮都会给出回复，持久化失败只记 warn。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::AppConfig;
use crate::core::RecoveryEngine;
use crate::llm::{
    create_groq_client, FallbackCoordinator, LlmClient, OllamaClient, OpenAiClient, ProviderMode,
};
use crate::memory::{
    format_hits, ActionLog, FileLongTerm, InMemoryActionLog, JsonlActionLog, LongTermMemory,
    Message, ShortTermMemory, SkillMemory, HISTORY_LIMIT,
};
use crate::react::{
    execute_plan, reflect, DecisionEngine, ExecutionEvent, ExecutionSession, Planner,
    PlannerOutput,
};
use crate::tools::{ClarifyTool, Confirm, RespondTool, ToolDispatcher, ToolExecutor, ToolRegistry};

/// 触发"记住"的前缀（忽略大小写）
const REMEMBER_TRIGGERS: [&str; 5] = [
    "remember that",
    "remember this",
    "memorize",
    "don't forget",
    "keep in mind",
];

/// 不经模型直接应答的寒暄（整句匹配，忽略大小写）
const CANNED_REPLIES: [(&str, &str); 11] = [
    ("hi", "At your service, Sir."),
    ("hello", "Hello, Sir. How may I assist you?"),
    ("hi jarvis", "Greetings, Sir. Standing by."),
    ("hello jarvis", "Hello, Sir. I am ready."),
    ("hey jarvis", "Yes, Sir?"),
    ("good morning", "Good morning, Sir."),
    ("good evening", "Good evening, Sir."),
    ("thank you", "My pleasure, Sir."),
    ("thanks", "You are quite welcome, Sir."),
    ("who are you", "I am J.A.R.V.I.S., your personal digital butler."),
    (
        "what can you do",
        "I can control your PC, launch apps, type text, read screens, and manage your schedule, Sir.",
    ),
];

/// 询问用户姓名的说法（包含即命中）
const IDENTITY_TRIGGERS: [&str; 4] = [
    "what is my name",
    "tell me my name",
    "who am i",
    "do you know my name",
];

const NAME_UNKNOWN_TEXT: &str = "I don't have your name stored yet. Tell me and I'll remember it.";

/// 规划前检索的长期记忆条数
const PLAN_MEMORY_TOP_K: usize = 5;

/// 本轮是如何处理的
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnKind {
    /// 记忆指令
    Remembered,
    /// 寒暄，固定回复
    Canned,
    /// 姓名询问，从长期记忆作答
    Identity,
    /// 规划阶段直接回复
    Direct,
    /// 执行了计划
    Executed { success: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    pub kind: TurnKind,
}

/// 根据配置构建三层降级协调器（未配置 Key 的远端不参与）
pub fn create_llm_from_config(cfg: &AppConfig) -> FallbackCoordinator {
    let llm = &cfg.llm;
    let local = Arc::new(OllamaClient::new(
        &llm.ollama.base_url,
        &llm.ollama.model,
        llm.local_timeout(),
    ));
    let mut coordinator = FallbackCoordinator::new(local)
        .with_mode(ProviderMode::parse(&llm.provider))
        .with_policy(llm.cooldown.policy());

    if let Some(key) = llm.groq.key() {
        tracing::info!(model = llm.groq_model(), "Groq tier configured");
        coordinator = coordinator.with_primary(Arc::new(create_groq_client(
            Some(llm.groq_base_url()),
            llm.groq_model(),
            key,
            llm.timeout,
        )));
    }
    if let Some(key) = llm.openai.key() {
        tracing::info!(model = llm.openai_model(), "OpenAI tier configured");
        coordinator = coordinator.with_secondary(Arc::new(OpenAiClient::new(
            "openai",
            llm.openai_base_url(),
            llm.openai_model(),
            key,
            llm.timeout,
        )));
    }
    coordinator
}

/// 内置工具的执行器；require_confirmations 且提供了 confirmer 时开启确认门控
pub fn create_executor(cfg: &AppConfig, confirmer: Option<Arc<dyn Confirm>>) -> ToolExecutor {
    let mut registry = ToolRegistry::new();
    registry.register(RespondTool);
    registry.register(ClarifyTool);
    let executor = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs);
    match confirmer {
        Some(c) if cfg.safety.require_confirmations => executor.with_confirmations(c),
        _ => executor,
    }
}

/// 识别记忆指令，返回要记住的内容（可能为空）
fn remember_content(input: &str) -> Option<&str> {
    let input = input.trim();
    REMEMBER_TRIGGERS.iter().find_map(|trigger| {
        let n = trigger.len();
        let head = input.get(..n)?;
        if !head.eq_ignore_ascii_case(trigger) {
            return None;
        }
        Some(input[n..].trim_start_matches(':').trim())
    })
}

fn canned_reply(input: &str) -> Option<&'static str> {
    let text = input.trim().to_lowercase();
    CANNED_REPLIES
        .iter()
        .find(|(phrase, _)| *phrase == text)
        .map(|(_, reply)| *reply)
}

fn is_identity_query(input: &str) -> bool {
    let text = input.to_lowercase();
    IDENTITY_TRIGGERS.iter().any(|t| text.contains(t))
}

pub struct Agent {
    llm: Arc<dyn LlmClient>,
    planner: Planner,
    decider: DecisionEngine,
    dispatcher: Arc<dyn ToolDispatcher>,
    recovery: RecoveryEngine,
    short_term: ShortTermMemory,
    long_term: FileLongTerm,
    skills: SkillMemory,
    action_log: Box<dyn ActionLog>,
    event_tx: Option<UnboundedSender<ExecutionEvent>>,
}

impl Agent {
    /// 内存中的记忆与日志；用 with_* 替换为文件实现
    pub fn new(llm: Arc<dyn LlmClient>, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            planner: Planner::new(llm.clone()),
            decider: DecisionEngine::new(llm.clone()),
            llm,
            dispatcher,
            recovery: RecoveryEngine::new(),
            short_term: ShortTermMemory::default(),
            long_term: FileLongTerm::in_memory(),
            skills: SkillMemory::in_memory(),
            action_log: Box::new(InMemoryActionLog::new()),
            event_tx: None,
        }
    }

    /// 按配置构建：降级协调器（探测一次本地后端）、文件记忆、JSONL 动作日志
    pub async fn from_config(
        cfg: &AppConfig,
        confirmer: Option<Arc<dyn Confirm>>,
    ) -> anyhow::Result<Self> {
        let coordinator = create_llm_from_config(cfg);
        coordinator.probe_local().await;
        tracing::info!(mode = ?coordinator.effective_mode(), "LLM coordinator ready");

        let long_term = FileLongTerm::open(cfg.data_path(&cfg.memory.long_term_path))?;
        let skills = SkillMemory::open(cfg.data_path(&cfg.memory.skills_path))?;
        let action_log = JsonlActionLog::new(cfg.data_path(&cfg.memory.logs_path));

        Ok(Self::new(
            Arc::new(coordinator),
            Arc::new(create_executor(cfg, confirmer)),
        )
        .with_short_term(ShortTermMemory::new(cfg.memory.short_term_max_items))
        .with_long_term(long_term)
        .with_skills(skills)
        .with_action_log(Box::new(action_log)))
    }

    pub fn with_short_term(mut self, short_term: ShortTermMemory) -> Self {
        self.short_term = short_term;
        self
    }

    pub fn with_long_term(mut self, long_term: FileLongTerm) -> Self {
        self.long_term = long_term;
        self
    }

    pub fn with_skills(mut self, skills: SkillMemory) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_action_log(mut self, log: Box<dyn ActionLog>) -> Self {
        self.action_log = log;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ExecutionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }

    pub fn long_term(&self) -> &FileLongTerm {
        &self.long_term
    }

    pub fn skills(&self) -> &SkillMemory {
        &self.skills
    }

    fn send(&self, ev: ExecutionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn save_long_term(&self) {
        if let Err(e) = self.long_term.save() {
            tracing::warn!(error = %e, "Failed to save long-term memory");
        }
    }

    /// 不经模型的应答：写入短期记忆与带标签的长期对话记录
    fn quick_reply(&mut self, input: &str, text: String, tag: &str, kind: TurnKind) -> TurnReply {
        self.short_term.push(Message::user(input));
        self.short_term.push(Message::assistant(text.clone()));
        self.long_term
            .add(&format!("User: {}\nJARVIS: {}", input, text), &["chat", tag]);
        self.save_long_term();
        TurnReply { text, kind }
    }

    /// 从长期记忆中找第一条提到名字的记录
    fn recall_name(&self) -> String {
        self.long_term
            .search("name", 5)
            .into_iter()
            .map(|hit| hit.entry.text)
            .find(|text| {
                let lower = text.to_lowercase();
                lower.contains("name") || lower.contains("call you")
            })
            .map(|text| format!("You told me your name is: {}", text))
            .unwrap_or_else(|| NAME_UNKNOWN_TEXT.to_string())
    }

    /// 处理一轮输入；总会返回回复
    pub async fn handle_turn(&mut self, input: &str) -> TurnReply {
        let input = input.trim();

        if let Some(content) = remember_content(input) {
            self.short_term.push(Message::user(input));
            let text = if content.is_empty() {
                "What would you like me to remember, Sir?".to_string()
            } else {
                self.long_term.add(content, &["user_memory", "important"]);
                self.save_long_term();
                tracing::info!("Stored user memory");
                format!("Understood, Sir. I will remember: {}", content)
            };
            self.short_term.push(Message::assistant(text.clone()));
            return TurnReply {
                text,
                kind: TurnKind::Remembered,
            };
        }

        if let Some(reply) = canned_reply(input) {
            return self.quick_reply(input, reply.to_string(), "heuristic", TurnKind::Canned);
        }
        if is_identity_query(input) {
            let text = self.recall_name();
            return self.quick_reply(input, text, "identity", TurnKind::Identity);
        }

        self.short_term.push(Message::user(input));
        let history = self.short_term.format_recent(HISTORY_LIMIT);
        let memory = format_hits(&self.long_term.search(input, PLAN_MEMORY_TOP_K));

        let mut steps = match self.planner.plan(input, &history, &memory).await {
            PlannerOutput::Respond(text) => {
                self.short_term.push(Message::assistant(text.clone()));
                self.long_term.add(
                    &format!("User: {}\nJARVIS: {}", input, text),
                    &["chat", "conversation"],
                );
                self.save_long_term();
                return TurnReply {
                    text,
                    kind: TurnKind::Direct,
                };
            }
            PlannerOutput::Steps(steps) => steps,
        };
        self.send(ExecutionEvent::PlanReady { steps: steps.len() });

        let report = {
            let mut session = ExecutionSession::new(
                &self.decider,
                self.dispatcher.as_ref(),
                &self.skills,
                &self.long_term,
                self.action_log.as_ref(),
                &self.recovery,
            );
            if let Some(tx) = &self.event_tx {
                session = session.with_event_tx(tx);
            }
            execute_plan(&session, input, &mut steps).await
        };

        let error = report.error_detail();
        let reflection = reflect(
            self.llm.as_ref(),
            input,
            "plan_execution",
            report.outcome_label(),
            error.as_deref(),
        )
        .await;

        self.short_term
            .push(Message::assistant(reflection.summary.clone()));
        self.long_term.add(input, &["conversation", "user_input"]);
        self.long_term.add(&reflection.summary, &["reflection"]);
        self.long_term.add_task(input, report.outcome_label());
        self.save_long_term();

        for lesson in reflection.lessons {
            self.skills.upsert(lesson);
        }
        if let Err(e) = self.skills.save() {
            tracing::warn!(error = %e, "Failed to save skill memory");
        }

        let mut parts = report.replies.clone();
        match &error {
            Some(detail) => parts.push(format!("I could not complete that, Sir: {}", detail)),
            None if parts.is_empty() => parts.push(reflection.summary.clone()),
            None => {}
        }
        TurnReply {
            text: parts.join("\n"),
            kind: TurnKind::Executed {
                success: report.is_success(),
            },
        }
    }
}

//! 三层降级协调器
//!
//! 固定优先级：Groq（主远端）→ OpenAI（次远端）→ Ollama（本地兜底）。
//! - 未配置 Key 的远端直接跳过；处于冷却期的远端跳过并记日志
//! - 远端失败：限流（429 / "rate limit"）冷却 300s，其它失败冷却 30s，然后尝试下一层；
//!   单一 provider 模式下直接返回错误
//! - 本地层永不报错：不可达或生成失败时合成一条致歉回复，保证上层总能拿到响应
//!
//! 协调器本身实现 LlmClient，构造时组合进 Planner / DecisionEngine，无需额外适配层。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use crate::core::{Clock, SystemClock};
use crate::llm::{LlmClient, LlmResponse, ProviderError};

/// 配置中的 provider 选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// 三层全部参与（默认）
    Hybrid,
    /// 仅 Groq + 本地兜底，Groq 失败直接报错
    Groq,
    /// 仅 OpenAI + 本地兜底，OpenAI 失败直接报错
    OpenAi,
    /// 固定本地
    Local,
}

impl ProviderMode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "groq" => ProviderMode::Groq,
            "openai" => ProviderMode::OpenAi,
            "ollama" | "local" => ProviderMode::Local,
            _ => ProviderMode::Hybrid,
        }
    }

    fn includes(self, tier: RemoteTier) -> bool {
        matches!(
            (self, tier),
            (ProviderMode::Hybrid, _)
                | (ProviderMode::Groq, RemoteTier::Primary)
                | (ProviderMode::OpenAi, RemoteTier::Secondary)
        )
    }
}

/// 两个远端层
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteTier {
    Primary,
    Secondary,
}

impl RemoteTier {
    const ALL: [RemoteTier; 2] = [RemoteTier::Primary, RemoteTier::Secondary];

    fn index(self) -> usize {
        match self {
            RemoteTier::Primary => 0,
            RemoteTier::Secondary => 1,
        }
    }
}

/// 失败后的冷却时长
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub rate_limited: Duration,
    pub failure: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            rate_limited: Duration::from_secs(300),
            failure: Duration::from_secs(30),
        }
    }
}

impl CooldownPolicy {
    pub fn cooldown_for(&self, err: &ProviderError) -> Duration {
        if err.is_rate_limited() {
            self.rate_limited
        } else {
            self.failure
        }
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    cooldown_until: [Option<Instant>; 2],
    local_available: bool,
}

/// 三层降级协调器
pub struct FallbackCoordinator {
    remotes: [Option<Arc<dyn LlmClient>>; 2],
    local: Arc<dyn LlmClient>,
    mode: ProviderMode,
    policy: CooldownPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<ProviderState>,
}

impl FallbackCoordinator {
    pub fn new(local: Arc<dyn LlmClient>) -> Self {
        Self {
            remotes: [None, None],
            local,
            mode: ProviderMode::Hybrid,
            policy: CooldownPolicy::default(),
            clock: Arc::new(SystemClock),
            state: Mutex::new(ProviderState::default()),
        }
    }

    /// 设置主远端（Groq）；仅在配置了 Key 时调用
    pub fn with_primary(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.remotes[RemoteTier::Primary.index()] = Some(client);
        self
    }

    /// 设置次远端（OpenAI）
    pub fn with_secondary(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.remotes[RemoteTier::Secondary.index()] = Some(client);
        self
    }

    pub fn with_mode(mut self, mode: ProviderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_policy(mut self, policy: CooldownPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 配置为本地但存在远端 Key 时升级为 hybrid，远端优先、本地兜底
    pub fn effective_mode(&self) -> ProviderMode {
        let has_remote = self.remotes.iter().any(Option::is_some);
        if self.mode == ProviderMode::Local && has_remote {
            ProviderMode::Hybrid
        } else {
            self.mode
        }
    }

    /// 该远端冷却截止时间（未冷却为 None）
    pub fn cooldown_deadline(&self, tier: RemoteTier) -> Option<Instant> {
        self.lock_state().cooldown_until[tier.index()]
    }

    /// 剩余冷却时长；截止时间已过则为 None
    pub fn cooldown_remaining(&self, tier: RemoteTier) -> Option<Duration> {
        let now = self.clock.now();
        self.cooldown_deadline(tier)
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    pub fn local_available(&self) -> bool {
        self.lock_state().local_available
    }

    /// 探测本地后端并记录结果（启动时调用一次，之后在本地层按需重探）
    pub async fn probe_local(&self) -> bool {
        let ok = self.local.health_check().await;
        self.lock_state().local_available = ok;
        if !ok {
            tracing::warn!(
                "Local backend ({}) not reachable; remote tiers or the canned reply will be used",
                self.local.name()
            );
        }
        ok
    }

    /// 按层级生成；force_local 时直接走本地层
    pub async fn generate_with(
        &self,
        prompt: &str,
        system: Option<&str>,
        force_local: bool,
    ) -> Result<LlmResponse, ProviderError> {
        let mode = self.effective_mode();
        let mut tried: Vec<String> = Vec::new();

        if force_local || mode == ProviderMode::Local {
            tracing::info!("Brain used: local");
            return Ok(self.generate_local(prompt, system, &mut tried).await);
        }

        for tier in RemoteTier::ALL {
            let Some(client) = &self.remotes[tier.index()] else {
                continue;
            };
            if !mode.includes(tier) {
                continue;
            }
            let now = self.clock.now();
            if let Some(until) = self.cooldown_deadline(tier) {
                if now < until {
                    tracing::info!(
                        provider = client.name(),
                        remaining_secs = (until - now).as_secs(),
                        "Skipping provider (cooldown active)"
                    );
                    tried.push(format!("{} (cooling down)", client.name()));
                    continue;
                }
            }

            match client.generate(prompt, system).await {
                Ok(response) => {
                    tracing::info!("Brain used: {}", client.name());
                    return Ok(response);
                }
                Err(e) => {
                    // 冷却从失败时刻起算
                    let failed_at = self.clock.now();
                    let cooldown = self.policy.cooldown_for(&e);
                    self.lock_state().cooldown_until[tier.index()] = Some(failed_at + cooldown);
                    tracing::warn!(
                        provider = client.name(),
                        cooldown_secs = cooldown.as_secs(),
                        "Provider failed ({}). Cooling down.",
                        e
                    );
                    tried.push(client.name().to_string());
                    if mode != ProviderMode::Hybrid {
                        return Err(e);
                    }
                }
            }
        }

        tracing::info!("Brain used: local (tier 3 fallback)");
        Ok(self.generate_local(prompt, system, &mut tried).await)
    }

    async fn generate_local(
        &self,
        prompt: &str,
        system: Option<&str>,
        tried: &mut Vec<String>,
    ) -> LlmResponse {
        tried.push(self.local.name().to_string());

        if !self.local_available() && !self.probe_local().await {
            let err = ProviderError::Unreachable {
                provider: self.local.name(),
                message: "health check failed".to_string(),
            };
            return unreachable_response(tried, &err.to_string());
        }

        match self.local.generate(prompt, system).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Local fallback failed: {}", e);
                unreachable_response(tried, &e.to_string())
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ProviderState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// 所有层都失败时的兜底回复
fn unreachable_response(tried: &[String], error: &str) -> LlmResponse {
    let text = format!(
        "I could not reach any model (tried: {}). \
         Please check that the local Ollama backend is running or configure a working provider. \
         You can still ask me to remember things.",
        tried.join(", ")
    );
    LlmResponse::new(text, json!({"error": error, "tried": tried}))
}

#[async_trait]
impl LlmClient for FallbackCoordinator {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, ProviderError> {
        self.generate_with(prompt, system, false).await
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::llm::MockLlmClient;

    fn rate_limited(provider: &'static str) -> ProviderError {
        ProviderError::Status {
            provider,
            status: 429,
            body: "too many requests".to_string(),
        }
    }

    fn refused(provider: &'static str) -> ProviderError {
        ProviderError::Transport {
            provider,
            message: "connection refused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_local_only_unreachable_never_raises() {
        let local = Arc::new(MockLlmClient::new("ollama").unreachable());
        let coordinator = FallbackCoordinator::new(local.clone());

        let response = coordinator.generate("hello", None).await.unwrap();
        assert!(response.text.contains("could not reach any model"));
        assert!(response.text.contains("ollama"));
        assert_eq!(response.raw["tried"][0], "ollama");
        assert_eq!(response.raw["error"], "ollama not reachable: health check failed");
        assert_eq!(local.call_count(), 0);
    }

    /// 失败前耗尽超时的远端
    struct SlowFailing {
        clock: Arc<ManualClock>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for SlowFailing {
        async fn generate(
            &self,
            _prompt: &str,
            _system: Option<&str>,
        ) -> Result<LlmResponse, ProviderError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.clock.advance(Duration::from_secs(60));
            Err(ProviderError::Transport {
                provider: "groq",
                message: "operation timed out".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "groq"
        }
    }

    #[tokio::test]
    async fn test_cooldown_starts_when_attempt_fails() {
        let clock = Arc::new(ManualClock::new());
        let groq = Arc::new(SlowFailing {
            clock: clock.clone(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let local = Arc::new(MockLlmClient::new("ollama"));
        let coordinator = FallbackCoordinator::new(local)
            .with_primary(groq.clone())
            .with_clock(clock.clone());

        coordinator.generate("q", None).await.unwrap();
        assert_eq!(
            coordinator.cooldown_remaining(RemoteTier::Primary),
            Some(Duration::from_secs(30))
        );

        coordinator.generate("q", None).await.unwrap();
        assert_eq!(groq.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_generation_error_degrades_to_canned_reply() {
        let local = Arc::new(
            MockLlmClient::new("ollama").with_error(ProviderError::EmptyReply { provider: "ollama" }),
        );
        let coordinator = FallbackCoordinator::new(local);

        let response = coordinator.generate("hello", None).await.unwrap();
        assert!(response.text.contains("could not reach any model"));
        assert_eq!(response.raw["error"], "ollama returned an empty response");
    }

    #[tokio::test]
    async fn test_cooldowns_by_error_kind_and_skip_until_deadline() {
        let clock = Arc::new(ManualClock::new());
        let groq = Arc::new(MockLlmClient::new("groq").with_error(rate_limited("groq")));
        let openai = Arc::new(MockLlmClient::new("openai").with_error(refused("openai")));
        let local = Arc::new(MockLlmClient::new("ollama"));
        local.push_reply("local one");
        local.push_reply("local two");

        let coordinator = FallbackCoordinator::new(local.clone())
            .with_primary(groq.clone())
            .with_secondary(openai.clone())
            .with_clock(clock.clone());

        let first = coordinator.generate("q", None).await.unwrap();
        assert_eq!(first.text, "local one");
        assert_eq!(
            coordinator.cooldown_remaining(RemoteTier::Primary),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            coordinator.cooldown_remaining(RemoteTier::Secondary),
            Some(Duration::from_secs(30))
        );

        // 截止前再次调用：两个远端都被跳过
        clock.advance(Duration::from_secs(10));
        let second = coordinator.generate("q", None).await.unwrap();
        assert_eq!(second.text, "local two");
        assert_eq!(groq.call_count(), 1);
        assert_eq!(openai.call_count(), 1);

        // 次远端冷却结束后恢复尝试，主远端仍在冷却
        clock.advance(Duration::from_secs(21));
        openai.push_reply("openai back");
        let third = coordinator.generate("q", None).await.unwrap();
        assert_eq!(third.text, "openai back");
        assert_eq!(groq.call_count(), 1);
        assert_eq!(openai.call_count(), 2);
    }

    #[tokio::test]
    async fn test_primary_recovers_after_deadline() {
        let clock = Arc::new(ManualClock::new());
        let groq = Arc::new(MockLlmClient::new("groq").with_error(refused("groq")));
        let coordinator = FallbackCoordinator::new(Arc::new(MockLlmClient::new("ollama")))
            .with_primary(groq.clone())
            .with_clock(clock.clone());

        coordinator.generate("q", None).await.unwrap();
        assert_eq!(
            coordinator.cooldown_remaining(RemoteTier::Primary),
            Some(Duration::from_secs(30))
        );

        clock.advance(Duration::from_secs(30));
        assert_eq!(coordinator.cooldown_remaining(RemoteTier::Primary), None);
        groq.push_reply("groq answer");
        let response = coordinator.generate("q", None).await.unwrap();
        assert_eq!(response.text, "groq answer");
        assert_eq!(groq.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_text_marker_uses_long_cooldown() {
        let groq = Arc::new(MockLlmClient::new("groq").with_error(ProviderError::Transport {
            provider: "groq",
            message: "upstream said: Rate limit exceeded".to_string(),
        }));
        let coordinator =
            FallbackCoordinator::new(Arc::new(MockLlmClient::new("ollama"))).with_primary(groq);

        coordinator.generate("q", None).await.unwrap();
        let remaining = coordinator.cooldown_remaining(RemoteTier::Primary).unwrap();
        assert!(remaining > Duration::from_secs(290));
    }

    #[tokio::test]
    async fn test_single_provider_mode_propagates_failure() {
        let groq = Arc::new(MockLlmClient::new("groq").with_error(refused("groq")));
        let local = Arc::new(MockLlmClient::new("ollama"));
        let coordinator = FallbackCoordinator::new(local.clone())
            .with_primary(groq)
            .with_mode(ProviderMode::Groq);

        let err = coordinator.generate("q", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport { provider: "groq", .. }));
        assert_eq!(local.call_count(), 0);
        assert!(coordinator.cooldown_deadline(RemoteTier::Primary).is_some());
    }

    #[tokio::test]
    async fn test_unconfigured_remote_is_skipped() {
        let openai = Arc::new(MockLlmClient::new("openai").with_reply("from openai"));
        let coordinator = FallbackCoordinator::new(Arc::new(MockLlmClient::new("ollama")))
            .with_secondary(openai);

        let response = coordinator.generate("q", None).await.unwrap();
        assert_eq!(response.text, "from openai");
    }

    #[tokio::test]
    async fn test_force_local_skips_remotes() {
        let groq = Arc::new(MockLlmClient::new("groq").with_reply("remote"));
        let local = Arc::new(MockLlmClient::new("ollama").with_reply("local"));
        let coordinator = FallbackCoordinator::new(local).with_primary(groq.clone());

        let response = coordinator.generate_with("q", None, true).await.unwrap();
        assert_eq!(response.text, "local");
        assert_eq!(groq.call_count(), 0);
    }

    #[test]
    fn test_local_mode_upgrades_when_remote_configured() {
        let local_only = FallbackCoordinator::new(Arc::new(MockLlmClient::new("ollama")))
            .with_mode(ProviderMode::parse("ollama"));
        assert_eq!(local_only.effective_mode(), ProviderMode::Local);

        let with_key = FallbackCoordinator::new(Arc::new(MockLlmClient::new("ollama")))
            .with_primary(Arc::new(MockLlmClient::new("groq")))
            .with_mode(ProviderMode::Local);
        assert_eq!(with_key.effective_mode(), ProviderMode::Hybrid);
    }

    #[test]
    fn test_provider_mode_parse() {
        assert_eq!(ProviderMode::parse("GROQ"), ProviderMode::Groq);
        assert_eq!(ProviderMode::parse("openai"), ProviderMode::OpenAi);
        assert_eq!(ProviderMode::parse("local"), ProviderMode::Local);
        assert_eq!(ProviderMode::parse("hybrid"), ProviderMode::Hybrid);
        assert_eq!(ProviderMode::parse("anything"), ProviderMode::Hybrid);
    }
}

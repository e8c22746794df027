//! Jarvis - 本地个人助理
//!
//! 入口：初始化日志、加载配置、构建 Agent，并运行终端 REPL。
//! 执行事件通过通道推送给打印任务，确认提示读 stdin。
//!
//! 运行方式：
//! ```bash
//! cargo run -- config/local.toml
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use jarvis::agent::Agent;
use jarvis::config::load_config;
use jarvis::react::ExecutionEvent;
use jarvis::tools::Confirm;

/// 终端确认：打印提示并读取一行，y / yes 视为同意
struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            print!("{} [y/N] ", prompt);
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return false;
            }
            matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
        })
        .await
        .unwrap_or(false)
    }
}

fn print_prompt() {
    print!("You> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jarvis::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<ExecutionEvent>();
    tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            if let ExecutionEvent::Thinking { text } = &ev {
                println!("JARVIS (Thinking)> {}", text);
            } else if let Some(line) = ev.status_line() {
                println!("{}", line);
            }
        }
    });

    let confirmer: Arc<dyn Confirm> = Arc::new(StdinConfirm);
    let mut agent = Agent::from_config(&cfg, Some(confirmer))
        .await
        .context("Failed to create agent")?
        .with_event_tx(event_tx);

    println!("STATUS: Online");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_prompt();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        if input.is_empty() {
            print_prompt();
            continue;
        }
        if cfg.safety.is_kill_switch(input) {
            println!("JARVIS stopped by user.");
            break;
        }
        let reply = agent.handle_turn(input).await;
        println!("JARVIS> {}", reply.text);
        print_prompt();
    }

    tracing::info!("Session ended");
    Ok(())
}

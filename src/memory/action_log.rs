//! 动作日志：每次步骤尝试追加一行 JSON（JSON Lines）
//!
//! 写入失败只记 warn，不影响执行流程。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// 一次尝试的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub task: String,
    pub decision: String,
    pub outcome: String,
    pub error: Option<String>,
    pub timestamp: String,
}

/// 动作日志接口（fire-and-forget）
pub trait ActionLog: Send + Sync {
    fn log(&self, task: &str, decision: &str, outcome: &str, error: Option<&str>);
}

fn record(task: &str, decision: &str, outcome: &str, error: Option<&str>) -> ActionRecord {
    ActionRecord {
        task: task.to_string(),
        decision: decision.to_string(),
        outcome: outcome.to_string(),
        error: error.map(str::to_string),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// 追加写入 JSONL 文件
#[derive(Debug)]
pub struct JsonlActionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlActionLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, rec: &ActionRecord) -> anyhow::Result<()> {
        let _guard = match self.lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(rec)?)?;
        Ok(())
    }

    /// 读回全部记录；坏行跳过
    pub fn read_all(&self) -> anyhow::Result<Vec<ActionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(data
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl ActionLog for JsonlActionLog {
    fn log(&self, task: &str, decision: &str, outcome: &str, error: Option<&str>) {
        let rec = record(task, decision, outcome, error);
        if let Err(e) = self.append(&rec) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write action log");
        }
    }
}

/// 内存实现，供测试与不落盘场景
#[derive(Debug, Default)]
pub struct InMemoryActionLog {
    records: Mutex<Vec<ActionRecord>>,
}

impl InMemoryActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActionRecord> {
        match self.records.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ActionLog for InMemoryActionLog {
    fn log(&self, task: &str, decision: &str, outcome: &str, error: Option<&str>) {
        let rec = record(task, decision, outcome, error);
        match self.records.lock() {
            Ok(mut g) => g.push(rec),
            Err(poisoned) => poisoned.into_inner().push(rec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlActionLog::new(dir.path().join("logs").join("actions.jsonl"));
        log.log("step:s1:open chrome", "open_app(chrome)", "success", None);
        log.log("step:s1:retry", "open_app(Google Chrome)", "failed", Some("boom"));

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].task, "step:s1:open chrome");
        assert_eq!(records[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // 目录本身不能作为文件打开
        let log = JsonlActionLog::new(dir.path());
        log.log("t", "d", "failed", None);
    }

    #[test]
    fn test_in_memory_log() {
        let log = InMemoryActionLog::new();
        log.log("t", "respond(hi)", "success", None);
        assert_eq!(log.records()[0].decision, "respond(hi)");
    }
}

//! 长期记忆：对话、反思摘要、用户显式要求记住的内容，跨会话检索
//!
//! 文件格式 {version, preferences, entries, tasks}；每条 entry 带一个归一化词袋向量，
//! search 以点积（即余弦相似度）排序，低于 min_score 的结果丢弃。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// 默认最低相似度
pub const DEFAULT_MIN_SCORE: f64 = 0.1;

/// 用户记忆标签：检索结果中优先展示
pub const USER_MEMORY_TAGS: [&str; 2] = ["user_memory", "important"];

/// 长期记忆 trait：写入与相似度检索
pub trait LongTermMemory: Send + Sync {
    /// 存入一段文本及标签
    fn add(&self, text: &str, tags: &[&str]);

    /// 按查询检索最相关的 top_k 条
    fn search(&self, query: &str, top_k: usize) -> Vec<MemoryHit>;
}

/// 空实现：未启用长期记忆时使用
#[derive(Clone, Default)]
pub struct NoopLongTerm;

impl LongTermMemory for NoopLongTerm {
    fn add(&self, _text: &str, _tags: &[&str]) {}

    fn search(&self, _query: &str, _top_k: usize) -> Vec<MemoryHit> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub entry_id: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub embedding: HashMap<String, f64>,
    pub timestamp: String,
}

impl MemoryEntry {
    pub fn is_user_memory(&self) -> bool {
        self.tags.iter().any(|t| USER_MEMORY_TAGS.contains(&t.as_str()))
    }
}

/// 检索命中：相似度 + 条目
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHit {
    pub score: f64,
    pub entry: MemoryEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub goal: String,
    pub outcome: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LongTermData {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    preferences: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    entries: Vec<MemoryEntry>,
    #[serde(default)]
    tasks: Vec<TaskRecord>,
}

fn default_version() -> u32 {
    1
}

impl Default for LongTermData {
    fn default() -> Self {
        Self {
            version: default_version(),
            preferences: serde_json::Map::new(),
            entries: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

/// 小写后按非字母数字切分（等价于 [a-z0-9]+）
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

/// 归一化词频向量
pub fn embed(text: &str) -> HashMap<String, f64> {
    let mut counts: HashMap<String, f64> = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0.0) += 1.0;
    }
    let norm = counts.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm = if norm == 0.0 { 1.0 } else { norm };
    counts.values_mut().for_each(|v| *v /= norm);
    counts
}

/// 两个归一化向量的点积
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(token, v)| large.get(token).map(|w| v * w))
        .sum()
}

/// JSON 文件型长期记忆；path 为 None 时只在内存中
#[derive(Debug)]
pub struct FileLongTerm {
    path: Option<PathBuf>,
    data: RwLock<LongTermData>,
}

impl FileLongTerm {
    /// 绑定文件并加载；文件不存在时为空
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            LongTermData::default()
        };
        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(LongTermData::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LongTermData> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, LongTermData> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_entry(&self, text: &str, tags: &[&str]) -> MemoryEntry {
        let entry = MemoryEntry {
            entry_id: format!("mem_{}", uuid::Uuid::new_v4().simple()),
            text: text.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            embedding: embed(text),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        self.write().entries.push(entry.clone());
        entry
    }

    pub fn add_task(&self, goal: &str, outcome: &str) {
        self.write().tasks.push(TaskRecord {
            goal: goal.to_string(),
            outcome: outcome.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.read().tasks.clone()
    }

    pub fn set_preference(&self, key: &str, value: serde_json::Value) {
        self.write().preferences.insert(key.to_string(), value);
    }

    pub fn get_preference(&self, key: &str) -> Option<serde_json::Value> {
        self.read().preferences.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// 按相似度降序返回不低于 min_score 的前 top_k 条
    pub fn search_with(&self, query: &str, top_k: usize, min_score: f64) -> Vec<MemoryHit> {
        let query_vec = embed(query);
        let data = self.read();
        let mut hits: Vec<MemoryHit> = data
            .entries
            .iter()
            .map(|entry| MemoryHit {
                score: cosine_similarity(&query_vec, &entry.embedding),
                entry: entry.clone(),
            })
            .filter(|hit| hit.score >= min_score)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        hits
    }

    /// 写回 JSON 文件；父目录不存在时自动创建
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*self.read())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl LongTermMemory for FileLongTerm {
    fn add(&self, text: &str, tags: &[&str]) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.add_entry(text, tags);
    }

    fn search(&self, query: &str, top_k: usize) -> Vec<MemoryHit> {
        self.search_with(query, top_k, DEFAULT_MIN_SCORE)
    }
}

/// 格式化为 prompt 中的长期记忆段落：用户记忆优先，其余带相似度分数
pub fn format_hits(hits: &[MemoryHit]) -> String {
    if hits.is_empty() {
        return "(none)".to_string();
    }
    let (user, other): (Vec<&MemoryHit>, Vec<&MemoryHit>) =
        hits.iter().partition(|h| h.entry.is_user_memory());

    let mut lines = Vec::new();
    if !user.is_empty() {
        lines.push("IMPORTANT USER MEMORIES (use these to answer questions):".to_string());
        lines.extend(user.iter().map(|h| format!("  * {}", h.entry.text)));
    }
    if !other.is_empty() {
        if !user.is_empty() {
            lines.push("\nOther relevant context:".to_string());
        }
        lines.extend(
            other
                .iter()
                .map(|h| format!("  - (score: {:.2}) {}", h.score, h.entry.text)),
        );
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_is_normalized() {
        let v = embed("Open open CHROME!");
        let norm: f64 = v.values().map(|x| x * x).sum();
        assert!((norm - 1.0).abs() < 1e-9);
        assert!(v.contains_key("open"));
        assert!(v.contains_key("chrome"));
        assert!(embed("!!!").is_empty());
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let store = FileLongTerm::in_memory();
        store.add("my name is Tony", &["user_memory", "important"]);
        store.add("opened chrome for the user", &["chat"]);
        store.add("weather is sunny", &["chat"]);

        let hits = store.search("what is my name", 3);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].entry.text, "my name is Tony");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        assert!(store.search("xylophone", 3).is_empty());
    }

    #[test]
    fn test_blank_text_not_stored() {
        let store = FileLongTerm::in_memory();
        store.add("   ", &[]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long_term.json");
        let store = FileLongTerm::open(&path).unwrap();
        store.add_entry("remember the milk", &["user_memory"]);
        store.add_task("buy milk", "success");
        store.set_preference("voice", serde_json::json!("calm"));
        store.save().unwrap();

        let reloaded = FileLongTerm::open(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.tasks()[0].outcome, "success");
        assert_eq!(reloaded.get_preference("voice"), Some(serde_json::json!("calm")));
        assert_eq!(reloaded.search("milk", 1)[0].entry.text, "remember the milk");
    }

    #[test]
    fn test_format_hits_puts_user_memories_first() {
        assert_eq!(format_hits(&[]), "(none)");

        let store = FileLongTerm::in_memory();
        let chat = store.add_entry("talked about chrome", &["chat"]);
        let name = store.add_entry("name is Tony", &["important"]);
        let hits = vec![
            MemoryHit { score: 0.5, entry: chat },
            MemoryHit { score: 0.4, entry: name },
        ];
        let text = format_hits(&hits);
        let user_pos = text.find("name is Tony").unwrap();
        let other_pos = text.find("(score: 0.50) talked about chrome").unwrap();
        assert!(text.starts_with("IMPORTANT USER MEMORIES"));
        assert!(user_pos < other_pos);
        assert!(text.contains("Other relevant context:"));
    }
}

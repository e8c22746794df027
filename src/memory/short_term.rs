//! 短期记忆：本次会话的对话历史
//!
//! 只保留最近 max_items 条，超出时丢弃最旧的；规划时取最近 10 条拼入 prompt。

use serde::{Deserialize, Serialize};

/// 规划 prompt 使用的历史条数
pub const HISTORY_LIMIT: usize = 10;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Jarvis",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShortTermMemory {
    items: Vec<Message>,
    max_items: usize,
}

impl Default for ShortTermMemory {
    fn default() -> Self {
        Self::new(50)
    }
}

impl ShortTermMemory {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            max_items: max_items.max(1),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.items.push(msg);
        self.prune();
    }

    /// 最近 limit 条，按时间先后
    pub fn recent(&self, limit: usize) -> &[Message] {
        let start = self.items.len().saturating_sub(limit);
        &self.items[start..]
    }

    /// "User: …" / "Jarvis: …" 每行一条
    pub fn format_recent(&self, limit: usize) -> String {
        self.recent(limit)
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn prune(&mut self) {
        if self.items.len() > self.max_items {
            let overflow = self.items.len() - self.max_items;
            self.items.drain(..overflow);
        }
    }
}

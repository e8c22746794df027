//! 记忆层：短期（会话历史）、长期（相似度检索）、技能（经验教训）、动作日志

pub mod action_log;
pub mod long_term;
pub mod short_term;
pub mod skills;

pub use action_log::{ActionLog, ActionRecord, InMemoryActionLog, JsonlActionLog};
pub use long_term::{format_hits, FileLongTerm, LongTermMemory, MemoryEntry, MemoryHit, NoopLongTerm};
pub use short_term::{Message, Role, ShortTermMemory, HISTORY_LIMIT};
pub use skills::{format_lessons, LessonSource, SkillLesson, SkillMemory};

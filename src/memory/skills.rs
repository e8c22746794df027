//! 技能记忆：反思得到的经验教训（context / problem / lesson / confidence）
//!
//! 持久化为单个 JSON 文件 {version, lessons: [...]}；执行步骤前按步骤描述检索相关教训，
//! 失败重试时注入决策 prompt。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 一条经验教训
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillLesson {
    pub context: String,
    pub problem: String,
    pub lesson: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

impl SkillLesson {
    /// context / problem / lesson 任一为空的教训不入库
    pub fn is_complete(&self) -> bool {
        !self.context.trim().is_empty()
            && !self.problem.trim().is_empty()
            && !self.lesson.trim().is_empty()
    }
}

/// 教训检索接口：执行循环只依赖这一个查询形态
pub trait LessonSource: Send + Sync {
    fn relevant(&self, text: &str, limit: usize) -> Vec<SkillLesson>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SkillFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    lessons: Vec<SkillLesson>,
}

fn default_version() -> u32 {
    1
}

/// 文件型技能记忆
#[derive(Debug, Clone)]
pub struct SkillMemory {
    path: Option<PathBuf>,
    version: u32,
    lessons: Vec<SkillLesson>,
}

impl SkillMemory {
    /// 绑定文件路径并加载；文件不存在时为空
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut memory = Self {
            path: Some(path.as_ref().to_path_buf()),
            version: default_version(),
            lessons: Vec::new(),
        };
        memory.load()?;
        Ok(memory)
    }

    /// 不落盘的实现（测试与无持久化场景）
    pub fn in_memory() -> Self {
        Self {
            path: None,
            version: default_version(),
            lessons: Vec::new(),
        }
    }

    pub fn load(&mut self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let data = std::fs::read_to_string(path)?;
        let file: SkillFile = serde_json::from_str(&data)?;
        self.version = file.version;
        self.lessons = file.lessons;
        Ok(())
    }

    /// 写回 JSON 文件；父目录不存在时自动创建
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = SkillFile {
            version: self.version,
            lessons: self.lessons.clone(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// 以 (context, problem) 为键插入或更新；不完整的教训直接忽略
    pub fn upsert(&mut self, lesson: SkillLesson) {
        if !lesson.is_complete() {
            return;
        }
        if let Some(existing) = self
            .lessons
            .iter_mut()
            .find(|l| l.context == lesson.context && l.problem == lesson.problem)
        {
            existing.lesson = lesson.lesson;
            existing.confidence = lesson.confidence;
            return;
        }
        self.lessons.push(lesson);
    }

    pub fn lessons(&self) -> &[SkillLesson] {
        &self.lessons
    }

    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }
}

impl LessonSource for SkillMemory {
    /// context 或 problem 出现在文本中（大小写不敏感）即视为相关
    fn relevant(&self, text: &str, limit: usize) -> Vec<SkillLesson> {
        let haystack = text.to_lowercase();
        let appears = |needle: &str| {
            let needle = needle.trim().to_lowercase();
            !needle.is_empty() && haystack.contains(&needle)
        };
        self.lessons
            .iter()
            .filter(|l| appears(&l.context) || appears(&l.problem))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// 格式化为决策 prompt 中的教训段落
pub fn format_lessons(lessons: &[SkillLesson]) -> String {
    if lessons.is_empty() {
        return "(none)".to_string();
    }
    lessons
        .iter()
        .map(|l| {
            format!(
                "- context: {}; problem: {}; lesson: {}; confidence: {}",
                l.context, l.problem, l.lesson, l.confidence
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

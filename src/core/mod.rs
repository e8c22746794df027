//! 核心层：错误与恢复策略、可注入时钟

pub mod clock;
pub mod error;
pub mod recovery;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AgentError, RecoveryAction};
pub use recovery::{RecoveryEngine, MAX_STEP_RETRIES};

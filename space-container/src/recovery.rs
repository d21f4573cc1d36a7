//! 恢复策略（RecoveryPolicy）与失败监听（FailureListener）
//!
//! 决策表：
//! - 致命错误（配置/类型不匹配）：上报后 worker 直接停止，不重试；
//! - 连续失败次数达到 `pause_after_consecutive_failures`（0 表示永不暂停）：
//!   上报后 worker 进入暂停，等待 `resume()`；
//! - 其余失败：上报，等待 `recovery_interval` 后重试。
//!
//! 每次失败都会在退避或状态迁移之前上报给失败监听器。
//!
use crate::error::{ContainerError, FailureKind};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 恢复动作
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry { backoff: Duration },
    Pause,
    Stop,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry { backoff } => write!(f, "retry after {backoff:?}"),
            Self::Pause => f.write_str("pause"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RecoveryPolicy {
    pub recovery_interval: Duration,
    pub pause_after_consecutive_failures: u32,
}

impl RecoveryPolicy {
    /// `consecutive_failures` 为计入本次失败后的连续失败次数
    pub fn decide(&self, error: &ContainerError, consecutive_failures: u32) -> RecoveryAction {
        if error.is_fatal() {
            return RecoveryAction::Stop;
        }
        let threshold = self.pause_after_consecutive_failures;
        if threshold > 0 && consecutive_failures >= threshold {
            return RecoveryAction::Pause;
        }
        RecoveryAction::Retry {
            backoff: self.recovery_interval,
        }
    }
}

/// 上报给失败监听器的一次失败
#[derive(Clone, Debug)]
pub struct WorkerFailure {
    pub container: Arc<str>,
    pub worker: usize,
    pub kind: FailureKind,
    pub error: Arc<ContainerError>,
    pub consecutive_failures: u32,
    pub action: RecoveryAction,
}

/// 失败监听器
///
/// 会被多个 worker 并发调用，实现必须自身线程安全（`Send + Sync`），
/// 不能假设单调用者。回调中不应长时间阻塞，它运行在 worker 的任务上。
pub trait FailureListener: Send + Sync {
    fn on_failure(&self, failure: &WorkerFailure);
}

impl<F> FailureListener for F
where
    F: Fn(&WorkerFailure) + Send + Sync,
{
    fn on_failure(&self, failure: &WorkerFailure) {
        self(failure)
    }
}

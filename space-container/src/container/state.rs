use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// worker 状态
///
/// `Idle → Waiting → Processing → Idle` 为正常循环；失败进入 `Recovering`，
/// 之后回到 `Idle`、升级为 `Paused`（等待 `resume()`）或终止于 `Stopped`。
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Idle = 0,
    Waiting = 1,
    Processing = 2,
    Recovering = 3,
    Paused = 4,
    Stopped = 5,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Waiting,
            2 => Self::Processing,
            3 => Self::Recovering,
            4 => Self::Paused,
            _ => Self::Stopped,
        }
    }

    /// 可以立刻接手新条目的状态
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle | Self::Waiting)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// worker 与容器共享的状态单元，单写多读
#[derive(Debug)]
pub(crate) struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
    pub(crate) fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// 容器生命周期状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerState {
    Created,
    Initialized,
    Started,
    Paused,
    Stopped,
    Destroyed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 经 watch 通道广播给 worker 的控制信号
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Control {
    /// 容器级暂停
    pub(crate) paused: bool,
    /// 每次 `resume()` 递增，自动暂停的 worker 据此恢复
    pub(crate) resume_epoch: u64,
}


//! 容器子系统（container）
//!
//! - `ContainerConfig`：并发上下限、取数超时、事务、恢复与批量等配置；
//! - `Container`：生命周期状态机（start/stop/pause/resume/destroy）与扩缩容；
//! - worker：每个 worker 是一个独立调度的 tokio 任务，顺序执行
//!   取模板 → 取数 → 事务 → 分发 → 恢复 的循环。
//!
pub mod config;
pub mod engine;
pub mod state;
pub mod stats;
mod worker;

pub use config::ContainerConfig;
pub use engine::Container;
pub use state::{ContainerState, WorkerState};
pub use stats::StatsSnapshot;

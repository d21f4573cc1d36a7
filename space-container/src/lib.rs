//! 空间事件容器（space-container）
//!
//! 在分布式内存数据网格（“空间”）之上注册监听器：一旦有匹配的数据出现，
//! 监听器即被调用。本 crate 提供其中的事件消费引擎：
//! - 空间访问协议（`space`）与内存实现；
//! - 可插拔的取数策略（`receive`）：单条、批量、异步；
//! - 查询源（`query`）：静态或每轮求值的动态模板；
//! - 事务范围（`transaction`）：提交/回滚一次“取数 + 分发”；
//! - 监听器与调用器（`listener`）；
//! - 恢复策略与失败监听（`recovery`）；
//! - 容器（`container`）：worker 池、生命周期与扩缩容。
//!
//! 网格自身的匹配/索引、传输协议与持久化都不在本 crate 范围内，
//! 仅通过 `Space` 与 `TransactionManager` 协议对接。
//!
//! 典型用法：
//! 1. 准备 `Space` 实现（测试/本地可用 `InMemorySpace`）与 `SpaceListener`；
//! 2. 以 `Container::builder()` 组装容器并给出 `ContainerConfig`；
//! 3. `initialize()`（`auto_start` 时自动启动），运行中可 `pause/resume`；
//! 4. `stop(true)` 优雅停止，`destroy()` 释放。
//!
pub mod container;
pub mod error;
pub mod listener;
pub mod query;
pub mod receive;
pub mod recovery;
pub mod space;
pub mod transaction;

pub use container::{Container, ContainerConfig, ContainerState, StatsSnapshot, WorkerState};
pub use error::{ContainerError, ContainerResult, FailureKind};
pub use listener::{HandledData, InvocationContext, ListenerData, SpaceListener};
pub use query::{DynamicQuery, QuerySource};
pub use receive::{ReceiveOutcome, ReceiveStrategy};
pub use recovery::{FailureListener, RecoveryAction, RecoveryPolicy, WorkerFailure};
pub use space::{InMemorySpace, Space, SpaceItem, Template};
pub use transaction::{Disposition, Invocation, Transaction, TransactionManager};

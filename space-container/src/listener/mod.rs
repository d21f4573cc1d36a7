//! 监听器子系统（listener）
//!
//! - `SpaceListener`：用户处理逻辑；
//! - `ListenerInvoker`：按单条/整批形态分发，不负责重试。
//!
pub mod handler;
pub mod invoker;

pub use handler::{HandledData, InvocationContext, ListenerData, SpaceListener};
pub use invoker::{ListenerInvoker, Received};

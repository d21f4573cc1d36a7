//! 空间（Space）协议
//!
//! 数据网格对引擎而言是不透明的远端服务：引擎只需要“按模板在超时内取走条目”
//! 这一能力，以及可选的事务参与。匹配/索引算法、传输协议都不在此定义。
//!
//! - `take`：阻塞至多 `timeout`，超时无匹配返回 `Ok(None)`；
//! - `take_multiple`：一次取走至多 `max_items` 条；
//! - `take_async`：立即发起取数并返回 `'static` future，稍后完成；
//! - 传入事务时，取走的条目在提交前都是临时的。
//!
pub mod inmemory;
pub mod item;
pub mod template;

pub use inmemory::InMemorySpace;
pub use item::SpaceItem;
pub use template::Template;

use crate::{error::ContainerResult as Result, transaction::Transaction};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::time::Duration;

/// 数据网格的最小访问面
#[async_trait]
pub trait Space: Send + Sync {
    /// 空间名称（用于日志与错误）
    fn name(&self) -> &str;

    async fn write(&self, item: SpaceItem) -> Result<()>;

    async fn take(
        &self,
        template: &Template,
        tx: Option<&Transaction>,
        timeout: Duration,
    ) -> Result<Option<SpaceItem>>;

    async fn take_multiple(
        &self,
        template: &Template,
        tx: Option<&Transaction>,
        max_items: usize,
        timeout: Duration,
    ) -> Result<Vec<SpaceItem>>;

    /// 非阻塞发起一次取数，返回的 future 在条目到达或超时后完成
    fn take_async(
        &self,
        template: Template,
        tx: Option<&Transaction>,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<Option<SpaceItem>>>;
}

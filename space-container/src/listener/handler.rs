//! 空间监听器（SpaceListener）
//!
//! 定义消费条目的处理逻辑与元信息（名称、可接收的数据形态）。
//!
use crate::space::SpaceItem;
use async_trait::async_trait;
use std::sync::Arc;

/// 监听器可接收的数据形态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandledData {
    Single,
    Batch,
    Any,
}

impl HandledData {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Batch => "batch",
            Self::Any => "any",
        }
    }

    pub fn accepts(&self, data: &ListenerData) -> bool {
        matches!(
            (self, data),
            (Self::Any, _)
                | (Self::Single, ListenerData::Single(_))
                | (Self::Batch, ListenerData::Batch(_))
        )
    }
}

/// 交给监听器的数据
#[derive(Clone, Debug)]
pub enum ListenerData {
    Single(SpaceItem),
    Batch(Vec<SpaceItem>),
}

impl ListenerData {
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Batch(_) => "batch",
        }
    }

    /// 展平为条目列表
    pub fn into_items(self) -> Vec<SpaceItem> {
        match self {
            Self::Single(item) => vec![item],
            Self::Batch(items) => items,
        }
    }
}

/// 调用上下文：来源容器、worker 序号与事务状态
#[derive(Clone, Debug)]
pub struct InvocationContext {
    pub container: Arc<str>,
    pub worker: usize,
    /// 当前事务 ID，非事务配置下为 `None`
    pub transaction: Option<u64>,
}

impl InvocationContext {
    pub fn is_transactional(&self) -> bool {
        self.transaction.is_some()
    }
}

/// 空间监听器
#[async_trait]
pub trait SpaceListener: Send + Sync {
    /// 监听器名称（用于日志与失败上报）
    fn listener_name(&self) -> &str;

    fn handled_data(&self) -> HandledData {
        HandledData::Single
    }

    async fn on_data(&self, data: ListenerData, ctx: &InvocationContext) -> anyhow::Result<()>;
}

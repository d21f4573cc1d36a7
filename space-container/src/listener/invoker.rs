//! 监听器调用器（ListenerInvoker）
//!
//! 把取到的条目按配置的形态交给监听器：`pass_batch_as_array` 为真时整批一次调用，
//! 否则逐条调用并在首个错误处停止。调用器自身从不重试，错误交由 worker 分类。
//!
use super::{InvocationContext, ListenerData, SpaceListener};
use crate::error::{ContainerError, ContainerResult as Result};
use crate::space::SpaceItem;
use std::sync::Arc;

/// 取到的条目
#[derive(Debug)]
pub enum Received {
    Single(SpaceItem),
    Batch(Vec<SpaceItem>),
}

#[derive(Clone)]
pub struct ListenerInvoker {
    listener: Arc<dyn SpaceListener>,
    pass_batch_as_array: bool,
}

impl ListenerInvoker {
    pub fn new(listener: Arc<dyn SpaceListener>, pass_batch_as_array: bool) -> Self {
        Self {
            listener,
            pass_batch_as_array,
        }
    }

    pub fn listener_name(&self) -> &str {
        self.listener.listener_name()
    }

    pub async fn dispatch(&self, received: Received, ctx: &InvocationContext) -> Result<()> {
        match received {
            Received::Single(item) => self.invoke(ListenerData::Single(item), ctx).await,
            Received::Batch(items) if self.pass_batch_as_array => {
                self.invoke(ListenerData::Batch(items), ctx).await
            }
            Received::Batch(items) => {
                for item in items {
                    self.invoke(ListenerData::Single(item), ctx).await?;
                }
                Ok(())
            }
        }
    }

    async fn invoke(&self, data: ListenerData, ctx: &InvocationContext) -> Result<()> {
        let handled = self.listener.handled_data();
        if !handled.accepts(&data) {
            return Err(ContainerError::TypeMismatch {
                expected: handled.as_str(),
                found: data.shape(),
            });
        }
        self.listener
            .on_data(data, ctx)
            .await
            .map_err(|e| ContainerError::from_listener(self.listener.listener_name(), e))
    }
}

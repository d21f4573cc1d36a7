//! 取数策略（ReceiveStrategy）
//!
//! 一次阻塞取数，至多等待 `timeout`。策略是封闭的三种：
//! - `SingleTake`：取走一个匹配条目；
//! - `MultiTake`：一次取走至多 `max_items` 个匹配条目；
//! - `AsyncTake`：发起非阻塞取数，worker 挂起在返回的 future 上。
//!
//! 超时无匹配得到 `Empty`，不是失败；空间错误得到 `Failure`。
//!
use crate::error::ContainerError;
use crate::space::{Space, SpaceItem, Template};
use crate::transaction::Transaction;
use std::time::Duration;

/// 一次取数的结果，每次调用恰好产生一个
#[derive(Debug)]
pub enum ReceiveOutcome {
    Empty,
    Single(SpaceItem),
    Batch(Vec<SpaceItem>),
    Failure(ContainerError),
}

impl ReceiveOutcome {
    pub fn item_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(items) => items.len(),
            Self::Empty | Self::Failure(_) => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReceiveStrategy {
    #[default]
    SingleTake,
    MultiTake {
        max_items: usize,
    },
    AsyncTake,
}

impl ReceiveStrategy {
    pub async fn receive(
        &self,
        space: &dyn Space,
        template: &Template,
        tx: Option<&Transaction>,
        timeout: Duration,
    ) -> ReceiveOutcome {
        match self {
            Self::SingleTake => match space.take(template, tx, timeout).await {
                Ok(Some(item)) => ReceiveOutcome::Single(item),
                Ok(None) => ReceiveOutcome::Empty,
                Err(e) => ReceiveOutcome::Failure(e),
            },
            Self::MultiTake { max_items } => {
                match space.take_multiple(template, tx, *max_items, timeout).await {
                    Ok(items) if items.is_empty() => ReceiveOutcome::Empty,
                    Ok(items) => ReceiveOutcome::Batch(items),
                    Err(e) => ReceiveOutcome::Failure(e),
                }
            }
            Self::AsyncTake => match space.take_async(template.clone(), tx, timeout).await {
                Ok(Some(item)) => ReceiveOutcome::Single(item),
                Ok(None) => ReceiveOutcome::Empty,
                Err(e) => ReceiveOutcome::Failure(e),
            },
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ContainerError> {
        match self {
            Self::MultiTake { max_items: 0 } => Err(ContainerError::invalid_config(
                "multi-take requires max_items >= 1",
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::InMemorySpace;

    async fn seeded(n: u64) -> InMemorySpace {
        let space = InMemorySpace::new("recv");
        for i in 0..n {
            space
                .write(SpaceItem::builder().type_name("Tick").routing(i).build())
                .await
                .unwrap();
        }
        space
    }

    #[tokio::test]
    async fn single_take_yields_single_then_empty() {
        let space = seeded(1).await;
        let timeout = Duration::from_millis(10);
        let s = ReceiveStrategy::SingleTake;
        assert!(matches!(
            s.receive(&space, &Template::any(), None, timeout).await,
            ReceiveOutcome::Single(_)
        ));
        assert!(matches!(
            s.receive(&space, &Template::any(), None, timeout).await,
            ReceiveOutcome::Empty
        ));
    }

    #[tokio::test]
    async fn multi_take_yields_batch() {
        let space = seeded(5).await;
        let outcome = ReceiveStrategy::MultiTake { max_items: 10 }
            .receive(&space, &Template::any(), None, Duration::from_millis(10))
            .await;
        assert_eq!(outcome.item_count(), 5);
        assert!(matches!(outcome, ReceiveOutcome::Batch(_)));
    }

    #[tokio::test]
    async fn async_take_matches_single_take_semantics() {
        let space = seeded(1).await;
        let s = ReceiveStrategy::AsyncTake;
        let timeout = Duration::from_millis(10);
        assert!(matches!(
            s.receive(&space, &Template::any(), None, timeout).await,
            ReceiveOutcome::Single(_)
        ));
        assert!(matches!(
            s.receive(&space, &Template::any(), None, timeout).await,
            ReceiveOutcome::Empty
        ));
    }

    #[tokio::test]
    async fn space_errors_become_failure_not_empty() {
        let space = seeded(1).await;
        space.fail_next_takes(1);
        let outcome = ReceiveStrategy::SingleTake
            .receive(&space, &Template::any(), None, Duration::from_millis(10))
            .await;
        assert!(matches!(
            outcome,
            ReceiveOutcome::Failure(ContainerError::Retrieval { .. })
        ));
    }

    #[test]
    fn zero_batch_limit_is_rejected() {
        assert!(ReceiveStrategy::MultiTake { max_items: 0 }.validate().is_err());
        assert!(ReceiveStrategy::AsyncTake.validate().is_ok());
    }
}

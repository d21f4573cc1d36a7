use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use space_container::{
    Container, ContainerConfig, InMemorySpace, InvocationContext, ListenerData, Space, SpaceItem,
    SpaceListener, Template, WorkerFailure,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Order {
    number: u32,
    amount: i64,
}

/// 订单结算：金额为负的订单首次处理失败，事务回滚后重投
struct Settlement {
    total: AtomicI64,
    rejected_once: Mutex<HashSet<u32>>,
}

impl Settlement {
    fn reject_first(&self, number: u32) -> bool {
        self.rejected_once
            .lock()
            .map(|mut seen| seen.insert(number))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SpaceListener for Settlement {
    fn listener_name(&self) -> &str {
        "settlement"
    }

    async fn on_data(&self, data: ListenerData, ctx: &InvocationContext) -> Result<()> {
        for item in data.into_items() {
            let order: Order = item.payload_as()?;
            if order.amount < 0 && self.reject_first(order.number) {
                anyhow::bail!("order {} has a negative amount", order.number);
            }
            self.total.fetch_add(order.amount.abs(), Ordering::SeqCst);
            tracing::info!(
                worker = ctx.worker,
                transaction = ?ctx.transaction,
                order = order.number,
                amount = order.amount,
                "order settled"
            );
        }
        Ok(())
    }
}

/// 环境变量优先；未设置的项使用适合演示的取值
fn demo_config() -> Result<ContainerConfig> {
    let unset = |key: &str| std::env::var_os(key).is_none();
    let mut config = ContainerConfig::from_env()?;

    if unset("SPACE_CONTAINER_MIN_WORKERS") {
        config.min_concurrent_workers = 2;
    }
    if unset("SPACE_CONTAINER_MAX_WORKERS") {
        config.max_concurrent_workers = config.min_concurrent_workers.max(4);
    }
    if unset("SPACE_CONTAINER_RECEIVE_TIMEOUT_MS") {
        config.receive_timeout = Duration::from_millis(200);
    }
    if unset("SPACE_CONTAINER_RECOVERY_INTERVAL_MS") {
        config.recovery_interval = Duration::from_millis(50);
    }
    if unset("SPACE_CONTAINER_TRANSACTIONAL") {
        config.transactional = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "space_container=debug,demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = demo_config()?;
    tracing::info!(?config, "container configured");

    let space = InMemorySpace::new("orders-grid");
    let settlement = Arc::new(Settlement {
        total: AtomicI64::new(0),
        rejected_once: Mutex::new(HashSet::new()),
    });

    let container = Container::builder()
        .name("settlement")
        .space(Arc::new(space.clone()))
        .query_source(Arc::new(Template::of_type("Order")))
        .listener(settlement.clone())
        .transaction_manager(Arc::new(space.clone()))
        .config(config)
        .build();
    container.set_failure_listener(Arc::new(|failure: &WorkerFailure| {
        tracing::warn!(
            worker = failure.worker,
            action = %failure.action,
            "listener reported failure: {}",
            failure.error
        );
    }));
    container.initialize()?;
    if !config.auto_start {
        container.start()?;
    }

    let mut expected = 0;
    for number in 1..=20u32 {
        let amount = if number % 7 == 0 { -(number as i64) } else { number as i64 * 10 };
        expected += amount.abs();
        space
            .write(
                SpaceItem::builder()
                    .type_name("Order")
                    .payload(serde_json::to_value(Order { number, amount })?)
                    .build(),
            )
            .await?;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while settlement.total.load(Ordering::SeqCst) < expected
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    container.stop(true).await?;
    let stats = container.stats();
    tracing::info!(
        settled = settlement.total.load(Ordering::SeqCst),
        expected,
        items = stats.items_received,
        committed = stats.committed,
        rolled_back = stats.rolled_back,
        workers_spawned = stats.workers_spawned,
        "demo finished"
    );
    container.destroy().await?;
    Ok(())
}

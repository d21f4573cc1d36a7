mod common;

use async_trait::async_trait;
use common::{Recorder, failure_sink, seed, wait_until};
use space_container::{
    Container, ContainerConfig, ContainerError, ContainerResult, DynamicQuery, FailureKind,
    InMemorySpace, ReceiveStrategy, Space, SpaceItem, Template, Transaction, TransactionManager,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn fast_config() -> ContainerConfig {
    ContainerConfig {
        receive_timeout: Duration::from_millis(50),
        recovery_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_workers_deliver_every_item_exactly_once() -> anyhow::Result<()> {
    let space = InMemorySpace::new("grid");
    let ids: Vec<String> = (0..200).map(|i| format!("order-{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    seed(&space, &refs).await?;

    let recorder = Arc::new(Recorder::new());
    let container = Container::builder()
        .name("orders")
        .space(Arc::new(space.clone()))
        .query_source(Arc::new(Template::of_type("Order")))
        .listener(recorder.clone())
        .config(ContainerConfig {
            min_concurrent_workers: 4,
            max_concurrent_workers: 4,
            ..fast_config()
        })
        .build();
    container.initialize()?;

    assert!(wait_until(Duration::from_secs(5), || recorder.handled_count() == 200).await);
    container.stop(true).await?;

    let handled = recorder.handled.lock().unwrap().clone();
    let unique: HashSet<&String> = handled.iter().collect();
    assert_eq!(handled.len(), 200);
    assert_eq!(unique.len(), 200);
    assert!(space.is_empty());
    assert_eq!(container.stats().items_received, 200);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn transactional_failure_redelivers_the_item() -> anyhow::Result<()> {
    let space = InMemorySpace::new("grid");
    seed(&space, &["a", "b", "c"]).await?;

    let recorder = Arc::new(Recorder::new().failing_once(&["b"]));
    let container = Container::builder()
        .name("orders")
        .space(Arc::new(space.clone()))
        .query_source(Arc::new(Template::of_type("Order")))
        .listener(recorder.clone())
        .transaction_manager(Arc::new(space.clone()))
        .config(ContainerConfig {
            min_concurrent_workers: 2,
            max_concurrent_workers: 2,
            transactional: true,
            ..fast_config()
        })
        .build();
    container.initialize()?;

    assert!(wait_until(Duration::from_secs(3), || recorder.handled_count() == 3).await);
    container.stop(true).await?;

    assert_eq!(recorder.attempts_of("b"), 2);
    assert_eq!(recorder.attempts_of("a"), 1);
    assert_eq!(recorder.overlaps.load(Ordering::SeqCst), 0);
    assert!(space.is_empty());
    assert_eq!(space.pending_transactions(), 0);

    let stats = container.stats();
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(stats.committed, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn non_transactional_failure_loses_the_item() -> anyhow::Result<()> {
    let space = InMemorySpace::new("grid");
    seed(&space, &["a", "b", "c"]).await?;

    let (failures, failure_listener) = failure_sink();
    let recorder = Arc::new(Recorder::new().failing_once(&["b"]));
    let container = Container::builder()
        .name("orders")
        .space(Arc::new(space.clone()))
        .query_source(Arc::new(Template::of_type("Order")))
        .listener(recorder.clone())
        .failure_listener(failure_listener)
        .config(fast_config())
        .build();
    container.initialize()?;

    assert!(
        wait_until(Duration::from_secs(3), || {
            recorder.handled_count() == 2 && failures.lock().unwrap().len() == 1
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    container.stop(true).await?;

    assert_eq!(recorder.attempts_of("b"), 1);
    assert!(!recorder.handled.lock().unwrap().contains(&"b".to_string()));
    assert!(space.is_empty());
    assert_eq!(container.stats().rolled_back, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_is_one_call_or_one_call_per_item() -> anyhow::Result<()> {
    for (as_array, expected) in [(true, vec![5]), (false, vec![1, 1, 1, 1, 1])] {
        let space = InMemorySpace::new("grid");
        seed(&space, &["1", "2", "3", "4", "5"]).await?;

        let recorder = Arc::new(Recorder::new());
        let container = Container::builder()
            .name("orders")
            .space(Arc::new(space.clone()))
            .query_source(Arc::new(Template::of_type("Order")))
            .listener(recorder.clone())
            .receive_strategy(ReceiveStrategy::MultiTake { max_items: 10 })
            .config(ContainerConfig {
                pass_batch_as_array: as_array,
                ..fast_config()
            })
            .build();
        container.initialize()?;

        assert!(wait_until(Duration::from_secs(3), || recorder.handled_count() == 5).await);
        container.stop(true).await?;

        assert_eq!(*recorder.calls.lock().unwrap(), expected);
        let stats = container.stats();
        assert_eq!(stats.items_received, 5);
        assert_eq!(stats.invocations, 1);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn async_take_delivers_like_single_take() -> anyhow::Result<()> {
    let space = InMemorySpace::new("grid");
    let recorder = Arc::new(Recorder::new());
    let container = Container::builder()
        .name("orders")
        .space(Arc::new(space.clone()))
        .query_source(Arc::new(Template::of_type("Order")))
        .listener(recorder.clone())
        .receive_strategy(ReceiveStrategy::AsyncTake)
        .config(fast_config())
        .build();
    container.initialize()?;

    seed(&space, &["late-1", "late-2"]).await?;
    assert!(wait_until(Duration::from_secs(3), || recorder.handled_count() == 2).await);
    container.stop(true).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dynamic_templates_are_strictly_increasing_across_workers() -> anyhow::Result<()> {
    let counter = Arc::new(AtomicU64::new(0));
    let observed = Arc::new(Mutex::new(Vec::new()));
    let source = {
        let counter = counter.clone();
        let observed = observed.clone();
        DynamicQuery::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            observed.lock().unwrap().push(n);
            Ok(Template::any().with_routing(n))
        })
    };

    let container = Container::builder()
        .name("rotating")
        .space(Arc::new(InMemorySpace::new("grid")))
        .query_source(Arc::new(source))
        .listener(Arc::new(Recorder::new()))
        .config(ContainerConfig {
            min_concurrent_workers: 4,
            max_concurrent_workers: 4,
            receive_timeout: Duration::from_millis(20),
            dynamic_template: true,
            ..fast_config()
        })
        .build();
    container.initialize()?;

    assert!(wait_until(Duration::from_secs(3), || observed.lock().unwrap().len() >= 20).await);
    container.stop(true).await?;

    let observed = observed.lock().unwrap().clone();
    assert!(observed.windows(2).all(|w| w[0] < w[1]), "{observed:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn static_template_is_evaluated_once_per_container() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let source = {
        let calls = calls.clone();
        DynamicQuery::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Template::of_type("Order"))
        })
    };

    let space = InMemorySpace::new("grid");
    seed(&space, &["a", "b", "c", "d"]).await?;
    let recorder = Arc::new(Recorder::new());
    let container = Container::builder()
        .name("orders")
        .space(Arc::new(space.clone()))
        .query_source(Arc::new(source))
        .listener(recorder.clone())
        .config(ContainerConfig {
            min_concurrent_workers: 2,
            max_concurrent_workers: 2,
            ..fast_config()
        })
        .build();
    container.initialize()?;

    assert!(wait_until(Duration::from_secs(3), || recorder.handled_count() == 4).await);
    container.stop(true).await?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn items_outside_the_template_are_left_alone() -> anyhow::Result<()> {
    let space = InMemorySpace::new("grid");
    seed(&space, &["a"]).await?;
    space
        .write(
            SpaceItem::builder()
                .id("invoice-1")
                .type_name("Invoice")
                .build(),
        )
        .await?;

    let recorder = Arc::new(Recorder::new());
    let container = Container::builder()
        .name("orders")
        .space(Arc::new(space.clone()))
        .query_source(Arc::new(Template::of_type("Order")))
        .listener(recorder.clone())
        .config(fast_config())
        .build();
    container.initialize()?;

    assert!(wait_until(Duration::from_secs(3), || recorder.handled_count() == 1).await);
    container.stop(true).await?;

    let left = space.snapshot();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id(), "invoice-1");
    Ok(())
}

/// 前 `n` 次提交失败的事务管理器，失败时事务留给底层空间处置
struct LosingCommits {
    space: InMemorySpace,
    failures: AtomicUsize,
}

#[async_trait]
impl TransactionManager for LosingCommits {
    async fn begin(&self) -> ContainerResult<Transaction> {
        self.space.begin().await
    }

    async fn commit(&self, tx: Transaction) -> ContainerResult<()> {
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(ContainerError::transaction("commit", format!("{tx} lost")));
        }
        self.space.commit(tx).await
    }

    async fn rollback(&self, tx: Transaction) -> ContainerResult<()> {
        self.space.rollback(tx).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_commit_is_reported_as_its_own_disposition() -> anyhow::Result<()> {
    let space = InMemorySpace::new("grid");
    seed(&space, &["a", "b"]).await?;

    let (failures, failure_listener) = failure_sink();
    let recorder = Arc::new(Recorder::new());
    let container = Container::builder()
        .name("orders")
        .space(Arc::new(space.clone()))
        .query_source(Arc::new(Template::of_type("Order")))
        .listener(recorder.clone())
        .transaction_manager(Arc::new(LosingCommits {
            space: space.clone(),
            failures: AtomicUsize::new(1),
        }))
        .failure_listener(failure_listener)
        .config(ContainerConfig {
            transactional: true,
            ..fast_config()
        })
        .build();
    container.initialize()?;

    assert!(wait_until(Duration::from_secs(3), || recorder.handled_count() == 2).await);
    container.stop(true).await?;

    let stats = container.stats();
    assert_eq!(stats.commit_failed, 1);
    assert_eq!(stats.rolled_back, 0);
    assert_eq!(stats.committed, 1);

    let seen = failures.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, FailureKind::Retrieval);
    assert!(matches!(
        seen[0].error.as_ref(),
        ContainerError::Transaction { stage: "commit", .. }
    ));
    Ok(())
}

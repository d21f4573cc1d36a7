//! 内存版空间（InMemorySpace）
//!
//! 基于 `Mutex<VecDeque>` + `tokio::sync::Notify` 的轻量空间实现，同时充当
//! 事务管理器，满足 `Space` 与 `TransactionManager` 协议：
//! - 取数按写入顺序（FIFO）匹配第一个满足模板的条目；
//! - 事务内取走的条目暂存在事务下，提交即丢弃，回滚时放回队首；
//! - `redeliver_on_rollback` 关闭后回滚不再放回，便于测试“回滚即重投”这一外部保证；
//! - `fail_next_takes` 可注入取数失败，模拟网格不可达。
//!
//! 典型用途：测试环境、示例与本地开发。
//!
use super::{Space, SpaceItem, Template};
use crate::error::{ContainerError, ContainerResult as Result};
use crate::transaction::{Transaction, TransactionManager};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio::time::{self, Instant};

#[derive(Clone)]
pub struct InMemorySpace {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    state: Mutex<SpaceState>,
    notify: Notify,
    next_tx: AtomicU64,
    redeliver_on_rollback: AtomicBool,
    failures_to_inject: AtomicUsize,
}

#[derive(Default)]
struct SpaceState {
    items: VecDeque<SpaceItem>,
    pending: HashMap<u64, Vec<SpaceItem>>,
}

impl InMemorySpace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(SpaceState::default()),
                notify: Notify::new(),
                next_tx: AtomicU64::new(1),
                redeliver_on_rollback: AtomicBool::new(true),
                failures_to_inject: AtomicUsize::new(0),
            }),
        }
    }

    /// 回滚时是否把事务内取走的条目放回空间（默认 true）
    pub fn set_redeliver_on_rollback(&self, redeliver: bool) {
        self.inner
            .redeliver_on_rollback
            .store(redeliver, Ordering::SeqCst);
    }

    /// 接下来 `n` 次取数直接返回取数错误
    pub fn fail_next_takes(&self, n: usize) {
        self.inner.failures_to_inject.store(n, Ordering::SeqCst);
    }

    /// 空间中可见（未被事务占用）的条目数
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 尚未结束的事务数
    pub fn pending_transactions(&self) -> usize {
        self.lock().pending.len()
    }

    /// 可见条目的快照（按空间内顺序）
    pub fn snapshot(&self) -> Vec<SpaceItem> {
        self.lock().items.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, SpaceState> {
        // 锁内不存在会 panic 的逻辑，中毒时直接沿用内部数据
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn injected_failure(&self) -> Result<()> {
        let fail = self
            .inner
            .failures_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(ContainerError::retrieval(
                &self.inner.name,
                "space unavailable (injected)",
            ));
        }
        Ok(())
    }

    fn try_take(&self, template: &Template, tx: Option<u64>, max_items: usize) -> Vec<SpaceItem> {
        let mut state = self.lock();
        let mut taken = Vec::new();
        let mut i = 0;
        while i < state.items.len() && taken.len() < max_items {
            if template.matches(&state.items[i]) {
                if let Some(item) = state.items.remove(i) {
                    taken.push(item);
                }
            } else {
                i += 1;
            }
        }
        if let Some(id) = tx {
            if !taken.is_empty() {
                state
                    .pending
                    .entry(id)
                    .or_default()
                    .extend(taken.iter().cloned());
            }
        }
        taken
    }

    async fn take_up_to(
        &self,
        template: &Template,
        tx: Option<u64>,
        max_items: usize,
        timeout: Duration,
    ) -> Result<Vec<SpaceItem>> {
        self.injected_failure()?;

        let deadline = Instant::now() + timeout;
        loop {
            // 先登记等待再检查，避免检查与等待之间的写入唤醒丢失
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let taken = self.try_take(template, tx, max_items);
            if !taken.is_empty() {
                return Ok(taken);
            }
            if time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }
}

#[async_trait]
impl Space for InMemorySpace {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn write(&self, item: SpaceItem) -> Result<()> {
        self.lock().items.push_back(item);
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn take(
        &self,
        template: &Template,
        tx: Option<&Transaction>,
        timeout: Duration,
    ) -> Result<Option<SpaceItem>> {
        let taken = self
            .take_up_to(template, tx.map(Transaction::id), 1, timeout)
            .await?;
        Ok(taken.into_iter().next())
    }

    async fn take_multiple(
        &self,
        template: &Template,
        tx: Option<&Transaction>,
        max_items: usize,
        timeout: Duration,
    ) -> Result<Vec<SpaceItem>> {
        self.take_up_to(template, tx.map(Transaction::id), max_items.max(1), timeout)
            .await
    }

    fn take_async(
        &self,
        template: Template,
        tx: Option<&Transaction>,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<Option<SpaceItem>>> {
        let (done_tx, done_rx) = oneshot::channel();
        let space = self.clone();
        let tx_id = tx.map(Transaction::id);

        tokio::spawn(async move {
            let result = space
                .take_up_to(&template, tx_id, 1, timeout)
                .await
                .map(|taken| taken.into_iter().next());
            let _ = done_tx.send(result);
        });

        let name = self.inner.name.clone();
        Box::pin(async move {
            done_rx
                .await
                .map_err(|_| ContainerError::retrieval(name, "async take abandoned"))?
        })
    }
}

#[async_trait]
impl TransactionManager for InMemorySpace {
    async fn begin(&self) -> Result<Transaction> {
        let id = self.inner.next_tx.fetch_add(1, Ordering::SeqCst);
        self.lock().pending.insert(id, Vec::new());
        Ok(Transaction::new(id))
    }

    async fn commit(&self, tx: Transaction) -> Result<()> {
        match self.lock().pending.remove(&tx.id()) {
            Some(_) => Ok(()),
            None => Err(ContainerError::transaction(
                "commit",
                format!("unknown transaction {tx}"),
            )),
        }
    }

    async fn rollback(&self, tx: Transaction) -> Result<()> {
        let redeliver = self.inner.redeliver_on_rollback.load(Ordering::SeqCst);
        {
            let mut state = self.lock();
            let Some(taken) = state.pending.remove(&tx.id()) else {
                return Err(ContainerError::transaction(
                    "rollback",
                    format!("unknown transaction {tx}"),
                ));
            };
            if redeliver {
                for item in taken.into_iter().rev() {
                    state.items.push_front(item);
                }
            }
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

//! worker：单一消费身份上的顺序循环
//!
//! 每轮迭代：取模板 → （事务开始）→ 取数（唯一的设计挂起点，至多 `receive_timeout`）
//! → 分发 → 提交/回滚 → 失败时交给恢复策略。
//!
//! 停止信号在循环顶部、每次取数超时边界、退避与暂停等待中被观察；分发和取数本身
//! 从不被中途打断，取走的条目不会被丢弃在半路。
//!
use super::engine::ContainerInner;
use super::state::{Control, WorkerState, WorkerStateCell};
use crate::error::{ContainerError, ContainerResult as Result};
use crate::listener::{InvocationContext, Received};
use crate::receive::ReceiveOutcome;
use crate::recovery::{RecoveryAction, WorkerFailure};
use crate::transaction::{Disposition, Invocation, Transaction};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Worker {
    index: usize,
    container: Weak<ContainerInner>,
    state: Arc<WorkerStateCell>,
    token: CancellationToken,
    control: watch::Receiver<Control>,
    consecutive_failures: u32,
    idle_receives: u32,
    /// 自动暂停时记录当时的 resume 代数
    paused_at_epoch: Option<u64>,
}

impl Worker {
    pub(crate) fn new(
        index: usize,
        container: Weak<ContainerInner>,
        state: Arc<WorkerStateCell>,
        token: CancellationToken,
        control: watch::Receiver<Control>,
    ) -> Self {
        Self {
            index,
            container,
            state,
            token,
            control,
            consecutive_failures: 0,
            idle_receives: 0,
            paused_at_epoch: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("worker started");

        loop {
            if self.token.is_cancelled() {
                break;
            }
            if self.must_wait() {
                if self.wait_for_resume().await == Flow::Stop {
                    break;
                }
                continue;
            }
            let Some(inner) = self.container.upgrade() else {
                break;
            };
            let flow = self.iterate(&inner).await;
            drop(inner);
            if flow == Flow::Stop {
                break;
            }
        }

        self.state.set(WorkerState::Stopped);
        debug!("worker stopped");
    }

    /// 容器级暂停，或自动暂停且尚未 resume
    fn must_wait(&mut self) -> bool {
        let control = *self.control.borrow_and_update();
        if let Some(epoch) = self.paused_at_epoch {
            if control.resume_epoch > epoch {
                debug!("worker resumed");
                self.paused_at_epoch = None;
                self.consecutive_failures = 0;
            }
        }
        control.paused || self.paused_at_epoch.is_some()
    }

    async fn wait_for_resume(&mut self) -> Flow {
        self.state.set(WorkerState::Paused);
        tokio::select! {
            _ = self.token.cancelled() => Flow::Stop,
            changed = self.control.changed() => match changed {
                Ok(()) => Flow::Continue,
                Err(_) => Flow::Stop,
            },
        }
    }

    async fn iterate(&mut self, inner: &Arc<ContainerInner>) -> Flow {
        self.state.set(WorkerState::Idle);

        let template = match inner.templates.current() {
            Ok(template) => template,
            Err(e) => return self.recover(inner, e).await,
        };

        let tx = if inner.config.transactional {
            match inner.transaction_manager.as_ref() {
                Some(tm) => match tm.begin().await {
                    Ok(tx) => Some(tx),
                    Err(e) => return self.recover(inner, e).await,
                },
                None => None,
            }
        } else {
            None
        };

        self.state.set(WorkerState::Waiting);
        let outcome = inner
            .receive_strategy
            .receive(
                inner.space.as_ref(),
                &template,
                tx.as_ref(),
                inner.config.receive_timeout,
            )
            .await;

        let received = match outcome {
            ReceiveOutcome::Empty => return self.on_empty(inner, tx).await,
            ReceiveOutcome::Single(item) => Received::Single(item),
            ReceiveOutcome::Batch(items) => Received::Batch(items),
            ReceiveOutcome::Failure(e) => {
                self.rollback(inner, tx).await;
                return self.recover(inner, e).await;
            }
        };

        self.idle_receives = 0;
        self.state.set(WorkerState::Processing);
        inner.scale_up_if_busy(self.index);

        let items = match &received {
            Received::Single(_) => 1,
            Received::Batch(batch) => batch.len(),
        };
        let ctx = InvocationContext {
            container: inner.name.clone(),
            worker: self.index,
            transaction: tx.as_ref().map(Transaction::id),
        };

        match inner.invoker.dispatch(received, &ctx).await {
            Ok(()) => match self.commit(inner, tx).await {
                Ok(disposition) => {
                    self.record(inner, items, disposition);
                    self.consecutive_failures = 0;
                    Flow::Continue
                }
                Err(e) => {
                    self.record(inner, items, Disposition::CommitFailed);
                    self.recover(inner, e).await
                }
            },
            Err(e) => {
                let disposition = self.rollback(inner, tx).await;
                self.record(inner, items, disposition);
                self.recover(inner, e).await
            }
        }
    }

    async fn on_empty(&mut self, inner: &Arc<ContainerInner>, tx: Option<Transaction>) -> Flow {
        if let Err(e) = self.commit(inner, tx).await {
            return self.recover(inner, e).await;
        }
        trace!("receive timed out without a match");
        self.consecutive_failures = 0;
        self.idle_receives = self.idle_receives.saturating_add(1);

        let limit = inner.config.idle_receives_before_shrink;
        if limit > 0 && self.idle_receives >= limit {
            self.idle_receives = 0;
            if inner.try_retire(self.index) {
                debug!("worker retired after idle receives");
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    async fn commit(
        &self,
        inner: &ContainerInner,
        tx: Option<Transaction>,
    ) -> Result<Disposition> {
        let (Some(tx), Some(tm)) = (tx, inner.transaction_manager.as_ref()) else {
            return Ok(Disposition::NoTransaction);
        };
        tm.commit(tx).await?;
        Ok(Disposition::Committed)
    }

    /// 回滚；回滚本身失败只记录日志，原始失败仍交给恢复策略
    async fn rollback(&self, inner: &ContainerInner, tx: Option<Transaction>) -> Disposition {
        let (Some(tx), Some(tm)) = (tx, inner.transaction_manager.as_ref()) else {
            return Disposition::NoTransaction;
        };
        if let Err(e) = tm.rollback(tx).await {
            warn!(error = %e, "rollback failed");
        }
        Disposition::RolledBack
    }

    fn record(&self, inner: &ContainerInner, items: usize, disposition: Disposition) {
        let invocation = Invocation {
            worker: self.index,
            items,
            disposition,
        };
        inner.stats.record(&invocation);
        debug!(items, %disposition, "invocation finished");
    }

    async fn recover(&mut self, inner: &ContainerInner, error: ContainerError) -> Flow {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.state.set(WorkerState::Recovering);

        let kind = error.kind();
        let action = inner
            .recovery
            .decide(&error, self.consecutive_failures);
        match action {
            RecoveryAction::Retry { .. } => warn!(
                error = %error,
                ?kind,
                consecutive_failures = self.consecutive_failures,
                "worker failure, {action}"
            ),
            RecoveryAction::Pause | RecoveryAction::Stop => error!(
                error = %error,
                ?kind,
                consecutive_failures = self.consecutive_failures,
                "worker failure, {action}"
            ),
        }

        inner.stats.failure();
        inner.notify_failure(&WorkerFailure {
            container: inner.name.clone(),
            worker: self.index,
            kind,
            error: Arc::new(error),
            consecutive_failures: self.consecutive_failures,
            action,
        });

        match action {
            RecoveryAction::Retry { backoff } => {
                tokio::select! {
                    _ = self.token.cancelled() => Flow::Stop,
                    _ = tokio::time::sleep(backoff) => Flow::Continue,
                }
            }
            RecoveryAction::Pause => {
                // 显式 stop 优先于自动暂停
                if self.token.is_cancelled() {
                    return Flow::Stop;
                }
                self.paused_at_epoch = Some(self.control.borrow().resume_epoch);
                self.state.set(WorkerState::Paused);
                Flow::Continue
            }
            RecoveryAction::Stop => {
                self.state.set(WorkerState::Stopped);
                inner.worker_lost(self.index);
                Flow::Stop
            }
        }
    }
}

//! 事件容器（Container）
//!
//! 持有 worker 池并实现生命周期状态机：
//! `Created → Initialized → Started ⇄ Paused → Stopped → Destroyed`（`Stopped` 可再次 `start()`）。
//!
//! - 成员变更（创建/退出/暂停/恢复）全部在一把互斥锁下串行，锁从不跨 `.await` 持有；
//! - 停止信号是 `CancellationToken`，worker 无需独占即可读取；
//! - 暂停/恢复经 `watch` 通道广播；
//! - 取到条目且没有其他空闲 worker 时按需扩容（不超过上限），
//!   连续空取的 worker 在多于下限时退出。
//!
use super::config::ContainerConfig;
use super::state::{ContainerState, Control, WorkerState, WorkerStateCell};
use super::stats::{ContainerStats, StatsSnapshot};
use super::worker::Worker;
use crate::error::{ContainerError, ContainerResult as Result};
use crate::listener::{ListenerInvoker, SpaceListener};
use crate::query::{QuerySource, TemplateSupplier};
use crate::receive::ReceiveStrategy;
use crate::recovery::{FailureListener, RecoveryPolicy, WorkerFailure};
use crate::space::Space;
use crate::transaction::TransactionManager;
use bon::bon;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// 事件容器：对外的生命周期控制面
pub struct Container {
    inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    pub(crate) name: Arc<str>,
    pub(crate) config: ContainerConfig,
    pub(crate) space: Arc<dyn Space>,
    pub(crate) receive_strategy: ReceiveStrategy,
    pub(crate) templates: TemplateSupplier,
    pub(crate) invoker: ListenerInvoker,
    pub(crate) transaction_manager: Option<Arc<dyn TransactionManager>>,
    pub(crate) recovery: RecoveryPolicy,
    pub(crate) stats: ContainerStats,
    failure_listener: RwLock<Option<Arc<dyn FailureListener>>>,
    lifecycle: Mutex<Lifecycle>,
    control: watch::Sender<Control>,
}

struct Lifecycle {
    state: ContainerState,
    workers: BTreeMap<usize, WorkerEntry>,
    next_ordinal: usize,
    stop_token: CancellationToken,
}

struct WorkerEntry {
    state: Arc<WorkerStateCell>,
    /// 已构造但尚未启动
    pending: Option<Worker>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerEntry {
    /// 任务已启动且尚未结束
    fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Lifecycle {
    fn live_workers(&self) -> usize {
        self.workers
            .values()
            .filter(|w| w.state.get() != WorkerState::Stopped)
            .count()
    }
}

#[bon]
impl Container {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        space: Arc<dyn Space>,
        query_source: Arc<dyn QuerySource>,
        listener: Arc<dyn SpaceListener>,
        transaction_manager: Option<Arc<dyn TransactionManager>>,
        failure_listener: Option<Arc<dyn FailureListener>>,
        #[builder(default)] receive_strategy: ReceiveStrategy,
        #[builder(default)] config: ContainerConfig,
    ) -> Self {
        let (control, _) = watch::channel(Control {
            paused: false,
            resume_epoch: 0,
        });
        let inner = ContainerInner {
            name: Arc::from(name),
            templates: TemplateSupplier::new(query_source, config.dynamic_template),
            invoker: ListenerInvoker::new(listener, config.pass_batch_as_array),
            recovery: RecoveryPolicy {
                recovery_interval: config.recovery_interval,
                pause_after_consecutive_failures: config.pause_after_consecutive_failures,
            },
            config,
            space,
            receive_strategy,
            transaction_manager,
            stats: ContainerStats::default(),
            failure_listener: RwLock::new(failure_listener),
            lifecycle: Mutex::new(Lifecycle {
                state: ContainerState::Created,
                workers: BTreeMap::new(),
                next_ordinal: 0,
                stop_token: CancellationToken::new(),
            }),
            control,
        };
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl Container {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 校验配置、缓存静态模板并构造最小 worker 集；`auto_start` 时随即启动
    pub fn initialize(&self) -> Result<()> {
        let auto_start = {
            let mut lc = self.inner.lifecycle();
            match lc.state {
                ContainerState::Created => {
                    self.inner.initialize_locked(&mut lc)?;
                    self.inner.config.auto_start
                }
                ContainerState::Destroyed => {
                    return Err(ContainerError::invalid_state("container is destroyed"));
                }
                _ => false,
            }
        };
        if auto_start {
            self.start()?;
        }
        Ok(())
    }

    /// 启动全部 worker；未初始化时先初始化。需要在 tokio 运行时中调用
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ContainerError::invalid_state("start requires a tokio runtime"))?;

        let mut lc = self.inner.lifecycle();
        match lc.state {
            ContainerState::Started | ContainerState::Paused => return Ok(()),
            ContainerState::Destroyed => {
                return Err(ContainerError::invalid_state("container is destroyed"));
            }
            ContainerState::Created => self.inner.initialize_locked(&mut lc)?,
            ContainerState::Stopped => {
                // 非优雅停止后旧 worker 可能仍在分发中，不能与新集合叠加
                if lc.workers.values().any(WorkerEntry::is_active) {
                    return Err(ContainerError::invalid_state(
                        "workers from the previous run are still finishing, await stop(true) before restarting",
                    ));
                }
                lc.workers.clear();
                lc.stop_token = CancellationToken::new();
                for _ in 0..self.inner.config.min_concurrent_workers {
                    self.inner.construct_worker(&mut lc);
                }
            }
            ContainerState::Initialized => {}
        }

        self.inner.control.send_modify(|c| c.paused = false);
        for (index, entry) in lc.workers.iter_mut() {
            if let Some(worker) = entry.pending.take() {
                entry.handle = Some(self.inner.spawn(&runtime, *index, worker));
            }
        }
        lc.state = ContainerState::Started;
        info!(
            container = %self.inner.name,
            workers = lc.workers.len(),
            "container started"
        );
        Ok(())
    }

    /// 通知所有 worker 在当前迭代结束后退出；`graceful` 为真时等待全部进入 `Stopped`
    ///
    /// 非优雅停止后，已停止的容器上再次调用 `stop(true)` 会等待仍在收尾的 worker。
    pub async fn stop(&self, graceful: bool) -> Result<()> {
        let handles: Vec<JoinHandle<()>> = {
            let mut lc = self.inner.lifecycle();
            match lc.state {
                ContainerState::Started | ContainerState::Paused => {
                    lc.state = ContainerState::Stopped;
                    lc.stop_token.cancel();
                    for entry in lc.workers.values_mut() {
                        if entry.pending.take().is_some() {
                            entry.state.set(WorkerState::Stopped);
                        }
                    }
                    info!(container = %self.inner.name, graceful, "container stopping");
                }
                ContainerState::Stopped if graceful => {}
                _ => return Ok(()),
            }
            if !graceful {
                return Ok(());
            }
            lc.workers
                .values_mut()
                .filter_map(|entry| entry.handle.take())
                .collect()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(container = %self.inner.name, error = %e, "worker task ended abnormally");
            }
        }
        info!(container = %self.inner.name, "container stopped");
        Ok(())
    }

    /// 容器级暂停：worker 在当前迭代结束后停止取数
    pub fn pause(&self) -> Result<()> {
        let mut lc = self.inner.lifecycle();
        match lc.state {
            ContainerState::Started => {
                lc.state = ContainerState::Paused;
                self.inner.control.send_modify(|c| c.paused = true);
                info!(container = %self.inner.name, "container paused");
                Ok(())
            }
            ContainerState::Paused => Ok(()),
            other => Err(ContainerError::invalid_state(format!(
                "cannot pause a container in state {other}"
            ))),
        }
    }

    /// 解除容器级暂停，并恢复所有被自动暂停的 worker
    pub fn resume(&self) -> Result<()> {
        let mut lc = self.inner.lifecycle();
        match lc.state {
            ContainerState::Started | ContainerState::Paused => {
                lc.state = ContainerState::Started;
                self.inner.control.send_modify(|c| {
                    c.paused = false;
                    c.resume_epoch += 1;
                });
                info!(container = %self.inner.name, "container resumed");
                Ok(())
            }
            other => Err(ContainerError::invalid_state(format!(
                "cannot resume a container in state {other}"
            ))),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lifecycle().state == ContainerState::Started
    }

    /// 优雅停止后释放全部 worker 与回调
    pub async fn destroy(&self) -> Result<()> {
        self.stop(true).await?;
        {
            let mut lc = self.inner.lifecycle();
            lc.workers.clear();
            lc.state = ContainerState::Destroyed;
        }
        if let Ok(mut listener) = self.inner.failure_listener.write() {
            listener.take();
        }
        info!(container = %self.inner.name, "container destroyed");
        Ok(())
    }

    /// 注册失败监听器（替换已有的）
    pub fn set_failure_listener(&self, listener: Arc<dyn FailureListener>) {
        match self.inner.failure_listener.write() {
            Ok(mut slot) => *slot = Some(listener),
            Err(poisoned) => *poisoned.into_inner() = Some(listener),
        }
    }

    pub fn state(&self) -> ContainerState {
        self.inner.lifecycle().state
    }

    /// 各 worker 的当前状态，按序号排列
    pub fn worker_states(&self) -> Vec<(usize, WorkerState)> {
        self.inner
            .lifecycle()
            .workers
            .iter()
            .map(|(index, entry)| (*index, entry.state.get()))
            .collect()
    }

    /// 未停止的 worker 数
    pub fn worker_count(&self) -> usize {
        self.inner.lifecycle().live_workers()
    }

    /// 运行中（含暂停）但存活 worker 少于下限，通常是致命失败导致 worker 停止
    pub fn is_degraded(&self) -> bool {
        let lc = self.inner.lifecycle();
        matches!(lc.state, ContainerState::Started | ContainerState::Paused)
            && lc.live_workers() < self.inner.config.min_concurrent_workers
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.inner.lifecycle().stop_token.cancel();
    }
}

impl ContainerInner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        // 锁内只做成员表与状态的读写，中毒时沿用内部数据
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn initialize_locked(self: &Arc<Self>, lc: &mut Lifecycle) -> Result<()> {
        self.config.validate()?;
        self.receive_strategy.validate()?;
        if self.config.transactional && self.transaction_manager.is_none() {
            return Err(ContainerError::invalid_config(
                "transactional container requires a transaction manager",
            ));
        }
        self.templates.prepare()?;

        for _ in 0..self.config.min_concurrent_workers {
            self.construct_worker(lc);
        }
        lc.state = ContainerState::Initialized;
        info!(
            container = %self.name,
            space = self.space.name(),
            listener = self.invoker.listener_name(),
            strategy = ?self.receive_strategy,
            "container initialized"
        );
        Ok(())
    }

    fn construct_worker(self: &Arc<Self>, lc: &mut Lifecycle) -> usize {
        let index = lc.next_ordinal;
        lc.next_ordinal += 1;

        let state = Arc::new(WorkerStateCell::new(WorkerState::Idle));
        let worker = Worker::new(
            index,
            Arc::downgrade(self),
            state.clone(),
            lc.stop_token.child_token(),
            self.control.subscribe(),
        );
        lc.workers.insert(
            index,
            WorkerEntry {
                state,
                pending: Some(worker),
                handle: None,
            },
        );
        self.stats.worker_spawned();
        index
    }

    fn spawn(&self, runtime: &tokio::runtime::Handle, index: usize, worker: Worker) -> JoinHandle<()> {
        let span = info_span!("space_worker", container = %self.name, worker = index);
        runtime.spawn(worker.run().instrument(span))
    }

    /// 取到条目后调用：没有其他空闲 worker 且未达上限时扩容一个
    pub(crate) fn scale_up_if_busy(self: &Arc<Self>, from: usize) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let mut lc = self.lifecycle();
        if lc.state != ContainerState::Started
            || lc.live_workers() >= self.config.max_concurrent_workers
        {
            return;
        }
        let idle = lc
            .workers
            .iter()
            .any(|(index, entry)| *index != from && entry.state.get().is_available());
        if idle {
            return;
        }

        let index = self.construct_worker(&mut lc);
        if let Some(entry) = lc.workers.get_mut(&index) {
            if let Some(worker) = entry.pending.take() {
                entry.handle = Some(self.spawn(&runtime, index, worker));
            }
        }
        debug!(
            container = %self.name,
            worker = index,
            live = lc.live_workers(),
            "scaled up"
        );
    }

    /// 空闲 worker 申请退出；仅在存活数多于下限时批准
    pub(crate) fn try_retire(&self, index: usize) -> bool {
        let mut lc = self.lifecycle();
        if lc.state != ContainerState::Started
            || lc.live_workers() <= self.config.min_concurrent_workers
        {
            return false;
        }
        if lc.workers.remove(&index).is_none() {
            return false;
        }
        self.stats.worker_retired();
        debug!(
            container = %self.name,
            worker = index,
            live = lc.live_workers(),
            "scaled down"
        );
        true
    }

    /// worker 因致命失败退出；容器不补位，低于下限时记录错误
    pub(crate) fn worker_lost(&self, index: usize) {
        self.stats.worker_lost();
        let lc = self.lifecycle();
        if !matches!(lc.state, ContainerState::Started | ContainerState::Paused) {
            return;
        }
        let live = lc.live_workers();
        let min = self.config.min_concurrent_workers;
        if live < min {
            error!(
                container = %self.name,
                worker = index,
                live,
                min,
                "live workers below minimum after fatal failure"
            );
        }
    }

    /// 上报失败；无论是否注册监听器，日志都已由 worker 记录
    pub(crate) fn notify_failure(&self, failure: &WorkerFailure) {
        let listener = match self.failure_listener.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(listener) = listener {
            listener.on_failure(failure);
        }
    }
}

use crate::transaction::{Disposition, Invocation};
use std::sync::atomic::{AtomicU64, Ordering};

/// 容器运行统计，各 worker 并发累加
#[derive(Debug, Default)]
pub(crate) struct ContainerStats {
    items_received: AtomicU64,
    invocations: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    commit_failed: AtomicU64,
    failures: AtomicU64,
    workers_spawned: AtomicU64,
    workers_retired: AtomicU64,
    workers_lost: AtomicU64,
}

/// 统计快照
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub items_received: u64,
    pub invocations: u64,
    pub committed: u64,
    pub rolled_back: u64,
    /// 分发成功但提交失败的次数，结果由事务管理器决定
    pub commit_failed: u64,
    pub failures: u64,
    pub workers_spawned: u64,
    pub workers_retired: u64,
    /// 因致命失败退出且不补位的 worker 数
    pub workers_lost: u64,
}

impl ContainerStats {
    pub(crate) fn record(&self, invocation: &Invocation) {
        self.items_received
            .fetch_add(invocation.items as u64, Ordering::Relaxed);
        self.invocations.fetch_add(1, Ordering::Relaxed);
        match invocation.disposition {
            Disposition::Committed => self.committed.fetch_add(1, Ordering::Relaxed),
            Disposition::RolledBack => self.rolled_back.fetch_add(1, Ordering::Relaxed),
            Disposition::CommitFailed => self.commit_failed.fetch_add(1, Ordering::Relaxed),
            Disposition::NoTransaction => 0,
        };
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_spawned(&self) {
        self.workers_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_retired(&self) {
        self.workers_retired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_lost(&self) {
        self.workers_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            items_received: self.items_received.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            commit_failed: self.commit_failed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            workers_spawned: self.workers_spawned.load(Ordering::Relaxed),
            workers_retired: self.workers_retired.load(Ordering::Relaxed),
            workers_lost: self.workers_lost.load(Ordering::Relaxed),
        }
    }
}

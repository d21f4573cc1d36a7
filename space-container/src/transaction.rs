//! 事务范围（Transaction Scope）
//!
//! 由外部事务管理器提供的工作单元：包裹一次“取数 + 分发”。
//! 提交与回滚都按值消费 [`Transaction`]，从类型上保证每个事务只结束一次。
//!
//! 回滚后条目是否回到空间（从而被重投）是网格侧的保证，引擎只依赖不实现。
//!
use crate::error::ContainerResult as Result;
use async_trait::async_trait;
use std::fmt;

/// 事务句柄
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Transaction {
    id: u64,
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.id)
    }
}

/// 事务管理器
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Transaction>;

    async fn commit(&self, tx: Transaction) -> Result<()>;

    async fn rollback(&self, tx: Transaction) -> Result<()>;
}

/// 一次调用的最终处置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Committed,
    RolledBack,
    /// 提交失败：事务句柄已交给管理器，引擎无法再回滚，最终结果由管理器决定
    CommitFailed,
    NoTransaction,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::CommitFailed => "commit_failed",
            Self::NoTransaction => "no_transaction",
        };
        f.write_str(s)
    }
}

/// 一次迭代的记录：由哪个 worker 处理、多少条目、如何结束
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub worker: usize,
    pub items: usize,
    pub disposition: Disposition,
}

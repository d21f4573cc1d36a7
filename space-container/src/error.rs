//! 容器统一错误定义
//!
//! 覆盖取数（space 访问）、监听器处理、事务、模板与配置校验、生命周期误用等
//! 最小必要集合；恢复策略依据 [`FailureKind`] 对错误进行分类。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContainerError {
    // --- 取数/空间访问 ---
    #[error("retrieval error: space={space}, reason={reason}")]
    Retrieval { space: String, reason: String },

    // --- 监听器 ---
    #[error("listener error: listener={listener}, reason={reason}")]
    Handler { listener: String, reason: String },

    // --- 事务 ---
    #[error("transaction error: stage={stage}, reason={reason}")]
    Transaction { stage: &'static str, reason: String },

    // --- 配置/类型（不可恢复） ---
    #[error("invalid template: {reason}")]
    InvalidTemplate { reason: String },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 生命周期 ---
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
}

/// 统一 Result 类型别名
pub type ContainerResult<T> = Result<T, ContainerError>;

/// 失败分类，决定恢复策略的走向
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 取数失败或网格不可达
    Retrieval,
    /// 监听器抛错
    Handler,
    /// 配置/类型错误，永不重试
    FatalConfiguration,
}

impl ContainerError {
    pub fn retrieval(space: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Retrieval {
            space: space.into(),
            reason: reason.into(),
        }
    }

    pub fn handler(listener: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            listener: listener.into(),
            reason: reason.into(),
        }
    }

    pub fn transaction(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Transaction {
            stage,
            reason: reason.into(),
        }
    }

    pub fn invalid_template(reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// 监听器返回的 `anyhow::Error`：若内部包裹的是本 crate 的错误则保留其分类，
    /// 否则一律视为监听器失败。
    pub fn from_listener(listener: &str, err: anyhow::Error) -> Self {
        match err.downcast::<ContainerError>() {
            Ok(inner) => inner,
            Err(other) => Self::handler(listener, format!("{other:#}")),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Retrieval { .. } | Self::Transaction { .. } => FailureKind::Retrieval,
            Self::Handler { .. } => FailureKind::Handler,
            Self::InvalidTemplate { .. }
            | Self::TypeMismatch { .. }
            | Self::InvalidConfig { .. }
            | Self::InvalidState { .. }
            | Self::Serde { .. } => FailureKind::FatalConfiguration,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == FailureKind::FatalConfiguration
    }
}

//! 查询源（QuerySource）
//!
//! 为每次取数提供模板。静态模式在容器初始化时求值一次并缓存；动态模式每轮迭代
//! 重新求值（例如基于轮转路由计数器）。
//!
//! 多个 worker 共享同一查询源时：若查询源未声明并发安全，容器通过一把互斥锁
//! 串行化调用，保证基于共享计数器的动态模板在所有 worker 合并后的序列严格递增。
//!
use crate::error::{ContainerError, ContainerResult as Result};
use crate::space::Template;
use std::sync::{Arc, Mutex, OnceLock};

pub trait QuerySource: Send + Sync {
    fn current_template(&self) -> Result<Template>;

    /// 是否可以被多个 worker 并发调用
    fn is_concurrency_safe(&self) -> bool {
        false
    }
}

impl QuerySource for Template {
    fn current_template(&self) -> Result<Template> {
        Ok(self.clone())
    }

    fn is_concurrency_safe(&self) -> bool {
        true
    }
}

/// 以闭包表达的动态查询源
pub struct DynamicQuery<F> {
    f: F,
    concurrency_safe: bool,
}

impl<F> DynamicQuery<F>
where
    F: Fn() -> Result<Template> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            concurrency_safe: false,
        }
    }

    /// 声明闭包可安全并发调用，容器将不再串行化
    pub fn concurrency_safe(mut self) -> Self {
        self.concurrency_safe = true;
        self
    }
}

impl<F> QuerySource for DynamicQuery<F>
where
    F: Fn() -> Result<Template> + Send + Sync,
{
    fn current_template(&self) -> Result<Template> {
        (self.f)()
    }

    fn is_concurrency_safe(&self) -> bool {
        self.concurrency_safe
    }
}

/// 容器内部对查询源的封装：静态缓存或（必要时串行化的）动态求值
pub(crate) struct TemplateSupplier {
    source: Arc<dyn QuerySource>,
    dynamic: bool,
    cached: OnceLock<Template>,
    gate: Option<Mutex<()>>,
}

impl TemplateSupplier {
    pub(crate) fn new(source: Arc<dyn QuerySource>, dynamic: bool) -> Self {
        let gate = (dynamic && !source.is_concurrency_safe()).then(|| Mutex::new(()));
        Self {
            source,
            dynamic,
            cached: OnceLock::new(),
            gate,
        }
    }

    /// 静态模式下求值并缓存一次；动态模式无操作
    pub(crate) fn prepare(&self) -> Result<()> {
        if self.dynamic || self.cached.get().is_some() {
            return Ok(());
        }
        let template = self.evaluate()?;
        let _ = self.cached.set(template);
        Ok(())
    }

    pub(crate) fn current(&self) -> Result<Template> {
        if !self.dynamic {
            return self.cached.get().cloned().ok_or_else(|| {
                ContainerError::invalid_state("static template requested before initialization")
            });
        }
        match &self.gate {
            Some(gate) => {
                let _guard = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                self.evaluate()
            }
            None => self.evaluate(),
        }
    }

    fn evaluate(&self) -> Result<Template> {
        self.source.current_template().map_err(|e| match e {
            ContainerError::InvalidTemplate { .. } | ContainerError::Retrieval { .. } => e,
            other => ContainerError::invalid_template(other.to_string()),
        })
    }
}

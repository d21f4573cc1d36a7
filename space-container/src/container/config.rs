use crate::error::{ContainerError, ContainerResult as Result};
use std::str::FromStr;
use std::time::Duration;

/// 容器配置（初始化后不可变）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerConfig {
    /// 启动状态下存活 worker 数的下限
    pub min_concurrent_workers: usize,
    /// 启动状态下存活 worker 数的上限
    pub max_concurrent_workers: usize,
    /// 单次取数的最长阻塞时间，同时也是停止延迟的上界
    pub receive_timeout: Duration,
    /// 是否以事务包裹每次“取数 + 分发”
    pub transactional: bool,
    /// 失败后重试前的退避时间
    pub recovery_interval: Duration,
    /// 连续失败多少次后自动暂停 worker（0 表示永不暂停）
    pub pause_after_consecutive_failures: u32,
    /// 批量结果整批交给监听器（否则逐条）
    pub pass_batch_as_array: bool,
    /// 初始化后是否立即启动
    pub auto_start: bool,
    /// 每轮迭代是否重新求值查询源
    pub dynamic_template: bool,
    /// 连续空取多少次后，多于下限的 worker 退出（0 表示不收缩）
    pub idle_receives_before_shrink: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            min_concurrent_workers: 1,
            max_concurrent_workers: 1,
            receive_timeout: Duration::from_secs(60),
            transactional: false,
            recovery_interval: Duration::from_secs(5),
            pause_after_consecutive_failures: 0,
            pass_batch_as_array: false,
            auto_start: true,
            dynamic_template: false,
            idle_receives_before_shrink: 3,
        }
    }
}

impl ContainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_concurrent_workers == 0 {
            return Err(ContainerError::invalid_config(
                "min_concurrent_workers must be at least 1",
            ));
        }
        if self.max_concurrent_workers < self.min_concurrent_workers {
            return Err(ContainerError::invalid_config(format!(
                "max_concurrent_workers ({}) is below min_concurrent_workers ({})",
                self.max_concurrent_workers, self.min_concurrent_workers
            )));
        }
        if self.receive_timeout.is_zero() {
            return Err(ContainerError::invalid_config(
                "receive_timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// 以默认值为底，读取 `SPACE_CONTAINER_*` 环境变量（时长单位为毫秒）
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_parse("SPACE_CONTAINER_MIN_WORKERS")? {
            config.min_concurrent_workers = v;
        }
        if let Some(v) = env_parse("SPACE_CONTAINER_MAX_WORKERS")? {
            config.max_concurrent_workers = v;
        }
        if let Some(v) = env_parse("SPACE_CONTAINER_RECEIVE_TIMEOUT_MS")? {
            config.receive_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse("SPACE_CONTAINER_TRANSACTIONAL")? {
            config.transactional = v;
        }
        if let Some(v) = env_parse("SPACE_CONTAINER_RECOVERY_INTERVAL_MS")? {
            config.recovery_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_parse("SPACE_CONTAINER_PAUSE_AFTER_FAILURES")? {
            config.pause_after_consecutive_failures = v;
        }
        if let Some(v) = env_parse("SPACE_CONTAINER_PASS_BATCH_AS_ARRAY")? {
            config.pass_batch_as_array = v;
        }
        if let Some(v) = env_parse("SPACE_CONTAINER_AUTO_START")? {
            config.auto_start = v;
        }
        if let Some(v) = env_parse("SPACE_CONTAINER_DYNAMIC_TEMPLATE")? {
            config.dynamic_template = v;
        }
        if let Some(v) = env_parse("SPACE_CONTAINER_IDLE_RECEIVES_BEFORE_SHRINK")? {
            config.idle_receives_before_shrink = v;
        }
        Ok(config)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ContainerError::invalid_config(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use space_container::{
    FailureListener, HandledData, InMemorySpace, InvocationContext, ListenerData, Space,
    SpaceItem, SpaceListener, WorkerFailure,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn order(id: &str) -> SpaceItem {
    SpaceItem::builder()
        .id(id.to_string())
        .type_name("Order")
        .payload(serde_json::json!({ "id": id }))
        .build()
}

pub async fn seed(space: &InMemorySpace, ids: &[&str]) -> anyhow::Result<()> {
    for id in ids {
        space.write(order(id)).await?;
    }
    Ok(())
}

/// 条件轮询，避免固定 sleep 的脆弱性
pub async fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    tokio::time::timeout(timeout, async {
        loop {
            if cond() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// 记录每次调用的监听器：可配置首次失败的条目、处理耗时与可接收形态
pub struct Recorder {
    pub handled: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<usize>>,
    pub attempts: Mutex<HashMap<String, usize>>,
    pub overlaps: AtomicUsize,
    /// 同时处于分发中的条目数峰值
    pub peak_in_flight: AtomicUsize,
    in_flight: Mutex<HashSet<String>>,
    fail_first: HashSet<String>,
    delay: Duration,
    accepts: HandledData,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            handled: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            overlaps: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            in_flight: Mutex::new(HashSet::new()),
            fail_first: HashSet::new(),
            delay: Duration::ZERO,
            accepts: HandledData::Any,
        }
    }

    pub fn failing_once(mut self, ids: &[&str]) -> Self {
        self.fail_first = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn accepting(mut self, accepts: HandledData) -> Self {
        self.accepts = accepts;
        self
    }

    pub fn handled_count(&self) -> usize {
        self.handled.lock().unwrap().len()
    }

    pub fn attempts_of(&self, id: &str) -> usize {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SpaceListener for Recorder {
    fn listener_name(&self) -> &str {
        "recorder"
    }

    fn handled_data(&self) -> HandledData {
        self.accepts
    }

    async fn on_data(&self, data: ListenerData, _ctx: &InvocationContext) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(data.len());
        let items = data.into_items();

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            for item in &items {
                if !in_flight.insert(item.id().to_string()) {
                    self.overlaps.fetch_add(1, Ordering::SeqCst);
                }
            }
            self.peak_in_flight.fetch_max(in_flight.len(), Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut result = Ok(());
        for item in &items {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let n = attempts.entry(item.id().to_string()).or_insert(0);
                *n += 1;
                *n
            };
            if attempt == 1 && self.fail_first.contains(item.id()) {
                result = Err(anyhow::anyhow!("first attempt of {} fails", item.id()));
                break;
            }
            self.handled.lock().unwrap().push(item.id().to_string());
        }

        for item in &items {
            self.in_flight.lock().unwrap().remove(item.id());
        }
        result
    }
}

/// 收集全部失败上报的监听器
pub fn failure_sink() -> (Arc<Mutex<Vec<WorkerFailure>>>, Arc<dyn FailureListener>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let listener: Arc<dyn FailureListener> = {
        let seen = seen.clone();
        Arc::new(move |f: &WorkerFailure| {
            seen.lock().unwrap().push(f.clone());
        })
    };
    (seen, listener)
}

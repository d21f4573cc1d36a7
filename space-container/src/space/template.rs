//! 匹配模板（Template）
//!
//! 描述一次取数要匹配的条目：类型名、路由值以及负载字段的等值条件。
//! 未设置的维度视为通配。真正的匹配由 `Space` 实现决定，这里给出的
//! `matches` 供内存实现与测试使用。
//!
use super::SpaceItem;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Builder, Serialize, Deserialize)]
pub struct Template {
    #[builder(into)]
    type_name: Option<String>,
    routing: Option<u64>,
    #[builder(default)]
    criteria: Map<String, Value>,
}

impl Template {
    /// 匹配任意条目
    pub fn any() -> Self {
        Self::default()
    }

    /// 仅按类型匹配
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    pub fn with_routing(mut self, routing: u64) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.insert(field.into(), value.into());
        self
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn routing(&self) -> Option<u64> {
        self.routing
    }

    pub fn criteria(&self) -> &Map<String, Value> {
        &self.criteria
    }

    pub fn matches(&self, item: &SpaceItem) -> bool {
        if let Some(t) = &self.type_name {
            if t != item.type_name() {
                return false;
            }
        }
        if let Some(r) = self.routing {
            if item.routing() != Some(r) {
                return false;
            }
        }
        self.criteria
            .iter()
            .all(|(k, v)| item.payload().get(k) == Some(v))
    }
}

//! 空间条目（SpaceItem）
//!
//! 写入空间、被模板匹配并最终交给监听器的数据单元。
//!
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SpaceItem {
    /// 条目唯一标识，缺省生成 UUID v4
    #[builder(into, default = Uuid::new_v4().to_string())]
    id: String,
    /// 条目类型名，模板按类型匹配
    #[builder(into)]
    type_name: String,
    /// 路由值（分区键），动态模板常用它做轮转
    routing: Option<u64>,
    /// 负载
    #[builder(default)]
    payload: Value,
    /// 写入时间
    #[builder(default = Utc::now())]
    written_at: DateTime<Utc>,
}

impl SpaceItem {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn routing(&self) -> Option<u64> {
        self.routing
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn written_at(&self) -> DateTime<Utc> {
        self.written_at
    }

    /// 将负载反序列化为具体类型
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> crate::error::ContainerResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

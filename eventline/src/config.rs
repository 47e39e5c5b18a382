//! 配置（EventlibConfig）
//!
//! 配置的加载方式由应用决定（环境变量、配置文件等），这里只定义结构与默认值，
//! 并支持从 JSON 反序列化。缺失连接配置时，连接管理器退化为“无连接”状态。
//!
use crate::consumer::ConsumerConfig;
use crate::dispatcher::DispatchMode;
use crate::error::EventResult as Result;
use crate::ip::IpResolver;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 默认的发布/订阅通道名
pub const DEFAULT_CHANNEL: &str = "eventlib";

/// 传输连接参数
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
}

impl ConnectionSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[derive(Builder, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EventlibConfig {
    /// 发布与订阅使用的通道
    #[builder(default = DEFAULT_CHANNEL.to_string())]
    pub channel: String,
    /// `process` 的路由方式
    #[builder(default)]
    pub mode: DispatchMode,
    /// 没有请求对象时使用的固定来源 IP
    pub local_geolocation_ip: Option<String>,
    /// 使用 `connections` 中的哪一项
    pub connection_name: Option<String>,
    /// 具名连接表
    #[builder(default)]
    pub connections: HashMap<String, ConnectionSettings>,
    /// 订阅循环是否把每条消息交给独立任务处理
    #[builder(default)]
    pub consumer_offload: bool,
}

impl Default for EventlibConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EventlibConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// 解析当前选中的连接；未选择或未定义时返回 `None`
    pub fn connection(&self) -> Option<&ConnectionSettings> {
        self.connections.get(self.connection_name.as_deref()?)
    }

    pub fn ip_resolver(&self) -> IpResolver {
        match &self.local_geolocation_ip {
            Some(ip) => IpResolver::with_override(ip.clone()),
            None => IpResolver::new(),
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            channel: self.channel.clone(),
            offload: self.consumer_offload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::UNKNOWN_IP;

    #[test]
    fn defaults_have_no_connection() {
        let config = EventlibConfig::default();
        assert_eq!(config.channel, DEFAULT_CHANNEL);
        assert_eq!(config.mode, DispatchMode::Local);
        assert!(config.connection().is_none());
        assert_eq!(config.ip_resolver().resolve(None), UNKNOWN_IP);
    }

    #[test]
    fn loads_named_connection_from_json() {
        let config = EventlibConfig::from_json(
            r#"{
                "mode": "publish",
                "connection_name": "default",
                "connections": {"default": {"host": "localhost", "port": 6379}},
                "local_geolocation_ip": "CHUCK NORRIS"
            }"#,
        )
        .unwrap();

        assert_eq!(config.mode, DispatchMode::Publish);
        assert_eq!(config.channel, DEFAULT_CHANNEL);
        assert_eq!(
            config.connection(),
            Some(&ConnectionSettings::new("localhost", 6379))
        );
        assert_eq!(config.ip_resolver().resolve(None), "CHUCK NORRIS");
    }

    #[test]
    fn unknown_connection_name_resolves_to_none() {
        let config = EventlibConfig::builder()
            .connection_name("missing".to_string())
            .build();
        assert!(config.connection().is_none());
        assert!(!config.consumer_config().offload);
    }
}

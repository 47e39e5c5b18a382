//! 发布/订阅传输（Transport）协议
//!
//! 传输层只负责把字符串消息体发布到具名通道，以及返回某通道的 `'static` 消息流。
//! 消息流中除数据消息外还可能出现订阅确认等控制消息，由消费方自行跳过。
//!
mod memory;
#[cfg(feature = "redis")]
mod redis;

use crate::error::EventResult as Result;
use async_trait::async_trait;
use futures_core::stream::BoxStream;

pub use memory::InMemoryTransport;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConnector, RedisTransport};

/// 消息种类
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// 订阅确认
    Subscribe,
    /// 退订确认
    Unsubscribe,
    /// 数据消息
    Message,
}

/// 通道上收到的一条消息
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportMessage {
    kind: MessageKind,
    channel: String,
    data: String,
}

impl TransportMessage {
    pub fn new(kind: MessageKind, channel: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind,
            channel: channel.into(),
            data: data.into(),
        }
    }

    pub fn message(channel: impl Into<String>, data: impl Into<String>) -> Self {
        Self::new(MessageKind::Message, channel, data)
    }

    pub fn subscribed(channel: impl Into<String>) -> Self {
        Self::new(MessageKind::Subscribe, channel, String::new())
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn is_data(&self) -> bool {
        self.kind == MessageKind::Message
    }
}

/// 发布/订阅传输
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发布消息体，返回收到消息的订阅者数量
    async fn publish(&self, channel: &str, body: String) -> Result<usize>;

    /// 订阅通道；返回 'static 生命周期的消息流，便于在 tokio::spawn 中使用
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Result<TransportMessage>>>;
}

//! 内存版传输（InMemoryTransport）
//!
//! 每个通道对应一个 `tokio::sync::broadcast`：
//! - `publish`：广播消息，无订阅者时视为非致命并返回 0；
//! - `subscribe`：先产出一条订阅确认，再转发通道上的数据消息；
//! - 典型用途：测试环境、示例与单进程部署。
//!
use super::{Transport, TransportMessage};
use crate::error::{EventError, EventResult as Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, future, stream};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct InMemoryTransport {
    channels: Arc<DashMap<String, broadcast::Sender<TransportMessage>>>,
    capacity: usize,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InMemoryTransport {
    /// 创建内存传输，`capacity` 为每个通道的广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity,
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<TransportMessage> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// 当前订阅某通道的接收端数量
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// 直接投递一条原始消息（含控制消息）
    pub fn inject(&self, message: TransportMessage) -> usize {
        self.sender(message.channel()).send(message).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, channel: &str, body: String) -> Result<usize> {
        Ok(self.inject(TransportMessage::message(channel, body)))
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Result<TransportMessage>>> {
        let rx = self.sender(channel).subscribe();
        let confirmation = TransportMessage::subscribed(channel);
        let messages = BroadcastStream::new(rx).map(|r| r.map_err(|e| EventError::transport(e.to_string())));
        Ok(Box::pin(
            stream::once(future::ready(Ok(confirmation))).chain(messages),
        ))
    }
}

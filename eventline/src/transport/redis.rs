//! 基于 Redis 发布/订阅的传输实现（需启用 `redis` 特性）
//!
//! Redis 的异步订阅流只产出数据消息，这里在流首补一条订阅确认，
//! 与内存实现保持一致的消息序列。
//!
use super::{Transport, TransportMessage};
use crate::config::ConnectionSettings;
use crate::connection::Connector;
use crate::error::{EventError, EventResult as Result};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, future, stream};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct RedisTransport {
    client: redis::Client,
    publisher: OnceCell<MultiplexedConnection>,
}

impl RedisTransport {
    pub fn open(settings: &ConnectionSettings) -> Result<Self> {
        let client = redis::Client::open(format!("redis://{}:{}/", settings.host, settings.port))?;
        Ok(Self {
            client,
            publisher: OnceCell::new(),
        })
    }

    async fn publisher(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .publisher
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn publish(&self, channel: &str, body: String) -> Result<usize> {
        let mut conn = self.publisher().await?;
        let receivers: usize = conn.publish(channel, body).await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Result<TransportMessage>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let confirmation = TransportMessage::subscribed(channel);
        let messages = pubsub.into_on_message().map(|msg| -> Result<TransportMessage> {
            let payload: String = msg
                .get_payload()
                .map_err(|e| EventError::transport(e.to_string()))?;
            Ok(TransportMessage::message(msg.get_channel_name(), payload))
        });
        Ok(Box::pin(
            stream::once(future::ready(Ok(confirmation))).chain(messages),
        ))
    }
}

/// 按连接配置创建 `RedisTransport`
#[derive(Clone, Copy, Debug, Default)]
pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(RedisTransport::open(settings)?))
    }
}

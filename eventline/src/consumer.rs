//! 订阅消费循环（EventConsumer）
//!
//! 订阅一个通道，逐条处理消息：
//! - 非数据消息（订阅确认等）直接跳过；
//! - 消息体解析为 JSON 对象，缺少 `name` 字段的消息跳过；
//! - 取出 `name`，其余字段交给 `Dispatcher::process_external`；
//! - 单条消息的任何失败（包括处理器 panic）都只记录到 `FailureSink`，循环继续；
//! - 通过 `ConsumerHandle` 关闭与等待，`join` 会等到已分派的消息处理完毕。
//!
use crate::config::{DEFAULT_CHANNEL, EventlibConfig};
use crate::connection::{ConnectionManager, Connector};
use crate::dispatcher::Dispatcher;
use crate::error::{EventError, EventResult as Result};
use crate::payload::{DATETIME_KEY, NAME_KEY, Payload, PayloadValue};
use crate::serializer::{SerializerRegistry, TypeHint};
use crate::transport::{Transport, TransportMessage};
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use futures_core::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 消费循环配置
#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    /// 订阅的通道
    pub channel: String,
    /// 每条消息交给独立任务处理（不保证处理顺序）
    pub offload: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            offload: false,
        }
    }
}

/// 单条消息处理失败的记录方式
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn record(&self, body: &str, error: &EventError);
}

/// 以 `warn` 级别日志记录失败
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFailureSink;

#[async_trait]
impl FailureSink for LogFailureSink {
    async fn record(&self, body: &str, error: &EventError) {
        warn!(error = %error, body, "failed to process event message");
    }
}

fn log_failure_sink() -> Arc<dyn FailureSink> {
    Arc::new(LogFailureSink)
}

/// 消费计数
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    skipped: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl ConsumerStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// 单条消息的处理结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Consumed {
    Processed,
    Skipped,
    Failed,
}

#[derive(Builder)]
pub struct EventConsumer {
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
    #[builder(default)]
    config: ConsumerConfig,
    #[builder(default = log_failure_sink())]
    failure_sink: Arc<dyn FailureSink>,
    #[builder(skip)]
    stats: Arc<ConsumerStats>,
}

impl EventConsumer {
    /// 按配置建立连接并构造消费者；未配置连接时返回 `Transport` 错误
    pub async fn from_config(
        config: &EventlibConfig,
        dispatcher: Arc<Dispatcher>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let connection = ConnectionManager::from_config(config, connector);
        let transport = connection
            .get_connection()
            .await?
            .ok_or_else(|| EventError::transport("no transport connection configured"))?;

        Ok(Self::builder()
            .dispatcher(dispatcher)
            .transport(transport)
            .config(config.consumer_config())
            .build())
    }

    /// 订阅通道并启动消费循环；返回时订阅已建立
    pub async fn start(self: Arc<Self>) -> Result<ConsumerHandle> {
        let stream = self.transport.subscribe(&self.config.channel).await?;
        debug!(channel = %self.config.channel, "consumer subscribed");

        let token = CancellationToken::new();
        let task = tokio::spawn(Self::listen(self.clone(), stream, token.clone()));

        Ok(ConsumerHandle {
            token,
            tasks: vec![task],
            stats: self.stats.clone(),
        })
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    async fn listen(
        self: Arc<Self>,
        mut stream: BoxStream<'static, Result<TransportMessage>>,
        token: CancellationToken,
    ) {
        let mut inflight = JoinSet::new();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(channel = %self.config.channel, "consumer shutting down");
                    break;
                }
                Some(done) = inflight.join_next(), if !inflight.is_empty() => {
                    log_join_error(done);
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => {
                            if self.config.offload {
                                let consumer = self.clone();
                                inflight.spawn(async move {
                                    consumer.consume(&message).await;
                                });
                            } else {
                                self.consume(&message).await;
                            }
                        }
                        Some(Err(err)) => {
                            warn!(channel = %self.config.channel, error = %err, "transport stream error");
                        }
                        None => {
                            warn!(channel = %self.config.channel, "subscription stream ended");
                            break;
                        }
                    }
                }
            }
        }

        // 等待已分派的消息处理完毕
        while let Some(done) = inflight.join_next().await {
            log_join_error(done);
        }
    }

    /// 处理一条消息，失败交给 `FailureSink` 记录而不向上传播
    pub async fn consume(&self, message: &TransportMessage) -> Consumed {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        if !message.is_data() {
            debug!(kind = ?message.kind(), channel = message.channel(), "control message skipped");
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return Consumed::Skipped;
        }

        let outcome = AssertUnwindSafe(self.dispatch(message.data()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(EventError::Handler {
                    handler: "external".to_string(),
                    reason: format!("panicked: {}", panic_message(panic.as_ref())),
                })
            });

        match outcome {
            Ok(true) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                Consumed::Processed
            }
            Ok(false) => {
                debug!(body = message.data(), "message without event name skipped");
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                Consumed::Skipped
            }
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.failure_sink.record(message.data(), &err).await;
                Consumed::Failed
            }
        }
    }

    async fn dispatch(&self, body: &str) -> Result<bool> {
        let Some((name, payload)) = decode_message(self.dispatcher.serializers(), body)? else {
            return Ok(false);
        };
        self.dispatcher.process_external(&name, payload).await?;
        Ok(true)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_join_error(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        if !err.is_cancelled() {
            warn!(error = %err, "consumer task failed");
        }
    }
}

/// 解码线上消息为 `(事件名, 其余字段)`
///
/// 不是 JSON 对象时返回 `MalformedMessage`；没有 `name` 字段时返回 `Ok(None)`。
/// `__datetime__` 按时间类型解码，其余字段保持结构化值。
pub fn decode_message(
    serializers: &SerializerRegistry,
    body: &str,
) -> Result<Option<(String, Payload)>> {
    let Value::Object(fields) = serde_json::from_str::<Value>(body)? else {
        return Err(EventError::MalformedMessage {
            reason: "expected a JSON object".to_string(),
        });
    };

    let name = match fields.get(NAME_KEY) {
        None => return Ok(None),
        Some(Value::String(name)) => name.clone(),
        Some(other) => {
            return Err(EventError::MalformedMessage {
                reason: format!("event name must be a string, got {other}"),
            });
        }
    };

    let mut payload = Payload::new();
    for (key, value) in fields {
        if key == NAME_KEY {
            continue;
        }
        let value = if key == DATETIME_KEY {
            serializers.decode(value, Some(TypeHint::of::<DateTime<Utc>>()))?
        } else {
            PayloadValue::from(value)
        };
        payload.insert(key, value);
    }

    Ok(Some((name, payload)))
}

/// 消费循环句柄：用于优雅关闭与等待任务结束
pub struct ConsumerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<ConsumerStats>,
}

impl ConsumerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            log_join_error(t.await);
        }
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.is_finished())
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

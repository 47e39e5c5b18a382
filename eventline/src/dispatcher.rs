//! 事件分发器（Dispatcher）
//!
//! `process` 是事件产生方的入口：解析事件类型 → 补全默认值 → 清理载荷 → 构造并校验 →
//! 按 `DispatchMode` 本地处理、延后处理或发布到通道。
//! `process_external` 是订阅循环的入口：载荷已在发送方补全过，这里不再补全，
//! 以保留事件来源的时间与 IP。
//!
use crate::config::{DEFAULT_CHANNEL, EventlibConfig};
use crate::connection::{ConnectionManager, Connector};
use crate::enrich::{Enricher, filter_data_values};
use crate::error::{EventError, EventResult as Result};
use crate::event::{DynEvent, EventData};
use crate::handler::{EventHandler, HandlerRegistry, HandlerScope};
use crate::payload::{NAME_KEY, Payload};
use crate::resolver::EventRegistry;
use crate::serializer::SerializerRegistry;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::dispatcher_builder::{IsUnset, SetHandlers, State as BuilderState};

/// `process` 的路由方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// 当前任务内直接处理
    #[default]
    Local,
    /// 交给 tokio 运行时在后台处理
    Deferred,
    /// 编码后发布到通道，由订阅方处理
    Publish,
}

/// 一次分发的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Deferred,
    Published { receivers: usize },
    /// 未配置连接，消息被丢弃
    Dropped,
}

#[derive(Builder)]
pub struct Dispatcher {
    events: Arc<EventRegistry>,
    serializers: Arc<SerializerRegistry>,
    #[builder(default, setters(vis = "pub(crate)"))]
    handlers: HandlerRegistry,
    #[builder(default)]
    enricher: Enricher,
    #[builder(default)]
    mode: DispatchMode,
    connection: Option<Arc<ConnectionManager>>,
    #[builder(default = DEFAULT_CHANNEL.to_string())]
    channel: String,
}

// 受 typestate 限制，`event_handlers` 只能在 `handlers` 尚未设置时调用一次
impl<S: BuilderState> DispatcherBuilder<S> {
    pub fn event_handlers(
        self,
        handlers: Vec<Arc<dyn EventHandler>>,
    ) -> DispatcherBuilder<SetHandlers<S>>
    where
        <S as BuilderState>::Handlers: IsUnset,
    {
        self.handlers(HandlerRegistry::new(handlers))
    }
}

impl Dispatcher {
    /// 按配置组装：路由方式、通道、IP 覆盖值与连接
    pub fn from_config(
        config: &EventlibConfig,
        events: Arc<EventRegistry>,
        serializers: Arc<SerializerRegistry>,
        handlers: Vec<Arc<dyn EventHandler>>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self::builder()
            .events(events)
            .serializers(serializers)
            .event_handlers(handlers)
            .enricher(Enricher::default().with_ip_resolver(config.ip_resolver()))
            .mode(config.mode)
            .connection(Arc::new(ConnectionManager::from_config(config, connector)))
            .channel(config.channel.clone())
            .build()
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// 处理本进程产生的事件
    pub async fn process(&self, name: &str, data: Payload) -> Result<Dispatch> {
        let event_type = self.events.find_event(name)?;

        let additions = self.enricher.get_default_values(&data);
        let mut payload = filter_data_values(&data);
        payload.extend(additions);

        let event = event_type.construct(EventData::new(name, payload))?;
        debug!(event = name, mode = ?self.mode, "dispatching event");

        match self.mode {
            DispatchMode::Local => {
                let handlers = self.handlers.matching(HandlerScope::Local, name);
                run_handlers(event.as_ref(), handlers, HandlerScope::Local).await?;
                Ok(Dispatch::Handled)
            }
            DispatchMode::Deferred => {
                let handlers = self.handlers.matching(HandlerScope::Local, name);
                tokio::spawn(async move {
                    let event_name = event.event_data().name().to_string();
                    if let Err(err) = run_handlers(event.as_ref(), handlers, HandlerScope::Local).await {
                        warn!(event = %event_name, error = %err, "deferred event processing failed");
                    }
                });
                Ok(Dispatch::Deferred)
            }
            DispatchMode::Publish => self.publish(event.event_data()).await,
        }
    }

    /// 处理经由通道到达的事件，不做默认值补全
    pub async fn process_external(&self, name: &str, data: Payload) -> Result<Dispatch> {
        let event_type = self.events.find_event(name)?;
        let event = event_type.construct(EventData::new(name, data))?;

        let handlers = self.handlers.matching(HandlerScope::External, name);
        run_handlers(event.as_ref(), handlers, HandlerScope::External).await?;
        Ok(Dispatch::Handled)
    }

    /// 编码并发布到通道；未配置连接时丢弃并返回 `Dispatch::Dropped`
    pub async fn publish(&self, data: &EventData) -> Result<Dispatch> {
        let body = self.encode_message(data)?;

        let transport = match &self.connection {
            Some(manager) => manager.get_connection().await?,
            None => None,
        };
        let Some(transport) = transport else {
            warn!(event = data.name(), "no transport connection, event dropped");
            return Ok(Dispatch::Dropped);
        };

        let receivers = transport.publish(&self.channel, body).await?;
        debug!(event = data.name(), channel = %self.channel, receivers, "event published");
        Ok(Dispatch::Published { receivers })
    }

    /// 编码为线上消息：`name` 在最前，随后是按序编码的载荷字段
    pub fn encode_message(&self, data: &EventData) -> Result<String> {
        let mut message = Map::new();
        message.insert(NAME_KEY.to_string(), Value::String(data.name().to_string()));

        for (key, value) in data.payload().iter() {
            if key == NAME_KEY {
                warn!(event = data.name(), "payload key `name` is shadowed by the event name");
                continue;
            }
            message.insert(key.to_string(), self.serializers.encode(value)?);
        }

        Ok(serde_json::to_string(&message)?)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("events", &self.events)
            .field("mode", &self.mode)
            .field("channel", &self.channel)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

/// 先执行事件自身的钩子，再依次执行匹配的处理器
///
/// 钩子失败直接返回；处理器失败会记录日志并继续执行其余处理器，最后返回第一个错误。
async fn run_handlers(
    event: &dyn DynEvent,
    handlers: Vec<Arc<dyn EventHandler>>,
    scope: HandlerScope,
) -> Result<()> {
    let hook = match scope {
        HandlerScope::Local => event.run_local().await,
        HandlerScope::External => event.run_external().await,
    };
    hook.map_err(|err| EventError::handler(event.type_name(), &err))?;

    let data = event.event_data();
    let mut first_error = None;
    for handler in handlers {
        if let Err(err) = handler.handle(data).await {
            warn!(
                handler = handler.handler_name(),
                event = data.name(),
                error = %err,
                "event handler failed"
            );
            first_error.get_or_insert_with(|| EventError::handler(handler.handler_name(), &err));
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

//! 事件处理器（EventHandler）
//!
//! 除事件类型自身的 `handle`/`handle_external` 钩子外，应用还可以按事件名
//! 挂载额外的处理器：本地处理器在 `process` 路径执行，外部处理器在订阅循环回放时执行。
//!
use crate::event::EventData;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum HandledEventType {
    One(String),
    Many(Vec<String>),
    All,
}

/// 处理器作用的路径
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HandlerScope {
    /// 事件在本进程产生时执行
    #[default]
    Local,
    /// 事件经由订阅通道到达时执行
    External,
}

/// 事件处理器：处理某一类型的事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于失败记录与日志）
    fn handler_name(&self) -> &str;
    /// 返回该处理器支持的事件名
    fn handled_event_type(&self) -> HandledEventType;
    /// 处理器挂载的路径
    fn scope(&self) -> HandlerScope {
        HandlerScope::Local
    }
    /// 处理事件
    async fn handle(&self, event: &EventData) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
struct Routes {
    by_name: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    all: Vec<Arc<dyn EventHandler>>,
}

impl Routes {
    fn add(&mut self, handler: Arc<dyn EventHandler>) {
        match handler.handled_event_type() {
            HandledEventType::All => self.all.push(handler),
            HandledEventType::One(name) => {
                self.by_name.entry(name).or_default().push(handler);
            }
            HandledEventType::Many(names) => {
                for name in names {
                    self.by_name.entry(name).or_default().push(handler.clone());
                }
            }
        }
    }

    fn matching(&self, event_name: &str) -> Vec<Arc<dyn EventHandler>> {
        let mut merged: Vec<Arc<dyn EventHandler>> = Vec::new();
        if let Some(list) = self.by_name.get(event_name) {
            merged.extend(list.iter().cloned());
        }
        merged.extend(self.all.iter().cloned());
        merged
    }
}

/// 按路径与事件名索引的处理器表
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    local: Routes,
    external: Routes,
}

impl HandlerRegistry {
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        let mut registry = Self::default();
        for handler in handlers {
            match handler.scope() {
                HandlerScope::Local => registry.local.add(handler),
                HandlerScope::External => registry.external.add(handler),
            }
        }
        registry
    }

    pub fn matching(&self, scope: HandlerScope, event_name: &str) -> Vec<Arc<dyn EventHandler>> {
        match scope {
            HandlerScope::Local => self.local.matching(event_name),
            HandlerScope::External => self.external.matching(event_name),
        }
    }
}

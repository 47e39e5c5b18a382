//! 事件类型解析（EventRegistry）
//!
//! 启动阶段按“命名空间 + 类型名”显式登记事件类型，运行期通过事件名查找：
//! `app.Signup` -> 模块 `app.events` -> 类型 `Signup`。
//! 成功的查找结果缓存在 `DashMap` 中，并发读取无竞争。
//!
use crate::error::{EventError, EventResult as Result};
use crate::event::{self, DynEvent, Event, EventData};
use crate::name::{self, EventName};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Factory = fn(EventData) -> Result<Box<dyn DynEvent>>;

/// 已登记事件类型的句柄
pub struct EventType {
    name: String,
    module_path: String,
    type_name: &'static str,
    factory: Factory,
}

impl EventType {
    fn of<E: Event>(namespace: &str) -> Self {
        Self {
            name: format!("{namespace}.{}", E::TYPE_NAME),
            module_path: name::module_path(namespace),
            type_name: E::TYPE_NAME,
            factory: event::construct::<E>,
        }
    }

    /// 完整事件名，如 `app.Signup`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 构造事件实例，构造时立即校验必需键
    pub fn construct(&self, data: EventData) -> Result<Box<dyn DynEvent>> {
        (self.factory)(data)
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventType")
            .field("name", &self.name)
            .field("module_path", &self.module_path)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// 一个命名空间下的事件集合，由应用在启动时安装
pub trait EventModule {
    const NAMESPACE: &'static str;

    fn register(module: ModuleRegistrar<'_>) -> Result<()>;
}

/// 事件类型登记表
#[derive(Default)]
pub struct EventRegistry {
    modules: HashMap<String, HashMap<&'static str, Arc<EventType>>>,
    cache: DashMap<String, Arc<EventType>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在 `namespace` 下登记事件类型；重复登记返回 `DuplicateEvent`
    pub fn register<E: Event>(&mut self, namespace: &str) -> Result<()> {
        let event_type = EventType::of::<E>(namespace);
        // 命名空间与类型名拼接后必须是合法事件名
        EventName::parse(event_type.name())?;

        let module = self
            .modules
            .entry(event_type.module_path.clone())
            .or_default();
        if module.contains_key(E::TYPE_NAME) {
            return Err(EventError::DuplicateEvent {
                name: event_type.name,
            });
        }
        module.insert(E::TYPE_NAME, Arc::new(event_type));
        Ok(())
    }

    /// 面向单个命名空间的链式登记
    pub fn module(&mut self, namespace: &'static str) -> ModuleRegistrar<'_> {
        ModuleRegistrar {
            registry: self,
            namespace,
        }
    }

    /// 安装一个事件模块
    pub fn install<M: EventModule>(&mut self) -> Result<()> {
        M::register(self.module(M::NAMESPACE))
    }

    /// 按事件名查找事件类型
    pub fn find_event(&self, name: &str) -> Result<Arc<EventType>> {
        if let Some(hit) = self.cache.get(name) {
            return Ok(hit.value().clone());
        }

        let parsed = EventName::parse(name)?;
        let module_path = parsed.module_path();
        let found = self
            .modules
            .get(&module_path)
            .and_then(|module| module.get(parsed.type_name()))
            .cloned()
            .ok_or_else(|| EventError::EventNotFound {
                name: name.to_string(),
                module: module_path.clone(),
                class: parsed.type_name().to_string(),
            })?;

        self.cache.insert(name.to_string(), found.clone());
        Ok(found)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_event(name).is_ok()
    }

    /// 全部已登记事件名（排序后）
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .values()
            .flat_map(|module| module.values().map(|t| t.name.clone()))
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.event_names())
            .finish()
    }
}

/// 链式登记器：`registry.module("app").register::<A>()?.register::<B>()?;`
pub struct ModuleRegistrar<'a> {
    registry: &'a mut EventRegistry,
    namespace: &'static str,
}

impl<'a> ModuleRegistrar<'a> {
    pub fn register<E: Event>(self) -> Result<Self> {
        self.registry.register::<E>(self.namespace)?;
        Ok(self)
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }
}

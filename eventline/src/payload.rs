//! 事件载荷（Payload）
//!
//! 载荷是按插入顺序排列的 `String -> PayloadValue` 映射。除了可直接上线的结构化值
//! （字符串/数字/布尔/null/对象/列表）之外，还可以携带任意领域对象（`DynValue`，
//! 例如时间戳）以及不可序列化的请求上下文（`PayloadValue::Request`）。
//!
use crate::ip::RequestContext;
use serde_json::{Map, Number, Value};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 线上消息中携带事件名的字段
pub const NAME_KEY: &str = "name";
/// 请求上下文的保留字段，永远不会上线
pub const REQUEST_KEY: &str = "request";
/// 事件创建时间
pub const DATETIME_KEY: &str = "__datetime__";
/// 事件来源 IP
pub const IP_ADDRESS_KEY: &str = "__ip_address__";

/// 类型擦除的领域对象，保留 `TypeId` 以便在序列化注册表中查找编解码器
#[derive(Clone)]
pub struct DynValue {
    type_id: TypeId,
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl DynValue {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    pub(crate) fn from_boxed(
        type_id: TypeId,
        type_name: &'static str,
        inner: Box<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            type_id,
            type_name,
            inner: Arc::from(inner),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub(crate) fn as_any(&self) -> &(dyn Any + Send + Sync) {
        &*self.inner
    }
}

impl fmt::Debug for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DynValue<{}>", self.type_name)
    }
}

/// 载荷中的单个值
#[derive(Clone)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<PayloadValue>),
    Map(Payload),
    Object(DynValue),
    Request(Arc<dyn RequestContext>),
}

impl PayloadValue {
    pub fn object<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::Object(DynValue::new(value))
    }

    pub fn request<R>(request: R) -> Self
    where
        R: RequestContext + 'static,
    {
        Self::Request(Arc::new(request))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&dyn RequestContext> {
        match self {
            Self::Request(r) => Some(r.as_ref()),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Object(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for PayloadValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            // 领域对象与请求上下文只按同一实例比较
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            (Self::Request(a), Self::Request(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PayloadValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "{b:?}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Map(map) => map.fmt(f),
            Self::Object(v) => v.fmt(f),
            Self::Request(_) => f.write_str("<request>"),
        }
    }
}

impl From<Value> for PayloadValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(Payload::from(map)),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for PayloadValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Payload> for PayloadValue {
    fn from(value: Payload) -> Self {
        Self::Map(value)
    }
}

impl<T> From<Option<T>> for PayloadValue
where
    T: Into<PayloadValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// 按插入顺序排列的载荷映射
#[derive(Clone, Default, PartialEq)]
pub struct Payload {
    entries: Vec<(String, PayloadValue)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入键值；键已存在时原地替换并返回旧值
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PayloadValue>,
    ) -> Option<PayloadValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// 移除键值，保持其余条目的顺序
    pub fn remove(&mut self, key: &str) -> Option<PayloadValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PayloadValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Payload
where
    K: Into<String>,
    V: Into<PayloadValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        payload.extend(iter);
        payload
    }
}

impl<K, V> Extend<(K, V)> for Payload
where
    K: Into<String>,
    V: Into<PayloadValue>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for Payload {
    type Item = (String, PayloadValue);
    type IntoIter = std::vec::IntoIter<(String, PayloadValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

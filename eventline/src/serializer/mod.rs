//! 序列化注册表（SerializerRegistry）
//!
//! 按类型登记编解码器，把载荷中的任意值转换为可上线的结构化形态（JSON 树）：
//! - 结构化值原样通过，列表与映射递归处理；
//! - 领域对象按其 `TypeId` 查找序列化函数，未登记则返回 `Serialization` 错误；
//! - 解码不是自描述的：只有调用方提供类型提示时才会还原为领域对象。
//!
//! 注册在启动阶段通过 `&mut self` 完成，之后以 `Arc` 共享只读使用。
//!
pub mod datetime;

use crate::error::{EventError, EventResult as Result};
use crate::payload::{DynValue, Payload, PayloadValue};
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use datetime::{DateTimeCodec, NaiveDateTimeCodec};

/// 某一类型的编解码能力
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Value>;

    fn decode(&self, value: &Value) -> Result<T>;
}

/// 解码时的目标类型提示
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeHint {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeHint {
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

type SerializeFn = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Result<Value> + Send + Sync>;
type DeserializeFn = Box<dyn Fn(&Value) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync>;

struct SerializerEntry {
    type_name: &'static str,
    serialize: SerializeFn,
}

struct DeserializerEntry {
    type_name: &'static str,
    deserialize: DeserializeFn,
}

/// 类型 -> 编解码器 注册表
#[derive(Default)]
pub struct SerializerRegistry {
    serializers: HashMap<TypeId, SerializerEntry>,
    deserializers: HashMap<TypeId, DeserializerEntry>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置时间类型编解码器的注册表
    pub fn with_builtin_codecs() -> Result<Self> {
        let mut registry = Self::new();
        datetime::register(&mut registry)?;
        Ok(registry)
    }

    /// 登记序列化函数；同一类型重复登记返回 `DuplicateCodec`
    pub fn register_serializer<T, F>(&mut self, f: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> Result<Value> + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();
        if self.serializers.contains_key(&type_id) {
            return Err(EventError::DuplicateCodec {
                type_name: type_name.to_string(),
            });
        }

        let serialize: SerializeFn = Box::new(move |any| match any.downcast_ref::<T>() {
            Some(value) => f(value),
            None => Err(EventError::Serialization {
                type_name: type_name.to_string(),
            }),
        });
        self.serializers.insert(
            type_id,
            SerializerEntry {
                type_name,
                serialize,
            },
        );
        Ok(())
    }

    /// 登记反序列化函数，与序列化函数相互独立（允许只支持单向）
    pub fn register_deserializer<T, F>(&mut self, f: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Value) -> Result<T> + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();
        if self.deserializers.contains_key(&type_id) {
            return Err(EventError::DuplicateCodec {
                type_name: type_name.to_string(),
            });
        }

        let deserialize: DeserializeFn = Box::new(move |value| {
            f(value).map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
        });
        self.deserializers.insert(
            type_id,
            DeserializerEntry {
                type_name,
                deserialize,
            },
        );
        Ok(())
    }

    /// 同时登记序列化与反序列化
    pub fn register_codec<T, C>(&mut self, codec: C) -> Result<()>
    where
        T: Any + Send + Sync,
        C: Codec<T> + 'static,
    {
        let codec = Arc::new(codec);
        let encoder = codec.clone();
        self.register_serializer::<T, _>(move |value| encoder.encode(value))?;
        self.register_deserializer::<T, _>(move |value| codec.decode(value))
    }

    pub fn has_serializer<T: Any>(&self) -> bool {
        self.serializers.contains_key(&TypeId::of::<T>())
    }

    pub fn has_deserializer<T: Any>(&self) -> bool {
        self.deserializers.contains_key(&TypeId::of::<T>())
    }

    /// 编码单个载荷值为结构化值
    pub fn encode(&self, value: &PayloadValue) -> Result<Value> {
        match value {
            PayloadValue::Null => Ok(Value::Null),
            PayloadValue::Bool(b) => Ok(Value::Bool(*b)),
            PayloadValue::Number(n) => Ok(Value::Number(n.clone())),
            PayloadValue::String(s) => Ok(Value::String(s.clone())),
            PayloadValue::List(items) => items
                .iter()
                .map(|item| self.encode(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            PayloadValue::Map(map) => self.encode_payload(map).map(Value::Object),
            PayloadValue::Object(object) => self.encode_object(object),
            PayloadValue::Request(_) => Err(EventError::Serialization {
                type_name: "request context".to_string(),
            }),
        }
    }

    /// 编码整个载荷，保持键顺序
    pub fn encode_payload(&self, payload: &Payload) -> Result<Map<String, Value>> {
        payload
            .iter()
            .map(|(key, value)| self.encode(value).map(|v| (key.to_string(), v)))
            .collect()
    }

    fn encode_object(&self, object: &DynValue) -> Result<Value> {
        let entry = self
            .serializers
            .get(&object.type_id())
            .ok_or_else(|| EventError::Serialization {
                type_name: object.type_name().to_string(),
            })?;
        (entry.serialize)(object.as_any())
    }

    /// 解码结构化值；无类型提示时原样返回
    pub fn decode(&self, value: Value, hint: Option<TypeHint>) -> Result<PayloadValue> {
        let Some(hint) = hint else {
            return Ok(PayloadValue::from(value));
        };

        let entry = self.deserializer_for(hint)?;
        let decoded = (entry.deserialize)(&value)?;
        Ok(PayloadValue::Object(DynValue::from_boxed(
            hint.type_id,
            entry.type_name,
            decoded,
        )))
    }

    /// 按具体类型解码
    pub fn decode_as<T: Any>(&self, value: &Value) -> Result<T> {
        let hint = TypeHint::of::<T>();
        let entry = self.deserializer_for(hint)?;
        let decoded = (entry.deserialize)(value)?;
        decoded
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| EventError::Deserialization {
                type_name: hint.type_name.to_string(),
            })
    }

    fn deserializer_for(&self, hint: TypeHint) -> Result<&DeserializerEntry> {
        self.deserializers
            .get(&hint.type_id)
            .ok_or_else(|| EventError::Deserialization {
                type_name: hint.type_name.to_string(),
            })
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializers: Vec<_> = self.serializers.values().map(|e| e.type_name).collect();
        let mut deserializers: Vec<_> = self.deserializers.values().map(|e| e.type_name).collect();
        serializers.sort_unstable();
        deserializers.sort_unstable();
        f.debug_struct("SerializerRegistry")
            .field("serializers", &serializers)
            .field("deserializers", &deserializers)
            .finish()
    }
}

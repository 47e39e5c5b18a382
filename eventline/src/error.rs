//! 事件层统一错误定义
//!
//! 覆盖事件名解析、事件类型查找、载荷校验、序列化以及传输/处理器等最小必要集合，
//! 便于在调用方与消费循环中统一处理为 `EventError`。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventError {
    // --- 事件名解析/查找 ---
    #[error("The name \"{name}\" is invalid. Make sure you are using the \"app.KlassName\" format")]
    InvalidEventName { name: String },
    #[error(
        "Event \"{name}\" not found. Make sure you have a class called \"{class}\" inside the \"{module}\" module."
    )]
    EventNotFound {
        name: String,
        module: String,
        class: String,
    },
    #[error("event already registered: {name}")]
    DuplicateEvent { name: String },

    // --- 载荷校验 ---
    #[error("One of the following keys are missing from the event's data: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    // --- 序列化 ---
    #[error("no serializer registered for type {type_name}")]
    Serialization { type_name: String },
    #[error("no deserializer registered for type {type_name}")]
    Deserialization { type_name: String },
    #[error("codec already registered: type={type_name}")]
    DuplicateCodec { type_name: String },
    #[error("serde error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },
    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },

    // --- 传输/处理器 ---
    #[error("transport error: {reason}")]
    Transport { reason: String },
    #[error("event handler error: handler={handler}, reason={reason}")]
    Handler { handler: String, reason: String },
}

impl EventError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn handler(handler: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: err.to_string(),
        }
    }
}

/// 统一 Result 类型别名
pub type EventResult<T> = Result<T, EventError>;

impl From<chrono::ParseError> for EventError {
    fn from(err: chrono::ParseError) -> Self {
        EventError::Parse {
            reason: err.to_string(),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for EventError {
    fn from(err: redis::RedisError) -> Self {
        EventError::transport(err.to_string())
    }
}

//! 事件名（EventName）
//!
//! 事件名形如 `app.Signup`：恰好一个 `.`，前半为命名空间，后半为类型名。
//! 命名空间按约定对应模块 `app.events`。
//!
use crate::error::{EventError, EventResult as Result};
use std::fmt;
use std::str::FromStr;

/// 命名空间下存放事件类型的约定模块名
pub const EVENTS_MODULE: &str = "events";

/// 已校验的事件名
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventName {
    raw: String,
    dot: usize,
}

impl EventName {
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || EventError::InvalidEventName {
            name: name.to_string(),
        };

        let mut dots = name.match_indices('.');
        let (dot, _) = dots.next().ok_or_else(invalid)?;
        if dots.next().is_some() || dot == 0 || dot + 1 == name.len() {
            return Err(invalid());
        }

        Ok(Self {
            raw: name.to_string(),
            dot,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn namespace(&self) -> &str {
        &self.raw[..self.dot]
    }

    pub fn type_name(&self) -> &str {
        &self.raw[self.dot + 1..]
    }

    /// 约定模块路径：`<namespace>.events`
    pub fn module_path(&self) -> String {
        module_path(self.namespace())
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for EventName {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

pub(crate) fn module_path(namespace: &str) -> String {
    format!("{namespace}.{EVENTS_MODULE}")
}

/// 拆分事件名，返回 `(模块路径, 类型名)`
pub fn parse_event_name(name: &str) -> Result<(String, String)> {
    let parsed = EventName::parse(name)?;
    Ok((parsed.module_path(), parsed.type_name().to_string()))
}

//! 时间类型编解码器
//!
//! `DateTime<Utc>` 以 RFC 3339 上线；`NaiveDateTime` 以不带时区的 ISO-8601
//! （`2012-09-26T14:31:00`，有亚秒部分时追加小数）上线。两者解码时都兼容对方的格式。
//!
use super::{Codec, SerializerRegistry};
use crate::error::{EventError, EventResult as Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// 登记内置的时间编解码器
pub fn register(registry: &mut SerializerRegistry) -> Result<()> {
    registry.register_codec::<DateTime<Utc>, _>(DateTimeCodec)?;
    registry.register_codec::<NaiveDateTime, _>(NaiveDateTimeCodec)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DateTimeCodec;

impl Codec<DateTime<Utc>> for DateTimeCodec {
    fn encode(&self, value: &DateTime<Utc>) -> Result<Value> {
        Ok(Value::String(
            value.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ))
    }

    fn decode(&self, value: &Value) -> Result<DateTime<Utc>> {
        let raw = expect_str(value)?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Ok(parsed.with_timezone(&Utc)),
            Err(_) => Ok(NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)?.and_utc()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NaiveDateTimeCodec;

impl Codec<NaiveDateTime> for NaiveDateTimeCodec {
    fn encode(&self, value: &NaiveDateTime) -> Result<Value> {
        Ok(Value::String(value.format(NAIVE_FORMAT).to_string()))
    }

    fn decode(&self, value: &Value) -> Result<NaiveDateTime> {
        let raw = expect_str(value)?;
        match NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT) {
            Ok(parsed) => Ok(parsed),
            Err(_) => Ok(DateTime::parse_from_rfc3339(raw)?.naive_utc()),
        }
    }
}

fn expect_str(value: &Value) -> Result<&str> {
    value.as_str().ok_or_else(|| EventError::Parse {
        reason: format!("expected an ISO-8601 string, found {value}"),
    })
}

//! 事件基础契约（Event）
//!
//! 每个事件类型由 `(事件名, 原始载荷)` 构造：
//! - `EventSpec`：类型名、必需键与构造方式（可由 `#[event]` 宏生成）；
//! - `Event`：校验与处理钩子（本地处理 `handle`、外部回放 `handle_external`）；
//! - `DynEvent`：类型擦除后的对象安全版本，供解析器与分发器使用。
//!
use crate::error::{EventError, EventResult as Result};
use crate::payload::{Payload, PayloadValue};
use async_trait::async_trait;

/// 事件名与载荷
#[derive(Clone, Debug, PartialEq)]
pub struct EventData {
    name: String,
    payload: Payload,
}

impl EventData {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.payload.get(key)
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// 所有必需键都存在时返回 `true`，否则列出缺失的键（保持调用方给出的顺序）
    pub fn validate_keys(&self, required: &[&str]) -> Result<bool> {
        let missing: Vec<String> = required
            .iter()
            .filter(|key| !self.payload.contains_key(key))
            .map(|key| key.to_string())
            .collect();

        if missing.is_empty() {
            Ok(true)
        } else {
            Err(EventError::Validation { missing })
        }
    }
}

/// 事件类型的静态描述
pub trait EventSpec: Send + Sync + Sized + 'static {
    /// 类型名，即事件名中 `.` 之后的部分
    const TYPE_NAME: &'static str;
    /// 构造时必须存在的载荷键
    const REQUIRED_KEYS: &'static [&'static str] = &[];

    fn from_data(data: EventData) -> Self;

    fn data(&self) -> &EventData;
}

/// 事件处理契约
#[async_trait]
pub trait Event: EventSpec {
    /// 构造后立即执行的校验，默认检查 `REQUIRED_KEYS`
    fn validate(&self) -> Result<()> {
        self.data().validate_keys(Self::REQUIRED_KEYS).map(|_| ())
    }

    /// 本地处理
    async fn handle(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// 由订阅循环回放的外部事件处理
    async fn handle_external(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 类型擦除的事件
#[async_trait]
pub trait DynEvent: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn event_data(&self) -> &EventData;

    async fn run_local(&self) -> anyhow::Result<()>;

    async fn run_external(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<E> DynEvent for E
where
    E: Event,
{
    fn type_name(&self) -> &'static str {
        E::TYPE_NAME
    }

    fn event_data(&self) -> &EventData {
        self.data()
    }

    async fn run_local(&self) -> anyhow::Result<()> {
        Event::handle(self).await
    }

    async fn run_external(&self) -> anyhow::Result<()> {
        Event::handle_external(self).await
    }
}

/// 构造并立即校验
pub(crate) fn construct<E: Event>(data: EventData) -> Result<Box<dyn DynEvent>> {
    let event = E::from_data(data);
    event.validate()?;
    Ok(Box::new(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MyEvent {
        data: EventData,
    }

    impl EventSpec for MyEvent {
        const TYPE_NAME: &'static str = "MyEvent";
        const REQUIRED_KEYS: &'static [&'static str] = &["name"];

        fn from_data(data: EventData) -> Self {
            Self { data }
        }

        fn data(&self) -> &EventData {
            &self.data
        }
    }

    impl Event for MyEvent {}

    fn lincoln() -> EventData {
        let payload: Payload = [
            ("name", PayloadValue::from("Lincoln")),
            ("age", PayloadValue::from(25i64)),
            ("answer", PayloadValue::from(42i64)),
        ]
        .into_iter()
        .collect();
        EventData::new("stuff", payload)
    }

    #[test]
    fn validate_keys_succeeds_when_all_present() {
        let event = MyEvent::from_data(lincoln());
        assert!(event.data().validate_keys(&["name", "age"]).unwrap());
    }

    #[test]
    fn validate_keys_lists_missing_keys_in_order() {
        let event = MyEvent::from_data(lincoln());
        let err = event.data().validate_keys(&["unknown", "blah"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "One of the following keys are missing from the event's data: unknown, blah"
        );
    }

    #[test]
    fn construction_validates_eagerly() {
        assert!(construct::<MyEvent>(lincoln()).is_ok());

        let err = construct::<MyEvent>(EventData::new("app.MyEvent", Payload::new()))
            .err()
            .expect("missing required key");
        assert!(matches!(err, EventError::Validation { ref missing } if missing == &["name"]));
    }

    #[tokio::test]
    async fn default_hooks_are_no_ops() {
        let event = construct::<MyEvent>(lincoln()).unwrap();
        assert_eq!(event.type_name(), "MyEvent");
        assert!(event.run_local().await.is_ok());
        assert!(event.run_external().await.is_ok());
        assert_eq!(event.event_data().name(), "stuff");
    }
}

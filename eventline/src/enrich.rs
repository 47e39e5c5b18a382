//! 载荷补全与清理
//!
//! - `Enricher::get_default_values`：存在请求上下文时补充创建时间与来源 IP；
//! - `filter_data_values`：上线前去除空值与请求上下文。
//!
use crate::ip::IpResolver;
use crate::payload::{DATETIME_KEY, IP_ADDRESS_KEY, Payload, PayloadValue, REQUEST_KEY};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// 时间来源
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定时间，便于测试
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 默认值补全器
#[derive(Clone)]
pub struct Enricher {
    clock: Arc<dyn Clock>,
    ip_resolver: IpResolver,
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), IpResolver::default())
    }
}

impl Enricher {
    pub fn new(clock: Arc<dyn Clock>, ip_resolver: IpResolver) -> Self {
        Self { clock, ip_resolver }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ip_resolver(mut self, ip_resolver: IpResolver) -> Self {
        self.ip_resolver = ip_resolver;
        self
    }

    /// 仅当载荷中有 `request` 键时同时补充时间与 IP，否则不补充任何字段
    pub fn get_default_values(&self, data: &Payload) -> Payload {
        let Some(request) = data.get(REQUEST_KEY) else {
            return Payload::new();
        };

        let mut defaults = Payload::new();
        defaults.insert(DATETIME_KEY, PayloadValue::object(self.clock.now()));
        defaults.insert(
            IP_ADDRESS_KEY,
            self.ip_resolver.resolve(request.as_request()),
        );
        defaults
    }
}

impl fmt::Debug for Enricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enricher")
            .field("ip_resolver", &self.ip_resolver)
            .finish_non_exhaustive()
    }
}

/// 复制载荷并去掉值为空或为请求上下文的条目
pub fn filter_data_values(data: &Payload) -> Payload {
    data.iter()
        .filter(|(_, value)| !(value.is_null() || value.is_request()))
        .map(|(key, value)| (key, value.clone()))
        .collect()
}

//! 来源 IP 解析
//!
//! 请求对象被视为不透明能力：只需要能给出转发头（`X-Forwarded-For`）的值。
//! 解析规则：从左到右取第一个公网地址；若全部为内网/回环地址则返回 `0.0.0.0`。
//!
use std::fmt;
use std::net::IpAddr;

/// 无法确定来源时的占位地址
pub const UNKNOWN_IP: &str = "0.0.0.0";

/// 请求上下文：能够提供转发地址列表（逗号分隔，客户端在前）
pub trait RequestContext: Send + Sync {
    fn forwarded_for(&self) -> Option<&str>;
}

/// 最简单的请求上下文实现，只保存转发头
#[derive(Clone, Debug, Default)]
pub struct HeaderRequest {
    forwarded_for: Option<String>,
}

impl HeaderRequest {
    pub fn new(forwarded_for: impl Into<String>) -> Self {
        Self {
            forwarded_for: Some(forwarded_for.into()),
        }
    }
}

impl RequestContext for HeaderRequest {
    fn forwarded_for(&self) -> Option<&str> {
        self.forwarded_for.as_deref()
    }
}

/// IP 解析器
///
/// `local_override` 对应本地开发时的固定地址：没有请求对象时原样返回。
#[derive(Clone, Default)]
pub struct IpResolver {
    local_override: Option<String>,
}

impl IpResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(local_override: impl Into<String>) -> Self {
        let local_override = local_override.into();
        Self {
            local_override: (!local_override.is_empty()).then_some(local_override),
        }
    }

    pub fn resolve(&self, request: Option<&dyn RequestContext>) -> String {
        let Some(request) = request else {
            return self
                .local_override
                .clone()
                .unwrap_or_else(|| UNKNOWN_IP.to_string());
        };

        request
            .forwarded_for()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .find(|candidate| is_public(candidate))
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_IP.to_string())
    }
}

impl fmt::Debug for IpResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpResolver")
            .field("local_override", &self.local_override)
            .finish()
    }
}

fn is_public(candidate: &str) -> bool {
    match candidate.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            !(ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified())
        }
        Ok(IpAddr::V6(ip)) => {
            let unique_local = (ip.segments()[0] & 0xfe00) == 0xfc00;
            let link_local = (ip.segments()[0] & 0xffc0) == 0xfe80;
            !(ip.is_loopback() || ip.is_unspecified() || unique_local || link_local)
        }
        Err(_) => false,
    }
}

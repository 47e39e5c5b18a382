//! 传输连接管理
//!
//! 首次调用 `get_connection` 时按配置建立连接并缓存；没有连接配置时
//! 缓存并始终返回 `None`（无连接），而不是报错。
//!
use crate::config::{ConnectionSettings, EventlibConfig};
use crate::error::EventResult as Result;
use crate::transport::Transport;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// 按连接参数创建传输
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Transport>>;
}

/// 总是返回同一个传输实例的连接器（内存传输、测试）
#[derive(Clone)]
pub struct SharedConnector {
    transport: Arc<dyn Transport>,
}

impl SharedConnector {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Connector for SharedConnector {
    async fn connect(&self, _settings: &ConnectionSettings) -> Result<Arc<dyn Transport>> {
        Ok(self.transport.clone())
    }
}

pub struct ConnectionManager {
    settings: Option<ConnectionSettings>,
    connector: Arc<dyn Connector>,
    conn: OnceCell<Option<Arc<dyn Transport>>>,
}

impl ConnectionManager {
    pub fn new(settings: Option<ConnectionSettings>, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            connector,
            conn: OnceCell::new(),
        }
    }

    pub fn from_config(config: &EventlibConfig, connector: Arc<dyn Connector>) -> Self {
        Self::new(config.connection().cloned(), connector)
    }

    /// 获取（必要时建立）连接；无连接配置时返回 `Ok(None)`
    ///
    /// 建立失败不会被缓存，下次调用会重试。
    pub async fn get_connection(&self) -> Result<Option<Arc<dyn Transport>>> {
        self.conn
            .get_or_try_init(|| async {
                match &self.settings {
                    Some(settings) => {
                        debug!(host = %settings.host, port = settings.port, "connecting transport");
                        self.connector.connect(settings).await.map(Some)
                    }
                    None => {
                        debug!("no transport connection configured");
                        Ok(None)
                    }
                }
            })
            .await
            .cloned()
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &self.settings)
            .field("connected", &self.conn.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventError;
    use crate::transport::InMemoryTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingConnector {
        calls: AtomicUsize,
        seen: std::sync::Mutex<Vec<ConnectionSettings>>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Transport>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(settings.clone());
            Ok(Arc::new(InMemoryTransport::default()))
        }
    }

    struct FailingConnector;

    #[async_trait]
    impl Connector for FailingConnector {
        async fn connect(&self, _settings: &ConnectionSettings) -> Result<Arc<dyn Transport>> {
            Err(EventError::transport("connection refused"))
        }
    }

    #[tokio::test]
    async fn connects_once_and_reuses_connection() {
        let connector = Arc::new(CountingConnector::default());
        let manager = ConnectionManager::new(
            Some(ConnectionSettings::new("localhost", 6379)),
            connector.clone(),
        );

        let first = manager.get_connection().await.unwrap().unwrap();
        let second = manager.get_connection().await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            connector.seen.lock().unwrap().as_slice(),
            &[ConnectionSettings::new("localhost", 6379)]
        );
    }

    #[tokio::test]
    async fn missing_settings_yield_no_connection_consistently() {
        let connector = Arc::new(CountingConnector::default());
        let manager = ConnectionManager::from_config(&EventlibConfig::default(), connector.clone());

        assert!(manager.get_connection().await.unwrap().is_none());
        assert!(manager.get_connection().await.unwrap().is_none());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_connections_are_reported() {
        let manager = ConnectionManager::new(
            Some(ConnectionSettings::new("localhost", 1)),
            Arc::new(FailingConnector),
        );
        assert!(matches!(
            manager.get_connection().await,
            Err(EventError::Transport { .. })
        ));
    }
}

//! 事件通知层（eventline）
//!
//! 应用以“命名空间.类型名”产生结构化事件，本 crate 负责：
//! - 事件类型登记与按名解析（`resolver`、`name`）
//! - 事件契约与载荷校验（`event`），创建时间与来源 IP 的补全（`enrich`、`ip`）
//! - 按类型登记的编解码器，把载荷编码为可上线的 JSON（`serializer`）
//! - 本地处理、延后处理或发布到通道的分发器（`dispatcher`）
//! - 订阅通道并回放外部事件的消费循环（`consumer`），以及传输与连接管理
//!   （`transport`、`connection`）
//!
//! 所有登记表都在启动阶段显式构建，之后以 `Arc` 共享，不使用全局单例。
//!
//! 典型用法：
//! 1. 用 `#[event]` 宏或手写 `EventSpec` 定义事件，在 `EventRegistry` 中按命名空间登记；
//! 2. 构建 `SerializerRegistry`（可从 `with_builtin_codecs` 开始）并登记领域类型的编解码器；
//! 3. 用 `Dispatcher::builder()` 或 `Dispatcher::from_config` 组装分发器，调用 `process`；
//! 4. 订阅方用 `EventConsumer` 启动消费循环，通过 `ConsumerHandle` 关闭。
//!
pub mod config;
pub mod connection;
pub mod consumer;
pub mod dispatcher;
pub mod enrich;
pub mod error;
pub mod event;
pub mod handler;
pub mod ip;
pub mod name;
pub mod payload;
pub mod resolver;
pub mod serializer;
pub mod transport;

pub use config::{ConnectionSettings, EventlibConfig};
pub use consumer::{ConsumerHandle, EventConsumer};
pub use dispatcher::{Dispatch, DispatchMode, Dispatcher};
pub use error::{EventError, EventResult};
pub use event::{Event, EventData, EventSpec};
pub use payload::{Payload, PayloadValue};
pub use resolver::{EventModule, EventRegistry};
pub use serializer::SerializerRegistry;

// 允许在本 crate 内部通过 ::eventline 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::eventline 路径。
extern crate self as eventline;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use eventline::connection::{ConnectionManager, SharedConnector};
use eventline::consumer::{ConsumerConfig, EventConsumer};
use eventline::enrich::{Enricher, FixedClock};
use eventline::event::{Event, EventData};
use eventline::handler::{EventHandler, HandledEventType, HandlerScope};
use eventline::ip::HeaderRequest;
use eventline::payload::{DATETIME_KEY, IP_ADDRESS_KEY, Payload, PayloadValue};
use eventline::transport::{InMemoryTransport, Transport};
use eventline::{
    ConnectionSettings, Dispatch, DispatchMode, Dispatcher, EventError, EventRegistry,
    EventlibConfig, SerializerRegistry,
};
use eventline_macros::event;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[event(required = ["email"])]
struct Signup;

impl Event for Signup {}

#[derive(Clone, Default)]
struct Inbox {
    seen: Arc<Mutex<Vec<EventData>>>,
}

impl Inbox {
    fn snapshot(&self) -> Vec<EventData> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for Inbox {
    fn handler_name(&self) -> &str {
        "inbox"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::One("app.Signup".into())
    }

    fn scope(&self) -> HandlerScope {
        HandlerScope::External
    }

    async fn handle(&self, event: &EventData) -> anyhow::Result<()> {
        if event.get("email").and_then(|v| v.as_str()) == Some("boom") {
            panic!("inbox exploded");
        }
        self.seen.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// 先标记开始，停顿一段时间后才记录事件
#[derive(Clone, Default)]
struct SlowInbox {
    inbox: Inbox,
    started: Arc<AtomicBool>,
}

#[async_trait]
impl EventHandler for SlowInbox {
    fn handler_name(&self) -> &str {
        "slow-inbox"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::One("app.Signup".into())
    }

    fn scope(&self) -> HandlerScope {
        HandlerScope::External
    }

    async fn handle(&self, event: &EventData) -> anyhow::Result<()> {
        self.started.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.inbox.handle(event).await
    }
}

fn registries() -> (Arc<EventRegistry>, Arc<SerializerRegistry>) {
    let mut events = EventRegistry::new();
    events.register::<Signup>("app").unwrap();
    (
        Arc::new(events),
        Arc::new(SerializerRegistry::with_builtin_codecs().unwrap()),
    )
}

fn external_dispatcher(handler: Arc<dyn EventHandler>) -> Arc<Dispatcher> {
    let (events, serializers) = registries();
    Arc::new(
        Dispatcher::builder()
            .events(events)
            .serializers(serializers)
            .event_handlers(vec![handler])
            .build(),
    )
}

fn consumer(transport: Arc<InMemoryTransport>, inbox: Inbox, offload: bool) -> Arc<EventConsumer> {
    let dispatcher = external_dispatcher(Arc::new(inbox));

    Arc::new(
        EventConsumer::builder()
            .dispatcher(dispatcher)
            .transport(transport)
            .config(ConsumerConfig {
                offload,
                ..ConsumerConfig::default()
            })
            .build(),
    )
}

async fn wait_for(inbox: &Inbox, count: usize) -> bool {
    // 使用 timeout + 轮询条件，减少固定 sleep 带来的不确定性
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if inbox.snapshot().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test(flavor = "multi_thread")]
async fn forwards_payload_without_name_exactly_once() -> AnyResult<()> {
    let transport = Arc::new(InMemoryTransport::default());
    let inbox = Inbox::default();
    let handle = consumer(transport.clone(), inbox.clone(), false)
        .start()
        .await?;

    transport
        .publish("eventlib", r#"{"name":"app.Signup","email":"a@b.com"}"#.into())
        .await?;

    assert!(wait_for(&inbox, 1).await, "event was not consumed in time");
    // 给潜在的重复投递留出时间
    tokio::time::sleep(Duration::from_millis(50)).await;

    let seen = inbox.snapshot();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].name(), "app.Signup");
    let expected: Payload = [("email", "a@b.com")].into_iter().collect();
    assert_eq!(seen[0].payload(), &expected);

    handle.shutdown();
    handle.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_messages_do_not_stop_the_loop() -> AnyResult<()> {
    let transport = Arc::new(InMemoryTransport::default());
    let inbox = Inbox::default();
    let handle = consumer(transport.clone(), inbox.clone(), false)
        .start()
        .await?;

    for body in [
        "not json",
        r#"{"email":"nameless@b.com"}"#,
        r#"{"name":"app.Unknown"}"#,
        r#"{"name":"app.Signup"}"#,
        r#"{"name":"app.Signup","email":"after@b.com"}"#,
    ] {
        transport.publish("eventlib", body.to_string()).await?;
    }

    assert!(wait_for(&inbox, 1).await, "loop stopped after a bad message");
    let stats = handle.stats();
    let settled = tokio::time::timeout(Duration::from_secs(2), async {
        while stats.processed() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok();
    assert!(settled);

    let seen = inbox.snapshot();
    assert_eq!(
        seen[0].get("email").and_then(|v| v.as_str()),
        Some("after@b.com")
    );

    // 订阅确认 + 5 条数据消息
    assert_eq!(stats.received(), 6);
    assert_eq!(stats.skipped(), 2);
    assert_eq!(stats.failed(), 3);
    assert_eq!(stats.processed(), 1);

    handle.shutdown();
    handle.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn provenance_survives_the_round_trip() -> AnyResult<()> {
    let transport = Arc::new(InMemoryTransport::default());
    let inbox = Inbox::default();
    let handle = consumer(transport.clone(), inbox.clone(), true)
        .start()
        .await?;

    let origin_time = Utc.with_ymd_and_hms(2012, 9, 26, 14, 31, 0).unwrap();
    let (events, serializers) = registries();
    let publisher = Dispatcher::builder()
        .events(events)
        .serializers(serializers)
        .enricher(Enricher::default().with_clock(Arc::new(FixedClock(origin_time))))
        .mode(DispatchMode::Publish)
        .connection(Arc::new(ConnectionManager::new(
            Some(ConnectionSettings::new("localhost", 6379)),
            Arc::new(SharedConnector::new(transport.clone())),
        )))
        .build();

    let payload: Payload = [
        ("email", PayloadValue::from("a@b.com")),
        (
            "request",
            PayloadValue::request(HeaderRequest::new("127.0.0.1,10.0.0.1,150.164.211.1")),
        ),
    ]
    .into_iter()
    .collect();
    let outcome = publisher.process("app.Signup", payload).await?;
    assert_eq!(outcome, Dispatch::Published { receivers: 1 });

    assert!(wait_for(&inbox, 1).await, "published event was not consumed");
    let seen = inbox.snapshot();
    let received = seen[0].payload();
    assert_eq!(
        received.keys().collect::<Vec<_>>(),
        vec!["email", DATETIME_KEY, IP_ADDRESS_KEY]
    );
    assert_eq!(
        received
            .get(DATETIME_KEY)
            .and_then(|v| v.downcast_ref::<DateTime<Utc>>()),
        Some(&origin_time)
    );
    assert_eq!(
        received.get(IP_ADDRESS_KEY).and_then(|v| v.as_str()),
        Some("150.164.211.1")
    );

    handle.shutdown();
    handle.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_the_loop() -> AnyResult<()> {
    let transport = Arc::new(InMemoryTransport::default());
    let inbox = Inbox::default();
    let handle = consumer(transport.clone(), inbox.clone(), false)
        .start()
        .await?;
    assert_eq!(transport.subscriber_count("eventlib"), 1);

    handle.shutdown();
    handle.join().await;

    // 循环结束后订阅被释放，新消息无人接收
    assert_eq!(transport.subscriber_count("eventlib"), 0);
    assert_eq!(
        transport
            .publish("eventlib", r#"{"name":"app.Signup","email":"late@b.com"}"#.into())
            .await?,
        0
    );
    assert!(inbox.snapshot().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_handler_does_not_stop_the_loop() -> AnyResult<()> {
    let transport = Arc::new(InMemoryTransport::default());
    let inbox = Inbox::default();
    let handle = consumer(transport.clone(), inbox.clone(), false)
        .start()
        .await?;

    transport
        .publish("eventlib", r#"{"name":"app.Signup","email":"boom"}"#.into())
        .await?;
    let receivers = transport
        .publish("eventlib", r#"{"name":"app.Signup","email":"after@b.com"}"#.into())
        .await?;
    assert_eq!(receivers, 1);

    assert!(wait_for(&inbox, 1).await, "loop stopped after a handler panic");
    let seen = inbox.snapshot();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].get("email").and_then(|v| v.as_str()),
        Some("after@b.com")
    );
    assert_eq!(handle.stats().failed(), 1);
    assert!(!handle.is_finished());

    handle.shutdown();
    handle.join().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn join_waits_for_offloaded_messages() -> AnyResult<()> {
    let transport = Arc::new(InMemoryTransport::default());
    let slow = SlowInbox::default();
    let handle = Arc::new(
        EventConsumer::builder()
            .dispatcher(external_dispatcher(Arc::new(slow.clone())))
            .transport(transport.clone())
            .config(ConsumerConfig {
                offload: true,
                ..ConsumerConfig::default()
            })
            .build(),
    )
    .start()
    .await?;

    transport
        .publish("eventlib", r#"{"name":"app.Signup","email":"a@b.com"}"#.into())
        .await?;

    let started = tokio::time::timeout(Duration::from_secs(2), async {
        while !slow.started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok();
    assert!(started);
    assert!(slow.inbox.snapshot().is_empty());

    handle.shutdown();
    handle.join().await;

    // 关闭前已开始处理的消息在 join 返回前完成
    assert_eq!(slow.inbox.snapshot().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_consumer_uses_the_named_connection() -> AnyResult<()> {
    let transport = Arc::new(InMemoryTransport::default());
    let inbox = Inbox::default();
    let config = EventlibConfig::from_json(
        r#"{
            "channel": "accounts",
            "connection_name": "default",
            "connections": {"default": {"host": "localhost", "port": 6379}}
        }"#,
    )?;

    let consumer = EventConsumer::from_config(
        &config,
        external_dispatcher(Arc::new(inbox.clone())),
        Arc::new(SharedConnector::new(transport.clone())),
    )
    .await?;
    let handle = Arc::new(consumer).start().await?;
    assert_eq!(transport.subscriber_count("accounts"), 1);

    transport
        .publish("accounts", r#"{"name":"app.Signup","email":"a@b.com"}"#.into())
        .await?;
    assert!(wait_for(&inbox, 1).await, "configured consumer did not receive");

    handle.shutdown();
    handle.join().await;

    let err = EventConsumer::from_config(
        &EventlibConfig::default(),
        external_dispatcher(Arc::new(inbox)),
        Arc::new(SharedConnector::new(transport)),
    )
    .await
    .err()
    .expect("no connection configured");
    assert!(matches!(err, EventError::Transport { .. }));
    Ok(())
}

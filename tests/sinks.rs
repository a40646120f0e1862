mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use calvisor::link::mock::{self, MockConnector, MockDevice};
use calvisor::{
    Config, DeviceLink, Endpoint, Event, OutwardForwarder, OutwardMessage, SensorKind,
    SessionState, Subscribe, Supervisor,
};
use tokio::time;

use common::{PREFLIGHT_CALIBRATION, connected};

async fn with_sinks(sinks: Vec<Arc<dyn Subscribe>>) -> (Arc<Supervisor>, MockDevice, DeviceLink) {
    let (link, device) = mock::pair(1, 1);
    let connector = MockConnector::new();
    connector.push_link(link);
    let sup = Supervisor::builder(Config::default(), connector)
        .with_subscribers(sinks)
        .build();
    device.heartbeat();
    let link = sup.connect(&Endpoint::new("mock")).await.expect("connected");
    (sup, device, link)
}

async fn run_gyro(sup: &Supervisor, device: &MockDevice, link: &DeviceLink) -> bool {
    let handle = sup.start_session(SensorKind::Gyro, link);
    device.next_command().await.expect("calibration request");
    device.ack(PREFLIGHT_CALIBRATION, 0);
    device.status_text("[cal] progress <45>");
    device.status_text("[cal] calibration done: gyro");
    handle.wait().await.succeeded()
}

#[derive(Default)]
struct Counter(AtomicUsize);

impl Counter {
    async fn wait_for(&self, n: usize) -> usize {
        for _ in 0..100 {
            if self.0.load(Ordering::SeqCst) >= n {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subscribe for Counter {
    async fn on_event(&self, _ev: &Event) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Stuck;

#[async_trait]
impl Subscribe for Stuck {
    async fn on_event(&self, _ev: &Event) {
        std::future::pending::<()>().await;
    }

    fn queue_capacity(&self) -> usize {
        2
    }
}

struct Panicky;

#[async_trait]
impl Subscribe for Panicky {
    async fn on_event(&self, ev: &Event) {
        panic!("sink cannot handle {}", ev.status.as_label());
    }
}

#[tokio::test(start_paused = true)]
async fn outward_forwarder_renders_the_session() {
    let (outward, mut lines) = OutwardForwarder::channel(64);
    let (sup, device, link) = with_sinks(vec![Arc::new(outward) as Arc<dyn Subscribe>]).await;

    assert!(run_gyro(&sup, &device, &link).await);

    let mut seen = Vec::new();
    while let Some(line) = lines.recv().await {
        let msg: OutwardMessage = serde_json::from_str(&line).expect("valid json");
        let done = msg.status.starts_with("success:") || msg.status.starts_with("failed:");
        seen.push(msg);
        if done {
            break;
        }
    }

    let statuses: Vec<&str> = seen.iter().map(|m| m.status.as_str()).collect();
    assert_eq!(
        statuses,
        vec![
            "Connecting to device...",
            "Waiting for heartbeat...",
            "Heartbeat from system 1 component 1",
            "Calibration command sent",
            "Calibration command accepted",
            "Calibration progress: 45%",
            "success: Calibration completed successfully",
        ]
    );
    assert_eq!(seen[5].progress, Some(45));
    assert_eq!(seen.iter().filter(|m| m.progress.is_some()).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn misbehaving_sinks_do_not_hold_up_sessions_or_each_other() {
    let counter = Arc::new(Counter::default());
    let sinks: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Stuck), Arc::new(Panicky), counter.clone()];
    let (sup, device, link) = with_sinks(sinks).await;

    assert!(run_gyro(&sup, &device, &link).await);
    assert_eq!(counter.wait_for(7).await, 7);

    assert!(run_gyro(&sup, &device, &link).await);
    assert_eq!(counter.wait_for(14).await, 14);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_sink_receives_nothing_more() {
    let (sup, device, link) = connected(Config::default()).await;
    let counter = Arc::new(Counter::default());

    let handle = sup.subscribe(counter.clone());
    assert!(run_gyro(&sup, &device, &link).await);
    assert_eq!(counter.wait_for(7).await, 7);

    assert!(sup.unsubscribe(handle));
    assert!(run_gyro(&sup, &device, &link).await);
    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(counter.0.load(Ordering::SeqCst), 7);
}

#[tokio::test(start_paused = true)]
async fn tracker_lists_only_unfinished_sessions() {
    let (sup, device, link) = connected(Config::default()).await;

    let handle = sup.start_session(SensorKind::Magnetometer, &link);
    device.next_command().await.expect("calibration request");
    device.ack(PREFLIGHT_CALIBRATION, 0);
    time::sleep(Duration::from_millis(100)).await;

    assert_eq!(handle.state(), SessionState::InProgress);
    assert_eq!(
        sup.active_sessions().await,
        vec![(handle.id(), SensorKind::Magnetometer)]
    );

    device.status_text("[cal] calibration done: mag");
    assert!(handle.wait().await.succeeded());

    let mut active = sup.active_sessions().await;
    for _ in 0..100 {
        if active.is_empty() {
            break;
        }
        time::sleep(Duration::from_millis(10)).await;
        active = sup.active_sessions().await;
    }
    assert!(active.is_empty());
}

//! Progress & metrics bus: typed pub/sub over `ProgressEvent`, with
//! rate-limited batching per streaming subscriber.

use agentgate_core::{Id, ProgressEvent, ProgressEventKind};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct BusConfig {
    pub max_events_per_second: u32,
    pub batch_window: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_events_per_second: 50,
            batch_window: Duration::from_millis(100),
        }
    }
}

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    rate_per_sec: f64,
    last: Instant,
}

impl TokenBucket {
    fn new(max_per_sec: u32) -> Self {
        let capacity = (max_per_sec.max(1)) as f64;
        Self {
            capacity,
            tokens: capacity,
            rate_per_sec: capacity,
            last: Instant::now(),
        }
    }

    fn try_take(&mut self, n: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }
}

fn coalesce_or_push(window: &mut Vec<ProgressEvent>, event: ProgressEvent) {
    if let ProgressEventKind::AgentOutput { content } = &event.kind {
        if let Some(last) = window.last_mut() {
            if last.work_order_id == event.work_order_id
                && last.run_id == event.run_id
                && matches!(last.kind, ProgressEventKind::AgentOutput { .. })
            {
                if let ProgressEventKind::AgentOutput { content: prev } = &mut last.kind {
                    prev.push_str(content);
                    return;
                }
            }
        }
    }
    window.push(event);
}

async fn run_batcher(
    mut raw_rx: mpsc::Receiver<ProgressEvent>,
    batch_tx: mpsc::Sender<Vec<ProgressEvent>>,
    config: BusConfig,
) {
    let mut bucket = TokenBucket::new(config.max_events_per_second);
    let mut window: Vec<ProgressEvent> = Vec::new();
    let mut ticker = tokio::time::interval(config.batch_window);

    loop {
        tokio::select! {
            maybe_event = raw_rx.recv() => {
                match maybe_event {
                    Some(event) if event.kind.is_critical() => {
                        if batch_tx.send(vec![event]).await.is_err() {
                            return;
                        }
                    }
                    Some(event) => coalesce_or_push(&mut window, event),
                    None => {
                        if !window.is_empty() {
                            let _ = batch_tx.send(std::mem::take(&mut window)).await;
                        }
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if window.is_empty() {
                    continue;
                }
                if bucket.try_take(window.len() as f64) {
                    let batch = std::mem::take(&mut window);
                    if batch_tx.send(batch).await.is_err() {
                        return;
                    }
                }
                // else: under-budget, keep accumulating until the bucket refills
                // or the bounded upstream channel applies backpressure.
            }
        }
    }
}

/// A registered listener, as distinct from a streaming batch subscriber: its
/// callback runs inline on publish and errors are caught and logged.
type Listener = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

pub struct ProgressBus {
    config: BusConfig,
    subscribers: dashmap::DashMap<Id, mpsc::Sender<ProgressEvent>>,
    listeners: dashmap::DashMap<Id, Listener>,
}

impl ProgressBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            subscribers: dashmap::DashMap::new(),
            listeners: dashmap::DashMap::new(),
        }
    }

    /// Register a streaming subscriber. Returns its id (for `unsubscribe`)
    /// and a receiver of batched event groups.
    pub fn subscribe(&self) -> (Id, mpsc::Receiver<Vec<ProgressEvent>>) {
        let id = Id::new();
        let buffer = (self.config.max_events_per_second as usize * 10).max(1);
        let (raw_tx, raw_rx) = mpsc::channel(buffer);
        let (batch_tx, batch_rx) = mpsc::channel(buffer);
        self.subscribers.insert(id.clone(), raw_tx);
        tokio::spawn(run_batcher(raw_rx, batch_tx, self.config.clone()));
        (id, batch_rx)
    }

    pub fn unsubscribe(&self, id: &Id) {
        self.subscribers.remove(id);
    }

    /// Register an inline listener. Errors from the callback panic-unwind
    /// boundary are caught and logged, never propagated to the publisher.
    pub fn listen(&self, listener: Listener) -> Id {
        let id = Id::new();
        self.listeners.insert(id.clone(), listener);
        id
    }

    pub fn unlisten(&self, id: &Id) {
        self.listeners.remove(id);
    }

    pub async fn publish(&self, event: ProgressEvent) {
        for entry in self.listeners.iter() {
            let listener = entry.value();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&event)));
            if let Err(panic) = result {
                warn!(?panic, "progress bus listener panicked");
            }
        }
        for entry in self.subscribers.iter() {
            if entry.value().send(event.clone()).await.is_err() {
                warn!(subscriber = %entry.key(), "dropping dead progress bus subscriber");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::Id as CoreId;

    fn event(work_order_id: &str, run_id: &str, kind: ProgressEventKind) -> ProgressEvent {
        ProgressEvent::new(
            CoreId::from(work_order_id),
            CoreId::from(run_id),
            kind,
        )
    }

    #[tokio::test]
    async fn critical_events_bypass_batching_window() {
        let bus = ProgressBus::new(BusConfig {
            max_events_per_second: 1,
            batch_window: Duration::from_secs(60),
        });
        let (_id, mut rx) = bus.subscribe();
        bus.publish(event(
            "w",
            "r",
            ProgressEventKind::RunFailed {
                error: agentgate_core::BuildError::new(agentgate_core::ErrorKind::SystemError, "boom"),
            },
        ))
        .await;
        let batch = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("critical event delivered promptly")
            .unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn agent_output_coalesces_within_a_window() {
        let bus = ProgressBus::new(BusConfig {
            max_events_per_second: 100,
            batch_window: Duration::from_millis(30),
        });
        let (_id, mut rx) = bus.subscribe();
        bus.publish(event(
            "w",
            "r",
            ProgressEventKind::AgentOutput { content: "hello ".into() },
        ))
        .await;
        bus.publish(event(
            "w",
            "r",
            ProgressEventKind::AgentOutput { content: "world".into() },
        ))
        .await;
        let batch = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("batch delivered")
            .unwrap();
        assert_eq!(batch.len(), 1);
        match &batch[0].kind {
            ProgressEventKind::AgentOutput { content } => assert_eq!(content, "hello world"),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = ProgressBus::new(BusConfig::default());
        let (id, mut rx) = bus.subscribe();
        bus.unsubscribe(&id);
        bus.publish(event("w", "r", ProgressEventKind::Heartbeat)).await;
        let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err(), "no batch should ever arrive after unsubscribe");
    }

    #[tokio::test]
    async fn listener_panic_is_caught() {
        let bus = ProgressBus::new(BusConfig::default());
        bus.listen(Box::new(|_event| panic!("listener blew up")));
        bus.publish(event("w", "r", ProgressEventKind::Heartbeat)).await;
    }
}

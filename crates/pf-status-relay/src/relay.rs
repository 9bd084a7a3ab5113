//! Relay task orchestration
//!
//! Runs the inspector, the monitor and the event bridge as three tasks that
//! share one cancellation token and one task tracker.

use crate::config::QUEUE_CAPACITY;
use crate::inspector::Inspector;
use crate::monitor::Monitor;
use crate::registry::Registry;
use crate::subscribe::EventBridge;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

pub struct Relay {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl Relay {
    /// Prime readiness for every PF, then spawn the relay tasks.
    ///
    /// `events` is the link notification stream; without it the inspector
    /// exits at once and readiness stays as primed.
    pub async fn start(
        registry: Arc<Registry>,
        polling_interval: Duration,
        events: Option<BoxStream<'static, u32>>,
        token: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let tracker = TaskTracker::new();

        let inspector = Inspector::new(registry.clone(), rx);
        inspector.prime().await;

        match events {
            Some(events) => {
                let bridge = EventBridge::new(registry.indexes(), tx);
                tracker.spawn(bridge.run(events, token.clone()));
            }
            None => drop(tx),
        }

        tracker.spawn(inspector.run(token.clone()));
        tracker.spawn(Monitor::new(registry.clone(), polling_interval).run(token.clone()));
        tracker.close();

        info!(
            interfaces = registry.len(),
            interval_ms = polling_interval.as_millis() as u64,
            "relay started"
        );

        Self { tracker, token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Wait for all relay tasks to finish.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Cancel all relay tasks and wait for them.
    pub async fn shutdown(self) {
        debug!("stopping relay");
        self.token.cancel();
        self.tracker.wait().await;
        info!("relay stopped");
    }
}

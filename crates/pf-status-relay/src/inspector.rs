//! Readiness inspection
//!
//! The inspector decides which PFs are ready for LACP monitoring. It checks
//! every PF once at startup, then re-checks a PF whenever a link notification
//! for its index shows an operational state change.

use crate::pf::Pf;
use crate::registry::Registry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct Inspector {
    registry: Arc<Registry>,
    queue: mpsc::Receiver<u32>,
}

impl Inspector {
    pub fn new(registry: Arc<Registry>, queue: mpsc::Receiver<u32>) -> Self {
        Self { registry, queue }
    }

    /// Initial readiness pass over every PF. A PF that fails the check stays
    /// not ready and does not affect the others.
    pub async fn prime(&self) {
        debug!("LACP inspection and processing started");

        for pf in self.registry.pfs() {
            match pf.inspect(self.registry.netlink()).await {
                Ok(()) => {
                    pf.set_ready(true);
                    info!(interface = %pf.name(), index = pf.index(), "pf is ready");
                }
                Err(e) => {
                    pf.set_ready(false);
                    error!(
                        interface = %pf.name(),
                        index = pf.index(),
                        error = %e,
                        "pf is not ready"
                    );
                }
            }
        }
    }

    /// Process link change events until cancelled or the queue closes.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(routine = "inspect", "ctx cancelled");
                    return;
                }
                event = self.queue.recv() => match event {
                    Some(index) => self.handle_event(index).await,
                    None => {
                        debug!(routine = "inspect", "event queue closed");
                        return;
                    }
                },
            }
        }
    }

    /// Refresh the PF behind `index` and re-evaluate its readiness if its
    /// operational state changed.
    pub async fn handle_event(&self, index: u32) {
        debug!(index, "processing event");

        let Some(pf) = self.registry.get(index) else {
            debug!(index, "event for unknown interface ignored");
            return;
        };

        match pf.update(self.registry.netlink()).await {
            Ok(true) => self.reinspect(pf).await,
            Ok(false) => {}
            Err(e) => {
                error!(interface = %pf.name(), index, error = %e, "failed to update link");
            }
        }
    }

    async fn reinspect(&self, pf: &Pf) {
        let result = pf.inspect(self.registry.netlink()).await;
        let was_ready = pf.is_ready();
        pf.set_ready(result.is_ok());

        match result {
            Ok(()) if !was_ready => {
                info!(interface = %pf.name(), index = pf.index(), "pf is ready");
            }
            Ok(()) => {
                debug!(interface = %pf.name(), index = pf.index(), "pf is still ready");
            }
            Err(e) => {
                error!(interface = %pf.name(), index = pf.index(), error = %e, "pf is not ready");
            }
        }
    }
}

//! LACP monitoring and VF reconciliation
//!
//! On every tick the monitor evaluates all ready PFs concurrently and joins
//! them before the next tick. For each PF it reads the bond slave's actor and
//! partner port state and drives every VF to `auto` while LACP is up and to
//! `disable` while it is down. VF state is re-read every tick, so changes made
//! behind the relay's back are corrected on the next tick.

use crate::lacp::is_protocol_up;
use crate::netlink::{SlaveInfo, VfLinkState};
use crate::pf::{Pf, ProtoState};
use crate::registry::Registry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct Monitor {
    registry: Arc<Registry>,
    interval: Duration,
}

impl Monitor {
    pub fn new(registry: Arc<Registry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Tick until cancelled. The first tick fires one interval after start.
    pub async fn run(self, token: CancellationToken) {
        debug!(interval_ms = self.interval.as_millis() as u64, "LACP monitoring started");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(routine = "monitor", "ctx cancelled");
                    return;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    /// Evaluate every PF once, concurrently.
    pub async fn tick(&self) {
        join_all(self.registry.pfs().map(|pf| self.reconcile(pf))).await;
    }

    async fn reconcile(&self, pf: &Pf) {
        if !pf.is_ready() {
            return;
        }

        let nl = self.registry.netlink();
        let name = pf.name();

        let link = match nl.link_by_index(pf.index()).await {
            Ok(link) => link,
            Err(e) => {
                warn!(
                    interface = %name,
                    index = pf.index(),
                    error = %e,
                    "failed to fetch interface"
                );
                return;
            }
        };

        let proto_state = pf.proto_state();

        if link.vfs.is_empty() {
            if proto_state != ProtoState::NoVfs {
                info!(interface = %name, "pf has no VFs");
                pf.set_proto_state(ProtoState::NoVfs);
            }
            return;
        }

        if proto_state == ProtoState::NoVfs {
            info!(interface = %name, count = link.vfs.len(), "VFs detected on interface");
        }

        let slave = match &link.slave {
            Some(SlaveInfo::Bond(slave)) => *slave,
            Some(SlaveInfo::Other(kind)) => {
                error!(
                    interface = %name,
                    kind = %kind,
                    "interface does not have a bond slave record"
                );
                return;
            }
            None => {
                error!(interface = %name, "interface has no slave attribute");
                return;
            }
        };

        let up = is_protocol_up(slave.actor_oper_port_state, slave.partner_oper_port_state);

        let (from, to) = if up {
            if proto_state != ProtoState::Up {
                info!(interface = %name, "lacp is up");
                pf.set_proto_state(ProtoState::Up);
            }

            if !slave.partner_oper_port_state.is_fast_rate() {
                warn!(interface = %name, "pf is using slow lacp rate");
            }

            (VfLinkState::Disable, VfLinkState::Auto)
        } else {
            if proto_state != ProtoState::Down {
                info!(interface = %name, "lacp is down");
                pf.set_proto_state(ProtoState::Down);
            }

            (VfLinkState::Auto, VfLinkState::Disable)
        };

        for vf in &link.vfs {
            debug!(interface = %name, id = vf.id, state = %vf.link_state, "vf info");
            if vf.link_state != from {
                continue;
            }

            match nl.set_vf_state(&link, vf.id, to).await {
                Ok(()) => {
                    info!(interface = %name, id = vf.id, state = %to, "vf link state was set");
                }
                Err(e) => {
                    error!(
                        interface = %name,
                        id = vf.id,
                        error = %e,
                        "failed to set vf link state"
                    );
                }
            }
        }
    }
}

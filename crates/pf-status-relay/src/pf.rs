//! Physical function record
//!
//! A [`Pf`] is shared between the inspector, which owns the readiness gate
//! and the link snapshot, and the monitor, which owns the protocol state. All
//! mutable fields sit behind one per-PF lock; the lock is only taken for the
//! duration of a read or a mutation and never across a netlink call.

use crate::error::{RelayError, Result};
use crate::netlink::{BondMode, LinkAttributes, NetlinkGateway, OperState};
use parking_lot::Mutex;
use std::fmt;
use tracing::{debug, info};

/// Last LACP reconciliation outcome of a PF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtoState {
    #[default]
    Undefined,
    Up,
    Down,
    NoVfs,
}

impl ProtoState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtoState::Undefined => "undefined",
            ProtoState::Up => "up",
            ProtoState::Down => "down",
            ProtoState::NoVfs => "novfs",
        }
    }
}

impl fmt::Display for ProtoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable part of a PF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfState {
    pub name: String,
    pub oper_state: OperState,
    pub master_index: u32,
    pub ready: bool,
    pub proto_state: ProtoState,
}

/// A monitored physical function
#[derive(Debug)]
pub struct Pf {
    index: u32,
    state: Mutex<PfState>,
}

impl Pf {
    /// Create a PF from freshly fetched link attributes; starts not ready.
    pub fn new(link: &LinkAttributes) -> Self {
        Self {
            index: link.index,
            state: Mutex::new(PfState {
                name: link.name.clone(),
                oper_state: link.oper_state,
                master_index: link.master_index,
                ready: false,
                proto_state: ProtoState::Undefined,
            }),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    pub fn oper_state(&self) -> OperState {
        self.state.lock().oper_state
    }

    pub fn master_index(&self) -> u32 {
        self.state.lock().master_index
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    pub fn proto_state(&self) -> ProtoState {
        self.state.lock().proto_state
    }

    pub fn set_proto_state(&self, proto_state: ProtoState) {
        self.state.lock().proto_state = proto_state;
    }

    /// Consistent copy of all mutable fields.
    pub fn snapshot(&self) -> PfState {
        self.state.lock().clone()
    }

    /// Check that the PF can take part in LACP: link up, enslaved, and the
    /// master is a bond in 802.3ad mode.
    pub async fn inspect(&self, nl: &dyn NetlinkGateway) -> Result<()> {
        let (oper_state, master_index) = {
            let state = self.state.lock();
            (state.oper_state, state.master_index)
        };

        if oper_state != OperState::Up {
            return Err(RelayError::LinkNotUp);
        }

        if master_index == 0 {
            return Err(RelayError::NoMaster);
        }

        let bond = nl
            .link_by_index(master_index)
            .await
            .map_err(|e| RelayError::MasterFetch {
                index: master_index,
                source: Box::new(e),
            })?;

        if bond.bond_mode != Some(BondMode::Ieee8023Ad) {
            return Err(RelayError::BondMode(bond.name));
        }

        Ok(())
    }

    /// Refresh the link snapshot from the kernel.
    ///
    /// Returns `true` when the operational state changed and the snapshot was
    /// replaced, `false` when the notification carried no operational change.
    pub async fn update(&self, nl: &dyn NetlinkGateway) -> Result<bool> {
        // Attributes carried by the notification may be stale by now.
        let link = nl.link_by_index(self.index).await?;

        debug!(interface = %link.name, state = %link.oper_state, "link state");

        let mut state = self.state.lock();
        if link.oper_state == state.oper_state {
            debug!(interface = %link.name, "PF was not updated");
            return Ok(false);
        }

        state.name = link.name;
        state.oper_state = link.oper_state;
        state.master_index = link.master_index;

        info!(
            interface = %state.name,
            index = self.index,
            oper_state = %state.oper_state,
            "PF was updated"
        );

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::MockNetlinkGateway;
    use mockall::predicate::eq;

    fn test_pf(oper_state: OperState, master_index: u32) -> Pf {
        Pf::new(
            &LinkAttributes::new("test", 1)
                .with_oper_state(oper_state)
                .with_master(master_index),
        )
    }

    #[test]
    fn test_new_pf_is_not_ready() {
        let pf = test_pf(OperState::Up, 2);
        assert_eq!(pf.index(), 1);
        assert_eq!(pf.name(), "test");
        assert!(!pf.is_ready());
        assert_eq!(pf.proto_state(), ProtoState::Undefined);
    }

    #[tokio::test]
    async fn test_inspect_ready() {
        let pf = test_pf(OperState::Up, 2);
        let mut nl = MockNetlinkGateway::new();
        nl.expect_link_by_index()
            .with(eq(2))
            .times(1)
            .returning(|_| {
                Ok(LinkAttributes::new("bond0", 2).with_bond_mode(BondMode::Ieee8023Ad))
            });

        assert!(pf.inspect(&nl).await.is_ok());
    }

    #[tokio::test]
    async fn test_inspect_link_not_up() {
        let pf = test_pf(OperState::Down, 2);
        let mut nl = MockNetlinkGateway::new();
        nl.expect_link_by_index().times(0);

        let err = pf.inspect(&nl).await.unwrap_err();
        assert_eq!(err.to_string(), "link is not up");
    }

    #[tokio::test]
    async fn test_inspect_no_master() {
        let pf = test_pf(OperState::Up, 0);
        let mut nl = MockNetlinkGateway::new();
        nl.expect_link_by_index().times(0);

        let err = pf.inspect(&nl).await.unwrap_err();
        assert_eq!(err.to_string(), "link has no master interface");
    }

    #[tokio::test]
    async fn test_inspect_wrong_bond_mode() {
        let pf = test_pf(OperState::Up, 2);
        let mut nl = MockNetlinkGateway::new();
        nl.expect_link_by_index()
            .times(1)
            .returning(|_| Ok(LinkAttributes::new("test", 2).with_bond_mode(BondMode::BalanceRr)));

        let err = pf.inspect(&nl).await.unwrap_err();
        assert_eq!(err.to_string(), "bond test does not have mode 802.3ad");
    }

    #[tokio::test]
    async fn test_inspect_master_not_a_bond() {
        let pf = test_pf(OperState::Up, 2);
        let mut nl = MockNetlinkGateway::new();
        nl.expect_link_by_index()
            .times(1)
            .returning(|_| Ok(LinkAttributes::new("br0", 2)));

        let err = pf.inspect(&nl).await.unwrap_err();
        assert!(matches!(err, RelayError::BondMode(name) if name == "br0"));
    }

    #[tokio::test]
    async fn test_inspect_master_fetch_failure() {
        let pf = test_pf(OperState::Up, 2);
        let mut nl = MockNetlinkGateway::new();
        nl.expect_link_by_index()
            .times(1)
            .returning(|_| Err(RelayError::Netlink("No such device".to_string())));

        let err = pf.inspect(&nl).await.unwrap_err();
        assert!(matches!(err, RelayError::MasterFetch { index: 2, .. }));
        assert!(err.to_string().contains("No such device"));
    }

    #[tokio::test]
    async fn test_update_unchanged_oper_state() {
        let pf = test_pf(OperState::Up, 2);
        let mut nl = MockNetlinkGateway::new();
        nl.expect_link_by_index().with(eq(1)).times(1).returning(|_| {
            Ok(LinkAttributes::new("renamed", 1)
                .with_oper_state(OperState::Up)
                .with_master(5))
        });

        assert!(!pf.update(&nl).await.unwrap());
        let state = pf.snapshot();
        assert_eq!(state.name, "test");
        assert_eq!(state.oper_state, OperState::Up);
        assert_eq!(state.master_index, 2);
    }

    #[tokio::test]
    async fn test_update_changed_oper_state() {
        let pf = test_pf(OperState::Up, 2);
        let mut nl = MockNetlinkGateway::new();
        nl.expect_link_by_index().with(eq(1)).times(1).returning(|_| {
            Ok(LinkAttributes::new("test-renamed", 1)
                .with_oper_state(OperState::Down)
                .with_master(0))
        });

        assert!(pf.update(&nl).await.unwrap());
        let state = pf.snapshot();
        assert_eq!(state.name, "test-renamed");
        assert_eq!(state.oper_state, OperState::Down);
        assert_eq!(state.master_index, 0);
        assert_eq!(pf.index(), 1);
    }

    #[tokio::test]
    async fn test_update_fetch_failure_leaves_pf_untouched() {
        let pf = test_pf(OperState::Up, 2);
        let mut nl = MockNetlinkGateway::new();
        nl.expect_link_by_index()
            .times(1)
            .returning(|_| Err(RelayError::Netlink("timeout".to_string())));

        assert!(pf.update(&nl).await.is_err());
        assert_eq!(pf.oper_state(), OperState::Up);
        assert_eq!(pf.master_index(), 2);
    }
}

//! Kernel link capability
//!
//! The relay only needs three rtnetlink operations: fetch a link by index,
//! fetch a link by name and set the link state of one VF. They are expressed
//! as the [`NetlinkGateway`] trait so the PF, inspector and monitor logic run
//! unchanged against the kernel ([`socket::NetlinkHandle`]) or an in-memory
//! double ([`fake::FakeNetlink`]).

#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod socket;

use crate::error::Result;
use crate::lacp::LacpState;
use async_trait::async_trait;
use std::fmt;

/// RFC 2863 operational state of a link (IFLA_OPERSTATE)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperState {
    #[default]
    Unknown,
    NotPresent,
    Down,
    LowerLayerDown,
    Testing,
    Dormant,
    Up,
}

impl OperState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperState::Unknown => "unknown",
            OperState::NotPresent => "notpresent",
            OperState::Down => "down",
            OperState::LowerLayerDown => "lowerlayerdown",
            OperState::Testing => "testing",
            OperState::Dormant => "dormant",
            OperState::Up => "up",
        }
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative link state of a VF (IFLA_VF_LINK_STATE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfLinkState {
    /// VF link follows the PF link
    Auto,
    /// VF link forced up
    Enable,
    /// VF link forced down
    Disable,
}

impl VfLinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VfLinkState::Auto => "auto",
            VfLinkState::Enable => "enable",
            VfLinkState::Disable => "disable",
        }
    }
}

impl fmt::Display for VfLinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One SR-IOV virtual function as reported in IFLA_VFINFO_LIST
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfInfo {
    pub id: u32,
    pub link_state: VfLinkState,
}

impl VfInfo {
    pub fn new(id: u32, link_state: VfLinkState) -> Self {
        Self { id, link_state }
    }
}

/// Bonding slave record of a link enslaved to a bond
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BondSlave {
    /// Our side of the LACP negotiation
    pub actor_oper_port_state: LacpState,
    /// The switch side of the LACP negotiation
    pub partner_oper_port_state: LacpState,
}

/// Slave record attached to a link (IFLA_INFO_SLAVE_KIND / IFLA_INFO_SLAVE_DATA)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlaveInfo {
    Bond(BondSlave),
    /// Enslaved to a master that is not a bond; carries the slave kind
    Other(String),
}

/// Bonding mode of a bond master (IFLA_BOND_MODE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondMode {
    BalanceRr,
    ActiveBackup,
    BalanceXor,
    Broadcast,
    Ieee8023Ad,
    BalanceTlb,
    BalanceAlb,
    Other(u8),
}

impl From<u8> for BondMode {
    fn from(mode: u8) -> Self {
        match mode {
            0 => BondMode::BalanceRr,
            1 => BondMode::ActiveBackup,
            2 => BondMode::BalanceXor,
            3 => BondMode::Broadcast,
            4 => BondMode::Ieee8023Ad,
            5 => BondMode::BalanceTlb,
            6 => BondMode::BalanceAlb,
            other => BondMode::Other(other),
        }
    }
}

/// Link attributes the relay consumes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkAttributes {
    pub name: String,
    pub index: u32,
    pub oper_state: OperState,
    /// Index of the master interface, 0 when there is none
    pub master_index: u32,
    pub vfs: Vec<VfInfo>,
    pub slave: Option<SlaveInfo>,
    /// Set only when the link itself is a bond
    pub bond_mode: Option<BondMode>,
}

impl LinkAttributes {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
            ..Default::default()
        }
    }

    pub fn with_oper_state(mut self, oper_state: OperState) -> Self {
        self.oper_state = oper_state;
        self
    }

    pub fn with_master(mut self, master_index: u32) -> Self {
        self.master_index = master_index;
        self
    }

    pub fn with_vfs(mut self, vfs: Vec<VfInfo>) -> Self {
        self.vfs = vfs;
        self
    }

    pub fn with_bond_slave(mut self, actor: LacpState, partner: LacpState) -> Self {
        self.slave = Some(SlaveInfo::Bond(BondSlave {
            actor_oper_port_state: actor,
            partner_oper_port_state: partner,
        }));
        self
    }

    pub fn with_bond_mode(mut self, mode: BondMode) -> Self {
        self.bond_mode = Some(mode);
        self
    }
}

/// rtnetlink operations used by the relay
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetlinkGateway: Send + Sync {
    /// Fetch a link, including its VF list, by interface index.
    async fn link_by_index(&self, index: u32) -> Result<LinkAttributes>;

    /// Fetch a link, including its VF list, by interface name.
    async fn link_by_name(&self, name: &str) -> Result<LinkAttributes>;

    /// Set the administrative link state of VF `vf_id` on `link`.
    async fn set_vf_state(
        &self,
        link: &LinkAttributes,
        vf_id: u32,
        state: VfLinkState,
    ) -> Result<()>;
}

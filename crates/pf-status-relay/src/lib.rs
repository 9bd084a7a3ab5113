//! PF Status Relay
//!
//! Keeps the link state of SR-IOV virtual functions in line with the LACP
//! status of their physical function's bond membership. While LACP is up on
//! a PF, its VFs are set to `auto`; while it is down, they are forced to
//! `disable`, so workloads bonding over VFs see the real path state.

pub mod config;
pub mod error;
pub mod inspector;
pub mod lacp;
pub mod monitor;
pub mod netlink;
pub mod pf;
pub mod registry;
pub mod relay;
pub mod subscribe;
pub mod systemd;

pub use config::RelayConfig;
pub use error::*;
pub use inspector::Inspector;
pub use lacp::LacpState;
pub use monitor::Monitor;
#[cfg(any(test, feature = "testing"))]
pub use netlink::fake::FakeNetlink;
pub use netlink::socket::NetlinkHandle;
pub use netlink::{LinkAttributes, NetlinkGateway, OperState, VfInfo, VfLinkState};
pub use pf::{Pf, ProtoState};
pub use registry::Registry;
pub use relay::Relay;
pub use subscribe::{EventBridge, LinkSubscription};
pub use systemd::SystemdNotifier;

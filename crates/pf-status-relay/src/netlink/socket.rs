//! Kernel rtnetlink binding
//!
//! Every operation is a single request/reply transaction on a fresh
//! NETLINK_ROUTE socket. Transactions are blocking and run on tokio's
//! blocking pool so a slow kernel reply stalls only the caller awaiting it.

use super::{
    BondMode, BondSlave, LinkAttributes, NetlinkGateway, OperState, SlaveInfo, VfInfo, VfLinkState,
};
use crate::error::{RelayError, Result};
use crate::lacp::LacpState;
use async_trait::async_trait;
use netlink_packet_core::{
    NLM_F_ACK, NLM_F_REQUEST, NetlinkHeader, NetlinkMessage, NetlinkPayload,
};
use netlink_packet_route::RouteNetlinkMessage;
use netlink_packet_route::link::{
    InfoBond, InfoBondPort, InfoData, InfoPortData, LinkAttribute, LinkExtentMask, LinkInfo,
    LinkMessage, LinkVfInfo, State, VfInfo as NlVfInfo, VfInfoLinkState,
    VfLinkState as NlVfLinkState,
};
use netlink_packet_utils::nla::{DefaultNla, Nla};
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, trace};

/// Receive buffer size; a link dump with many VFs easily exceeds a page
const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Netlink messages are aligned to 4 bytes
const NLMSG_ALIGNTO: usize = 4;

/// IFLA_BOND_PORT_AD_ACTOR_OPER_PORT_STATE, not decoded by netlink-packet-route
const IFLA_BOND_PORT_AD_ACTOR_OPER_PORT_STATE: u16 = 7;

/// IFLA_BOND_PORT_AD_PARTNER_OPER_PORT_STATE, not decoded by netlink-packet-route
const IFLA_BOND_PORT_AD_PARTNER_OPER_PORT_STATE: u16 = 8;

/// Real netlink gateway talking to the kernel
#[derive(Debug)]
pub struct NetlinkHandle {
    sequence: AtomicU32,
}

impl NetlinkHandle {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU32::new(1),
        }
    }

    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    async fn execute(&self, message: RouteNetlinkMessage) -> Result<Vec<RouteNetlinkMessage>> {
        let sequence = self.next_sequence();
        tokio::task::spawn_blocking(move || transact(message, sequence))
            .await
            .map_err(|e| RelayError::Netlink(format!("netlink task failed: {}", e)))?
    }

    async fn get_link(&self, message: LinkMessage, target: String) -> Result<LinkAttributes> {
        let replies = self.execute(RouteNetlinkMessage::GetLink(message)).await?;
        replies
            .into_iter()
            .find_map(|reply| match reply {
                RouteNetlinkMessage::NewLink(link) => Some(link_attributes(link)),
                _ => None,
            })
            .ok_or(RelayError::LinkNotFound(target))
    }
}

impl Default for NetlinkHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetlinkGateway for NetlinkHandle {
    async fn link_by_index(&self, index: u32) -> Result<LinkAttributes> {
        let mut message = LinkMessage::default();
        message.header.index = index;
        message
            .attributes
            .push(LinkAttribute::ExtMask(vec![LinkExtentMask::Vf]));
        self.get_link(message, index.to_string()).await
    }

    async fn link_by_name(&self, name: &str) -> Result<LinkAttributes> {
        let mut message = LinkMessage::default();
        message
            .attributes
            .push(LinkAttribute::IfName(name.to_string()));
        message
            .attributes
            .push(LinkAttribute::ExtMask(vec![LinkExtentMask::Vf]));
        self.get_link(message, name.to_string()).await
    }

    async fn set_vf_state(
        &self,
        link: &LinkAttributes,
        vf_id: u32,
        state: VfLinkState,
    ) -> Result<()> {
        let mut message = LinkMessage::default();
        message.header.index = link.index;
        message
            .attributes
            .push(LinkAttribute::VfInfoList(vec![LinkVfInfo(vec![
                NlVfInfo::LinkState(VfInfoLinkState::new(vf_id, state.into())),
            ])]));

        debug!(interface = %link.name, id = vf_id, state = %state, "setting vf link state");
        self.execute(RouteNetlinkMessage::SetLink(message)).await?;
        Ok(())
    }
}

/// Send one request and collect replies until the kernel acknowledges it.
fn transact(message: RouteNetlinkMessage, sequence: u32) -> Result<Vec<RouteNetlinkMessage>> {
    let mut socket = Socket::new(NETLINK_ROUTE)
        .map_err(|e| RelayError::Netlink(format!("Failed to create socket: {}", e)))?;
    socket
        .bind_auto()
        .map_err(|e| RelayError::Netlink(format!("Failed to bind socket: {}", e)))?;
    socket
        .connect(&SocketAddr::new(0, 0))
        .map_err(|e| RelayError::Netlink(format!("Failed to connect socket: {}", e)))?;

    let mut header = NetlinkHeader::default();
    header.flags = NLM_F_REQUEST | NLM_F_ACK;
    header.sequence_number = sequence;

    let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(message));
    packet.finalize();

    let mut buf = vec![0u8; packet.buffer_len()];
    packet.serialize(&mut buf[..]);

    socket
        .send(&buf, 0)
        .map_err(|e| RelayError::Netlink(format!("Failed to send request: {}", e)))?;

    let mut replies = Vec::new();
    let mut rx = Vec::with_capacity(RECV_BUFFER_SIZE);

    loop {
        rx.clear();
        let len = socket
            .recv(&mut rx, 0)
            .map_err(|e| RelayError::Netlink(format!("Failed to receive: {}", e)))?;

        let mut offset = 0;
        while offset < len {
            let msg = NetlinkMessage::<RouteNetlinkMessage>::deserialize(&rx[offset..len])
                .map_err(|e| RelayError::Netlink(format!("Failed to parse message: {}", e)))?;

            let msg_len = msg.header.length as usize;
            if msg.header.sequence_number != sequence {
                trace!(sequence = msg.header.sequence_number, "Ignoring stale reply");
            } else {
                match msg.payload {
                    NetlinkPayload::Error(err) => {
                        return match err.code {
                            None => Ok(replies),
                            Some(code) => Err(RelayError::Netlink(
                                std::io::Error::from_raw_os_error(-code.get()).to_string(),
                            )),
                        };
                    }
                    NetlinkPayload::Done(_) => return Ok(replies),
                    NetlinkPayload::InnerMessage(inner) => replies.push(inner),
                    _ => {}
                }
            }

            if msg_len == 0 {
                break;
            }
            offset += (msg_len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1);
        }
    }
}

/// Extract the attributes the relay consumes from an RTM_NEWLINK message.
fn link_attributes(message: LinkMessage) -> LinkAttributes {
    let mut attrs = LinkAttributes {
        index: message.header.index,
        ..Default::default()
    };
    let mut slave_kind = None;

    for attr in message.attributes {
        match attr {
            LinkAttribute::IfName(name) => attrs.name = name,
            LinkAttribute::OperState(state) => attrs.oper_state = state.into(),
            LinkAttribute::Controller(index) => attrs.master_index = index,
            LinkAttribute::VfInfoList(vfs) => {
                attrs.vfs = vfs.iter().filter_map(vf_info).collect();
            }
            LinkAttribute::LinkInfo(infos) => {
                for info in infos {
                    match info {
                        LinkInfo::Data(InfoData::Bond(options)) => {
                            for option in options {
                                if let InfoBond::Mode(mode) = option {
                                    attrs.bond_mode = Some(BondMode::from(u8::from(mode)));
                                }
                            }
                        }
                        LinkInfo::PortKind(kind) => slave_kind = Some(kind.to_string()),
                        LinkInfo::PortData(InfoPortData::BondPort(options)) => {
                            attrs.slave = Some(SlaveInfo::Bond(bond_slave(options)));
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    if attrs.slave.is_none() {
        attrs.slave = slave_kind.map(SlaveInfo::Other);
    }

    attrs
}

fn bond_slave(options: Vec<InfoBondPort>) -> BondSlave {
    let mut slave = BondSlave::default();
    for option in options {
        match option {
            InfoBondPort::Other(nla) => match nla.kind() {
                IFLA_BOND_PORT_AD_ACTOR_OPER_PORT_STATE => {
                    if let Some(octet) = nla_u8(&nla) {
                        slave.actor_oper_port_state = LacpState::from_octet(octet);
                    }
                }
                IFLA_BOND_PORT_AD_PARTNER_OPER_PORT_STATE => {
                    if let Some(octet) = nla_u8(&nla) {
                        slave.partner_oper_port_state = LacpState::from_octet(octet);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    slave
}

/// Value of a one-byte attribute the route crate leaves undecoded.
fn nla_u8(nla: &DefaultNla) -> Option<u8> {
    if nla.value_len() != 1 {
        trace!(kind = nla.kind(), len = nla.value_len(), "Unexpected attribute length");
        return None;
    }
    let mut value = [0u8; 1];
    nla.emit_value(&mut value);
    Some(value[0])
}

fn vf_info(vf: &LinkVfInfo) -> Option<VfInfo> {
    vf.0.iter().find_map(|attr| match attr {
        NlVfInfo::LinkState(link_state) => {
            let state = match link_state.state {
                NlVfLinkState::Auto => VfLinkState::Auto,
                NlVfLinkState::Enable => VfLinkState::Enable,
                NlVfLinkState::Disable => VfLinkState::Disable,
                _ => return None,
            };
            Some(VfInfo::new(link_state.vf_id, state))
        }
        _ => None,
    })
}

impl From<State> for OperState {
    fn from(state: State) -> Self {
        match state {
            State::NotPresent => OperState::NotPresent,
            State::Down => OperState::Down,
            State::LowerLayerDown => OperState::LowerLayerDown,
            State::Testing => OperState::Testing,
            State::Dormant => OperState::Dormant,
            State::Up => OperState::Up,
            _ => OperState::Unknown,
        }
    }
}

impl From<VfLinkState> for NlVfLinkState {
    fn from(state: VfLinkState) -> Self {
        match state {
            VfLinkState::Auto => NlVfLinkState::Auto,
            VfLinkState::Enable => NlVfLinkState::Enable,
            VfLinkState::Disable => NlVfLinkState::Disable,
        }
    }
}

//! Link notifications
//!
//! [`LinkSubscription`] listens on the RTMGRP_LINK multicast group and yields
//! the interface index of every RTM_NEWLINK and RTM_DELLINK notification.
//! [`EventBridge`] filters those indexes down to monitored PFs and forwards
//! them into the inspector's bounded queue.

use crate::error::{RelayError, Result};
use futures::stream::{self, BoxStream, StreamExt};
use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::RouteNetlinkMessage;
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
use std::collections::HashSet;
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Legacy multicast group mask for link notifications
const RTMGRP_LINK: u32 = 1;

const RECV_BUFFER_SIZE: usize = 64 * 1024;

const NLMSG_ALIGNTO: usize = 4;

/// Kernel link notification subscription
pub struct LinkSubscription {
    inner: AsyncFd<Socket>,
    buffer: Vec<u8>,
}

impl LinkSubscription {
    /// Open a NETLINK_ROUTE socket joined to the link group. Must be called
    /// from within a tokio runtime.
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(NETLINK_ROUTE)
            .map_err(|e| RelayError::Netlink(format!("Failed to create socket: {}", e)))?;
        socket
            .bind(&SocketAddr::new(0, RTMGRP_LINK))
            .map_err(|e| RelayError::Netlink(format!("Failed to bind socket: {}", e)))?;
        socket
            .set_non_blocking(true)
            .map_err(|e| RelayError::Netlink(format!("Failed to set non-blocking mode: {}", e)))?;

        let inner = AsyncFd::new(socket)
            .map_err(|e| RelayError::Netlink(format!("Failed to create AsyncFd: {}", e)))?;

        debug!("Netlink socket bound to RTMGRP_LINK");

        Ok(Self {
            inner,
            buffer: Vec::with_capacity(RECV_BUFFER_SIZE),
        })
    }

    /// Wait for the next datagram and return the link indexes it carries.
    pub async fn recv_indexes(&mut self) -> Result<Vec<u32>> {
        loop {
            let mut guard = self
                .inner
                .readable()
                .await
                .map_err(|e| RelayError::Netlink(format!("AsyncFd readable error: {}", e)))?;

            self.buffer.clear();
            let buffer = &mut self.buffer;
            match guard.try_io(|inner| inner.get_ref().recv(buffer, 0)) {
                Ok(Ok(len)) => return Ok(link_indexes(&self.buffer[..len])),
                Ok(Err(e)) if is_overrun(&e) => {
                    warn!(error = %e, "link notifications were dropped by the kernel");
                    continue;
                }
                Ok(Err(e)) => {
                    return Err(RelayError::Netlink(format!("Receive error: {}", e)));
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Turn the subscription into a stream of link indexes. The stream ends
    /// on the first receive error other than a socket buffer overrun.
    pub fn into_stream(self) -> BoxStream<'static, u32> {
        stream::unfold(self, |mut subscription| async move {
            match subscription.recv_indexes().await {
                Ok(indexes) => Some((stream::iter(indexes), subscription)),
                Err(e) => {
                    error!(error = %e, "link subscription failed");
                    None
                }
            }
        })
        .flatten()
        .boxed()
    }
}

/// The socket buffer overflowed and the kernel discarded notifications.
/// The socket itself stays usable.
fn is_overrun(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::ENOBUFS)
}

/// Indexes of all link notifications in one datagram.
fn link_indexes(data: &[u8]) -> Vec<u32> {
    let mut indexes = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let msg = match NetlinkMessage::<RouteNetlinkMessage>::deserialize(&data[offset..]) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Failed to parse link notification");
                break;
            }
        };

        match msg.payload {
            NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewLink(link))
            | NetlinkPayload::InnerMessage(RouteNetlinkMessage::DelLink(link)) => {
                indexes.push(link.header.index);
            }
            _ => trace!("Ignoring non-link message"),
        }

        let msg_len = msg.header.length as usize;
        if msg_len == 0 {
            break;
        }
        offset += (msg_len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1);
    }

    indexes
}

/// Forwards link notifications for monitored PFs into the event queue
pub struct EventBridge {
    indexes: HashSet<u32>,
    queue: mpsc::Sender<u32>,
}

impl EventBridge {
    pub fn new(indexes: impl IntoIterator<Item = u32>, queue: mpsc::Sender<u32>) -> Self {
        Self {
            indexes: indexes.into_iter().collect(),
            queue,
        }
    }

    /// Forward until cancelled or the notification stream ends.
    ///
    /// A full queue blocks the bridge; no event for a monitored PF is dropped
    /// while the relay is running.
    pub async fn run(self, mut events: BoxStream<'static, u32>, token: CancellationToken) {
        loop {
            let index = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(routine = "bridge", "ctx cancelled");
                    return;
                }
                event = events.next() => match event {
                    Some(index) => index,
                    None => {
                        debug!(routine = "bridge", "link notification stream ended");
                        return;
                    }
                },
            };

            if !self.indexes.contains(&index) {
                trace!(index, "ignoring event for unmonitored interface");
                continue;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(routine = "bridge", "ctx cancelled");
                    return;
                }
                sent = self.queue.send(index) => {
                    if sent.is_err() {
                        debug!(routine = "bridge", "event queue closed");
                        return;
                    }
                }
            }
        }
    }
}

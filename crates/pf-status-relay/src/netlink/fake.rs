//! In-memory netlink gateway
//!
//! Holds a table of links keyed by index and applies VF state changes to it
//! the way the kernel would, so the next fetch observes them. Fetch and set
//! failures can be injected per interface index.

use super::{LinkAttributes, NetlinkGateway, VfLinkState};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// A recorded `set_vf_state` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfStateCall {
    pub index: u32,
    pub vf_id: u32,
    pub state: VfLinkState,
}

#[derive(Debug, Default)]
struct FakeState {
    links: HashMap<u32, LinkAttributes>,
    failing_fetch: HashSet<u32>,
    failing_set: HashSet<u32>,
    fetches: usize,
    calls: Vec<VfStateCall>,
}

/// Netlink gateway backed by an in-memory link table
#[derive(Debug, Default)]
pub struct FakeNetlink {
    state: Mutex<FakeState>,
}

impl FakeNetlink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a link.
    pub fn set_link(&self, link: LinkAttributes) {
        self.state.lock().links.insert(link.index, link);
    }

    /// Apply `f` to the stored link with `index`, if any.
    pub fn modify_link(&self, index: u32, f: impl FnOnce(&mut LinkAttributes)) {
        if let Some(link) = self.state.lock().links.get_mut(&index) {
            f(link);
        }
    }

    /// Change a VF's state behind the relay's back.
    pub fn set_vf_link_state(&self, index: u32, vf_id: u32, state: VfLinkState) {
        self.modify_link(index, |link| {
            for vf in link.vfs.iter_mut().filter(|vf| vf.id == vf_id) {
                vf.link_state = state;
            }
        });
    }

    pub fn remove_link(&self, index: u32) {
        self.state.lock().links.remove(&index);
    }

    /// Make fetches of `index` fail (or succeed again).
    pub fn fail_fetch(&self, index: u32, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.failing_fetch.insert(index);
        } else {
            state.failing_fetch.remove(&index);
        }
    }

    /// Make VF state writes on `index` fail (or succeed again).
    pub fn fail_set(&self, index: u32, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.failing_set.insert(index);
        } else {
            state.failing_set.remove(&index);
        }
    }

    pub fn link(&self, index: u32) -> Option<LinkAttributes> {
        self.state.lock().links.get(&index).cloned()
    }

    /// All `set_vf_state` calls so far, including failed ones.
    pub fn vf_state_calls(&self) -> Vec<VfStateCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of link fetches served, by index or by name.
    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches
    }
}

#[async_trait]
impl NetlinkGateway for FakeNetlink {
    async fn link_by_index(&self, index: u32) -> Result<LinkAttributes> {
        let mut state = self.state.lock();
        state.fetches += 1;
        if state.failing_fetch.contains(&index) {
            return Err(RelayError::Netlink(format!(
                "injected fetch failure for index {}",
                index
            )));
        }

        state
            .links
            .get(&index)
            .cloned()
            .ok_or_else(|| RelayError::LinkNotFound(index.to_string()))
    }

    async fn link_by_name(&self, name: &str) -> Result<LinkAttributes> {
        let mut state = self.state.lock();
        state.fetches += 1;
        let link = state
            .links
            .values()
            .find(|link| link.name == name)
            .cloned()
            .ok_or_else(|| RelayError::LinkNotFound(name.to_string()))?;
        if state.failing_fetch.contains(&link.index) {
            return Err(RelayError::Netlink(format!(
                "injected fetch failure for {}",
                name
            )));
        }

        Ok(link)
    }

    async fn set_vf_state(
        &self,
        link: &LinkAttributes,
        vf_id: u32,
        vf_state: VfLinkState,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(VfStateCall {
            index: link.index,
            vf_id,
            state: vf_state,
        });
        if state.failing_set.contains(&link.index) {
            return Err(RelayError::Netlink(format!(
                "injected failure setting vf {} on {}",
                vf_id, link.name
            )));
        }

        let stored = state
            .links
            .get_mut(&link.index)
            .ok_or_else(|| RelayError::LinkNotFound(link.index.to_string()))?;
        let vf = stored
            .vfs
            .iter_mut()
            .find(|vf| vf.id == vf_id)
            .ok_or_else(|| {
                RelayError::Netlink(format!("vf {} not found on {}", vf_id, link.name))
            })?;
        vf.link_state = vf_state;
        Ok(())
    }
}

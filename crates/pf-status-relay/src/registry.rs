//! Registry of monitored physical functions
//!
//! Built once at startup from the configured interface names and never
//! resized, so its key set can be read from every task without locking.

use crate::error::{RelayError, Result};
use crate::netlink::NetlinkGateway;
use crate::pf::Pf;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Registry {
    pfs: HashMap<u32, Arc<Pf>>,
    netlink: Arc<dyn NetlinkGateway>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("pfs", &self.pfs)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Resolve `names` on the node. Names that do not resolve are skipped
    /// with a warning; an empty result is an error.
    pub async fn build(names: &[String], netlink: Arc<dyn NetlinkGateway>) -> Result<Self> {
        let mut pfs = HashMap::new();

        for name in names {
            let link = match netlink.link_by_name(name).await {
                Ok(link) => link,
                Err(e) => {
                    warn!(interface = %name, error = %e, "failed to fetch interface");
                    continue;
                }
            };

            if pfs.contains_key(&link.index) {
                debug!(interface = %name, index = link.index, "interface already registered");
                continue;
            }

            debug!(interface = %name, index = link.index, "adding interface");
            pfs.insert(link.index, Arc::new(Pf::new(&link)));
        }

        if pfs.is_empty() {
            return Err(RelayError::NoInterfaces);
        }

        Ok(Self { pfs, netlink })
    }

    pub fn get(&self, index: u32) -> Option<&Arc<Pf>> {
        self.pfs.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.pfs.contains_key(&index)
    }

    pub fn pfs(&self) -> impl Iterator<Item = &Arc<Pf>> {
        self.pfs.values()
    }

    /// Interface indexes of all monitored PFs.
    pub fn indexes(&self) -> Vec<u32> {
        self.pfs.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pfs.is_empty()
    }

    pub fn netlink(&self) -> &dyn NetlinkGateway {
        self.netlink.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::fake::FakeNetlink;
    use crate::netlink::{LinkAttributes, OperState};
    use tracing_test::traced_test;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn netlink() -> Arc<FakeNetlink> {
        let nl = FakeNetlink::new();
        nl.set_link(LinkAttributes::new("ens1f0", 4).with_oper_state(OperState::Up));
        nl.set_link(LinkAttributes::new("ens1f1", 5).with_oper_state(OperState::Down));
        Arc::new(nl)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_build_skips_missing_interfaces() {
        let registry = Registry::build(&names(&["ens1f0", "ens9f9"]), netlink())
            .await
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(4));
        assert_eq!(registry.get(4).unwrap().name(), "ens1f0");
        assert_eq!(registry.indexes(), vec![4]);
        assert!(logs_contain("failed to fetch interface"));
        assert!(logs_contain("interface=ens9f9"));
    }

    #[tokio::test]
    async fn test_debug_lists_pfs() {
        let registry = Registry::build(&names(&["ens1f0"]), netlink())
            .await
            .unwrap();
        let debug = format!("{:?}", registry);
        assert!(debug.starts_with("Registry"));
        assert!(debug.contains("ens1f0"));
    }

    #[tokio::test]
    async fn test_build_with_no_resolvable_interface_fails() {
        let result = Registry::build(&names(&["ens9f9"]), netlink()).await;
        assert!(matches!(result, Err(RelayError::NoInterfaces)));
    }

    #[tokio::test]
    async fn test_build_collapses_duplicate_names() {
        let registry = Registry::build(&names(&["ens1f0", "ens1f1", "ens1f0"]), netlink())
            .await
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(5).unwrap().oper_state(), OperState::Down);
    }
}

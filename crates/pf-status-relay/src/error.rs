//! Error types for pf-status-relay

use thiserror::Error;

/// Relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Netlink request or reply failure
    #[error("Netlink error: {0}")]
    Netlink(String),

    /// No link with the requested name or index exists
    #[error("link {0} not found")]
    LinkNotFound(String),

    /// PF operational state is not up
    #[error("link is not up")]
    LinkNotUp,

    /// PF is not enslaved to any master
    #[error("link has no master interface")]
    NoMaster,

    /// Master of the PF could not be fetched
    #[error("failed to fetch master interface with index {index}: {source}")]
    MasterFetch {
        /// Master interface index
        index: u32,
        /// Underlying fetch error
        #[source]
        source: Box<RelayError>,
    },

    /// Master is not a bond running 802.3ad
    #[error("bond {0} does not have mode 802.3ad")]
    BondMode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// None of the configured interfaces exist on the node
    #[error("no interfaces found in node")]
    NoInterfaces,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_messages() {
        assert_eq!(RelayError::LinkNotUp.to_string(), "link is not up");
        assert_eq!(RelayError::NoMaster.to_string(), "link has no master interface");
        assert_eq!(
            RelayError::BondMode("bond0".to_string()).to_string(),
            "bond bond0 does not have mode 802.3ad"
        );
    }

    #[test]
    fn test_master_fetch_wraps_cause() {
        let err = RelayError::MasterFetch {
            index: 7,
            source: Box::new(RelayError::Netlink("No such device".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch master interface with index 7: Netlink error: No such device"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_configuration() {
        let err = RelayError::Configuration("interfaces must be set".to_string());
        assert_eq!(err.to_string(), "Configuration error: interfaces must be set");
    }
}

//! LACP port state evaluation
//!
//! The bonding driver exposes the negotiated actor and partner port state of
//! every 802.3ad slave as a single octet (IEEE 802.1AX port state). The relay
//! only interprets those bits; it never runs the protocol itself.

use bitflags::bitflags;

bitflags! {
    /// LACP port state octet
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LacpState: u8 {
        /// Active LACP (as opposed to passive)
        const ACTIVITY = 0x01;
        /// Short timeout, i.e. fast LACPDU rate
        const TIMEOUT = 0x02;
        /// Link is aggregatable
        const AGGREGATION = 0x04;
        /// Link is in sync with the aggregator
        const SYNCHRONIZATION = 0x08;
        /// Collection of incoming frames enabled
        const COLLECTING = 0x10;
        /// Distribution of outgoing frames enabled
        const DISTRIBUTING = 0x20;
        /// Using defaulted partner information
        const DEFAULTED = 0x40;
        /// Receive machine is in the expired state
        const EXPIRED = 0x80;
    }
}

impl LacpState {
    /// Bits that must all be set for a port to carry traffic.
    pub const OPERATIONAL: Self = Self::AGGREGATION
        .union(Self::SYNCHRONIZATION)
        .union(Self::COLLECTING)
        .union(Self::DISTRIBUTING);

    /// Interpret a raw octet; undefined bits do not exist in an 8-bit state.
    pub fn from_octet(octet: u8) -> Self {
        Self::from_bits_retain(octet)
    }

    /// Whether this side of the negotiation is aggregating and passing traffic.
    pub fn is_operational(self) -> bool {
        if self.intersects(Self::EXPIRED | Self::DEFAULTED) {
            return false;
        }

        self.contains(Self::OPERATIONAL)
    }

    /// Whether this side requested the fast (1s) LACPDU rate.
    pub fn is_fast_rate(self) -> bool {
        self.contains(Self::TIMEOUT)
    }
}

/// LACP is up when both actor and partner are operational.
pub fn is_protocol_up(actor: LacpState, partner: LacpState) -> bool {
    actor.is_operational() && partner.is_operational()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_positions() {
        assert_eq!(LacpState::ACTIVITY.bits(), 0x01);
        assert_eq!(LacpState::TIMEOUT.bits(), 0x02);
        assert_eq!(LacpState::AGGREGATION.bits(), 0x04);
        assert_eq!(LacpState::SYNCHRONIZATION.bits(), 0x08);
        assert_eq!(LacpState::COLLECTING.bits(), 0x10);
        assert_eq!(LacpState::DISTRIBUTING.bits(), 0x20);
        assert_eq!(LacpState::DEFAULTED.bits(), 0x40);
        assert_eq!(LacpState::EXPIRED.bits(), 0x80);
        assert_eq!(LacpState::OPERATIONAL.bits(), 0x3C);
    }

    #[test]
    fn test_operational() {
        assert!(LacpState::from_octet(0x3C).is_operational());
        // Activity and timeout do not affect the verdict
        assert!(LacpState::from_octet(0x3F).is_operational());
    }

    #[test]
    fn test_expired_is_not_operational() {
        assert!(!LacpState::EXPIRED.is_operational());
        assert!(!(LacpState::OPERATIONAL | LacpState::EXPIRED).is_operational());
    }

    #[test]
    fn test_defaulted_is_not_operational() {
        assert!(!LacpState::DEFAULTED.is_operational());
        assert!(!(LacpState::OPERATIONAL | LacpState::DEFAULTED).is_operational());
    }

    #[test]
    fn test_missing_bits_is_not_operational() {
        assert!(!(LacpState::DISTRIBUTING | LacpState::COLLECTING).is_operational());
        assert!(!LacpState::empty().is_operational());
    }

    #[test]
    fn test_fast_rate() {
        assert!(LacpState::TIMEOUT.is_fast_rate());
        assert!(!LacpState::ACTIVITY.is_fast_rate());
    }

    #[test]
    fn test_protocol_up_needs_both_sides() {
        let up = LacpState::OPERATIONAL;
        let down = LacpState::OPERATIONAL | LacpState::DEFAULTED;
        assert!(is_protocol_up(up, up));
        assert!(!is_protocol_up(up, down));
        assert!(!is_protocol_up(down, up));
    }
}

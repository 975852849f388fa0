// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Status codec: fault flags and the health they encode.
//!
//! The fault mask is the single source of truth for the health of an interface, a virtual link
//! or a tenant-controller pair. Health is always derived from it with [`decode`] and never stored
//! without the mask that produced it.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// The set of fault conditions currently affecting an element.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FaultFlags: u32 {
        /// The bound physical port is down
        const PORT_FAULT = 0x0000_0001;
        /// The state of the bound port cannot be determined (e.g. controller unreachable)
        const PORT_UNKNOWN = 0x0000_0002;
        /// A path fault was reported for the span of this element
        const PATH_FAULT = 0x0000_0004;
        /// The element is administratively disabled
        const ADMIN_DISABLE = 0x0000_0008;
        /// The interface at the other end of the virtual link is down
        const REMOTE_DOWN = 0x0000_0010;
        /// A path fault was reported on the other end of the virtual link
        const REMOTE_PATH_FAULT = 0x0000_0020;
        /// The other end of the virtual link ran out of VTN resources
        const REMOTE_VTN_EXHAUSTION = 0x0000_0040;
    }
}

impl FaultFlags {
    /// No fault at all
    pub const PORT_UP: Self = Self::empty();

    /// Bits describing the state of the peer of a virtual link
    pub const REMOTE: Self = Self::REMOTE_DOWN
        .union(Self::REMOTE_PATH_FAULT)
        .union(Self::REMOTE_VTN_EXHAUSTION);

    /// Bits describing the reachability of a bound port
    pub const PORT: Self = Self::PORT_FAULT.union(Self::PORT_UNKNOWN);

    /// Tell if the mask has no fault
    #[must_use]
    pub fn is_up(self) -> bool {
        self == Self::PORT_UP
    }

    /// Tell if the mask contains bits which are not defined flags.
    /// Such a mask can only come from a corrupted record.
    #[must_use]
    pub fn is_well_formed(self) -> bool {
        Self::from_bits(self.bits()).is_some()
    }

    /// Set or clear the given flags depending on `on`
    #[must_use]
    pub fn with(mut self, flags: Self, on: bool) -> Self {
        self.set(flags, on);
        self
    }
}

/// Health of an element, derived from its fault mask
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIs,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum HealthState {
    /// The owning tenant has not completed its first aggregation pass
    #[default]
    Uninitialized,
    Up,
    Down,
    Unknown,
}

impl HealthState {
    /// Tell if this state counts against the health of the owner of the element.
    /// `Uninitialized` does not contribute anything.
    #[must_use]
    pub fn is_unhealthy(self) -> bool {
        matches!(self, HealthState::Down | HealthState::Unknown)
    }
}

/// A change to apply to a fault mask
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultDelta {
    pub set: FaultFlags,
    pub clear: FaultFlags,
}

impl FaultDelta {
    /// The change that does nothing
    pub const NONE: Self = Self {
        set: FaultFlags::empty(),
        clear: FaultFlags::empty(),
    };

    #[must_use]
    pub fn set(flags: FaultFlags) -> Self {
        Self {
            set: flags,
            clear: FaultFlags::empty(),
        }
    }
    #[must_use]
    pub fn clear(flags: FaultFlags) -> Self {
        Self {
            set: FaultFlags::empty(),
            clear: flags,
        }
    }
    /// Set `flags` if `on`, clear them otherwise
    #[must_use]
    pub fn toggle(flags: FaultFlags, on: bool) -> Self {
        if on { Self::set(flags) } else { Self::clear(flags) }
    }
    /// Combine two deltas. The latter wins on conflicting bits.
    #[must_use]
    pub fn then(self, other: Self) -> Self {
        Self {
            set: (self.set - other.clear) | other.set,
            clear: (self.clear - other.set) | other.clear,
        }
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.clear.is_empty()
    }
}

/// Derive the health encoded by a fault mask.
///
/// `Up` iff the mask is empty. `PORT_UNKNOWN` takes precedence over every other fault.
#[must_use]
pub fn decode(mask: FaultFlags) -> HealthState {
    if mask.is_up() {
        HealthState::Up
    } else if mask.contains(FaultFlags::PORT_UNKNOWN) {
        HealthState::Unknown
    } else {
        HealthState::Down
    }
}

/// Apply a [`FaultDelta`] to a fault mask. Bits present in both `set` and `clear` end up set.
#[must_use]
pub fn encode(current: FaultFlags, delta: FaultDelta) -> FaultFlags {
    (current - delta.clear) | delta.set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_masks() -> impl Iterator<Item = FaultFlags> {
        (0..=FaultFlags::all().bits()).map(FaultFlags::from_bits_truncate)
    }

    #[test]
    fn test_decode_invariant_all_masks() {
        for mask in all_masks() {
            let health = decode(mask);
            assert_eq!(health == HealthState::Up, mask == FaultFlags::PORT_UP, "{mask:?}");
            if mask.contains(FaultFlags::PORT_UNKNOWN) {
                assert_eq!(health, HealthState::Unknown, "{mask:?}");
            } else if !mask.is_up() {
                assert_eq!(health, HealthState::Down, "{mask:?}");
            }
            assert_ne!(health, HealthState::Uninitialized);
        }
    }

    #[test]
    fn test_unknown_precedence() {
        let mask = FaultFlags::PORT_FAULT | FaultFlags::PATH_FAULT | FaultFlags::PORT_UNKNOWN;
        assert_eq!(decode(mask), HealthState::Unknown);
        assert_eq!(decode(mask - FaultFlags::PORT_UNKNOWN), HealthState::Down);
        assert_eq!(decode(FaultFlags::ADMIN_DISABLE), HealthState::Down);
    }

    #[test]
    fn test_encode_empty_delta_is_identity() {
        for mask in all_masks() {
            assert_eq!(encode(mask, FaultDelta::NONE), mask);
            assert_eq!(decode(encode(mask, FaultDelta::NONE)), decode(mask));
        }
    }

    #[test]
    fn test_encode_set_wins() {
        let delta = FaultDelta {
            set: FaultFlags::PORT_FAULT,
            clear: FaultFlags::PORT_FAULT | FaultFlags::PORT_UNKNOWN,
        };
        let mask = encode(FaultFlags::PORT_UNKNOWN, delta);
        assert_eq!(mask, FaultFlags::PORT_FAULT);
    }

    #[test]
    fn test_delta_then() {
        let first = FaultDelta::set(FaultFlags::PORT_FAULT | FaultFlags::ADMIN_DISABLE);
        let second = FaultDelta::clear(FaultFlags::ADMIN_DISABLE);
        let combined = first.then(second);
        assert_eq!(encode(FaultFlags::PORT_UP, combined), FaultFlags::PORT_FAULT);
        assert!(FaultDelta::NONE.is_empty());
        assert!(!combined.is_empty());
    }

    #[test]
    fn test_well_formed() {
        assert!(FaultFlags::all().is_well_formed());
        assert!(FaultFlags::PORT_UP.is_well_formed());
        assert!(!FaultFlags::from_bits_retain(0x8000_0000).is_well_formed());
    }

    #[test]
    fn test_health_display() {
        assert_eq!(HealthState::Unknown.to_string(), "unknown");
        assert_eq!(HealthState::default(), HealthState::Uninitialized);
        assert!(!HealthState::Uninitialized.is_unhealthy());
        assert!(HealthState::Down.is_unhealthy());
    }
}

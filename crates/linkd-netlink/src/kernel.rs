// # Kernel Link State
//
// Maps what the kernel reports about an interface (flags and RFC 2863
// operational status) onto registry states. Pure functions only, so the
// mapping is testable on any platform.
//
// Addresses are not part of link messages; the address state is left to
// whichever component tracks addresses.

use linkd_core::link::{CarrierState, LinkIndex, OperationalState};
use linkd_core::traits::LinkInfo;

/// Interface is administratively up
pub const IFF_UP: u32 = 0x1;
/// Interface is enslaved to a bond or bridge master
pub const IFF_SLAVE: u32 = 0x800;
/// Driver signals L1 up
pub const IFF_LOWER_UP: u32 = 0x1_0000;
/// Driver signals dormant
pub const IFF_DORMANT: u32 = 0x2_0000;

/// RFC 2863 operational status (`IF_OPER_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperStatus {
    #[default]
    Unknown,
    NotPresent,
    Down,
    LowerLayerDown,
    Testing,
    Dormant,
    Up,
}

impl OperStatus {
    /// Parse `/sys/class/net/<name>/operstate`
    pub fn from_sysfs(value: &str) -> Self {
        match value.trim() {
            "notpresent" => OperStatus::NotPresent,
            "down" => OperStatus::Down,
            "lowerlayerdown" => OperStatus::LowerLayerDown,
            "testing" => OperStatus::Testing,
            "dormant" => OperStatus::Dormant,
            "up" => OperStatus::Up,
            _ => OperStatus::Unknown,
        }
    }

    /// Decode the `IFLA_OPERSTATE` byte
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => OperStatus::NotPresent,
            2 => OperStatus::Down,
            3 => OperStatus::LowerLayerDown,
            4 => OperStatus::Testing,
            5 => OperStatus::Dormant,
            6 => OperStatus::Up,
            _ => OperStatus::Unknown,
        }
    }
}

/// Whether the kernel considers the link to have carrier
///
/// Drivers that do not report an operational status leave it at
/// `Unknown`; for those the lower-up flag decides.
pub fn has_carrier(flags: u32, oper: OperStatus) -> bool {
    match oper {
        OperStatus::Up => true,
        OperStatus::Unknown => flags & IFF_LOWER_UP != 0 && flags & IFF_DORMANT == 0,
        _ => false,
    }
}

/// Carrier state of a link
pub fn carrier_state(flags: u32, oper: OperStatus) -> CarrierState {
    if flags & IFF_UP == 0 {
        return CarrierState::Off;
    }

    if has_carrier(flags, oper) {
        if flags & IFF_SLAVE != 0 {
            CarrierState::Enslaved
        } else {
            CarrierState::Carrier
        }
    } else if oper == OperStatus::Dormant || flags & IFF_DORMANT != 0 {
        CarrierState::Dormant
    } else {
        CarrierState::NoCarrier
    }
}

/// Operational state of a link without address information
pub fn operational_state(carrier: CarrierState) -> OperationalState {
    match carrier {
        CarrierState::Off => OperationalState::Off,
        CarrierState::NoCarrier => OperationalState::NoCarrier,
        CarrierState::Dormant => OperationalState::Dormant,
        CarrierState::DegradedCarrier => OperationalState::DegradedCarrier,
        CarrierState::Carrier => OperationalState::Carrier,
        CarrierState::Enslaved => OperationalState::Enslaved,
    }
}

/// One interface as the kernel describes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelLink {
    pub index: u32,
    pub name: String,
    pub flags: u32,
    pub oper: OperStatus,
}

impl KernelLink {
    /// Registry view of the link
    ///
    /// Returns `None` when the kernel index does not fit a registry index.
    pub fn to_link_info(&self) -> Option<LinkInfo> {
        let index = LinkIndex::try_from(self.index).ok()?;
        let carrier = carrier_state(self.flags, self.oper);

        Some(
            LinkInfo::new(index, self.name.clone())
                .with_carrier(carrier)
                .with_operational(operational_state(carrier)),
        )
    }
}

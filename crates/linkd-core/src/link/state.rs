// # Link States
//
// Closed enumerations for the three observable per-link states. Each enum is
// declared worst → best, so the derived `Ord` is the severity order the
// aggregators reduce over.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

macro_rules! link_state {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum $name {
            #[default]
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Every value, worst first
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Wire representation of the state
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::invalid_input(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

link_state! {
    /// Operational state of a link
    OperationalState {
        Off => "off",
        NoCarrier => "no-carrier",
        Dormant => "dormant",
        DegradedCarrier => "degraded-carrier",
        Carrier => "carrier",
        Degraded => "degraded",
        Enslaved => "enslaved",
        Routable => "routable",
    }
}

link_state! {
    /// Carrier state of a link
    CarrierState {
        Off => "off",
        NoCarrier => "no-carrier",
        Dormant => "dormant",
        DegradedCarrier => "degraded-carrier",
        Carrier => "carrier",
        Enslaved => "enslaved",
    }
}

link_state! {
    /// Address state of a link
    AddressState {
        Off => "off",
        Degraded => "degraded",
        Routable => "routable",
    }
}

/// A single state change reported by the detection subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum StateUpdate {
    Operational(OperationalState),
    Carrier(CarrierState),
    Address(AddressState),
}

impl StateUpdate {
    /// Property name affected by this update
    pub fn property(&self) -> Property {
        match self {
            StateUpdate::Operational(_) => Property::OperationalState,
            StateUpdate::Carrier(_) => Property::CarrierState,
            StateUpdate::Address(_) => Property::AddressState,
        }
    }
}

/// Externally visible property names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Property {
    OperationalState,
    CarrierState,
    AddressState,
}

impl Property {
    /// Property name as it appears in change events
    pub fn as_str(&self) -> &'static str {
        match self {
            Property::OperationalState => "OperationalState",
            Property::CarrierState => "CarrierState",
            Property::AddressState => "AddressState",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

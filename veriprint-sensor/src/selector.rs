//! Device selector parsing.

use std::fmt;
use std::str::FromStr;

/// Names a specific sensor by USB topology, `usb-<bus>-<address>`.
///
/// `Default` means "first discovered device".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    #[default]
    FirstDiscovered,
    Usb {
        bus: u8,
        address: u8,
    },
}

/// Error parsing a device selector argument.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device selector {0:?}, expected usb-<bus>-<address>")]
pub struct SelectorParseError(pub String);

impl FromStr for DeviceSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SelectorParseError(s.to_string());
        let rest = s.strip_prefix("usb-").ok_or_else(err)?;
        let (bus, address) = rest.split_once('-').ok_or_else(err)?;
        if address.contains('-') {
            return Err(err());
        }
        Ok(Self::Usb {
            bus: bus.parse().map_err(|_| err())?,
            address: address.parse().map_err(|_| err())?,
        })
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstDiscovered => f.write_str("usb-auto"),
            Self::Usb { bus, address } => write!(f, "usb-{bus}-{address}"),
        }
    }
}

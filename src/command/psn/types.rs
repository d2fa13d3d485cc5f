//! Argument and parameter types used by Packet switched data services Commands

use atat::atat_derive::AtatEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerSavingMode {
    Disabled = 0,
    Enabled = 1,
}

/// Presentation of the `+CEREG` unsolicited result code
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RegistrationUrc {
    Disabled = 0,
    Enabled = 1,
    /// Registration and location information (`+CEREG: <stat>,<tac>,<ci>,<AcT>`)
    EnabledWithLocation = 2,
}

/// EPS registration status reported by `+CEREG`
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RegistrationStatus {
    NotRegistered = 0,
    Home = 1,
    Searching = 2,
    Denied = 3,
    /// Out of coverage
    Unknown = 4,
    Roaming = 5,
}

impl RegistrationStatus {
    pub fn is_registered(self) -> bool {
        matches!(self, Self::Home | Self::Roaming)
    }
}

/// PS attach state reported by `+CGATT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AttachState {
    Detached = 0,
    Attached = 1,
}

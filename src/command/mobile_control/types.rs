//! Argument and parameter types used by Mobile equipment control Commands

use atat::atat_derive::AtatEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Functionality {
    /// 0: Minimum functionality, radio and SIM switched off
    Minimum = 0,
    /// 1: Full functionality
    Full = 1,
    /// 4: Radio switched off, SIM kept active
    AirplaneMode = 4,
}


//! ### Mobile equipment control and status commands
pub mod responses;
pub mod types;

use atat::atat_derive::AtatCmd;
use responses::{ModuleFunctionality, PinStatus};
use types::Functionality;

use super::NoResponse;

/// Set module functionality +CFUN
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CFUN", NoResponse, timeout_ms = 7500)]
pub struct SetModuleFunctionality {
    #[at_arg(position = 0)]
    pub fun: Functionality,
}

/// Read module functionality +CFUN?
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CFUN?", ModuleFunctionality, timeout_ms = 250)]
pub struct GetModuleFunctionality;

/// Enter PIN +CPIN?
///
/// Reads the SIM state. The modem answers `ERROR` when no SIM card is
/// inserted.
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CPIN?", PinStatus, timeout_ms = 7500)]
pub struct GetPinStatus;

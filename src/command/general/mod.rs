//! ### General commands
//! V.250 commands controlling the command interpreter and the data mode of
//! the DCE, and product identification.
pub mod responses;

use atat::atat_derive::AtatCmd;
use responses::Imei;

use super::{NoResponse, OnOff};

/// Command echo E
///
/// Controls whether the modem echoes characters received from the host while
/// in command mode.
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("E", NoResponse, value_sep = false, timeout_ms = 250)]
pub struct SetEcho {
    #[at_arg(position = 0)]
    pub on: OnOff,
}

/// Hook control H
///
/// Terminates an ongoing data call.
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("H", NoResponse, timeout_ms = 250)]
pub struct Hangup;

/// Return to on-line data state O
///
/// Resumes a data connection that was left with the `+++` escape sequence.
/// Answered with `CONNECT`.
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("O", NoResponse, timeout_ms = 7500)]
pub struct ReturnToDataMode;

/// Request product serial number identification +CGSN
///
/// Returns the IMEI of the modem.
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CGSN", Imei, timeout_ms = 7500)]
pub struct GetImei;

//! ### Packet switched data services
pub mod responses;
pub mod types;
pub mod urc;

use atat::atat_derive::AtatCmd;
use responses::{AttachStatus, EpsRegistration};
use types::{PowerSavingMode, RegistrationUrc};

use super::NoResponse;

/// Power saving mode setting +CPSMS
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CPSMS", NoResponse, timeout_ms = 250)]
pub struct SetPowerSavingMode {
    #[at_arg(position = 0)]
    pub mode: PowerSavingMode,
}

/// EPS network registration status +CEREG
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CEREG", NoResponse, timeout_ms = 250)]
pub struct SetEpsRegistrationUrc {
    #[at_arg(position = 0)]
    pub n: RegistrationUrc,
}

/// EPS network registration status +CEREG?
///
/// The `<n>` field tells the read answer apart from the unsolicited
/// `+CEREG` result code.
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CEREG?", EpsRegistration, timeout_ms = 250)]
pub struct GetEpsRegistration;

/// PS attach or detach +CGATT?
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CGATT?", AttachStatus, timeout_ms = 250)]
pub struct GetAttachStatus;

/// Define PDP context +CGDCONT
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CGDCONT", NoResponse, timeout_ms = 7500)]
pub struct SetPdpContext<'a> {
    #[at_arg(position = 0)]
    pub cid: u8,
    #[at_arg(position = 1, len = 6)]
    pub pdp_type: &'a str,
    #[at_arg(position = 2, len = 64)]
    pub apn: &'a str,
}

/// Enter data state +CGDATA
///
/// Switches the link to data mode using the layer 2 protocol `l2p`. Answered
/// with `CONNECT`.
#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("+CGDATA", NoResponse, timeout_ms = 7500)]
pub struct EnterDataState<'a> {
    #[at_arg(position = 0, len = 3)]
    pub l2p: &'a str,
    #[at_arg(position = 1)]
    pub cid: u8,
}

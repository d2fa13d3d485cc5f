//! Responses for General Commands
use atat::atat_derive::AtatResp;

/// IMEI of the modem, answered to +CGSN
#[derive(Debug, Clone, AtatResp)]
pub struct Imei {
    #[at_arg(position = 0)]
    pub imei: u64,
}

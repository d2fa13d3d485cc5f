//! Responses for Mobile equipment control and status Commands
use atat::atat_derive::AtatResp;
use heapless::String;

use super::types::Functionality;

/// +CFUN: <fun>
#[derive(Debug, Clone, AtatResp)]
pub struct ModuleFunctionality {
    #[at_arg(position = 0)]
    pub fun: Functionality,
}

/// +CPIN: <code>
#[derive(Debug, Clone, AtatResp)]
pub struct PinStatus {
    #[at_arg(position = 0)]
    pub code: String<16>,
}

//! Responses for Packet switched data services Commands
use atat::atat_derive::AtatResp;
use heapless::String;

use super::types::{AttachState, RegistrationStatus, RegistrationUrc};

/// +CGATT: <state>
#[derive(Debug, Clone, AtatResp)]
pub struct AttachStatus {
    #[at_arg(position = 0)]
    pub state: AttachState,
}

/// +CEREG: <n>,<stat>[,[<tac>],[<ci>],[<AcT>]]
#[derive(Debug, Clone, AtatResp)]
pub struct EpsRegistration {
    #[at_arg(position = 0)]
    pub n: RegistrationUrc,
    #[at_arg(position = 1)]
    pub stat: RegistrationStatus,
    #[at_arg(position = 2)]
    pub tac: Option<String<8>>,
    #[at_arg(position = 3)]
    pub ci: Option<String<8>>,
    #[at_arg(position = 4)]
    pub act: Option<u8>,
}

//! AT Commands for Sequans Monarch LTE modems
//! Following the 3GPP TS 27.007 command set, plus the vendor commands needed
//! to bring the modem into a known state.
pub mod general;
pub mod mobile_control;
pub mod psn;
pub mod responses;
pub mod vendor;

use atat::atat_derive::{AtatCmd, AtatEnum, AtatResp, AtatUrc};

use psn::urc::{registration_urc, EpsRegistrationUrc};

/// Maximum length of a single AT command, including its payload.
pub const MAX_CMD_LEN: usize = 124;

/// Escape sequence dropping the modem out of data mode. Sent without line
/// termination.
pub const ESCAPE_SEQUENCE: &[u8] = b"+++";

#[derive(Debug, Clone, AtatResp)]
pub struct NoResponse;

/// Unsolicited result codes that may be interleaved with command responses.
#[derive(Debug, Clone, AtatUrc)]
pub enum Urc {
    #[at_urc("+SYSSTART")]
    SysStart,
    #[at_urc("+SQNSSHDN")]
    Shutdown,
    #[at_urc("+CEREG", parse = registration_urc)]
    EpsRegistration(EpsRegistrationUrc),
}

#[derive(Debug, Clone, AtatCmd)]
#[at_cmd("", NoResponse, timeout_ms = 250)]
pub struct AT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OnOff {
    Off = 0,
    On = 1,
}

impl From<bool> for OnOff {
    fn from(b: bool) -> Self {
        if b {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// Serialize `cmd` into `buf` without line termination, returning the number
/// of bytes written.
///
/// The transaction engine terminates commands itself, so the `\r\n` added by
/// `atat` is stripped again here.
pub fn encode<Cmd: atat::AtatCmd>(cmd: &Cmd, buf: &mut [u8]) -> usize {
    let mut len = cmd.write(buf);
    while len > 0 && matches!(buf[len - 1], b'\r' | b'\n') {
        len -= 1;
    }
    len
}

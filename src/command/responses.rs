//! Response handling on the raw bytes collected by the transaction engine.
//!
//! Termination is detected on raw fragments. Typed answers are cut out of the
//! collected bytes with the `atat` digester, skipping unsolicited result codes
//! interleaved with the answer, and deserialized by the command itself.

use atat::{AtDigester, AtatCmd, DigestResult, Digester};

use super::Urc;

pub const OK: &[u8] = b"OK";
pub const ERROR: &[u8] = b"ERROR";
pub const CONNECT: &[u8] = b"CONNECT";
pub const SYSSTART: &[u8] = b"+SYSSTART";

/// Markers that end a response when no specific answer is expected.
pub const TERMINAL_MARKERS: [&[u8]; 4] = [OK, ERROR, SYSSTART, CONNECT];

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

pub fn has_terminal_marker(resp: &[u8]) -> bool {
    TERMINAL_MARKERS.iter().any(|m| contains(resp, m))
}

/// Parse the answer of `cmd` out of the bytes collected for it.
///
/// Returns [`atat::Error::InvalidResponse`] when `raw` holds no complete
/// answer.
pub fn parse_response<Cmd: AtatCmd>(cmd: &Cmd, raw: &[u8]) -> Result<Cmd::Response, atat::Error> {
    let mut digester = AtDigester::<Urc>::new();
    let mut buf = raw;
    loop {
        match digester.digest(buf) {
            (DigestResult::Response(resp), _) => return cmd.parse(resp),
            (DigestResult::Urc(urc), len) => {
                trace!("Skipping URC {:?}", atat::helpers::LossyStr(urc));
                buf = &buf[len..];
            }
            (DigestResult::None | DigestResult::Prompt(_), len) if len > 0 => buf = &buf[len..],
            _ => {
                debug!("No answer in {:?}", atat::helpers::LossyStr(raw));
                return Err(atat::Error::InvalidResponse);
            }
        }
    }
}

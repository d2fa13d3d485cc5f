//! Unsolicited responses for Packet switched data services Commands
use atat::atat_derive::AtatResp;
use atat::digest::parser::urc_helper;
use atat::nom;
use heapless::String;

use super::types::RegistrationStatus;

/// +CEREG: <stat>[,[<tac>],[<ci>],[<AcT>]]
#[derive(Debug, Clone, AtatResp)]
pub struct EpsRegistrationUrc {
    #[at_arg(position = 0)]
    pub stat: RegistrationStatus,
    #[at_arg(position = 1)]
    pub tac: Option<String<8>>,
    #[at_arg(position = 2)]
    pub ci: Option<String<8>>,
    #[at_arg(position = 3)]
    pub act: Option<u8>,
}

/// Matches the `+CEREG` unsolicited result code, leaving the answer to
/// `AT+CEREG?` to the response parser.
///
/// Both share the same prefix. The answer starts with `<n>,<stat>`, so its
/// second field is a number, while the second field of the URC is a quoted
/// tracking area code.
pub fn registration_urc<'a>(
    token: &'static [u8],
) -> impl Fn(&'a [u8]) -> nom::IResult<&'a [u8], (&'a [u8], usize)> {
    move |i| {
        let (rest, (urc, len)) = urc_helper::<_, nom::error::Error<&'a [u8]>>(token)(i)?;
        if is_read_answer(urc) {
            return Err(nom::Err::Error(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Verify,
            )));
        }
        Ok((rest, (urc, len)))
    }
}

fn is_read_answer(line: &[u8]) -> bool {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        return false;
    };
    let mut fields = line[colon + 1..].split(|&b| b == b',');
    fields.next();
    fields
        .next()
        .and_then(|field| field.iter().find(|&&b| b != b' '))
        .is_some_and(u8::is_ascii_digit)
}

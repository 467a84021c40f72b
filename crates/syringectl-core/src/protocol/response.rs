//! Response framing and parsing
//!
//! A pump reply looks like `STX 00 S 10.00MH ETX`:
//!
//! | Field   | Size | Meaning                                  |
//! |---------|------|------------------------------------------|
//! | STX     | 1    | 0x02                                     |
//! | address | 2    | decimal pump address, zero padded        |
//! | status  | 1    | `I` `W` `S` `P` `T` `U` `X` or `A`       |
//! | data    | n    | query payload, or `?<code>` on error     |
//! | ETX     | 1    | 0x03                                     |

use regex::Regex;
use std::sync::LazyLock;

use super::{AlarmCause, Direction, PumpAddress, ResponseError, ETX, STX};
use crate::syringe::DiameterReading;
use crate::unit_conversion::{DispensedVolume, RateUnit, RateValue, VolumeReading, VolumeUnit};

/// `I<infused>W<withdrawn><unit>` as returned by `DIS`
static DISPENSED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^I([0-9]*\.?[0-9]+)W([0-9]*\.?[0-9]+)(UL|ML)$")
        .expect("Invalid dispensed-volume regex")
});

/// Pump state reported in every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// `I`
    Infusing,
    /// `W`
    Withdrawing,
    /// `S`
    Stopped,
    /// `P`
    Paused,
    /// `T`, timed pause phase of a program
    PausePhase,
    /// `U`, waiting for a user trigger
    UserWait,
    /// `X`
    Purging,
    /// `A`
    Alarm,
}

impl PumpStatus {
    /// Decode a status letter
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'I' => Some(PumpStatus::Infusing),
            'W' => Some(PumpStatus::Withdrawing),
            'S' => Some(PumpStatus::Stopped),
            'P' => Some(PumpStatus::Paused),
            'T' => Some(PumpStatus::PausePhase),
            'U' => Some(PumpStatus::UserWait),
            'X' => Some(PumpStatus::Purging),
            'A' => Some(PumpStatus::Alarm),
            _ => None,
        }
    }

    /// Status letter
    pub fn as_char(self) -> char {
        match self {
            PumpStatus::Infusing => 'I',
            PumpStatus::Withdrawing => 'W',
            PumpStatus::Stopped => 'S',
            PumpStatus::Paused => 'P',
            PumpStatus::PausePhase => 'T',
            PumpStatus::UserWait => 'U',
            PumpStatus::Purging => 'X',
            PumpStatus::Alarm => 'A',
        }
    }

    /// Whether the plunger is moving
    pub fn is_running(self) -> bool {
        matches!(
            self,
            PumpStatus::Infusing | PumpStatus::Withdrawing | PumpStatus::Purging
        )
    }
}

/// Successful reply
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Address of the pump that answered
    pub address: PumpAddress,
    /// Pump state after the command
    pub status: PumpStatus,
    /// Anything after the status letter
    pub data: Option<String>,
}

impl Payload {
    fn data(&self) -> &str {
        self.data.as_deref().unwrap_or("").trim()
    }

    /// Rate in the unit the pump reported (`10.00MH`)
    pub fn rate(&self) -> Result<RateValue, ResponseError> {
        let data = self.data();
        if data.len() < 3 || !data.is_ascii() {
            return Err(ResponseError::Unparseable);
        }
        let (number, unit) = data.split_at(data.len() - 2);
        let unit = RateUnit::from_token(unit).ok_or(ResponseError::Unparseable)?;
        let magnitude: f64 = number.parse().map_err(|_| ResponseError::Unparseable)?;
        RateValue::new(magnitude, unit).map_err(|_| ResponseError::Unparseable)
    }

    /// Direction token; neither `INF` nor `WDR` is [`Direction::Unknown`]
    pub fn direction(&self) -> Direction {
        Direction::from_response(self.data())
    }

    /// Bore in mm, resolved to a syringe size when it is in the table
    pub fn diameter(&self) -> Result<DiameterReading, ResponseError> {
        let data = self.data();
        let raw_mm: f64 = data.parse().map_err(|_| ResponseError::Unparseable)?;
        Ok(DiameterReading::from_bore(data, raw_mm))
    }

    /// Volume to dispense (`14.53ML`)
    pub fn volume(&self) -> Result<VolumeReading, ResponseError> {
        let data = self.data();
        if data.len() < 3 || !data.is_ascii() {
            return Err(ResponseError::Unparseable);
        }
        let (number, unit) = data.split_at(data.len() - 2);
        let unit = VolumeUnit::from_token(unit).ok_or(ResponseError::Unparseable)?;
        let value: f64 = number.parse().map_err(|_| ResponseError::Unparseable)?;
        Ok(VolumeReading { value, unit })
    }

    /// Both dispensed accumulators (`I1.000W0.000ML`)
    pub fn dispensed(&self) -> Result<DispensedVolume, ResponseError> {
        let caps = DISPENSED_REGEX
            .captures(self.data())
            .ok_or(ResponseError::Unparseable)?;
        let infused: f64 = caps[1].parse().map_err(|_| ResponseError::Unparseable)?;
        let withdrawn: f64 = caps[2].parse().map_err(|_| ResponseError::Unparseable)?;
        let unit = VolumeUnit::from_token(&caps[3]).ok_or(ResponseError::Unparseable)?;
        Ok(DispensedVolume {
            infused,
            withdrawn,
            unit,
        })
    }
}

/// Parsed result of one exchange
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolResponse {
    /// The pump accepted the command
    Payload(Payload),
    /// The pump refused the command, or the reply could not be read
    Error(ResponseError),
}

impl ProtocolResponse {
    /// Convert into a `Result`
    pub fn into_result(self) -> Result<Payload, ResponseError> {
        match self {
            ProtocolResponse::Payload(payload) => Ok(payload),
            ProtocolResponse::Error(e) => Err(e),
        }
    }

    /// Whether this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, ProtocolResponse::Error(_))
    }
}

/// Strip STX/ETX from a single frame
fn unframe(raw: &[u8]) -> Option<&str> {
    if raw.len() < 2 || raw[0] != STX || raw[raw.len() - 1] != ETX {
        return None;
    }
    let body = &raw[1..raw.len() - 1];
    if body.iter().any(|&b| b == STX || b == ETX) {
        return None;
    }
    std::str::from_utf8(body).ok().filter(|s| s.is_ascii())
}

fn classify_error(status: Option<char>, code: &str) -> ResponseError {
    if status.map(|c| c.to_ascii_uppercase()) == Some('A') {
        return ResponseError::Alarm(AlarmCause::from_code(code));
    }
    match code.trim().to_ascii_uppercase().as_str() {
        "NA" => ResponseError::NotApplicable,
        "OOR" => ResponseError::OutOfRange,
        _ => ResponseError::NotUnderstood,
    }
}

fn classify(body: &str) -> ProtocolResponse {
    if body.len() < 3 {
        return ProtocolResponse::Error(ResponseError::Unparseable);
    }
    let (address, rest) = body.split_at(2);
    let address = match address
        .bytes()
        .all(|b| b.is_ascii_digit())
        .then(|| address.parse::<u32>().ok())
        .flatten()
        .and_then(|n| PumpAddress::new(n).ok())
    {
        Some(address) => address,
        None => return ProtocolResponse::Error(ResponseError::Unparseable),
    };

    if let Some(idx) = rest.find('?') {
        let status = rest[..idx].chars().next();
        return ProtocolResponse::Error(classify_error(status, &rest[idx + 1..]));
    }

    let mut chars = rest.chars();
    let status = match chars.next().and_then(PumpStatus::from_char) {
        Some(status) => status,
        None => return ProtocolResponse::Error(ResponseError::Unparseable),
    };
    let data = chars.as_str();

    if status == PumpStatus::Alarm {
        return ProtocolResponse::Error(ResponseError::Alarm(AlarmCause::from_code(data)));
    }

    ProtocolResponse::Payload(Payload {
        address,
        status,
        data: (!data.is_empty()).then(|| data.to_string()),
    })
}

/// Parse the bytes read for one command
///
/// Anything that is not exactly one `STX ... ETX` frame is
/// [`ResponseError::Unparseable`].
pub fn parse(raw: &[u8]) -> ProtocolResponse {
    match unframe(raw) {
        Some(body) => classify(body),
        None => ProtocolResponse::Error(ResponseError::Unparseable),
    }
}

/// Split a read holding several replies (batched or broadcast commands)
///
/// Each ETX closes a frame; a trailing partial frame is reported as
/// unparseable.
pub fn parse_frames(raw: &[u8]) -> Vec<ProtocolResponse> {
    let mut frames = Vec::new();
    let mut rest = raw;
    while !rest.is_empty() {
        match rest.iter().position(|&b| b == ETX) {
            Some(end) => {
                frames.push(parse(&rest[..=end]));
                rest = &rest[end + 1..];
            }
            None => {
                frames.push(parse(rest));
                break;
            }
        }
    }
    frames
}

//! Unit Conversion Functions
//!
//! Rate and volume units understood by the pump:
//! - Rate: µL/h (`UH`) ↔ mL/h (`MH`)
//! - Volume: µL (`UL`) ↔ mL (`ML`)
//!
//! The pump accepts at most 4 significant digits in a numeric operand, so
//! magnitudes are rounded before they are written to the bus.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::protocol::ValidationError;

/// Rates at or above this many µL/h are sent in mL/h
pub const MH_THRESHOLD_UH: f64 = 5000.0;

/// Widest numeric field the firmware accepts
pub const SIGNIFICANT_DIGITS: usize = 4;

/// Convert µL/h to mL/h
pub fn uh_to_mh(uh: f64) -> f64 {
    uh / 1000.0
}

/// Convert mL/h to µL/h
pub fn mh_to_uh(mh: f64) -> f64 {
    mh * 1000.0
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Render a non-negative magnitude for the wire
///
/// Uses at most `max_decimals` decimal places and never more than
/// [`SIGNIFICANT_DIGITS`] significant digits; trailing zeros are dropped.
pub fn format_magnitude(value: f64, max_decimals: usize) -> String {
    let integer_digits = (value.trunc() as u64).to_string().len();
    let decimals = SIGNIFICANT_DIGITS
        .saturating_sub(integer_digits)
        .min(max_decimals);
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

fn check_magnitude(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::InvalidMagnitude(value))
    }
}

/// Rate unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUnit {
    /// µL/h, wire token `UH`
    MicrolitersPerHour,
    /// mL/h, wire token `MH`
    MillilitersPerHour,
}

impl RateUnit {
    /// Wire token
    pub fn token(self) -> &'static str {
        match self {
            RateUnit::MicrolitersPerHour => "UH",
            RateUnit::MillilitersPerHour => "MH",
        }
    }

    /// Parse a wire token, ignoring case
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "UH" => Some(RateUnit::MicrolitersPerHour),
            "MH" => Some(RateUnit::MillilitersPerHour),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            RateUnit::MicrolitersPerHour => "uL/h",
            RateUnit::MillilitersPerHour => "mL/h",
        }
    }
}

/// A pumping rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateValue {
    /// Magnitude in `unit`
    pub magnitude: f64,
    /// Unit of `magnitude`
    pub unit: RateUnit,
}

impl RateValue {
    /// Validated constructor
    pub fn new(magnitude: f64, unit: RateUnit) -> Result<Self, ValidationError> {
        Ok(Self {
            magnitude: check_magnitude(magnitude)?,
            unit,
        })
    }

    /// Rate in µL/h
    pub fn microliters_per_hour(magnitude: f64) -> Self {
        Self {
            magnitude,
            unit: RateUnit::MicrolitersPerHour,
        }
    }

    /// Rate in mL/h
    pub fn milliliters_per_hour(magnitude: f64) -> Self {
        Self {
            magnitude,
            unit: RateUnit::MillilitersPerHour,
        }
    }

    /// Magnitude expressed in µL/h
    pub fn as_microliters_per_hour(&self) -> f64 {
        match self.unit {
            RateUnit::MicrolitersPerHour => self.magnitude,
            RateUnit::MillilitersPerHour => mh_to_uh(self.magnitude),
        }
    }

    /// Same rate re-expressed in µL/h
    pub fn normalized(&self) -> Self {
        Self::microliters_per_hour(self.as_microliters_per_hour())
    }

    /// The rate as it will be sent: rounded to 2 decimals in µL/h, limited to
    /// 4 significant digits, and sent in mL/h once the rendered µL/h value
    /// reaches [`MH_THRESHOLD_UH`]
    pub fn to_wire(&self) -> Result<(String, RateUnit), ValidationError> {
        let uh = round_to(check_magnitude(self.as_microliters_per_hour())?, 2);
        let digits = format_magnitude(uh, 2);
        // 4999.6 renders as 5000
        match digits.parse::<f64>() {
            Ok(rendered) if rendered < MH_THRESHOLD_UH => {
                Ok((digits, RateUnit::MicrolitersPerHour))
            }
            _ => Ok((format_magnitude(uh_to_mh(uh), 3), RateUnit::MillilitersPerHour)),
        }
    }

    /// Operand of a `RAT` set command, e.g. `7.5MH`
    pub fn wire_operand(&self) -> Result<String, ValidationError> {
        let (digits, unit) = self.to_wire()?;
        Ok(format!("{}{}", digits, unit.token()))
    }
}

impl FromStr for RateValue {
    type Err = ValidationError;

    /// Parse `"100"`, `"100uh"` or `"7.5 MH"`; a bare number is taken as µL/h
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let split = text
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let (number, suffix) = text.split_at(split);
        let unit = if suffix.is_empty() {
            RateUnit::MicrolitersPerHour
        } else {
            RateUnit::from_token(suffix.trim())
                .ok_or_else(|| ValidationError::UnknownRateUnit(s.to_string()))?
        };
        let magnitude: f64 = number
            .trim()
            .parse()
            .map_err(|_| ValidationError::UnknownRateUnit(s.to_string()))?;
        Self::new(magnitude, unit)
    }
}

impl fmt::Display for RateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.magnitude, self.unit.label())
    }
}

/// Volume unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeUnit {
    /// µL, wire token `UL`
    Microliters,
    /// mL, wire token `ML`
    Milliliters,
}

impl VolumeUnit {
    /// Wire token
    pub fn token(self) -> &'static str {
        match self {
            VolumeUnit::Microliters => "UL",
            VolumeUnit::Milliliters => "ML",
        }
    }

    /// Parse a wire token, ignoring case
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "UL" => Some(VolumeUnit::Microliters),
            "ML" => Some(VolumeUnit::Milliliters),
            _ => None,
        }
    }
}

impl FromStr for VolumeUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s.trim()).ok_or_else(|| ValidationError::UnknownVolumeUnit(s.to_string()))
    }
}

impl fmt::Display for VolumeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeUnit::Microliters => write!(f, "uL"),
            VolumeUnit::Milliliters => write!(f, "mL"),
        }
    }
}

/// Render a dispense volume operand (2 decimals, 4 significant digits)
pub fn volume_operand(value: f64) -> Result<String, ValidationError> {
    Ok(format_magnitude(round_to(check_magnitude(value)?, 2), 2))
}

/// Volume to dispense as reported by the pump
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeReading {
    /// Magnitude in `unit`
    pub value: f64,
    /// Unit of `value`
    pub unit: VolumeUnit,
}

impl fmt::Display for VolumeReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} {}", self.value, self.unit)
    }
}

/// Volume dispensed since each accumulator was last cleared
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispensedVolume {
    /// Infused total
    pub infused: f64,
    /// Withdrawn total
    pub withdrawn: f64,
    /// Unit shared by both totals
    pub unit: VolumeUnit,
}

impl fmt::Display for DispensedVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "infused {:.3} {}, withdrawn {:.3} {}",
            self.infused, self.unit, self.withdrawn, self.unit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_magnitude() {
        assert_eq!(format_magnitude(1.0, 2), "1");
        assert_eq!(format_magnitude(7.5, 3), "7.5");
        assert_eq!(format_magnitude(0.05, 2), "0.05");
        assert_eq!(format_magnitude(123.456, 2), "123.5");
        assert_eq!(format_magnitude(1234.0, 2), "1234");
        assert_eq!(format_magnitude(0.0, 2), "0");
    }

    #[test]
    fn test_unit_selection() {
        let (digits, unit) = RateValue::microliters_per_hour(7500.0).to_wire().unwrap();
        assert_eq!(digits, "7.5");
        assert_eq!(unit, RateUnit::MillilitersPerHour);

        let (digits, unit) = RateValue::microliters_per_hour(4000.0).to_wire().unwrap();
        assert_eq!(digits, "4000");
        assert_eq!(unit, RateUnit::MicrolitersPerHour);

        let (digits, unit) = RateValue::milliliters_per_hour(10.0).to_wire().unwrap();
        assert_eq!(digits, "10");
        assert_eq!(unit, RateUnit::MillilitersPerHour);

        let (digits, unit) = RateValue::milliliters_per_hour(0.1).to_wire().unwrap();
        assert_eq!(digits, "100");
        assert_eq!(unit, RateUnit::MicrolitersPerHour);
    }

    #[test]
    fn test_rounding_up_to_threshold_switches_unit() {
        let (digits, unit) = RateValue::microliters_per_hour(4999.6).to_wire().unwrap();
        assert_eq!(digits, "5");
        assert_eq!(unit, RateUnit::MillilitersPerHour);

        let (digits, unit) = RateValue::microliters_per_hour(4999.4).to_wire().unwrap();
        assert_eq!(digits, "4999");
        assert_eq!(unit, RateUnit::MicrolitersPerHour);
    }

    #[test]
    fn test_invalid_magnitude_rejected() {
        assert!(RateValue::microliters_per_hour(-1.0).to_wire().is_err());
        assert!(RateValue::microliters_per_hour(f64::NAN).to_wire().is_err());
        assert!(RateValue::new(-3.0, RateUnit::MillilitersPerHour).is_err());
        assert!(volume_operand(f64::INFINITY).is_err());
    }

    #[test]
    fn test_rate_from_str() {
        assert_eq!(
            "100uh".parse::<RateValue>().unwrap(),
            RateValue::microliters_per_hour(100.0)
        );
        assert_eq!(
            "7.5 MH".parse::<RateValue>().unwrap(),
            RateValue::milliliters_per_hour(7.5)
        );
        assert_eq!(
            "250".parse::<RateValue>().unwrap(),
            RateValue::microliters_per_hour(250.0)
        );
        assert_eq!(
            "100um".parse::<RateValue>(),
            Err(ValidationError::UnknownRateUnit("100um".to_string()))
        );
    }

    #[test]
    fn test_volume_unit_from_str() {
        assert_eq!("ul".parse::<VolumeUnit>().unwrap(), VolumeUnit::Microliters);
        assert_eq!("ML".parse::<VolumeUnit>().unwrap(), VolumeUnit::Milliliters);
        assert!("l".parse::<VolumeUnit>().is_err());
    }

    #[test]
    fn test_volume_operand() {
        assert_eq!(volume_operand(3.14).unwrap(), "3.14");
        assert_eq!(volume_operand(20.0).unwrap(), "20");
    }

    #[test]
    fn test_display() {
        assert_eq!(RateValue::microliters_per_hour(1.0).to_string(), "1.00 uL/h");
    }
}

//! Syringe bore table
//!
//! The pump computes flow from plunger speed, so it must know the inside
//! diameter of the loaded syringe. Only the sizes below are supported.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::protocol::ValidationError;

/// Supported syringe sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyringeSize {
    /// 1 mL
    Ml1,
    /// 3 mL
    Ml3,
    /// 5 mL
    Ml5,
    /// 10 mL
    Ml10,
    /// 20 mL
    Ml20,
    /// 60 mL
    Ml60,
}

/// Label and bore diameter (mm, as sent to the pump) of each size
static BORE_TABLE: [(SyringeSize, &str, &str); 6] = [
    (SyringeSize::Ml1, "1ml", "4.699"),
    (SyringeSize::Ml3, "3ml", "8.585"),
    (SyringeSize::Ml5, "5ml", "11.99"),
    (SyringeSize::Ml10, "10ml", "14.43"),
    (SyringeSize::Ml20, "20ml", "19.05"),
    (SyringeSize::Ml60, "60ml", "26.59"),
];

/// Two bore readings closer than this are the same syringe
const BORE_TOLERANCE_MM: f64 = 0.0005;

impl SyringeSize {
    /// Every supported size, smallest first
    pub fn all() -> impl Iterator<Item = SyringeSize> {
        BORE_TABLE.iter().map(|(size, _, _)| *size)
    }

    // Rows are in declaration order
    fn entry(self) -> &'static (SyringeSize, &'static str, &'static str) {
        &BORE_TABLE[self as usize]
    }

    /// Label such as `5ml`
    pub fn label(self) -> &'static str {
        self.entry().1
    }

    /// Bore diameter in mm, exactly as written to the bus
    pub fn bore(self) -> &'static str {
        self.entry().2
    }

    /// Bore diameter in mm
    pub fn bore_mm(self) -> f64 {
        self.bore().parse().unwrap_or_default()
    }

    /// Look up a size by its label, ignoring case and surrounding whitespace
    pub fn from_label(label: &str) -> Result<Self, ValidationError> {
        let wanted = label.trim().to_ascii_lowercase();
        BORE_TABLE
            .iter()
            .find(|(_, l, _)| *l == wanted)
            .map(|(size, _, _)| *size)
            .ok_or_else(|| ValidationError::UnknownSyringeSize(label.to_string()))
    }

    /// Reverse lookup of a bore reported by the pump
    ///
    /// Matches the exact text first, then numerically, so `11.990` also
    /// resolves to `5ml`.
    pub fn from_bore(bore: &str) -> Option<Self> {
        let bore = bore.trim();
        if let Some((size, _, _)) = BORE_TABLE.iter().find(|(_, _, b)| *b == bore) {
            return Some(*size);
        }
        let mm: f64 = bore.parse().ok()?;
        Self::all().find(|size| (size.bore_mm() - mm).abs() < BORE_TOLERANCE_MM)
    }
}

impl FromStr for SyringeSize {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}

impl fmt::Display for SyringeSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Diameter reported by the pump
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiameterReading {
    /// Bore in mm as reported
    pub raw_mm: f64,
    /// Matching syringe, if the bore is in the table
    pub size: Option<SyringeSize>,
}

impl DiameterReading {
    /// Resolve a reported bore against the table
    pub fn from_bore(text: &str, raw_mm: f64) -> Self {
        Self {
            raw_mm,
            size: SyringeSize::from_bore(text),
        }
    }
}

impl fmt::Display for DiameterReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            Some(size) => write!(f, "{} mm ({})", self.raw_mm, size),
            None => write!(f, "{} mm", self.raw_mm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_is_bijective() {
        let bores: HashSet<&str> = SyringeSize::all().map(|s| s.bore()).collect();
        let labels: HashSet<&str> = SyringeSize::all().map(|s| s.label()).collect();
        assert_eq!(bores.len(), 6);
        assert_eq!(labels.len(), 6);
        for size in SyringeSize::all() {
            assert_eq!(SyringeSize::from_bore(size.bore()), Some(size));
            assert_eq!(SyringeSize::from_label(size.label()), Ok(size));
        }
    }

    #[test]
    fn test_five_ml() {
        assert_eq!(SyringeSize::from_label("5ml").unwrap().bore(), "11.99");
        assert_eq!(SyringeSize::from_bore("11.99"), Some(SyringeSize::Ml5));
        assert_eq!(SyringeSize::from_bore("11.990"), Some(SyringeSize::Ml5));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(
            SyringeSize::from_label("7ml"),
            Err(ValidationError::UnknownSyringeSize("7ml".to_string()))
        );
        assert_eq!(SyringeSize::from_bore("12.50"), None);
        assert_eq!(SyringeSize::from_bore("abc"), None);
    }

    #[test]
    fn test_label_case_insensitive() {
        assert_eq!(SyringeSize::from_label(" 60ML "), Ok(SyringeSize::Ml60));
    }
}

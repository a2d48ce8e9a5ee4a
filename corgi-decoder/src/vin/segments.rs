//! Segment decomposition
//!
//! Normalizes a raw VIN and splits it into WMI (1-3), VDS (4-8), check digit
//! (9) and VIS (10-17). Structural problems are returned as `DecodeError`s and
//! stop the pipeline for that VIN.

use crate::types::{DecodeError, ErrorCode};

/// Required VIN length
pub const VIN_LENGTH: usize = 17;

/// Length of the pattern key (VDS + VIS)
pub const PATTERN_KEY_LENGTH: usize = 13;

/// Uppercase and trim
pub fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// `[0-9A-HJ-NPR-Z]`
pub fn is_allowed(c: char) -> bool {
    matches!(c, '0'..='9' | 'A'..='H' | 'J'..='N' | 'P' | 'R'..='Z')
}

/// A structurally valid, normalized VIN
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VinSegments {
    vin: String,
}

impl VinSegments {
    /// Normalize and validate a raw VIN
    ///
    /// Returns every structural error found; both length and character
    /// problems are reported when both apply.
    pub fn parse(raw: &str) -> Result<Self, Vec<DecodeError>> {
        let vin = normalize(raw);
        let mut errors = Vec::new();

        let length = vin.chars().count();
        if length != VIN_LENGTH {
            errors.push(
                DecodeError::new(
                    ErrorCode::InvalidLength,
                    format!("VIN must be {} characters, got {}", VIN_LENGTH, length),
                )
                .with_values(VIN_LENGTH.to_string(), length.to_string()),
            );
        }

        let invalid: Vec<String> = vin
            .chars()
            .enumerate()
            .filter(|(_, c)| !is_allowed(*c))
            .map(|(i, c)| format!("'{}' at position {}", c, i + 1))
            .collect();
        if !invalid.is_empty() {
            errors.push(DecodeError::new(
                ErrorCode::InvalidCharacters,
                format!("VIN contains invalid characters: {}", invalid.join(", ")),
            ));
        }

        if errors.is_empty() {
            Ok(Self { vin })
        } else {
            Err(errors)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.vin
    }

    /// Character at a 1-based VIN position
    pub fn position(&self, position: usize) -> char {
        // Validated ASCII, so byte indexing is character indexing
        self.vin.as_bytes()[position - 1] as char
    }

    /// Positions 1-3
    pub fn wmi(&self) -> &str {
        &self.vin[0..3]
    }

    /// Positions 4-8
    pub fn vds(&self) -> &str {
        &self.vin[3..8]
    }

    /// Position 9
    pub fn check_digit(&self) -> char {
        self.position(9)
    }

    /// Positions 10-17
    pub fn vis(&self) -> &str {
        &self.vin[9..17]
    }

    /// Position 10
    pub fn model_year_code(&self) -> char {
        self.position(10)
    }

    /// Position 11
    pub fn plant_code(&self) -> char {
        self.position(11)
    }

    /// Positions 12-14, the manufacturer suffix under the extended WMI scheme
    pub fn extended_wmi_code(&self) -> &str {
        &self.vin[11..14]
    }

    /// Positions 12-17
    pub fn serial(&self) -> &str {
        &self.vin[11..17]
    }

    /// VDS followed by VIS - the string rule patterns are matched against
    pub fn pattern_key(&self) -> String {
        let mut key = String::with_capacity(PATTERN_KEY_LENGTH);
        key.push_str(self.vds());
        key.push_str(self.vis());
        key
    }
}

//! Check digit validation
//!
//! Position 9 is a modulo-11 checksum over the other 16 characters. Letters are
//! transliterated to digits, multiplied by a per-position weight, summed, and
//! the remainder is the expected digit (10 is written as `X`).

use crate::types::{DecodeError, ErrorCode};
use crate::vin::segments::{VinSegments, VIN_LENGTH};

/// Per-position weights; position 9 carries weight 0
const WEIGHTS: [u32; VIN_LENGTH] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];

/// Numeric value of a VIN character, `None` for I/O/Q and anything outside the VIN alphabet
pub fn transliterate(c: char) -> Option<u32> {
    let value = match c {
        '0'..='9' => c as u32 - '0' as u32,
        'A' | 'J' => 1,
        'B' | 'K' | 'S' => 2,
        'C' | 'L' | 'T' => 3,
        'D' | 'M' | 'U' => 4,
        'E' | 'N' | 'V' => 5,
        'F' | 'W' => 6,
        'G' | 'P' | 'X' => 7,
        'H' | 'Y' => 8,
        'R' | 'Z' => 9,
        _ => return None,
    };
    Some(value)
}

/// Expected check digit for a 17-character VIN
///
/// Returns `None` when the input is not 17 transliterable characters.
pub fn compute(vin: &str) -> Option<char> {
    if vin.chars().count() != VIN_LENGTH {
        return None;
    }

    let mut sum = 0u32;
    for (c, weight) in vin.chars().zip(WEIGHTS.iter()) {
        sum += transliterate(c)? * weight;
    }

    match sum % 11 {
        10 => Some('X'),
        digit => char::from_digit(digit, 10),
    }
}

/// Outcome of the check digit comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckDigitReport {
    pub expected: char,
    pub actual: char,
    pub is_valid: bool,
}

impl CheckDigitReport {
    /// The embedded error for a mismatch, if any
    pub fn to_error(&self) -> Option<DecodeError> {
        if self.is_valid {
            return None;
        }
        Some(
            DecodeError::new(
                ErrorCode::InvalidCheckDigit,
                format!(
                    "Check digit mismatch: expected '{}', found '{}'",
                    self.expected, self.actual
                ),
            )
            .with_values(self.expected.to_string(), self.actual.to_string()),
        )
    }
}

/// Validate the check digit of a structurally valid VIN
pub fn validate(vin: &VinSegments) -> CheckDigitReport {
    let actual = vin.check_digit();
    // Structural validation guarantees every character transliterates
    let expected = compute(vin.as_str()).unwrap_or('?');
    CheckDigitReport {
        expected,
        actual,
        is_valid: expected == actual,
    }
}

//! Model year resolution
//!
//! Position 10 encodes the model year through a 30-symbol alphabet that
//! repeats every 30 years, so each symbol names two candidate years. The
//! resolver picks one using, in order: an explicit override, rule applicability
//! windows that support exactly one candidate, and the position 7 heuristic.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::vin::segments::VinSegments;

/// Position 10 alphabet: no I, O, Q, U, Z or 0
pub const YEAR_CODES: &str = "ABCDEFGHJKLMNPRSTVWXY123456789";

/// Year encoded by `A` in the first cycle
pub const BASE_YEAR: u16 = 1980;

/// Length of one cycle
pub const CYCLE_YEARS: u16 = 30;

/// Earliest and latest years any position 10 symbol can express
pub const MIN_YEAR: u16 = BASE_YEAR;
pub const MAX_YEAR: u16 = BASE_YEAR + 2 * CYCLE_YEARS - 1;

/// The two readings of a position 10 symbol, older era first
pub fn candidates(code: char) -> Option<[u16; 2]> {
    let index = YEAR_CODES.find(code)? as u16;
    let older = BASE_YEAR + index;
    Some([older, older + CYCLE_YEARS])
}

/// Where the chosen year came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YearSource {
    /// Caller supplied `model_year`
    Override,
    /// Position 7 heuristic
    Heuristic,
    /// Rule applicability windows supported exactly one era
    PatternDerived,
}

impl fmt::Display for YearSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearSource::Override => write!(f, "override"),
            YearSource::Heuristic => write!(f, "heuristic"),
            YearSource::PatternDerived => write!(f, "pattern-derived"),
        }
    }
}

/// Resolver output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelYearResolution {
    /// `None` when position 10 is not a year symbol and no usable override was given
    pub year: Option<u16>,
    pub source: YearSource,
    /// Both era readings, older first (empty for an unknown symbol)
    pub candidates: Vec<u16>,
}

/// Model year resolver
#[derive(Debug, Clone, Copy)]
pub struct ModelYearResolver {
    /// Years later than `reference_year + 1` are treated as implausible
    reference_year: i32,
}

impl ModelYearResolver {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    /// Resolve the model year
    ///
    /// `window_supports` reports whether any rule applicability window for
    /// this VIN includes a given year; it is only consulted when no override
    /// was supplied.
    pub fn resolve(
        &self,
        vin: &VinSegments,
        override_year: Option<u16>,
        window_supports: impl Fn(u16) -> bool,
    ) -> ModelYearResolution {
        let pair = candidates(vin.model_year_code());
        let candidate_list = pair.map(|p| p.to_vec()).unwrap_or_default();

        if let Some(year) = override_year {
            let year = (MIN_YEAR..=MAX_YEAR).contains(&year).then_some(year);
            if year.is_none() {
                log::warn!("Ignoring model year override outside {}-{}", MIN_YEAR, MAX_YEAR);
            }
            return ModelYearResolution {
                year,
                source: YearSource::Override,
                candidates: candidate_list,
            };
        }

        let Some([older, newer]) = pair else {
            log::debug!("Position 10 '{}' is not a model year code", vin.model_year_code());
            return ModelYearResolution {
                year: None,
                source: YearSource::Heuristic,
                candidates: candidate_list,
            };
        };

        let (year, source) = match (window_supports(older), window_supports(newer)) {
            (true, false) => (older, YearSource::PatternDerived),
            (false, true) => (newer, YearSource::PatternDerived),
            _ => (self.heuristic(vin, older, newer), YearSource::Heuristic),
        };

        ModelYearResolution {
            year: Some(year),
            source,
            candidates: candidate_list,
        }
    }

    /// Digit at position 7 favors the older era, a letter the newer one
    fn heuristic(&self, vin: &VinSegments, older: u16, newer: u16) -> u16 {
        if vin.position(7).is_ascii_digit() {
            return older;
        }
        if i32::from(newer) > self.reference_year + 1 {
            log::debug!(
                "Newer era {} is after reference year {}, using {}",
                newer,
                self.reference_year,
                older
            );
            return older;
        }
        newer
    }
}

//! Confidence scoring
//!
//! Each decoded field gets a score in 0-1 from the evidence behind it; the
//! overall score aggregates the field scores. The formula sits behind
//! [`ConfidenceModel`] so callers can swap it.

use std::collections::BTreeMap;

use crate::store::WmiMatchKind;
use crate::vin::model_year::YearSource;

/// Field key for the WMI component
pub const WMI_FIELD: &str = "wmi";
/// Field key for the model year
pub const MODEL_YEAR_FIELD: &str = "modelYear";

/// What a decoded field rests on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEvidence {
    /// Winning pattern rule; `contested` when an equally specific rule lost a tie-break
    Pattern { specificity: usize, contested: bool },
    /// WMI record selection
    Wmi(WmiMatchKind),
    ModelYear(YearSource),
}

/// Confidence formula
pub trait ConfidenceModel: Send + Sync {
    /// Score for one field
    fn field_confidence(&self, evidence: &FieldEvidence, check_digit_valid: bool) -> f64;

    /// Overall score from the field scores; mean by default, 0 when empty
    fn overall(&self, fields: &BTreeMap<String, f64>) -> f64 {
        if fields.is_empty() {
            return 0.0;
        }
        fields.values().sum::<f64>() / fields.len() as f64
    }
}

/// Default weighted formula
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedConfidence {
    /// Specificity at which a pattern earns full credit
    pub saturation: usize,
    pub contested_factor: f64,
    pub fallback_wmi: f64,
    pub year_override: f64,
    pub year_pattern_derived: f64,
    pub year_heuristic: f64,
    /// Applied to every field when the check digit does not match
    pub invalid_check_digit_factor: f64,
}

impl Default for WeightedConfidence {
    fn default() -> Self {
        Self {
            saturation: 5,
            contested_factor: 0.9,
            fallback_wmi: 0.85,
            year_override: 1.0,
            year_pattern_derived: 0.9,
            year_heuristic: 0.75,
            invalid_check_digit_factor: 0.8,
        }
    }
}

impl ConfidenceModel for WeightedConfidence {
    fn field_confidence(&self, evidence: &FieldEvidence, check_digit_valid: bool) -> f64 {
        let base = match *evidence {
            FieldEvidence::Pattern { specificity, contested } => {
                let saturation = self.saturation.max(1);
                let ratio = specificity.min(saturation) as f64 / saturation as f64;
                let score = 0.5 + 0.5 * ratio;
                if contested {
                    score * self.contested_factor
                } else {
                    score
                }
            }
            FieldEvidence::Wmi(WmiMatchKind::Exact | WmiMatchKind::Extended) => 1.0,
            FieldEvidence::Wmi(WmiMatchKind::Fallback) => self.fallback_wmi,
            FieldEvidence::ModelYear(YearSource::Override) => self.year_override,
            FieldEvidence::ModelYear(YearSource::PatternDerived) => self.year_pattern_derived,
            FieldEvidence::ModelYear(YearSource::Heuristic) => self.year_heuristic,
        };

        let score = if check_digit_valid {
            base
        } else {
            base * self.invalid_check_digit_factor
        };
        score.clamp(0.0, 1.0)
    }
}

/// Scores for one decode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfidenceReport {
    fields: BTreeMap<String, f64>,
    overall: f64,
}

impl ConfidenceReport {
    pub fn score<I, S>(model: &dyn ConfidenceModel, evidence: I, check_digit_valid: bool) -> Self
    where
        I: IntoIterator<Item = (S, FieldEvidence)>,
        S: Into<String>,
    {
        let fields: BTreeMap<String, f64> = evidence
            .into_iter()
            .map(|(field, ev)| (field.into(), model.field_confidence(&ev, check_digit_valid)))
            .collect();
        let overall = model.overall(&fields);
        Self { fields, overall }
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    pub fn overall(&self) -> f64 {
        self.overall
    }

    pub fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    /// True if the field was scored and falls below the threshold
    pub fn is_withheld(&self, field: &str, threshold: f64) -> bool {
        self.get(field).is_some_and(|score| score < threshold)
    }

    /// Fields scoring below the threshold, in name order
    pub fn withheld(&self, threshold: f64) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, &score)| score < threshold)
            .map(|(field, _)| field.clone())
            .collect()
    }
}

//! Result assembly
//!
//! Turns the WMI match, resolved pattern elements, model year and check digit
//! into result components. Scoring happens here too, because threshold
//! filtering decides which fields make it into the components.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::normalize::normalize_element;
use crate::patterns::resolver::Resolution;
use crate::patterns::rule::PatternRule;
use crate::scoring::{ConfidenceModel, ConfidenceReport, FieldEvidence, MODEL_YEAR_FIELD, WMI_FIELD};
use crate::store::WmiMatch;
use crate::types::{
    CheckDigitInfo, Components, DecodeError, EngineInfo, ErrorCode, ModelYearInfo, PatternMatch, PlantInfo,
    VehicleInfo, WmiInfo,
};
use crate::vin::check_digit::CheckDigitReport;
use crate::vin::model_year::ModelYearResolution;
use crate::vin::segments::VinSegments;

/// Everything the assembler reads
pub(crate) struct DecodeInputs<'a> {
    pub vin: &'a VinSegments,
    pub wmi: Option<&'a WmiMatch>,
    pub resolution: &'a Resolution,
    pub year: &'a ModelYearResolution,
    pub check: &'a CheckDigitReport,
}

/// Assembly output
#[derive(Debug, Clone)]
pub(crate) struct Assembled {
    pub components: Components,
    /// Missing mandatory elements
    pub errors: Vec<DecodeError>,
    pub confidence: ConfidenceReport,
    pub withheld: Vec<String>,
    /// Winning values before normalization
    pub raw: BTreeMap<String, String>,
}

fn pattern_evidence(rule: &PatternRule, contested: bool) -> FieldEvidence {
    FieldEvidence::Pattern {
        specificity: rule.specificity(),
        contested,
    }
}

/// Collect scoring evidence for every decoded field
fn evidence(inputs: &DecodeInputs<'_>) -> Vec<(String, FieldEvidence)> {
    let mut fields = Vec::new();

    if let Some(wmi) = inputs.wmi {
        fields.push((WMI_FIELD.to_string(), FieldEvidence::Wmi(wmi.kind)));
        if !inputs.resolution.contains("make") {
            fields.push(("make".to_string(), FieldEvidence::Wmi(wmi.kind)));
        }
    }
    if inputs.year.year.is_some() {
        fields.push((MODEL_YEAR_FIELD.to_string(), FieldEvidence::ModelYear(inputs.year.source)));
    }
    for (element, resolved) in inputs.resolution.iter() {
        fields.push((element.to_string(), pattern_evidence(resolved.winner(), resolved.contested)));
    }
    fields
}

/// Leading number of a value such as "2.0L" or "147 hp"
fn parse_number<T: FromStr>(raw: &str) -> Option<T> {
    let trimmed = raw.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

/// Leading integer, ignoring any fractional part
fn parse_integer<T: FromStr>(raw: &str) -> Option<T> {
    let number = raw.trim();
    let end = number
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(number.len());
    number[..end].parse().ok()
}

/// Winning values that survive the threshold
struct Fields<'a> {
    resolution: &'a Resolution,
    report: &'a ConfidenceReport,
    threshold: f64,
}

impl Fields<'_> {
    fn text(&self, element: &str) -> Option<String> {
        if self.report.is_withheld(element, self.threshold) {
            return None;
        }
        let raw = self.resolution.value(element)?;
        Some(normalize_element(element, raw))
    }

    fn integer<T: FromStr>(&self, element: &str) -> Option<T> {
        let raw = self.text(element)?;
        let parsed = parse_integer(&raw);
        if parsed.is_none() {
            log::debug!("Element {} has non-numeric value '{}'", element, raw);
        }
        parsed
    }

    fn number(&self, element: &str) -> Option<f64> {
        let raw = self.text(element)?;
        let parsed = parse_number(&raw);
        if parsed.is_none() {
            log::debug!("Element {} has non-numeric value '{}'", element, raw);
        }
        parsed
    }
}

fn some_if<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}

pub(crate) fn assemble(inputs: &DecodeInputs<'_>, model: &dyn ConfidenceModel, threshold: f64) -> Assembled {
    let confidence = ConfidenceReport::score(model, evidence(inputs), inputs.check.is_valid);
    let withheld = confidence.withheld(threshold);
    let fields = Fields {
        resolution: inputs.resolution,
        report: &confidence,
        threshold,
    };
    let withheld_wmi = confidence.is_withheld(WMI_FIELD, threshold);
    let withheld_year = confidence.is_withheld(MODEL_YEAR_FIELD, threshold);

    let wmi_record = inputs.wmi.map(|m| &m.record);
    let make_value = inputs
        .resolution
        .value("make")
        .map(str::to_string)
        .or_else(|| wmi_record.map(|r| r.make.clone()))
        .filter(|m| !m.trim().is_empty());

    let mut errors = Vec::new();
    match inputs.wmi {
        None => errors.push(DecodeError::new(
            ErrorCode::WmiNotFound,
            format!("No manufacturer registered for WMI '{}'", inputs.vin.wmi()),
        )),
        Some(_) if make_value.is_none() => errors.push(DecodeError::new(
            ErrorCode::PatternNotFound,
            "No make could be determined",
        )),
        Some(_) => {}
    }
    if !inputs.resolution.contains("model") {
        errors.push(DecodeError::new(
            ErrorCode::PatternNotFound,
            format!("No pattern matched the model for '{}'", inputs.vin.as_str()),
        ));
    }
    if inputs.year.year.is_none() {
        errors.push(DecodeError::new(
            ErrorCode::PatternNotFound,
            format!(
                "Model year could not be determined from position 10 '{}'",
                inputs.vin.model_year_code()
            ),
        ));
    }

    let vehicle = VehicleInfo {
        make: make_value.filter(|_| !confidence.is_withheld("make", threshold)),
        model: fields.text("model"),
        year: inputs.year.year.filter(|_| !withheld_year),
        series: fields.text("series"),
        trim: fields.text("trim"),
        body_style: fields.text("body_style"),
        drive_type: fields.text("drive_type"),
        doors: fields.integer("doors"),
        fuel_type: fields.text("fuel_type"),
        vehicle_type: fields.text("vehicle_type").or_else(|| {
            wmi_record
                .filter(|_| !withheld_wmi)
                .and_then(|r| r.vehicle_type.clone())
        }),
        gvwr: fields.text("gvwr"),
        cab: fields.text("cab"),
        bed_length: fields.text("bed_length"),
        wheelbase: fields.text("wheelbase"),
    };

    let engine = EngineInfo {
        model: fields.text("engine.model"),
        cylinders: fields.integer("engine.cylinders"),
        displacement: fields.number("engine.displacement"),
        fuel: fields.text("engine.fuel"),
        horsepower: fields.integer("engine.horsepower"),
        configuration: fields.text("engine.configuration"),
    };

    let plant = PlantInfo {
        code: String::new(),
        country: fields.text("plant.country"),
        city: fields.text("plant.city"),
        state: fields.text("plant.state"),
        company: fields.text("plant.company"),
    };
    let plant = some_if(plant).map(|p| PlantInfo {
        code: inputs.vin.plant_code().to_string(),
        ..p
    });

    let wmi = wmi_record.filter(|_| !withheld_wmi).map(|r| WmiInfo {
        code: r.code.clone(),
        manufacturer: r.manufacturer.clone(),
        make: r.make.clone(),
        country: r.country.clone(),
        region: r.region.clone(),
        vehicle_type: r.vehicle_type.clone(),
    });

    let model_year = inputs
        .year
        .year
        .filter(|_| !withheld_year)
        .map(|year| ModelYearInfo {
            year,
            source: inputs.year.source,
            confidence: confidence.get(MODEL_YEAR_FIELD).unwrap_or_default(),
            candidates: inputs.year.candidates.clone(),
        });

    let check_digit = Some(CheckDigitInfo {
        position: 9,
        actual: inputs.check.actual.to_string(),
        expected: inputs.check.expected.to_string(),
        is_valid: inputs.check.is_valid,
    });

    let raw = inputs
        .resolution
        .iter()
        .map(|(element, resolved)| (element.to_string(), resolved.winner().value.clone()))
        .collect();

    Assembled {
        components: Components {
            vehicle: some_if(vehicle),
            wmi,
            plant,
            engine: some_if(engine),
            model_year,
            check_digit,
        },
        errors,
        confidence,
        withheld,
        raw,
    }
}

/// Every candidate per element, winner first, for `include_pattern_details`
pub(crate) fn pattern_matches(
    resolution: &Resolution,
    model: &dyn ConfidenceModel,
    check_digit_valid: bool,
) -> Vec<PatternMatch> {
    let mut matches = Vec::new();
    for (element, resolved) in resolution.iter() {
        let candidates = resolved.candidates();
        for (idx, rule) in candidates.iter().enumerate() {
            let contested = candidates
                .iter()
                .enumerate()
                .any(|(other, r)| other != idx && r.specificity() == rule.specificity());
            let confidence = model.field_confidence(&pattern_evidence(rule, contested), check_digit_valid);
            matches.push(PatternMatch {
                element: element.to_string(),
                value: rule.value.clone(),
                value_id: rule.value_id.clone(),
                pattern: rule.pattern.as_str().to_string(),
                specificity: rule.specificity(),
                priority: rule.priority,
                confidence,
                winner: idx == 0,
                year_from: rule.year_from,
                year_to: rule.year_to,
            });
        }
    }
    matches
}

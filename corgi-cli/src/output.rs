//! Rendering decode results for the terminal

use anyhow::{Context, Result};
use corgi_decoder::{DecodeResult, Severity};
use std::fmt::Write;

use crate::config::OutputFormat;

pub fn render(result: &DecodeResult, format: OutputFormat, pretty: bool) -> Result<String> {
    match format {
        OutputFormat::Json => render_json(result, pretty),
        OutputFormat::Text => Ok(render_text(result)),
    }
}

pub fn render_json(result: &DecodeResult, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(result)
    } else {
        serde_json::to_string(result)
    };
    json.context("Failed to serialize decode result")
}

/// Human-readable summary; only populated fields are printed
pub fn render_text(result: &DecodeResult) -> String {
    let mut out = String::new();
    let mut line = |label: &str, value: &dyn std::fmt::Display| {
        let _ = writeln!(out, "  {:<14}{}", format!("{}:", label), value);
    };

    line("VIN", &result.vin);
    line("Valid", &if result.valid { "yes" } else { "no" });

    let c = &result.components;
    if let Some(wmi) = &c.wmi {
        line("WMI", &format!("{} ({})", wmi.code, wmi.manufacturer));
        if let Some(country) = &wmi.country {
            line("Country", country);
        }
    }
    if let Some(v) = &c.vehicle {
        let fields: [(&str, Option<String>); 9] = [
            ("Make", v.make.clone()),
            ("Model", v.model.clone()),
            ("Year", v.year.map(|y| y.to_string())),
            ("Series", v.series.clone()),
            ("Trim", v.trim.clone()),
            ("Body", v.body_style.clone()),
            ("Drive", v.drive_type.clone()),
            ("Fuel", v.fuel_type.clone()),
            ("Type", v.vehicle_type.clone()),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                line(label, &value);
            }
        }
    }
    if let Some(year) = &c.model_year {
        line("Year source", &format!("{} ({:.2})", year.source, year.confidence));
    }
    if let Some(engine) = &c.engine {
        let mut parts = Vec::new();
        if let Some(cyl) = engine.cylinders {
            parts.push(format!("{} cyl", cyl));
        }
        if let Some(disp) = engine.displacement {
            parts.push(format!("{:.1} L", disp));
        }
        if let Some(hp) = engine.horsepower {
            parts.push(format!("{} hp", hp));
        }
        if let Some(model) = &engine.model {
            parts.push(model.clone());
        }
        if !parts.is_empty() {
            line("Engine", &parts.join(", "));
        }
    }
    if let Some(plant) = &c.plant {
        let place: Vec<&str> = [&plant.city, &plant.state, &plant.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if place.is_empty() {
            line("Plant", &plant.code);
        } else {
            line("Plant", &format!("{} ({})", place.join(", "), plant.code));
        }
    }
    if let Some(cd) = &c.check_digit {
        let status = if cd.is_valid {
            format!("{} ok", cd.actual)
        } else {
            format!("{} (expected {})", cd.actual, cd.expected)
        };
        line("Check digit", &status);
    }
    if let Some(meta) = &result.metadata {
        line("Confidence", &format!("{:.2}", meta.confidence));
        if !meta.withheld_fields.is_empty() {
            line("Withheld", &meta.withheld_fields.join(", "));
        }
    }

    if !result.errors.is_empty() {
        let _ = writeln!(out, "  Problems:");
        for error in &result.errors {
            let tag = match error.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            let _ = writeln!(out, "    [{}] {}: {}", tag, error.code, error.message);
        }
    }

    if let Some(patterns) = &result.patterns {
        let _ = writeln!(out, "  Patterns:");
        for p in patterns {
            let _ = writeln!(
                out,
                "    {} {:<22} {:<10} specificity={} priority={} confidence={:.2} {}",
                if p.winner { "*" } else { " " },
                p.element,
                p.pattern,
                p.specificity,
                p.priority,
                p.confidence,
                p.value
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use corgi_decoder::{CheckDigitInfo, Components, DecodeError, ErrorCode, VehicleInfo};

    fn sample() -> DecodeResult {
        DecodeResult {
            vin: "1HGCM82633A123456".to_string(),
            valid: true,
            components: Components {
                vehicle: Some(VehicleInfo {
                    make: Some("Honda".to_string()),
                    model: Some("Accord".to_string()),
                    year: Some(2003),
                    ..Default::default()
                }),
                check_digit: Some(CheckDigitInfo {
                    position: 9,
                    actual: "3".to_string(),
                    expected: "1".to_string(),
                    is_valid: false,
                }),
                ..Default::default()
            },
            errors: vec![DecodeError::new(ErrorCode::InvalidCheckDigit, "check digit mismatch").as_warning()],
            metadata: None,
            patterns: None,
        }
    }

    #[test]
    fn test_text_output() {
        let text = render_text(&sample());
        assert!(text.contains("Honda"));
        assert!(text.contains("Accord"));
        assert!(text.contains("2003"));
        assert!(text.contains("3 (expected 1)"));
        assert!(text.contains("[warning] INVALID_CHECK_DIGIT"));
        assert!(!text.contains("Patterns:"));
    }

    #[test]
    fn test_json_output() {
        let json = render(&sample(), OutputFormat::Json, false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["vin"], "1HGCM82633A123456");
        assert_eq!(value["valid"], true);
        assert_eq!(value["components"]["vehicle"]["make"], "Honda");
        assert!(!json.contains('\n'));
    }
}

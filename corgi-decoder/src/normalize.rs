//! Enumerated-value normalization
//!
//! Dataset values are free text ("Sport Utility Vehicle (SUV)/Multi-Purpose
//! Vehicle (MPV)"). Body style, drive type and fuel type are mapped onto small
//! closed vocabularies by keyword; anything unrecognized passes through as is.

/// A closed vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    BodyStyle,
    DriveType,
    FuelType,
}

impl Vocabulary {
    /// Vocabulary that applies to an element, if any
    pub fn for_element(element: &str) -> Option<Self> {
        match element {
            "body_style" => Some(Vocabulary::BodyStyle),
            "drive_type" => Some(Vocabulary::DriveType),
            "fuel_type" | "engine.fuel" => Some(Vocabulary::FuelType),
            _ => None,
        }
    }

    /// Canonical terms
    pub fn terms(&self) -> &'static [&'static str] {
        match self {
            Vocabulary::BodyStyle => &[
                "SUV",
                "Sedan",
                "Coupe",
                "Hatchback",
                "Wagon",
                "Convertible",
                "Pickup",
                "Van",
                "Minivan",
                "Crossover",
                "Bus",
                "Motorcycle",
                "Truck",
            ],
            Vocabulary::DriveType => &["FWD", "RWD", "AWD", "4WD"],
            Vocabulary::FuelType => &[
                "Gasoline",
                "Diesel",
                "Electric",
                "Hybrid",
                "Plug-in Hybrid",
                "Flex Fuel",
                "Hydrogen",
                "CNG",
                "LPG",
            ],
        }
    }

    /// Map a raw value onto the vocabulary
    pub fn normalize(&self, raw: &str) -> Option<&'static str> {
        let tokens = tokenize(raw);
        let has = |word: &str| tokens.iter().any(|t| t == word);
        let has_any = |words: &[&str]| words.iter().any(|w| has(w));

        // First matching rule wins, so order matters
        let term = match self {
            Vocabulary::BodyStyle => {
                if has("minivan") {
                    "Minivan"
                } else if has_any(&["crossover", "cuv"]) {
                    "Crossover"
                } else if has_any(&["suv", "mpv"]) || (has("sport") && has("utility")) {
                    "SUV"
                } else if has_any(&["convertible", "cabriolet", "roadster"]) {
                    "Convertible"
                } else if has("coupe") {
                    "Coupe"
                } else if has_any(&["hatchback", "liftback"]) {
                    "Hatchback"
                } else if has_any(&["wagon", "estate"]) {
                    "Wagon"
                } else if has_any(&["sedan", "saloon"]) {
                    "Sedan"
                } else if has("pickup") {
                    "Pickup"
                } else if has("van") {
                    "Van"
                } else if has_any(&["bus", "coach"]) {
                    "Bus"
                } else if has_any(&["motorcycle", "scooter"]) {
                    "Motorcycle"
                } else if has_any(&["truck", "tractor"]) {
                    "Truck"
                } else {
                    return None;
                }
            }
            Vocabulary::DriveType => {
                if has("awd") || (has("all") && has("wheel")) {
                    "AWD"
                } else if has_any(&["4wd", "4x4"]) || (has_any(&["4", "four"]) && has("wheel")) {
                    "4WD"
                } else if has("fwd") || (has("front") && has("wheel")) {
                    "FWD"
                } else if has("rwd") || (has("rear") && has("wheel")) {
                    "RWD"
                } else {
                    return None;
                }
            }
            Vocabulary::FuelType => {
                if has("phev") || (has("plug") && has("hybrid")) {
                    "Plug-in Hybrid"
                } else if has_any(&["hybrid", "hev"]) {
                    "Hybrid"
                } else if has_any(&["flex", "flexible", "ffv", "e85"]) {
                    "Flex Fuel"
                } else if has("cng") || (has("natural") && has("gas")) {
                    "CNG"
                } else if has_any(&["lpg", "propane"]) || (has("liquefied") && has("petroleum")) {
                    "LPG"
                } else if has("hydrogen") || (has("fuel") && has("cell")) {
                    "Hydrogen"
                } else if has("diesel") {
                    "Diesel"
                } else if has_any(&["electric", "ev", "bev"]) {
                    "Electric"
                } else if has_any(&["gasoline", "petrol"]) || (has("gas") && !has_any(&["natural", "liquefied"])) {
                    "Gasoline"
                } else {
                    return None;
                }
            }
        };
        Some(term)
    }
}

fn tokenize(raw: &str) -> Vec<String> {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Normalize an element's value; elements without a vocabulary and unknown
/// values come back unchanged
pub fn normalize_element(element: &str, raw: &str) -> String {
    match Vocabulary::for_element(element).and_then(|v| v.normalize(raw)) {
        Some(term) => term.to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_styles() {
        let body = |raw| normalize_element("body_style", raw);
        assert_eq!(body("Sport Utility Vehicle (SUV)/Multi-Purpose Vehicle (MPV)"), "SUV");
        assert_eq!(body("Sedan/Saloon"), "Sedan");
        assert_eq!(body("Hatchback/Liftback/Notchback"), "Hatchback");
        assert_eq!(body("Crossover Utility Vehicle (CUV)"), "Crossover");
        assert_eq!(body("Convertible/Cabriolet"), "Convertible");
        assert_eq!(body("Minivan"), "Minivan");
        assert_eq!(body("Cargo Van"), "Van");
        assert_eq!(body("Truck-Tractor"), "Truck");
        assert_eq!(body("Incomplete - Chassis Cab"), "Incomplete - Chassis Cab");
    }

    #[test]
    fn test_drive_types() {
        let drive = |raw| normalize_element("drive_type", raw);
        assert_eq!(drive("AWD/All-Wheel Drive"), "AWD");
        assert_eq!(drive("4WD/4-Wheel Drive/4x4"), "4WD");
        assert_eq!(drive("FWD/Front-Wheel Drive"), "FWD");
        assert_eq!(drive("RWD/ Rear-Wheel Drive"), "RWD");
        assert_eq!(drive("6x4"), "6x4");
    }

    #[test]
    fn test_fuel_types() {
        assert_eq!(normalize_element("fuel_type", "Gasoline"), "Gasoline");
        assert_eq!(normalize_element("engine.fuel", "Compressed Natural Gas (CNG)"), "CNG");
        assert_eq!(normalize_element("fuel_type", "Flexible Fuel Vehicle (FFV)"), "Flex Fuel");
        assert_eq!(normalize_element("fuel_type", "Plug-in Hybrid Electric Vehicle (PHEV)"), "Plug-in Hybrid");
        assert_eq!(normalize_element("fuel_type", "Electric"), "Electric");
        assert_eq!(normalize_element("fuel_type", "Fuel Cell"), "Hydrogen");
    }

    #[test]
    fn test_gas_alone_is_not_gasoline() {
        assert_eq!(normalize_element("fuel_type", "Liquefied Petroleum Gas (LPG)"), "LPG");
        assert_eq!(normalize_element("fuel_type", "Propane"), "LPG");
        assert_eq!(normalize_element("fuel_type", "Compressed Natural Gas (CNG)"), "CNG");
        assert_eq!(normalize_element("fuel_type", "Gas"), "Gasoline");
    }

    #[test]
    fn test_canonical_terms_are_fixed_points() {
        for vocab in [Vocabulary::BodyStyle, Vocabulary::DriveType, Vocabulary::FuelType] {
            for term in vocab.terms() {
                assert_eq!(vocab.normalize(term), Some(*term), "{:?} {}", vocab, term);
            }
        }
    }

    #[test]
    fn test_other_elements_pass_through() {
        assert_eq!(normalize_element("model", "Sport Utility"), "Sport Utility");
    }
}

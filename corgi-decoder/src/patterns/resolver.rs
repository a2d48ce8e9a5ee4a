//! Pattern resolution
//!
//! Fetches the candidate rules for a VIN from the store, drops those whose
//! applicability window excludes the model year, and picks one winner per
//! element using the shared rank order.

use std::collections::BTreeMap;

use crate::patterns::rule::{sort_ranked, PatternRule};
use crate::store::{DatasetStore, ElementFilter};
use crate::types::Result;
use crate::vin::segments::VinSegments;

/// All rules matching one VIN, in rank order
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    rules: Vec<PatternRule>,
}

impl CandidateSet {
    /// Query the store for every rule matching the VIN's pattern key
    pub async fn fetch(
        store: &dyn DatasetStore,
        vin: &VinSegments,
        filter: &ElementFilter,
    ) -> Result<Self> {
        let rules = store.match_patterns(vin, filter).await?;
        log::trace!("{} candidate rules for {}", rules.len(), vin.as_str());
        Ok(Self::from_rules(rules))
    }

    /// Build from already-matched rules; re-ranks so callers need not pre-sort
    pub fn from_rules(mut rules: Vec<PatternRule>) -> Self {
        sort_ranked(&mut rules);
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// True if some windowed rule applies to the year
    pub fn window_supports(&self, year: u16) -> bool {
        self.rules.iter().any(|r| r.has_window() && r.applies_to(year))
    }

    /// Pick a winner per element
    ///
    /// With a model year, rules whose window excludes it are discarded first.
    pub fn resolve(&self, model_year: Option<u16>) -> Resolution {
        let mut grouped: BTreeMap<String, Vec<PatternRule>> = BTreeMap::new();
        for rule in &self.rules {
            if let Some(year) = model_year {
                if !rule.applies_to(year) {
                    log::trace!(
                        "Rule {} ({}) excluded for model year {}",
                        rule.id,
                        rule.element,
                        year
                    );
                    continue;
                }
            }
            // Rules are already ranked, so each group stays ranked
            grouped.entry(rule.element.clone()).or_default().push(rule.clone());
        }

        let elements = grouped
            .into_iter()
            .map(|(element, candidates)| {
                let contested = candidates.len() > 1
                    && candidates[0].specificity() == candidates[1].specificity();
                (element, ResolvedElement { candidates, contested })
            })
            .collect();

        Resolution { elements }
    }
}

/// Winner and runner-ups for one element
#[derive(Debug, Clone)]
pub struct ResolvedElement {
    /// Ranked, winner first; never empty
    candidates: Vec<PatternRule>,
    /// The runner-up was equally specific and lost on a tie-break
    pub contested: bool,
}

impl ResolvedElement {
    pub fn winner(&self) -> &PatternRule {
        &self.candidates[0]
    }

    pub fn runner_ups(&self) -> &[PatternRule] {
        &self.candidates[1..]
    }

    pub fn candidates(&self) -> &[PatternRule] {
        &self.candidates
    }
}

/// Resolved elements keyed by element name
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    elements: BTreeMap<String, ResolvedElement>,
}

impl Resolution {
    pub fn get(&self, element: &str) -> Option<&ResolvedElement> {
        self.elements.get(element)
    }

    /// Winning value for an element
    pub fn value(&self, element: &str) -> Option<&str> {
        self.get(element).map(|e| e.winner().value.as_str())
    }

    pub fn contains(&self, element: &str) -> bool {
        self.elements.contains_key(element)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedElement)> {
        self.elements.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Fetch and resolve in one step
pub async fn resolve(
    store: &dyn DatasetStore,
    vin: &VinSegments,
    filter: &ElementFilter,
    model_year: Option<u16>,
) -> Result<Resolution> {
    Ok(CandidateSet::fetch(store, vin, filter).await?.resolve(model_year))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn rule(id: i64, element: &str, pattern: &str, value: &str) -> PatternRule {
        PatternRule::new(id, "KM8", element, pattern, value).unwrap()
    }

    #[test]
    fn test_more_specific_rule_wins() {
        let candidates = CandidateSet::from_rules(vec![
            rule(1, "model", "K****", "Tucson"),
            rule(2, "model", "K2C", "Kona"),
            rule(3, "body_style", "K", "SUV"),
        ]);
        let resolution = candidates.resolve(None);

        let model = resolution.get("model").unwrap();
        assert_eq!(model.winner().value, "Kona");
        assert_eq!(model.runner_ups().len(), 1);
        assert!(!model.contested);
        assert_eq!(resolution.value("body_style"), Some("SUV"));
        assert_eq!(resolution.len(), 2);
    }

    #[test]
    fn test_contested_on_equal_specificity() {
        let candidates = CandidateSet::from_rules(vec![
            rule(1, "trim", "K2", "SE"),
            rule(2, "trim", "K*C", "SEL").with_priority(1),
        ]);
        let trim = candidates.resolve(None);
        let trim = trim.get("trim").unwrap();
        assert_eq!(trim.winner().value, "SEL");
        assert!(trim.contested);
    }

    #[test]
    fn test_year_window_filters_candidates() {
        let candidates = CandidateSet::from_rules(vec![
            rule(1, "model", "K2", "Kona").with_years(Some(2018), None),
            rule(2, "model", "K", "Excel").with_years(Some(1986), Some(1994)),
        ]);
        assert!(candidates.window_supports(2023));
        assert!(candidates.window_supports(1993));
        assert!(!candidates.window_supports(2005));

        assert_eq!(candidates.resolve(Some(2023)).value("model"), Some("Kona"));
        assert_eq!(candidates.resolve(Some(1993)).value("model"), Some("Excel"));
        assert!(candidates.resolve(Some(2005)).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_through_store() {
        let store = MemoryStore::builder()
            .rule(rule(1, "model", "K2C", "Kona"))
            .rule(rule(2, "model", "X", "Other"))
            .build();
        let vin = VinSegments::parse("KM8K2CAB4PU001140").unwrap();

        let resolution = resolve(&store, &vin, &ElementFilter::All, Some(2023)).await.unwrap();
        assert_eq!(resolution.value("model"), Some("Kona"));
        assert!(resolution.get("model").unwrap().runner_ups().is_empty());
    }
}

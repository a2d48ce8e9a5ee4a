//! In-memory store
//!
//! Rules live in one arena; per-WMI index lists are sorted by rank key once at
//! build time, so a lookup is a filter over an already ranked list.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::patterns::rule::PatternRule;
use crate::store::{select_wmi, DatasetInfo, DatasetStore, ElementFilter, WmiMatch, WmiRecord};
use crate::types::{Error, Result};
use crate::vin::segments::VinSegments;

/// Dataset held entirely in memory
pub struct MemoryStore {
    info: DatasetInfo,
    /// WMI code -> records (plain and extended)
    wmi: HashMap<String, Vec<WmiRecord>>,
    /// All rules, in insertion order
    arena: Vec<PatternRule>,
    /// WMI code -> arena indices in rank order
    by_wmi: HashMap<String, Vec<usize>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    /// Number of WMI records and rules
    pub fn counts(&self) -> (usize, usize) {
        (self.wmi.values().map(Vec::len).sum(), self.arena.len())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

/// Builder for [`MemoryStore`]
#[derive(Debug, Default)]
pub struct MemoryStoreBuilder {
    info: DatasetInfo,
    wmi: Vec<WmiRecord>,
    rules: Vec<PatternRule>,
}

impl MemoryStoreBuilder {
    pub fn info(mut self, info: DatasetInfo) -> Self {
        self.info = info;
        self
    }

    pub fn wmi(mut self, record: WmiRecord) -> Self {
        self.wmi.push(record);
        self
    }

    pub fn wmis(mut self, records: impl IntoIterator<Item = WmiRecord>) -> Self {
        self.wmi.extend(records);
        self
    }

    pub fn rule(mut self, rule: PatternRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = PatternRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn build(self) -> MemoryStore {
        let mut wmi: HashMap<String, Vec<WmiRecord>> = HashMap::new();
        for record in self.wmi {
            wmi.entry(record.code.clone()).or_default().push(record);
        }

        let arena = self.rules;
        let mut by_wmi: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, rule) in arena.iter().enumerate() {
            by_wmi.entry(rule.wmi.clone()).or_default().push(idx);
        }
        for indices in by_wmi.values_mut() {
            indices.sort_by_key(|&idx| arena[idx].rank_key());
        }

        MemoryStore {
            info: self.info,
            wmi,
            arena,
            by_wmi,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn dataset_info(&self) -> Result<DatasetInfo> {
        self.ensure_open()?;
        Ok(self.info.clone())
    }

    async fn lookup_wmi(&self, vin: &VinSegments) -> Result<Option<WmiMatch>> {
        self.ensure_open()?;
        Ok(self
            .wmi
            .get(vin.wmi())
            .and_then(|records| select_wmi(records, vin)))
    }

    async fn match_patterns(&self, vin: &VinSegments, filter: &ElementFilter) -> Result<Vec<PatternRule>> {
        self.ensure_open()?;
        let key = vin.pattern_key();
        let Some(indices) = self.by_wmi.get(vin.wmi()) else {
            return Ok(Vec::new());
        };
        Ok(indices
            .iter()
            .map(|&idx| &self.arena[idx])
            .filter(|rule| filter.accepts(&rule.element) && rule.matches(&key))
            .cloned()
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

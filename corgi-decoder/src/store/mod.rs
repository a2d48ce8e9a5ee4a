//! Dataset store
//!
//! Read-only access to WMI records and pattern rules behind one trait, with
//! three backends chosen from configuration at construction time:
//! - [`SqliteStore`]: local SQLite file prepared by the cache manager
//! - [`RemoteStore`]: compressed snapshot fetched from a URL into memory
//! - [`QueryStore`]: SQL issued through a host-provided [`QueryBinding`]
//!
//! Every backend filters and ranks with the same functions, so results and
//! ordering are identical; only the I/O differs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::acquire::DatasetCache;
use crate::config::{DecoderConfig, StoreTarget};
use crate::patterns::rule::{sort_ranked, PatternRule};
use crate::types::{Error, Result};
use crate::vin::segments::VinSegments;

pub mod memory;
pub mod query;
pub mod remote;
pub mod schema;
pub mod sqlite;

pub use memory::{MemoryStore, MemoryStoreBuilder};
pub use query::{clear_query_binding, register_query_binding, QueryBinding, QueryStore};
pub use remote::RemoteStore;
pub use schema::SCHEMA;
pub use sqlite::SqliteStore;

/// A manufacturer registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmiRecord {
    /// VIN positions 1-3
    pub code: String,
    /// Positions 12-14 prefix for manufacturers on the extended scheme
    pub extension: Option<String>,
    pub manufacturer: String,
    pub make: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub vehicle_type: Option<String>,
}

impl WmiRecord {
    pub fn new(code: impl Into<String>, manufacturer: impl Into<String>, make: impl Into<String>) -> Self {
        Self {
            code: code.into().to_ascii_uppercase(),
            extension: None,
            manufacturer: manufacturer.into(),
            make: make.into(),
            country: None,
            region: None,
            vehicle_type: None,
        }
    }

    /// Builder method: set country and region
    pub fn with_location(mut self, country: impl Into<String>, region: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self.region = Some(region.into());
        self
    }

    /// Builder method: set the extended-scheme suffix
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into().to_ascii_uppercase());
        self
    }

    /// Builder method: set the vehicle type
    pub fn with_vehicle_type(mut self, vehicle_type: impl Into<String>) -> Self {
        self.vehicle_type = Some(vehicle_type.into());
        self
    }
}

/// How a WMI record was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WmiMatchKind {
    /// The 3-character code alone identifies the manufacturer
    Exact,
    /// Code plus positions 12-14 matched an extended-scheme record
    Extended,
    /// A plain record stood in although extended records exist for the code
    Fallback,
}

/// A selected WMI record
#[derive(Debug, Clone, PartialEq)]
pub struct WmiMatch {
    pub record: WmiRecord,
    pub kind: WmiMatchKind,
}

/// Pick the record for a VIN out of all records sharing its WMI code
///
/// Extended records win over the plain one; among extended records the
/// longest matching suffix wins.
pub fn select_wmi(records: &[WmiRecord], vin: &VinSegments) -> Option<WmiMatch> {
    let suffix = vin.extended_wmi_code();
    let extended = records
        .iter()
        .filter_map(|r| r.extension.as_deref().map(|ext| (r, ext)))
        .filter(|(_, ext)| !ext.is_empty() && suffix.starts_with(ext))
        .max_by_key(|(_, ext)| ext.len());
    if let Some((record, _)) = extended {
        return Some(WmiMatch {
            record: record.clone(),
            kind: WmiMatchKind::Extended,
        });
    }

    let has_extended = records.iter().any(|r| r.extension.is_some());
    records
        .iter()
        .find(|r| r.extension.is_none())
        .map(|record| WmiMatch {
            record: record.clone(),
            kind: if has_extended { WmiMatchKind::Fallback } else { WmiMatchKind::Exact },
        })
}

/// Restricts which elements `match_patterns` returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ElementFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl ElementFilter {
    pub fn only<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ElementFilter::Only(elements.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, element: &str) -> bool {
        match self {
            ElementFilter::All => true,
            ElementFilter::Only(elements) => elements.contains(element),
        }
    }
}

/// Dataset metadata from the `meta` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub schema_version: Option<String>,
    pub vintage: Option<String>,
}

/// Read interface every backend implements
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Short backend name for diagnostics
    fn backend(&self) -> &'static str;

    async fn dataset_info(&self) -> Result<DatasetInfo>;

    /// WMI record for the VIN, honoring the extended scheme
    async fn lookup_wmi(&self, vin: &VinSegments) -> Result<Option<WmiMatch>>;

    /// Rules for the VIN's WMI whose pattern matches its pattern key, in rank order
    async fn match_patterns(&self, vin: &VinSegments, filter: &ElementFilter) -> Result<Vec<PatternRule>>;

    /// Release the underlying handle; later queries fail with `Error::Closed`
    async fn close(&self) -> Result<()>;
}

/// Keep rules that match the VIN and pass the filter, in rank order
pub(crate) fn matching_rules(
    rules: impl IntoIterator<Item = PatternRule>,
    vin: &VinSegments,
    filter: &ElementFilter,
) -> Vec<PatternRule> {
    let key = vin.pattern_key();
    let mut matched: Vec<PatternRule> = rules
        .into_iter()
        .filter(|r| filter.accepts(&r.element) && r.matches(&key))
        .collect();
    sort_ranked(&mut matched);
    matched
}

/// Open the backend the configuration selects
///
/// For local files this first runs the cache manager, so the returned store is
/// always backed by a complete dataset.
pub async fn open_store(config: &DecoderConfig, cache: &DatasetCache) -> Result<Arc<dyn DatasetStore>> {
    match config.store_target() {
        StoreTarget::Local(explicit) => {
            let mut options = config.acquire.clone();
            options.explicit_path = explicit;
            options.force_fresh |= config.force_fresh;
            let path = cache.ensure(&options).await?;
            log::info!("Opening local dataset: {:?}", path);
            Ok(Arc::new(SqliteStore::open(&path).await?))
        }
        StoreTarget::Remote(url) => {
            log::info!("Opening remote dataset: {}", url);
            Ok(Arc::new(RemoteStore::open(&url, &config.acquire).await?))
        }
        StoreTarget::Edge => {
            let binding = config
                .query_binding()
                .or_else(query::registered_query_binding)
                .ok_or_else(|| {
                    Error::BackendUnavailable(
                        "edge runtime selected but no query binding is registered".to_string(),
                    )
                })?;
            log::info!("Opening query service dataset");
            Ok(Arc::new(QueryStore::new(binding)))
        }
    }
}

//! Query-service dataset
//!
//! Hosts without a filesystem hand the decoder a [`QueryBinding`] that runs
//! SQL against a managed database and returns rows as JSON objects. The
//! binding is either passed in the decoder configuration or registered
//! process-wide before the decoder is built.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::patterns::rule::PatternRule;
use crate::store::schema::{self, RuleRow};
use crate::store::{matching_rules, select_wmi, DatasetInfo, DatasetStore, ElementFilter, WmiMatch};
use crate::types::{Error, Result};
use crate::vin::segments::VinSegments;

/// One result row, column name -> value
pub type Row = serde_json::Map<String, Value>;

/// Error type bindings report
pub type BindingError = Box<dyn std::error::Error + Send + Sync>;

/// Host-provided SQL execution
#[async_trait]
pub trait QueryBinding: Send + Sync {
    /// Run a statement with positional parameters and return every row
    async fn all(&self, sql: &str, params: &[Value]) -> std::result::Result<Vec<Row>, BindingError>;
}

static REGISTERED: RwLock<Option<Arc<dyn QueryBinding>>> = RwLock::new(None);

/// Register the process-wide binding used when the config carries none
pub fn register_query_binding(binding: Arc<dyn QueryBinding>) {
    match REGISTERED.write() {
        Ok(mut slot) => *slot = Some(binding),
        Err(poisoned) => *poisoned.into_inner() = Some(binding),
    }
}

pub fn clear_query_binding() {
    match REGISTERED.write() {
        Ok(mut slot) => *slot = None,
        Err(poisoned) => *poisoned.into_inner() = None,
    }
}

pub(crate) fn registered_query_binding() -> Option<Arc<dyn QueryBinding>> {
    match REGISTERED.read() {
        Ok(slot) => slot.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Store that issues the dataset queries through a [`QueryBinding`]
pub struct QueryStore {
    binding: Arc<dyn QueryBinding>,
    closed: AtomicBool,
}

impl QueryStore {
    pub fn new(binding: Arc<dyn QueryBinding>) -> Self {
        Self {
            binding,
            closed: AtomicBool::new(false),
        }
    }

    async fn rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.binding
            .all(sql, params)
            .await
            .map_err(|e| Error::BackendUnavailable(format!("query binding failed: {}", e)))
    }
}

fn bad_row(e: String) -> Error {
    Error::Query(format!("malformed row from query binding: {}", e))
}

#[async_trait]
impl DatasetStore for QueryStore {
    fn backend(&self) -> &'static str {
        "edge"
    }

    async fn dataset_info(&self) -> Result<DatasetInfo> {
        let rows = self.rows(schema::SELECT_META, &[]).await?;
        let pairs = rows.iter().filter_map(|row| {
            let key = row.get("key")?.as_str()?;
            let value = row.get("value")?.as_str()?;
            Some((key.to_string(), value.to_string()))
        });
        Ok(schema::info_from_pairs(pairs))
    }

    async fn lookup_wmi(&self, vin: &VinSegments) -> Result<Option<WmiMatch>> {
        let rows = self
            .rows(schema::SELECT_WMI, &[Value::from(vin.wmi())])
            .await?;
        let records = rows
            .iter()
            .map(schema::wmi_from_json)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(bad_row)?;
        Ok(select_wmi(&records, vin))
    }

    async fn match_patterns(&self, vin: &VinSegments, filter: &ElementFilter) -> Result<Vec<PatternRule>> {
        let rows = self
            .rows(schema::SELECT_RULES, &[Value::from(vin.wmi())])
            .await?;
        let rules = rows
            .iter()
            .map(schema::rule_from_json)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(bad_row)?;
        Ok(matching_rules(
            rules.into_iter().filter_map(RuleRow::into_rule),
            vin,
            filter,
        ))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

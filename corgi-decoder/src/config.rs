//! Decoder and decode-call configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::acquire::AcquireOptions;
use crate::store::QueryBinding;
use crate::types::{Error, Result};

/// Host environment, which selects the dataset backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
    /// Local file managed by the cache manager
    #[serde(rename = "node", alias = "local")]
    Local,
    /// Snapshot fetched from a URL into memory
    #[serde(rename = "browser", alias = "remote")]
    Remote,
    /// Host-provided query binding
    #[serde(rename = "edge")]
    Edge,
}

/// Per-call options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Overrides the year derived from position 10
    pub model_year: Option<u16>,
    /// Attach every matched rule to the result
    pub include_pattern_details: bool,
    /// Attach pre-normalization values to the metadata
    pub include_raw_data: bool,
    /// Fields scoring below this are withheld, 0-1
    pub confidence_threshold: f64,
    pub include_diagnostics: bool,
    /// Treat a check-digit mismatch as invalidating
    pub strict_check_digit: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            model_year: None,
            include_pattern_details: false,
            include_raw_data: false,
            confidence_threshold: 0.0,
            include_diagnostics: false,
            strict_check_digit: false,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: override the model year
    pub fn with_model_year(mut self, year: u16) -> Self {
        self.model_year = Some(year);
        self
    }

    /// Builder method: include matched rules
    pub fn with_pattern_details(mut self) -> Self {
        self.include_pattern_details = true;
        self
    }

    /// Builder method: include raw values
    pub fn with_raw_data(mut self) -> Self {
        self.include_raw_data = true;
        self
    }

    /// Builder method: set the confidence threshold
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Builder method: include diagnostics
    pub fn with_diagnostics(mut self) -> Self {
        self.include_diagnostics = true;
        self
    }

    /// Builder method: fail validity on a check-digit mismatch
    pub fn with_strict_check_digit(mut self) -> Self {
        self.strict_check_digit = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "confidence_threshold must be within 0-1, got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Which backend to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// Local file; `None` means let the cache manager find or fetch one
    Local(Option<PathBuf>),
    Remote(String),
    Edge,
}

/// Decoder construction settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// A file path, an `http(s)://` URL, or the `edge:` token
    pub database_path: Option<String>,
    /// Prepare a new cache file even if one exists
    pub force_fresh: bool,
    /// Explicit runtime; inferred from `database_path` when absent
    pub runtime: Option<Runtime>,
    pub default_options: DecodeOptions,
    /// Year the model-year heuristic measures against; current year if absent
    pub reference_year: Option<i32>,
    #[serde(skip)]
    pub acquire: AcquireOptions,
    #[serde(skip)]
    query_binding: Option<Arc<dyn QueryBinding>>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            force_fresh: false,
            runtime: None,
            default_options: DecodeOptions::default(),
            reference_year: None,
            acquire: AcquireOptions::default(),
            query_binding: None,
        }
    }
}

impl fmt::Debug for DecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderConfig")
            .field("database_path", &self.database_path)
            .field("force_fresh", &self.force_fresh)
            .field("runtime", &self.runtime)
            .field("default_options", &self.default_options)
            .field("reference_year", &self.reference_year)
            .field("acquire", &self.acquire)
            .field("query_binding", &self.query_binding.is_some())
            .finish()
    }
}

impl DecoderConfig {
    /// Defaults with environment overrides for acquisition
    pub fn new() -> Self {
        Self {
            acquire: AcquireOptions::from_env(),
            ..Self::default()
        }
    }

    /// Builder method: set the database path, URL or backend token
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Builder method: force a new cache preparation
    pub fn with_force_fresh(mut self, force_fresh: bool) -> Self {
        self.force_fresh = force_fresh;
        self
    }

    /// Builder method: set the runtime explicitly
    pub fn with_runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builder method: set the default decode options
    pub fn with_default_options(mut self, options: DecodeOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Builder method: pin the reference year
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    /// Builder method: set acquisition options
    pub fn with_acquire(mut self, acquire: AcquireOptions) -> Self {
        self.acquire = acquire;
        self
    }

    /// Builder method: attach a query binding for the edge backend
    pub fn with_query_binding(mut self, binding: Arc<dyn QueryBinding>) -> Self {
        self.query_binding = Some(binding);
        self
    }

    pub fn query_binding(&self) -> Option<Arc<dyn QueryBinding>> {
        self.query_binding.clone()
    }

    /// Backend selected by this configuration
    ///
    /// An explicit runtime wins; otherwise the database path decides.
    pub fn store_target(&self) -> StoreTarget {
        let path = self.database_path.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let is_url = |p: &str| p.starts_with("http://") || p.starts_with("https://");

        match self.runtime {
            Some(Runtime::Edge) => StoreTarget::Edge,
            Some(Runtime::Remote) => {
                StoreTarget::Remote(path.map(str::to_string).unwrap_or_else(|| self.acquire.download_url.clone()))
            }
            Some(Runtime::Local) => StoreTarget::Local(path.map(PathBuf::from)),
            None => match path {
                Some(p) if is_url(p) => StoreTarget::Remote(p.to_string()),
                Some(p) if p.starts_with("edge:") => StoreTarget::Edge,
                Some(p) => StoreTarget::Local(Some(PathBuf::from(p))),
                None => StoreTarget::Local(None),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.default_options.validate()?;
        if self.acquire.max_redirects > 20 {
            return Err(Error::InvalidConfig(format!(
                "max_redirects of {} is unreasonably high",
                self.acquire.max_redirects
            )));
        }
        Ok(())
    }
}

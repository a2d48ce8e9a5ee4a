//! Main decoder API
//!
//! This module provides the primary interface for the decoder library.
//! The Decoder struct opens the dataset once and then decodes any number of
//! VINs against it, concurrently if the caller wishes.

use chrono::{Datelike, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;
use tokio::sync::OnceCell;

use crate::acquire::DatasetCache;
use crate::assemble::{self, DecodeInputs};
use crate::config::{DecodeOptions, DecoderConfig};
use crate::patterns::resolver::CandidateSet;
use crate::scoring::{ConfidenceModel, WeightedConfidence};
use crate::store::{open_store, DatasetInfo, DatasetStore, ElementFilter, WmiMatchKind};
use crate::types::{
    Components, DecodeResult, Diagnostics, Error, Metadata, Result, Severity,
};
use crate::vin::check_digit;
use crate::vin::model_year::ModelYearResolver;
use crate::vin::segments::{self, VinSegments};
use crate::VERSION;

/// The main decoder struct - entry point for all decoding operations
pub struct Decoder {
    store: Arc<dyn DatasetStore>,
    info: DatasetInfo,
    default_options: DecodeOptions,
    year_resolver: ModelYearResolver,
    confidence: Arc<dyn ConfidenceModel>,
    closed: AtomicBool,
}

impl Decoder {
    /// Prepare the dataset and open a decoder
    ///
    /// Uses the process-wide [`DatasetCache`], so concurrent opens share one
    /// dataset preparation.
    ///
    /// # Arguments
    /// * `config` - Decoder configuration
    ///
    /// # Returns
    /// * `Result<Decoder>` - Err if the dataset cannot be prepared or opened
    ///
    /// # Example
    /// ```no_run
    /// use corgi_decoder::{Decoder, DecoderConfig};
    ///
    /// # async fn run() -> corgi_decoder::Result<()> {
    /// let decoder = Decoder::open(DecoderConfig::new()).await?;
    /// let result = decoder.decode("KM8K2CAB4PU001140").await?;
    /// println!("{:?} {:?}", result.make(), result.model());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(config: DecoderConfig) -> Result<Self> {
        Self::open_with_cache(config, DatasetCache::global()).await
    }

    /// Open a decoder using a specific cache instance
    pub async fn open_with_cache(config: DecoderConfig, cache: &DatasetCache) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config, cache).await?;
        Self::from_store(store, config).await
    }

    /// Wrap an already opened store
    pub async fn from_store(store: Arc<dyn DatasetStore>, config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        let info = store.dataset_info().await?;
        let reference_year = config.reference_year.unwrap_or_else(|| Utc::now().year());

        log::info!(
            "Decoder ready (backend {}, schema {}, vintage {})",
            store.backend(),
            info.schema_version.as_deref().unwrap_or("unknown"),
            info.vintage.as_deref().unwrap_or("unknown")
        );

        Ok(Self {
            store,
            info,
            default_options: config.default_options,
            year_resolver: ModelYearResolver::new(reference_year),
            confidence: Arc::new(WeightedConfidence::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Builder method: replace the confidence formula
    pub fn with_confidence_model(mut self, model: Arc<dyn ConfidenceModel>) -> Self {
        self.confidence = model;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Schema version and vintage of the open dataset
    pub fn dataset_info(&self) -> &DatasetInfo {
        &self.info
    }

    pub fn default_options(&self) -> &DecodeOptions {
        &self.default_options
    }

    /// Decode a VIN with the configured default options
    pub async fn decode(&self, vin: &str) -> Result<DecodeResult> {
        self.decode_with(vin, &self.default_options).await
    }

    /// Decode a VIN
    ///
    /// An invalid VIN is not an error: the result comes back with
    /// `valid == false` and the problems listed in `errors`. `Err` means the
    /// dataset could not be queried.
    ///
    /// # Arguments
    /// * `vin` - The VIN; surrounding whitespace and case are ignored
    /// * `options` - Per-call options
    ///
    /// # Example
    /// ```no_run
    /// use corgi_decoder::{DecodeOptions, Decoder, DecoderConfig};
    ///
    /// # async fn run() -> corgi_decoder::Result<()> {
    /// let decoder = Decoder::open(DecoderConfig::new()).await?;
    /// let options = DecodeOptions::new().with_model_year(2023).with_pattern_details();
    /// let result = decoder.decode_with("KM8K2CAB4PU001140", &options).await?;
    /// for pattern in result.patterns.unwrap_or_default() {
    ///     println!("{} = {} ({})", pattern.element, pattern.value, pattern.confidence);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn decode_with(&self, vin: &str, options: &DecodeOptions) -> Result<DecodeResult> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        options.validate()?;
        let started = Instant::now();

        let segments = match VinSegments::parse(vin) {
            Ok(segments) => segments,
            Err(errors) => {
                let normalized = segments::normalize(vin);
                log::debug!("Rejected '{}': {} structural error(s)", normalized, errors.len());
                return Ok(DecodeResult {
                    vin: normalized,
                    valid: false,
                    components: Components::default(),
                    errors,
                    metadata: Some(self.metadata(started, 0.0)),
                    patterns: None,
                });
            }
        };

        let mut errors = Vec::new();
        let check = check_digit::validate(&segments);
        if let Some(error) = check.to_error() {
            errors.push(if options.strict_check_digit {
                error
            } else {
                error.as_warning()
            });
        }

        let wmi = self.store.lookup_wmi(&segments).await?;
        let candidates = CandidateSet::fetch(self.store.as_ref(), &segments, &ElementFilter::All).await?;
        let year = self
            .year_resolver
            .resolve(&segments, options.model_year, |y| candidates.window_supports(y));
        let resolution = candidates.resolve(year.year);

        let inputs = DecodeInputs {
            vin: &segments,
            wmi: wmi.as_ref(),
            resolution: &resolution,
            year: &year,
            check: &check,
        };
        let assembled = assemble::assemble(&inputs, self.confidence.as_ref(), options.confidence_threshold);
        errors.extend(assembled.errors);

        let mut metadata = self.metadata(started, assembled.confidence.overall());
        metadata.withheld_fields = assembled.withheld;
        if options.include_raw_data {
            metadata.raw_data = Some(assembled.raw);
        }
        if options.include_diagnostics {
            metadata.diagnostics = Some(Diagnostics {
                backend: self.store.backend().to_string(),
                candidate_count: candidates.len(),
                field_confidence: assembled.confidence.fields().clone(),
                wmi_match: wmi.as_ref().map(|m| wmi_kind_name(m.kind).to_string()),
                year_candidates: year.candidates.clone(),
            });
        }

        let patterns = options.include_pattern_details.then(|| {
            assemble::pattern_matches(&resolution, self.confidence.as_ref(), check.is_valid)
        });

        let valid = !errors.iter().any(|e| e.severity == Severity::Error);
        log::debug!(
            "Decoded {} (valid: {}, {} candidate rules, {} error(s))",
            segments.as_str(),
            valid,
            candidates.len(),
            errors.len()
        );
        // Processing time covers everything up to here
        metadata.processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(DecodeResult {
            vin: segments.as_str().to_string(),
            valid,
            components: assembled.components,
            errors,
            metadata: Some(metadata),
            patterns,
        })
    }

    /// Release the dataset; later decodes fail with `Error::Closed`
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        log::debug!("Closing {} decoder", self.store.backend());
        self.store.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn metadata(&self, started: Instant, confidence: f64) -> Metadata {
        Metadata {
            confidence,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
            decoder_version: VERSION.to_string(),
            schema_version: self.info.schema_version.clone(),
            dataset_vintage: self.info.vintage.clone(),
            withheld_fields: Vec::new(),
            raw_data: None,
            diagnostics: None,
        }
    }
}

fn wmi_kind_name(kind: WmiMatchKind) -> &'static str {
    match kind {
        WmiMatchKind::Exact => "exact",
        WmiMatchKind::Extended => "extended",
        WmiMatchKind::Fallback => "fallback",
    }
}

/// Open a decoder; same as [`Decoder::open`]
pub async fn create_decoder(config: DecoderConfig) -> Result<Decoder> {
    Decoder::open(config).await
}

/// Lazily created decoder shared by many callers
///
/// The first `get` opens the decoder; callers arriving while it opens wait for
/// the same attempt. A failed open leaves the holder empty so the next `get`
/// tries again. `reset` closes the current decoder and starts over.
pub struct SharedDecoder {
    config: DecoderConfig,
    cell: Mutex<Arc<OnceCell<Arc<Decoder>>>>,
}

impl SharedDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            cell: Mutex::new(Arc::new(OnceCell::new())),
        }
    }

    fn current(&self) -> Arc<OnceCell<Arc<Decoder>>> {
        Arc::clone(&self.cell.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub async fn get(&self) -> Result<Arc<Decoder>> {
        let cell = self.current();
        cell.get_or_try_init(|| async { Decoder::open(self.config.clone()).await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Drop the current decoder, closing it if it was opened
    pub async fn reset(&self) -> Result<()> {
        let previous = {
            let mut slot = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, Arc::new(OnceCell::new()))
        };
        if let Some(decoder) = previous.get() {
            decoder.close().await?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.current().initialized()
    }
}

/// Process-wide shared decoder built from [`DecoderConfig::new`]
pub fn default_decoder() -> &'static SharedDecoder {
    static DEFAULT: OnceLock<SharedDecoder> = OnceLock::new();
    DEFAULT.get_or_init(|| SharedDecoder::new(DecoderConfig::new()))
}

/// Decode one VIN with the process-wide default decoder
pub async fn quick_decode(vin: &str) -> Result<DecodeResult> {
    default_decoder().get().await?.decode(vin).await
}

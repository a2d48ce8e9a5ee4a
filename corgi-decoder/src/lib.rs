//! Corgi VIN Decoder Library
//!
//! Decodes 17-character Vehicle Identification Numbers into vehicle,
//! manufacturer, plant and engine attributes using a locally cached copy of
//! the vPIC reference dataset. No network calls happen at decode time.
//!
//! # Architecture
//!
//! - `acquire` makes sure a complete dataset file exists locally, finding a
//!   bundled copy or downloading the compressed snapshot (single-flight)
//! - `store` reads WMI records and pattern rules through one trait, backed by
//!   SQLite, an in-memory snapshot, or a host-provided query binding
//! - `vin` decomposes the VIN and computes the check digit and model year
//! - `patterns` ranks matching rules and picks a winner per element
//! - `scoring` and `normalize` grade and canonicalize decoded values
//! - `decoder` ties the steps together
//!
//! Invalid VINs are not errors: a decode returns a result with `valid == false`
//! and the problems listed. An `Err` means the dataset was unavailable.
//!
//! # Example Usage
//!
//! ```no_run
//! use corgi_decoder::{create_decoder, DecodeOptions, DecoderConfig};
//!
//! # async fn run() -> corgi_decoder::Result<()> {
//! let decoder = create_decoder(DecoderConfig::new()).await?;
//!
//! let result = decoder.decode("1HGCM82633A123456").await?;
//! println!("{:?} {:?} {:?}", result.make(), result.model(), result.year());
//!
//! let detailed = decoder
//!     .decode_with("KM8K2CAB4PU001140", &DecodeOptions::new().with_pattern_details())
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&detailed).unwrap_or_default());
//!
//! decoder.close().await?;
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod acquire;
pub mod config;
pub mod decoder;
pub mod normalize;
pub mod patterns;
pub mod scoring;
pub mod store;
pub mod types;
pub mod vin;

// Internal modules (not exposed in public API)
mod assemble;

// Re-export main types for convenience
pub use acquire::{AcquireError, AcquireOptions, DatasetCache};
pub use config::{DecodeOptions, DecoderConfig, Runtime, StoreTarget};
pub use decoder::{create_decoder, default_decoder, quick_decode, Decoder, SharedDecoder};
pub use scoring::{ConfidenceModel, ConfidenceReport, FieldEvidence, WeightedConfidence};
pub use store::{
    clear_query_binding, register_query_binding, DatasetInfo, DatasetStore, MemoryStore, QueryBinding,
    WmiRecord,
};
pub use types::{
    CheckDigitInfo, Components, DecodeError, DecodeResult, Diagnostics, EngineInfo, Error, ErrorCategory,
    ErrorCode, Metadata, ModelYearInfo, PatternMatch, PlantInfo, Result, Severity, Timestamp, VehicleInfo,
    WmiInfo,
};
pub use vin::YearSource;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

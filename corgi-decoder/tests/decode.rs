//! End-to-end decoding against a SQLite fixture dataset

mod common;

use async_trait::async_trait;
use corgi_decoder::patterns::PatternRule;
use corgi_decoder::store::{ElementFilter, SqliteStore, WmiMatch};
use corgi_decoder::vin::VinSegments;
use corgi_decoder::{
    DatasetCache, DatasetInfo, DatasetStore, DecodeOptions, DecodeResult, Decoder, DecoderConfig, Error, ErrorCode,
    Runtime, Severity, YearSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn open_fixture() -> (TempDir, Decoder) {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("vpic.lite.db");
    common::write_dataset(&db);

    let config = DecoderConfig::default()
        .with_database_path(db.display().to_string())
        .with_reference_year(2025);
    let decoder = Decoder::open_with_cache(config, &DatasetCache::new()).await.unwrap();
    (dir, decoder)
}

/// Result with the run-dependent metadata fields cleared
fn stable(mut result: DecodeResult) -> DecodeResult {
    if let Some(metadata) = result.metadata.as_mut() {
        metadata.processing_time_ms = 0.0;
        metadata.timestamp = chrono::TimeZone::timestamp_opt(&chrono::Utc, 0, 0).unwrap();
    }
    result
}

#[tokio::test]
async fn test_honda_accord() {
    let (_dir, decoder) = open_fixture().await;
    let result = decoder.decode("1HGCM82633A123456").await.unwrap();

    assert!(result.valid);
    assert_eq!(result.make(), Some("Honda"));
    assert_eq!(result.model(), Some("Accord"));
    assert_eq!(result.year(), Some(2003));

    let vehicle = result.components.vehicle.as_ref().unwrap();
    assert_eq!(vehicle.body_style.as_deref(), Some("Sedan"));

    let plant = result.components.plant.as_ref().unwrap();
    assert_eq!(plant.code, "A");
    assert_eq!(plant.city.as_deref(), Some("Marysville"));
    assert_eq!(plant.state.as_deref(), Some("Ohio"));

    let check = result.components.check_digit.as_ref().unwrap();
    assert!(!check.is_valid);
    assert_eq!(check.expected, "7");

    // The mismatch is recorded but does not invalidate the VIN
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ErrorCode::InvalidCheckDigit);
    assert_eq!(result.errors[0].severity, Severity::Warning);
}

#[tokio::test]
async fn test_hyundai_kona() {
    let (_dir, decoder) = open_fixture().await;
    let result = decoder.decode("KM8K2CAB4PU001140").await.unwrap();

    assert!(result.valid);
    assert!(result.errors.is_empty());
    assert_eq!(result.make(), Some("Hyundai"));
    assert_eq!(result.model(), Some("Kona"));
    assert_eq!(result.year(), Some(2023));

    let vehicle = result.components.vehicle.as_ref().unwrap();
    assert_eq!(vehicle.body_style.as_deref(), Some("SUV"));
    assert_eq!(vehicle.drive_type.as_deref(), Some("AWD"));
    assert_eq!(vehicle.fuel_type.as_deref(), Some("Gasoline"));
    assert_eq!(vehicle.wheelbase.as_deref(), Some("102.4"));
    assert_eq!(vehicle.trim.as_deref(), Some("Limited"));
    assert_eq!(vehicle.cab, None);

    let engine = result.components.engine.as_ref().unwrap();
    assert_eq!(engine.cylinders, Some(4));
    assert_eq!(engine.displacement, Some(2.0));

    let model_year = result.components.model_year.as_ref().unwrap();
    assert_eq!(model_year.source, YearSource::PatternDerived);
    assert_eq!(model_year.candidates, vec![1993, 2023]);

    let wmi = result.components.wmi.as_ref().unwrap();
    assert_eq!(wmi.country.as_deref(), Some("South Korea"));

    let metadata = result.metadata.as_ref().unwrap();
    assert_eq!(metadata.dataset_vintage.as_deref(), Some("2025-06"));
}

#[tokio::test]
async fn test_invalid_vin() {
    let (_dir, decoder) = open_fixture().await;
    let result = decoder.decode("INVALID_VIN").await.unwrap();

    assert!(!result.valid);
    assert!(result.has_error(ErrorCode::InvalidLength) || result.has_error(ErrorCode::InvalidCharacters));
    assert!(result.components.vehicle.is_none());
    assert!(result.errors.iter().all(|e| e.is_structural()));
}

#[tokio::test]
async fn test_input_is_normalized() {
    let (_dir, decoder) = open_fixture().await;
    let result = decoder.decode("  km8k2cab4pu001140 ").await.unwrap();
    assert_eq!(result.vin, "KM8K2CAB4PU001140");
    assert_eq!(result.model(), Some("Kona"));
}

#[tokio::test]
async fn test_decoding_is_deterministic() {
    let (_dir, decoder) = open_fixture().await;
    let options = DecodeOptions::new().with_pattern_details().with_raw_data().with_diagnostics();

    let first = decoder.decode_with("KM8K2CAB4PU001140", &options).await.unwrap();
    let second = decoder.decode_with("KM8K2CAB4PU001140", &options).await.unwrap();
    assert_eq!(stable(first), stable(second));
}

#[tokio::test]
async fn test_pattern_details() {
    let (_dir, decoder) = open_fixture().await;
    let options = DecodeOptions::new().with_pattern_details();
    let result = decoder.decode_with("KM8K2CAB4PU001140", &options).await.unwrap();
    let patterns = result.patterns.unwrap();

    let trims: Vec<_> = patterns.iter().filter(|p| p.element == "trim").collect();
    assert_eq!(trims.len(), 2);
    assert!(trims[0].winner);
    assert_eq!(trims[0].value, "Limited");
    assert_eq!(trims[0].pattern, "K2C[A-C]");
    assert_eq!(trims[1].value, "SEL");
    assert!(!trims[1].winner);

    let models: Vec<_> = patterns.iter().filter(|p| p.element == "model").collect();
    assert_eq!(models[0].value, "Kona");
    assert_eq!(models[0].year_from, Some(2018));
    assert!(models[0].confidence > models[1].confidence);
}

#[tokio::test]
async fn test_confidence_threshold_withholds_fields() {
    let (_dir, decoder) = open_fixture().await;
    let options = DecodeOptions::new().with_confidence_threshold(0.95);
    let result = decoder.decode_with("KM8K2CAB4PU001140", &options).await.unwrap();

    // Make rests on the WMI record and survives
    assert_eq!(result.make(), Some("Hyundai"));
    let vehicle = result.components.vehicle.as_ref().unwrap();
    assert_eq!(vehicle.trim, None);

    let metadata = result.metadata.unwrap();
    assert!(metadata.withheld_fields.contains(&"trim".to_string()));
    // Withheld fields never become errors
    assert!(result.valid);
}

#[tokio::test]
async fn test_raw_data_keeps_dataset_text() {
    let (_dir, decoder) = open_fixture().await;
    let options = DecodeOptions::new().with_raw_data();
    let result = decoder.decode_with("KM8K2CAB4PU001140", &options).await.unwrap();
    let raw = result.metadata.unwrap().raw_data.unwrap();
    assert_eq!(
        raw["body_style"],
        "Sport Utility Vehicle (SUV)/Multi-Purpose Vehicle (MPV)"
    );
}

#[tokio::test]
async fn test_model_year_override() {
    let (_dir, decoder) = open_fixture().await;
    let options = DecodeOptions::new().with_model_year(1993);
    let result = decoder.decode_with("KM8K2CAB4PU001140", &options).await.unwrap();

    assert_eq!(result.year(), Some(1993));
    assert_eq!(result.model(), Some("Tucson"));
    let model_year = result.components.model_year.unwrap();
    assert_eq!(model_year.source, YearSource::Override);
    assert_eq!(model_year.confidence, 1.0);
}

#[tokio::test]
async fn test_json_shape() {
    let (_dir, decoder) = open_fixture().await;
    let result = decoder.decode("KM8K2CAB4PU001140").await.unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["components"]["vehicle"]["make"], "Hyundai");
    assert_eq!(json["components"]["vehicle"]["bodyStyle"], "SUV");
    assert_eq!(json["components"]["modelYear"]["source"], "pattern-derived");
    assert_eq!(json["components"]["checkDigit"]["isValid"], true);
    assert!(json["metadata"]["processingTimeMs"].is_number());
    assert!(json.get("patterns").is_none());
}

#[tokio::test]
async fn test_concurrent_decodes_share_one_decoder() {
    let (_dir, decoder) = open_fixture().await;
    let decoder = std::sync::Arc::new(decoder);

    let handles: Vec<_> = ["KM8K2CAB4PU001140", "1HGCM82633A123456", "KM8K2CAB4PU001140"]
        .into_iter()
        .map(|vin| {
            let decoder = decoder.clone();
            tokio::spawn(async move { decoder.decode(vin).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().valid);
    }
}

#[tokio::test]
async fn test_remote_backend() {
    common::init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vpic.lite.db.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(common::gzip(&common::dataset_bytes())))
        .expect(1)
        .mount(&server)
        .await;

    let config = DecoderConfig::default()
        .with_database_path(format!("{}/vpic.lite.db.gz", server.uri()))
        .with_reference_year(2025);
    let decoder = Decoder::open_with_cache(config, &DatasetCache::new()).await.unwrap();

    assert_eq!(decoder.backend(), "remote");
    let result = decoder.decode("KM8K2CAB4PU001140").await.unwrap();
    assert_eq!(result.model(), Some("Kona"));
}

#[tokio::test]
async fn test_edge_runtime_without_binding() {
    let config = DecoderConfig::default().with_runtime(Runtime::Edge);
    let err = Decoder::open_with_cache(config, &DatasetCache::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::BackendUnavailable(_)));
    assert_eq!(err.code(), ErrorCode::BackendUnavailable);
}

#[tokio::test]
async fn test_missing_database_is_infrastructure_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = DecoderConfig::default().with_database_path(dir.path().join("nope.db").display().to_string());
    let err = Decoder::open_with_cache(config, &DatasetCache::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), ErrorCode::DatasetUnavailable);
}

/// Store wrapper that counts dataset queries
struct CountingStore {
    inner: SqliteStore,
    queries: AtomicUsize,
}

#[async_trait]
impl DatasetStore for CountingStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn dataset_info(&self) -> corgi_decoder::Result<DatasetInfo> {
        self.inner.dataset_info().await
    }

    async fn lookup_wmi(&self, vin: &VinSegments) -> corgi_decoder::Result<Option<WmiMatch>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup_wmi(vin).await
    }

    async fn match_patterns(
        &self,
        vin: &VinSegments,
        filter: &ElementFilter,
    ) -> corgi_decoder::Result<Vec<PatternRule>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.match_patterns(vin, filter).await
    }

    async fn close(&self) -> corgi_decoder::Result<()> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_structurally_invalid_vin_issues_no_query() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("vpic.lite.db");
    common::write_dataset(&db);

    let store = Arc::new(CountingStore {
        inner: SqliteStore::open(&db).await.unwrap(),
        queries: AtomicUsize::new(0),
    });
    let decoder = Decoder::from_store(store.clone(), DecoderConfig::default().with_reference_year(2025))
        .await
        .unwrap();

    let short = decoder.decode("ABC").await.unwrap();
    assert!(!short.valid);
    assert!(short.has_error(ErrorCode::InvalidLength));

    // 'I' is never allowed in a VIN
    let bad_char = decoder.decode("1HGCM8I633A123456").await.unwrap();
    assert!(!bad_char.valid);
    assert!(bad_char.has_error(ErrorCode::InvalidCharacters));
    assert_eq!(store.queries.load(Ordering::SeqCst), 0);

    // A well-formed VIN does reach the store
    decoder.decode("1HGCM82633A123456").await.unwrap();
    assert!(store.queries.load(Ordering::SeqCst) > 0);
}

//! Shared fixtures for integration tests

#![allow(dead_code)]

use corgi_decoder::store::SCHEMA;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{params, Connection};
use std::io::Write;
use std::path::Path;

/// (id, wmi, element, pattern, value, priority, year_from)
type FixtureRule = (i64, &'static str, &'static str, &'static str, &'static str, i32, Option<u16>);

const RULES: &[FixtureRule] = &[
    (1, "1HG", "model", "CM8", "Accord", 0, None),
    (2, "1HG", "body_style", "CM8", "Sedan/Saloon", 0, None),
    (3, "1HG", "engine.cylinders", "CM8*6", "4", 0, None),
    (4, "1HG", "plant.city", "*****|*A", "Marysville", 0, None),
    (5, "1HG", "plant.state", "*****|*A", "Ohio", 0, None),
    (10, "KM8", "model", "K", "Tucson", 0, None),
    (11, "KM8", "model", "K2", "Kona", 0, Some(2018)),
    (12, "KM8", "body_style", "K**A", "Sport Utility Vehicle (SUV)/Multi-Purpose Vehicle (MPV)", 0, None),
    (13, "KM8", "drive_type", "K***B", "AWD/All-Wheel Drive", 0, None),
    (14, "KM8", "engine.cylinders", "K*C", "4", 0, None),
    (15, "KM8", "engine.displacement", "K*C", "2.0", 0, None),
    (16, "KM8", "fuel_type", "K", "Gasoline", 0, None),
    (17, "KM8", "wheelbase", "K2", "102.4", 0, None),
    (18, "KM8", "plant.city", "*****|*U", "Ulsan", 0, None),
    (19, "KM8", "plant.country", "*****|*U", "South Korea", 0, None),
    (20, "KM8", "trim", "K2CA", "SEL", 0, None),
    (21, "KM8", "trim", "K2C[A-C]", "Limited", 1, None),
];

/// Write the fixture dataset to `path`
pub fn write_dataset(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(
        "INSERT INTO meta VALUES ('schema_version', '1'), ('vintage', '2025-06');
         INSERT INTO wmi VALUES ('1HG', NULL, 'American Honda Motor Co., Inc.', 'Honda',
                                 'United States', 'North America', 'Passenger Car');
         INSERT INTO wmi VALUES ('KM8', NULL, 'Hyundai Motor Co', 'Hyundai',
                                 'South Korea', 'Asia', 'Multipurpose Passenger Vehicle (MPV)');",
    )
    .unwrap();

    let mut stmt = conn
        .prepare(
            "INSERT INTO pattern_rules (id, wmi, element, pattern, value, priority, year_from)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .unwrap();
    for (id, wmi, element, pattern, value, priority, year_from) in RULES {
        stmt.execute(params![id, wmi, element, pattern, value, priority, year_from])
            .unwrap();
    }
}

/// The fixture dataset as bytes
pub fn dataset_bytes() -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.db");
    write_dataset(&path);
    std::fs::read(&path).unwrap()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Initialize logging once; output shows with `--nocapture`
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

//! Decoding through a host-registered query binding
//!
//! The binding registry is process-wide, so these tests live in their own
//! test binary.

mod common;

use async_trait::async_trait;
use corgi_decoder::store::query::{BindingError, Row};
use corgi_decoder::{
    clear_query_binding, register_query_binding, DatasetCache, Decoder, DecoderConfig, QueryBinding, Runtime,
};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Binding that runs the statements against a SQLite file
struct SqliteBinding {
    conn: Mutex<Connection>,
}

impl SqliteBinding {
    fn open(path: &Path) -> Self {
        Self {
            conn: Mutex::new(Connection::open(path).unwrap()),
        }
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        _ => SqlValue::Null,
    }
}

#[async_trait]
impl QueryBinding for SqliteBinding {
    async fn all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BindingError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter().map(to_sql)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null | ValueRef::Blob(_) => Value::Null,
                    ValueRef::Integer(n) => Value::from(n),
                    ValueRef::Real(f) => Value::from(f),
                    ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
                };
                map.insert(name.clone(), value);
            }
            out.push(map);
        }
        Ok(out)
    }
}

#[tokio::test]
async fn test_decode_through_registered_binding() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("vpic.lite.db");
    common::write_dataset(&db);

    register_query_binding(Arc::new(SqliteBinding::open(&db)));

    let config = DecoderConfig::default()
        .with_runtime(Runtime::Edge)
        .with_reference_year(2025);
    let decoder = Decoder::open_with_cache(config, &DatasetCache::new()).await.unwrap();
    assert_eq!(decoder.backend(), "edge");
    assert_eq!(decoder.dataset_info().vintage.as_deref(), Some("2025-06"));

    let result = decoder.decode("1HGCM82633A123456").await.unwrap();
    assert!(result.valid);
    assert_eq!(result.make(), Some("Honda"));
    assert_eq!(result.model(), Some("Accord"));
    assert_eq!(result.year(), Some(2003));

    decoder.close().await.unwrap();
    clear_query_binding();
}

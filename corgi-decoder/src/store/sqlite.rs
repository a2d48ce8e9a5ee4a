//! Local SQLite dataset

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::patterns::rule::PatternRule;
use crate::store::schema::{self, RuleRow};
use crate::store::{matching_rules, select_wmi, DatasetInfo, DatasetStore, ElementFilter, WmiMatch};
use crate::types::{Error, Result};
use crate::vin::segments::VinSegments;

/// Read-only store over a dataset file on disk
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
    info: DatasetInfo,
}

impl SqliteStore {
    /// Open a dataset file read-only and read its metadata
    ///
    /// Fails with `Error::StoreOpen` for a missing file, a file that is not
    /// SQLite, or a database without the `meta` table.
    pub async fn open(path: &Path) -> Result<Self> {
        let owned = path.to_path_buf();
        let opened = tokio::task::spawn_blocking(move || -> std::result::Result<_, String> {
            if !owned.is_file() {
                return Err("file not found".to_string());
            }
            let conn = Connection::open_with_flags(
                &owned,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| e.to_string())?;
            let info = schema::read_info(&conn).map_err(|e| e.to_string())?;
            Ok((conn, info))
        })
        .await
        .map_err(|e| Error::StoreOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let (conn, info) = opened.map_err(|reason| Error::StoreOpen {
            path: path.display().to_string(),
            reason,
        })?;

        log::debug!(
            "Opened {:?} (schema {:?}, vintage {:?})",
            path,
            info.schema_version,
            info.vintage
        );

        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(Some(conn))),
            info,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a query on the blocking pool
    async fn with_connection<T, F>(&self, query: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::Query("connection lock poisoned".to_string()))?;
            let conn = guard.as_ref().ok_or(Error::Closed)?;
            Ok(query(conn)?)
        })
        .await
        .map_err(|e| Error::Query(e.to_string()))?
    }
}

#[async_trait]
impl DatasetStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn dataset_info(&self) -> Result<DatasetInfo> {
        // Cheap liveness check so a closed store reports Closed
        self.with_connection(|_| Ok(())).await?;
        Ok(self.info.clone())
    }

    async fn lookup_wmi(&self, vin: &VinSegments) -> Result<Option<WmiMatch>> {
        let code = vin.wmi().to_string();
        let records = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare_cached(schema::SELECT_WMI)?;
                let rows = stmt.query_map([&code], schema::wmi_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        Ok(select_wmi(&records, vin))
    }

    async fn match_patterns(&self, vin: &VinSegments, filter: &ElementFilter) -> Result<Vec<PatternRule>> {
        let code = vin.wmi().to_string();
        let rows = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare_cached(schema::SELECT_RULES)?;
                let rows = stmt.query_map([&code], schema::rule_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        let rules = rows.into_iter().filter_map(RuleRow::into_rule);
        Ok(matching_rules(rules, vin, filter))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::Query("connection lock poisoned".to_string()))?;
        if guard.take().is_some() {
            log::debug!("Closed {:?}", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::SCHEMA;

    fn write_fixture(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(
            "INSERT INTO meta VALUES ('schema_version', '1'), ('vintage', '2025-01');
             INSERT INTO wmi VALUES ('1HG', NULL, 'American Honda Motor Co., Inc.', 'Honda', 'United States', 'North America', 'Passenger Car');
             INSERT INTO pattern_rules (id, wmi, element, pattern, value) VALUES (1, '1HG', 'model', 'CM8', 'Accord');
             INSERT INTO pattern_rules (id, wmi, element, pattern, value) VALUES (2, '1HG', 'model', 'CM', 'Accord Coupe');
             INSERT INTO pattern_rules (id, wmi, element, pattern, value) VALUES (3, '1HG', 'model', 'FA1', 'Civic');",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_open_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vpic.lite.db");
        write_fixture(&path);

        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.dataset_info().await.unwrap().vintage.as_deref(), Some("2025-01"));

        let vin = VinSegments::parse("1HGCM82633A123456").unwrap();
        let wmi = store.lookup_wmi(&vin).await.unwrap().unwrap();
        assert_eq!(wmi.record.make, "Honda");

        let rules = store.match_patterns(&vin, &ElementFilter::All).await.unwrap();
        let values: Vec<_> = rules.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["Accord", "Accord Coupe"]);

        store.close().await.unwrap();
        assert!(matches!(store.lookup_wmi(&vin).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_open_failures() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.db");
        assert!(matches!(SqliteStore::open(&missing).await, Err(Error::StoreOpen { .. })));

        let garbage = dir.path().join("garbage.db");
        std::fs::write(&garbage, b"this is not a database file at all, just text").unwrap();
        assert!(matches!(SqliteStore::open(&garbage).await, Err(Error::StoreOpen { .. })));

        let empty = dir.path().join("empty.db");
        Connection::open(&empty).unwrap().execute_batch("CREATE TABLE t (x)").unwrap();
        assert!(matches!(SqliteStore::open(&empty).await, Err(Error::StoreOpen { .. })));
    }
}

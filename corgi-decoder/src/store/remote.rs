//! Remote snapshot store
//!
//! Fetches a dataset snapshot (gzip or plain SQLite) from a URL and loads it
//! into a [`MemoryStore`]; nothing is kept on disk once loading finishes.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use rusqlite::{Connection, OpenFlags};
use std::io::{Read, Write};

use crate::acquire::{download, AcquireOptions};
use crate::patterns::rule::PatternRule;
use crate::store::{schema, DatasetInfo, DatasetStore, ElementFilter, MemoryStore, WmiMatch};
use crate::types::{Error, Result};
use crate::vin::segments::VinSegments;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Dataset fetched from a URL and held in memory
pub struct RemoteStore {
    url: String,
    inner: MemoryStore,
}

impl RemoteStore {
    pub async fn open(url: &str, options: &AcquireOptions) -> Result<Self> {
        let bytes = download::fetch_bytes(options, url).await?;
        let owned_url = url.to_string();
        let inner = tokio::task::spawn_blocking(move || load_snapshot(&owned_url, bytes))
            .await
            .map_err(|e| Error::StoreOpen {
                path: url.to_string(),
                reason: e.to_string(),
            })??;

        let (wmis, rules) = inner.counts();
        log::info!("Loaded remote dataset {} ({} WMI records, {} rules)", url, wmis, rules);
        Ok(Self {
            url: url.to_string(),
            inner,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn load_snapshot(url: &str, bytes: Vec<u8>) -> Result<MemoryStore> {
    let open_error = |reason: String| Error::StoreOpen {
        path: url.to_string(),
        reason,
    };

    let bytes = if bytes.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut out)
            .map_err(|e| open_error(format!("decompression failed: {}", e)))?;
        out
    } else {
        bytes
    };

    // SQLite needs a file to open
    let mut tmp = tempfile::NamedTempFile::new()?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;

    let conn = Connection::open_with_flags(tmp.path(), OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| open_error(e.to_string()))?;
    let info = schema::read_info(&conn).map_err(|e| open_error(e.to_string()))?;
    let (wmis, rules) = schema::load_all(&conn).map_err(|e| open_error(e.to_string()))?;
    drop(conn);

    Ok(MemoryStore::builder().info(info).wmis(wmis).rules(rules).build())
}

#[async_trait]
impl DatasetStore for RemoteStore {
    fn backend(&self) -> &'static str {
        "remote"
    }

    async fn dataset_info(&self) -> Result<DatasetInfo> {
        self.inner.dataset_info().await
    }

    async fn lookup_wmi(&self, vin: &VinSegments) -> Result<Option<WmiMatch>> {
        self.inner.lookup_wmi(vin).await
    }

    async fn match_patterns(&self, vin: &VinSegments, filter: &ElementFilter) -> Result<Vec<PatternRule>> {
        self.inner.match_patterns(vin, filter).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

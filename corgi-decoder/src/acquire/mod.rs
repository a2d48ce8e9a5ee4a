//! Dataset acquisition and cache management
//!
//! Guarantees a complete local dataset file before any store opens it. The
//! source is, in order: an explicit path, the existing cache file, a bundled
//! copy found on disk (plain or gzip), or a download of the compressed
//! release snapshot.
//!
//! Preparation is single-flight per [`DatasetCache`]: concurrent callers share
//! one in-flight future and all observe its outcome. The slot is cleared when
//! the future finishes, so a failed or `force_fresh` preparation can be
//! retried by a later call.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

pub mod download;
pub mod locate;

pub use locate::LocalDataset;

/// Name of the decompressed dataset file
pub const DB_FILE_NAME: &str = "vpic.lite.db";
/// Name of the compressed dataset file
pub const DB_GZ_FILE_NAME: &str = "vpic.lite.db.gz";
/// Release asset fetched when no local dataset exists
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://github.com/cardog-ai/corgi/releases/latest/download/vpic.lite.db.gz";
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub const ENV_DB_URL: &str = "CORGI_DB_URL";
pub const ENV_DATABASE_URL: &str = "CORGI_DATABASE_URL";
pub const ENV_DISABLE_DOWNLOAD: &str = "CORGI_DISABLE_DB_DOWNLOAD";
pub const ENV_CACHE_DIR: &str = "CORGI_CACHE_DIR";

/// Acquisition failures
///
/// Clonable so every waiter on a shared preparation receives the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    #[error("No local dataset found and download is disabled; supply an explicit database path")]
    DownloadDisabled,

    #[error("No cache directory available; set CORGI_CACHE_DIR or supply an explicit database path")]
    NoCacheDir,

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Download of {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Download of {url} exceeded {max} redirects")]
    RedirectLimit { url: String, max: usize },

    #[error("Failed to decompress {from}: {reason}")]
    Decompress { from: String, reason: String },

    #[error("IO error at {path}: {reason}")]
    Io { path: String, reason: String },
}

impl AcquireError {
    pub(crate) fn io(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        AcquireError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Where and how to obtain the dataset
#[derive(Debug, Clone, PartialEq)]
pub struct AcquireOptions {
    /// Returned as-is, without checking that it exists
    pub explicit_path: Option<PathBuf>,
    /// Ignore the existing cache file and prepare a new one
    pub force_fresh: bool,
    /// Directory holding the cache file; defaults to `<user cache dir>/corgi`
    pub cache_dir: Option<PathBuf>,
    /// Searched before the default locations
    pub search_paths: Vec<PathBuf>,
    pub include_default_search_paths: bool,
    pub download_url: String,
    pub disable_download: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            explicit_path: None,
            force_fresh: false,
            cache_dir: None,
            search_paths: Vec::new(),
            include_default_search_paths: true,
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            disable_download: false,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl AcquireOptions {
    /// Defaults with the `CORGI_*` environment overrides applied
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides read through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_DB_URL).or_else(|| non_empty(ENV_DATABASE_URL)) {
            options.download_url = url.trim().to_string();
        }
        if let Some(flag) = non_empty(ENV_DISABLE_DOWNLOAD) {
            options.disable_download = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(dir) = non_empty(ENV_CACHE_DIR) {
            options.cache_dir = Some(PathBuf::from(dir));
        }
        options
    }

    /// Builder method: set the cache directory
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Builder method: add a search location ahead of the defaults
    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Builder method: set the download URL
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }

    /// Location of the prepared dataset file
    pub fn cache_path(&self) -> Result<PathBuf, AcquireError> {
        let dir = self
            .cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("corgi")))
            .ok_or(AcquireError::NoCacheDir)?;
        Ok(dir.join(DB_FILE_NAME))
    }

    /// Directories searched for a bundled dataset, in priority order
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.search_paths.clone();
        if self.include_default_search_paths {
            dirs.extend(locate::default_search_dirs());
        }
        dirs
    }
}

type PrepareFuture = Shared<BoxFuture<'static, Result<PathBuf, AcquireError>>>;

#[derive(Default)]
struct CacheState {
    /// Prepared dataset, once a preparation succeeded
    path: Option<PathBuf>,
    in_flight: Option<PrepareFuture>,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide dataset preparation state
#[derive(Clone, Default)]
pub struct DatasetCache {
    state: Arc<Mutex<CacheState>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared instance used by decoders that are not given their own
    pub fn global() -> &'static DatasetCache {
        static GLOBAL: OnceLock<DatasetCache> = OnceLock::new();
        GLOBAL.get_or_init(DatasetCache::new)
    }

    /// Path of the last successful preparation
    pub fn cached_path(&self) -> Option<PathBuf> {
        lock(&self.state).path.clone()
    }

    /// Forget the prepared path; an in-flight preparation is left running
    pub fn invalidate(&self) {
        lock(&self.state).path = None;
    }

    pub fn is_preparing(&self) -> bool {
        lock(&self.state).in_flight.is_some()
    }

    /// Return a path to a ready local dataset, preparing one if needed
    pub async fn ensure(&self, options: &AcquireOptions) -> Result<PathBuf, AcquireError> {
        if let Some(path) = &options.explicit_path {
            return Ok(path.clone());
        }

        let preparation = {
            let mut state = lock(&self.state);
            if !options.force_fresh {
                if let Some(path) = state.path.as_ref().filter(|p| p.is_file()) {
                    return Ok(path.clone());
                }
            }
            match &state.in_flight {
                Some(shared) => {
                    log::debug!("Joining in-flight dataset preparation");
                    shared.clone()
                }
                None => {
                    if options.force_fresh {
                        state.path = None;
                    }
                    let shared = run_preparation(Arc::clone(&self.state), options.clone())
                        .boxed()
                        .shared();
                    state.in_flight = Some(shared.clone());
                    shared
                }
            }
        };

        preparation.await
    }
}

async fn run_preparation(state: Arc<Mutex<CacheState>>, options: AcquireOptions) -> Result<PathBuf, AcquireError> {
    let outcome = prepare(&options).await;

    let mut state = lock(&state);
    state.in_flight = None;
    match &outcome {
        Ok(path) => state.path = Some(path.clone()),
        Err(e) => log::warn!("Dataset preparation failed: {}", e),
    }
    outcome
}

async fn prepare(options: &AcquireOptions) -> Result<PathBuf, AcquireError> {
    let target = options.cache_path()?;

    if !options.force_fresh && target.is_file() {
        log::info!("Using cached dataset {:?}", target);
        return Ok(target);
    }

    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(|e| AcquireError::io(dir, e))?;
    }

    if let Some(found) = locate::find_local(&options.search_dirs(), &target) {
        log::info!("Preparing dataset from local copy {:?}", found.path());
        let install_target = target.clone();
        tokio::task::spawn_blocking(move || locate::install(&found, &install_target))
            .await
            .map_err(|e| AcquireError::io(&target, e))??;
        return Ok(target);
    }

    if options.disable_download {
        return Err(AcquireError::DownloadDisabled);
    }

    log::info!("No local dataset found, downloading {}", options.download_url);
    download::fetch_snapshot(options, &target).await?;
    Ok(target)
}

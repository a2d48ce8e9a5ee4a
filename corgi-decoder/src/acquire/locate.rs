//! Bundled dataset discovery

use flate2::read::GzDecoder;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{AcquireError, DB_FILE_NAME, DB_GZ_FILE_NAME};

/// A dataset file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalDataset {
    Plain(PathBuf),
    Compressed(PathBuf),
}

impl LocalDataset {
    pub fn path(&self) -> &Path {
        match self {
            LocalDataset::Plain(path) | LocalDataset::Compressed(path) => path,
        }
    }
}

/// Development tree, install tree, then current directory
pub fn default_search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    dirs.push(manifest_dir.join("..").join("db"));
    dirs.push(manifest_dir.join("..").join("..").join("db"));

    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        dirs.push(exe_dir.join("..").join("share").join("corgi"));
        dirs.push(exe_dir);
    }

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join("db"));
        dirs.push(cwd);
    }

    dirs
}

/// First plain file in any directory, else the first compressed one
///
/// `exclude` is the cache target, which must never be its own source.
pub fn find_local(dirs: &[PathBuf], exclude: &Path) -> Option<LocalDataset> {
    let plain = dirs
        .iter()
        .map(|d| d.join(DB_FILE_NAME))
        .find(|p| p.is_file() && !same_file(p, exclude))
        .map(LocalDataset::Plain);
    if plain.is_some() {
        return plain;
    }

    dirs.iter()
        .map(|d| d.join(DB_GZ_FILE_NAME))
        .find(|p| p.is_file())
        .map(LocalDataset::Compressed)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy or decompress a found dataset into `target`
pub fn install(found: &LocalDataset, target: &Path) -> Result<(), AcquireError> {
    match found {
        LocalDataset::Plain(path) => copy_into(path, target),
        LocalDataset::Compressed(path) => decompress_into(path, target),
    }
}

fn temp_beside(target: &Path) -> Result<NamedTempFile, AcquireError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(dir).map_err(|e| AcquireError::io(dir, e))
}

fn promote(tmp: NamedTempFile, target: &Path) -> Result<(), AcquireError> {
    tmp.persist(target)
        .map(|_| ())
        .map_err(|e| AcquireError::io(target, e.error))
}

fn copy_into(source: &Path, target: &Path) -> Result<(), AcquireError> {
    let mut tmp = temp_beside(target)?;
    let mut input = File::open(source).map_err(|e| AcquireError::io(source, e))?;
    io::copy(&mut input, tmp.as_file_mut()).map_err(|e| AcquireError::io(tmp.path(), e))?;
    promote(tmp, target)?;
    log::debug!("Copied {:?} to {:?}", source, target);
    Ok(())
}

/// Stream a gzip file through decompression into `target`
///
/// Nothing is left at `target` unless the whole stream decoded.
pub fn decompress_into(source: &Path, target: &Path) -> Result<(), AcquireError> {
    let mut tmp = temp_beside(target)?;
    let input = File::open(source).map_err(|e| AcquireError::io(source, e))?;
    let mut decoder = GzDecoder::new(io::BufReader::new(input));
    io::copy(&mut decoder, tmp.as_file_mut()).map_err(|e| AcquireError::Decompress {
        from: source.display().to_string(),
        reason: e.to_string(),
    })?;
    promote(tmp, target)?;
    log::debug!("Decompressed {:?} to {:?}", source, target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_plain_candidates_win_over_compressed() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join(DB_GZ_FILE_NAME), gzip(b"compressed")).unwrap();
        std::fs::write(second.path().join(DB_FILE_NAME), b"plain").unwrap();

        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = find_local(&dirs, Path::new("/nonexistent/cache.db")).unwrap();
        assert_eq!(found, LocalDataset::Plain(second.path().join(DB_FILE_NAME)));
    }

    #[test]
    fn test_cache_target_is_not_a_source() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(DB_FILE_NAME);
        std::fs::write(&target, b"cached").unwrap();
        assert!(find_local(&[dir.path().to_path_buf()], &target).is_none());
    }

    #[test]
    fn test_install_compressed() {
        let src = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let gz = src.path().join(DB_GZ_FILE_NAME);
        std::fs::write(&gz, gzip(b"dataset bytes")).unwrap();

        let target = cache.path().join(DB_FILE_NAME);
        install(&LocalDataset::Compressed(gz), &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"dataset bytes");
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_archive_leaves_nothing_behind() {
        let src = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let gz = src.path().join(DB_GZ_FILE_NAME);
        std::fs::write(&gz, b"not gzip at all").unwrap();

        let target = cache.path().join(DB_FILE_NAME);
        let err = decompress_into(&gz, &target).unwrap_err();
        assert!(matches!(err, AcquireError::Decompress { .. }));
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }
}

//! Snapshot download
//!
//! Redirects are followed by hand with the client's own policy disabled, so
//! the hop limit holds regardless of the HTTP stack.

use reqwest::header::LOCATION;
use reqwest::{Client, Response, Url};
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::{locate, AcquireError, AcquireOptions, DB_FILE_NAME};

pub const USER_AGENT: &str = concat!("corgi/", env!("CARGO_PKG_VERSION"));

fn download_error(url: &str, err: impl std::fmt::Display) -> AcquireError {
    AcquireError::Download {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

pub(crate) fn http_client(options: &AcquireOptions) -> Result<Client, AcquireError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(options.timeout)
        .connect_timeout(options.connect_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| download_error(&options.download_url, e))
}

/// GET `url`, following at most `max_redirects` redirects
///
/// Returns the first non-redirect response with a success status.
pub(crate) async fn fetch_following_redirects(
    client: &Client,
    url: &str,
    max_redirects: usize,
) -> Result<Response, AcquireError> {
    let mut current = Url::parse(url).map_err(|e| download_error(url, e))?;
    let mut hops = 0;

    loop {
        let response = client
            .get(current.clone())
            .send()
            .await
            .map_err(|e| download_error(url, e))?;
        let status = response.status();

        if status.is_redirection() {
            if hops >= max_redirects {
                return Err(AcquireError::RedirectLimit {
                    url: url.to_string(),
                    max: max_redirects,
                });
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| download_error(url, format!("HTTP {} without a Location header", status.as_u16())))?;
            let next = current.join(location).map_err(|e| download_error(url, e))?;
            hops += 1;
            log::debug!("Redirect {}/{}: {} -> {}", hops, max_redirects, current, next);
            current = next;
            continue;
        }

        if !status.is_success() {
            return Err(AcquireError::HttpStatus {
                url: current.to_string(),
                status: status.as_u16(),
            });
        }
        return Ok(response);
    }
}

/// Download the compressed snapshot and decompress it into `target`
///
/// The compressed bytes land in a sibling temporary `.gz` file that is
/// removed whether or not decompression succeeds.
pub async fn fetch_snapshot(options: &AcquireOptions, target: &Path) -> Result<(), AcquireError> {
    let url = options.download_url.as_str();
    let client = http_client(options)?;
    let mut response = fetch_following_redirects(&client, url, options.max_redirects).await?;

    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let compressed = tempfile::Builder::new()
        .prefix(DB_FILE_NAME)
        .suffix(".gz")
        .tempfile_in(dir)
        .map_err(|e| AcquireError::io(dir, e))?;

    let handle = compressed
        .reopen()
        .map_err(|e| AcquireError::io(compressed.path(), e))?;
    let mut file = tokio::fs::File::from_std(handle);
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await.map_err(|e| download_error(url, e))? {
        file.write_all(&chunk)
            .await
            .map_err(|e| AcquireError::io(compressed.path(), e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| AcquireError::io(compressed.path(), e))?;
    drop(file);
    log::info!("Downloaded {} bytes from {}", written, url);

    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || decompress_download(compressed, &target))
        .await
        .map_err(|e| download_error(url, e))?
}

fn decompress_download(compressed: NamedTempFile, target: &Path) -> Result<(), AcquireError> {
    let outcome = locate::decompress_into(compressed.path(), target);
    if let Err(e) = compressed.close() {
        log::warn!("Failed to remove temporary download: {}", e);
    }
    outcome
}

/// Fetch a URL's body into memory
pub(crate) async fn fetch_bytes(options: &AcquireOptions, url: &str) -> Result<Vec<u8>, AcquireError> {
    let client = http_client(options)?;
    let response = fetch_following_redirects(&client, url, options.max_redirects).await?;
    let body = response.bytes().await.map_err(|e| download_error(url, e))?;
    log::info!("Fetched {} bytes from {}", body.len(), url);
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_relative_redirect_is_resolved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/assets/db.gz"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/assets/db.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let options = AcquireOptions::default();
        let bytes = fetch_bytes(&options, &format!("{}/latest", server.uri())).await.unwrap();
        assert_eq!(bytes, b"payload");
    }

    #[tokio::test]
    async fn test_redirect_without_location_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(301))
            .mount(&server)
            .await;

        let err = fetch_bytes(&AcquireOptions::default(), &server.uri()).await.unwrap_err();
        assert!(matches!(err, AcquireError::Download { .. }));
    }

    #[tokio::test]
    async fn test_status_error_names_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let url = format!("{}/db.gz", server.uri());
        let err = fetch_bytes(&AcquireOptions::default(), &url).await.unwrap_err();
        assert_eq!(err, AcquireError::HttpStatus { url, status: 503 });
    }
}

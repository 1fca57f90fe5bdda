#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input data downloads.
//!
//! - [`hdx`]: search for HDX CSV resources by country
//! - [`nominatim`]: administrative boundaries by free-text query
//! - [`overpass`]: facility points of interest inside a bounding box, by
//!   category or custom query
//! - [`population`]: HDX high-resolution population CSVs (plain or zipped)
//! - [`tables`]: local facility CSVs
//!
//! All HTTP goes through [`http_client`] so requests carry a descriptive
//! user agent, which the public OSM services require.

pub mod hdx;
pub mod nominatim;
pub mod overpass;
pub mod population;
pub mod tables;

use std::path::Path;

use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;

/// Errors from download and parse operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// A provider response or file did not have the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the problem.
        message: String,
    },

    /// CSV decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error reading or writing a local file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Zip archive error.
    #[error("Archive error: {message}")]
    Archive {
        /// Description of the problem.
        message: String,
    },

    /// A boundary search had no polygonal result at the requested position.
    #[error("No boundary at position {position} for '{query}' ({available} polygonal results)")]
    NoCandidate {
        /// The search query.
        query: String,
        /// Requested result position.
        position: usize,
        /// Number of polygonal results returned.
        available: usize,
    },
}

/// Builds the shared HTTP client.
///
/// # Errors
///
/// Returns [`DownloadError::Http`] if the client cannot be built.
pub fn http_client() -> Result<reqwest::Client, DownloadError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("urban-access/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Sends a GET request with query parameters and parses a JSON body.
///
/// # Errors
///
/// Returns [`DownloadError`] if the request fails, the status is not
/// successful, or the body is not JSON.
pub async fn get_json(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<serde_json::Value, DownloadError> {
    log::debug!("GET {url}");
    let response = client.get(url).query(query).send().await?;

    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| DownloadError::Parse {
        message: format!("invalid JSON from {url}: {e}"),
    })
}

/// Downloads a file from a URL to a local path with progress logging.
///
/// Uses streaming to avoid loading the entire file into memory.
///
/// # Errors
///
/// Returns an error if the HTTP request fails, the response is not
/// successful, or the local file cannot be written.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, DownloadError> {
    log::info!("Downloading {url}");
    log::info!("  -> {}", dest.display());

    let io_error = |path: &Path, source: std::io::Error| DownloadError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let total_size = response.content_length();
    if let Some(size) = total_size {
        #[allow(clippy::cast_precision_loss)]
        let mb = size as f64 / 1_048_576.0;
        log::info!("  file size: {mb:.1} MB");
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| io_error(dest, e))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_log_step: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| io_error(dest, e))?;
        downloaded += chunk.len() as u64;

        // Log every 25 MB
        let step = downloaded / (25 * 1_048_576);
        if step > last_log_step {
            last_log_step = step;
            #[allow(clippy::cast_precision_loss)]
            let mb = downloaded as f64 / 1_048_576.0;
            if let Some(total) = total_size {
                #[allow(clippy::cast_precision_loss)]
                let pct = (downloaded as f64 / total as f64) * 100.0;
                log::info!("  downloaded {mb:.0} MB ({pct:.0}%)");
            } else {
                log::info!("  downloaded {mb:.0} MB");
            }
        }
    }

    file.flush().await.map_err(|e| io_error(dest, e))?;

    #[allow(clippy::cast_precision_loss)]
    let mb = downloaded as f64 / 1_048_576.0;
    log::info!("  download complete: {mb:.1} MB");

    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_candidate_message_names_query() {
        let err = DownloadError::NoCandidate {
            query: "Lima, Peru".to_string(),
            position: 2,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "No boundary at position 2 for 'Lima, Peru' (1 polygonal results)"
        );
    }

    #[tokio::test]
    async fn download_to_unreachable_host_is_http_error() {
        let client = http_client().unwrap();
        let dest = std::env::temp_dir().join("urban-access-download-test.bin");
        let result = download_file(&client, "http://127.0.0.1:9/file.csv", &dest).await;
        assert!(matches!(result, Err(DownloadError::Http(_))));
    }
}

//! Streaming archive download.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use tempfile::NamedTempFile;

use crate::error::{Result, UpdateError};
use crate::steps::{ProgressSink, USER_AGENT_VALUE};

const CHUNK_SIZE: usize = 64 * 1024;

/// Download `url` into a temp file inside `dir`.
///
/// Supports `http`, `https` and `file` URLs. The returned file is deleted
/// when dropped.
pub fn download_to(
    client: &Client,
    url: &str,
    dir: &Path,
    progress: &dyn ProgressSink,
) -> Result<NamedTempFile> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| UpdateError::Network(format!("invalid artifact url '{url}': {e}")))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".updraft-download-")
        .suffix(".zip")
        .tempfile_in(dir)
        .map_err(|e| UpdateError::io("create temp file in", dir, e))?;

    tracing::info!("Downloading {parsed}");
    let written = match parsed.scheme() {
        "http" | "https" => {
            let response = client
                .get(parsed.clone())
                .header(USER_AGENT, USER_AGENT_VALUE)
                .send()?;

            let status = response.status();
            if !status.is_success() {
                return Err(UpdateError::HttpStatus {
                    url: parsed.to_string(),
                    status: status.as_u16(),
                });
            }

            let total = response.content_length();
            copy_with_progress(response, &mut temp, total, progress, |e| {
                UpdateError::Network(format!("download interrupted: {e}"))
            })?
        }
        "file" => {
            let source = parsed.to_file_path().map_err(|()| {
                UpdateError::Network(format!("file url '{parsed}' has no local path"))
            })?;
            let file = File::open(&source).map_err(|e| UpdateError::io("open", &source, e))?;
            let total = file.metadata().ok().map(|m| m.len());
            copy_with_progress(file, &mut temp, total, progress, |e| {
                UpdateError::io("read", source.clone(), e)
            })?
        }
        other => {
            return Err(UpdateError::Network(format!(
                "unsupported url scheme '{other}'"
            )));
        }
    };

    tracing::info!("Download complete: {}", format_bytes(written));
    Ok(temp)
}

fn copy_with_progress<R: Read>(
    mut reader: R,
    temp: &mut NamedTempFile,
    total: Option<u64>,
    progress: &dyn ProgressSink,
    read_error: impl Fn(io::Error) -> UpdateError,
) -> Result<u64> {
    let temp_path = temp.path().to_path_buf();
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut written = 0_u64;

    progress.start(total);
    let outcome = loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break Ok(written),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(read_error(e)),
        };
        if let Err(e) = temp.write_all(&buffer[..read]) {
            break Err(UpdateError::io("write", &temp_path, e));
        }
        written += read as u64;
        progress.advance(read as u64);
    };
    progress.finish();

    let written = outcome?;
    temp.flush()
        .map_err(|e| UpdateError::io("flush", &temp_path, e))?;
    Ok(written)
}

/// Format bytes as a human-readable string.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

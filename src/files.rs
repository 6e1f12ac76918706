//! File plumbing around the transform: reading inputs, naming and writing
//! outputs.
//!
//! Inputs may be a local path or an HTTP(S) URL. Either way the whole
//! document ends up in memory: the transform works on byte buffers, so no
//! temporary copy is needed.
//!
//! Outputs are written atomically (temp file in the destination directory,
//! then rename) so a crash never leaves a truncated PDF behind.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Failures reading an input or writing an output.
#[derive(Debug, Error)]
pub enum FileError {
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An input document loaded into memory.
#[derive(Debug)]
pub struct InputDocument {
    /// Base file name (from the path or the URL), used to name the output.
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local path or download a URL into memory.
pub async fn read_input(input: &str, timeout_secs: u64) -> Result<InputDocument, FileError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<InputDocument, FileError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => FileError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => FileError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(InputDocument {
        file_name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        bytes,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<InputDocument, FileError> {
    info!("Downloading PDF from: {}", url);

    let download_failed = |reason: String| FileError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            FileError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            download_failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(download_failed(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_failed(e.to_string()))?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(InputDocument {
        file_name: file_name_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// Last path segment of `url`, if it looks like a file name.
fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

/// Name of the flattened copy of `original`.
///
/// Everything after the last `.pdf` is dropped and `.flattened.pdf` appended:
/// `report.pdf` → `report.flattened.pdf`, `scan` → `scan.flattened.pdf`.
/// Without a usable name the result is `document.flattened.pdf`.
pub fn flattened_file_name(original: Option<&str>) -> String {
    let name = original
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("document.pdf");
    let stem = match name.rfind(".pdf") {
        Some(pos) => &name[..pos],
        None => name,
    };
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{stem}.flattened.pdf")
}

/// Default output path for an input: same directory, flattened file name.
pub fn default_output_path(input: &str, file_name: Option<&str>) -> PathBuf {
    let name = flattened_file_name(file_name);
    if is_url(input) {
        return PathBuf::from(name);
    }
    match Path::new(input).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => PathBuf::from(name),
    }
}

/// Write `bytes` to `path` atomically.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), FileError> {
    use std::io::Write;

    let write_failed = |source: std::io::Error| FileError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_failed)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_failed)?;
    tmp.write_all(bytes).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn flattened_names() {
        assert_eq!(flattened_file_name(Some("report.pdf")), "report.flattened.pdf");
        assert_eq!(flattened_file_name(Some("scan")), "scan.flattened.pdf");
        assert_eq!(flattened_file_name(Some("a.pdf.bak")), "a.flattened.pdf");
        assert_eq!(flattened_file_name(Some("REPORT.PDF")), "REPORT.PDF.flattened.pdf");
        assert_eq!(flattened_file_name(Some(".pdf")), "document.flattened.pdf");
        assert_eq!(flattened_file_name(Some("  ")), "document.flattened.pdf");
        assert_eq!(flattened_file_name(None), "document.flattened.pdf");
    }

    #[test]
    fn url_file_names() {
        assert_eq!(
            file_name_from_url("https://example.com/files/invoice.pdf"),
            Some("invoice.pdf".to_string())
        );
        assert_eq!(file_name_from_url("https://example.com/download/"), None);
        assert_eq!(file_name_from_url("not a url"), None);
    }

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output_path("/data/in/form.pdf", Some("form.pdf")),
            PathBuf::from("/data/in/form.flattened.pdf")
        );
        assert_eq!(
            default_output_path("form.pdf", Some("form.pdf")),
            PathBuf::from("form.flattened.pdf")
        );
        assert_eq!(
            default_output_path("https://example.com/x/form.pdf", Some("form.pdf")),
            PathBuf::from("form.flattened.pdf")
        );
    }

    #[test]
    fn write_output_is_complete_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.pdf");

        write_output(&path, b"%PDF-first").unwrap();
        write_output(&path, b"%PDF-second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-second");
        // No temp files left behind.
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = read_input("/definitely/not/a/real/file.pdf", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_is_read_with_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let doc = read_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(doc.bytes, b"%PDF-1.7");
        assert_eq!(doc.file_name.as_deref(), Some("in.pdf"));
    }
}

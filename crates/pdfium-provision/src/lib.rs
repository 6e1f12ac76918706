//! # pdfium-provision
//!
//! Finds the pdfium shared library that `pdf-flatten` renders with, and
//! fetches it when it is missing.
//!
//! Resolution order, first match wins:
//!
//! 1. An explicit library path ([`Provisioner::with_library`], or the
//!    `PDFIUM_LIB_PATH` environment variable via [`Provisioner::from_env`]).
//! 2. A previously downloaded copy in the cache directory,
//!    `{cache_root}/pdfium-{release}/`.
//! 3. A fresh download of the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    from which only the library file is extracted.
//!
//! Extraction writes to a temporary name and renames into place, so two
//! processes starting at once never observe a half-written library.
//!
//! ```rust,no_run
//! let library = pdfium_provision::ensure_library(None)?;
//! let pdfium = pdfium_provision::bind(&library)?;
//! # Ok::<(), pdfium_provision::ProvisionError>(())
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;
use tracing::{debug, info, warn};

/// pdfium-binaries release tag (`chromium/<tag>`) this crate downloads.
pub const PDFIUM_RELEASE: &str = "7690";

const RELEASE_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Environment variable naming an existing pdfium library.
pub const LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "PDFIUM_CACHE_DIR";

/// Download progress hook: `(bytes_so_far, total_if_known)`.
pub type DownloadProgress<'a> = &'a dyn Fn(u64, Option<u64>);

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("No pdfium build is published for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Explicit pdfium library '{0}' does not exist")]
    MissingLibrary(PathBuf),

    #[error("Cache directory '{path}': {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Downloading pdfium failed: {0}")]
    Download(String),

    #[error("Extracting pdfium failed: {0}")]
    Extract(String),

    #[error("Loading pdfium from '{path}' failed: {reason}")]
    Bind { path: PathBuf, reason: String },
}

/// The platforms pdfium-binaries publishes builds for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacArm64,
    MacX64,
    LinuxX64,
    LinuxArm64,
    WindowsX64,
    WindowsArm64,
    WindowsX86,
}

impl Platform {
    pub fn current() -> Result<Self, ProvisionError> {
        Self::from_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn from_target(os: &str, arch: &str) -> Result<Self, ProvisionError> {
        let platform = match (os, arch) {
            ("macos", "aarch64") => Platform::MacArm64,
            ("macos", "x86_64") => Platform::MacX64,
            ("linux", "x86_64") => Platform::LinuxX64,
            ("linux", "aarch64") => Platform::LinuxArm64,
            ("windows", "x86_64") => Platform::WindowsX64,
            ("windows", "aarch64") => Platform::WindowsArm64,
            ("windows", "x86") => Platform::WindowsX86,
            _ => {
                return Err(ProvisionError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };
        Ok(platform)
    }

    /// Release asset name, e.g. `pdfium-linux-x64.tgz`.
    pub fn archive_name(self) -> &'static str {
        match self {
            Platform::MacArm64 => "pdfium-mac-arm64.tgz",
            Platform::MacX64 => "pdfium-mac-x64.tgz",
            Platform::LinuxX64 => "pdfium-linux-x64.tgz",
            Platform::LinuxArm64 => "pdfium-linux-arm64.tgz",
            Platform::WindowsX64 => "pdfium-win-x64.tgz",
            Platform::WindowsArm64 => "pdfium-win-arm64.tgz",
            Platform::WindowsX86 => "pdfium-win-x86.tgz",
        }
    }

    /// File name of the shared library on this platform.
    pub fn library_name(self) -> &'static str {
        match self {
            Platform::MacArm64 | Platform::MacX64 => "libpdfium.dylib",
            Platform::LinuxX64 | Platform::LinuxArm64 => "libpdfium.so",
            Platform::WindowsX64 | Platform::WindowsArm64 | Platform::WindowsX86 => "pdfium.dll",
        }
    }

    /// Path of the library inside the release archive.
    fn archive_member(self) -> String {
        match self {
            Platform::WindowsX64 | Platform::WindowsArm64 | Platform::WindowsX86 => {
                format!("bin/{}", self.library_name())
            }
            _ => format!("lib/{}", self.library_name()),
        }
    }
}

/// Resolves the pdfium library for one cache location.
#[derive(Debug, Clone)]
pub struct Provisioner {
    explicit: Option<PathBuf>,
    cache_root: PathBuf,
    release: String,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self {
            explicit: None,
            cache_root: default_cache_root(),
            release: PDFIUM_RELEASE.to_string(),
        }
    }
}

impl Provisioner {
    /// Default locations, overridden by `PDFIUM_LIB_PATH` / `PDFIUM_CACHE_DIR`.
    pub fn from_env() -> Self {
        let mut provisioner = Self::default();
        if let Some(path) = std::env::var_os(LIB_PATH_ENV).filter(|p| !p.is_empty()) {
            provisioner.explicit = Some(PathBuf::from(path));
        }
        if let Some(root) = std::env::var_os(CACHE_DIR_ENV).filter(|p| !p.is_empty()) {
            provisioner.cache_root = PathBuf::from(root);
        }
        provisioner
    }

    /// Always use the library at `path`; never download.
    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    /// Directory holding the downloaded library for the pinned release.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_root.join(format!("pdfium-{}", self.release))
    }

    /// The library path, if it is available without downloading.
    pub fn cached_library(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.explicit {
            return path.exists().then(|| path.clone());
        }
        let platform = Platform::current().ok()?;
        let path = self.cache_dir().join(platform.library_name());
        path.exists().then_some(path)
    }

    /// Return the library path, downloading the library if needed.
    ///
    /// An explicit path that does not exist is an error rather than a reason
    /// to download.
    pub fn ensure(&self, progress: Option<DownloadProgress<'_>>) -> Result<PathBuf, ProvisionError> {
        if let Some(ref path) = self.explicit {
            if path.exists() {
                debug!("Using pdfium from {}", path.display());
                return Ok(path.clone());
            }
            return Err(ProvisionError::MissingLibrary(path.clone()));
        }

        let platform = Platform::current()?;
        let dir = self.cache_dir();
        let library = dir.join(platform.library_name());
        if library.exists() {
            debug!("Using cached pdfium at {}", library.display());
            return Ok(library);
        }

        std::fs::create_dir_all(&dir).map_err(|source| ProvisionError::Cache {
            path: dir.clone(),
            source,
        })?;

        let url = format!(
            "{RELEASE_BASE_URL}/chromium%2F{}/{}",
            self.release,
            platform.archive_name()
        );
        info!("Downloading pdfium {} from {}", self.release, url);
        let archive = download(&url, progress)?;
        extract_member(&archive, &platform.archive_member(), &library)?;
        info!("pdfium installed at {}", library.display());

        Ok(library)
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("pdf-flatten")
}

static RESOLVED: OnceLock<PathBuf> = OnceLock::new();

/// Resolve the library once per process using [`Provisioner::from_env`].
pub fn ensure_library(progress: Option<DownloadProgress<'_>>) -> Result<PathBuf, ProvisionError> {
    if let Some(path) = RESOLVED.get() {
        return Ok(path.clone());
    }
    let path = Provisioner::from_env().ensure(progress)?;
    Ok(RESOLVED.get_or_init(|| path).clone())
}

/// True when [`ensure_library`] will not need the network.
pub fn is_cached() -> bool {
    RESOLVED.get().is_some() || Provisioner::from_env().cached_library().is_some()
}

/// Load the pdfium library at `path`.
pub fn bind(path: &Path) -> Result<Pdfium, ProvisionError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| ProvisionError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// [`ensure_library`] followed by [`bind`], without progress output.
pub fn bind_default() -> Result<Pdfium, ProvisionError> {
    let path = ensure_library(None)?;
    bind(&path)
}

fn download(url: &str, progress: Option<DownloadProgress<'_>>) -> Result<Vec<u8>, ProvisionError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-provision/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| ProvisionError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| ProvisionError::Download(format!("GET {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(ProvisionError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut archive = Vec::with_capacity(total.unwrap_or(32 << 20) as usize);
    let mut chunk = vec![0u8; 64 << 10];
    loop {
        let n = match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProvisionError::Download(format!("reading body: {e}"))),
        };
        archive.extend_from_slice(&chunk[..n]);
        if let Some(report) = progress {
            report(archive.len() as u64, total);
        }
    }

    debug!("Downloaded {} bytes", archive.len());
    Ok(archive)
}

/// Copy the single archive entry `member` out of a `.tgz` into `dest`.
fn extract_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), ProvisionError> {
    let extract = |e: std::io::Error| ProvisionError::Extract(e.to_string());

    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(archive));
    for entry in tar.entries().map_err(extract)? {
        let mut entry = entry.map_err(extract)?;
        if entry.path().map_err(extract)?.to_string_lossy() != member {
            continue;
        }

        let partial = dest.with_extension(format!("partial-{}", std::process::id()));
        entry.unpack(&partial).map_err(extract)?;
        if let Err(e) = std::fs::rename(&partial, dest) {
            let _ = std::fs::remove_file(&partial);
            if dest.exists() {
                warn!("Another process installed pdfium first; using its copy");
                return Ok(());
            }
            return Err(extract(e));
        }
        return Ok(());
    }

    Err(ProvisionError::Extract(format!(
        "'{member}' not found in archive"
    )))
}

// # Source Descriptors
//
// Classifies the `--source` argument into one of the three supported kinds and
// checks that local files exist before any decode graph is built.
//
// | Input | Kind |
// |-------|------|
// | `rtsp://…`, `rtsps://…` | `RtspUrl` |
// | `0`, `1`, … | `CameraDevice(Index)` → `/dev/videoN` |
// | `/dev/…` | `CameraDevice(Path)` |
// | `file:///path`, any other path | `LocalFile` (must exist and be readable) |

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{FeedError, FeedResult};

/// A capture device given either by V4L2 index or by device node path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraDevice {
    Index(u32),
    Path(PathBuf),
}

impl CameraDevice {
    /// Device node backing this camera.
    pub fn device_path(&self) -> PathBuf {
        match self {
            CameraDevice::Index(index) => PathBuf::from(format!("/dev/video{index}")),
            CameraDevice::Path(path) => path.clone(),
        }
    }
}

/// Where frames come from. Immutable once a session has been created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// An absolute path to a readable media file.
    LocalFile(PathBuf),
    RtspUrl(String),
    CameraDevice(CameraDevice),
}

impl SourceDescriptor {
    /// Classify a raw source string and resolve it.
    ///
    /// # Errors
    ///
    /// `FeedError::SourceUnavailable` for an empty string, an RTSP URL without
    /// a host, or a local path that does not name a readable file.
    pub fn parse(raw: &str) -> FeedResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FeedError::source_unavailable(raw, "source is empty")
                .with_recovery_suggestion("pass a file path, an rtsp:// URL or a camera index"));
        }

        for scheme in ["rtsp", "rtsps"] {
            if let Some(rest) = strip_scheme(raw, scheme) {
                if rest.is_empty() || rest.starts_with('/') {
                    return Err(FeedError::source_unavailable(raw, "RTSP URL has no host"));
                }
                return Ok(SourceDescriptor::RtspUrl(format!("{scheme}://{rest}")));
            }
        }

        if raw.bytes().all(|b| b.is_ascii_digit()) {
            let index = raw.parse::<u32>().map_err(|e| {
                FeedError::source_unavailable(raw, format!("invalid camera index: {e}"))
            })?;
            return Ok(SourceDescriptor::CameraDevice(CameraDevice::Index(index)));
        }

        if raw.starts_with("/dev/") {
            return Ok(SourceDescriptor::CameraDevice(CameraDevice::Path(
                PathBuf::from(raw),
            )));
        }

        let path = strip_scheme(raw, "file").unwrap_or(raw);
        Self::local_file(path)
    }

    /// A local file source, resolved to an absolute path.
    pub fn local_file(path: impl AsRef<Path>) -> FeedResult<Self> {
        let path = path.as_ref();
        let resolved = resolve_readable_file(path)?;
        Ok(SourceDescriptor::LocalFile(resolved))
    }

    /// Re-check that the source can still be opened.
    ///
    /// Only local files can be verified up front; network and device sources
    /// are validated by the engine when the graph starts.
    pub fn resolve(&self) -> FeedResult<()> {
        match self {
            SourceDescriptor::LocalFile(path) => resolve_readable_file(path).map(|_| ()),
            SourceDescriptor::RtspUrl(_) | SourceDescriptor::CameraDevice(_) => Ok(()),
        }
    }

    /// Short name of the descriptor kind, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::LocalFile(_) => "file",
            SourceDescriptor::RtspUrl(_) => "rtsp",
            SourceDescriptor::CameraDevice(_) => "camera",
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::LocalFile(path) => write!(f, "file {}", path.display()),
            SourceDescriptor::RtspUrl(url) => write!(f, "rtsp {url}"),
            SourceDescriptor::CameraDevice(device) => {
                write!(f, "camera {}", device.device_path().display())
            }
        }
    }
}

fn resolve_readable_file(path: &Path) -> FeedResult<PathBuf> {
    let shown = path.display().to_string();
    let metadata = std::fs::metadata(path)
        .map_err(|e| FeedError::source_unavailable(&shown, e.to_string()))?;
    if !metadata.is_file() {
        return Err(FeedError::source_unavailable(&shown, "not a regular file"));
    }
    File::open(path).map_err(|e| FeedError::source_unavailable(&shown, e.to_string()))?;
    std::fs::canonicalize(path).map_err(|e| FeedError::source_unavailable(&shown, e.to_string()))
}

/// Strip `scheme://` from the front of `raw`, matching the scheme without
/// regard to case.
fn strip_scheme<'a>(raw: &'a str, scheme: &str) -> Option<&'a str> {
    let rest = raw.get(scheme.len()..)?.strip_prefix("://")?;
    raw[..scheme.len()]
        .eq_ignore_ascii_case(scheme)
        .then_some(rest)
}

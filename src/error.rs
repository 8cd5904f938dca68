//! # Error Handling
//!
//! Error types for the video feed pipeline, carrying enough context to decide
//! how far a failure is allowed to propagate.
//!
//! ## Propagation Policy
//!
//! | Error | Raised by | Scope |
//! |-------|-----------|-------|
//! | `SourceUnavailable` | source resolution | fatal, aborts startup |
//! | `GraphConstruction` | engine factory | fatal, aborts startup |
//! | `Decode` | engine at runtime | session-fatal: session becomes `Errored` |
//! | `Encode` | frame encoder | frame-local: frame dropped, slot untouched |
//! | `State` | controller | reported, no transition |
//! | `Config` / `Io` / `Server` | glue | startup or process level |
//!
//! End-of-stream is not an error; it is delivered as an engine event.
//!
//! ## Usage
//!
//! ```rust
//! use video_feed::error::{FeedError, classify};
//!
//! let error = FeedError::source_unavailable("/videos/missing.mp4", "no such file")
//!     .with_operation("create session")
//!     .with_recovery_suggestion("check the --source path");
//!
//! assert_eq!(error.category(), "source_unavailable");
//! assert!(classify::is_startup_fatal(&error));
//! ```

use std::{error::Error as StdError, fmt};

use crate::processing::encoder::EncodeError;

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// A single unit of work was lost (e.g. one frame)
    Warning,
    /// The current session cannot continue
    Error,
    /// The process cannot start or continue
    Fatal,
}

/// Metadata about where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    /// Additional context about the error
    pub context: Option<String>,
    /// Suggested recovery action
    pub recovery_suggestion: Option<String>,
    /// Error severity level
    pub severity: ErrorSeverity,
}

impl ErrorContext {
    /// Create an empty context at the given severity
    pub fn new(severity: ErrorSeverity) -> Self {
        Self {
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity,
        }
    }
}

/// Base error type for the video feed pipeline
#[derive(Debug)]
pub enum FeedError {
    /// The source descriptor cannot be resolved (missing file, bad URL, ...)
    SourceUnavailable {
        source: String,
        reason: String,
        context: ErrorContext,
    },
    /// The decode graph for a source kind cannot be built
    GraphConstruction {
        kind: String,
        reason: String,
        context: ErrorContext,
    },
    /// The engine reported a failure while decoding
    Decode {
        code: i32,
        message: String,
        debug: Option<String>,
        context: ErrorContext,
    },
    /// A single frame could not be encoded
    Encode {
        source: EncodeError,
        context: ErrorContext,
    },
    /// An operation is not valid in the current lifecycle state
    State {
        current_state: String,
        attempted_operation: String,
        context: ErrorContext,
    },
    /// Configuration validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// HTTP server errors
    Server {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
}

impl FeedError {
    /// Create a source resolution error
    pub fn source_unavailable(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source: source.into(),
            reason: reason.into(),
            context: ErrorContext::new(ErrorSeverity::Fatal),
        }
    }

    /// Create a graph construction error
    pub fn graph_construction(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GraphConstruction {
            kind: kind.into(),
            reason: reason.into(),
            context: ErrorContext::new(ErrorSeverity::Fatal),
        }
    }

    /// Create a runtime decode error
    pub fn decode(code: i32, message: impl Into<String>, debug: Option<String>) -> Self {
        Self::Decode {
            code,
            message: message.into(),
            debug,
            context: ErrorContext::new(ErrorSeverity::Error),
        }
    }

    /// Create a state error
    pub fn state(current_state: impl Into<String>, attempted_operation: impl Into<String>) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            context: ErrorContext::new(ErrorSeverity::Warning),
        }
    }

    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(ErrorSeverity::Fatal),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
            context: ErrorContext::new(ErrorSeverity::Error),
        }
    }

    /// Create an HTTP server error
    pub fn server(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Server {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(ErrorSeverity::Fatal),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Add recovery suggestion
    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::SourceUnavailable { context, .. } => context,
            Self::GraphConstruction { context, .. } => context,
            Self::Decode { context, .. } => context,
            Self::Encode { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Config { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::Server { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::SourceUnavailable { context, .. } => context,
            Self::GraphConstruction { context, .. } => context,
            Self::Decode { context, .. } => context,
            Self::Encode { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Config { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::Server { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::GraphConstruction { .. } => "graph_construction",
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::State { .. } => "state",
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
            Self::Server { .. } => "server",
        }
    }

    /// Severity recorded in the context
    pub fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }

    /// Recovery suggestion, if one was attached
    pub fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::SourceUnavailable { source, reason, .. } => {
                write!(f, "Source '{}' is unavailable: {}", source, reason)
            }
            FeedError::GraphConstruction { kind, reason, .. } => {
                write!(f, "Cannot build decode graph for {} source: {}", kind, reason)
            }
            FeedError::Decode {
                code,
                message,
                debug,
                ..
            } => {
                if let Some(debug) = debug {
                    write!(f, "Decode error (code {}): {} ({})", code, message, debug)
                } else {
                    write!(f, "Decode error (code {}): {}", code, message)
                }
            }
            FeedError::Encode { source, .. } => write!(f, "Frame encoding failed: {}", source),
            FeedError::State {
                current_state,
                attempted_operation,
                ..
            } => {
                write!(
                    f,
                    "Cannot {} while the session is {}",
                    attempted_operation, current_state
                )
            }
            FeedError::Config {
                field,
                value,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Configuration error in '{}': {} (value: {})",
                    field, reason, value
                )
            }
            FeedError::Io {
                operation, source, ..
            } => write!(f, "I/O error during {}: {}", operation, source),
            FeedError::Server {
                operation, reason, ..
            } => write!(f, "HTTP server error during {}: {}", operation, reason),
        }
    }
}

impl StdError for FeedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Encode { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type FeedResult<T> = Result<T, FeedError>;

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Errors that must abort startup before the HTTP surface is reachable
    pub fn is_startup_fatal(error: &FeedError) -> bool {
        matches!(
            error,
            FeedError::SourceUnavailable { .. }
                | FeedError::GraphConstruction { .. }
                | FeedError::Config { .. }
        ) || error.severity() == ErrorSeverity::Fatal
    }

    /// Errors that end the current session but leave the server running
    pub fn is_session_fatal(error: &FeedError) -> bool {
        matches!(error, FeedError::Decode { .. })
    }

    /// Errors confined to a single frame
    pub fn is_frame_local(error: &FeedError) -> bool {
        matches!(error, FeedError::Encode { .. })
    }
}

impl From<std::io::Error> for FeedError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<EncodeError> for FeedError {
    fn from(error: EncodeError) -> Self {
        Self::Encode {
            source: error,
            context: ErrorContext::new(ErrorSeverity::Warning),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_is_startup_fatal() {
        let error = FeedError::source_unavailable("clip.mp4", "no such file");
        assert_eq!(error.category(), "source_unavailable");
        assert!(classify::is_startup_fatal(&error));
        assert!(!classify::is_session_fatal(&error));
        assert_eq!(
            error.to_string(),
            "Source 'clip.mp4' is unavailable: no such file"
        );
    }

    #[test]
    fn test_decode_is_session_fatal_only() {
        let error = FeedError::decode(3, "Could not read from resource.", Some("gstv4l2src.c".into()));
        assert!(classify::is_session_fatal(&error));
        assert!(!classify::is_startup_fatal(&error));
        assert_eq!(error.severity(), ErrorSeverity::Error);
        assert!(error.to_string().contains("code 3"));
    }

    #[test]
    fn test_encode_is_frame_local() {
        let error = FeedError::from(EncodeError::InvalidDimensions {
            width: 0,
            height: 10,
        });
        assert!(classify::is_frame_local(&error));
        assert_eq!(error.severity(), ErrorSeverity::Warning);
        assert!(error.source().is_some());
    }

    #[test]
    fn test_error_with_context() {
        let error = FeedError::graph_construction("rtsp", "no element \"avdec_h264\"")
            .with_operation("create session")
            .with_context("rtsp://camera/stream")
            .with_recovery_suggestion("install gst-libav");

        assert_eq!(error.context().operation.as_deref(), Some("create session"));
        assert_eq!(error.context().context.as_deref(), Some("rtsp://camera/stream"));
        assert_eq!(error.recovery_suggestion(), Some("install gst-libav"));
    }
}

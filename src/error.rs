//! Error types shared across the playback controller.
//!
//! [`Fault`] is the classified failure taxonomy the recovery controller works
//! with. The remaining types cover the edges of the crate: invalid input to
//! `attach`, playlist parsing, surface operations and the catalog client.

use std::fmt;

use thiserror::Error;

/// Classified playback fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Manifest or segment fetch failed.
    #[error("network fault: {0}")]
    Network(String),

    /// Decode or pipeline failure.
    #[error("media fault: {0}")]
    Media(String),

    /// Neither native nor managed playback is available on the surface.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Retry budget exhausted or the fault is not recoverable.
    #[error("terminal fault: {0}")]
    Terminal(String),
}

impl Fault {
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Network(_) => FaultKind::Network,
            Self::Media(_) => FaultKind::Media,
            Self::Unsupported(_) => FaultKind::Unsupported,
            Self::Terminal(_) => FaultKind::Terminal,
        }
    }

    /// Human-readable detail without the kind prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Network(d) | Self::Media(d) | Self::Unsupported(d) | Self::Terminal(d) => d,
        }
    }

    /// Only network and media faults are ever retried.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Media(_))
    }
}

/// Fault kind without detail, kept as `last_fault` for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Network,
    Media,
    Unsupported,
    Terminal,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Media => "media",
            Self::Unsupported => "unsupported",
            Self::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// Rejected `attach` input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    #[error("stream URL is empty")]
    EmptyUrl,

    #[error("invalid stream URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme: {0} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("playback surface is no longer mounted")]
    SurfaceGone,
}

/// HLS playlist parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("not an HLS playlist (missing #EXTM3U header)")]
    MissingHeader,

    #[error("master playlist lists no playable variants")]
    NoVariants,

    #[error("media playlist contains no segments")]
    NoSegments,

    #[error("cannot resolve playlist URI {uri:?}: {reason}")]
    BadUri { uri: String, reason: String },
}

/// The surface refused a segment or failed to rebuild its decode pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("append failed: {0}")]
pub struct AppendError(pub String);

/// Autoplay was blocked (typically a user-gesture policy). Not a fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("playback start rejected: {0}")]
pub struct PlayRejected(pub String);

/// Catalog collaborator errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unauthorized: sign in again")]
    Unauthorized,

    #[error("video not found: {0}")]
    NotFound(String),

    #[error("video {0} has no stream yet (still processing?)")]
    NoStream(String),

    #[error("unexpected catalog response: HTTP {0}")]
    Status(u16),

    #[error("invalid catalog URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Stream(#[from] AttachError),
}

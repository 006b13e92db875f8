//! Error types shared by the export pipeline.
//!
//! Library code returns [`ExportError`] (or [`RenderError`] from the document
//! layer); only the binary converts these into `anyhow` errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// A relationship the export cannot do without is absent from a node.
    #[error("node {node_id} has no '{relation}' relationship link")]
    MissingRelation { node_id: String, relation: String },

    #[error("'{0}' is not a valid OSF project URL or id")]
    MalformedUrl(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ExportError {
    /// True for failures of the HTTP exchange itself (no response, or a
    /// non-success status), as opposed to bad data or local problems.
    pub fn is_transport(&self) -> bool {
        matches!(self, ExportError::Transport { .. } | ExportError::Status { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExportError::Status { status, .. } => Some(*status),
            ExportError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not encode QR code: {0}")]
    Qr(String),

    #[error("could not decode image: {0}")]
    Image(String),

    #[error("could not assemble PDF: {0}")]
    Pdf(String),

    #[error("root index {index} is out of range for {len} records")]
    RootOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

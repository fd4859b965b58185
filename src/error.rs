//! Error types for Lens Relay.

/// Top-level error type for the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Configuration-related errors. Fatal at startup only.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Ledger and credential store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Outbound HTTP collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{gateway} request failed: {reason}")]
    Transport { gateway: &'static str, reason: String },

    #[error("{gateway} returned status {status}")]
    Status {
        gateway: &'static str,
        status: u16,
        body: String,
    },

    #[error("{gateway} rejected the call: {error}")]
    Api { gateway: &'static str, error: String },
}

/// Image-processing failures, one variant per failure domain.
///
/// Rendered into reply text at the pipeline boundary, never propagated
/// past it.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("attachment has no downloadable URL")]
    MissingDownloadUrl,

    #[error("image download failed with status {status}")]
    Download { status: u16 },

    #[error("image download failed: {reason}")]
    DownloadTransport { reason: String },

    #[error("inference call failed with status {status}")]
    Inference { status: u16, body: String },

    #[error("inference call failed: {reason}")]
    InferenceTransport { reason: String },

    #[error("inference result was not valid JSON: {0}")]
    Parse(String),
}

/// Worker-pool admission errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("processing queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("processing queue is closed")]
    Closed,
}

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, Error>;

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced at the batch service boundary.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to the batch API: {0}")]
    Request(reqwest::Error),
    #[error("Failed to deserialize batch API response: {0}")]
    Deserialization(reqwest::Error),
    #[error("Batch API returned an error: {0}")]
    Api(String),
    #[error("Failed to read attachment '{path}': {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("API key is missing")]
    MissingApiKey,
}

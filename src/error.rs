use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::ImageId;

#[derive(Debug, Error, Diagnostic)]
pub enum VgError {
    #[error("invalid image id: {0}")]
    InvalidImageId(String),

    #[error("dataset API unavailable: {0}")]
    SourceUnavailable(String),

    #[error("dataset API returned status {status}: {message}")]
    ApiStatus { status: u16, message: String },

    #[error("failed to fetch record for image {id}: {cause}")]
    RecordFetch { id: ImageId, cause: String },

    #[error("image {0} is not present in the local index")]
    #[diagnostic(help("the cached bundle has no region descriptions for this id"))]
    MissingRecord(ImageId),

    #[error("failed to build cache resource {resource}: {cause}")]
    CacheBuild { resource: String, cause: String },

    #[error("sources disagree on {field} for image {id}: remote={remote} local={local}")]
    Mismatch {
        id: ImageId,
        field: String,
        remote: String,
        local: String,
    },

    #[error("failed to decode dataset JSON: {0}")]
    Decode(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("could not probe duration of {}: {reason}", path.to_string_lossy())]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("{field} {value} is outside the valid range [1, {max}]")]
    InvalidRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("frame extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("failed to materialize frame {frame}: {reason}")]
    MaterializeFrameFailed { frame: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

use hf_hub::api::tokio::ApiError;
use parquet::errors::ParquetError;
use parquet2::error::Error as Parquet2Error;
use reqwest::{header::ToStrError, Error as ReqwestError};
use std::num::{ParseIntError, TryFromIntError};
use thiserror::Error;

/// Error type for datasets
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The name is not registered in the catalog, or its files cannot be found.
    #[error("dataset {name:?} is unavailable: {reason}")]
    DatasetUnavailable {
        /// The requested name
        name: String,
        /// Why it could not be resolved
        reason: String,
    },

    /// The request pins a version the catalog does not provide.
    #[error("dataset {name:?} has version {available}, requested {requested}")]
    IncompatibleVersion {
        /// The requested name
        name: String,
        /// The requested version pattern
        requested: String,
        /// The version registered in the catalog
        available: String,
    },

    /// A version string is not of the `x.y.z` form.
    #[error("invalid version {0:?}")]
    InvalidVersion(String),

    /// The dataset exists but has no such split.
    #[error("dataset {name:?} has no split {split:?} (available: {available:?})")]
    UnknownSplit {
        /// The requested name
        name: String,
        /// The requested split
        split: String,
        /// The splits the dataset has
        available: Vec<String>,
    },

    /// The parquet footer lacks the columns the dataset needs.
    #[error("schema mismatch in {file}: {reason}")]
    SchemaMismatch {
        /// The file being validated
        file: String,
        /// The missing or mistyped column
        reason: String,
    },

    /// A record could not be decoded into the declared features.
    #[error("corrupted record {index} in split {split:?}: {reason}")]
    Corrupted {
        /// The split being read
        split: String,
        /// Row index within the split
        index: usize,
        /// What was wrong with it
        reason: String,
    },

    /// The error comes from api usage.
    #[error("api: {0}")]
    ApiError(#[from] ApiError),

    /// We expected the magic number in the parquet file but didn't see it.
    #[error("Invalid parquet magic number")]
    InvalidParquetMagic,

    /// The footer length does not fit in the file.
    #[error("parquet footer of {footer_len} bytes does not fit in a {size} bytes file")]
    InvalidParquetFooter {
        /// Length announced by the footer
        footer_len: usize,
        /// Size of the whole file
        size: usize,
    },

    /// parquet error while reading local files
    #[error("ParquetError: {0}")]
    ParquetError(#[from] ParquetError),

    /// parquet error while decoding a remote footer
    #[error("Parquet2Error: {0}")]
    Parquet2Error(#[from] Parquet2Error),

    /// The image bytes could not be decoded
    #[error("ImageError: {0}")]
    ImageError(#[from] image::ImageError),

    /// The decoded data does not fit the declared shape
    #[error("ShapeError: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    /// IO Error
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    /// The header value is not valid utf-8
    #[error("header value is not a string")]
    ToStr(#[from] ToStrError),

    /// Error in the request
    #[error("request error: {0}")]
    RequestError(#[from] ReqwestError),

    /// Error parsing some range value
    #[error("Cannot parse int: {0}")]
    ParseIntError(#[from] ParseIntError),

    /// Error converting some ints
    #[error("Cannot convert int: {0}")]
    TryFromIntError(#[from] TryFromIntError),
}

/// The two kinds of failure a load can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The dataset cannot be resolved, fetched or read.
    DatasetUnavailable,
    /// The requested and available versions do not agree.
    IncompatibleVersion,
}

impl DatasetError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatasetError::IncompatibleVersion { .. } | DatasetError::InvalidVersion(_) => {
                ErrorKind::IncompatibleVersion
            }
            _ => ErrorKind::DatasetUnavailable,
        }
    }

    pub(crate) fn unavailable(name: &str, reason: impl Into<String>) -> Self {
        DatasetError::DatasetUnavailable {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

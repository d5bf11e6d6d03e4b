//! Error types for the conversion pipeline.
//!
//! Serving never produces these: cache loading reports `std::io::Error` and
//! HTTP handlers map failures straight to status codes.

use std::path::PathBuf;

pub type ConvertResult<T> = Result<T, ConvertError>;

#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    /// The source file could not be opened or its header parsed.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A frame in the middle of an animation could not be decoded.
    #[error("frame {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    /// Writing a JPEG frame failed.
    #[error("cannot encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// True when the failure happened before any frame could be read.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

//! Error types for image decoding and namespace walking
//!
//! Decoding errors are structural: any of them means the image is corrupt or
//! was written in a format this crate does not understand, and the caller is
//! expected to abort. Walk errors cover the consumer side of the path channel.

use thiserror::Error;

/// Failure to decode a single variable-length integer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// Buffer ended before a terminating byte
    #[error("buffer too small for a complete varint")]
    Truncated,

    /// More than 64 bits of payload
    #[error("varint overflows 64 bits")]
    Overflow,
}

/// Errors raised while locating sections and building the indices
#[derive(Error, Debug)]
pub enum ImageError {
    /// I/O errors opening or mapping the image
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A byte range falls outside the image
    #[error("read of {length} bytes at offset {offset} extends past end of image ({image_len} bytes)")]
    OutOfBounds {
        offset: u64,
        length: u64,
        image_len: u64,
    },

    /// The trailer does not describe a usable summary block
    #[error("invalid trailer: summary length {summary_len} does not fit in an image of {image_len} bytes")]
    InvalidTrailer { summary_len: i64, image_len: u64 },

    /// A varint failed to decode inside a framed stream
    #[error("bad varint at offset {offset}: {source}")]
    Varint {
        offset: usize,
        #[source]
        source: VarintError,
    },

    /// A record claims more bytes than remain in its region
    #[error("record at offset {offset} declares {declared} bytes but only {available} remain")]
    RecordOverrun {
        offset: usize,
        declared: u64,
        available: usize,
    },

    /// A record payload could not be decoded as the expected message
    #[error("malformed {message} record: {reason}")]
    Decode {
        message: &'static str,
        reason: String,
    },

    /// A section required by the index builders is absent from the summary
    #[error("required section '{0}' missing from image summary")]
    MissingSection(String),

    /// Section bytes are compressed
    #[error("image sections are compressed with codec '{0}', which is not supported")]
    UnsupportedCodec(String),

    /// The inode stream ended before the header-declared count
    #[error("INODE section declares {declared} inodes but only {found} records are present")]
    InodeCountMismatch { declared: u64, found: u64 },

    /// The same inode id appears twice in the inode stream
    #[error("inode {0} appears more than once in the INODE section")]
    DuplicateInode(u64),

    /// The same parent id appears twice in the directory stream
    #[error("directory entry for parent {0} appears more than once in the INODE_DIR section")]
    DuplicateParent(u64),
}

impl ImageError {
    pub(crate) fn decode(message: &'static str, reason: impl Into<String>) -> Self {
        ImageError::Decode {
            message,
            reason: reason.into(),
        }
    }
}

/// Errors raised by the tree walker
#[derive(Error, Debug)]
pub enum WalkError {
    /// The path sink rejected a path; the walk was cancelled
    #[error("failed to write path: {0}")]
    Sink(#[source] std::io::Error),

    /// A worker thread panicked
    #[error("walk worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Result type for image decoding
pub type Result<T> = std::result::Result<T, ImageError>;

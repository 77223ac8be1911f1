use std::error::Error;
use std::fmt;

/// Library-wide result alias.
pub type Result<T> = std::result::Result<T, SketchError>;

#[derive(Debug)]
pub enum SketchError {
    /// Malformed annotation records, unreadable inputs, impossible queries.
    Input(String),
    /// A query against an index that never saw any records.
    EmptyIndex,
    /// A sequence-region identifier the index does not know.
    UnknownSeqid(String),
    /// A coordinate range with start > end, supplied by a caller.
    InvalidRange(u64, u64),
    /// A style rule that is missing or unusable for a requested build step.
    Style(String),
    /// Failures while producing or writing the output image.
    Render(String),
    Io(std::io::Error),
    Serde(serde_json::Error),
}

impl Error for SketchError {}

impl fmt::Display for SketchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SketchError::Input(msg) => write!(f, "{msg}"),
            SketchError::EmptyIndex => {
                write!(
                    f,
                    "feature index is empty (input did not contain any annotation records)"
                )
            }
            SketchError::UnknownSeqid(seqid) => {
                write!(f, "sequence region '{seqid}' does not exist in input")
            }
            SketchError::InvalidRange(start, end) => {
                write!(f, "invalid range: start {start} is after end {end}")
            }
            SketchError::Style(msg) => write!(f, "style error: {msg}"),
            SketchError::Render(msg) => write!(f, "render error: {msg}"),
            SketchError::Io(err) => write!(f, "{err}"),
            SketchError::Serde(err) => write!(f, "{err}"),
        }
    }
}

impl From<std::io::Error> for SketchError {
    fn from(err: std::io::Error) -> Self {
        SketchError::Io(err)
    }
}

impl From<serde_json::Error> for SketchError {
    fn from(err: serde_json::Error) -> Self {
        SketchError::Serde(err)
    }
}

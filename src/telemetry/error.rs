#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// Reasons an inbound frame could not be turned into a [`Message`](super::Message).
#[non_exhaustive]
#[derive(Debug)]
pub enum DecodeError {
    /// The frame is not valid JSON
    Syntax(serde_json::Error),
    /// The frame is not an object with a string `type` field
    MissingKind,
    /// The `type` is known but the remaining fields do not match it
    InvalidFields {
        /// The message kind that was being decoded
        kind: String,
        /// JSON path of the offending field (`.` for the envelope itself)
        path: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(e) => write!(f, "frame is not valid JSON: {e}"),
            Self::MissingKind => write!(f, "frame has no string `type` discriminator"),
            Self::InvalidFields { kind, path, source } => {
                write!(f, "invalid `{kind}` message at `{path}`: {source}")
            }
        }
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Syntax(e) | Self::InvalidFields { source: e, .. } => Some(e),
            Self::MissingKind => None,
        }
    }
}

impl From<DecodeError> for crate::error::Error {
    fn from(e: DecodeError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Decode, e)
    }
}

//! # Core Error Types
//!
//! Validation failures are deliberately quiet: a malformed action or an
//! out-of-range index drops that item and nothing else. Integrity failures
//! (CSV verification) are loud and user-visible.

use thiserror::Error;

/// Errors parsing an action tag from the wire.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionParseError {
    /// The tag named an action this system does not know.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The action requires a payload and none was given.
    #[error("action {0} is missing its payload")]
    MissingPayload(&'static str),

    /// The payload was present but not a number of the expected shape.
    #[error("malformed payload for action {action}: {payload}")]
    MalformedPayload {
        /// The action tag.
        action: &'static str,
        /// The offending payload text.
        payload: String,
    },

    /// The speed payload parsed but is not one of 0.5, 1, 2, 4.
    #[error("invalid speed multiplier: {0}")]
    InvalidSpeed(f64),
}

/// Errors verifying an exported CSV file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CsvVerifyError {
    /// The file does not end with a checksum line.
    #[error("no checksum found, file may be corrupted")]
    NoChecksum,

    /// The checksum line is present but unreadable.
    #[error("malformed checksum line: {0}")]
    MalformedChecksum(String),

    /// The recorded checksum does not match the file content.
    #[error("checksum mismatch: file lists {recorded}, computed {computed}; tampered or corrupted")]
    ChecksumMismatch {
        /// Checksum recorded in the file.
        recorded: u32,
        /// Checksum recomputed from the content.
        computed: u32,
    },
}

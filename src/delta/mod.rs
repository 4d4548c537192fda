//! delta
//!
//! The svndiff0 binary content-delta codec.
//!
//! # Format
//!
//! A delta stream is the 4-byte header `SVN\0` followed by zero or more
//! windows. Each window describes how to build one contiguous chunk of the
//! target text from three sources: a view of the source text, the part of
//! the target window built so far, and literal new data.
//!
//! ```text
//! window := sview_offset sview_len tview_len instr_len newdata_len
//!           instructions[instr_len] newdata[newdata_len]
//! instruction := (opcode << 6 | len) [len] [offset]
//! ```
//!
//! All integers are big-endian base-128 varints with the high bit marking
//! continuation. An inline length of zero means the length follows as a
//! varint. `New` instructions carry no offset; their data is consumed from
//! the new-data buffer in order.
//!
//! # Modules
//!
//! - [`window`] - Instructions, windows, and window application
//! - [`svndiff`] - Wire encoding and decoding
//! - [`stream`] - Whole-content sender with running MD5, simple delta generation
//!
//! # Example
//!
//! ```
//! use svnbridge::delta::{apply_windows, decode_delta, encode_delta, send_stream};
//!
//! let mut windows = Vec::new();
//! let md5 = send_stream::<_, svnbridge::delta::DeltaError>(&b"hello"[..], |w| {
//!     if let Some(w) = w {
//!         windows.push(w.clone());
//!     }
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(md5, "5d41402abc4b2a76b9719d911017c592");
//!
//! let bytes = encode_delta(&windows);
//! let decoded = decode_delta(&bytes).unwrap();
//! assert_eq!(apply_windows(b"", &decoded).unwrap(), b"hello");
//! ```

pub mod stream;
pub mod svndiff;
pub mod window;

pub use stream::{delta_windows, md5_hex, send_stream, DELTA_WINDOW_SIZE};
pub use svndiff::{
    decode_delta, decode_varint, encode_delta, encode_varint, pack_window, unpack_window,
    SVNDIFF0_HEADER,
};
pub use window::{apply_window, apply_windows, Instruction, TxDeltaApplier, Window, MAX_VIEW_LEN};

use thiserror::Error;

/// Errors from decoding or applying deltas.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeltaError {
    #[error("delta does not start with the svndiff0 header")]
    BadMagic,

    #[error("delta truncated while reading {what}")]
    Truncated { what: &'static str },

    #[error("variable-length integer exceeds 64 bits")]
    VarintOverflow,

    #[error("invalid delta opcode {opcode}")]
    BadOpcode { opcode: u8 },

    #[error("window produced {actual} bytes, expected {expected}")]
    TargetLengthMismatch { expected: usize, actual: usize },

    #[error("instruction out of range: {reason}")]
    ViewOutOfRange { reason: String },

    #[error("window received after end of delta stream")]
    StreamClosed,

    #[error("failed to read delta source: {0}")]
    Io(String),
}

impl From<std::io::Error> for DeltaError {
    fn from(err: std::io::Error) -> Self {
        DeltaError::Io(err.to_string())
    }
}

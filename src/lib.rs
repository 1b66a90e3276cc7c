#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    //unstable_features,
    //unused_imports,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! A crate for decoding captured vehicle diagnostic payloads into readable reports
//!
//! Given a line copied out of a CAN bus log (or a set of lines for a segmented capture), the
//! decoder works out which protocol layers are present, unwraps them, and explains the
//! diagnostic message they carry.
//!
//! ## Supported layers
//!
//! ### CAN
//! A 4 byte `00 00 XX XX` header prefix, where `XXXX` is an 11 bit identifier in one of the
//! configured diagnostic ID ranges (See [options::DecoderOptions]).
//!
//! ### ISO-TP (ISO15765-2)
//! Classic CAN single frames, and first frame + consecutive frame captures supplied one frame
//! per line. Flow control frames interleaved in a capture are skipped.
//!
//! ### Unified diagnostic services (UDS)
//! ISO14229 - Requests, positive responses and negative responses. Service names, sub-functions,
//! negative response codes, standard data identifiers, routines and DTCs are resolved
//! from built in dictionaries.
//!
//! ## Unknown values
//! Values that are not in the dictionaries are always reported as unknown, never guessed.
//! Every report carries a [report::Confidence] saying how much of the message was resolved.
//!
//! ## Example
//! ```
//! use diag_decoder::{decode, report::Confidence};
//!
//! let report = decode("7F 22 31").unwrap();
//! assert_eq!(report.confidence, Confidence::Exact);
//! println!("{report}");
//! ```

pub mod bytes;
pub mod decoder;
pub mod dtc;
pub mod isotp;
pub mod layers;
pub mod options;
pub mod report;
pub mod selftest;
pub mod uds;

pub use bytes::{ByteSequence, InputFormat, ParseError, parse, to_hex_string};
pub use decoder::Decoder;
pub use isotp::{ReassemblyError, reassemble};
pub use layers::{LayerPlan, detect_layers};
pub use options::DecoderOptions;
pub use report::{Confidence, DecodedReport, format};
pub use selftest::{TestResult, run_self_tests};
pub use uds::{Direction, UdsMessage, decode_uds};

/// Decoder result
pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
/// Error produced when a capture cannot be decoded
pub enum DecodeError {
    /// The input text could not be converted into bytes
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// The ISO-TP frames could not be reassembled
    #[error("reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),
}

/// Decodes a single captured line with the default options
pub fn decode(raw: &str) -> DecodeResult<DecodedReport> {
    Decoder::default().decode(raw)
}

/// Decodes a capture segmented into one line per frame, with the default options
pub fn decode_frames<S: AsRef<str>>(lines: &[S]) -> DecodeResult<DecodedReport> {
    Decoder::default().decode_frames(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn public_types_are_send_sync() {
        assert_send_sync::<Decoder>();
        assert_send_sync::<DecodedReport>();
        assert_send_sync::<DecodeError>();
        assert_send_sync::<UdsMessage>();
    }

    #[test]
    fn errors_convert() {
        let err: DecodeError = ParseError::Empty.into();
        assert_eq!(err.to_string(), "parse error: input is empty");
        let err: DecodeError = ReassemblyError::NoFrames.into();
        assert!(matches!(err, DecodeError::Reassembly(_)));
    }
}

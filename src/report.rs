//! Decoded report and its deterministic text rendering
//!
//! The rendered report always has the same section order:
//! 1. Detected layers
//! 2. Field breakdown (per layer)
//! 3. Interpretation
//! 4. Raw hex (one line per captured frame)
//! 5. Length

use std::fmt::Write as _;

use crate::{
    bytes::{ByteSequence, InputFormat},
    isotp::IsoTpSummary,
    layers::{CanHeader, DetectedLayers},
    uds::{UdsMessage, format_extra_data},
};

/// How much of a decoded message could be resolved from the built in dictionaries
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Confidence {
    /// Every interpreted field was resolved
    Exact,
    /// The service was resolved, but at least one field was not
    Partial,
    /// The message could not be interpreted
    Unknown,
}

/// Protocol layer of a report
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Layer {
    /// CAN header
    #[strum(serialize = "CAN")]
    Can,
    /// ISO-TP transport framing
    #[strum(serialize = "ISO-TP")]
    IsoTp,
    /// UDS application payload
    #[strum(serialize = "UDS")]
    Uds,
}

/// A single named value of a decoded layer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Field {
    /// Field name
    pub name: String,
    /// Rendered value
    pub value: String,
    /// False if the value was not found in the dictionaries
    pub resolved: bool,
}

impl Field {
    /// Creates a resolved field
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_resolution(name, value, true)
    }

    /// Creates a field whose value is unknown
    pub fn unresolved(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_resolution(name, value, false)
    }

    /// Creates a field
    pub fn with_resolution(name: impl Into<String>, value: impl Into<String>, resolved: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            resolved,
        }
    }
}

/// Description of one decoded layer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayerDescription {
    /// The layer
    pub layer: Layer,
    /// One line summary
    pub summary: String,
    /// Field breakdown
    pub fields: Vec<Field>,
}

/// The result of decoding a capture
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodedReport {
    /// Format the input text was recognised as
    pub input_format: InputFormat,
    /// Layers found by the detection heuristics
    pub detected: DetectedLayers,
    /// Decoded layers, outermost first
    pub layers: Vec<LayerDescription>,
    /// Overall confidence
    pub confidence: Confidence,
    /// One paragraph explanation
    pub interpretation: String,
    /// Additional observations (Padding, orphaned frames...)
    pub notes: Vec<String>,
    /// Captured frames as parsed
    pub frames: Vec<ByteSequence>,
    /// CAN header of the first frame
    pub can_header: Option<CanHeader>,
    /// ISO-TP unwrapping summary
    pub iso_tp: Option<IsoTpSummary>,
    /// Decoded UDS message
    pub message: Option<UdsMessage>,
    /// Display cap for trailing data bytes
    pub max_display_bytes: usize,
}

impl DecodedReport {
    /// Returns the set of layers found by the detection heuristics. A UDS layer is always
    /// decoded, but only counts as detected if the payload starts with a known service byte
    pub fn detected_layers(&self) -> DetectedLayers {
        self.detected
    }

    /// Returns the description of a layer, if present
    pub fn layer(&self, layer: Layer) -> Option<&LayerDescription> {
        self.layers.iter().find(|l| l.layer == layer)
    }

    /// Returns the captured frames as hex, one line per frame
    pub fn raw_hex(&self) -> String {
        self.frames.iter().map(ByteSequence::to_hex_string).collect::<Vec<_>>().join("\n")
    }

    /// Returns the total number of captured bytes
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(|f| f.len()).sum()
    }
}

/// Renders a report as text. The output only depends on the report
pub fn format(report: &DecodedReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &DecodedReport) -> std::fmt::Result {
    writeln!(out, "== Detected Layers ==")?;
    writeln!(out, "Input Format: {}", report.input_format)?;
    if report.layers.is_empty() {
        writeln!(out, "No protocol layers detected")?;
    }
    for layer in &report.layers {
        writeln!(out, "{}: {}", layer.layer, layer.summary)?;
    }
    writeln!(out, "Confidence: {}", report.confidence)?;

    writeln!(out)?;
    writeln!(out, "== Field Breakdown ==")?;
    for layer in &report.layers {
        writeln!(out, "[{}]", layer.layer)?;
        for field in &layer.fields {
            let marker = if field.resolved { "" } else { " [unresolved]" };
            writeln!(out, "  {}: {}{marker}", field.name, field.value)?;
        }
        if layer.layer == Layer::Uds {
            if let Some(msg) = report.message.as_ref().filter(|m| !m.extra_data.is_empty()) {
                writeln!(
                    out,
                    "  Extra Data: {}",
                    format_extra_data(&msg.extra_data, report.max_display_bytes)
                )?;
            }
        }
    }

    writeln!(out)?;
    writeln!(out, "== Interpretation ==")?;
    writeln!(out, "{}", report.interpretation)?;
    for note in &report.notes {
        writeln!(out, "Note: {note}")?;
    }

    writeln!(out)?;
    writeln!(out, "== Raw Hex ==")?;
    writeln!(out, "{}", report.raw_hex())?;

    writeln!(out)?;
    writeln!(out, "== Length ==")?;
    let len = report.byte_len();
    write!(out, "{len} bytes ({} bits)", len * 8)?;
    if let Some(msg) = &report.message {
        if msg.payload.len() != len {
            write!(out, ", UDS payload {} bytes", msg.payload.len())?;
        }
    }
    writeln!(out)
}

impl std::fmt::Display for DecodedReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format(self))
    }
}

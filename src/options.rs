//! Decoder configuration options

/// Inclusive range of 16-bit CAN identifiers accepted by the CAN header heuristic
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanIdRange {
    /// First identifier in the range
    pub start: u16,
    /// Last identifier in the range (Inclusive)
    pub end: u16,
}

impl CanIdRange {
    /// Creates a new identifier range
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Returns true if `id` lies within the range
    pub const fn contains(&self, id: u16) -> bool {
        id >= self.start && id <= self.end
    }
}

/// 11-bit diagnostic request/response identifiers of the target platform
/// (0x7DF functional request, 0x7E0-0x7EF physical request/response pairs, module IDs 0x700-0x7FF)
pub const DEFAULT_DIAG_ID_RANGE: CanIdRange = CanIdRange::new(0x0700, 0x07FF);

/// Decoder options
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderOptions {
    /// Identifier ranges that a leading `00 00 XX XX` prefix must fall into to be
    /// treated as a CAN header
    pub can_id_ranges: Vec<CanIdRange>,
    /// Maximum number of trailing data bytes shown in a report before
    /// the list is cut with a "+N more" suffix
    pub max_display_bytes: usize,
    /// Drop interleaved flow control frames when reassembling a multi frame capture.
    /// If false, a flow control frame in the capture is rejected
    pub skip_flow_control: bool,
}

impl DecoderOptions {
    /// Returns true if the identifier falls in one of the configured ranges
    pub fn is_known_can_id(&self, id: u16) -> bool {
        self.can_id_ranges.iter().any(|r| r.contains(id))
    }
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            can_id_ranges: vec![DEFAULT_DIAG_ID_RANGE],
            max_display_bytes: 8,
            skip_flow_control: true,
        }
    }
}

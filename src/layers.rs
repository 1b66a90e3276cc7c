//! Heuristic detection of the protocol layers present in a captured byte sequence
//!
//! A captured line may contain any of:
//! * A 4 byte CAN header (`00 00 XX XX`, where `XXXX` is the 11 bit identifier)
//! * An ISO-TP PCI byte (Single frame / First frame, or Consecutive / Flow control frames
//!   when a whole multi frame capture is supplied)
//! * The UDS payload itself
//!
//! Detection is deliberately conservative. Treating payload as a header corrupts every layer
//! decoded after it, so when in doubt, bytes are left as payload.

use bitflags::bitflags;
use log::debug;

use crate::{bytes::ByteSequence, options::DecoderOptions, uds};

/// Length of the CAN header prefix in bytes
pub const CAN_HEADER_LEN: usize = 4;

/// Maximum payload of a classic ISO-TP single frame
pub const MAX_SINGLE_FRAME_LEN: usize = 7;

/// Length of a classic CAN frame
pub const CLASSIC_FRAME_LEN: usize = 8;

bitflags! {
    /// Set of protocol layers found in a capture
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct DetectedLayers: u8 {
        /// CAN header prefix
        const CAN = 0b0000_0001;
        /// ISO-TP transport framing
        const ISO_TP = 0b0000_0010;
        /// UDS application payload
        const UDS = 0b0000_0100;
    }
}

/// View over the 4 byte CAN header prefix of a capture
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanHeader([u8; CAN_HEADER_LEN]);

impl CanHeader {
    /// Returns the header prefix bytes
    pub fn raw(&self) -> [u8; CAN_HEADER_LEN] {
        self.0
    }

    /// Returns the header interpreted as a big endian 32 bit identifier
    pub fn id(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Returns true if the identifier fits within an 11 bit (standard) CAN ID
    pub fn is_standard_id(&self) -> bool {
        self.id() <= 0x7FF
    }
}

/// Kind of ISO-TP frame, from the high nibble of the PCI byte
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
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PciKind {
    /// Single frame (0x0)
    #[strum(serialize = "Single Frame")]
    Single,
    /// First frame of a multi frame message (0x1)
    #[strum(serialize = "First Frame")]
    First,
    /// Consecutive frame of a multi frame message (0x2)
    #[strum(serialize = "Consecutive Frame")]
    Consecutive,
    /// Flow control frame (0x3)
    #[strum(serialize = "Flow Control")]
    FlowControl,
}

impl PciKind {
    /// Classifies the PCI byte. Returns None if the high nibble is not an ISO-TP frame type
    pub fn from_pci(byte0: u8) -> Option<Self> {
        match byte0 >> 4 {
            0x0 => Some(Self::Single),
            0x1 => Some(Self::First),
            0x2 => Some(Self::Consecutive),
            0x3 => Some(Self::FlowControl),
            _ => None,
        }
    }
}

/// Which layers were found in a capture, and how to unwrap them
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayerPlan {
    /// A CAN header prefix was found
    pub has_can_header: bool,
    /// The CAN header (Only if [LayerPlan::has_can_header] is true)
    pub can_header: Option<CanHeader>,
    /// The payload after the header is ISO-TP framed
    pub is_iso_tp: bool,
    /// The frame type of the first (header stripped) frame. Only set
    /// if [LayerPlan::is_iso_tp] is true
    pub pci: Option<PciKind>,
    /// The capture spans multiple ISO-TP frames that must be reassembled
    pub multi_frame: bool,
    /// PCI high nibble of a single line that can only be decoded together with its
    /// sibling frames (Consecutive or flow control)
    pub orphan_pci: Option<PciKind>,
    /// The innermost payload starts with a known UDS service or response byte
    pub likely_uds: bool,
}

impl LayerPlan {
    /// Returns the set of detected layers
    pub fn detected(&self) -> DetectedLayers {
        let mut layers = DetectedLayers::empty();
        layers.set(DetectedLayers::CAN, self.has_can_header);
        layers.set(DetectedLayers::ISO_TP, self.is_iso_tp);
        layers.set(DetectedLayers::UDS, self.likely_uds);
        layers
    }

    /// Returns the bytes after the CAN header (if present)
    pub fn strip_header<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        if self.has_can_header && frame.len() > CAN_HEADER_LEN {
            &frame[CAN_HEADER_LEN..]
        } else {
            frame
        }
    }
}

/// Checks for the `00 00 XX XX` header prefix, with `XXXX` in a known identifier range.
/// At least one byte must follow the header
fn find_can_header(bytes: &[u8], options: &DecoderOptions) -> Option<CanHeader> {
    if bytes.len() <= CAN_HEADER_LEN || bytes[0] != 0x00 || bytes[1] != 0x00 {
        return None;
    }
    let id = u16::from_be_bytes([bytes[2], bytes[3]]);
    if !options.is_known_can_id(id) {
        debug!("Prefix 00 00 {id:04X} is not a known diagnostic ID, keeping as payload");
        return None;
    }
    Some(CanHeader([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn is_single_frame(payload: &[u8]) -> bool {
    let len = (payload[0] & 0x0F) as usize;
    payload[0] >> 4 == 0x0 && (1..=MAX_SINGLE_FRAME_LEN).contains(&len)
}

fn first_frame_length(payload: &[u8]) -> Option<usize> {
    if payload.len() < 2 || payload[0] >> 4 != 0x1 {
        return None;
    }
    Some((((payload[0] & 0x0F) as usize) << 8) | payload[1] as usize)
}

fn looks_like_uds(byte0: u8) -> bool {
    byte0 == uds::NEGATIVE_RESPONSE_SID || uds::services::lookup_service(byte0 & !uds::RESPONSE_BIT).is_some()
}

/// Determines the layers present in a single captured line, using default options
pub fn detect_layers(bytes: &ByteSequence) -> LayerPlan {
    detect_layers_with(bytes, &DecoderOptions::default())
}

/// Determines the layers present in a single captured line.
///
/// A single line cannot observe a flow control exchange, so only Single frames and
/// full length First frames whose payload starts with a UDS service byte are treated as ISO-TP here
pub fn detect_layers_with(bytes: &ByteSequence, options: &DecoderOptions) -> LayerPlan {
    let can_header = find_can_header(bytes, options);
    let payload = match can_header {
        Some(_) => &bytes[CAN_HEADER_LEN..],
        None => bytes.as_slice(),
    };

    let mut plan = LayerPlan {
        has_can_header: can_header.is_some(),
        can_header,
        is_iso_tp: false,
        pci: None,
        multi_frame: false,
        orphan_pci: None,
        likely_uds: false,
    };

    if is_single_frame(payload) {
        plan.is_iso_tp = true;
        plan.pci = Some(PciKind::Single);
    } else if payload.len() == CLASSIC_FRAME_LEN
        && first_frame_length(payload).is_some_and(|len| len > MAX_SINGLE_FRAME_LEN)
        && payload.get(2).copied().is_some_and(looks_like_uds)
    {
        plan.is_iso_tp = true;
        plan.pci = Some(PciKind::First);
    }

    let inner = match plan.pci {
        Some(PciKind::Single) => payload.get(1),
        Some(_) => payload.get(2),
        None => payload.first(),
    };
    plan.likely_uds = inner.copied().is_some_and(looks_like_uds);

    // Many UDS service IDs share the consecutive / flow control nibbles (0x22, 0x31...)
    if !plan.is_iso_tp && !plan.likely_uds {
        if let Some(kind @ (PciKind::Consecutive | PciKind::FlowControl)) = PciKind::from_pci(payload[0]) {
            plan.orphan_pci = Some(kind);
        }
    }
    debug!(
        "Layer plan: can_header={}, iso_tp={:?}, likely_uds={}",
        plan.has_can_header, plan.pci, plan.likely_uds
    );
    plan
}

/// Determines the layers of a segmented capture (One entry per captured frame), using default options
pub fn detect_frame_layers(frames: &[ByteSequence]) -> Option<LayerPlan> {
    detect_frame_layers_with(frames, &DecoderOptions::default())
}

/// Determines the layers of a segmented capture (One entry per captured frame).
///
/// The plan is built from the first frame. If more than one frame is supplied and the first
/// one is an ISO-TP First frame, the plan is marked as a multi frame capture.
///
/// Returns None if `frames` is empty
pub fn detect_frame_layers_with(frames: &[ByteSequence], options: &DecoderOptions) -> Option<LayerPlan> {
    let first = frames.first()?;
    let mut plan = detect_layers_with(first, options);
    if frames.len() == 1 {
        return Some(plan);
    }

    let payload = plan.strip_header(first);
    if first_frame_length(payload).is_some_and(|len| len > MAX_SINGLE_FRAME_LEN) {
        plan.is_iso_tp = true;
        plan.pci = Some(PciKind::First);
        plan.multi_frame = true;
        plan.orphan_pci = None;
        plan.likely_uds = payload.get(2).copied().is_some_and(looks_like_uds);
    }
    Some(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(b: &[u8]) -> ByteSequence {
        ByteSequence::from_slice(b).unwrap()
    }

    #[test]
    fn detects_can_header() {
        let plan = detect_layers(&seq(&[0x00, 0x00, 0x07, 0xD8, 0x7F, 0x22, 0x31]));
        assert!(plan.has_can_header);
        assert_eq!(plan.can_header.unwrap().id(), 0x07D8);
        assert!(!plan.is_iso_tp);
        assert!(plan.likely_uds);
        assert_eq!(plan.detected(), DetectedLayers::CAN | DetectedLayers::UDS);
    }

    #[test]
    fn unknown_id_is_not_a_header() {
        let plan = detect_layers(&seq(&[0x00, 0x00, 0x01, 0x23, 0x7F, 0x22, 0x31]));
        assert!(!plan.has_can_header);
    }

    #[test]
    fn header_alone_is_not_a_header() {
        let plan = detect_layers(&seq(&[0x00, 0x00, 0x07, 0xE8]));
        assert!(!plan.has_can_header);
    }

    #[test]
    fn detects_single_frame() {
        let plan = detect_layers(&seq(&[0x03, 0x22, 0xF1, 0x90]));
        assert!(plan.is_iso_tp);
        assert_eq!(plan.pci, Some(PciKind::Single));
        assert!(plan.likely_uds);
    }

    #[test]
    fn detects_header_and_single_frame() {
        let plan = detect_layers(&seq(&[0x00, 0x00, 0x07, 0xE8, 0x03, 0x7F, 0x22, 0x31]));
        assert_eq!(plan.detected(), DetectedLayers::all());
    }

    #[test]
    fn short_uds_requests_are_not_first_frames() {
        // ECUReset hard reset / session control requests share the First frame nibble
        for bytes in [[0x11, 0x01], [0x10, 0x03]] {
            let plan = detect_layers(&seq(&bytes));
            assert!(!plan.is_iso_tp);
            assert!(plan.likely_uds);
        }
    }

    #[test]
    fn full_first_frame_is_detected() {
        let plan = detect_layers(&seq(&[0x10, 0x14, 0x62, 0xF1, 0x90, 0x57, 0x30, 0x4C]));
        assert_eq!(plan.pci, Some(PciKind::First));
        assert!(plan.likely_uds);
    }

    #[test]
    fn padded_uds_request_is_not_a_first_frame() {
        // ECUReset with suppressed response, padded to a full frame
        let plan = detect_layers(&seq(&[0x11, 0x81, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]));
        assert!(!plan.is_iso_tp);
        assert!(plan.likely_uds);
    }

    #[test]
    fn lone_consecutive_frame_is_orphaned() {
        let plan = detect_layers(&seq(&[0x21, 0x30, 0x30, 0x30]));
        assert!(!plan.is_iso_tp);
        assert_eq!(plan.orphan_pci, Some(PciKind::Consecutive));
    }

    #[test]
    fn multi_frame_capture() {
        let frames = [
            seq(&[0x10, 0x0A, 0x62, 0xF1, 0x90, 0x57, 0x30, 0x4C]),
            seq(&[0x21, 0x30, 0x30, 0x30, 0x30, 0x30, 0xCC, 0xCC]),
        ];
        let plan = detect_frame_layers(&frames).unwrap();
        assert!(plan.multi_frame);
        assert!(detect_frame_layers(&[]).is_none());
    }
}

//! ISO-TP (ISO15765-2) frame parsing and reassembly
//!
//! Classic CAN ISO-TP framing is supported:
//! * Single frame - `0L` + up to 7 payload bytes
//! * First frame - `1L LL` (12 bit total length) + 6 payload bytes
//! * Consecutive frame - `2N` (4 bit rolling sequence number) + up to 7 payload bytes
//! * Flow control - `3S BS ST` (only ever skipped during reassembly)

use std::cmp::min;

use log::{debug, warn};

use crate::{
    bytes::ByteSequence,
    layers::{CAN_HEADER_LEN, LayerPlan, MAX_SINGLE_FRAME_LEN, PciKind},
    options::DecoderOptions,
};

/// ISO-TP reassembly result
pub type ReassemblyResult<T> = Result<T, ReassemblyError>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
/// Error produced when ISO-TP frames cannot be reassembled into a payload
pub enum ReassemblyError {
    /// A single frame declared more bytes than the frame holds
    #[error("single frame declares {declared} bytes, but only {available} are present")]
    LengthMismatch {
        /// Length from the PCI byte
        declared: usize,
        /// Bytes present after the PCI byte
        available: usize,
    },
    /// A consecutive frame sequence number was skipped
    #[error("frame {frame}: expected consecutive frame sequence number {expected}, found {found}")]
    SequenceGap {
        /// Index of the offending frame in the capture
        frame: usize,
        /// Sequence number that should have followed
        expected: u8,
        /// Sequence number that was found
        found: u8,
    },
    /// The capture ended before the declared payload length was received
    #[error("first frame declares {declared} bytes, but the capture only holds {received}")]
    Truncated {
        /// Length from the first frame
        declared: usize,
        /// Bytes received in total
        received: usize,
    },
    /// A frame could not be used at its position in the capture
    #[error("frame {frame}: {reason}")]
    UnexpectedFrame {
        /// Index of the offending frame in the capture
        frame: usize,
        /// Why the frame was rejected
        reason: String,
    },
    /// No frames were supplied
    #[error("no frames supplied for reassembly")]
    NoFrames,
}

/// Flow status of a flow control frame
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlowStatus {
    /// Sender may continue sending consecutive frames
    ContinueToSend,
    /// Sender must wait for another flow control frame
    Wait,
    /// Receiver buffer overflow, transfer aborted
    Overflow,
    /// Reserved flow status value
    Reserved(u8),
}

impl From<u8> for FlowStatus {
    fn from(x: u8) -> Self {
        match x {
            0x0 => Self::ContinueToSend,
            0x1 => Self::Wait,
            0x2 => Self::Overflow,
            x => Self::Reserved(x),
        }
    }
}

/// A single parsed ISO-TP frame
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IsoTpFrame {
    /// Complete message in one frame
    SingleFrame {
        /// Declared payload length
        length: u8,
        /// Payload (Padding removed)
        payload: Vec<u8>,
    },
    /// Start of a multi frame message
    FirstFrame {
        /// Declared length of the whole message
        total_length: u16,
        /// Payload bytes carried by this frame
        partial_payload: Vec<u8>,
    },
    /// Continuation of a multi frame message
    ConsecutiveFrame {
        /// 4 bit rolling sequence number
        sequence_index: u8,
        /// Payload bytes carried by this frame (May include padding on the last frame)
        partial_payload: Vec<u8>,
    },
    /// Flow control sent by the receiver of a multi frame message
    FlowControl {
        /// Flow status
        status: FlowStatus,
        /// Number of consecutive frames allowed before the next flow control (0 = unlimited)
        block_size: u8,
        /// Minimum separation time between consecutive frames
        st_min: u8,
    },
}

impl IsoTpFrame {
    /// Parses a (header stripped) frame. `index` is only used for error reporting
    pub fn parse(index: usize, frame: &[u8]) -> ReassemblyResult<Self> {
        let Some(&pci) = frame.first() else {
            return Err(ReassemblyError::UnexpectedFrame {
                frame: index,
                reason: "frame holds no PCI byte".into(),
            });
        };
        match PciKind::from_pci(pci) {
            Some(PciKind::Single) => {
                let length = (pci & 0x0F) as usize;
                if length == 0 || length > MAX_SINGLE_FRAME_LEN {
                    return Err(ReassemblyError::UnexpectedFrame {
                        frame: index,
                        reason: format!("single frame length {length} is outside 1-{MAX_SINGLE_FRAME_LEN}"),
                    });
                }
                let available = frame.len() - 1;
                if available < length {
                    return Err(ReassemblyError::LengthMismatch { declared: length, available });
                }
                Ok(Self::SingleFrame {
                    length: length as u8,
                    payload: frame[1..1 + length].to_vec(),
                })
            }
            Some(PciKind::First) => {
                if frame.len() < 2 {
                    return Err(ReassemblyError::UnexpectedFrame {
                        frame: index,
                        reason: "first frame is missing its length byte".into(),
                    });
                }
                let total_length = (((pci & 0x0F) as u16) << 8) | frame[1] as u16;
                if (total_length as usize) <= MAX_SINGLE_FRAME_LEN {
                    return Err(ReassemblyError::UnexpectedFrame {
                        frame: index,
                        reason: format!("first frame declares {total_length} bytes, which fits a single frame"),
                    });
                }
                Ok(Self::FirstFrame {
                    total_length,
                    partial_payload: frame[2..].to_vec(),
                })
            }
            Some(PciKind::Consecutive) => Ok(Self::ConsecutiveFrame {
                sequence_index: pci & 0x0F,
                partial_payload: frame[1..].to_vec(),
            }),
            Some(PciKind::FlowControl) => Ok(Self::FlowControl {
                status: FlowStatus::from(pci & 0x0F),
                block_size: frame.get(1).copied().unwrap_or(0),
                st_min: frame.get(2).copied().unwrap_or(0),
            }),
            None => Err(ReassemblyError::UnexpectedFrame {
                frame: index,
                reason: format!("0x{pci:02X} is not an ISO-TP PCI byte"),
            }),
        }
    }

    /// Returns the PCI frame type
    pub fn kind(&self) -> PciKind {
        match self {
            Self::SingleFrame { .. } => PciKind::Single,
            Self::FirstFrame { .. } => PciKind::First,
            Self::ConsecutiveFrame { .. } => PciKind::Consecutive,
            Self::FlowControl { .. } => PciKind::FlowControl,
        }
    }
}

/// Summary of how a payload was unwrapped from its ISO-TP frames
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsoTpSummary {
    /// Frame type of the first frame
    pub kind: PciKind,
    /// Payload length declared by the first frame
    pub declared_length: usize,
    /// Number of frames that carried payload
    pub frames_used: usize,
    /// Number of padding bytes discarded
    pub padding_bytes: usize,
    /// Number of interleaved flow control frames that were skipped
    pub flow_control_skipped: usize,
    /// Number of frames ignored after the payload was complete
    pub surplus_frames: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum IsoTpRxAction {
    None,
    Completed,
}

struct IsoTpRxMemory {
    data: Vec<u8>,
    max_size: usize,
    next_sequence: u8,
    frames_received: usize,
    padding: usize,
}

impl IsoTpRxMemory {
    fn from_start_frame(total_length: u16, partial: &[u8]) -> Self {
        let max_size = total_length as usize;
        let take = min(partial.len(), max_size);
        Self {
            data: partial[..take].to_vec(),
            max_size,
            next_sequence: 1,
            frames_received: 1,
            padding: partial.len() - take,
        }
    }

    fn add_consecutive_frame(&mut self, index: usize, sequence: u8, partial: &[u8]) -> ReassemblyResult<IsoTpRxAction> {
        if sequence != self.next_sequence {
            return Err(ReassemblyError::SequenceGap {
                frame: index,
                expected: self.next_sequence,
                found: sequence,
            });
        }
        let max_copy = min(self.max_size - self.data.len(), partial.len());
        self.data.extend_from_slice(&partial[..max_copy]);
        self.padding += partial.len() - max_copy;
        self.frames_received += 1;
        self.next_sequence = (self.next_sequence + 1) & 0x0F;
        if self.data.len() == self.max_size {
            Ok(IsoTpRxAction::Completed)
        } else {
            Ok(IsoTpRxAction::None)
        }
    }
}

fn strip_frame_header<'a>(index: usize, frame: &'a [u8], plan: &LayerPlan) -> ReassemblyResult<&'a [u8]> {
    if !plan.has_can_header {
        return Ok(frame);
    }
    if frame.len() <= CAN_HEADER_LEN || frame[0] != 0x00 || frame[1] != 0x00 {
        return Err(ReassemblyError::UnexpectedFrame {
            frame: index,
            reason: "frame does not start with a CAN header".into(),
        });
    }
    Ok(&frame[CAN_HEADER_LEN..])
}

/// Consecutive frames must come from the same CAN ID as the first frame.
/// Flow control frames are sent by the tester, so they are not checked
fn check_sender(index: usize, frame: &[u8], plan: &LayerPlan) -> ReassemblyResult<()> {
    let Some(header) = plan.can_header else {
        return Ok(());
    };
    let expected = header.raw();
    if frame.get(..CAN_HEADER_LEN) == Some(expected.as_slice()) {
        return Ok(());
    }
    let found = frame
        .get(..CAN_HEADER_LEN)
        .and_then(|h| <[u8; CAN_HEADER_LEN]>::try_from(h).ok())
        .map(u32::from_be_bytes)
        .unwrap_or_default();
    Err(ReassemblyError::UnexpectedFrame {
        frame: index,
        reason: format!(
            "consecutive frame was sent by CAN ID 0x{found:04X}, not 0x{:04X}",
            header.id()
        ),
    })
}

/// Reassembles the UDS payload from captured frames, using default options.
///
/// See [reassemble_with]
pub fn reassemble(frames: &[ByteSequence], plan: &LayerPlan) -> ReassemblyResult<ByteSequence> {
    reassemble_with(frames, plan, &DecoderOptions::default()).map(|(payload, _)| payload)
}

/// Reassembles the UDS payload from captured frames.
///
/// * If the plan has no ISO-TP layer, exactly one frame must be given, and it is passed through
///   (minus its CAN header).
/// * A single frame yields exactly its declared number of bytes.
/// * A first frame is followed by consecutive frames in sequence number order
///   (1, 2, ... 15, 0, 1 ...) until the declared length is reached.
///
/// Returns the payload and (if ISO-TP framed) a summary of the frames used
pub fn reassemble_with(
    frames: &[ByteSequence],
    plan: &LayerPlan,
    options: &DecoderOptions,
) -> ReassemblyResult<(ByteSequence, Option<IsoTpSummary>)> {
    let first = frames.first().ok_or(ReassemblyError::NoFrames)?;
    let first_payload = strip_frame_header(0, first, plan)?;

    if !plan.is_iso_tp {
        if frames.len() > 1 {
            return Err(ReassemblyError::UnexpectedFrame {
                frame: 1,
                reason: "multiple frames supplied, but the first frame is not ISO-TP framed".into(),
            });
        }
        debug!("No ISO-TP layer, passing payload through");
        return Ok((to_sequence(first_payload)?, None));
    }

    match IsoTpFrame::parse(0, first_payload)? {
        IsoTpFrame::SingleFrame { length, payload } => {
            if frames.len() > 1 {
                return Err(ReassemblyError::UnexpectedFrame {
                    frame: 1,
                    reason: "frame follows a complete single frame".into(),
                });
            }
            let padding = first_payload.len() - 1 - payload.len();
            if padding > 0 {
                debug!("Single frame carries {padding} padding bytes");
            }
            let summary = IsoTpSummary {
                kind: PciKind::Single,
                declared_length: length as usize,
                frames_used: 1,
                padding_bytes: padding,
                flow_control_skipped: 0,
                surplus_frames: 0,
            };
            Ok((to_sequence(&payload)?, Some(summary)))
        }
        IsoTpFrame::FirstFrame {
            total_length,
            partial_payload,
        } => reassemble_multi_frame(frames, plan, options, total_length, &partial_payload),
        other => Err(ReassemblyError::UnexpectedFrame {
            frame: 0,
            reason: format!("capture starts with a {}, not a single or first frame", other.kind()),
        }),
    }
}

fn reassemble_multi_frame(
    frames: &[ByteSequence],
    plan: &LayerPlan,
    options: &DecoderOptions,
    total_length: u16,
    first_partial: &[u8],
) -> ReassemblyResult<(ByteSequence, Option<IsoTpSummary>)> {
    let mut rx = IsoTpRxMemory::from_start_frame(total_length, first_partial);
    let mut flow_control_skipped = 0;
    let mut completed = rx.data.len() == rx.max_size;
    let mut surplus_frames = 0;

    for (index, frame) in frames.iter().enumerate().skip(1) {
        let payload = strip_frame_header(index, frame, plan)?;
        match IsoTpFrame::parse(index, payload)? {
            IsoTpFrame::FlowControl { status, .. } if options.skip_flow_control => {
                warn!("Skipping flow control frame {index} ({status})");
                flow_control_skipped += 1;
            }
            _ if completed => {
                warn!("Ignoring frame {index}, payload already complete");
                surplus_frames += 1;
            }
            IsoTpFrame::ConsecutiveFrame {
                sequence_index,
                partial_payload,
            } => {
                check_sender(index, frame, plan)?;
                if rx.add_consecutive_frame(index, sequence_index, &partial_payload)? == IsoTpRxAction::Completed {
                    debug!("Reassembly complete after frame {index}");
                    completed = true;
                }
            }
            other => {
                return Err(ReassemblyError::UnexpectedFrame {
                    frame: index,
                    reason: format!("expected a consecutive frame, found a {}", other.kind()),
                });
            }
        }
    }

    if !completed {
        return Err(ReassemblyError::Truncated {
            declared: rx.max_size,
            received: rx.data.len(),
        });
    }
    let summary = IsoTpSummary {
        kind: PciKind::First,
        declared_length: rx.max_size,
        frames_used: rx.frames_received,
        padding_bytes: rx.padding,
        flow_control_skipped,
        surplus_frames,
    };
    Ok((to_sequence(&rx.data)?, Some(summary)))
}

fn to_sequence(bytes: &[u8]) -> ReassemblyResult<ByteSequence> {
    ByteSequence::from_slice(bytes).map_err(|_| ReassemblyError::UnexpectedFrame {
        frame: 0,
        reason: "frame holds no payload".into(),
    })
}

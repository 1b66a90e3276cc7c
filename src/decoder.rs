//! The decoding pipeline: text -> bytes -> layers -> ISO-TP payload -> UDS -> report

use log::{debug, warn};

use crate::{
    DecodeResult,
    bytes::{self, ByteSequence, InputFormat},
    isotp::{self, IsoTpSummary, ReassemblyError},
    layers::{self, CAN_HEADER_LEN, DetectedLayers, LayerPlan, PciKind},
    options::DecoderOptions,
    report::{Confidence, DecodedReport, Field, Layer, LayerDescription},
    uds::{self, Direction, UdsMessage},
};

/// Decodes captured diagnostic payloads.
///
/// The decoder holds no state besides its options, so it can be shared between threads
/// and every call is independent of the ones before it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoder {
    options: DecoderOptions,
}

impl Decoder {
    /// Creates a decoder with custom options
    pub fn new(options: DecoderOptions) -> Self {
        Self { options }
    }

    /// Returns the decoder options
    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Decodes a single captured line. Text holding more than one non-empty line is taken
    /// as a segmented capture and decoded with [Decoder::decode_frames]
    pub fn decode(&self, raw: &str) -> DecodeResult<DecodedReport> {
        let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() > 1 {
            return self.decode_frames(&lines);
        }
        self.decode_frames(&[raw])
    }

    /// Decodes a capture that has been segmented into one line per frame.
    /// A single line is decoded the same as [Decoder::decode]
    pub fn decode_frames<S: AsRef<str>>(&self, lines: &[S]) -> DecodeResult<DecodedReport> {
        if lines.is_empty() {
            return Err(ReassemblyError::NoFrames.into());
        }

        let mut frames = Vec::with_capacity(lines.len());
        let mut input_format = InputFormat::Hexadecimal;
        for (index, line) in lines.iter().enumerate() {
            let (frame, format) = bytes::parse(line.as_ref())?;
            if format == InputFormat::AsciiText {
                if lines.len() == 1 {
                    return Ok(self.text_report(frame));
                }
                return Err(ReassemblyError::UnexpectedFrame {
                    frame: index,
                    reason: "line is plain text, not a captured frame".into(),
                }
                .into());
            }
            if index == 0 {
                input_format = format;
            }
            frames.push(frame);
        }

        let plan = layers::detect_frame_layers_with(&frames, &self.options).ok_or(ReassemblyError::NoFrames)?;
        let (payload, summary) = isotp::reassemble_with(&frames, &plan, &self.options)?;
        let message = uds::decode_uds(&payload);

        if input_format == InputFormat::Hexadecimal && plan.likely_uds {
            input_format = InputFormat::UdsLikely;
        }
        debug!("Decoded {} frames as {input_format}", frames.len());
        Ok(self.build_report(input_format, frames, &plan, summary, message))
    }

    /// Decodes each line independently
    pub fn decode_batch<S: AsRef<str>>(&self, lines: &[S]) -> Vec<DecodeResult<DecodedReport>> {
        lines.iter().map(|line| self.decode(line.as_ref())).collect()
    }

    fn text_report(&self, frame: ByteSequence) -> DecodedReport {
        debug!("Input is plain text, not decoding");
        DecodedReport {
            input_format: InputFormat::AsciiText,
            detected: DetectedLayers::empty(),
            layers: Vec::new(),
            confidence: Confidence::Unknown,
            interpretation: "Input is not a recognised byte encoding. It was taken as ASCII text and not decoded."
                .into(),
            notes: Vec::new(),
            frames: vec![frame],
            can_header: None,
            iso_tp: None,
            message: None,
            max_display_bytes: self.options.max_display_bytes,
        }
    }

    fn build_report(
        &self,
        input_format: InputFormat,
        frames: Vec<ByteSequence>,
        plan: &LayerPlan,
        summary: Option<IsoTpSummary>,
        message: UdsMessage,
    ) -> DecodedReport {
        let mut layers = Vec::new();
        let mut notes = Vec::new();

        if let Some(header) = plan.can_header {
            let id = header.id();
            let width = if header.is_standard_id() { 11 } else { 29 };
            layers.push(LayerDescription {
                layer: Layer::Can,
                summary: format!("ID 0x{id:04X}"),
                fields: vec![
                    Field::new("Header", bytes::to_hex_string(&header.raw())),
                    Field::new("CAN ID", format!("0x{id:04X} ({width} bit)")),
                ],
            });
        }

        if let Some(summary) = &summary {
            layers.push(iso_tp_layer(summary));
            if summary.padding_bytes > 0 {
                notes.push(format!("{} padding bytes were discarded", summary.padding_bytes));
            }
            if summary.flow_control_skipped > 0 {
                notes.push(format!(
                    "{} flow control frames were skipped",
                    summary.flow_control_skipped
                ));
            }
            if summary.surplus_frames > 0 {
                warn!("{} frames after the end of the payload were ignored", summary.surplus_frames);
                notes.push(format!(
                    "{} frames after the end of the payload were ignored",
                    summary.surplus_frames
                ));
            }
        }

        if let Some(kind) = plan.orphan_pci {
            notes.push(format!(
                "The first byte matches an ISO-TP {kind} PCI. A lone {kind} can only be decoded together with the rest of its capture"
            ));
        }
        if plan.has_can_header && frames.first().is_some_and(|f| f.len() == CAN_HEADER_LEN + 1) {
            notes.push("Only one byte follows the CAN header".into());
        }

        layers.push(uds_layer(&message));

        DecodedReport {
            input_format,
            detected: plan.detected(),
            layers,
            confidence: message.confidence(),
            interpretation: message.interpretation(),
            notes,
            frames,
            can_header: plan.can_header,
            iso_tp: summary,
            message: Some(message),
            max_display_bytes: self.options.max_display_bytes,
        }
    }
}

fn iso_tp_layer(summary: &IsoTpSummary) -> LayerDescription {
    let text = match summary.kind {
        PciKind::First => format!(
            "First Frame + {} Consecutive Frames, {} byte payload",
            summary.frames_used.saturating_sub(1),
            summary.declared_length
        ),
        kind => format!("{kind}, {} byte payload", summary.declared_length),
    };
    let mut fields = vec![
        Field::new("Frame Type", summary.kind.to_string()),
        Field::new("Declared Length", summary.declared_length.to_string()),
        Field::new("Frames Used", summary.frames_used.to_string()),
    ];
    if summary.padding_bytes > 0 {
        fields.push(Field::new("Padding Bytes", summary.padding_bytes.to_string()));
    }
    LayerDescription {
        layer: Layer::IsoTp,
        summary: text,
        fields,
    }
}

fn uds_layer(message: &UdsMessage) -> LayerDescription {
    let service = match message.direction {
        Direction::NegativeResponse | Direction::Incomplete => {
            format!("0x{:02X} (Negative Response)", message.service_id)
        }
        _ => match message.service_info() {
            Some(info) => format!("0x{:02X} ({})", message.service_id, info.name),
            None => format!("0x{:02X} ({})", message.service_id, uds::UNKNOWN_SERVICE),
        },
    };
    let mut fields = vec![Field::with_resolution(
        "Service",
        service,
        message.service_id == uds::NEGATIVE_RESPONSE_SID || message.service_info().is_some(),
    )];
    if let Some(info) = message.service_info().filter(|_| message.direction != Direction::Incomplete) {
        fields.push(Field::new("Category", info.category.to_string()));
    }
    fields.extend(message.fields.iter().cloned());

    LayerDescription {
        layer: Layer::Uds,
        summary: format!("{}: {}", message.direction, message.service_name()),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_text_is_not_decoded() {
        let report = Decoder::default().decode("hello world").unwrap();
        assert_eq!(report.input_format, InputFormat::AsciiText);
        assert_eq!(report.confidence, Confidence::Unknown);
        assert!(report.message.is_none());
        assert!(report.layers.is_empty());
    }

    #[test]
    fn hex_upgraded_to_uds_likely() {
        let report = Decoder::default().decode("7F 22 31").unwrap();
        assert_eq!(report.input_format, InputFormat::UdsLikely);
        let report = Decoder::default().decode("AA BB").unwrap();
        assert_eq!(report.input_format, InputFormat::Hexadecimal);
        assert_eq!(report.confidence, Confidence::Unknown);
    }

    #[test]
    fn orphan_consecutive_frame_note() {
        let report = Decoder::default().decode("21 30 30 30").unwrap();
        assert!(report.notes.iter().any(|n| n.contains("Consecutive Frame")));
    }

    #[test]
    fn extended_can_id_width() {
        let decoder = Decoder::new(DecoderOptions {
            can_id_ranges: vec![crate::options::CanIdRange::new(0x0800, 0x0FFF)],
            ..Default::default()
        });
        let report = decoder.decode("00 00 08 01 7F 22 31").unwrap();
        assert!(report.to_string().contains("CAN ID: 0x0801 (29 bit)"));

        let report = Decoder::default().decode("00 00 07 D8 7F 22 31").unwrap();
        assert!(report.to_string().contains("CAN ID: 0x07D8 (11 bit)"));
    }

    #[test]
    fn multi_line_text_is_a_capture() {
        let lines = "7F 22 31\n\n50 03";
        let err = Decoder::default().decode(lines).unwrap_err();
        assert!(matches!(
            err,
            crate::DecodeError::Reassembly(ReassemblyError::UnexpectedFrame { frame: 1, .. })
        ));
        // Trailing blank lines do not make a capture
        assert!(Decoder::default().decode("7F 22 31\n").is_ok());
    }

    #[test]
    fn no_lines() {
        let lines: [&str; 0] = [];
        assert!(Decoder::default().decode_frames(&lines).is_err());
    }

    #[test]
    fn single_frame_padding_note() {
        let report = Decoder::default().decode("02 10 03 AA AA AA AA AA").unwrap();
        assert_eq!(report.iso_tp.unwrap().padding_bytes, 5);
        assert!(report.notes.iter().any(|n| n.contains("padding")));
    }
}

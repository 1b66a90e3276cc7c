use diag_decoder::{
    DecodeError, Decoder, DecoderOptions, Direction, ReassemblyError, decode, decode_frames, to_hex_string,
    layers::{DetectedLayers, PciKind},
};

const VIN_CAPTURE: [&str; 3] = [
    "10 14 62 F1 90 57 30 4C",
    "21 30 30 30 30 35 31 54",
    "22 32 31 32 33 34 35 36",
];

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn vin_read_is_reassembled() {
    init();
    let report = decode_frames(&VIN_CAPTURE).unwrap();
    assert_eq!(report.detected_layers(), DetectedLayers::ISO_TP | DetectedLayers::UDS);

    let iso_tp = report.iso_tp.unwrap();
    assert_eq!(iso_tp.kind, PciKind::First);
    assert_eq!(iso_tp.declared_length, 20);
    assert_eq!(iso_tp.frames_used, 3);

    let msg = report.message.as_ref().unwrap();
    assert_eq!(msg.payload.len(), 20);
    assert_eq!(msg.direction, Direction::PositiveResponse);
    assert_eq!(msg.data_identifiers, vec![0xF190]);
    assert_eq!(&msg.extra_data, b"W0L000051T2123456");

    let text = report.to_string();
    assert!(text.contains("First Frame + 2 Consecutive Frames, 20 byte payload"));
    assert!(text.contains("ASCII: \"W0L000051T2123456\""));
    assert!(text.contains(&VIN_CAPTURE.join("\n")));
}

#[test]
fn raw_hex_of_a_capture_decodes_to_the_same_report() {
    let first = decode_frames(&VIN_CAPTURE).unwrap();
    let lines: Vec<String> = first.raw_hex().lines().map(str::to_string).collect();
    let second = decode_frames(&lines).unwrap();
    assert_eq!(first, second);
}

#[test]
fn raw_hex_text_of_a_capture_decodes_as_a_capture() {
    let first = decode_frames(&VIN_CAPTURE).unwrap();
    let second = decode(&first.raw_hex()).unwrap();
    assert_eq!(first, second);
    assert_eq!(decode(&VIN_CAPTURE.join("\r\n")).unwrap(), first);
}

#[test]
fn padded_capture_with_can_headers() {
    let report = decode_frames(&[
        "00 00 07 E8 10 0B 62 F1 90 57 30 4C",
        "00 00 07 E8 21 30 30 30 30 35 AA AA",
    ])
    .unwrap();
    assert!(report.detected_layers().contains(DetectedLayers::CAN));
    let iso_tp = report.iso_tp.unwrap();
    assert_eq!(iso_tp.padding_bytes, 2);
    assert_eq!(report.message.unwrap().payload.len(), 11);
}

#[test]
fn sequence_gap_is_rejected() {
    let err = decode_frames(&[VIN_CAPTURE[0], VIN_CAPTURE[2]]).unwrap_err();
    assert_eq!(
        err,
        DecodeError::Reassembly(ReassemblyError::SequenceGap {
            frame: 1,
            expected: 1,
            found: 2
        })
    );
}

#[test]
fn truncated_capture_is_rejected() {
    let err = decode_frames(&VIN_CAPTURE[..2]).unwrap_err();
    assert_eq!(
        err,
        DecodeError::Reassembly(ReassemblyError::Truncated {
            declared: 20,
            received: 13
        })
    );
}

#[test]
fn flow_control_frames_are_skipped() {
    let capture = [VIN_CAPTURE[0], "30 00 00 AA AA AA AA AA", VIN_CAPTURE[1], VIN_CAPTURE[2]];
    let report = decode_frames(&capture).unwrap();
    assert_eq!(report.iso_tp.unwrap().flow_control_skipped, 1);
    assert!(report.notes.iter().any(|n| n.contains("flow control")));

    let strict = Decoder::new(DecoderOptions {
        skip_flow_control: false,
        ..Default::default()
    });
    let err = strict.decode_frames(&capture).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Reassembly(ReassemblyError::UnexpectedFrame { frame: 1, .. })
    ));
}

#[test]
fn surplus_frames_are_ignored() {
    let mut capture = VIN_CAPTURE.to_vec();
    capture.push("23 AA AA AA AA AA AA AA");
    let report = decode_frames(&capture).unwrap();
    assert_eq!(report.iso_tp.unwrap().surplus_frames, 1);
    assert_eq!(report.message.unwrap().payload.len(), 20);
}

#[test]
fn capture_must_start_with_a_first_frame() {
    let err = decode_frames(&["7F 22 31", "21 00 00"]).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Reassembly(ReassemblyError::UnexpectedFrame { .. })
    ));
}

#[test]
fn sequence_counter_wraps() {
    // 6 + 17 * 7 bytes needs consecutive frames 1..=15, 0, 1
    let total = 6 + 17 * 7;
    let mut payload = vec![0x62, 0xF1, 0x90];
    payload.resize(total, 0x41);

    let mut first = vec![0x10 | (total >> 8) as u8, total as u8];
    first.extend_from_slice(&payload[..6]);
    let mut lines = vec![to_hex_string(&first)];
    for (i, chunk) in payload[6..].chunks(7).enumerate() {
        let mut frame = vec![0x20 | ((i + 1) & 0x0F) as u8];
        frame.extend_from_slice(chunk);
        lines.push(to_hex_string(&frame));
    }
    assert_eq!(lines.len(), 18);

    let report = decode_frames(&lines).unwrap();
    assert_eq!(report.message.unwrap().payload.len(), total);
}

#[test]
fn consecutive_frames_must_share_the_first_frames_can_id() {
    init();
    for sender in ["00 00 07 E9", "00 00 12 34"] {
        let capture = [
            "00 00 07 E8 10 0B 62 F1 90 57 30 4C".to_string(),
            format!("{sender} 21 30 30 30 30 35 AA AA"),
        ];
        let err = decode_frames(&capture).unwrap_err();
        assert!(
            matches!(err, DecodeError::Reassembly(ReassemblyError::UnexpectedFrame { frame: 1, .. })),
            "sender {sender}: {err}"
        );
    }
}

#[test]
fn flow_control_from_the_tester_id_is_skipped() {
    let report = decode_frames(&[
        "00 00 07 E8 10 0B 62 F1 90 57 30 4C",
        "00 00 07 E0 30 00 00 AA AA AA AA AA",
        "00 00 07 E8 21 30 30 30 30 35 AA AA",
    ])
    .unwrap();
    let iso_tp = report.iso_tp.unwrap();
    assert_eq!(iso_tp.flow_control_skipped, 1);
    assert_eq!(report.message.unwrap().payload.len(), 11);
}

use diag_decoder::{
    ByteSequence, Confidence, DecodeError, Decoder, DecoderOptions, Direction, InputFormat, ParseError, decode,
    decode_uds,
    layers::DetectedLayers,
    options::CanIdRange,
    parse, to_hex_string,
    uds::nrc::{known_nrcs, nrc_description},
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn seq(b: &[u8]) -> ByteSequence {
    ByteSequence::from_slice(b).unwrap()
}

#[test]
fn negative_response() {
    init();
    let report = decode("7F 22 31").unwrap();
    let msg = report.message.as_ref().unwrap();
    assert_eq!(msg.direction, Direction::NegativeResponse);
    assert_eq!(msg.requested_service, Some(0x22));
    assert_eq!(msg.service_name(), "ReadDataByIdentifier");
    assert_eq!(msg.nrc, Some(0x31));
    assert_eq!(msg.nrc_info().unwrap().name, "RequestOutOfRange");
    assert_eq!(report.confidence, Confidence::Exact);
    assert_eq!(report.detected_layers(), DetectedLayers::UDS);
}

#[test]
fn positive_session_control_response() {
    init();
    let report = decode("50 03").unwrap();
    let msg = report.message.as_ref().unwrap();
    assert_eq!(msg.direction, Direction::PositiveResponse);
    assert_eq!(msg.base_service(), Some(0x10));
    assert_eq!(msg.service_name(), "DiagnosticSessionControl");
    assert_eq!(msg.sub_function, Some(0x03));
    assert_eq!(msg.sub_function_meaning().unwrap(), "Extended Diagnostic Session");
}

#[test]
fn read_vin_single_frame() {
    init();
    let report = decode("03 22 F1 90").unwrap();
    assert_eq!(report.detected_layers(), DetectedLayers::ISO_TP | DetectedLayers::UDS);
    let iso_tp = report.iso_tp.unwrap();
    assert_eq!(iso_tp.declared_length, 3);

    let msg = report.message.as_ref().unwrap();
    assert_eq!(msg.payload.as_slice(), &[0x22, 0xF1, 0x90]);
    assert_eq!(msg.direction, Direction::Request);
    assert_eq!(msg.base_service(), Some(0x22));
    assert_eq!(msg.data_identifiers, vec![0xF190]);
    assert!(report.to_string().contains("0xF190 (VIN)"));
}

#[test]
fn negative_response_behind_can_header() {
    init();
    let report = decode("00 00 07 D8 7F 22 31").unwrap();
    assert!(report.detected_layers().contains(DetectedLayers::CAN));
    assert_eq!(report.can_header.unwrap().id(), 0x07D8);

    let plain = decode("7F 22 31").unwrap();
    assert_eq!(report.message.as_ref().unwrap().fields, plain.message.as_ref().unwrap().fields);
    assert_eq!(report.interpretation, plain.interpretation);
    assert_eq!(report.confidence, plain.confidence);
}

#[test]
fn odd_length_hex_is_rejected() {
    init();
    let err = decode("7F2").unwrap_err();
    assert!(matches!(err, DecodeError::Parse(ParseError::OddLength { .. })));
}

#[test]
fn empty_input_is_rejected() {
    assert_eq!(decode("").unwrap_err(), DecodeError::Parse(ParseError::Empty));
    assert_eq!(decode(" \t ").unwrap_err(), DecodeError::Parse(ParseError::Empty));
}

#[test]
fn invalid_digit_is_rejected() {
    let err = decode("7F 2G 31").unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Parse(ParseError::InvalidDigit { digit: 'G', .. })
    ));
}

#[test]
fn every_known_nrc_resolves() {
    for nrc in known_nrcs() {
        let msg = decode_uds(&seq(&[0x7F, 0x22, nrc]));
        assert_eq!(msg.direction, Direction::NegativeResponse);
        assert!(nrc_description(nrc).is_some());
        assert!(msg.nrc_info().is_some(), "NRC 0x{nrc:02X} did not resolve");
        assert!(!msg.fields.iter().any(|f| f.value.contains("Unknown NRC")));
    }
}

#[test]
fn short_negative_responses_are_incomplete() {
    let msg = decode_uds(&seq(&[0x7F]));
    assert_eq!(msg.direction, Direction::Incomplete);
    assert_eq!(msg.requested_service, None);
    assert_eq!(msg.nrc, None);

    let msg = decode_uds(&seq(&[0x7F, 0x22]));
    assert_eq!(msg.direction, Direction::Incomplete);
    assert_eq!(msg.requested_service, Some(0x22));
    assert_eq!(msg.nrc, None);

    let report = decode("7F 22").unwrap();
    assert!(report.to_string().contains("Incomplete Negative Response"));
}

#[test]
fn hex_round_trip() {
    let samples: [&[u8]; 5] = [
        &[0x00],
        &[0x7F, 0x22, 0x31],
        &[0x01, 0x01, 0x01, 0x01],
        &[0xFF; 12],
        &[0x10, 0x14, 0x62, 0xF1, 0x90, 0x57, 0x30, 0x4C],
    ];
    for bytes in samples {
        let (parsed, format) = parse(&to_hex_string(bytes)).unwrap();
        assert_eq!(parsed.as_slice(), bytes);
        assert_eq!(format, InputFormat::Hexadecimal);
    }
    let all: Vec<u8> = (0..=255).collect();
    let (parsed, format) = parse(&to_hex_string(&all)).unwrap();
    assert_eq!(parsed.as_slice(), all.as_slice());
    assert_eq!(format, InputFormat::Hexadecimal);
}

#[test]
fn decoding_raw_hex_is_idempotent() {
    for input in ["7F 22 31", "00 00 07 E8 03 7F 22 31", "03 22 F1 90", "3E 80", "BA 01 02"] {
        let first = decode(input).unwrap();
        let second = decode(&first.raw_hex()).unwrap();
        assert_eq!(first, second, "input {input}");
        assert_eq!(first.to_string(), second.to_string());
    }
}

#[test]
fn unknown_service_is_not_guessed() {
    let report = decode("BA 01 02").unwrap();
    let msg = report.message.as_ref().unwrap();
    assert_eq!(report.confidence, Confidence::Unknown);
    assert_eq!(msg.sub_function, None);
    assert_eq!(msg.extra_data, vec![0x01, 0x02]);
    assert!(report.to_string().contains("Unknown/Proprietary"));
}

#[test]
fn padded_request_is_not_taken_for_a_first_frame() {
    let report = decode("11 81 00 00 00 00 00 00").unwrap();
    assert!(report.iso_tp.is_none());
    let msg = report.message.as_ref().unwrap();
    assert_eq!(msg.service_name(), "ECUReset");
    assert!(msg.suppress_positive_response());
}

#[test]
fn unlisted_sub_function_is_labelled() {
    let report = decode("10 60").unwrap();
    assert_eq!(report.confidence, Confidence::Partial);
    assert!(report.to_string().contains("Custom/Unlisted sub-function 0x60"));
}

#[test]
fn extra_data_is_capped_for_display() {
    let report = decode("2E F1 90 01 02 03 04 05 06 07 08 09 0A").unwrap();
    let msg = report.message.as_ref().unwrap();
    assert_eq!(msg.extra_data.len(), 10);
    assert!(report.to_string().contains("Extra Data: 01 02 03 04 05 06 07 08 (+2 more)"));

    let decoder = Decoder::new(DecoderOptions {
        max_display_bytes: 2,
        ..Default::default()
    });
    let report = decoder.decode("2E F1 90 01 02 03 04 05 06 07 08 09 0A").unwrap();
    assert!(report.to_string().contains("Extra Data: 01 02 (+8 more)"));
}

#[test]
fn report_length_section() {
    let report = decode("00 00 07 E8 03 7F 22 31").unwrap();
    let text = report.to_string();
    assert!(text.contains("8 bytes (64 bits), UDS payload 3 bytes"));
    assert!(text.contains("== Raw Hex ==\n00 00 07 E8 03 7F 22 31\n"));
}

#[test]
fn can_id_ranges_are_configurable() {
    assert!(!decode("00 00 01 23 7F 22 31").unwrap().detected_layers().contains(DetectedLayers::CAN));

    let decoder = Decoder::new(DecoderOptions {
        can_id_ranges: vec![CanIdRange::new(0x0100, 0x01FF)],
        ..Default::default()
    });
    let report = decoder.decode("00 00 01 23 7F 22 31").unwrap();
    assert!(report.detected_layers().contains(DetectedLayers::CAN));
}

#[test]
fn other_input_formats() {
    let report = decode("01111111 00100010 00110001").unwrap();
    assert_eq!(report.input_format, InputFormat::Binary);
    assert_eq!(report.confidence, Confidence::Exact);

    let report = decode("127,34,49").unwrap();
    assert_eq!(report.input_format, InputFormat::DecimalCsv);
    assert_eq!(report.message.unwrap().nrc, Some(0x31));

    let report = decode("not a payload").unwrap();
    assert_eq!(report.input_format, InputFormat::AsciiText);
    assert!(report.message.is_none());
}

#[test]
fn batch_decoding_is_independent() {
    let results = Decoder::default().decode_batch(&["7F 22 31", "7F2", "50 03"]);
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert_eq!(
        results[2].as_ref().unwrap().message.as_ref().unwrap().direction,
        Direction::PositiveResponse
    );
}

#[test]
fn decoder_can_be_shared_between_threads() {
    let decoder = std::sync::Arc::new(Decoder::default());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let decoder = decoder.clone();
            std::thread::spawn(move || decoder.decode("7F 22 31").map(|r| r.to_string()))
        })
        .collect();
    let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn self_tests_pass() {
    init();
    let results = diag_decoder::run_self_tests();
    assert!(!results.is_empty());
    for r in results {
        assert!(r.passed, "{}: expected {}, got\n{}", r.name, r.expected, r.actual);
    }
}

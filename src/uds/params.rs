//! Interpretation of the parameters that follow the service ID, per service layout

use crate::{
    bytes::to_hex_string,
    dtc::{DTCFormatType, DTC, DtcStatusMask, dtc_name, dtc_value, parse_dtc_records},
    report::Field,
};

use super::{
    Direction, SUB_FUNCTION_MASK, SubFunctionFlags,
    did::{ascii_record, did_name, did_range_note, lookup_did},
    services::{self, ParamLayout, ServiceInfo, routine_name},
    sub_function_label,
};

/// Parameters read from the bytes after the service ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedParameters {
    /// Raw sub-function byte
    pub sub_function: Option<u8>,
    /// Data identifiers named by the message
    pub data_identifiers: Vec<u16>,
    /// Interpreted fields
    pub fields: Vec<Field>,
    /// Bytes left over after interpretation
    pub extra_data: Vec<u8>,
}

impl DecodedParameters {
    /// Leaves every byte uninterpreted
    pub fn raw(data: &[u8]) -> Self {
        Self {
            extra_data: data.to_vec(),
            ..Default::default()
        }
    }

    fn missing(name: &str) -> Self {
        Self {
            fields: vec![Field::unresolved(name, "missing")],
            ..Default::default()
        }
    }
}

/// Interprets `data` (Payload minus the service ID) according to the layout of `info`
pub fn decode_parameters(info: &ServiceInfo, direction: Direction, data: &[u8]) -> DecodedParameters {
    match info.layout {
        ParamLayout::SubFunction => decode_sub_function(info.sid, direction, data),
        ParamLayout::DataIdentifier => decode_data_identifier(info.sid, direction, data),
        ParamLayout::Routine => decode_routine(direction, data),
        ParamLayout::DtcGroup => decode_dtc_group(direction, data),
        ParamLayout::Memory => decode_memory(info.sid, direction, data),
        ParamLayout::Transfer => decode_transfer(direction, data),
        ParamLayout::BlockSequence => decode_block_sequence(data),
        ParamLayout::Raw => DecodedParameters::raw(data),
    }
}

fn be_value(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

fn sub_function_field(sid: u8, direction: Direction, sub: u8, fields: &mut Vec<Field>) {
    let value = sub & SUB_FUNCTION_MASK;
    let known = services::sub_function_meaning(sid, value).is_some();
    fields.push(Field::with_resolution(
        "Sub-function",
        format!("0x{value:02X} ({})", sub_function_label(sid, value)),
        known,
    ));
    if direction == Direction::Request
        && SubFunctionFlags::from_bits_retain(sub).contains(SubFunctionFlags::SUPPRESS_POSITIVE_RESPONSE)
    {
        fields.push(Field::new("Suppress Positive Response", "yes"));
    }
}

fn decode_sub_function(sid: u8, direction: Direction, data: &[u8]) -> DecodedParameters {
    let Some((&sub, rest)) = data.split_first() else {
        return DecodedParameters::missing("Sub-function");
    };
    let mut out = DecodedParameters {
        sub_function: Some(sub),
        ..Default::default()
    };
    sub_function_field(sid, direction, sub, &mut out.fields);

    let value = sub & SUB_FUNCTION_MASK;
    let fields = &mut out.fields;
    let rest = match (sid, direction) {
        (0x10, Direction::PositiveResponse) => session_timing(fields, rest),
        (0x11, Direction::PositiveResponse) if value == 0x04 => power_down_time(fields, rest),
        (0x19, Direction::Request) => dtc_request(value, fields, rest),
        (0x19, Direction::PositiveResponse) => dtc_response(value, fields, rest),
        (0x27, Direction::Request) if value % 2 == 0 && !rest.is_empty() => {
            fields.push(Field::new("Key", to_hex_string(rest)));
            &[]
        }
        (0x27, Direction::PositiveResponse) if value % 2 == 1 && !rest.is_empty() => {
            let mut seed = to_hex_string(rest);
            if rest.iter().all(|b| *b == 0) {
                seed.push_str(" (security level already unlocked)");
            }
            fields.push(Field::new("Seed", seed));
            &[]
        }
        (0x28, Direction::Request) => communication_type(fields, rest),
        _ => rest,
    };
    out.extra_data = rest.to_vec();
    out
}

fn session_timing<'a>(fields: &mut Vec<Field>, rest: &'a [u8]) -> &'a [u8] {
    let Some(([p2_hi, p2_lo, ext_hi, ext_lo], tail)) = rest.split_first_chunk::<4>() else {
        return rest;
    };
    let p2 = u16::from_be_bytes([*p2_hi, *p2_lo]);
    let p2_ext = u16::from_be_bytes([*ext_hi, *ext_lo]) as u32 * 10;
    fields.push(Field::new("P2 Server Max", format!("{p2} ms")));
    fields.push(Field::new("P2* Server Max", format!("{p2_ext} ms")));
    tail
}

fn power_down_time<'a>(fields: &mut Vec<Field>, rest: &'a [u8]) -> &'a [u8] {
    let Some((&time, tail)) = rest.split_first() else {
        return rest;
    };
    match time {
        0xFF => fields.push(Field::new("Power Down Time", "not available")),
        t => fields.push(Field::new("Power Down Time", format!("{t} s"))),
    }
    tail
}

fn status_mask_field(mask: u8) -> Field {
    Field::new(
        "DTC Status Mask",
        format!("0x{mask:02X} ({})", DtcStatusMask::from_bits_retain(mask).describe()),
    )
}

fn dtc_request<'a>(sub: u8, fields: &mut Vec<Field>, rest: &'a [u8]) -> &'a [u8] {
    match sub {
        0x01 | 0x02 | 0x0F | 0x11 | 0x12 | 0x13 => match rest.split_first() {
            Some((&mask, tail)) => {
                fields.push(status_mask_field(mask));
                tail
            }
            None => rest,
        },
        0x04 | 0x06 | 0x09 | 0x10 => match rest.split_first_chunk::<3>() {
            Some(([hi, mid, lo], tail)) => {
                fields.push(Field::new("DTC", dtc_name(dtc_value(*hi, *mid, *lo))));
                match tail.split_first() {
                    Some((&record, tail)) if sub != 0x09 => {
                        fields.push(Field::new("Record Number", format!("0x{record:02X}")));
                        tail
                    }
                    _ => tail,
                }
            }
            None => rest,
        },
        _ => rest,
    }
}

fn dtc_record_field(dtc: &DTC) -> Field {
    Field::new(
        "DTC",
        format!(
            "{} ({}, status 0x{:02X}: {})",
            dtc.name(),
            dtc.status,
            dtc.status_mask.bits(),
            dtc.status_mask.describe()
        ),
    )
}

fn dtc_response<'a>(sub: u8, fields: &mut Vec<Field>, rest: &'a [u8]) -> &'a [u8] {
    match sub {
        0x01 | 0x07 | 0x11 | 0x12 => match rest.split_first_chunk::<4>() {
            Some(([availability, format, hi, lo], tail)) => {
                fields.push(Field::new("Status Availability Mask", format!("0x{availability:02X}")));
                let format = DTCFormatType::from(*format);
                fields.push(Field::with_resolution(
                    "DTC Format",
                    format.to_string(),
                    !matches!(format, DTCFormatType::UNKNOWN(_)),
                ));
                fields.push(Field::new("DTC Count", u16::from_be_bytes([*hi, *lo]).to_string()));
                tail
            }
            None => rest,
        },
        0x02 | 0x0A | 0x0B | 0x0C | 0x0D | 0x0E | 0x0F | 0x13 | 0x15 => match rest.split_first() {
            Some((&availability, records)) => {
                fields.push(Field::new("Status Availability Mask", format!("0x{availability:02X}")));
                let (dtcs, tail) = parse_dtc_records(records);
                fields.push(Field::new("DTC Count", dtcs.len().to_string()));
                fields.extend(dtcs.iter().map(dtc_record_field));
                tail
            }
            None => rest,
        },
        _ => rest,
    }
}

fn communication_type<'a>(fields: &mut Vec<Field>, rest: &'a [u8]) -> &'a [u8] {
    let Some((&comm, tail)) = rest.split_first() else {
        return rest;
    };
    let label = match comm & 0x03 {
        0x01 => Some("Normal Communication Messages"),
        0x02 => Some("Network Management Communication Messages"),
        0x03 => Some("Normal And Network Management Communication Messages"),
        _ => None,
    };
    match label {
        Some(label) => fields.push(Field::new("Communication Type", format!("0x{comm:02X} ({label})"))),
        None => fields.push(Field::unresolved("Communication Type", format!("0x{comm:02X} (Unknown)"))),
    }
    tail
}

fn did_field(did: u16) -> Field {
    match did_name(did) {
        Some(name) => Field::new("Data Identifier", format!("0x{did:04X} ({name})")),
        None => {
            let note = did_range_note(did).map(|n| format!(", {n}")).unwrap_or_default();
            Field::unresolved("Data Identifier", format!("0x{did:04X} (Unknown DID{note})"))
        }
    }
}

fn decode_data_identifier(sid: u8, direction: Direction, data: &[u8]) -> DecodedParameters {
    let mut out = DecodedParameters::default();

    // Read requests may list several identifiers, every other message names exactly one
    if (sid, direction) == (0x22, Direction::Request) {
        if data.len() < 2 {
            let mut out = DecodedParameters::missing("Data Identifier");
            out.extra_data = data.to_vec();
            return out;
        }
        let chunks = data.chunks_exact(2);
        out.extra_data = chunks.remainder().to_vec();
        for chunk in chunks {
            let did = u16::from_be_bytes([chunk[0], chunk[1]]);
            out.data_identifiers.push(did);
            out.fields.push(did_field(did));
        }
        return out;
    }

    let Some((did_bytes, mut rest)) = data.split_first_chunk::<2>() else {
        let mut out = DecodedParameters::missing("Data Identifier");
        out.extra_data = data.to_vec();
        return out;
    };
    let did = u16::from_be_bytes(*did_bytes);
    out.data_identifiers.push(did);
    out.fields.push(did_field(did));

    if sid == 0x2F {
        if let Some((&control, tail)) = rest.split_first() {
            out.fields.push(io_control_field(control));
            rest = tail;
        }
    }

    let carries_record = matches!(
        (sid, direction),
        (0x22, Direction::PositiveResponse) | (0x2E, Direction::Request)
    );
    if carries_record && lookup_did(did).is_some_and(|d| d.ascii) {
        if let Some(text) = ascii_record(rest) {
            out.fields.push(Field::new("ASCII", format!("\"{text}\"")));
        }
    }
    out.extra_data = rest.to_vec();
    out
}

fn io_control_field(control: u8) -> Field {
    let label = match control {
        0x00 => "Return Control To ECU",
        0x01 => "Reset To Default",
        0x02 => "Freeze Current State",
        0x03 => "Short Term Adjustment",
        _ => {
            return Field::unresolved(
                "Control Parameter",
                format!("0x{control:02X} (Custom/Unlisted control parameter)"),
            );
        }
    };
    Field::new("Control Parameter", format!("0x{control:02X} ({label})"))
}

fn decode_routine(direction: Direction, data: &[u8]) -> DecodedParameters {
    let Some((&sub, rest)) = data.split_first() else {
        return DecodedParameters::missing("Sub-function");
    };
    let mut out = DecodedParameters {
        sub_function: Some(sub),
        ..Default::default()
    };
    sub_function_field(0x31, direction, sub, &mut out.fields);

    let Some((rid_bytes, rest)) = rest.split_first_chunk::<2>() else {
        out.fields.push(Field::unresolved("Routine Identifier", "missing"));
        out.extra_data = rest.to_vec();
        return out;
    };
    let rid = u16::from_be_bytes(*rid_bytes);
    out.fields.push(match routine_name(rid) {
        Some(name) => Field::new("Routine Identifier", format!("0x{rid:04X} ({name})")),
        None => Field::unresolved("Routine Identifier", format!("0x{rid:04X} (Unknown routine)")),
    });
    out.extra_data = rest.to_vec();
    out
}

fn decode_dtc_group(direction: Direction, data: &[u8]) -> DecodedParameters {
    if direction == Direction::PositiveResponse {
        return DecodedParameters::raw(data);
    }
    let Some(([hi, mid, lo], rest)) = data.split_first_chunk::<3>() else {
        let mut out = DecodedParameters::missing("DTC Group");
        out.extra_data = data.to_vec();
        return out;
    };
    let group = dtc_value(*hi, *mid, *lo);
    let label = match group {
        0xFF_FFFF => "All DTCs".to_string(),
        0xFF_FF33 => "Emissions-related DTCs".to_string(),
        other => dtc_name(other),
    };
    DecodedParameters {
        fields: vec![Field::new("DTC Group", format!("0x{group:06X} ({label})"))],
        extra_data: rest.to_vec(),
        ..Default::default()
    }
}

/// Reads `addressAndLengthFormatIdentifier`, memory address and memory size.
/// Returns the bytes that follow the block
fn memory_block<'a>(fields: &mut Vec<Field>, data: &'a [u8]) -> &'a [u8] {
    let Some((&alfid, rest)) = data.split_first() else {
        fields.push(Field::unresolved("Address And Length Format", "missing"));
        return data;
    };
    let addr_len = (alfid & 0x0F) as usize;
    let size_len = (alfid >> 4) as usize;
    if !(1..=8).contains(&addr_len) || !(1..=8).contains(&size_len) {
        fields.push(Field::unresolved(
            "Address And Length Format",
            format!("0x{alfid:02X} (invalid address / size length)"),
        ));
        return rest;
    }
    fields.push(Field::new(
        "Address And Length Format",
        format!("0x{alfid:02X} ({addr_len} byte address, {size_len} byte size)"),
    ));
    if rest.len() < addr_len + size_len {
        fields.push(Field::unresolved("Memory Address", "truncated"));
        return rest;
    }
    let address = be_value(&rest[..addr_len]);
    let size = be_value(&rest[addr_len..addr_len + size_len]);
    fields.push(Field::new(
        "Memory Address",
        format!("0x{address:0width$X}", width = addr_len * 2),
    ));
    fields.push(Field::new("Memory Size", format!("{size} bytes")));
    &rest[addr_len + size_len..]
}

fn decode_memory(sid: u8, direction: Direction, data: &[u8]) -> DecodedParameters {
    // ReadMemoryByAddress responses only carry the memory contents
    if (sid, direction) == (0x23, Direction::PositiveResponse) {
        return DecodedParameters::raw(data);
    }
    let mut out = DecodedParameters::default();
    let rest = memory_block(&mut out.fields, data);
    out.extra_data = rest.to_vec();
    out
}

fn decode_transfer(direction: Direction, data: &[u8]) -> DecodedParameters {
    let mut out = DecodedParameters::default();
    let Some((&format, rest)) = data.split_first() else {
        let name = match direction {
            Direction::Request => "Data Format Identifier",
            _ => "Length Format Identifier",
        };
        return DecodedParameters::missing(name);
    };

    let rest = match direction {
        Direction::Request => {
            let label = match format {
                0x00 => "uncompressed, unencrypted".to_string(),
                f => format!("compression method {}, encryption method {}", f >> 4, f & 0x0F),
            };
            out.fields.push(Field::new("Data Format Identifier", format!("0x{format:02X} ({label})")));
            memory_block(&mut out.fields, rest)
        }
        _ => {
            let len = (format >> 4) as usize;
            if !(1..=8).contains(&len) || rest.len() < len {
                out.fields.push(Field::unresolved(
                    "Length Format Identifier",
                    format!("0x{format:02X} (invalid block length size)"),
                ));
                rest
            } else {
                out.fields.push(Field::new("Length Format Identifier", format!("0x{format:02X}")));
                out.fields.push(Field::new("Max Block Length", format!("{} bytes", be_value(&rest[..len]))));
                &rest[len..]
            }
        }
    };
    out.extra_data = rest.to_vec();
    out
}

fn decode_block_sequence(data: &[u8]) -> DecodedParameters {
    let Some((&counter, rest)) = data.split_first() else {
        return DecodedParameters::missing("Block Sequence Counter");
    };
    DecodedParameters {
        fields: vec![Field::new("Block Sequence Counter", format!("0x{counter:02X}"))],
        extra_data: rest.to_vec(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uds::services::lookup_service;

    fn decode(sid: u8, direction: Direction, data: &[u8]) -> DecodedParameters {
        decode_parameters(lookup_service(sid).unwrap(), direction, data)
    }

    fn value<'a>(params: &'a DecodedParameters, name: &str) -> &'a str {
        &params.fields.iter().find(|f| f.name == name).unwrap().value
    }

    #[test]
    fn session_timing() {
        let p = decode(0x10, Direction::PositiveResponse, &[0x03, 0x00, 0x32, 0x01, 0xF4]);
        assert_eq!(value(&p, "P2 Server Max"), "50 ms");
        assert_eq!(value(&p, "P2* Server Max"), "5000 ms");
        assert!(p.extra_data.is_empty());
    }

    #[test]
    fn read_multiple_dids() {
        let p = decode(0x22, Direction::Request, &[0xF1, 0x90, 0xF1, 0x8C, 0x01]);
        assert_eq!(p.data_identifiers, vec![0xF190, 0xF18C]);
        assert_eq!(p.extra_data, vec![0x01]);
        assert!(p.fields.iter().all(|f| f.resolved));
    }

    #[test]
    fn vin_response_text() {
        let mut data = vec![0xF1, 0x90];
        data.extend_from_slice(b"W0L000051T2123456");
        let p = decode(0x22, Direction::PositiveResponse, &data);
        assert_eq!(value(&p, "ASCII"), "\"W0L000051T2123456\"");
        assert_eq!(p.extra_data.len(), 17);
    }

    #[test]
    fn unknown_did_is_unresolved() {
        let p = decode(0x22, Direction::Request, &[0x12, 0x34]);
        assert!(!p.fields[0].resolved);
        assert!(p.fields[0].value.contains("vehicle manufacturer specific range"));
    }

    #[test]
    fn security_access_seed() {
        let p = decode(0x27, Direction::PositiveResponse, &[0x01, 0x12, 0x34]);
        assert_eq!(value(&p, "Seed"), "12 34");
        let p = decode(0x27, Direction::PositiveResponse, &[0x01, 0x00, 0x00]);
        assert!(value(&p, "Seed").contains("already unlocked"));
        let p = decode(0x27, Direction::Request, &[0x02, 0xAB, 0xCD]);
        assert_eq!(value(&p, "Key"), "AB CD");
    }

    #[test]
    fn dtc_report() {
        let p = decode(
            0x19,
            Direction::PositiveResponse,
            &[0x02, 0xFF, 0x03, 0x01, 0x00, 0x09, 0xC1, 0x00, 0x00, 0x08],
        );
        assert_eq!(value(&p, "DTC Count"), "2");
        assert!(p.fields.iter().any(|f| f.value.starts_with("P0301-00 (Active")));
        assert!(p.fields.iter().any(|f| f.value.starts_with("U0100-00 (Stored")));
    }

    #[test]
    fn dtc_count() {
        let p = decode(0x19, Direction::PositiveResponse, &[0x01, 0xFF, 0x01, 0x00, 0x05]);
        assert_eq!(value(&p, "DTC Format"), "ISO14229-1");
        assert_eq!(value(&p, "DTC Count"), "5");
    }

    #[test]
    fn routine_control() {
        let p = decode(0x31, Direction::Request, &[0x01, 0xFF, 0x00, 0x44]);
        assert_eq!(value(&p, "Routine Identifier"), "0xFF00 (Erase Memory)");
        assert_eq!(p.extra_data, vec![0x44]);
        let p = decode(0x31, Direction::Request, &[0x01, 0x12, 0x34]);
        assert!(!p.fields.iter().all(|f| f.resolved));
    }

    #[test]
    fn memory_read() {
        let p = decode(0x23, Direction::Request, &[0x24, 0x00, 0x00, 0x10, 0x00, 0x01, 0x00]);
        assert_eq!(value(&p, "Memory Address"), "0x00001000");
        assert_eq!(value(&p, "Memory Size"), "256 bytes");
        let p = decode(0x23, Direction::Request, &[0x00]);
        assert!(!p.fields[0].resolved);
    }

    #[test]
    fn request_download() {
        let p = decode(0x34, Direction::Request, &[0x00, 0x44, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00]);
        assert_eq!(value(&p, "Memory Size"), "32768 bytes");
        let p = decode(0x34, Direction::PositiveResponse, &[0x20, 0x0F, 0xFF]);
        assert_eq!(value(&p, "Max Block Length"), "4095 bytes");
    }

    #[test]
    fn clear_all_dtcs() {
        let p = decode(0x14, Direction::Request, &[0xFF, 0xFF, 0xFF]);
        assert_eq!(value(&p, "DTC Group"), "0xFFFFFF (All DTCs)");
    }

    #[test]
    fn transfer_data() {
        let p = decode(0x36, Direction::PositiveResponse, &[0x01]);
        assert_eq!(value(&p, "Block Sequence Counter"), "0x01");
    }
}

//! Decoding of Unified diagnostic services (UDS) messages
//!
//! Implements the request / response vocabulary of ISO14229-1. Every value that is not in the
//! built in dictionaries is labelled as unknown rather than given a best guess meaning, and
//! lowers the [Confidence] of the decoded message.

use std::borrow::Cow;

use bitflags::bitflags;
use log::debug;

use crate::{
    bytes::{ByteSequence, to_hex_string},
    report::{Confidence, Field},
};

pub mod did;
pub mod nrc;
pub mod params;
pub mod services;

pub use did::DidInfo;
pub use nrc::NrcInfo;
pub use services::{ParamLayout, ServiceCategory, ServiceInfo};

/// Service byte of a negative response
pub const NEGATIVE_RESPONSE_SID: u8 = 0x7F;

bitflags! {
    /// Bits of the service identifier byte
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ServiceFlags: u8 {
        /// Set on positive responses (Response SID = Request SID | 0x40)
        const POSITIVE_RESPONSE = 0b0100_0000;
    }
}

bitflags! {
    /// Bits of the sub-function byte
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct SubFunctionFlags: u8 {
        /// The tester does not want a positive response
        const SUPPRESS_POSITIVE_RESPONSE = 0b1000_0000;
    }
}

/// Response indication bit of the service identifier
pub const RESPONSE_BIT: u8 = ServiceFlags::POSITIVE_RESPONSE.bits();

/// Bits of the sub-function byte that carry the sub-function value
pub const SUB_FUNCTION_MASK: u8 = !SubFunctionFlags::SUPPRESS_POSITIVE_RESPONSE.bits();

/// Label used for services that are not in the dictionary
pub const UNKNOWN_SERVICE: &str = "Unknown/Proprietary";

/// Direction of a UDS message
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
pub enum Direction {
    /// Tester to ECU
    Request,
    /// ECU accepted the request
    #[strum(serialize = "Positive Response")]
    PositiveResponse,
    /// ECU rejected the request
    #[strum(serialize = "Negative Response")]
    NegativeResponse,
    /// A negative response too short to hold the requested service and NRC
    #[strum(serialize = "Incomplete Negative Response")]
    Incomplete,
}

/// A decoded UDS message
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UdsMessage {
    /// First byte of the payload (Request SID, response SID or 0x7F)
    pub service_id: u8,
    /// Message direction
    pub direction: Direction,
    /// Raw sub-function byte, including the suppress positive response bit
    pub sub_function: Option<u8>,
    /// Service that a negative response refers to
    pub requested_service: Option<u8>,
    /// Negative response code
    pub nrc: Option<u8>,
    /// Data identifiers named by the message
    pub data_identifiers: Vec<u16>,
    /// Interpreted fields, in payload order
    pub fields: Vec<Field>,
    /// Bytes after the interpreted header
    pub extra_data: Vec<u8>,
    /// The complete payload
    pub payload: ByteSequence,
}

impl UdsMessage {
    /// Returns the request service ID this message belongs to
    /// (Response bit cleared, or the requested service of a negative response)
    pub fn base_service(&self) -> Option<u8> {
        match self.direction {
            Direction::NegativeResponse | Direction::Incomplete => self.requested_service,
            _ => Some(self.service_id & !RESPONSE_BIT),
        }
    }

    /// Returns the dictionary entry of the base service
    pub fn service_info(&self) -> Option<&'static ServiceInfo> {
        self.base_service().and_then(services::lookup_service)
    }

    /// Returns the name of the base service, or [UNKNOWN_SERVICE]
    pub fn service_name(&self) -> &'static str {
        self.service_info().map_or(UNKNOWN_SERVICE, |s| s.name)
    }

    /// Returns the sub-function value with the suppress positive response bit cleared
    pub fn sub_function_value(&self) -> Option<u8> {
        self.sub_function.map(|s| s & SUB_FUNCTION_MASK)
    }

    /// Returns true if a request asks the ECU not to send a positive response
    pub fn suppress_positive_response(&self) -> bool {
        self.direction == Direction::Request
            && self.sub_function.is_some_and(|s| {
                SubFunctionFlags::from_bits_retain(s).contains(SubFunctionFlags::SUPPRESS_POSITIVE_RESPONSE)
            })
    }

    /// Returns the meaning of the sub-function. Sub-functions that are not in the dictionary
    /// are labelled `Custom/Unlisted sub-function 0xNN`
    pub fn sub_function_meaning(&self) -> Option<Cow<'static, str>> {
        let value = self.sub_function_value()?;
        let sid = self.base_service()?;
        Some(sub_function_label(sid, value))
    }

    /// Returns the dictionary entry of the negative response code
    pub fn nrc_info(&self) -> Option<&'static NrcInfo> {
        self.nrc.and_then(nrc::lookup_nrc)
    }

    /// Rates how much of the message could be resolved from the dictionaries
    pub fn confidence(&self) -> Confidence {
        let all_resolved = self.fields.iter().all(|f| f.resolved);
        match self.direction {
            Direction::Incomplete => {
                if self.service_info().is_some() {
                    Confidence::Partial
                } else {
                    Confidence::Unknown
                }
            }
            Direction::NegativeResponse => match (self.service_info().is_some(), self.nrc_info().is_some()) {
                (true, true) if all_resolved => Confidence::Exact,
                (false, false) => Confidence::Unknown,
                _ => Confidence::Partial,
            },
            _ => {
                if self.service_info().is_none() {
                    Confidence::Unknown
                } else if all_resolved {
                    Confidence::Exact
                } else {
                    Confidence::Partial
                }
            }
        }
    }

    /// Builds a one paragraph explanation of the message
    pub fn interpretation(&self) -> String {
        match self.direction {
            Direction::Incomplete => match self.requested_service {
                Some(sid) => format!(
                    "Incomplete negative response to {}: only {} bytes are present, so the negative response code is unknown.",
                    service_label(sid),
                    self.payload.len()
                ),
                None => format!(
                    "Incomplete negative response: only {} byte is present, so neither the requested service nor the negative response code is known.",
                    self.payload.len()
                ),
            },
            Direction::NegativeResponse => {
                let requested = self.requested_service.map(service_label).unwrap_or_default();
                let code = self.nrc.unwrap_or_default();
                match self.nrc_info() {
                    Some(info) => format!(
                        "The ECU rejected the {requested} request with NRC 0x{code:02X} {}: {}. Recommended action: {}.",
                        info.name, info.description, info.action
                    ),
                    None => format!(
                        "The ECU rejected the {requested} request with NRC 0x{code:02X}, which is not a known negative response code."
                    ),
                }
            }
            direction => {
                let Some(sid) = self.base_service().filter(|s| services::lookup_service(*s).is_some()) else {
                    let base = self.service_id & !RESPONSE_BIT;
                    let mut notes = Vec::new();
                    if !services::is_iso_standard_service(base) {
                        notes.push("not defined by ISO14229");
                    }
                    notes.extend(services::service_range_note(base));
                    let note = if notes.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", notes.join(", "))
                    };
                    return format!(
                        "Service byte 0x{:02X} is not a known UDS service{note}; the message cannot be interpreted.",
                        self.service_id
                    );
                };
                let mut text = match direction {
                    Direction::Request => format!("Tester request for {}", service_label(sid)),
                    _ => format!("Positive response from the ECU to {}", service_label(sid)),
                };
                if let Some(meaning) = self.sub_function_meaning() {
                    text.push_str(&format!(": {meaning}"));
                }
                if !self.data_identifiers.is_empty() {
                    let dids = self
                        .data_identifiers
                        .iter()
                        .map(|d| did_label(*d))
                        .collect::<Vec<_>>()
                        .join(", ");
                    text.push_str(&format!(" for {dids}"));
                }
                if self.suppress_positive_response() {
                    text.push_str(" (positive response suppressed)");
                }
                text.push('.');
                text
            }
        }
    }
}

/// Formats a service ID as `Name (0xNN)`
pub fn service_label(sid: u8) -> String {
    format!("{} (0x{sid:02X})", services::service_name(sid).unwrap_or(UNKNOWN_SERVICE))
}

/// Formats a data identifier as `Name (0xNNNN)`
pub fn did_label(did: u16) -> String {
    match did::did_name(did) {
        Some(name) => format!("{name} (0x{did:04X})"),
        None => format!("Unknown DID (0x{did:04X})"),
    }
}

/// Returns the dictionary meaning of a sub-function value, or the literal
/// `Custom/Unlisted sub-function 0xNN` label
pub fn sub_function_label(sid: u8, value: u8) -> Cow<'static, str> {
    services::sub_function_meaning(sid, value)
        .unwrap_or_else(|| Cow::Owned(format!("Custom/Unlisted sub-function 0x{value:02X}")))
}

fn decode_negative_response(payload: &ByteSequence) -> UdsMessage {
    let bytes = payload.as_slice();
    let requested_service = bytes.get(1).copied();
    let nrc = bytes.get(2).copied();
    let mut fields = Vec::new();

    if let Some(sid) = requested_service {
        let known = services::lookup_service(sid).is_some();
        fields.push(Field::with_resolution("Requested Service", service_label(sid), known));
    } else {
        fields.push(Field::unresolved("Requested Service", "missing (message truncated)"));
    }

    match nrc {
        Some(code) => match nrc::lookup_nrc(code) {
            Some(info) => {
                fields.push(Field::new("NRC", format!("0x{code:02X} ({})", info.name)));
                fields.push(Field::new("Description", info.description));
                fields.push(Field::new("Recommended Action", info.action));
            }
            None => {
                let mut value = format!("0x{code:02X} (Unknown NRC");
                if let Some(note) = nrc::nrc_range_note(code) {
                    value.push_str(&format!(", {note}"));
                } else if !nrc::is_iso_standard_nrc(code) {
                    value.push_str(", not defined by ISO14229");
                }
                value.push(')');
                fields.push(Field::unresolved("NRC", value));
            }
        },
        None => fields.push(Field::unresolved("NRC", "missing (message truncated)")),
    }

    let direction = if bytes.len() < 3 {
        debug!("Negative response holds only {} bytes", bytes.len());
        Direction::Incomplete
    } else {
        Direction::NegativeResponse
    };

    UdsMessage {
        service_id: NEGATIVE_RESPONSE_SID,
        direction,
        sub_function: None,
        requested_service,
        nrc,
        data_identifiers: Vec::new(),
        fields,
        extra_data: bytes.get(3..).unwrap_or_default().to_vec(),
        payload: payload.clone(),
    }
}

/// Decodes a UDS payload. This never fails; values that are not in the dictionaries
/// are labelled as unknown
pub fn decode_uds(payload: &ByteSequence) -> UdsMessage {
    let service_id = payload[0];
    if service_id == NEGATIVE_RESPONSE_SID {
        return decode_negative_response(payload);
    }

    let direction = if ServiceFlags::from_bits_retain(service_id).contains(ServiceFlags::POSITIVE_RESPONSE) {
        Direction::PositiveResponse
    } else {
        Direction::Request
    };
    let base = service_id & !RESPONSE_BIT;
    let decoded = match services::lookup_service(base) {
        Some(info) => params::decode_parameters(info, direction, &payload[1..]),
        None => {
            debug!("Service 0x{base:02X} is not in the dictionary, leaving parameters uninterpreted");
            params::DecodedParameters::raw(&payload[1..])
        }
    };
    debug!(
        "UDS {direction} 0x{service_id:02X}, {} fields, {} extra bytes",
        decoded.fields.len(),
        decoded.extra_data.len()
    );

    UdsMessage {
        service_id,
        direction,
        sub_function: decoded.sub_function,
        requested_service: None,
        nrc: None,
        data_identifiers: decoded.data_identifiers,
        fields: decoded.fields,
        extra_data: decoded.extra_data,
        payload: payload.clone(),
    }
}

/// Renders the extra data of a message, cut at `max` bytes with a `+N more` suffix
pub fn format_extra_data(data: &[u8], max: usize) -> String {
    if data.len() <= max {
        return to_hex_string(data);
    }
    let shown = to_hex_string(&data[..max]);
    let more = data.len() - max;
    if shown.is_empty() {
        format!("+{more} more")
    } else {
        format!("{shown} (+{more} more)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uds(b: &[u8]) -> UdsMessage {
        decode_uds(&ByteSequence::from_slice(b).unwrap())
    }

    #[test]
    fn negative_response() {
        let msg = uds(&[0x7F, 0x22, 0x31]);
        assert_eq!(msg.direction, Direction::NegativeResponse);
        assert_eq!(msg.requested_service, Some(0x22));
        assert_eq!(msg.service_name(), "ReadDataByIdentifier");
        assert_eq!(msg.nrc_info().unwrap().name, "RequestOutOfRange");
        assert_eq!(msg.confidence(), Confidence::Exact);
    }

    #[test]
    fn incomplete_negative_response() {
        let msg = uds(&[0x7F]);
        assert_eq!(msg.direction, Direction::Incomplete);
        assert!(msg.requested_service.is_none());
        assert!(msg.nrc.is_none());
        assert_eq!(msg.confidence(), Confidence::Unknown);

        let msg = uds(&[0x7F, 0x22]);
        assert_eq!(msg.direction, Direction::Incomplete);
        assert_eq!(msg.requested_service, Some(0x22));
        assert!(msg.nrc.is_none());
        assert_eq!(msg.confidence(), Confidence::Partial);
    }

    #[test]
    fn unknown_nrc() {
        let msg = uds(&[0x7F, 0x22, 0x40]);
        assert_eq!(msg.direction, Direction::NegativeResponse);
        assert!(msg.nrc_info().is_none());
        assert_eq!(msg.confidence(), Confidence::Partial);
        assert!(msg.fields.iter().any(|f| f.value.contains("Unknown NRC")));
    }

    #[test]
    fn positive_session_response() {
        let msg = uds(&[0x50, 0x03]);
        assert_eq!(msg.direction, Direction::PositiveResponse);
        assert_eq!(msg.base_service(), Some(0x10));
        assert_eq!(msg.sub_function_value(), Some(0x03));
        assert_eq!(msg.sub_function_meaning().unwrap(), "Extended Diagnostic Session");
        assert_eq!(msg.confidence(), Confidence::Exact);
    }

    #[test]
    fn suppressed_tester_present() {
        let msg = uds(&[0x3E, 0x80]);
        assert_eq!(msg.sub_function_value(), Some(0x00));
        assert!(msg.suppress_positive_response());
        assert!(msg.interpretation().contains("positive response suppressed"));
    }

    #[test]
    fn unlisted_sub_function() {
        let msg = uds(&[0x10, 0x60]);
        assert_eq!(msg.sub_function_meaning().unwrap(), "Custom/Unlisted sub-function 0x60");
        assert_eq!(msg.confidence(), Confidence::Partial);
    }

    #[test]
    fn unknown_service() {
        let msg = uds(&[0xBA, 0x01, 0x02]);
        assert_eq!(msg.service_name(), UNKNOWN_SERVICE);
        assert!(msg.sub_function.is_none());
        assert_eq!(msg.extra_data, vec![0x01, 0x02]);
        assert_eq!(msg.confidence(), Confidence::Unknown);
        assert!(
            msg.interpretation()
                .contains("(not defined by ISO14229, system supplier specific range)")
        );
    }

    #[test]
    fn extra_data_display() {
        let data: Vec<u8> = (0..10).collect();
        assert_eq!(format_extra_data(&data, 8), "00 01 02 03 04 05 06 07 (+2 more)");
        assert_eq!(format_extra_data(&data[..2], 8), "00 01");
        assert_eq!(format_extra_data(&data[..2], 0), "+2 more");
    }
}

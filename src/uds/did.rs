//! Standardised UDS data identifiers (ISO14229-1 Annex C)

use std::{collections::HashMap, sync::LazyLock};

/// Static description of a data identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DidInfo {
    /// 16 bit identifier
    pub did: u16,
    /// Identifier name
    pub name: &'static str,
    /// The record is a printable ASCII string
    pub ascii: bool,
}

const fn did(did: u16, name: &'static str, ascii: bool) -> DidInfo {
    DidInfo { did, name, ascii }
}

const DIDS: &[DidInfo] = &[
    did(0xF180, "Boot Software Identification", false),
    did(0xF181, "Application Software Identification", false),
    did(0xF182, "Application Data Identification", false),
    did(0xF183, "Boot Software Fingerprint", false),
    did(0xF184, "Application Software Fingerprint", false),
    did(0xF185, "Application Data Fingerprint", false),
    did(0xF186, "Active Diagnostic Session", false),
    did(0xF187, "Vehicle Manufacturer Spare Part Number", true),
    did(0xF188, "Vehicle Manufacturer ECU Software Number", true),
    did(0xF189, "Vehicle Manufacturer ECU Software Version Number", true),
    did(0xF18A, "System Supplier Identifier", true),
    did(0xF18B, "ECU Manufacturing Date", false),
    did(0xF18C, "ECU Serial Number", true),
    did(0xF18D, "Supported Functional Units", false),
    did(0xF18E, "Vehicle Manufacturer Kit Assembly Part Number", true),
    did(0xF190, "VIN", true),
    did(0xF191, "Vehicle Manufacturer ECU Hardware Number", true),
    did(0xF192, "System Supplier ECU Hardware Number", true),
    did(0xF193, "System Supplier ECU Hardware Version Number", true),
    did(0xF194, "System Supplier ECU Software Number", true),
    did(0xF195, "System Supplier ECU Software Version Number", true),
    did(0xF196, "Exhaust Regulation Or Type Approval Number", true),
    did(0xF197, "System Name Or Engine Type", true),
    did(0xF198, "Repair Shop Code Or Tester Serial Number", true),
    did(0xF199, "Programming Date", false),
    did(0xF19A, "Calibration Repair Shop Code Or Calibration Equipment Serial Number", true),
    did(0xF19B, "Calibration Date", false),
    did(0xF19C, "Calibration Equipment Software Number", true),
    did(0xF19D, "ECU Installation Date", false),
    did(0xF19E, "ODX File", true),
    did(0xF19F, "Entity", false),
    did(0xFF00, "UDS Version", false),
];

static DID_TABLE: LazyLock<HashMap<u16, &'static DidInfo>> = LazyLock::new(|| DIDS.iter().map(|d| (d.did, d)).collect());

/// Looks up a data identifier
pub fn lookup_did(did: u16) -> Option<&'static DidInfo> {
    DID_TABLE.get(&did).copied()
}

/// Returns the name of a data identifier
pub fn did_name(did: u16) -> Option<&'static str> {
    lookup_did(did).map(|d| d.name)
}

/// Describes the range an unlisted data identifier falls into
pub fn did_range_note(did: u16) -> Option<&'static str> {
    match did {
        0x0100..=0xA5FF | 0xA800..=0xACFF | 0xB000..=0xB1FF | 0xC000..=0xC2FF | 0xCF00..=0xEFFF | 0xF010..=0xF0FF => {
            Some("vehicle manufacturer specific range")
        }
        0xF100..=0xF17F | 0xF1A0..=0xF1EF => Some("vehicle manufacturer specific identification range"),
        0xF200..=0xF2FF => Some("periodic data identifier range"),
        0xF300..=0xF3FF => Some("dynamically defined data identifier range"),
        0xF400..=0xF8FF => Some("OBD data identifier range"),
        0xFD00..=0xFEFF => Some("system supplier specific range"),
        _ => None,
    }
}

/// Returns the text of a DID record if every byte is printable ASCII
pub fn ascii_record(data: &[u8]) -> Option<String> {
    if data.is_empty() || !data.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return None;
    }
    Some(data.iter().map(|b| *b as char).collect())
}

//! Module for common Diagnostic trouble code data

use bitflags::bitflags;

/// Length of a DTC and status record in a ReadDTCInformation response
pub const DTC_RECORD_LEN: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// DTC name interpretation format specifier
pub enum DTCFormatType {
    /// ISO15031-6 DTC Format
    ISO15031_6,
    /// ISO14229-1 DTC Format
    ISO14229_1,
    /// SAEJ1939-73 DTC Format
    SAEJ1939_73,
    /// ISO11992-4 DTC Format
    ISO11992_4,
    /// Unknown DTC Format
    UNKNOWN(u8),
}

impl std::fmt::Display for DTCFormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ISO15031_6 => f.write_str("ISO15031-6"),
            Self::ISO14229_1 => f.write_str("ISO14229-1"),
            Self::SAEJ1939_73 => f.write_str("SAEJ1939-73"),
            Self::ISO11992_4 => f.write_str("ISO11992-4"),
            Self::UNKNOWN(x) => write!(f, "Unknown format (0x{x:02X})"),
        }
    }
}

impl From<u8> for DTCFormatType {
    fn from(fmt: u8) -> Self {
        match fmt {
            0x00 => Self::ISO15031_6,
            0x01 => Self::ISO14229_1,
            0x02 => Self::SAEJ1939_73,
            0x03 => Self::ISO11992_4,
            x => Self::UNKNOWN(x),
        }
    }
}

bitflags! {
    /// UDS DTC status byte (ISO14229-1 D.2)
    #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct DtcStatusMask: u8 {
        /// Most recent test result was a failure
        const TEST_FAILED = 0b0000_0001;
        /// Test failed during the current operation cycle
        const TEST_FAILED_THIS_OPERATION_CYCLE = 0b0000_0010;
        /// Test failed during the current or last completed operation cycle
        const PENDING_DTC = 0b0000_0100;
        /// Failure was confirmed and stored
        const CONFIRMED_DTC = 0b0000_1000;
        /// Test has not completed since DTCs were last cleared
        const TEST_NOT_COMPLETED_SINCE_LAST_CLEAR = 0b0001_0000;
        /// Test failed at least once since DTCs were last cleared
        const TEST_FAILED_SINCE_LAST_CLEAR = 0b0010_0000;
        /// Test has not completed during the current operation cycle
        const TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE = 0b0100_0000;
        /// ECU requests the warning indicator (MIL) to be on
        const WARNING_INDICATOR_REQUESTED = 0b1000_0000;
    }
}

impl DtcStatusMask {
    /// Lists the set bits by name, or "none" if the mask is empty
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "none".into();
        }
        self.iter_names().map(|(name, _)| name).collect::<Vec<_>>().join(", ")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Storage state of the DTC
pub enum DTCStatus {
    /// No DTC is stored in non volatile memory
    None,
    /// DTC has not met criteria for it to become active or stored,
    /// but a failure condition has been met
    Pending,
    /// DTC is no longer present, but is stored in non volatile memory
    Stored,
    /// DTC is present and stored in non volatile memory
    Active,
}

impl DTCStatus {
    /// Derives the storage state from a UDS status byte
    pub fn from_uds_status(mask: DtcStatusMask) -> Self {
        if mask.contains(DtcStatusMask::CONFIRMED_DTC) {
            if mask.contains(DtcStatusMask::TEST_FAILED) {
                Self::Active
            } else {
                Self::Stored
            }
        } else if mask.contains(DtcStatusMask::PENDING_DTC) {
            Self::Pending
        } else {
            Self::None
        }
    }
}

/// Diagnostic trouble code (DTC) storage struct
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DTC {
    /// The raw 24 bit value of the DTC according to the ECU
    pub raw: u32,
    /// Status byte reported alongside the DTC
    pub status_mask: DtcStatusMask,
    /// Storage state of the DTC
    pub status: DTCStatus,
    /// Indication if the DTC turns on the MIL lamp (Malfunction indicator lamp).
    /// This usually means that the Check engine light is illuminated on the
    /// vehicles instrument cluster
    pub mil_on: bool,
    /// Indication if the DTC test has completed since the last clear.
    pub readiness_flag: bool,
}

impl DTC {
    /// Creates a DTC from its 24 bit value and UDS status byte
    pub fn new(raw: u32, status: u8) -> Self {
        let status_mask = DtcStatusMask::from_bits_retain(status);
        Self {
            raw: raw & 0x00FF_FFFF,
            status_mask,
            status: DTCStatus::from_uds_status(status_mask),
            mil_on: status_mask.contains(DtcStatusMask::WARNING_INDICATOR_REQUESTED),
            readiness_flag: !status_mask.contains(DtcStatusMask::TEST_NOT_COMPLETED_SINCE_LAST_CLEAR),
        }
    }

    /// Reads a DTC record (3 byte DTC + status byte). Returns None if fewer than 4 bytes are supplied
    pub fn from_record(record: &[u8]) -> Option<Self> {
        match record {
            [hi, mid, lo, status, ..] => Some(Self::new(dtc_value(*hi, *mid, *lo), *status)),
            _ => None,
        }
    }

    /// Returns the ISO15031-6 name of the DTC, for example `P0301-00`
    /// (The trailing byte is the failure type)
    pub fn name(&self) -> String {
        dtc_name(self.raw)
    }
}

/// Joins 3 DTC bytes into a 24 bit value
pub fn dtc_value(hi: u8, mid: u8, lo: u8) -> u32 {
    ((hi as u32) << 16) | ((mid as u32) << 8) | lo as u32
}

/// Renders a 24 bit DTC value in ISO15031-6 form (`P0301-00`)
pub fn dtc_name(raw: u32) -> String {
    let hi = (raw >> 16) as u8;
    let system = match hi >> 6 {
        0b00 => 'P',
        0b01 => 'C',
        0b10 => 'B',
        _ => 'U',
    };
    format!(
        "{system}{}{:X}{:02X}-{:02X}",
        (hi >> 4) & 0x03,
        hi & 0x0F,
        (raw >> 8) as u8,
        raw as u8
    )
}

/// Splits a list of DTC records. Returns the DTCs and any trailing bytes that
/// do not form a complete record
pub fn parse_dtc_records(data: &[u8]) -> (Vec<DTC>, &[u8]) {
    let chunks = data.chunks_exact(DTC_RECORD_LEN);
    let remainder = chunks.remainder();
    (chunks.filter_map(DTC::from_record).collect(), remainder)
}

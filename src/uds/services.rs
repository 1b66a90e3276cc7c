//! UDS service and sub-function dictionaries (ISO14229-1)

use std::{borrow::Cow, collections::HashMap, sync::LazyLock};

use automotive_diag::{ByteWrapper, uds::UdsCommandByte};

/// Functional unit a UDS service belongs to
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
pub enum ServiceCategory {
    /// Session, reset, security, communication and timing management
    #[strum(serialize = "Diagnostic and Communication Management")]
    DiagnosticAndCommunicationManagement,
    /// Reading and writing data identifiers and memory
    #[strum(serialize = "Data Transmission")]
    DataTransmission,
    /// Reading and clearing stored DTCs
    #[strum(serialize = "Stored Data Transmission")]
    StoredDataTransmission,
    /// Overriding ECU inputs and outputs
    #[strum(serialize = "Input/Output Control")]
    InputOutputControl,
    /// Starting, stopping and querying ECU routines
    #[strum(serialize = "Remote Activation of Routine")]
    RemoteActivationOfRoutine,
    /// Flashing and data transfer
    #[strum(serialize = "Upload/Download")]
    UploadDownload,
}

/// How the bytes after the service ID are laid out
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamLayout {
    /// Byte 1 is a sub-function (Bit 7 = suppress positive response)
    SubFunction,
    /// Bytes 1-2 (and further pairs for reading) are data identifiers
    DataIdentifier,
    /// Sub-function followed by a 16 bit routine identifier
    Routine,
    /// 24 bit group of DTCs
    DtcGroup,
    /// addressAndLengthFormatIdentifier, memory address and memory size
    Memory,
    /// dataFormatIdentifier followed by a [ParamLayout::Memory] block
    Transfer,
    /// 8 bit block sequence counter
    BlockSequence,
    /// Parameters are shown as raw bytes
    Raw,
}

/// Static description of a UDS service
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Request service ID
    pub sid: u8,
    /// Service name
    pub name: &'static str,
    /// Functional unit
    pub category: ServiceCategory,
    /// Layout of the parameters following the SID
    pub layout: ParamLayout,
}

const fn svc(sid: u8, name: &'static str, category: ServiceCategory, layout: ParamLayout) -> ServiceInfo {
    ServiceInfo {
        sid,
        name,
        category,
        layout,
    }
}

use ParamLayout::*;
use ServiceCategory::*;

const SERVICES: &[ServiceInfo] = &[
    svc(0x10, "DiagnosticSessionControl", DiagnosticAndCommunicationManagement, SubFunction),
    svc(0x11, "ECUReset", DiagnosticAndCommunicationManagement, SubFunction),
    svc(0x14, "ClearDiagnosticInformation", StoredDataTransmission, DtcGroup),
    svc(0x19, "ReadDTCInformation", StoredDataTransmission, SubFunction),
    svc(0x22, "ReadDataByIdentifier", DataTransmission, DataIdentifier),
    svc(0x23, "ReadMemoryByAddress", DataTransmission, Memory),
    svc(0x24, "ReadScalingDataByIdentifier", DataTransmission, DataIdentifier),
    svc(0x27, "SecurityAccess", DiagnosticAndCommunicationManagement, SubFunction),
    svc(0x28, "CommunicationControl", DiagnosticAndCommunicationManagement, SubFunction),
    svc(0x29, "Authentication", DiagnosticAndCommunicationManagement, SubFunction),
    svc(0x2A, "ReadDataByPeriodicIdentifier", DataTransmission, Raw),
    svc(0x2C, "DynamicallyDefineDataIdentifier", DataTransmission, SubFunction),
    svc(0x2E, "WriteDataByIdentifier", DataTransmission, DataIdentifier),
    svc(0x2F, "InputOutputControlByIdentifier", InputOutputControl, DataIdentifier),
    svc(0x31, "RoutineControl", RemoteActivationOfRoutine, Routine),
    svc(0x34, "RequestDownload", UploadDownload, Transfer),
    svc(0x35, "RequestUpload", UploadDownload, Transfer),
    svc(0x36, "TransferData", UploadDownload, BlockSequence),
    svc(0x37, "RequestTransferExit", UploadDownload, Raw),
    svc(0x38, "RequestFileTransfer", UploadDownload, Raw),
    svc(0x3D, "WriteMemoryByAddress", DataTransmission, Memory),
    svc(0x3E, "TesterPresent", DiagnosticAndCommunicationManagement, SubFunction),
    svc(0x83, "AccessTimingParameter", DiagnosticAndCommunicationManagement, SubFunction),
    svc(0x84, "SecuredDataTransmission", DiagnosticAndCommunicationManagement, Raw),
    svc(0x85, "ControlDTCSetting", DiagnosticAndCommunicationManagement, SubFunction),
    svc(0x86, "ResponseOnEvent", DiagnosticAndCommunicationManagement, SubFunction),
    svc(0x87, "LinkControl", DiagnosticAndCommunicationManagement, SubFunction),
];

static SERVICE_TABLE: LazyLock<HashMap<u8, &'static ServiceInfo>> =
    LazyLock::new(|| SERVICES.iter().map(|s| (s.sid, s)).collect());

const SUB_FUNCTIONS: &[((u8, u8), &str)] = &[
    // DiagnosticSessionControl
    ((0x10, 0x01), "Default Session"),
    ((0x10, 0x02), "Programming Session"),
    ((0x10, 0x03), "Extended Diagnostic Session"),
    ((0x10, 0x04), "Safety System Diagnostic Session"),
    // ECUReset
    ((0x11, 0x01), "Hard Reset"),
    ((0x11, 0x02), "Key Off On Reset"),
    ((0x11, 0x03), "Soft Reset"),
    ((0x11, 0x04), "Enable Rapid Power Shutdown"),
    ((0x11, 0x05), "Disable Rapid Power Shutdown"),
    // ReadDTCInformation
    ((0x19, 0x01), "Report Number Of DTC By Status Mask"),
    ((0x19, 0x02), "Report DTC By Status Mask"),
    ((0x19, 0x03), "Report DTC Snapshot Identification"),
    ((0x19, 0x04), "Report DTC Snapshot Record By DTC Number"),
    ((0x19, 0x05), "Report DTC Stored Data By Record Number"),
    ((0x19, 0x06), "Report DTC Extended Data Record By DTC Number"),
    ((0x19, 0x07), "Report Number Of DTC By Severity Mask Record"),
    ((0x19, 0x08), "Report DTC By Severity Mask Record"),
    ((0x19, 0x09), "Report Severity Information Of DTC"),
    ((0x19, 0x0A), "Report Supported DTC"),
    ((0x19, 0x0B), "Report First Test Failed DTC"),
    ((0x19, 0x0C), "Report First Confirmed DTC"),
    ((0x19, 0x0D), "Report Most Recent Test Failed DTC"),
    ((0x19, 0x0E), "Report Most Recent Confirmed DTC"),
    ((0x19, 0x0F), "Report Mirror Memory DTC By Status Mask"),
    ((0x19, 0x10), "Report Mirror Memory DTC Extended Data Record By DTC Number"),
    ((0x19, 0x11), "Report Number Of Mirror Memory DTC By Status Mask"),
    ((0x19, 0x12), "Report Number Of Emissions OBD DTC By Status Mask"),
    ((0x19, 0x13), "Report Emissions OBD DTC By Status Mask"),
    ((0x19, 0x14), "Report DTC Fault Detection Counter"),
    ((0x19, 0x15), "Report DTC With Permanent Status"),
    // CommunicationControl
    ((0x28, 0x00), "Enable Rx And Tx"),
    ((0x28, 0x01), "Enable Rx And Disable Tx"),
    ((0x28, 0x02), "Disable Rx And Enable Tx"),
    ((0x28, 0x03), "Disable Rx And Tx"),
    ((0x28, 0x04), "Enable Rx And Disable Tx With Enhanced Address Information"),
    ((0x28, 0x05), "Enable Rx And Tx With Enhanced Address Information"),
    // Authentication
    ((0x29, 0x00), "De-authenticate"),
    ((0x29, 0x01), "Verify Certificate Unidirectional"),
    ((0x29, 0x02), "Verify Certificate Bidirectional"),
    ((0x29, 0x03), "Proof Of Ownership"),
    ((0x29, 0x04), "Transmit Certificate"),
    ((0x29, 0x05), "Request Challenge For Authentication"),
    ((0x29, 0x06), "Verify Proof Of Ownership Unidirectional"),
    ((0x29, 0x07), "Verify Proof Of Ownership Bidirectional"),
    ((0x29, 0x08), "Authentication Configuration"),
    // DynamicallyDefineDataIdentifier
    ((0x2C, 0x01), "Define By Identifier"),
    ((0x2C, 0x02), "Define By Memory Address"),
    ((0x2C, 0x03), "Clear Dynamically Defined Data Identifier"),
    // RoutineControl
    ((0x31, 0x01), "Start Routine"),
    ((0x31, 0x02), "Stop Routine"),
    ((0x31, 0x03), "Request Routine Results"),
    // TesterPresent
    ((0x3E, 0x00), "Zero Sub-function"),
    // AccessTimingParameter
    ((0x83, 0x01), "Read Extended Timing Parameter Set"),
    ((0x83, 0x02), "Set Timing Parameters To Default Values"),
    ((0x83, 0x03), "Read Currently Active Timing Parameters"),
    ((0x83, 0x04), "Set Timing Parameters To Given Values"),
    // ControlDTCSetting
    ((0x85, 0x01), "DTC Setting On"),
    ((0x85, 0x02), "DTC Setting Off"),
    // ResponseOnEvent
    ((0x86, 0x00), "Stop Response On Event"),
    ((0x86, 0x01), "On DTC Status Change"),
    ((0x86, 0x02), "On Timer Interrupt"),
    ((0x86, 0x03), "On Change Of Data Identifier"),
    ((0x86, 0x04), "Report Activated Events"),
    ((0x86, 0x05), "Start Response On Event"),
    ((0x86, 0x06), "Clear Response On Event"),
    ((0x86, 0x07), "On Comparison Of Values"),
    // LinkControl
    ((0x87, 0x01), "Verify Mode Transition With Fixed Parameter"),
    ((0x87, 0x02), "Verify Mode Transition With Specific Parameter"),
    ((0x87, 0x03), "Transition Mode"),
];

static SUB_FUNCTION_TABLE: LazyLock<HashMap<(u8, u8), &'static str>> =
    LazyLock::new(|| SUB_FUNCTIONS.iter().copied().collect());

const ROUTINES: &[(u16, &str)] = &[
    (0x0202, "Check Memory"),
    (0x0203, "Check Programming Preconditions"),
    (0xE200, "Execute Service Provider Loader"),
    (0xFF00, "Erase Memory"),
    (0xFF01, "Check Programming Dependencies"),
    (0xFF02, "Erase Mirror Memory DTCs"),
];

static ROUTINE_TABLE: LazyLock<HashMap<u16, &'static str>> = LazyLock::new(|| ROUTINES.iter().copied().collect());

/// Looks up a request service ID (Response bit cleared)
pub fn lookup_service(sid: u8) -> Option<&'static ServiceInfo> {
    SERVICE_TABLE.get(&sid).copied()
}

/// Returns the name of a request service ID
pub fn service_name(sid: u8) -> Option<&'static str> {
    lookup_service(sid).map(|s| s.name)
}

/// Returns the functional unit of a request service ID
pub fn service_category(sid: u8) -> Option<ServiceCategory> {
    lookup_service(sid).map(|s| s.category)
}

/// Returns true if the service ID is one of the standardised ISO14229 requests
pub fn is_iso_standard_service(sid: u8) -> bool {
    matches!(UdsCommandByte::from(sid), ByteWrapper::Standard(_))
}

/// Describes the reserved range an unlisted service ID falls into.
/// The range never gives the service a meaning, it only says who may define one
pub fn service_range_note(sid: u8) -> Option<&'static str> {
    match sid {
        0x00..=0x0F => Some("OBD (ISO 15031-5) service range"),
        0x80..=0x82 => Some("ISO 14229 reserved range"),
        0xA0..=0xB9 => Some("reserved for future definition"),
        0xBA..=0xBE => Some("system supplier specific range"),
        _ => None,
    }
}

fn security_access_meaning(value: u8) -> Option<Cow<'static, str>> {
    match value {
        0x01..=0x42 if value % 2 == 1 => Some(Cow::Owned(format!("Request Seed (Level {})", value.div_ceil(2)))),
        0x01..=0x42 => Some(Cow::Owned(format!("Send Key (Level {})", value / 2))),
        _ => None,
    }
}

/// Returns the meaning of a sub-function (Suppress positive response bit already cleared)
/// for the given request service ID
pub fn sub_function_meaning(sid: u8, value: u8) -> Option<Cow<'static, str>> {
    if sid == 0x27 {
        return security_access_meaning(value);
    }
    SUB_FUNCTION_TABLE.get(&(sid, value)).map(|s| Cow::Borrowed(*s))
}

/// Returns the name of a standardised routine identifier
pub fn routine_name(rid: u16) -> Option<&'static str> {
    ROUTINE_TABLE.get(&rid).copied()
}

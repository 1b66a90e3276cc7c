//! UDS negative response codes (NRC)
//!
//! Each known NRC has a short name, a description of what the ECU is saying,
//! and the action a technician would normally take next.

use std::{collections::HashMap, sync::LazyLock};

use automotive_diag::{ByteWrapper, uds::UdsErrorByte};

/// Static description of a negative response code
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NrcInfo {
    /// Raw NRC byte
    pub code: u8,
    /// Short name
    pub name: &'static str,
    /// What the ECU is reporting
    pub description: &'static str,
    /// Recommended next step
    pub action: &'static str,
}

const fn nrc(code: u8, name: &'static str, description: &'static str, action: &'static str) -> NrcInfo {
    NrcInfo {
        code,
        name,
        description,
        action,
    }
}

const NRCS: &[NrcInfo] = &[
    nrc(0x10, "GeneralReject", "The ECU rejected the request without giving a more specific reason", "Check the request against the ECU's diagnostic description and retry"),
    nrc(0x11, "ServiceNotSupported", "The ECU does not implement the requested service", "Use a service the ECU supports, or check the target address"),
    nrc(0x12, "SubFunctionNotSupported", "The ECU does not implement the requested sub-function", "Check the sub-function value against the ECU's diagnostic description"),
    nrc(0x13, "IncorrectMessageLengthOrInvalidFormat", "The request length or format is not what the ECU expected", "Check the request length and parameter layout"),
    nrc(0x14, "ResponseTooLong", "The response would exceed the transport protocol's maximum length", "Request less data at once (Fewer identifiers or a smaller memory block)"),
    nrc(0x21, "BusyRepeatRequest", "The ECU is temporarily busy and cannot process the request", "Repeat the request after a short delay"),
    nrc(0x22, "ConditionsNotCorrect", "The ECU's prerequisite conditions for this request are not met", "Check vehicle state (Ignition, engine, speed, session) and retry"),
    nrc(0x24, "RequestSequenceError", "The request was sent out of the expected order", "Send the prerequisite request first (For example request a seed before sending a key)"),
    nrc(0x25, "NoResponseFromSubnetComponent", "A component behind the ECU did not respond in time", "Check the sub-network component and its wiring"),
    nrc(0x26, "FailurePreventsExecutionOfRequestedAction", "A stored fault prevents the ECU from performing the request", "Read and resolve the ECU's DTCs, then retry"),
    nrc(0x31, "RequestOutOfRange", "A parameter in the request (Identifier, address or value) is outside the range the ECU accepts", "Check the identifier or parameter value is supported by this ECU"),
    nrc(0x33, "SecurityAccessDenied", "The request requires an unlocked security level", "Unlock the ECU with SecurityAccess (0x27) first"),
    nrc(0x35, "InvalidKey", "The key sent to the ECU does not match the expected value", "Recalculate the key from the seed for the correct security level"),
    nrc(0x36, "ExceedNumberOfAttempts", "Too many invalid keys were sent", "Wait for the security delay to expire before trying again"),
    nrc(0x37, "RequiredTimeDelayNotExpired", "A new seed was requested before the security delay expired", "Wait for the delay timer to expire (Often after a power cycle)"),
    nrc(0x70, "UploadDownloadNotAccepted", "The ECU refused the upload or download request", "Check memory address, size and data format, and that the ECU is in programming session"),
    nrc(0x71, "TransferDataSuspended", "A data transfer was halted by the ECU", "Restart the transfer from RequestDownload / RequestUpload"),
    nrc(0x72, "GeneralProgrammingFailure", "The ECU failed while erasing or programming memory", "Repeat the programming sequence and check supply voltage"),
    nrc(0x73, "WrongBlockSequenceCounter", "The TransferData block sequence counter was not the expected value", "Resend the block with the correct sequence counter"),
    nrc(0x78, "RequestCorrectlyReceivedResponsePending", "The ECU accepted the request but needs more time to respond", "Keep waiting for the final response (Not an error)"),
    nrc(0x7E, "SubFunctionNotSupportedInActiveSession", "The sub-function is not available in the current diagnostic session", "Switch to the required session with DiagnosticSessionControl (0x10)"),
    nrc(0x7F, "ServiceNotSupportedInActiveSession", "The service is not available in the current diagnostic session", "Switch to the required session with DiagnosticSessionControl (0x10)"),
    nrc(0x81, "RpmTooHigh", "Engine speed is above the limit for this request", "Reduce engine speed and retry"),
    nrc(0x82, "RpmTooLow", "Engine speed is below the limit for this request", "Increase engine speed and retry"),
    nrc(0x83, "EngineIsRunning", "The request cannot be performed while the engine is running", "Stop the engine and retry"),
    nrc(0x84, "EngineIsNotRunning", "The request requires the engine to be running", "Start the engine and retry"),
    nrc(0x85, "EngineRunTimeTooLow", "The engine has not been running for long enough", "Let the engine run longer and retry"),
    nrc(0x86, "TemperatureTooHigh", "Temperature is above the limit for this request", "Let the system cool down and retry"),
    nrc(0x87, "TemperatureTooLow", "Temperature is below the limit for this request", "Let the system warm up and retry"),
    nrc(0x88, "VehicleSpeedTooHigh", "Vehicle speed is above the limit for this request", "Bring the vehicle to a stop and retry"),
    nrc(0x89, "VehicleSpeedTooLow", "Vehicle speed is below the limit for this request", "Increase vehicle speed and retry"),
    nrc(0x8A, "ThrottleTooHigh", "Throttle / pedal position is above the limit for this request", "Release the throttle pedal and retry"),
    nrc(0x8B, "ThrottleTooLow", "Throttle / pedal position is below the limit for this request", "Press the throttle pedal and retry"),
    nrc(0x8C, "TransmissionRangeNotInNeutral", "The transmission is not in neutral", "Shift to neutral and retry"),
    nrc(0x8D, "TransmissionRangeNotInGear", "The transmission is not in gear", "Select a gear and retry"),
    nrc(0x8F, "BrakeSwitchNotClosed", "The brake pedal is not applied", "Apply the brake pedal and retry"),
    nrc(0x90, "ShifterLeverNotInPark", "The shifter lever is not in park", "Shift to park and retry"),
    nrc(0x91, "TorqueConverterClutchLocked", "The torque converter clutch is locked", "Unlock the torque converter clutch and retry"),
    nrc(0x92, "VoltageTooHigh", "Supply voltage is above the limit for this request", "Check the battery / charger voltage and retry"),
    nrc(0x93, "VoltageTooLow", "Supply voltage is below the limit for this request", "Connect a battery support unit and retry"),
];

static NRC_TABLE: LazyLock<HashMap<u8, &'static NrcInfo>> = LazyLock::new(|| NRCS.iter().map(|n| (n.code, n)).collect());

/// Looks up a negative response code
pub fn lookup_nrc(code: u8) -> Option<&'static NrcInfo> {
    NRC_TABLE.get(&code).copied()
}

/// Returns the description of a negative response code
pub fn nrc_description(code: u8) -> Option<&'static str> {
    lookup_nrc(code).map(|n| n.description)
}

/// Returns the recommended action for a negative response code
pub fn nrc_recommended_action(code: u8) -> Option<&'static str> {
    lookup_nrc(code).map(|n| n.action)
}

/// Returns an iterator over every known NRC byte
pub fn known_nrcs() -> impl Iterator<Item = u8> {
    NRCS.iter().map(|n| n.code)
}

/// Returns true if the NRC is one of the standardised ISO14229 codes
pub fn is_iso_standard_nrc(code: u8) -> bool {
    matches!(UdsErrorByte::from(code), ByteWrapper::Standard(_))
}

/// Describes the reserved range an unlisted NRC falls into
pub fn nrc_range_note(code: u8) -> Option<&'static str> {
    match code {
        0x38..=0x4F => Some("reserved by extended data link security"),
        0x94..=0xFE => Some("reserved for specific conditions not correct"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nrc_table_has_no_duplicates() {
        assert_eq!(NRC_TABLE.len(), NRCS.len());
    }

    #[test]
    fn every_nrc_has_text() {
        for code in known_nrcs() {
            let info = lookup_nrc(code).unwrap();
            assert!(!info.name.is_empty());
            assert!(!info.description.is_empty());
            assert!(!info.action.is_empty());
        }
    }

    #[test]
    fn nrc_lookup() {
        assert_eq!(lookup_nrc(0x31).unwrap().name, "RequestOutOfRange");
        assert!(nrc_description(0x23).is_none());
        assert_eq!(nrc_range_note(0x40), Some("reserved by extended data link security"));
        assert!(is_iso_standard_nrc(0x31));
    }
}

//! Built in self test table
//!
//! Runs known captures through the whole pipeline and compares the rendered report
//! (or error) against the expected text.

use log::{info, warn};

use crate::decoder::Decoder;

/// What the output of a self test must look like
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Expectation {
    /// The output must contain this text
    Contains(&'static str),
    /// The output must equal this text
    Exact(&'static str),
}

impl Expectation {
    /// Checks the output against the expectation
    pub fn is_met_by(&self, actual: &str) -> bool {
        match self {
            Self::Contains(s) => actual.contains(s),
            Self::Exact(s) => actual == *s,
        }
    }
}

impl std::fmt::Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contains(s) => write!(f, "contains \"{s}\""),
            Self::Exact(s) => write!(f, "equals \"{s}\""),
        }
    }
}

/// Outcome of a single self test
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TestResult {
    /// Test name
    pub name: &'static str,
    /// Input lines, one per frame
    pub input: String,
    /// Expected output
    pub expected: Expectation,
    /// Rendered report, or the error message
    pub actual: String,
    /// True if the output met the expectation
    pub passed: bool,
}

struct SelfTest {
    name: &'static str,
    lines: &'static [&'static str],
    expected: Expectation,
}

const SELF_TESTS: &[SelfTest] = &[
    SelfTest {
        name: "Negative response",
        lines: &["7F 22 31"],
        expected: Expectation::Contains("NRC: 0x31 (RequestOutOfRange)"),
    },
    SelfTest {
        name: "Read VIN request in a single frame",
        lines: &["03 22 F1 90"],
        expected: Expectation::Contains("Data Identifier: 0xF190 (VIN)"),
    },
    SelfTest {
        name: "Positive session control response",
        lines: &["50 03"],
        expected: Expectation::Contains("Sub-function: 0x03 (Extended Diagnostic Session)"),
    },
    SelfTest {
        name: "Negative response behind a CAN header",
        lines: &["00 00 07 D8 7F 22 31"],
        expected: Expectation::Contains("CAN ID: 0x07D8"),
    },
    SelfTest {
        name: "Odd length hex",
        lines: &["7F2"],
        expected: Expectation::Exact("parse error: hex input has an odd number of digits: '7F2'"),
    },
    SelfTest {
        name: "Multi frame VIN response",
        lines: &[
            "10 14 62 F1 90 57 30 4C",
            "21 30 30 30 30 35 31 54",
            "22 32 31 32 33 34 35 36",
        ],
        expected: Expectation::Contains("ASCII: \"W0L000051T2123456\""),
    },
    SelfTest {
        name: "Multi frame sequence gap",
        lines: &["10 14 62 F1 90 57 30 4C", "22 32 31 32 33 34 35 36"],
        expected: Expectation::Contains("expected consecutive frame sequence number 1, found 2"),
    },
    SelfTest {
        name: "Suppressed tester present",
        lines: &["3E 80"],
        expected: Expectation::Contains("Suppress Positive Response: yes"),
    },
    SelfTest {
        name: "DTC report",
        lines: &["59 02 FF 03 01 00 09"],
        expected: Expectation::Contains("P0301-00 (Active"),
    },
    SelfTest {
        name: "Unknown proprietary service",
        lines: &["BA 01 02"],
        expected: Expectation::Contains("Confidence: Unknown"),
    },
    SelfTest {
        name: "Incomplete negative response",
        lines: &["7F 22"],
        expected: Expectation::Contains("Incomplete Negative Response"),
    },
    SelfTest {
        name: "Binary input",
        lines: &["01111111 00100010 00110001"],
        expected: Expectation::Contains("Input Format: Binary"),
    },
    SelfTest {
        name: "Decimal CSV input",
        lines: &["127,34,49"],
        expected: Expectation::Contains("NRC: 0x31 (RequestOutOfRange)"),
    },
    SelfTest {
        name: "Empty input",
        lines: &["   "],
        expected: Expectation::Exact("parse error: input is empty"),
    },
];

/// Runs the built in self test table with the default decoder
pub fn run_self_tests() -> Vec<TestResult> {
    let decoder = Decoder::default();
    let results: Vec<TestResult> = SELF_TESTS
        .iter()
        .map(|test| {
            let actual = match decoder.decode_frames(test.lines) {
                Ok(report) => report.to_string(),
                Err(e) => e.to_string(),
            };
            let passed = test.expected.is_met_by(&actual);
            if !passed {
                warn!("Self test '{}' failed", test.name);
            }
            TestResult {
                name: test.name,
                input: test.lines.join("\n"),
                expected: test.expected,
                actual,
                passed,
            }
        })
        .collect();
    info!(
        "{}/{} self tests passed",
        results.iter().filter(|r| r.passed).count(),
        results.len()
    );
    results
}

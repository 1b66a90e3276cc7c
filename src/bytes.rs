//! Byte-string parsing
//!
//! Converts the textual representations found in captured logs (separated hex, continuous hex,
//! `0x` prefixed hex, decimal CSV, binary, Base64) into an owned [ByteSequence].
//!
//! Classification is first-match-wins, in this order:
//! 1. Binary (`0`/`1` only, multiple of 8 digits)
//! 2. Hexadecimal (even number of hex digits)
//! 3. Decimal CSV (`127,34,49`)
//! 4. Base64 (standard alphabet, mostly letters)
//! 5. ASCII text (raw UTF-8 bytes)

use std::ops::Deref;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::debug;

/// Result of parsing a byte string
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
/// Error produced when a text string cannot be converted into bytes
pub enum ParseError {
    /// Input was empty or only whitespace
    #[error("input is empty")]
    Empty,
    /// Hex string has an odd number of digits
    #[error("hex input has an odd number of digits: '{fragment}'")]
    OddLength {
        /// Offending input (separators removed)
        fragment: String,
    },
    /// A character outside the hex alphabet appeared in hex-like input
    #[error("invalid digit '{digit}' in '{fragment}'")]
    InvalidDigit {
        /// The offending character
        digit: char,
        /// Token the character was found in
        fragment: String,
    },
}

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Textual format the input was recognised as
pub enum InputFormat {
    /// Hex digits, with or without separators
    Hexadecimal,
    /// Groups of 8 binary digits
    Binary,
    /// Standard alphabet Base64
    Base64,
    /// Comma separated decimal values (0-255)
    #[strum(serialize = "Decimal CSV")]
    DecimalCsv,
    /// Could not be recognised as encoded bytes, taken as raw text
    #[strum(serialize = "ASCII Text")]
    AsciiText,
    /// Hexadecimal input whose payload looks like a UDS message
    #[strum(serialize = "Hexadecimal (UDS likely)")]
    UdsLikely,
}

/// An ordered, non-empty sequence of bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ByteSequence(Vec<u8>);

impl ByteSequence {
    /// Creates a new byte sequence. Returns [ParseError::Empty] if `bytes` is empty
    pub fn new(bytes: Vec<u8>) -> ParseResult<Self> {
        if bytes.is_empty() {
            Err(ParseError::Empty)
        } else {
            Ok(Self(bytes))
        }
    }

    /// Copies a slice into a new byte sequence
    pub fn from_slice(bytes: &[u8]) -> ParseResult<Self> {
        Self::new(bytes.to_vec())
    }

    /// Returns the bytes as a slice
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the sequence, returning the underlying buffer
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Formats the sequence as uppercase, space separated hex
    pub fn to_hex_string(&self) -> String {
        to_hex_string(&self.0)
    }
}

impl Deref for ByteSequence {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for ByteSequence {
    type Error = ParseError;

    fn try_from(value: Vec<u8>) -> ParseResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<&[u8]> for ByteSequence {
    type Error = ParseError;

    fn try_from(value: &[u8]) -> ParseResult<Self> {
        Self::from_slice(value)
    }
}

impl std::fmt::Display for ByteSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex_string())
    }
}

/// Formats bytes as uppercase hex pairs separated by a single space
pub fn to_hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | ':' | ',')
}

fn strip_hex_prefix(token: &str) -> &str {
    token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token)
}

/// Splits the input into tokens, removing separators and `0x` prefixes
fn tokenize(raw: &str) -> Vec<&str> {
    raw.split(is_separator)
        .filter(|t| !t.is_empty())
        .map(strip_hex_prefix)
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_binary(raw: &str, tokens: &[&str], stripped: &str) -> Option<Vec<u8>> {
    if stripped.len() < 8 || stripped.len() % 8 != 0 {
        return None;
    }
    if !stripped.chars().all(|c| c == '0' || c == '1') {
        return None;
    }
    // Spaced input must be grouped per byte, otherwise "10 10 10 10" would be read as bits
    if tokens.len() > 1 && tokens.iter().any(|t| t.len() != 8) {
        return None;
    }
    if raw.contains("0x") || raw.contains("0X") {
        return None;
    }
    stripped
        .as_bytes()
        .chunks(8)
        .map(|chunk| {
            let s = std::str::from_utf8(chunk).ok()?;
            u8::from_str_radix(s, 2).ok()
        })
        .collect()
}

fn parse_hex(raw: &str, tokens: &[&str], stripped: &str) -> Option<Vec<u8>> {
    if stripped.is_empty() || stripped.len() % 2 != 0 {
        return None;
    }
    if !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    if raw.contains(',') && tokens.iter().any(|t| t.len() != 2) {
        return None;
    }
    hex::decode(stripped).ok()
}

fn parse_decimal_csv(raw: &str) -> Option<Vec<u8>> {
    if !raw.contains(',') {
        return None;
    }
    let tokens: Vec<&str> = raw.split(',').map(str::trim).collect();
    if tokens.iter().any(|t| t.is_empty() || !t.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    if tokens.iter().all(|t| t.len() == 2) {
        return None;
    }
    tokens.iter().map(|t| t.parse::<u8>().ok()).collect()
}

fn parse_base64(raw: &str) -> Option<Vec<u8>> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() || compact.len() % 4 != 0 {
        return None;
    }
    let letters = compact.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if letters * 2 <= compact.len() {
        return None;
    }
    let decoded = STANDARD.decode(compact.as_bytes()).ok()?;
    if STANDARD.encode(&decoded) != compact {
        return None;
    }
    Some(decoded)
}

fn looks_like_hex(raw: &str, tokens: &[&str]) -> bool {
    let prefixed = raw
        .split(is_separator)
        .any(|t| t.starts_with("0x") || t.starts_with("0X"));
    prefixed || (tokens.len() > 1 && tokens.iter().all(|t| t.len() <= 2))
}

/// Parses a textual byte representation into a [ByteSequence], returning the
/// format it was recognised as.
///
/// ## Example
/// ```
/// use diag_decoder::bytes::{parse, InputFormat};
///
/// let (bytes, format) = parse("7F 22 31").unwrap();
/// assert_eq!(bytes.as_slice(), &[0x7F, 0x22, 0x31]);
/// assert_eq!(format, InputFormat::Hexadecimal);
/// ```
pub fn parse(raw: &str) -> ParseResult<(ByteSequence, InputFormat)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ParseError::Empty);
    }
    let tokens = tokenize(raw);
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let stripped: String = tokens.concat();

    let (bytes, format) = if let Some(b) = parse_binary(raw, &tokens, &stripped) {
        (b, InputFormat::Binary)
    } else if let Some(b) = parse_hex(raw, &tokens, &stripped) {
        (b, InputFormat::Hexadecimal)
    } else if let Some(b) = parse_decimal_csv(raw) {
        (b, InputFormat::DecimalCsv)
    } else if let Some(b) = parse_base64(raw) {
        (b, InputFormat::Base64)
    } else if stripped.len() % 2 == 1 && stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ParseError::OddLength { fragment: stripped });
    } else if looks_like_hex(raw, &tokens) {
        // At least one token holds a non-hex character here
        let (digit, fragment) = tokens
            .iter()
            .find_map(|t| t.chars().find(|c| !c.is_ascii_hexdigit()).map(|c| (c, t.to_string())))
            .unwrap_or(('?', stripped.clone()));
        return Err(ParseError::InvalidDigit { digit, fragment });
    } else {
        (raw.as_bytes().to_vec(), InputFormat::AsciiText)
    };
    debug!("Parsed {} bytes as {format}", bytes.len());
    Ok((ByteSequence::new(bytes)?, format))
}

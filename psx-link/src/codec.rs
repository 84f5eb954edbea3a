//! Codec for PSX "Q-lines".
//!
//! Every line on the wire is plain ASCII terminated by CRLF. A write is
//! `<code>=<value>`, a demand (read-back request) is `Q=<code>=?`. Replies are
//! pushed by PSX whenever it feels like it and carry no framing besides the
//! line terminator, so [`decode_demand_reply`] has to scan whatever text was
//! collected for the value.

use std::{
    fmt::{
        Debug,
        Display,
    },
    str::FromStr,
};

/// Line terminator used by PSX.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Pounds per kilogram, as used by the PSX payload fields.
pub const LBS_PER_KG: f64 = 2.2046226;

/// A PSX variable, e.g. `Qi132`.
///
/// The letter after `Q` is the variable family (`i` integer, `s` string, ...)
/// and the number is the protocol-fixed variable index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterCode {
    family: u8,
    number: u16,
}

impl RegisterCode {
    /// Zero-fuel weight in pounds.
    pub const ZERO_FUEL_WEIGHT: Self = Self::integer(123);
    /// Main electrical system register (external power, shore breaker).
    pub const POWER: Self = Self::integer(132);
    /// External bleed air / air-conditioning register.
    pub const AIR: Self = Self::integer(174);
    /// Door control request.
    pub const DOOR_CONTROL: Self = Self::integer(179);
    /// Door open bits.
    pub const DOORS_OPEN: Self = Self::integer(180);
    /// Door manual-mode bits.
    pub const DOORS_MANUAL: Self = Self::integer(181);
    /// Ground-services pushback command.
    pub const PUSHBACK: Self = Self::integer(191);
    /// Prefuel entry.
    pub const PREFUEL: Self = Self::integer(220);
    /// Fuel tank payload.
    pub const FUEL_TANKS: Self = Self::string(438);
    /// Fuel preselect payload.
    pub const FUEL_PRESELECT: Self = Self::string(439);

    pub const fn new(family: u8, number: u16) -> Self {
        assert!(family.is_ascii_lowercase(), "register family must be a lowercase letter");
        Self { family, number }
    }

    pub const fn integer(number: u16) -> Self {
        Self::new(b'i', number)
    }

    pub const fn string(number: u16) -> Self {
        Self::new(b's', number)
    }

    pub fn family(&self) -> char {
        self.family as char
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn is_integer(&self) -> bool {
        self.family == b'i'
    }
}

impl Display for RegisterCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}{}", self.family as char, self.number)
    }
}

impl Debug for RegisterCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegisterCode({self})")
    }
}

impl FromStr for RegisterCode {
    type Err = RegisterCodeFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || {
            RegisterCodeFromStrError {
                input: s.to_owned(),
            }
        };

        let bytes = s.as_bytes();
        if bytes.len() < 3 || !bytes[0].eq_ignore_ascii_case(&b'Q') {
            return Err(err());
        }

        let family = bytes[1].to_ascii_lowercase();
        if !family.is_ascii_lowercase() || !bytes[2..].iter().all(u8::is_ascii_digit) {
            return Err(err());
        }

        let number = s[2..].parse().map_err(|_| err())?;
        Ok(Self { family, number })
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("Invalid register code: {input}")]
pub struct RegisterCodeFromStrError {
    pub input: String,
}

/// Value written to a register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterValue {
    Integer(u32),
    Text(String),
}

impl RegisterValue {
    /// Free-form value, as used by the `Qs` payload variables.
    ///
    /// Line breaks would split the command into several lines and are
    /// rejected.
    pub fn text(value: impl Into<String>) -> Result<Self, EncodeError> {
        let value = value.into();
        if value.contains(['\r', '\n']) {
            Err(EncodeError::LineBreak)
        }
        else if value.is_empty() {
            Err(EncodeError::Empty)
        }
        else {
            Ok(Self::Text(value))
        }
    }
}

impl From<u32> for RegisterValue {
    fn from(value: u32) -> Self {
        Self::Integer(value)
    }
}

impl Display for RegisterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("register value must not contain line breaks")]
    LineBreak,
    #[error("register value must not be empty")]
    Empty,
}

/// A single CRLF-terminated line, ready to be written to the socket.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WireLine(String);

impl WireLine {
    /// Wraps a line given by a user, e.g. on the diagnostic send path.
    ///
    /// Any trailing `\n` or `\r\n` is normalized to CRLF. Returns `None` for
    /// empty lines.
    pub fn from_raw(line: &str) -> Option<Self> {
        let line = line
            .strip_suffix('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .unwrap_or(line);
        if line.is_empty() {
            None
        }
        else {
            Some(Self(format!("{line}{LINE_TERMINATOR}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The line without its terminator.
    pub fn content(&self) -> &str {
        &self.0[..self.0.len() - LINE_TERMINATOR.len()]
    }
}

impl Display for WireLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.content())
    }
}

impl Debug for WireLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WireLine({:?})", self.content())
    }
}

/// `<code>=<value>\r\n`
pub fn encode_command(code: RegisterCode, value: &RegisterValue) -> WireLine {
    WireLine(format!("{code}={value}{LINE_TERMINATOR}"))
}

/// `Q=<code>=?\r\n`
pub fn encode_demand(code: RegisterCode) -> WireLine {
    WireLine(format!("Q={code}=?{LINE_TERMINATOR}"))
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("PSX reply contains no numeric value")]
    NoNumericToken,
    #[error("PSX reply value {token} does not fit into 32 bits")]
    Overflow { token: String },
}

/// Extracts the value of `code` from a demand reply.
///
/// The grammar is:
///
/// ```text
/// reply     := ... (qualified | bare) ...
/// qualified := <code> separator+ integer
/// bare      := integer           (not part of another register code)
/// integer   := ['-'] digits
/// separator := any non-alphanumeric character
/// ```
///
/// The code-qualified form wins wherever it appears. The first bare integer
/// is the fallback, because PSX does not always echo the code. Digit runs that
/// belong to a register code (`Qi174`) are never taken as a value.
///
/// PSX integers are signed 32 bit. Negative values are returned as their bit
/// pattern, so `-1` is `0xffff_ffff`.
pub fn decode_demand_reply(raw: &str, code: RegisterCode) -> Result<u32, DecodeError> {
    let code = code.to_string();
    let bytes = raw.as_bytes();

    let mut search_from = 0;
    while let Some(offset) = find_ignore_ascii_case(&bytes[search_from..], code.as_bytes()) {
        let start = search_from + offset;
        search_from = start + 1;

        if is_inside_code(bytes, start, code.len()) {
            continue;
        }

        let mut pos = start + code.len();
        let separators_start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_alphanumeric() {
            pos += 1;
        }

        if pos > separators_start && bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            let end = digit_run_end(bytes, pos);
            return parse_token(&raw[sign_start(bytes, pos)..end]);
        }
    }

    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos].is_ascii_digit() {
            let end = digit_run_end(bytes, pos);
            if !is_code_number(bytes, pos) {
                return parse_token(&raw[sign_start(bytes, pos)..end]);
            }
            pos = end;
        }
        else {
            pos += 1;
        }
    }

    Err(DecodeError::NoNumericToken)
}

/// Includes a minus sign right before the digit run at `pos`.
fn sign_start(bytes: &[u8], pos: usize) -> usize {
    if pos > 0 && bytes[pos - 1] == b'-' {
        pos - 1
    }
    else {
        pos
    }
}

fn parse_token(token: &str) -> Result<u32, DecodeError> {
    // an integer token can only fail to parse by overflowing
    let result = if token.starts_with('-') {
        token.parse::<i32>().map(|value| value as u32)
    }
    else {
        token.parse::<u32>()
    };

    result.map_err(|_| {
        DecodeError::Overflow {
            token: token.to_owned(),
        }
    })
}

fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

fn digit_run_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| !b.is_ascii_digit())
        .map_or(bytes.len(), |n| start + n)
}

/// Whether the digit run starting at `pos` is the number of a register code.
fn is_code_number(bytes: &[u8], pos: usize) -> bool {
    pos >= 2 && bytes[pos - 1].is_ascii_alphabetic() && bytes[pos - 2].eq_ignore_ascii_case(&b'Q')
}

/// Whether a code match at `start` is really part of a longer token, e.g.
/// `Qi132` inside `Qi1320` or `XQi132`.
fn is_inside_code(bytes: &[u8], start: usize, len: usize) -> bool {
    let preceded = start > 0 && bytes[start - 1].is_ascii_alphanumeric();
    let continued = bytes.get(start + len).is_some_and(u8::is_ascii_digit);
    preceded || continued
}

/// Converts kilograms to whole pounds.
pub fn kg_to_lbs(kg: f64) -> f64 {
    (kg * LBS_PER_KG).round()
}

/// Formats a quantity with one implied decimal digit and the decimal point
/// removed: `1234.5` becomes `"12345"`, `0` becomes `"00"`.
pub fn to_tenth_string(value: f64) -> String {
    // adding 0.0 turns -0.0 into 0.0
    let rounded = (value * 10.0).round() / 10.0 + 0.0;
    format!("{rounded:.1}").replace('.', "")
}

#[cfg(test)]
mod tests {
    use crate::codec::{
        DecodeError,
        RegisterCode,
        RegisterValue,
        WireLine,
        decode_demand_reply,
        encode_command,
        encode_demand,
        kg_to_lbs,
        to_tenth_string,
    };

    #[test]
    fn it_encodes_commands_and_demands() {
        let line = encode_command(RegisterCode::POWER, &RegisterValue::Integer(134217728));
        assert_eq!(line.as_str(), "Qi132=134217728\r\n");

        let line = encode_command(
            RegisterCode::FUEL_PRESELECT,
            &RegisterValue::text("1;2;3;").unwrap(),
        );
        assert_eq!(line.as_str(), "Qs439=1;2;3;\r\n");

        assert_eq!(encode_demand(RegisterCode::POWER).as_str(), "Q=Qi132=?\r\n");
    }

    #[test]
    fn text_values_reject_line_breaks() {
        assert!(RegisterValue::text("a\r\nQi132=0").is_err());
        assert!(RegisterValue::text("").is_err());
    }

    #[test]
    fn it_parses_register_codes() {
        assert_eq!("Qi132".parse::<RegisterCode>().unwrap(), RegisterCode::POWER);
        assert_eq!("qS438".parse::<RegisterCode>().unwrap(), RegisterCode::FUEL_TANKS);
        assert!("Q132".parse::<RegisterCode>().is_err());
        assert!("Qi".parse::<RegisterCode>().is_err());
        assert!("Xi132".parse::<RegisterCode>().is_err());
        assert!("Qi99999".parse::<RegisterCode>().is_err());
    }

    #[test]
    fn raw_lines_are_crlf_terminated() {
        assert_eq!(WireLine::from_raw("Qi191=198123").unwrap().as_str(), "Qi191=198123\r\n");
        assert_eq!(WireLine::from_raw("Qi191=198123\n").unwrap().as_str(), "Qi191=198123\r\n");
        assert_eq!(WireLine::from_raw("Qi191=198123\r\n").unwrap().as_str(), "Qi191=198123\r\n");
        assert!(WireLine::from_raw("").is_none());
        assert!(WireLine::from_raw("\r\n").is_none());
    }

    #[test]
    fn it_decodes_the_code_qualified_form() {
        assert_eq!(decode_demand_reply("Qi132=134217728", RegisterCode::POWER), Ok(134217728));
        assert_eq!(
            decode_demand_reply("Qi174=3\r\nQi132=9\r\n", RegisterCode::POWER),
            Ok(9)
        );
        assert_eq!(decode_demand_reply("qi132: 77", RegisterCode::POWER), Ok(77));
        assert_eq!(decode_demand_reply("Qi132=-1", RegisterCode::POWER), Ok(u32::MAX));
        assert_eq!(
            decode_demand_reply("Qi132=-2147483647", RegisterCode::POWER),
            Ok(0x8000_0001)
        );
        assert_eq!(
            decode_demand_reply("Qi132=-2147483648", RegisterCode::POWER),
            Ok(0x8000_0000)
        );
    }

    #[test]
    fn it_falls_back_to_the_first_bare_integer() {
        assert_eq!(decode_demand_reply("garbage 42 noise", RegisterCode::POWER), Ok(42));
        assert_eq!(decode_demand_reply("value -3\r\n", RegisterCode::POWER), Ok(-3i32 as u32));
        assert_eq!(decode_demand_reply("Qi174=-2", RegisterCode::POWER), Ok(-2i32 as u32));
    }

    #[test]
    fn it_fails_without_digits() {
        assert_eq!(
            decode_demand_reply("no numbers here", RegisterCode::POWER),
            Err(DecodeError::NoNumericToken)
        );
        assert_eq!(decode_demand_reply("", RegisterCode::POWER), Err(DecodeError::NoNumericToken));
    }

    #[test]
    fn code_numbers_are_not_values() {
        // an echoed demand alone carries no value
        assert_eq!(
            decode_demand_reply("Q=Qi132=?", RegisterCode::POWER),
            Err(DecodeError::NoNumericToken)
        );
        // a longer code sharing the prefix is not a match
        assert_eq!(decode_demand_reply("Qi1320=5", RegisterCode::POWER), Ok(5));
        assert_eq!(decode_demand_reply("Qi1320=5 Qi132=6", RegisterCode::POWER), Ok(6));
    }

    #[test]
    fn it_rejects_values_wider_than_32_bits() {
        assert!(matches!(
            decode_demand_reply("Qi132=4294967296", RegisterCode::POWER),
            Err(DecodeError::Overflow { .. })
        ));
        assert_eq!(decode_demand_reply("Qi132=4294967295", RegisterCode::POWER), Ok(u32::MAX));
        assert!(matches!(
            decode_demand_reply("Qi132=-2147483649", RegisterCode::POWER),
            Err(DecodeError::Overflow { .. })
        ));
    }

    #[test]
    fn it_formats_tenth_strings() {
        assert_eq!(to_tenth_string(1234.5), "12345");
        assert_eq!(to_tenth_string(1234.0), "12340");
        assert_eq!(to_tenth_string(0.0), "00");
        assert_eq!(to_tenth_string(2.25), "23");
        assert_eq!(to_tenth_string(-0.01), "00");
    }

    #[test]
    fn it_converts_kilograms_to_pounds() {
        assert_eq!(kg_to_lbs(1000.0), 2205.0);
        assert_eq!(kg_to_lbs(0.0), 0.0);
    }
}

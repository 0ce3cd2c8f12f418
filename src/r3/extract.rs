//! Regex-based typed extraction from an R3 ASCII response payload.
//!
//! Mirrors the `R3::get<Type>` / `R3::get_hex<Type>` / `R3::get_position`
//! template family in `examples/original_source/include/r3.h`, split into
//! one function per concrete type since Rust has no analogous template
//! specialization story. Uses `regex::Regex::captures` for
//! `PartialMatch`-style typed capture extraction, per spec §9 "Regex
//! engine".

use regex::Regex;

use crate::error::R3Error;

fn first_capture<'a>(payload: &'a str, pattern: &Regex) -> Result<&'a str, R3Error> {
    pattern
        .captures(payload)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| R3Error::NoMatch(pattern.as_str().to_string()))
}

pub fn extract_string(payload: &str, pattern: &Regex) -> Result<String, R3Error> {
    Ok(first_capture(payload, pattern)?.to_string())
}

/// Double/Float: first capture parsed as floating point; an empty string
/// (not a non-match — a literal empty capture) parses as zero.
pub fn extract_f64(payload: &str, pattern: &Regex) -> Result<f64, R3Error> {
    let text = first_capture(payload, pattern)?;
    if text.is_empty() {
        return Ok(0.0);
    }
    text.parse().map_err(|_| R3Error::NoMatch(pattern.as_str().to_string()))
}

pub fn extract_f32(payload: &str, pattern: &Regex) -> Result<f32, R3Error> {
    Ok(extract_f64(payload, pattern)? as f32)
}

pub fn extract_i64(payload: &str, pattern: &Regex) -> Result<i64, R3Error> {
    let text = first_capture(payload, pattern)?;
    text.parse().map_err(|_| R3Error::NoMatch(pattern.as_str().to_string()))
}

pub fn extract_u64(payload: &str, pattern: &Regex) -> Result<u64, R3Error> {
    let text = first_capture(payload, pattern)?;
    text.parse().map_err(|_| R3Error::NoMatch(pattern.as_str().to_string()))
}

pub fn extract_i32(payload: &str, pattern: &Regex) -> Result<i32, R3Error> {
    Ok(extract_i64(payload, pattern)? as i32)
}

pub fn extract_u32(payload: &str, pattern: &Regex) -> Result<u32, R3Error> {
    Ok(extract_u64(payload, pattern)? as u32)
}

/// `HexInt32` and friends: first capture parsed in base 16.
pub fn extract_hex_i64(payload: &str, pattern: &Regex) -> Result<i64, R3Error> {
    let text = first_capture(payload, pattern)?;
    i64::from_str_radix(text.trim_start_matches("0x").trim_start_matches("0X"), 16)
        .map_err(|_| R3Error::NoMatch(pattern.as_str().to_string()))
}

pub fn extract_hex_i32(payload: &str, pattern: &Regex) -> Result<i32, R3Error> {
    Ok(extract_hex_i64(payload, pattern)? as i32)
}

/// `Bool` with an empty match pattern: success iff the payload is
/// non-empty and its first byte is non-zero.
pub fn extract_bool_presence(payload: &str) -> bool {
    payload.as_bytes().first().is_some_and(|&b| b != 0)
}

/// `Bool` with a non-empty match pattern: parse as `HexInt32`, return bit
/// `position`.
pub fn extract_bool_bit(payload: &str, pattern: &Regex, position: u32) -> Result<bool, R3Error> {
    let value = extract_hex_i64(payload, pattern)?;
    Ok((value >> position) & 1 != 0)
}

fn parse_leading_f64(s: &str) -> (f64, usize) {
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut seen_digit = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        seen_digit = true;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            seen_digit = true;
        }
    }
    if !seen_digit {
        return (0.0, 0);
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let mut has_exp_digit = false;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
            has_exp_digit = true;
        }
        if has_exp_digit {
            i = j;
        }
    }
    let value: f64 = s[..i].parse().unwrap_or(0.0);
    (value, i)
}

/// Parse a `(a,b,c,...)` tuple, optionally followed by a trailing
/// `(fl1,fl2)` group that always lands in the last two slots, per
/// `R3::get_position`.
pub fn extract_tuple<const N: usize>(payload: &str) -> [f64; N] {
    let mut array = [0.0f64; N];
    let open = match payload.find('(') {
        Some(p) => p + 1,
        None => return array,
    };
    let mut start = open;
    let mut index = 0usize;
    while start < payload.len() {
        let (value, consumed) = parse_leading_f64(&payload[start..]);
        if consumed == 0 {
            break;
        }
        if index < N {
            array[index] = value;
        }
        let delim_pos = start + consumed;
        let delim = payload.as_bytes().get(delim_pos).copied();
        start = delim_pos + 1;
        match delim {
            Some(b',') => index += 1,
            Some(b')') => {
                index = N.saturating_sub(2);
                start += 1;
            }
            _ => break,
        }
        if index >= N {
            break;
        }
    }
    array
}

pub fn extract_position(payload: &str) -> [f64; 10] {
    extract_tuple::<10>(payload)
}

pub fn extract_joint(payload: &str) -> [f64; 8] {
    extract_tuple::<8>(payload)
}

/// One `Enum` binding case: a response-matching regex, its display label,
/// and its numeric value.
#[derive(Debug, Clone)]
pub struct EnumCase {
    pub pattern: String,
    pub label: String,
    pub value: i64,
}

/// Resolve an `Enum` binding: the first case (in declared order) whose
/// pattern matches the payload wins; `default` is used iff nothing else
/// matched, per spec §4.3.
pub fn resolve_enum(
    payload: &str,
    cases: &[EnumCase],
    default: &EnumCase,
) -> Result<(String, i64), R3Error> {
    for case in cases {
        let re = Regex::new(&case.pattern).map_err(|_| R3Error::NoMatch(case.pattern.clone()))?;
        if re.is_match(payload) {
            return Ok((case.label.clone(), case.value));
        }
    }
    Ok((default.label.clone(), default.value))
}

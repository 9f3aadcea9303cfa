//! Human-readable size grammar.
//!
//! Parses strings like `"512 MiB"` or `"1.5GB"` into byte counts. SI units
//! are powers of 1000, IEC units powers of 1024, bare numbers are bytes.
//! Used by the `/api/verify/humansize` endpoint and by configuration
//! validation of folder cache sizes.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizeParseError {
    #[error("empty size string")]
    Empty,
    #[error("invalid number in size string: {0:?}")]
    InvalidNumber(String),
    #[error("unknown size unit: {0:?}")]
    UnknownUnit(String),
    #[error("size out of range: {0:?}")]
    OutOfRange(String),
}

/// Parses a human-readable size into a byte count.
///
/// # Errors
///
/// Returns a [`SizeParseError`] when the input does not match the grammar.
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SizeParseError::Empty);
    }

    let unit_start = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(trimmed.len());
    let (number_part, unit_part) = trimmed.split_at(unit_start);

    // Thousands separators are tolerated, as in "1,024 MiB".
    let number: f64 = number_part
        .replace(',', "")
        .parse()
        .map_err(|_| SizeParseError::InvalidNumber(number_part.to_string()))?;

    let multiplier = unit_multiplier(unit_part.trim())?;

    #[expect(
        clippy::cast_precision_loss,
        reason = "cache sizes are far below the 2^53 precision limit"
    )]
    let (bytes, max) = (number * multiplier as f64, u64::MAX as f64);
    if !bytes.is_finite() || bytes < 0.0 || bytes > max {
        return Err(SizeParseError::OutOfRange(trimmed.to_string()));
    }
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "range checked above"
    )]
    let bytes = bytes as u64;
    Ok(bytes)
}

fn unit_multiplier(unit: &str) -> Result<u64, SizeParseError> {
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" | "k" => 1_000,
        "mb" | "m" => 1_000_000,
        "gb" | "g" => 1_000_000_000,
        "tb" | "t" => 1_000_000_000_000,
        "pb" | "p" => 1_000_000_000_000_000,
        "kib" | "ki" => 1 << 10,
        "mib" | "mi" => 1 << 20,
        "gib" | "gi" => 1 << 30,
        "tib" | "ti" => 1 << 40,
        "pib" | "pi" => 1 << 50,
        _ => return Err(SizeParseError::UnknownUnit(unit.to_string())),
    };
    Ok(multiplier)
}

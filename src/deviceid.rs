//! Device identity.
//!
//! A device is identified by the SHA-256 digest of its peer certificate,
//! rendered as unpadded base32 in dash-separated groups of seven characters.
//! Parsing is deliberately forgiving about case, separators, and the usual
//! base32 confusables (`0`/`O`, `1`/`I`, `8`/`B`) so IDs survive being read
//! aloud or retyped.

use core::fmt;
use core::str::FromStr;

use data_encoding::BASE32_NOPAD;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

const ID_BYTES: usize = 32;
/// Unpadded base32 length of a 32-byte identifier.
const ID_CHARS: usize = 52;
const GROUP_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId([u8; ID_BYTES]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("device ID has wrong length: expected {ID_CHARS} base32 characters, got {0}")]
    WrongLength(usize),
    #[error("device ID contains invalid base32: {0}")]
    InvalidEncoding(String),
}

impl DeviceId {
    /// Derives the device ID from a certificate in DER form.
    pub fn from_cert_der(der: &[u8]) -> Self {
        let digest = Sha256::digest(der);
        Self(digest.into())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = BASE32_NOPAD.encode(&self.0);
        for (i, chunk) in encoded.as_bytes().chunks(GROUP_LEN).enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            f.write_str(core::str::from_utf8(chunk).map_err(|_| fmt::Error)?)?;
        }
        Ok(())
    }
}

impl FromStr for DeviceId {
    type Err = DeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .map(|c| match c.to_ascii_uppercase() {
                '0' => 'O',
                '1' => 'I',
                '8' => 'B',
                upper => upper,
            })
            .collect();

        if cleaned.len() != ID_CHARS {
            return Err(DeviceIdError::WrongLength(cleaned.len()));
        }

        let decoded = BASE32_NOPAD
            .decode(cleaned.as_bytes())
            .map_err(|e| DeviceIdError::InvalidEncoding(e.to_string()))?;
        let bytes: [u8; ID_BYTES] = decoded
            .try_into()
            .map_err(|_| DeviceIdError::WrongLength(cleaned.len()))?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeviceId {
        DeviceId::from_cert_der(b"certificate bytes")
    }

    #[test]
    fn display_parse_round_trip() {
        let id = sample();
        let rendered = id.to_string();
        assert_eq!(rendered.parse::<DeviceId>().unwrap(), id);
    }

    #[test]
    fn display_is_grouped() {
        let rendered = sample().to_string();
        let groups: Vec<&str> = rendered.split('-').collect();
        assert_eq!(groups.len(), 8);
        for group in &groups[..7] {
            assert_eq!(group.len(), GROUP_LEN);
        }
    }

    #[test]
    fn parse_tolerates_case_and_separators() {
        let id = sample();
        let sloppy = id.to_string().to_lowercase().replace('-', " ");
        assert_eq!(sloppy.parse::<DeviceId>().unwrap(), id);
    }

    #[test]
    fn parse_maps_confusables() {
        let id = sample();
        let confusable = id.to_string().replace('O', "0").replace('I', "1");
        assert_eq!(confusable.parse::<DeviceId>().unwrap(), id);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            "ABC".parse::<DeviceId>(),
            Err(DeviceIdError::WrongLength(3))
        );
    }

    #[test]
    fn rejects_invalid_alphabet() {
        let bad = "!".repeat(ID_CHARS);
        assert!(matches!(
            bad.parse::<DeviceId>(),
            Err(DeviceIdError::InvalidEncoding(_))
        ));
    }
}

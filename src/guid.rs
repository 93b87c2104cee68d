//! Interface identifiers - 128-bit GUIDs in native layout
//!
//! Layout matches the platform `GUID` struct so a `*const Guid` can be
//! handed straight to a foreign QueryInterface slot.

use crate::error::InteropError;
use core::fmt;
use core::str::FromStr;

/// 128-bit interface identifier
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Identity interface every foreign-compatible object answers to
pub const IID_IUNKNOWN: Guid = Guid::from_u128(0x00000000_0000_0000_c000_000000000046);

impl Guid {
    /// All-zero identifier
    pub const fn zeroed() -> Self {
        Self {
            data1: 0,
            data2: 0,
            data3: 0,
            data4: [0; 8],
        }
    }

    /// Build from the big-endian textual order (`0x00000000_0000_0000_c000_000000000046`)
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    pub const fn to_u128(self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }

    /// Parse `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, optionally wrapped in braces
    pub fn parse(text: &str) -> Result<Self, InteropError> {
        let invalid = || InteropError::InvalidGuid(text.to_string());

        let trimmed = text.trim();
        let body = match (trimmed.strip_prefix('{'), trimmed.strip_suffix('}')) {
            (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
            (None, None) => trimmed,
            _ => return Err(invalid()),
        };

        let groups: Vec<&str> = body.split('-').collect();
        let expected = [8, 4, 4, 4, 12];
        if groups.len() != expected.len()
            || groups.iter().zip(expected).any(|(group, len)| group.len() != len)
        {
            return Err(invalid());
        }

        let hex: String = groups.concat();
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        u128::from_str_radix(&hex, 16)
            .map(Self::from_u128)
            .map_err(|_| invalid())
    }
}

impl FromStr for Guid {
    type Err = InteropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iunknown_layout() {
        assert_eq!(IID_IUNKNOWN.data1, 0);
        assert_eq!(IID_IUNKNOWN.data4, [0xC0, 0, 0, 0, 0, 0, 0, 0x46]);
        assert_eq!(core::mem::size_of::<Guid>(), 16);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            IID_IUNKNOWN.to_string(),
            "00000000-0000-0000-C000-000000000046"
        );
    }

    #[test]
    fn test_parse_with_and_without_braces() {
        let plain = Guid::parse("0c733a30-2a1c-11ce-ade5-00aa0044773d").unwrap();
        let braced: Guid = "{0C733A30-2A1C-11CE-ADE5-00AA0044773D}".parse().unwrap();
        assert_eq!(plain, braced);
        assert_eq!(plain.data1, 0x0c73_3a30);
        assert_eq!(plain.data2, 0x2a1c);
        assert_eq!(plain.data3, 0x11ce);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in [
            "",
            "0c733a30-2a1c-11ce-ade5",
            "{0c733a30-2a1c-11ce-ade5-00aa0044773d",
            "0c733a30-2a1c-11ce-ade5-00aa0044773g",
            "0c733a302a1c11ceade500aa0044773d",
            "+c733a30-2a1c-11ce-ade5-00aa0044773d",
        ] {
            assert!(
                matches!(Guid::parse(text), Err(InteropError::InvalidGuid(_))),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_u128_conversion() {
        let value = 0x0c733a30_2a1c_11ce_ade5_00aa0044773d_u128;
        assert_eq!(Guid::from_u128(value).to_u128(), value);
        assert_eq!(Guid::zeroed(), Guid::default());
    }
}

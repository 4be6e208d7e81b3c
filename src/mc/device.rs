//! MC device codes and the address grammar (`"D100"`, `"M0"`).
use crate::error::{Error, Result};
use crate::value::ElementType;
use std::fmt;
use std::str::FromStr;

/// Largest start address that fits the six decimal digits of an ASCII frame.
pub const MAX_OFFSET: u32 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    /// Data register.
    D,
    /// Internal relay.
    M,
    /// Input.
    X,
    /// Output.
    Y,
    /// Latch relay.
    L,
    /// Annunciator.
    F,
    V,
    /// Link relay.
    B,
    /// Link register.
    W,
    /// File register.
    R,
    /// Index register.
    Z,
}

impl Device {
    fn from_letters(letters: &str) -> Option<Self> {
        let device = match letters.to_ascii_uppercase().as_str() {
            "D" => Device::D,
            "M" => Device::M,
            "X" => Device::X,
            "Y" => Device::Y,
            "L" => Device::L,
            "F" => Device::F,
            "V" => Device::V,
            "B" => Device::B,
            "W" => Device::W,
            "R" => Device::R,
            "Z" => Device::Z,
            _ => return None,
        };
        Some(device)
    }

    /// Two character device code of ASCII frames.
    pub fn ascii_code(self) -> &'static str {
        match self {
            Device::D => "D*",
            Device::M => "M*",
            Device::X => "X*",
            Device::Y => "Y*",
            Device::L => "L*",
            Device::F => "F*",
            Device::V => "V*",
            Device::B => "B*",
            Device::W => "W*",
            Device::R => "R*",
            Device::Z => "Z*",
        }
    }

    /// One byte device code of binary frames.
    pub fn binary_code(self) -> u8 {
        match self {
            Device::D => 0xA8,
            Device::M => 0x90,
            Device::X => 0x9C,
            Device::Y => 0x9D,
            Device::L => 0x92,
            Device::F => 0x93,
            Device::V => 0x94,
            Device::B => 0xA0,
            Device::W => 0xB4,
            Device::R => 0xAF,
            Device::Z => 0xCC,
        }
    }

    pub fn element(self) -> ElementType {
        match self {
            Device::M | Device::X | Device::Y | Device::L | Device::F => ElementType::Bit,
            Device::D | Device::B | Device::W | Device::R | Device::Z | Device::V => ElementType::Word,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A parsed MC address: device plus decimal start offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McAddress {
    pub device: Device,
    pub offset: u32,
}

impl McAddress {
    /// Parses one or two device letters followed by a decimal offset.
    pub fn parse(address: &str) -> Result<Self> {
        let text = address.trim();
        let split = text
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphabetic())
            .map_or(text.len(), |(i, _)| i);
        let (letters, digits) = text.split_at(split);
        if letters.is_empty() || letters.len() > 2 {
            return Err(Error::address_format(
                address,
                "expected one or two device letters followed by a decimal offset",
            ));
        }
        let device = Device::from_letters(letters)
            .ok_or_else(|| Error::unsupported_region(address, letters))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::address_format(address, "expected a decimal offset"));
        }
        let offset = digits
            .parse::<u32>()
            .ok()
            .filter(|offset| *offset <= MAX_OFFSET)
            .ok_or_else(|| Error::address_format(address, format!("offset exceeds {MAX_OFFSET}")))?;
        Ok(Self { device, offset })
    }

    pub fn element(&self) -> ElementType {
        self.device.element()
    }
}

impl FromStr for McAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for McAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.device, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn word_and_bit_devices() {
        let address = McAddress::parse("D100").unwrap();
        assert_eq!(address.device, Device::D);
        assert_eq!(address.offset, 100);
        assert_eq!(address.element(), ElementType::Word);

        let address: McAddress = "M0".parse().unwrap();
        assert_eq!(address.device, Device::M);
        assert_eq!(address.offset, 0);
        assert_eq!(address.element(), ElementType::Bit);

        assert_eq!(McAddress::parse("x17").unwrap().device, Device::X);
        assert_eq!(McAddress::parse("R999999").unwrap().offset, 999_999);
        assert_eq!(McAddress::parse("W10").unwrap().to_string(), "W10");
    }

    #[test]
    fn unknown_devices_are_unsupported_regions() {
        assert_matches!(
            McAddress::parse("Q0"),
            Err(Error::UnsupportedRegion { region, .. }) if region == "Q"
        );
        assert_matches!(McAddress::parse("ZR10"), Err(Error::UnsupportedRegion { .. }));
    }

    #[test]
    fn malformed_addresses() {
        assert_matches!(McAddress::parse("D"), Err(Error::AddressFormat { .. }));
        assert_matches!(McAddress::parse("100"), Err(Error::AddressFormat { .. }));
        assert_matches!(McAddress::parse("ABC1"), Err(Error::AddressFormat { .. }));
        assert_matches!(McAddress::parse("M0.0"), Err(Error::AddressFormat { .. }));
        assert_matches!(McAddress::parse("D1000000"), Err(Error::AddressFormat { .. }));
    }

    #[test]
    fn codes() {
        assert_eq!(Device::D.ascii_code(), "D*");
        assert_eq!(Device::D.binary_code(), 0xA8);
        assert_eq!(Device::M.binary_code(), 0x90);
        assert_eq!(Device::X.binary_code(), 0x9C);
    }
}

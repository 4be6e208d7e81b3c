//! FINS memory areas and the address grammar (`"DM100"`, `"CIO10"`).
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Word-addressable FINS memory areas.
///
/// | Area | Code | Description |
/// |------|------|-------------|
/// | CIO  | 0xB0 | Core I/O |
/// | WR   | 0xB1 | Work area |
/// | HR   | 0xB2 | Holding area |
/// | AR   | 0xB3 | Auxiliary relay area |
/// | DM   | 0x82 | Data memory |
/// | DR   | 0xC0 | Data registers |
/// | IR   | 0xDD | Index registers |
/// | TIM  | 0x09 | Timer present values |
/// | CNT  | 0x0C | Counter present values |
/// | TIMH | 0x19 | High-speed timer present values |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryArea {
    CIO,
    WR,
    HR,
    AR,
    DM,
    DR,
    IR,
    TIM,
    CNT,
    TIMH,
}

impl MemoryArea {
    pub const ALL: [MemoryArea; 10] = [
        MemoryArea::CIO,
        MemoryArea::WR,
        MemoryArea::HR,
        MemoryArea::AR,
        MemoryArea::DM,
        MemoryArea::DR,
        MemoryArea::IR,
        MemoryArea::TIM,
        MemoryArea::CNT,
        MemoryArea::TIMH,
    ];

    /// Area code placed in memory area read/write commands.
    pub fn code(self) -> u8 {
        match self {
            MemoryArea::CIO => 0xB0,
            MemoryArea::WR => 0xB1,
            MemoryArea::HR => 0xB2,
            MemoryArea::AR => 0xB3,
            MemoryArea::DM => 0x82,
            MemoryArea::DR => 0xC0,
            MemoryArea::IR => 0xDD,
            MemoryArea::TIM => 0x09,
            MemoryArea::CNT => 0x0C,
            MemoryArea::TIMH => 0x19,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MemoryArea::CIO => "CIO",
            MemoryArea::WR => "WR",
            MemoryArea::HR => "HR",
            MemoryArea::AR => "AR",
            MemoryArea::DM => "DM",
            MemoryArea::DR => "DR",
            MemoryArea::IR => "IR",
            MemoryArea::TIM => "TIM",
            MemoryArea::CNT => "CNT",
            MemoryArea::TIMH => "TIMH",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|area| area.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for MemoryArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed FINS address: memory area plus decimal word offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinsAddress {
    pub area: MemoryArea,
    pub offset: u16,
}

impl FinsAddress {
    pub fn parse(address: &str) -> Result<Self> {
        let text = address.trim();
        let split = text
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphabetic())
            .map_or(text.len(), |(i, _)| i);
        let (letters, digits) = text.split_at(split);
        if letters.is_empty() {
            return Err(Error::address_format(
                address,
                "expected a memory area name followed by a decimal word offset",
            ));
        }
        let area = MemoryArea::from_name(letters)
            .ok_or_else(|| Error::unsupported_region(address, letters))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::address_format(address, "expected a decimal word offset"));
        }
        let offset = digits
            .parse::<u16>()
            .map_err(|_| Error::address_format(address, "word offset exceeds 65535"))?;
        Ok(Self { area, offset })
    }
}

impl FromStr for FinsAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FinsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.area, self.offset)
    }
}

//! Values exchanged with devices.
use std::fmt;

/// Operating state reported by an Omron CPU unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuStatus {
    /// Raw operating mode byte (0 = program, 2 = monitor, 4 = run on most CPUs).
    pub mode: u8,
    pub run_switch: u8,
    /// `true` if the CPU reports an error.
    pub error: bool,
}

impl fmt::Display for CpuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mode=0x{:02X}, run switch=0x{:02X}, error={}",
            self.mode, self.run_switch, self.error
        )
    }
}

/// A value read from or written to a device.
///
/// Every protocol accepts a subset of these shapes for writing and rejects the rest with
/// [`crate::Error::UnsupportedValueType`] before any I/O takes place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    U16(u16),
    Words(Vec<u16>),
    Bits(Vec<bool>),
    Bytes(Vec<u8>),
    CpuStatus(CpuStatus),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::U16(_) => "u16",
            Value::Words(_) => "words",
            Value::Bits(_) => "bits",
            Value::Bytes(_) => "bytes",
            Value::CpuStatus(_) => "cpu-status",
        }
    }

    /// Returns the value as 16-bit words, if it has a word shape.
    pub fn as_words(&self) -> Option<Vec<u16>> {
        match self {
            Value::U16(word) => Some(vec![*word]),
            Value::Words(words) => Some(words.clone()),
            _ => None,
        }
    }

    /// Returns the value as booleans, if it has a bit shape.
    pub fn as_bits(&self) -> Option<Vec<bool>> {
        match self {
            Value::Bool(bit) => Some(vec![*bit]),
            Value::Bits(bits) => Some(bits.clone()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::U16(value)
    }
}

impl From<Vec<u16>> for Value {
    fn from(value: Vec<u16>) -> Self {
        Value::Words(value)
    }
}

impl From<&[u16]> for Value {
    fn from(value: &[u16]) -> Self {
        Value::Words(value.to_vec())
    }
}

impl From<Vec<bool>> for Value {
    fn from(value: Vec<bool>) -> Self {
        Value::Bits(value)
    }
}

impl From<&[bool]> for Value {
    fn from(value: &[bool]) -> Self {
        Value::Bits(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<CpuStatus> for Value {
    fn from(value: CpuStatus) -> Self {
        Value::CpuStatus(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(bit) => write!(f, "{}", u8::from(*bit)),
            Value::U16(word) => write!(f, "{word}"),
            Value::Words(words) => {
                let text: Vec<String> = words.iter().map(|w| w.to_string()).collect();
                write!(f, "[{}]", text.join(", "))
            }
            Value::Bits(bits) => {
                let text: String = bits.iter().map(|b| if *b { '1' } else { '0' }).collect();
                write!(f, "{text}")
            }
            Value::Bytes(bytes) => {
                let text: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
                write!(f, "{}", text.join(" "))
            }
            Value::CpuStatus(status) => write!(f, "{status}"),
        }
    }
}

/// The declared element type of a [`crate::result::Reading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// One `bool` per addressed point.
    Bits,
    /// One 16-bit word per addressed point.
    Words,
    /// Raw coil payload, eight points per byte, least significant bit first.
    PackedBits,
    /// Raw register payload, two big-endian bytes per register.
    PackedWords,
    CpuStatus,
}

/// Addressing width of a device region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Bit,
    /// 16-bit unit.
    Word,
}

impl ElementType {
    /// The data type of decoded readings of this element type.
    pub fn data_type(self) -> DataType {
        match self {
            ElementType::Bit => DataType::Bits,
            ElementType::Word => DataType::Words,
        }
    }
}

/// Splits a raw register payload into big-endian words; a trailing odd byte is dropped.
pub fn words_from_be_bytes(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Expands a packed coil payload into `count` booleans.
pub fn bits_from_packed(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes.get(i / 8).is_some_and(|byte| byte & (1 << (i % 8)) != 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_accessors() {
        assert_eq!(Value::U16(7).as_words(), Some(vec![7]));
        assert_eq!(Value::Bool(true).as_bits(), Some(vec![true]));
        assert_eq!(Value::Bytes(vec![1]).as_words(), None);
        assert_eq!(Value::Words(vec![1, 2]).as_bits(), None);
    }

    #[test]
    fn payload_helpers() {
        assert_eq!(words_from_be_bytes(&[0x12, 0x34, 0x00, 0x01]), vec![0x1234, 1]);
        assert_eq!(
            bits_from_packed(&[0b0000_0101, 0b0000_0001], 10),
            vec![true, false, true, false, false, false, false, false, true, false]
        );
    }

    #[test]
    fn display() {
        assert_eq!(Value::Bits(vec![true, false, true]).to_string(), "101");
        assert_eq!(Value::Words(vec![1, 2]).to_string(), "[1, 2]");
        assert_eq!(Value::Bytes(vec![0xAB, 0x01]).to_string(), "AB 01");
    }
}

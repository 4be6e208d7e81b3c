//! FINS command frames and response checks.
//!
//! ```text
//! request:  80 | local net node unit | remote net node unit | command (BE) | id (BE) | params
//! response: 80 | ...                                        | code at 8..10 (BE)      | data
//! ```
use super::area::FinsAddress;
use crate::config::{FinsConfig, NodeAddress};
use crate::error::{Error, Result};
use crate::value::{words_from_be_bytes, CpuStatus, Value};

pub const FINS_VERSION: u8 = 0x80;
pub const HEADER_LEN: usize = 7;

pub const MEMORY_AREA_READ: u16 = 0x0101;
pub const MEMORY_AREA_WRITE: u16 = 0x0102;
pub const CPU_UNIT_STATUS_READ: u16 = 0x0701;

/// Maximum number of words per read/write command.
pub const MAX_WORDS_PER_COMMAND: usize = 999;

pub const MIN_RESPONSE_LEN: usize = 10;
pub const RESPONSE_CODE_OFFSET: usize = 8;
pub const RESPONSE_DATA_OFFSET: usize = 10;
pub const CPU_STATUS_MIN_LEN: usize = 11;

/// Source and destination of every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub local: NodeAddress,
    pub remote: NodeAddress,
}

impl Header {
    pub fn from_config(config: &FinsConfig) -> Self {
        Self {
            local: config.local,
            remote: config.remote,
        }
    }

    fn encode_into(&self, frame: &mut Vec<u8>) {
        frame.push(FINS_VERSION);
        for node in [self.local, self.remote] {
            frame.extend_from_slice(&[node.network, node.node, node.unit]);
        }
    }
}

fn check_count(count: usize) -> Result<()> {
    if count == 0 || count > MAX_WORDS_PER_COMMAND {
        return Err(Error::InvalidQuantity {
            requested: count,
            max: MAX_WORDS_PER_COMMAND,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    MemoryAreaRead { address: FinsAddress, count: u16 },
    MemoryAreaWrite { address: FinsAddress, words: Vec<u16> },
    CpuUnitStatusRead,
}

impl Command {
    pub fn read(address: FinsAddress, count: u16) -> Result<Self> {
        check_count(usize::from(count))?;
        Ok(Command::MemoryAreaRead { address, count })
    }

    /// Every area is word addressed, so only `U16` and `Words` can be written.
    pub fn write(address: FinsAddress, value: &Value) -> Result<Self> {
        let words = match value {
            Value::U16(_) | Value::Words(_) => value.as_words().unwrap_or_default(),
            other => {
                return Err(Error::UnsupportedValueType {
                    protocol: "FINS",
                    found: other.type_name(),
                })
            }
        };
        check_count(words.len())?;
        Ok(Command::MemoryAreaWrite { address, words })
    }

    pub fn code(&self) -> u16 {
        match self {
            Command::MemoryAreaRead { .. } => MEMORY_AREA_READ,
            Command::MemoryAreaWrite { .. } => MEMORY_AREA_WRITE,
            Command::CpuUnitStatusRead => CPU_UNIT_STATUS_READ,
        }
    }

    pub fn encode(&self, header: &Header, command_id: u16) -> Vec<u8> {
        let mut frame = Vec::with_capacity(16);
        header.encode_into(&mut frame);
        frame.extend_from_slice(&self.code().to_be_bytes());
        frame.extend_from_slice(&command_id.to_be_bytes());
        match self {
            Command::MemoryAreaRead { address, count } => {
                frame.push(address.area.code());
                frame.extend_from_slice(&address.offset.to_be_bytes());
                frame.extend_from_slice(&count.to_be_bytes());
            }
            Command::MemoryAreaWrite { address, words } => {
                frame.push(address.area.code());
                frame.extend_from_slice(&address.offset.to_be_bytes());
                frame.extend_from_slice(&(words.len() as u16).to_be_bytes());
                for word in words {
                    frame.extend_from_slice(&word.to_be_bytes());
                }
            }
            Command::CpuUnitStatusRead => {}
        }
        frame
    }

    fn min_response_len(&self) -> usize {
        match self {
            Command::CpuUnitStatusRead => CPU_STATUS_MIN_LEN,
            _ => MIN_RESPONSE_LEN,
        }
    }

    /// Bytes still expected on a stream once the first [`MIN_RESPONSE_LEN`] bytes of the
    /// response are in.
    pub fn remaining_response_len(&self, head: &[u8]) -> usize {
        match self {
            Command::CpuUnitStatusRead => CPU_STATUS_MIN_LEN - MIN_RESPONSE_LEN,
            Command::MemoryAreaRead { count, .. } if response_code(head) == 0 => {
                2 * usize::from(*count)
            }
            _ => 0,
        }
    }

    /// Length and version checks; a failure here means the response is unusable.
    pub fn check_structure(&self, response: &[u8]) -> Result<()> {
        let min = self.min_response_len();
        if response.len() < min {
            return Err(Error::invalid_response(format!(
                "FINS response of {} bytes is shorter than {min}",
                response.len()
            )));
        }
        if response[0] != FINS_VERSION {
            return Err(Error::invalid_response(format!(
                "unexpected FINS version byte 0x{:02X}",
                response[0]
            )));
        }
        Ok(())
    }

    /// Checks the response code of a structurally valid response.
    ///
    /// The CPU unit status response carries status bytes where other responses carry the
    /// code, so it is not checked.
    pub fn check_code(&self, response: &[u8]) -> Result<()> {
        if let Command::CpuUnitStatusRead = self {
            return Ok(());
        }
        match response_code(response) {
            0 => Ok(()),
            code => Err(Error::DeviceError(code)),
        }
    }

    pub fn verify(&self, response: &[u8]) -> Result<()> {
        self.check_structure(response)?;
        self.check_code(response)
    }
}

pub fn response_code(response: &[u8]) -> u16 {
    match response.get(RESPONSE_CODE_OFFSET..RESPONSE_DATA_OFFSET) {
        Some([high, low]) => u16::from_be_bytes([*high, *low]),
        _ => 0,
    }
}

/// Big-endian words following the response code.
pub fn decode_words(response: &[u8]) -> Result<Vec<u16>> {
    let data = response.get(RESPONSE_DATA_OFFSET..).unwrap_or_default();
    if data.len() % 2 != 0 {
        return Err(Error::invalid_response(format!(
            "odd number of data bytes ({})",
            data.len()
        )));
    }
    Ok(words_from_be_bytes(data))
}

pub fn decode_cpu_status(response: &[u8]) -> Result<CpuStatus> {
    match response {
        [_, _, _, _, _, _, _, _, mode, run_switch, error, ..] => Ok(CpuStatus {
            mode: *mode,
            run_switch: *run_switch,
            error: *error != 0,
        }),
        _ => Err(Error::invalid_response(format!(
            "CPU status response of {} bytes is shorter than {CPU_STATUS_MIN_LEN}",
            response.len()
        ))),
    }
}

//! Modbus TCP and RTU.
//!
//! Addresses are plain decimal offsets (`"100"`). The codec layers are usable on their own:
//! [`pdu`] builds and verifies function code PDUs, [`frame`] wraps them in MBAP or RTU
//! framing and [`crc`] implements the RTU checksum.
pub mod client;
pub mod crc;
pub mod frame;
pub mod pdu;

pub use client::{Framing, ModbusClient, ModbusRtuClient, ModbusTcpClient, RtuFraming, TcpFraming};

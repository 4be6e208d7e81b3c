//! Modbus PDUs: function code plus parameters, shared by the TCP and RTU framings.
use crate::error::{Error, Result};
use crate::value::bits_from_packed;

pub const READ_COILS: u8 = 0x01;
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const READ_INPUT_REGISTERS: u8 = 0x04;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Set in the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

pub const MAX_READ_COILS: u16 = 2000;
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_COILS: u16 = 1968;

/// Parses a Modbus address: a plain decimal offset in `0..=65535`.
pub fn parse_address(address: &str) -> Result<u16> {
    let digits = address.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::address_format(address, "expected a decimal register offset"));
    }
    digits
        .parse::<u16>()
        .map_err(|_| Error::address_format(address, "offset exceeds 65535"))
}

/// Packs coils into `ceil(n / 8)` bytes, least significant bit first.
pub fn pack_coils(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (i, _) in values.iter().enumerate().filter(|(_, on)| **on) {
        packed[i / 8] |= 1 << (i % 8);
    }
    packed
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadCoils { address: u16, count: u16 },
    ReadHoldingRegisters { address: u16, count: u16 },
    ReadInputRegisters { address: u16, count: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, values: Vec<bool> },
}

fn be_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

impl Request {
    pub fn function_code(&self) -> u8 {
        match self {
            Request::ReadCoils { .. } => READ_COILS,
            Request::ReadHoldingRegisters { .. } => READ_HOLDING_REGISTERS,
            Request::ReadInputRegisters { .. } => READ_INPUT_REGISTERS,
            Request::WriteSingleRegister { .. } => WRITE_SINGLE_REGISTER,
            Request::WriteMultipleCoils { .. } => WRITE_MULTIPLE_COILS,
        }
    }

    fn address(&self) -> u16 {
        match self {
            Request::ReadCoils { address, .. }
            | Request::ReadHoldingRegisters { address, .. }
            | Request::ReadInputRegisters { address, .. }
            | Request::WriteSingleRegister { address, .. }
            | Request::WriteMultipleCoils { address, .. } => *address,
        }
    }

    /// Number of coils or registers addressed.
    fn quantity(&self) -> usize {
        match self {
            Request::ReadCoils { count, .. }
            | Request::ReadHoldingRegisters { count, .. }
            | Request::ReadInputRegisters { count, .. } => usize::from(*count),
            Request::WriteSingleRegister { .. } => 1,
            Request::WriteMultipleCoils { values, .. } => values.len(),
        }
    }

    /// Checks quantity limits and that the addressed range fits below 65536.
    pub fn validate(&self) -> Result<()> {
        let max = match self {
            Request::ReadCoils { .. } => MAX_READ_COILS,
            Request::ReadHoldingRegisters { .. } | Request::ReadInputRegisters { .. } => {
                MAX_READ_REGISTERS
            }
            Request::WriteSingleRegister { .. } => 1,
            Request::WriteMultipleCoils { .. } => MAX_WRITE_COILS,
        };
        let quantity = self.quantity();
        if quantity == 0 || quantity > usize::from(max) {
            return Err(Error::InvalidQuantity {
                requested: quantity,
                max: usize::from(max),
            });
        }
        if usize::from(self.address()) + quantity > 0x1_0000 {
            return Err(Error::address_format(
                &self.address().to_string(),
                format!("{quantity} elements exceed the address space"),
            ));
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(6);
        pdu.push(self.function_code());
        pdu.extend_from_slice(&self.address().to_be_bytes());
        match self {
            Request::ReadCoils { count, .. }
            | Request::ReadHoldingRegisters { count, .. }
            | Request::ReadInputRegisters { count, .. } => {
                pdu.extend_from_slice(&count.to_be_bytes());
            }
            Request::WriteSingleRegister { value, .. } => {
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            Request::WriteMultipleCoils { values, .. } => {
                let packed = pack_coils(values);
                pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
                pdu.push(packed.len() as u8);
                pdu.extend_from_slice(&packed);
            }
        }
        pdu
    }

    /// Parses a request PDU, as a device would.
    pub fn decode(pdu: &[u8]) -> Result<Request> {
        if pdu.len() < 5 {
            return Err(Error::invalid_response(format!(
                "request PDU of {} bytes is too short",
                pdu.len()
            )));
        }
        let address = be_u16(pdu, 1);
        let word = be_u16(pdu, 3);
        let request = match pdu[0] {
            READ_COILS => Request::ReadCoils { address, count: word },
            READ_HOLDING_REGISTERS => Request::ReadHoldingRegisters { address, count: word },
            READ_INPUT_REGISTERS => Request::ReadInputRegisters { address, count: word },
            WRITE_SINGLE_REGISTER => Request::WriteSingleRegister { address, value: word },
            WRITE_MULTIPLE_COILS => {
                let count = usize::from(word);
                let byte_count = pdu.get(5).copied().map(usize::from).unwrap_or_default();
                if byte_count != count.div_ceil(8) || pdu.len() != 6 + byte_count {
                    return Err(Error::invalid_response("coil byte count does not match quantity"));
                }
                Request::WriteMultipleCoils {
                    address,
                    values: bits_from_packed(&pdu[6..], count),
                }
            }
            other => {
                return Err(Error::invalid_response(format!(
                    "unsupported function code 0x{other:02X}"
                )))
            }
        };
        Ok(request)
    }

    /// Verifies a response PDU against this request and returns the data payload of read
    /// responses (empty for writes).
    pub fn parse_response(&self, pdu: &[u8]) -> Result<Vec<u8>> {
        let function = self.function_code();
        let Some(&code) = pdu.first() else {
            return Err(Error::invalid_response("empty response PDU"));
        };
        if code == function | EXCEPTION_FLAG {
            let exception = pdu
                .get(1)
                .copied()
                .ok_or_else(|| Error::invalid_response("exception response without code"))?;
            return Err(Error::ModbusException {
                function,
                code: exception,
            });
        }
        if code != function {
            return Err(Error::invalid_response(format!(
                "function code 0x{code:02X} does not match request 0x{function:02X}"
            )));
        }
        match self {
            Request::ReadCoils { count, .. }
            | Request::ReadHoldingRegisters { count, .. }
            | Request::ReadInputRegisters { count, .. } => {
                let expected = match self {
                    Request::ReadCoils { .. } => usize::from(*count).div_ceil(8),
                    _ => usize::from(*count) * 2,
                };
                let byte_count = pdu.get(1).copied().map(usize::from);
                if byte_count != Some(expected) || pdu.len() != 2 + expected {
                    return Err(Error::invalid_response(format!(
                        "expected {expected} data bytes, byte count is {byte_count:?} in a {} byte PDU",
                        pdu.len()
                    )));
                }
                Ok(pdu[2..].to_vec())
            }
            Request::WriteSingleRegister { .. } => {
                if pdu != self.encode().as_slice() {
                    return Err(Error::invalid_response("write response does not echo the request"));
                }
                Ok(Vec::new())
            }
            Request::WriteMultipleCoils { address, values } => {
                if pdu.len() != 5
                    || be_u16(pdu, 1) != *address
                    || usize::from(be_u16(pdu, 3)) != values.len()
                {
                    return Err(Error::invalid_response(
                        "write response does not echo address and quantity",
                    ));
                }
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn address_grammar() {
        assert_eq!(parse_address("100").unwrap(), 100);
        assert_eq!(parse_address(" 0 ").unwrap(), 0);
        assert_eq!(parse_address("65535").unwrap(), 65535);
        assert_matches!(parse_address("65536"), Err(Error::AddressFormat { .. }));
        assert_matches!(parse_address("D100"), Err(Error::AddressFormat { .. }));
        assert_matches!(parse_address("-1"), Err(Error::AddressFormat { .. }));
        assert_matches!(parse_address(""), Err(Error::AddressFormat { .. }));
    }

    #[test]
    fn write_single_register_round_trip() {
        let address = parse_address("100").unwrap();
        let pdu = Request::WriteSingleRegister { address, value: 1234 }.encode();
        assert_eq!(pdu, vec![0x06, 0x00, 0x64, 0x04, 0xD2]);
        assert_matches!(
            Request::decode(&pdu),
            Ok(Request::WriteSingleRegister { address: 100, value: 1234 })
        );
    }

    #[test]
    fn read_requests() {
        let pdu = Request::ReadHoldingRegisters { address: 0, count: 10 }.encode();
        assert_eq!(pdu, vec![0x03, 0x00, 0x00, 0x00, 0x0A]);
        let pdu = Request::ReadCoils { address: 19, count: 37 }.encode();
        assert_eq!(pdu, vec![0x01, 0x00, 0x13, 0x00, 0x25]);
        let pdu = Request::ReadInputRegisters { address: 8, count: 1 }.encode();
        assert_eq!(pdu[0], 0x04);
    }

    #[test]
    fn coils_are_packed_lsb_first() {
        assert_eq!(pack_coils(&[true, false, true, true]), vec![0b0000_1101]);
        let ten = [true, false, false, false, false, false, false, true, false, true];
        assert_eq!(pack_coils(&ten), vec![0b1000_0001, 0b0000_0010]);
        assert_eq!(pack_coils(&[]), Vec::<u8>::new());

        let request = Request::WriteMultipleCoils {
            address: 20,
            values: ten.to_vec(),
        };
        let pdu = request.encode();
        assert_eq!(pdu, vec![0x0F, 0x00, 0x14, 0x00, 0x0A, 0x02, 0x81, 0x02]);
        assert_eq!(Request::decode(&pdu).unwrap(), request);
    }

    #[test]
    fn quantity_limits() {
        assert_matches!(
            Request::ReadHoldingRegisters { address: 0, count: 0 }.validate(),
            Err(Error::InvalidQuantity { requested: 0, max: 125 })
        );
        assert_matches!(
            Request::ReadHoldingRegisters { address: 0, count: 126 }.validate(),
            Err(Error::InvalidQuantity { .. })
        );
        assert!(Request::ReadCoils { address: 0, count: 2000 }.validate().is_ok());
        assert_matches!(
            Request::ReadHoldingRegisters { address: 65535, count: 2 }.validate(),
            Err(Error::AddressFormat { .. })
        );
        assert!(Request::ReadHoldingRegisters { address: 65535, count: 1 }.validate().is_ok());
    }

    #[test]
    fn read_response_payloads() {
        let request = Request::ReadHoldingRegisters { address: 0, count: 2 };
        assert_eq!(
            request.parse_response(&[0x03, 0x04, 0x00, 0x01, 0x12, 0x34]).unwrap(),
            vec![0x00, 0x01, 0x12, 0x34]
        );
        assert_matches!(
            request.parse_response(&[0x03, 0x02, 0x00, 0x01]),
            Err(Error::InvalidResponse(_))
        );
        let coils = Request::ReadCoils { address: 0, count: 9 };
        assert_eq!(coils.parse_response(&[0x01, 0x02, 0xFF, 0x01]).unwrap(), vec![0xFF, 0x01]);
    }

    #[test]
    fn exception_and_mismatch() {
        let request = Request::ReadHoldingRegisters { address: 0, count: 1 };
        assert_matches!(
            request.parse_response(&[0x83, 0x02]),
            Err(Error::ModbusException { function: 0x03, code: 0x02 })
        );
        assert_matches!(request.parse_response(&[0x04, 0x02, 0, 0]), Err(Error::InvalidResponse(_)));
        assert_matches!(request.parse_response(&[]), Err(Error::InvalidResponse(_)));
    }

    #[test]
    fn write_responses_must_echo() {
        let request = Request::WriteSingleRegister { address: 100, value: 1234 };
        assert!(request.parse_response(&request.encode()).is_ok());
        assert_matches!(
            request.parse_response(&[0x06, 0x00, 0x64, 0x00, 0x00]),
            Err(Error::InvalidResponse(_))
        );

        let coils = Request::WriteMultipleCoils {
            address: 20,
            values: vec![true; 10],
        };
        assert!(coils.parse_response(&[0x0F, 0x00, 0x14, 0x00, 0x0A]).is_ok());
        assert_matches!(
            coils.parse_response(&[0x0F, 0x00, 0x14, 0x00, 0x09]),
            Err(Error::InvalidResponse(_))
        );
    }
}

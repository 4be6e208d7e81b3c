//! Modbus TCP (MBAP) and RTU (address + CRC) framing around a PDU.
use super::crc;
use super::pdu;
use crate::error::{Error, Result};

pub const MBAP_HEADER_LEN: usize = 7;
pub const MBAP_PROTOCOL_ID: u16 = 0;
/// Upper bound of the MBAP length field (unit id + largest PDU).
const MBAP_MAX_LENGTH: usize = 254;

/// Length of the RTU response prefix needed to know the full frame size.
pub const RTU_PREFIX_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Byte count of unit id plus PDU.
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MBAP_HEADER_LEN {
            return Err(Error::invalid_response(format!(
                "MBAP header needs {MBAP_HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        })
    }

    /// Number of PDU bytes that follow the header.
    pub fn pdu_len(&self) -> Result<usize> {
        let length = usize::from(self.length);
        if !(2..=MBAP_MAX_LENGTH).contains(&length) {
            return Err(Error::invalid_response(format!(
                "MBAP length {length} is out of range"
            )));
        }
        Ok(length - 1)
    }
}

pub fn encode_tcp(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&MBAP_PROTOCOL_ID.to_be_bytes());
    frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    frame
}

/// Verifies a complete MBAP response and returns its PDU.
pub fn decode_tcp(frame: &[u8], transaction_id: u16, unit_id: u8) -> Result<&[u8]> {
    if frame.len() < MBAP_HEADER_LEN + 1 {
        return Err(Error::invalid_response(format!(
            "Modbus TCP response of {} bytes is too short",
            frame.len()
        )));
    }
    let header = MbapHeader::parse(frame)?;
    if header.transaction_id != transaction_id {
        return Err(Error::invalid_response(format!(
            "transaction id {} does not match request {transaction_id}",
            header.transaction_id
        )));
    }
    if header.protocol_id != MBAP_PROTOCOL_ID {
        return Err(Error::invalid_response(format!(
            "unexpected protocol id {}",
            header.protocol_id
        )));
    }
    if header.pdu_len()? != frame.len() - MBAP_HEADER_LEN {
        return Err(Error::invalid_response("MBAP length does not match frame size"));
    }
    if header.unit_id != unit_id {
        return Err(Error::invalid_response(format!(
            "response from unit {} to a request for unit {unit_id}",
            header.unit_id
        )));
    }
    Ok(&frame[MBAP_HEADER_LEN..])
}

pub fn encode_rtu(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(pdu.len() + 3);
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    crc::append_crc(&mut frame);
    frame
}

/// Total size of an RTU response, given its first three bytes.
pub fn rtu_response_len(prefix: &[u8]) -> Result<usize> {
    let [_, function, third, ..] = *prefix else {
        return Err(Error::invalid_response("RTU response prefix too short"));
    };
    if function & pdu::EXCEPTION_FLAG != 0 {
        return Ok(5);
    }
    match function {
        pdu::READ_COILS | pdu::READ_HOLDING_REGISTERS | pdu::READ_INPUT_REGISTERS => {
            Ok(RTU_PREFIX_LEN + usize::from(third) + 2)
        }
        pdu::WRITE_SINGLE_REGISTER | pdu::WRITE_MULTIPLE_COILS => Ok(8),
        other => Err(Error::invalid_response(format!(
            "unexpected function code 0x{other:02X}"
        ))),
    }
}

/// Verifies the CRC and unit of a complete RTU response and returns its PDU.
pub fn decode_rtu(frame: &[u8], unit_id: u8) -> Result<&[u8]> {
    if frame.len() < 4 {
        return Err(Error::invalid_response(format!(
            "Modbus RTU response of {} bytes is too short",
            frame.len()
        )));
    }
    crc::verify_crc(frame)?;
    if frame[0] != unit_id {
        return Err(Error::invalid_response(format!(
            "response from unit {} to a request for unit {unit_id}",
            frame[0]
        )));
    }
    Ok(&frame[1..frame.len() - 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn tcp_frame_layout() {
        let frame = encode_tcp(0x0102, 1, &[0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(
            frame,
            vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]
        );
    }

    #[test]
    fn tcp_response_checks() {
        let response = [0x00, 0x07, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x12, 0x34];
        assert_eq!(decode_tcp(&response, 7, 1).unwrap(), &[0x03, 0x02, 0x12, 0x34]);
        assert_matches!(decode_tcp(&response, 8, 1), Err(Error::InvalidResponse(_)));
        assert_matches!(decode_tcp(&response, 7, 2), Err(Error::InvalidResponse(_)));
        assert_matches!(decode_tcp(&response[..7], 7, 1), Err(Error::InvalidResponse(_)));
        assert_matches!(decode_tcp(&response[..10], 7, 1), Err(Error::InvalidResponse(_)));

        let mut wrong_protocol = response;
        wrong_protocol[3] = 1;
        assert_matches!(decode_tcp(&wrong_protocol, 7, 1), Err(Error::InvalidResponse(_)));
    }

    #[test]
    fn mbap_length_bounds() {
        let header = MbapHeader::parse(&[0, 1, 0, 0, 0, 1, 1]).unwrap();
        assert_matches!(header.pdu_len(), Err(Error::InvalidResponse(_)));
        let header = MbapHeader::parse(&[0, 1, 0, 0, 0, 6, 1]).unwrap();
        assert_eq!(header.pdu_len().unwrap(), 5);
    }

    #[test]
    fn rtu_frame_layout() {
        let frame = encode_rtu(1, &[0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);
        assert_eq!(decode_rtu(&frame, 1).unwrap(), &[0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_matches!(decode_rtu(&frame, 2), Err(Error::InvalidResponse(_)));
    }

    #[test]
    fn rtu_response_sizes() {
        assert_eq!(rtu_response_len(&[0x01, 0x03, 0x04]).unwrap(), 9);
        assert_eq!(rtu_response_len(&[0x01, 0x01, 0x01]).unwrap(), 6);
        assert_eq!(rtu_response_len(&[0x01, 0x06, 0x00]).unwrap(), 8);
        assert_eq!(rtu_response_len(&[0x01, 0x0F, 0x00]).unwrap(), 8);
        assert_eq!(rtu_response_len(&[0x01, 0x83, 0x02]).unwrap(), 5);
        assert_matches!(rtu_response_len(&[0x01, 0x2B, 0x00]), Err(Error::InvalidResponse(_)));
        assert_matches!(rtu_response_len(&[0x01]), Err(Error::InvalidResponse(_)));
    }

    #[test]
    fn rtu_corruption_is_a_checksum_error() {
        let mut frame = encode_rtu(1, &[0x03, 0x02, 0x12, 0x34]);
        frame[3] ^= 0xFF;
        assert_matches!(decode_rtu(&frame, 1), Err(Error::Checksum { .. }));
    }
}

//! Table driven CRC-16/MODBUS (reflected polynomial 0xA001, initial value 0xFFFF).

const POLYNOMIAL: u16 = 0xA001;
const INITIAL: u16 = 0xFFFF;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u16; 256] = build_table();

pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(INITIAL, |crc, &byte| {
        (crc >> 8) ^ TABLE[usize::from((crc ^ u16::from(byte)) as u8)]
    })
}

/// Appends the CRC of `frame`, low byte first.
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Checks the trailing CRC of a complete RTU frame.
pub fn verify_crc(frame: &[u8]) -> crate::error::Result<()> {
    let Some(split) = frame.len().checked_sub(2) else {
        return Err(crate::Error::invalid_response("frame too short for a CRC"));
    };
    let (body, trailer) = frame.split_at(split);
    let computed = crc16(body);
    let received = u16::from_le_bytes([trailer[0], trailer[1]]);
    if computed != received {
        return Err(crate::Error::Checksum { computed, received });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const REFERENCE: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);

    #[test]
    fn known_request() {
        let request = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16(&request), 0xCDC5);
        assert_eq!(crc16(&request), REFERENCE.checksum(&request));
        assert_eq!(crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn matches_reference_implementation() {
        let samples: [&[u8]; 5] = [
            &[],
            &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03],
            &[0x01, 0x06, 0x00, 0x64, 0x04, 0xD2],
            &[0xFF; 64],
            &[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09],
        ];
        for sample in samples {
            assert_eq!(crc16(sample), REFERENCE.checksum(sample), "{sample:02X?}");
        }
    }

    #[test]
    fn every_single_byte_change_is_detected() {
        let request = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        let original = crc16(&request);
        for index in 0..request.len() {
            for flip in [0x01, 0x80, 0xFF] {
                let mut mutated = request;
                mutated[index] ^= flip;
                assert_ne!(crc16(&mutated), original);
            }
        }
    }

    #[test]
    fn append_and_verify() {
        let mut frame = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        append_crc(&mut frame);
        assert_eq!(&frame[6..], &[0xC5, 0xCD]);
        assert!(verify_crc(&frame).is_ok());

        frame[3] = 0x01;
        assert_matches!(verify_crc(&frame), Err(crate::Error::Checksum { received: 0xCDC5, .. }));
        assert_matches!(verify_crc(&[0x01]), Err(crate::Error::InvalidResponse(_)));
    }
}

//! 3E frames in ASCII and binary encoding.
//!
//! Both encodings are built in two passes: the request data length field is written as a
//! placeholder, the rest of the frame is appended, then the field is patched with the byte
//! count of everything that follows it.
use super::device::McAddress;
use crate::config::McConfig;
use crate::error::{Error, Result};
use crate::value::{ElementType, Value};

const ASCII_SUBHEADER: &[u8; 4] = b"5000";
const BINARY_SUBHEADER: [u8; 2] = [0x50, 0x00];

pub const READ_COMMAND: u16 = 0x0401;
pub const WRITE_COMMAND: u16 = 0x1401;
const SUBCOMMAND_WORD_UNITS: u16 = 0x0000;
const SUBCOMMAND_BIT_UNITS: u16 = 0x0001;

/// Offset of the request/response data length field.
pub const ASCII_LENGTH_OFFSET: usize = 14;
pub const BINARY_LENGTH_OFFSET: usize = 7;

/// Response header up to and including the data length field.
pub const ASCII_HEADER_LEN: usize = 18;
pub const BINARY_HEADER_LEN: usize = 9;

/// Header plus end code; data follows.
pub const ASCII_DATA_OFFSET: usize = 22;
pub const BINARY_DATA_OFFSET: usize = 11;

pub const MAX_WORD_POINTS: usize = 960;
pub const MAX_BIT_POINTS: usize = 7168;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Ascii,
    Binary,
}

/// Routing fields placed in every request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub network: u8,
    pub pc: u8,
    pub module_io: u16,
    pub module_station: u8,
    /// CPU watch timer in milliseconds, saturating at `0xFFFF`.
    pub watch_timer: u16,
}

impl Route {
    pub fn from_config(config: &McConfig) -> Self {
        let millis = config.cpu_watch_timer.as_millis();
        Self {
            network: config.network_number,
            pc: config.pc_number,
            module_io: config.target_module_io,
            module_station: config.target_module_station,
            watch_timer: u16::try_from(millis).unwrap_or(u16::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bits(Vec<bool>),
    Words(Vec<u16>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Bits(bits) => bits.len(),
            Payload::Words(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_points(element: ElementType, points: usize) -> Result<()> {
    let max = match element {
        ElementType::Bit => MAX_BIT_POINTS,
        ElementType::Word => MAX_WORD_POINTS,
    };
    if points == 0 || points > max {
        return Err(Error::InvalidQuantity {
            requested: points,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Read { address: McAddress, points: u16 },
    Write { address: McAddress, payload: Payload },
}

impl Request {
    pub fn read(address: McAddress, points: u16) -> Result<Self> {
        check_points(address.element(), usize::from(points))?;
        Ok(Request::Read { address, points })
    }

    /// Bit devices take `Bool`/`Bits`, word devices take `U16`/`Words`.
    pub fn write(address: McAddress, value: &Value) -> Result<Self> {
        let payload = match (address.element(), value) {
            (ElementType::Bit, Value::Bool(_) | Value::Bits(_)) => {
                Payload::Bits(value.as_bits().unwrap_or_default())
            }
            (ElementType::Word, Value::U16(_) | Value::Words(_)) => {
                Payload::Words(value.as_words().unwrap_or_default())
            }
            (_, other) => {
                return Err(Error::UnsupportedValueType {
                    protocol: "MC protocol",
                    found: other.type_name(),
                })
            }
        };
        check_points(address.element(), payload.len())?;
        Ok(Request::Write { address, payload })
    }

    pub fn address(&self) -> &McAddress {
        match self {
            Request::Read { address, .. } | Request::Write { address, .. } => address,
        }
    }

    pub fn points(&self) -> u16 {
        match self {
            Request::Read { points, .. } => *points,
            Request::Write { payload, .. } => payload.len() as u16,
        }
    }

    pub fn command(&self) -> u16 {
        match self {
            Request::Read { .. } => READ_COMMAND,
            Request::Write { .. } => WRITE_COMMAND,
        }
    }
}

fn parse_hex(field: &[u8]) -> Option<u16> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|text| u16::from_str_radix(text, 16).ok())
}

fn parse_decimal(field: &[u8]) -> Option<usize> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(field).ok()?.parse().ok()
}

/// Packs bit points two per byte, first point in the high nibble.
fn pack_nibbles(bits: &[bool]) -> Vec<u8> {
    bits.chunks(2)
        .map(|pair| {
            let high = u8::from(pair[0]) << 4;
            let low = pair.get(1).map_or(0, |bit| u8::from(*bit));
            high | low
        })
        .collect()
}

fn unpack_nibbles(bytes: &[u8], points: usize) -> Vec<bool> {
    (0..points)
        .map(|i| {
            let byte = bytes[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            nibble != 0
        })
        .collect()
}

impl FrameFormat {
    pub fn from_config(config: &McConfig) -> Self {
        if config.use_binary_format {
            FrameFormat::Binary
        } else {
            FrameFormat::Ascii
        }
    }

    pub fn encode(self, route: &Route, request: &Request) -> Vec<u8> {
        match self {
            FrameFormat::Ascii => encode_ascii(route, request),
            FrameFormat::Binary => encode_binary(route, request),
        }
    }

    pub fn header_len(self) -> usize {
        match self {
            FrameFormat::Ascii => ASCII_HEADER_LEN,
            FrameFormat::Binary => BINARY_HEADER_LEN,
        }
    }

    /// Number of response bytes following a response header.
    pub fn body_len(self, header: &[u8]) -> Result<usize> {
        if header.len() < self.header_len() {
            return Err(Error::invalid_response("response header too short"));
        }
        match self {
            FrameFormat::Ascii => {
                parse_decimal(&header[ASCII_LENGTH_OFFSET..ASCII_HEADER_LEN]).ok_or_else(|| {
                    Error::invalid_response("response data length is not a decimal number")
                })
            }
            FrameFormat::Binary => Ok(usize::from(u16::from_le_bytes([
                header[BINARY_LENGTH_OFFSET],
                header[BINARY_LENGTH_OFFSET + 1],
            ]))),
        }
    }

    /// Checks the response length and its end code.
    pub fn verify(self, response: &[u8]) -> Result<()> {
        let data_offset = self.data_offset();
        if response.len() < data_offset {
            return Err(Error::invalid_response(format!(
                "response of {} bytes is shorter than {data_offset}",
                response.len()
            )));
        }
        let end_code = match self {
            FrameFormat::Ascii => parse_hex(&response[ASCII_HEADER_LEN..ASCII_DATA_OFFSET])
                .ok_or_else(|| Error::invalid_response("end code is not hexadecimal"))?,
            FrameFormat::Binary => u16::from_le_bytes([
                response[BINARY_HEADER_LEN],
                response[BINARY_HEADER_LEN + 1],
            ]),
        };
        if end_code != 0 {
            return Err(Error::DeviceError(end_code));
        }
        Ok(())
    }

    fn data_offset(self) -> usize {
        match self {
            FrameFormat::Ascii => ASCII_DATA_OFFSET,
            FrameFormat::Binary => BINARY_DATA_OFFSET,
        }
    }

    /// Decodes the data of a verified read response.
    pub fn decode(self, response: &[u8], address: &McAddress, points: u16) -> Result<Value> {
        let points = usize::from(points);
        let data = response.get(self.data_offset()..).unwrap_or_default();
        let needed = match (self, address.element()) {
            (FrameFormat::Ascii, ElementType::Bit) => points,
            (FrameFormat::Ascii, ElementType::Word) => points * 4,
            (FrameFormat::Binary, ElementType::Bit) => points.div_ceil(2),
            (FrameFormat::Binary, ElementType::Word) => points * 2,
        };
        if data.len() < needed {
            return Err(Error::invalid_response(format!(
                "expected {needed} data bytes for {points} points, got {}",
                data.len()
            )));
        }
        let value = match (self, address.element()) {
            (FrameFormat::Ascii, ElementType::Bit) => Value::Bits(
                data[..points]
                    .iter()
                    .copied()
                    .map(|c| match c {
                        b'1' => Ok(true),
                        b'0' => Ok(false),
                        other => Err(Error::invalid_response(format!(
                            "unexpected bit character 0x{other:02X}"
                        ))),
                    })
                    .collect::<Result<_>>()?,
            ),
            (FrameFormat::Ascii, ElementType::Word) => Value::Words(
                data[..needed]
                    .chunks_exact(4)
                    .map(|field| {
                        parse_hex(field)
                            .ok_or_else(|| Error::invalid_response("word data is not hexadecimal"))
                    })
                    .collect::<Result<_>>()?,
            ),
            (FrameFormat::Binary, ElementType::Bit) => Value::Bits(unpack_nibbles(data, points)),
            (FrameFormat::Binary, ElementType::Word) => Value::Words(
                data[..needed]
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect(),
            ),
        };
        Ok(value)
    }
}

fn encode_ascii(route: &Route, request: &Request) -> Vec<u8> {
    let address = request.address();
    let mut frame = Vec::with_capacity(64);
    frame.extend_from_slice(ASCII_SUBHEADER);
    frame.extend_from_slice(
        format!(
            "{:02X}{:02X}{:04X}{:02X}",
            route.network, route.pc, route.module_io, route.module_station
        )
        .as_bytes(),
    );
    let length_at = frame.len();
    frame.extend_from_slice(b"0000");
    frame.extend_from_slice(
        format!(
            "{:04X}{:04X}{:04X}",
            route.watch_timer,
            request.command(),
            SUBCOMMAND_WORD_UNITS
        )
        .as_bytes(),
    );
    frame.extend_from_slice(address.device.ascii_code().as_bytes());
    if let Request::Write { payload, .. } = request {
        match payload {
            Payload::Bits(bits) => frame.extend(bits.iter().map(|bit| if *bit { b'1' } else { b'0' })),
            Payload::Words(words) => {
                for word in words {
                    frame.extend_from_slice(format!("{word:04X}").as_bytes());
                }
            }
        }
    }
    frame.extend_from_slice(format!("{:04}{:06}", request.points(), address.offset).as_bytes());

    let length = frame.len() - length_at - 4;
    frame[length_at..length_at + 4].copy_from_slice(format!("{length:04}").as_bytes());
    frame
}

fn encode_binary(route: &Route, request: &Request) -> Vec<u8> {
    let address = request.address();
    let subcommand = match address.element() {
        ElementType::Bit => SUBCOMMAND_BIT_UNITS,
        ElementType::Word => SUBCOMMAND_WORD_UNITS,
    };
    let mut frame = Vec::with_capacity(32);
    frame.extend_from_slice(&BINARY_SUBHEADER);
    frame.push(route.network);
    frame.push(route.pc);
    frame.extend_from_slice(&route.module_io.to_le_bytes());
    frame.push(route.module_station);
    let length_at = frame.len();
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&route.watch_timer.to_le_bytes());
    frame.extend_from_slice(&request.command().to_le_bytes());
    frame.extend_from_slice(&subcommand.to_le_bytes());
    frame.extend_from_slice(&address.offset.to_le_bytes()[..3]);
    frame.push(address.device.binary_code());
    frame.extend_from_slice(&request.points().to_le_bytes());
    if let Request::Write { payload, .. } = request {
        match payload {
            Payload::Bits(bits) => frame.extend(pack_nibbles(bits)),
            Payload::Words(words) => {
                for word in words {
                    frame.extend_from_slice(&word.to_le_bytes());
                }
            }
        }
    }

    let length = (frame.len() - length_at - 2) as u16;
    frame[length_at..length_at + 2].copy_from_slice(&length.to_le_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn route() -> Route {
        Route::from_config(&McConfig::default())
    }

    fn address(text: &str) -> McAddress {
        McAddress::parse(text).unwrap()
    }

    fn ascii_length_field(frame: &[u8]) -> usize {
        parse_decimal(&frame[ASCII_LENGTH_OFFSET..ASCII_LENGTH_OFFSET + 4]).unwrap()
    }

    #[test]
    fn route_defaults() {
        let route = route();
        assert_eq!(route.pc, 0xFF);
        assert_eq!(route.module_io, 0x03FF);
        assert_eq!(route.watch_timer, 8000);

        let mut config = McConfig::default();
        config.cpu_watch_timer = std::time::Duration::from_secs(120);
        assert_eq!(Route::from_config(&config).watch_timer, 0xFFFF);
    }

    #[test]
    fn ascii_read_frame() {
        let request = Request::read(address("D100"), 10).unwrap();
        let frame = FrameFormat::Ascii.encode(&route(), &request);
        assert_eq!(
            std::str::from_utf8(&frame).unwrap(),
            "500000FF03FF0000241F4004010000D*0010000100"
        );
        assert_eq!(ascii_length_field(&frame), frame.len() - 18);
    }

    #[test]
    fn ascii_write_frames() {
        let words = Request::write(address("D0"), &Value::Words(vec![0x1234, 0x00AB])).unwrap();
        let frame = FrameFormat::Ascii.encode(&route(), &words);
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.ends_with("14010000D*123400AB0002000000"));
        assert_eq!(ascii_length_field(&frame), frame.len() - 18);

        let bits = Request::write(address("M8"), &Value::Bits(vec![true, false, true])).unwrap();
        let frame = FrameFormat::Ascii.encode(&route(), &bits);
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.ends_with("M*1010003000008"));
        assert_eq!(ascii_length_field(&frame), frame.len() - 18);
    }

    #[test]
    fn length_field_tracks_payload_size() {
        for count in [1usize, 9, 100, 960] {
            let request =
                Request::write(address("R5"), &Value::Words(vec![0xFFFF; count])).unwrap();
            let ascii = FrameFormat::Ascii.encode(&route(), &request);
            assert_eq!(ascii_length_field(&ascii), ascii.len() - 18);

            let binary = FrameFormat::Binary.encode(&route(), &request);
            let length = u16::from_le_bytes([binary[7], binary[8]]);
            assert_eq!(usize::from(length), binary.len() - 9);
        }
    }

    #[test]
    fn binary_read_frame() {
        let request = Request::read(address("D100"), 3).unwrap();
        let frame = FrameFormat::Binary.encode(&route(), &request);
        assert_eq!(
            frame,
            vec![
                0x50, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x0C, 0x00, 0x40, 0x1F, 0x01, 0x04,
                0x00, 0x00, 0x64, 0x00, 0x00, 0xA8, 0x03, 0x00
            ]
        );
    }

    #[test]
    fn binary_bit_write_uses_nibbles() {
        let request =
            Request::write(address("M0"), &Value::Bits(vec![true, false, true])).unwrap();
        let frame = FrameFormat::Binary.encode(&route(), &request);
        assert_eq!(&frame[13..15], &SUBCOMMAND_BIT_UNITS.to_le_bytes());
        assert_eq!(frame[18], 0x90);
        assert_eq!(&frame[frame.len() - 2..], &[0x10, 0x10]);
    }

    #[test]
    fn value_shapes_follow_device_type() {
        assert_matches!(
            Request::write(address("D0"), &Value::Bool(true)),
            Err(Error::UnsupportedValueType { found: "bool", .. })
        );
        assert_matches!(
            Request::write(address("M0"), &Value::U16(1)),
            Err(Error::UnsupportedValueType { .. })
        );
        assert_matches!(
            Request::write(address("M0"), &Value::Bytes(vec![1])),
            Err(Error::UnsupportedValueType { .. })
        );
        assert_matches!(
            Request::write(address("D0"), &Value::Words(vec![])),
            Err(Error::InvalidQuantity { .. })
        );
        assert_matches!(
            Request::read(address("D0"), 961),
            Err(Error::InvalidQuantity { max: 960, .. })
        );
        assert!(Request::read(address("M0"), 961).is_ok());
    }

    #[test]
    fn ascii_verification() {
        let ok = b"D00000FF03FF000008000000010002";
        assert!(FrameFormat::Ascii.verify(ok).is_ok());
        assert_matches!(FrameFormat::Ascii.verify(&ok[..21]), Err(Error::InvalidResponse(_)));

        let failed = b"D00000FF03FF000004C059";
        assert_matches!(FrameFormat::Ascii.verify(failed), Err(Error::DeviceError(0xC059)));
        assert_eq!(FrameFormat::Ascii.body_len(&failed[..18]).unwrap(), 4);
    }

    #[test]
    fn ascii_decoding() {
        let words = b"D00000FF03FF000012000012340001";
        let value = FrameFormat::Ascii.decode(words, &address("D0"), 2).unwrap();
        assert_eq!(value, Value::Words(vec![0x1234, 0x0001]));

        let bits = b"D00000FF03FF0000070000101";
        let value = FrameFormat::Ascii.decode(bits, &address("M0"), 3).unwrap();
        assert_eq!(value, Value::Bits(vec![true, false, true]));

        assert_matches!(
            FrameFormat::Ascii.decode(bits, &address("M0"), 4),
            Err(Error::InvalidResponse(_))
        );
    }

    #[test]
    fn binary_verification_and_decoding() {
        let response = [0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x06, 0x00, 0x00, 0x00, 0x34, 0x12, 0x01, 0x00];
        assert_eq!(FrameFormat::Binary.body_len(&response[..9]).unwrap(), 6);
        assert!(FrameFormat::Binary.verify(&response).is_ok());
        assert_eq!(
            FrameFormat::Binary.decode(&response, &address("D0"), 2).unwrap(),
            Value::Words(vec![0x1234, 0x0001])
        );

        let bits = [0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x04, 0x00, 0x00, 0x00, 0x10, 0x10];
        assert_eq!(
            FrameFormat::Binary.decode(&bits, &address("M0"), 3).unwrap(),
            Value::Bits(vec![true, false, true])
        );

        let failed = [0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x02, 0x00, 0x59, 0xC0];
        assert_matches!(FrameFormat::Binary.verify(&failed), Err(Error::DeviceError(0xC059)));
        assert_matches!(FrameFormat::Binary.verify(&failed[..10]), Err(Error::InvalidResponse(_)));
    }
}

//! Modbus TCP and RTU clients.
//!
//! Both variants share the request handling in [`ModbusClient`] and differ only in their
//! [`Framing`]: MBAP over a TCP stream, or unit address plus CRC over a serial port.
use super::frame;
use super::pdu::{self, Request};
use crate::client::{ClientCore, Exchange, ProtocolClient};
use crate::config::{CommonConfig, SerialConfig, TcpConfig};
use crate::error::{Error, Result};
use crate::protocol::{self, ProtocolType};
use crate::result::{ReadResult, Reading, WriteResult};
use crate::transport;
use crate::value::{DataType, Value};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_serial::SerialStream;

/// How requests are put on the wire.
#[async_trait]
pub trait Framing: Send + Sync + 'static {
    type Link: AsyncRead + AsyncWrite + Unpin + Send;

    const PROTOCOL: ProtocolType;

    fn endpoint(&self) -> String;

    fn common(&self) -> &CommonConfig;

    async fn open(&self) -> io::Result<Self::Link>;

    /// Sends one request PDU and returns the verified response PDU.
    async fn transact(
        &self,
        link: &mut Self::Link,
        sequence: u16,
        unit_id: u8,
        request: &[u8],
    ) -> Result<Vec<u8>>;
}

/// MBAP framing over TCP.
pub struct TcpFraming {
    config: TcpConfig,
}

#[async_trait]
impl Framing for TcpFraming {
    type Link = TcpStream;

    const PROTOCOL: ProtocolType = ProtocolType::ModbusTcp;

    fn endpoint(&self) -> String {
        format!("modbus-tcp://{}:{}", self.config.host, self.config.port)
    }

    fn common(&self) -> &CommonConfig {
        &self.config.common
    }

    async fn open(&self) -> io::Result<TcpStream> {
        transport::open_tcp(&self.config).await
    }

    async fn transact(
        &self,
        link: &mut TcpStream,
        sequence: u16,
        unit_id: u8,
        request: &[u8],
    ) -> Result<Vec<u8>> {
        tcp_transact(link, sequence, unit_id, request, &self.config.common).await
    }
}

/// Unit address plus CRC16 over a serial port.
pub struct RtuFraming {
    config: SerialConfig,
    settle_delay: Duration,
}

#[async_trait]
impl Framing for RtuFraming {
    type Link = SerialStream;

    const PROTOCOL: ProtocolType = ProtocolType::ModbusRtu;

    fn endpoint(&self) -> String {
        format!(
            "modbus-rtu://{}@{}",
            self.config.port_name, self.config.baud_rate
        )
    }

    fn common(&self) -> &CommonConfig {
        &self.config.common
    }

    async fn open(&self) -> io::Result<SerialStream> {
        transport::open_serial(&self.config)
    }

    async fn transact(
        &self,
        link: &mut SerialStream,
        _sequence: u16,
        unit_id: u8,
        request: &[u8],
    ) -> Result<Vec<u8>> {
        rtu_transact(link, unit_id, request, self.settle_delay, &self.config.common).await
    }
}

pub(crate) async fn tcp_transact<S>(
    stream: &mut S,
    transaction_id: u16,
    unit_id: u8,
    request: &[u8],
    common: &CommonConfig,
) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let adu = frame::encode_tcp(transaction_id, unit_id, request);
    transport::send_all(stream, &adu, common.write_timeout).await?;
    let mut response =
        transport::receive_exact(stream, frame::MBAP_HEADER_LEN, common.read_timeout).await?;
    let remaining = frame::MbapHeader::parse(&response)?.pdu_len()?;
    response.extend(transport::receive_exact(stream, remaining, common.read_timeout).await?);
    log::trace!("RX: {}", transport::hex(&response));
    Ok(frame::decode_tcp(&response, transaction_id, unit_id)?.to_vec())
}

pub(crate) async fn rtu_transact<S>(
    port: &mut S,
    unit_id: u8,
    request: &[u8],
    settle_delay: Duration,
    common: &CommonConfig,
) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let adu = frame::encode_rtu(unit_id, request);
    transport::send_all(port, &adu, common.write_timeout).await?;
    if !settle_delay.is_zero() {
        tokio::time::sleep(settle_delay).await;
    }
    let mut response =
        transport::receive_exact(port, frame::RTU_PREFIX_LEN, common.read_timeout).await?;
    let total = frame::rtu_response_len(&response)?;
    response.extend(
        transport::receive_exact(port, total - frame::RTU_PREFIX_LEN, common.read_timeout).await?,
    );
    log::trace!("RX: {}", transport::hex(&response));
    Ok(frame::decode_rtu(&response, unit_id)?.to_vec())
}

/// A Modbus master bound to one device (unit).
///
/// [`ProtocolClient::read`] reads holding registers; coils and input registers are available
/// through [`ModbusClient::read_coils`] and [`ModbusClient::read_input_registers`]. Reads return
/// the raw payload as [`Value::Bytes`], tagged [`DataType::PackedWords`] or
/// [`DataType::PackedBits`].
pub struct ModbusClient<F: Framing> {
    framing: F,
    unit_id: u8,
    core: ClientCore<F::Link>,
}

pub type ModbusTcpClient = ModbusClient<TcpFraming>;
pub type ModbusRtuClient = ModbusClient<RtuFraming>;

impl ModbusClient<TcpFraming> {
    pub fn new(config: TcpConfig) -> Self {
        Self::with_framing(TcpFraming { config })
    }
}

impl ModbusClient<RtuFraming> {
    pub fn new(config: SerialConfig) -> Self {
        Self::with_framing(RtuFraming {
            config,
            settle_delay: protocol::DEFAULT_RTU_SETTLE_DELAY,
        })
    }

    /// Pause between sending a request and reading the response.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.framing.settle_delay = settle_delay;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum ReadKind {
    Coils,
    HoldingRegisters,
    InputRegisters,
}

impl ReadKind {
    fn request(self, address: u16, count: u16) -> Request {
        match self {
            ReadKind::Coils => Request::ReadCoils { address, count },
            ReadKind::HoldingRegisters => Request::ReadHoldingRegisters { address, count },
            ReadKind::InputRegisters => Request::ReadInputRegisters { address, count },
        }
    }

    fn data_type(self) -> DataType {
        match self {
            ReadKind::Coils => DataType::PackedBits,
            ReadKind::HoldingRegisters | ReadKind::InputRegisters => DataType::PackedWords,
        }
    }
}

/// Maps a value shape onto a write request.
fn write_request(address: u16, value: &Value) -> Result<Request> {
    match value {
        Value::U16(word) => Ok(Request::WriteSingleRegister {
            address,
            value: *word,
        }),
        Value::Words(words) if words.len() == 1 => Ok(Request::WriteSingleRegister {
            address,
            value: words[0],
        }),
        Value::Bytes(bytes) if bytes.len() == 2 => Ok(Request::WriteSingleRegister {
            address,
            value: u16::from_be_bytes([bytes[0], bytes[1]]),
        }),
        Value::Bool(bit) => Ok(Request::WriteMultipleCoils {
            address,
            values: vec![*bit],
        }),
        Value::Bits(bits) => Ok(Request::WriteMultipleCoils {
            address,
            values: bits.clone(),
        }),
        other => Err(Error::UnsupportedValueType {
            protocol: "Modbus",
            found: other.type_name(),
        }),
    }
}

impl<F: Framing> ModbusClient<F> {
    fn with_framing(framing: F) -> Self {
        let core = ClientCore::new(framing.endpoint());
        Self {
            framing,
            unit_id: protocol::DEFAULT_MODBUS_UNIT_ID,
            core,
        }
    }

    /// Sets the unit (slave) id requests are addressed to.
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    /// Reads coils (function code 0x01).
    pub async fn read_coils(&self, address: &str, count: u16) -> ReadResult {
        self.read_as(ReadKind::Coils, address, count).await
    }

    /// Reads holding registers (function code 0x03).
    pub async fn read_holding_registers(&self, address: &str, count: u16) -> ReadResult {
        self.read_as(ReadKind::HoldingRegisters, address, count).await
    }

    /// Reads input registers (function code 0x04).
    pub async fn read_input_registers(&self, address: &str, count: u16) -> ReadResult {
        self.read_as(ReadKind::InputRegisters, address, count).await
    }

    async fn read_as(&self, kind: ReadKind, address: &str, count: u16) -> ReadResult {
        ReadResult::from_outcome(address, self.try_read(kind, address, count).await)
    }

    async fn try_read(&self, kind: ReadKind, address: &str, count: u16) -> Result<Reading> {
        self.core.check_ready()?;
        let request = kind.request(pdu::parse_address(address)?, count);
        request.validate()?;
        let payload = self.execute(&request).await?;
        Ok(Reading {
            value: Value::Bytes(payload),
            data_type: kind.data_type(),
        })
    }

    async fn try_write(&self, address: &str, value: &Value) -> Result<()> {
        self.core.check_ready()?;
        let request = write_request(pdu::parse_address(address)?, value)?;
        request.validate()?;
        self.execute(&request).await?;
        Ok(())
    }

    async fn execute(&self, request: &Request) -> Result<Vec<u8>> {
        let mut exchange = self.core.begin().await?;
        let outcome = self.transact(&mut exchange, request).await;
        exchange.finish(outcome)
    }

    async fn transact(&self, exchange: &mut Exchange<'_, F::Link>, request: &Request) -> Result<Vec<u8>> {
        let sequence = exchange.next_sequence();
        log::debug!(
            "{}: unit {} function 0x{:02X} (#{sequence})",
            self.core.endpoint(),
            self.unit_id,
            request.function_code()
        );
        let link = exchange.link()?;
        let response = self
            .framing
            .transact(link, sequence, self.unit_id, &request.encode())
            .await?;
        request.parse_response(&response)
    }
}

#[async_trait]
impl<F: Framing> ProtocolClient for ModbusClient<F> {
    fn protocol(&self) -> ProtocolType {
        F::PROTOCOL
    }

    async fn connect(&self) -> bool {
        self.core.connect(|| self.framing.open()).await
    }

    async fn disconnect(&self) {
        self.core.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    async fn read(&self, address: &str, length: u16) -> ReadResult {
        self.read_holding_registers(address, length).await
    }

    async fn write(&self, address: &str, value: Value) -> WriteResult {
        let outcome = self.try_write(address, &value).await;
        WriteResult::from_outcome(address, value, outcome)
    }

    fn dispose(&self) {
        self.core.dispose()
    }
}

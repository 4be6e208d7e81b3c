use super::area::FinsAddress;
use super::frame::{self, Command, Header};
use crate::client::{BatchPolicy, ClientCore, ProtocolClient};
use crate::config::{CommonConfig, FinsConfig};
use crate::error::{Error, Result};
use crate::protocol::ProtocolType;
use crate::result::{ReadResult, Reading, WriteResult};
use crate::transport;
use crate::value::{DataType, Value};
use async_trait::async_trait;
use std::io;
use tokio::net::{TcpStream, UdpSocket};

/// Address reported in the results of [`FinsClient::read_cpu_status`].
pub const CPU_STATUS_ADDRESS: &str = "CPU_STATUS";

/// The transport chosen at connect time.
pub(crate) enum FinsLink {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl FinsLink {
    async fn open(config: &FinsConfig) -> io::Result<Self> {
        if config.use_tcp {
            transport::open_tcp(&config.tcp).await.map(FinsLink::Tcp)
        } else {
            transport::open_udp(
                &config.tcp.host,
                config.udp_port,
                config.tcp.common.connection_timeout,
            )
            .await
            .map(FinsLink::Udp)
        }
    }

    fn is_stream(&self) -> bool {
        matches!(self, FinsLink::Tcp(_))
    }

    /// Sends one frame and waits for one response.
    ///
    /// On TCP the response length follows from the command and the response code.
    async fn exchange(
        &mut self,
        command: &Command,
        frame: &[u8],
        common: &CommonConfig,
    ) -> Result<Vec<u8>> {
        match self {
            FinsLink::Tcp(stream) => {
                transport::send_all(stream, frame, common.write_timeout).await?;
                let mut response =
                    transport::receive_exact(stream, frame::MIN_RESPONSE_LEN, common.read_timeout)
                        .await?;
                let remaining = command.remaining_response_len(&response);
                if remaining > 0 {
                    let rest = transport::receive_exact(stream, remaining, common.read_timeout).await?;
                    response.extend_from_slice(&rest);
                }
                log::trace!("RX: {}", transport::hex(&response));
                Ok(response)
            }
            FinsLink::Udp(socket) => {
                transport::drain_datagrams(socket);
                transport::send_datagram(socket, frame, common.write_timeout).await?;
                transport::receive_datagram(socket, common.read_timeout).await
            }
        }
    }
}

/// An Omron FINS client over UDP or TCP.
///
/// Every area is word addressed: reads return [`Value::Words`], writes take `U16` or `Words`.
/// Over UDP each command is sent up to `retry_count` times; see [`FinsClient::new`]. Batches stop at
/// the first failed entry.
pub struct FinsClient {
    config: FinsConfig,
    header: Header,
    core: ClientCore<FinsLink>,
}

impl FinsClient {
    /// Creates a client; nothing is opened until [`ProtocolClient::connect`].
    ///
    /// Over UDP a command is retried when sending fails, no response arrives in time or the
    /// response is malformed. Over TCP those failures close the link at once. A well-formed
    /// response ends the attempts, and its response code decides the outcome.
    pub fn new(config: FinsConfig) -> Self {
        let endpoint = if config.use_tcp {
            format!("fins-tcp://{}:{}", config.tcp.host, config.tcp.port)
        } else {
            format!("fins-udp://{}:{}", config.tcp.host, config.udp_port)
        };
        Self {
            header: Header::from_config(&config),
            core: ClientCore::new(endpoint),
            config,
        }
    }

    /// Reads the operating mode, run switch and error flag of the CPU unit.
    pub async fn read_cpu_status(&self) -> ReadResult {
        ReadResult::from_outcome(CPU_STATUS_ADDRESS, self.try_read_cpu_status().await)
    }

    async fn try_read_cpu_status(&self) -> Result<Reading> {
        self.core.check_ready()?;
        let response = self.execute(&Command::CpuUnitStatusRead).await?;
        Ok(Reading {
            value: Value::CpuStatus(frame::decode_cpu_status(&response)?),
            data_type: DataType::CpuStatus,
        })
    }

    async fn try_read(&self, address: &str, length: u16) -> Result<Reading> {
        self.core.check_ready()?;
        let command = Command::read(FinsAddress::parse(address)?, length)?;
        let response = self.execute(&command).await?;
        let words = frame::decode_words(&response)?;
        if words.len() != usize::from(length) {
            return Err(Error::invalid_response(format!(
                "requested {length} words, received {}",
                words.len()
            )));
        }
        Ok(Reading {
            value: Value::Words(words),
            data_type: DataType::Words,
        })
    }

    async fn try_write(&self, address: &str, value: &Value) -> Result<()> {
        self.core.check_ready()?;
        let command = Command::write(FinsAddress::parse(address)?, value)?;
        self.execute(&command).await?;
        Ok(())
    }

    /// Runs one command, including its retries, under a single lock.
    async fn execute(&self, command: &Command) -> Result<Vec<u8>> {
        let mut exchange = self.core.begin().await?;
        let command_id = exchange.next_sequence();
        let request = command.encode(&self.header, command_id);
        log::debug!(
            "{}: command 0x{:04X} (#{command_id})",
            self.core.endpoint(),
            command.code()
        );
        let outcome = match exchange.link() {
            Ok(link) => self.send_with_retry(link, command, &request).await,
            Err(error) => Err(error),
        };
        exchange.finish(outcome)
    }

    async fn send_with_retry(
        &self,
        link: &mut FinsLink,
        command: &Command,
        request: &[u8],
    ) -> Result<Vec<u8>> {
        let common = &self.config.tcp.common;
        let attempts = common.retry_count.max(1);
        let mut attempt = 1;
        loop {
            let error = match link.exchange(command, request, common).await {
                Ok(response) => match command.check_structure(&response) {
                    Ok(()) => {
                        command.check_code(&response)?;
                        return Ok(response);
                    }
                    Err(error) => error,
                },
                Err(error) => error,
            };
            // A stream cannot be resynchronised once its position is unknown.
            if attempt >= attempts || (link.is_stream() && error.breaks_link()) {
                return Err(error);
            }
            log::warn!(
                "{}: attempt {attempt}/{attempts} failed: {error}",
                self.core.endpoint()
            );
            attempt += 1;
        }
    }
}

#[async_trait]
impl ProtocolClient for FinsClient {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::OmronFins
    }

    async fn connect(&self) -> bool {
        self.core.connect(|| FinsLink::open(&self.config)).await
    }

    async fn disconnect(&self) {
        self.core.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    async fn read(&self, address: &str, length: u16) -> ReadResult {
        ReadResult::from_outcome(address, self.try_read(address, length).await)
    }

    async fn write(&self, address: &str, value: Value) -> WriteResult {
        let outcome = self.try_write(address, &value).await;
        WriteResult::from_outcome(address, value, outcome)
    }

    fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy::StopOnFirstError
    }

    fn dispose(&self) {
        self.core.dispose()
    }
}

use super::device::McAddress;
use super::frame::{FrameFormat, Request, Route};
use crate::client::{BatchPolicy, ClientCore, ProtocolClient};
use crate::config::{CommonConfig, McConfig};
use crate::error::Result;
use crate::protocol::ProtocolType;
use crate::result::{ReadResult, Reading, WriteResult};
use crate::transport;
use crate::value::Value;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Sends one 3E request and returns the complete, end-code checked response.
pub(crate) async fn transact<S>(
    stream: &mut S,
    format: FrameFormat,
    route: &Route,
    request: &Request,
    common: &CommonConfig,
) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = format.encode(route, request);
    transport::send_all(stream, &frame, common.write_timeout).await?;
    let mut response =
        transport::receive_exact(stream, format.header_len(), common.read_timeout).await?;
    let remaining = format.body_len(&response)?;
    response.extend(transport::receive_exact(stream, remaining, common.read_timeout).await?);
    log::trace!("RX: {}", transport::hex(&response));
    format.verify(&response)?;
    Ok(response)
}

/// A Mitsubishi MC protocol (3E frame) client over TCP.
///
/// Word devices read as [`Value::Words`], bit devices as [`Value::Bits`]. Batches stop at the
/// first failed entry.
pub struct McClient {
    config: McConfig,
    route: Route,
    format: FrameFormat,
    core: ClientCore<TcpStream>,
}

impl McClient {
    pub fn new(config: McConfig) -> Self {
        let format = FrameFormat::from_config(&config);
        let core = ClientCore::new(format!(
            "mc-{}://{}:{}",
            match format {
                FrameFormat::Ascii => "ascii",
                FrameFormat::Binary => "binary",
            },
            config.tcp.host,
            config.tcp.port
        ));
        Self {
            route: Route::from_config(&config),
            format,
            config,
            core,
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    async fn try_read(&self, address: &str, length: u16) -> Result<Reading> {
        self.core.check_ready()?;
        let address = McAddress::parse(address)?;
        let request = Request::read(address, length)?;
        let response = self.execute(&request).await?;
        Ok(Reading {
            value: self.format.decode(&response, &address, length)?,
            data_type: address.element().data_type(),
        })
    }

    async fn try_write(&self, address: &str, value: &Value) -> Result<()> {
        self.core.check_ready()?;
        let request = Request::write(McAddress::parse(address)?, value)?;
        self.execute(&request).await?;
        Ok(())
    }

    async fn execute(&self, request: &Request) -> Result<Vec<u8>> {
        let mut exchange = self.core.begin().await?;
        log::debug!(
            "{}: command 0x{:04X} {} x{}",
            self.core.endpoint(),
            request.command(),
            request.address(),
            request.points()
        );
        let outcome = match exchange.link() {
            Ok(link) => {
                transact(link, self.format, &self.route, request, &self.config.tcp.common).await
            }
            Err(error) => Err(error),
        };
        exchange.finish(outcome)
    }
}

#[async_trait]
impl ProtocolClient for McClient {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::MitsubishiMc
    }

    async fn connect(&self) -> bool {
        self.core.connect(|| transport::open_tcp(&self.config.tcp)).await
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

//! Transport plumbing shared by the clients.
//!
//! Opening TCP/UDP/serial links with the configured deadlines, deadline-bounded send and
//! receive helpers and the serial port settings.
use crate::config::{Parity, SerialConfig, StopBits, TcpConfig};
use crate::error::{Error, Result};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// Largest datagram accepted from a device.
pub const MAX_PACKET_SIZE: usize = 2048;

/// Creates a `tokio_serial::SerialPortBuilder` from a [`SerialConfig`].
///
/// Settings the serial backend cannot represent are rejected earlier by
/// [`SerialConfig::validate`].
pub fn serial_port_builder(config: &SerialConfig) -> tokio_serial::SerialPortBuilder {
    let data_bits = match config.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };
    let stop_bits = match config.stop_bits {
        StopBits::Two => tokio_serial::StopBits::Two,
        StopBits::One | StopBits::OnePointFive => tokio_serial::StopBits::One,
    };
    let parity = match config.parity {
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::None | Parity::Mark | Parity::Space => tokio_serial::Parity::None,
    };
    tokio_serial::new(&config.port_name, config.baud_rate)
        .parity(parity)
        .stop_bits(stop_bits)
        .data_bits(data_bits)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(config.common.read_timeout)
}

pub(crate) fn open_serial(config: &SerialConfig) -> io::Result<tokio_serial::SerialStream> {
    tokio_serial::SerialStream::open(&serial_port_builder(config)).map_err(io::Error::from)
}

fn elapsed(what: &str, endpoint: &str, limit: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{what} {endpoint} did not complete within {limit:?}"),
    )
}

/// Opens a TCP stream within the connection timeout.
pub(crate) async fn open_tcp(config: &TcpConfig) -> io::Result<TcpStream> {
    let endpoint = format!("{}:{}", config.host, config.port);
    let limit = config.common.connection_timeout;
    let stream = tokio::time::timeout(limit, TcpStream::connect(endpoint.as_str()))
        .await
        .map_err(|_| elapsed("Connecting to", &endpoint, limit))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Binds an ephemeral UDP socket and connects it to `host:port`.
pub(crate) async fn open_udp(host: &str, port: u16, limit: Duration) -> io::Result<UdpSocket> {
    let endpoint = format!("{host}:{port}");
    let open = async {
        let target = tokio::net::lookup_host(endpoint.as_str())
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("Cannot resolve {endpoint}")))?;
        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        Ok::<_, io::Error>(socket)
    };
    tokio::time::timeout(limit, open)
        .await
        .map_err(|_| elapsed("Binding to", &endpoint, limit))?
}

/// Runs an I/O future under a deadline, mapping expiry to [`Error::Timeout`].
pub(crate) async fn deadline<T>(
    limit: Duration,
    operation: impl Future<Output = io::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::Timeout(limit)),
    }
}

pub(crate) async fn send_all<S>(stream: &mut S, frame: &[u8], limit: Duration) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    log::trace!("TX: {}", hex(frame));
    deadline(limit, async {
        stream.write_all(frame).await?;
        stream.flush().await
    })
    .await
}

pub(crate) async fn receive_exact<S>(stream: &mut S, len: usize, limit: Duration) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    deadline(limit, stream.read_exact(&mut buf)).await?;
    Ok(buf)
}

pub(crate) async fn send_datagram(socket: &UdpSocket, frame: &[u8], limit: Duration) -> Result<()> {
    log::trace!("TX: {}", hex(frame));
    deadline(limit, socket.send(frame)).await?;
    Ok(())
}

pub(crate) async fn receive_datagram(socket: &UdpSocket, limit: Duration) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let n = deadline(limit, socket.recv(&mut buf)).await?;
    buf.truncate(n);
    log::trace!("RX: {}", hex(&buf));
    Ok(buf)
}

/// Discards datagrams still queued from an earlier, abandoned exchange.
pub(crate) fn drain_datagrams(socket: &UdpSocket) -> usize {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    let mut drained = 0;
    while socket.try_recv(&mut buf).is_ok() {
        drained += 1;
    }
    if drained > 0 {
        log::debug!("Discarded {drained} stale datagram(s)");
    }
    drained
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::error::ErrorKind;

    #[test]
    fn hex_format() {
        assert_eq!(hex(&[0x01, 0xAB, 0x00]), "01 AB 00");
        assert_eq!(hex(&[]), "");
    }

    #[tokio::test]
    async fn receive_exact_times_out() {
        let (mut client, _server) = tokio::io::duplex(64);
        let err = receive_exact(&mut client, 4, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Timeout(limit) if limit == Duration::from_millis(20));
    }

    #[tokio::test]
    async fn receive_exact_reports_eof_as_transport_error() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);
        let err = receive_exact(&mut client, 4, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn send_then_receive() {
        let (mut client, mut server) = tokio::io::duplex(64);
        send_all(&mut client, &[1, 2, 3], Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(
            receive_exact(&mut server, 3, Duration::from_millis(200)).await.unwrap(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn udp_drain_discards_queued_datagrams() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();
        let socket = open_udp("127.0.0.1", port, Duration::from_secs(1)).await.unwrap();
        peer.send_to(b"stale", socket.local_addr().unwrap()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(drain_datagrams(&socket), 1);
        assert_eq!(drain_datagrams(&socket), 0);
    }
}

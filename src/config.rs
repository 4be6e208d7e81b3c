//! Connection configuration value objects.
//!
//! A configuration is handed to [`crate::factory::ClientFactory::create`] and is never
//! modified afterwards; each client keeps its own copy. With the `serde` feature every type
//! can be loaded from YAML, durations use the `humantime` syntax (`"5s"`, `"250ms"`):
//!
//! ```yaml
//! protocol: omron-fins
//! connection:
//!   type: omron-fins
//!   host: 192.168.250.1
//!   port: 9600
//!   read_timeout: 1s
//!   remote:
//!     node: 1
//! ```
use crate::error::ConfigError;
use crate::protocol;
use std::time::Duration;

#[cfg(feature = "serde")]
fn default_connection_timeout() -> Duration {
    protocol::DEFAULT_CONNECTION_TIMEOUT
}

#[cfg(feature = "serde")]
fn default_read_timeout() -> Duration {
    protocol::DEFAULT_READ_TIMEOUT
}

#[cfg(feature = "serde")]
fn default_write_timeout() -> Duration {
    protocol::DEFAULT_WRITE_TIMEOUT
}

#[cfg(feature = "serde")]
fn default_retry_count() -> u32 {
    protocol::DEFAULT_RETRY_COUNT
}

#[cfg(feature = "serde")]
fn default_host() -> String {
    String::from("127.0.0.1")
}

#[cfg(feature = "serde")]
fn default_modbus_port() -> u16 {
    protocol::DEFAULT_MODBUS_TCP_PORT
}

/// Timeouts and retry policy shared by every connection type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommonConfig {
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_connection_timeout", with = "humantime_serde")
    )]
    pub connection_timeout: Duration,
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_read_timeout", with = "humantime_serde")
    )]
    pub read_timeout: Duration,
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_write_timeout", with = "humantime_serde")
    )]
    pub write_timeout: Duration,
    /// Number of attempts for protocols with a built-in retry loop (FINS).
    #[cfg_attr(feature = "serde", serde(default = "default_retry_count"))]
    pub retry_count: u32,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            connection_timeout: protocol::DEFAULT_CONNECTION_TIMEOUT,
            read_timeout: protocol::DEFAULT_READ_TIMEOUT,
            write_timeout: protocol::DEFAULT_WRITE_TIMEOUT,
            retry_count: protocol::DEFAULT_RETRY_COUNT,
        }
    }
}

/// A TCP (or UDP) endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TcpConfig {
    #[cfg_attr(feature = "serde", serde(default = "default_host"))]
    pub host: String,
    #[cfg_attr(feature = "serde", serde(default = "default_modbus_port"))]
    pub port: u16,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub common: CommonConfig,
}

impl TcpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            common: CommonConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(u32::from(self.port)));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "host",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", protocol::DEFAULT_MODBUS_TCP_PORT)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

#[cfg(feature = "serde")]
fn default_port_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

#[cfg(feature = "serde")]
fn default_baud_rate() -> u32 {
    protocol::DEFAULT_BAUD_RATE
}

#[cfg(feature = "serde")]
fn default_data_bits() -> u8 {
    protocol::DEFAULT_DATA_BITS
}

/// A serial port, used by Modbus RTU.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialConfig {
    #[cfg_attr(feature = "serde", serde(default = "default_port_name"))]
    pub port_name: String,
    #[cfg_attr(feature = "serde", serde(default = "default_baud_rate"))]
    pub baud_rate: u32,
    #[cfg_attr(feature = "serde", serde(default = "default_data_bits"))]
    pub data_bits: u8,
    #[cfg_attr(feature = "serde", serde(default))]
    pub stop_bits: StopBits,
    #[cfg_attr(feature = "serde", serde(default))]
    pub parity: Parity,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub common: CommonConfig,
}

impl SerialConfig {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: protocol::DEFAULT_DATA_BITS,
            stop_bits: StopBits::default(),
            parity: Parity::default(),
            common: CommonConfig::default(),
        }
    }

    /// Checks that the settings can be applied to a serial port.
    ///
    /// The serial backend supports neither 1.5 stop bits nor mark/space parity, so those are
    /// rejected here instead of failing later on `connect`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_name.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "port_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "baud_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::InvalidSetting {
                field: "data_bits",
                reason: format!("{} is not in 5..=8", self.data_bits),
            });
        }
        if self.stop_bits == StopBits::OnePointFive {
            return Err(ConfigError::InvalidSetting {
                field: "stop_bits",
                reason: "1.5 stop bits are not supported by the serial backend".to_string(),
            });
        }
        if matches!(self.parity, Parity::Mark | Parity::Space) {
            return Err(ConfigError::InvalidSetting {
                field: "parity",
                reason: format!("{:?} parity is not supported by the serial backend", self.parity),
            });
        }
        Ok(())
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port_name = if cfg!(target_os = "windows") {
            "COM1"
        } else {
            "/dev/ttyUSB0"
        };
        Self::new(port_name, protocol::DEFAULT_BAUD_RATE)
    }
}

#[cfg(feature = "serde")]
fn default_pc_number() -> u8 {
    protocol::DEFAULT_MC_PC_NUMBER
}

#[cfg(feature = "serde")]
fn default_module_io() -> u16 {
    protocol::DEFAULT_MC_MODULE_IO
}

#[cfg(feature = "serde")]
fn default_cpu_watch_timer() -> Duration {
    protocol::DEFAULT_MC_CPU_WATCH_TIMER
}

/// Mitsubishi MC protocol (3E frame) endpoint and routing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct McConfig {
    /// Endpoint; in YAML its fields sit at the same level and `port` should be given.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub tcp: TcpConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub network_number: u8,
    #[cfg_attr(feature = "serde", serde(default = "default_pc_number"))]
    pub pc_number: u8,
    #[cfg_attr(feature = "serde", serde(default = "default_module_io"))]
    pub target_module_io: u16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub target_module_station: u8,
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_cpu_watch_timer", with = "humantime_serde")
    )]
    pub cpu_watch_timer: Duration,
    #[cfg_attr(feature = "serde", serde(default))]
    pub use_binary_format: bool,
}

impl McConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            tcp: TcpConfig::new(host, port),
            network_number: 0,
            pc_number: protocol::DEFAULT_MC_PC_NUMBER,
            target_module_io: protocol::DEFAULT_MC_MODULE_IO,
            target_module_station: 0,
            cpu_watch_timer: protocol::DEFAULT_MC_CPU_WATCH_TIMER,
            use_binary_format: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tcp.validate()
    }
}

impl Default for McConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", protocol::DEFAULT_MC_PORT)
    }
}

/// A FINS network/node/unit triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct NodeAddress {
    pub network: u8,
    pub node: u8,
    pub unit: u8,
}

impl NodeAddress {
    pub const fn new(network: u8, node: u8, unit: u8) -> Self {
        Self {
            network,
            node,
            unit,
        }
    }
}

#[cfg(feature = "serde")]
fn default_fins_remote() -> NodeAddress {
    NodeAddress::new(0, protocol::DEFAULT_FINS_REMOTE_NODE, 0)
}

#[cfg(feature = "serde")]
fn default_fins_udp_port() -> u16 {
    protocol::DEFAULT_FINS_PORT
}

/// Omron FINS endpoint and node routing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FinsConfig {
    /// Host plus the port used when `use_tcp` is set.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub tcp: TcpConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub local: NodeAddress,
    /// The PLC; its node number must be set.
    #[cfg_attr(feature = "serde", serde(default = "default_fins_remote"))]
    pub remote: NodeAddress,
    #[cfg_attr(feature = "serde", serde(default = "default_fins_udp_port"))]
    pub udp_port: u16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub use_tcp: bool,
}

impl FinsConfig {
    pub fn new(host: impl Into<String>, remote_node: u8) -> Self {
        Self {
            tcp: TcpConfig::new(host, protocol::DEFAULT_FINS_PORT),
            local: NodeAddress::default(),
            remote: NodeAddress::new(0, remote_node, 0),
            udp_port: protocol::DEFAULT_FINS_PORT,
            use_tcp: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tcp.validate()?;
        if !self.use_tcp && self.udp_port == 0 {
            return Err(ConfigError::InvalidPort(0));
        }
        if self.remote.node == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "remote.node",
                reason: "the remote node number identifies the PLC and must be set".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FinsConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", protocol::DEFAULT_FINS_REMOTE_NODE)
    }
}

/// Any connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "type", rename_all = "kebab-case")
)]
pub enum ConnectionConfig {
    Tcp(TcpConfig),
    Serial(SerialConfig),
    MitsubishiMc(McConfig),
    OmronFins(FinsConfig),
}

impl ConnectionConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConnectionConfig::Tcp(_) => "tcp",
            ConnectionConfig::Serial(_) => "serial",
            ConnectionConfig::MitsubishiMc(_) => "mitsubishi-mc",
            ConnectionConfig::OmronFins(_) => "omron-fins",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ConnectionConfig::Tcp(config) => config.validate(),
            ConnectionConfig::Serial(config) => config.validate(),
            ConnectionConfig::MitsubishiMc(config) => config.validate(),
            ConnectionConfig::OmronFins(config) => config.validate(),
        }
    }

    pub fn common(&self) -> &CommonConfig {
        match self {
            ConnectionConfig::Tcp(config) => &config.common,
            ConnectionConfig::Serial(config) => &config.common,
            ConnectionConfig::MitsubishiMc(config) => &config.tcp.common,
            ConnectionConfig::OmronFins(config) => &config.tcp.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut CommonConfig {
        match self {
            ConnectionConfig::Tcp(config) => &mut config.common,
            ConnectionConfig::Serial(config) => &mut config.common,
            ConnectionConfig::MitsubishiMc(config) => &mut config.tcp.common,
            ConnectionConfig::OmronFins(config) => &mut config.tcp.common,
        }
    }
}

impl From<TcpConfig> for ConnectionConfig {
    fn from(config: TcpConfig) -> Self {
        ConnectionConfig::Tcp(config)
    }
}

impl From<SerialConfig> for ConnectionConfig {
    fn from(config: SerialConfig) -> Self {
        ConnectionConfig::Serial(config)
    }
}

impl From<McConfig> for ConnectionConfig {
    fn from(config: McConfig) -> Self {
        ConnectionConfig::MitsubishiMc(config)
    }
}

impl From<FinsConfig> for ConnectionConfig {
    fn from(config: FinsConfig) -> Self {
        ConnectionConfig::OmronFins(config)
    }
}

/// A device description: which protocol to speak and how to reach the device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    pub protocol: protocol::ProtocolType,
    pub connection: ConnectionConfig,
}

#[cfg(feature = "serde")]
impl DeviceConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading device config from {path:?}");
        let file = std::fs::File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let common = CommonConfig::default();
        assert_eq!(common.connection_timeout, Duration::from_secs(5));
        assert_eq!(common.read_timeout, Duration::from_secs(3));
        assert_eq!(common.retry_count, 3);

        let mc = McConfig::default();
        assert_eq!(mc.tcp.port, 5007);
        assert_eq!(mc.pc_number, 0xFF);
        assert_eq!(mc.cpu_watch_timer, Duration::from_millis(8000));

        let fins = FinsConfig::default();
        assert_eq!(fins.remote.node, 1);
        assert_eq!(fins.udp_port, 9600);
        assert!(!fins.use_tcp);
    }

    #[test]
    fn validation() {
        assert_matches!(
            TcpConfig::new("plc", 0).validate(),
            Err(ConfigError::InvalidPort(0))
        );
        assert!(TcpConfig::new("plc", 502).validate().is_ok());

        let mut serial = SerialConfig::new("/dev/ttyS0", 19200);
        assert!(serial.validate().is_ok());
        serial.stop_bits = StopBits::OnePointFive;
        assert_matches!(
            serial.validate(),
            Err(ConfigError::InvalidSetting { field: "stop_bits", .. })
        );
        serial.stop_bits = StopBits::Two;
        serial.parity = Parity::Mark;
        assert_matches!(
            serial.validate(),
            Err(ConfigError::InvalidSetting { field: "parity", .. })
        );
        serial.parity = Parity::Even;
        serial.data_bits = 9;
        assert_matches!(
            serial.validate(),
            Err(ConfigError::InvalidSetting { field: "data_bits", .. })
        );

        let fins = FinsConfig::new("plc", 0);
        assert_matches!(
            fins.validate(),
            Err(ConfigError::InvalidSetting { field: "remote.node", .. })
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn load_yaml_device() {
        let yaml = r#"
protocol: omron-fins
connection:
  type: omron-fins
  host: 192.168.250.1
  port: 9600
  read_timeout: 1s
  retry_count: 5
  remote:
    node: 10
  use_tcp: true
"#;
        let device = DeviceConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(device.protocol, protocol::ProtocolType::OmronFins);
        let ConnectionConfig::OmronFins(fins) = device.connection else {
            panic!("unexpected connection type");
        };
        assert_eq!(fins.tcp.host, "192.168.250.1");
        assert_eq!(fins.tcp.port, 9600);
        assert_eq!(fins.tcp.common.read_timeout, Duration::from_secs(1));
        assert_eq!(fins.tcp.common.write_timeout, Duration::from_secs(3));
        assert_eq!(fins.tcp.common.retry_count, 5);
        assert_eq!(fins.remote, NodeAddress::new(0, 10, 0));
        assert!(fins.use_tcp);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn load_yaml_serial() {
        let yaml = r#"
protocol: modbus-rtu
connection:
  type: serial
  port_name: /dev/ttyUSB1
  baud_rate: 19200
  parity: Even
"#;
        let device = DeviceConfig::from_yaml_str(yaml).unwrap();
        assert_matches!(
            device.connection,
            ConnectionConfig::Serial(SerialConfig { baud_rate: 19200, parity: Parity::Even, data_bits: 8, .. })
        );
        assert_matches!(
            DeviceConfig::from_yaml_str("protocol: modbus-tcp\nconnection:\n  type: carrier-pigeon\n"),
            Err(ConfigError::Yaml(_))
        );
    }
}

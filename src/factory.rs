//! Builds clients from a protocol tag and a connection configuration.
use crate::client::ProtocolClient;
use crate::config::{ConnectionConfig, DeviceConfig};
use crate::error::ConfigError;
use crate::fins::FinsClient;
use crate::mc::McClient;
use crate::modbus::{ModbusRtuClient, ModbusTcpClient};
use crate::protocol::ProtocolType;
use std::collections::HashMap;

/// Builds a client for a protocol the crate does not implement itself.
pub type Constructor =
    Box<dyn Fn(ConnectionConfig) -> Result<Box<dyn ProtocolClient>, ConfigError> + Send + Sync>;

/// Maps a [`ProtocolType`] and a [`ConnectionConfig`] to a client.
///
/// Modbus TCP/RTU, Mitsubishi MC and Omron FINS are built in. Other tags (OPC UA, BACnet,
/// Siemens S7, custom) must be registered with [`ClientFactory::register`].
///
/// ```
/// use plclink_lib::{ClientFactory, ConfigError, ProtocolType};
/// use plclink_lib::config::SerialConfig;
///
/// let factory = ClientFactory::new();
/// let result = factory.create(ProtocolType::ModbusTcp, SerialConfig::default().into());
/// assert!(matches!(result, Err(ConfigError::WrongConfigType { .. })));
/// ```
#[derive(Default)]
pub struct ClientFactory {
    registered: HashMap<ProtocolType, Constructor>,
}

fn wrong_config(
    protocol: ProtocolType,
    expected: &'static str,
    config: &ConnectionConfig,
) -> ConfigError {
    ConfigError::WrongConfigType {
        protocol,
        expected,
        found: config.kind_name(),
    }
}

impl ClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for a protocol that is not built in.
    ///
    /// Built-in protocols always use their own client, so registering one of them has no
    /// effect on [`ClientFactory::create`].
    pub fn register<F>(&mut self, protocol: ProtocolType, constructor: F) -> &mut Self
    where
        F: Fn(ConnectionConfig) -> Result<Box<dyn ProtocolClient>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        if Self::is_builtin(protocol) {
            log::warn!("Ignoring constructor for built-in protocol {protocol}");
        } else {
            self.registered.insert(protocol, Box::new(constructor));
        }
        self
    }

    pub fn is_builtin(protocol: ProtocolType) -> bool {
        matches!(
            protocol,
            ProtocolType::ModbusTcp
                | ProtocolType::ModbusRtu
                | ProtocolType::MitsubishiMc
                | ProtocolType::OmronFins
        )
    }

    pub fn supports(&self, protocol: ProtocolType) -> bool {
        Self::is_builtin(protocol) || self.registered.contains_key(&protocol)
    }

    /// Creates a disconnected client.
    ///
    /// The configuration must be of the kind the protocol requires and valid; nothing is
    /// opened here.
    pub fn create(
        &self,
        protocol: ProtocolType,
        config: ConnectionConfig,
    ) -> Result<Box<dyn ProtocolClient>, ConfigError> {
        let client: Box<dyn ProtocolClient> = match (protocol, config) {
            (ProtocolType::ModbusTcp, ConnectionConfig::Tcp(tcp)) => {
                tcp.validate()?;
                Box::new(ModbusTcpClient::new(tcp))
            }
            (ProtocolType::ModbusRtu, ConnectionConfig::Serial(serial)) => {
                serial.validate()?;
                Box::new(ModbusRtuClient::new(serial))
            }
            (ProtocolType::MitsubishiMc, ConnectionConfig::MitsubishiMc(mc)) => {
                mc.validate()?;
                Box::new(McClient::new(mc))
            }
            (ProtocolType::OmronFins, ConnectionConfig::OmronFins(fins)) => {
                fins.validate()?;
                Box::new(FinsClient::new(fins))
            }
            (ProtocolType::ModbusTcp, other) => return Err(wrong_config(protocol, "tcp", &other)),
            (ProtocolType::ModbusRtu, other) => {
                return Err(wrong_config(protocol, "serial", &other))
            }
            (ProtocolType::MitsubishiMc, other) => {
                return Err(wrong_config(protocol, "mitsubishi-mc", &other))
            }
            (ProtocolType::OmronFins, other) => {
                return Err(wrong_config(protocol, "omron-fins", &other))
            }
            (other, config) => {
                let constructor = self
                    .registered
                    .get(&other)
                    .ok_or_else(|| ConfigError::UnsupportedProtocol(other.to_string()))?;
                config.validate()?;
                constructor(config)?
            }
        };
        log::debug!("Created {protocol} client");
        Ok(client)
    }

    /// Creates the client described by a device configuration.
    pub fn create_device(&self, device: &DeviceConfig) -> Result<Box<dyn ProtocolClient>, ConfigError> {
        self.create(device.protocol, device.connection.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FinsConfig, McConfig, SerialConfig, TcpConfig};
    use crate::result::{OperationResult, ReadResult, WriteResult};
    use crate::value::{DataType, Value};
    use crate::Error;
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    #[test]
    fn builds_the_matching_client() {
        let factory = ClientFactory::new();
        let cases: [(ProtocolType, ConnectionConfig); 4] = [
            (ProtocolType::ModbusTcp, TcpConfig::new("plc", 502).into()),
            (ProtocolType::ModbusRtu, SerialConfig::new("/dev/ttyS0", 9600).into()),
            (ProtocolType::MitsubishiMc, McConfig::new("plc", 5007).into()),
            (ProtocolType::OmronFins, FinsConfig::new("plc", 3).into()),
        ];
        for (protocol, config) in cases {
            let client = factory.create(protocol, config).unwrap();
            assert_eq!(client.protocol(), protocol);
            assert!(!client.is_connected());
        }
    }

    #[test]
    fn wrong_config_type_is_rejected() {
        let factory = ClientFactory::new();
        assert_matches!(
            factory.create(ProtocolType::ModbusTcp, SerialConfig::default().into()).err(),
            Some(ConfigError::WrongConfigType {
                protocol: ProtocolType::ModbusTcp,
                expected: "tcp",
                found: "serial",
            })
        );
        assert_matches!(
            factory.create(ProtocolType::OmronFins, TcpConfig::default().into()).err(),
            Some(ConfigError::WrongConfigType { found: "tcp", .. })
        );
        assert_matches!(
            factory.create(ProtocolType::MitsubishiMc, FinsConfig::default().into()).err(),
            Some(ConfigError::WrongConfigType { .. })
        );
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let factory = ClientFactory::new();
        assert_matches!(
            factory.create(ProtocolType::ModbusTcp, TcpConfig::new("plc", 0).into()).err(),
            Some(ConfigError::InvalidPort(0))
        );
        assert_matches!(
            factory.create(ProtocolType::OmronFins, FinsConfig::new("plc", 0).into()).err(),
            Some(ConfigError::InvalidSetting { field: "remote.node", .. })
        );
    }

    struct Stub;

    #[async_trait]
    impl ProtocolClient for Stub {
        fn protocol(&self) -> ProtocolType {
            ProtocolType::OpcUa
        }

        async fn connect(&self) -> bool {
            true
        }

        async fn disconnect(&self) {}

        fn is_connected(&self) -> bool {
            false
        }

        async fn read(&self, address: &str, _length: u16) -> ReadResult {
            ReadResult::success(address, Value::U16(0), DataType::Words)
        }

        async fn write(&self, address: &str, value: Value) -> WriteResult {
            WriteResult::failure(address, value, Error::NotConnected)
        }

        fn dispose(&self) {}
    }

    #[tokio::test]
    async fn external_protocols_need_registration() {
        let mut factory = ClientFactory::new();
        assert!(!factory.supports(ProtocolType::OpcUa));
        assert_matches!(
            factory.create(ProtocolType::OpcUa, TcpConfig::default().into()).err(),
            Some(ConfigError::UnsupportedProtocol(name)) if name == "opc-ua"
        );

        factory.register(ProtocolType::OpcUa, |_config| Ok(Box::new(Stub)));
        assert!(factory.supports(ProtocolType::OpcUa));
        let client = factory
            .create(ProtocolType::OpcUa, TcpConfig::new("server", 4840).into())
            .unwrap();
        assert_eq!(client.protocol(), ProtocolType::OpcUa);
        assert!(client.read("ns=2;i=1", 1).await.is_success());

        factory.register(ProtocolType::ModbusTcp, |_config| Ok(Box::new(Stub)));
        let client = factory
            .create(ProtocolType::ModbusTcp, TcpConfig::default().into())
            .unwrap();
        assert_eq!(client.protocol(), ProtocolType::ModbusTcp);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn creates_from_device_config() {
        let device = DeviceConfig::from_yaml_str(
            "protocol: mitsubishi-mc\nconnection:\n  type: mitsubishi-mc\n  host: 10.0.0.5\n  port: 5007\n  use_binary_format: true\n",
        )
        .unwrap();
        let client = ClientFactory::new().create_device(&device).unwrap();
        assert_eq!(client.protocol(), ProtocolType::MitsubishiMc);
    }
}

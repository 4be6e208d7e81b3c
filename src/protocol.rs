//! Protocol tags and the default values shared by the configuration types.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identifies a device protocol for the [`crate::factory::ClientFactory`].
///
/// Only the first-party protocols have a built-in client; the others are satisfied by
/// constructors registered through [`crate::factory::ClientFactory::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum ProtocolType {
    ModbusTcp,
    ModbusRtu,
    OpcUa,
    BacNet,
    SiemensS7,
    MitsubishiMc,
    OmronFins,
    Custom,
}

impl ProtocolType {
    pub const ALL: [ProtocolType; 8] = [
        ProtocolType::ModbusTcp,
        ProtocolType::ModbusRtu,
        ProtocolType::OpcUa,
        ProtocolType::BacNet,
        ProtocolType::SiemensS7,
        ProtocolType::MitsubishiMc,
        ProtocolType::OmronFins,
        ProtocolType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolType::ModbusTcp => "modbus-tcp",
            ProtocolType::ModbusRtu => "modbus-rtu",
            ProtocolType::OpcUa => "opc-ua",
            ProtocolType::BacNet => "bac-net",
            ProtocolType::SiemensS7 => "siemens-s7",
            ProtocolType::MitsubishiMc => "mitsubishi-mc",
            ProtocolType::OmronFins => "omron-fins",
            ProtocolType::Custom => "custom",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = crate::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ProtocolType::ALL
            .into_iter()
            .find(|protocol| protocol.as_str() == wanted)
            .ok_or_else(|| crate::ConfigError::UnsupportedProtocol(s.to_string()))
    }
}

pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_RETRY_COUNT: u32 = 3;

pub const DEFAULT_MODBUS_TCP_PORT: u16 = 502;
pub const DEFAULT_MODBUS_UNIT_ID: u8 = 1;
/// Pause between sending an RTU request and reading its response.
pub const DEFAULT_RTU_SETTLE_DELAY: Duration = Duration::from_millis(50);

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_DATA_BITS: u8 = 8;

pub const DEFAULT_MC_PORT: u16 = 5007;
pub const DEFAULT_MC_PC_NUMBER: u8 = 0xFF;
pub const DEFAULT_MC_MODULE_IO: u16 = 0x03FF;
pub const DEFAULT_MC_CPU_WATCH_TIMER: Duration = Duration::from_millis(8000);

pub const DEFAULT_FINS_PORT: u16 = 9600;
pub const DEFAULT_FINS_REMOTE_NODE: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn protocol_names_round_trip() {
        for protocol in ProtocolType::ALL {
            assert_eq!(protocol.to_string().parse::<ProtocolType>().unwrap(), protocol);
        }
        assert_eq!(
            "Modbus_TCP".parse::<ProtocolType>().unwrap(),
            ProtocolType::ModbusTcp
        );
        assert_matches!(
            "profinet".parse::<ProtocolType>(),
            Err(crate::ConfigError::UnsupportedProtocol(name)) if name == "profinet"
        );
    }
}

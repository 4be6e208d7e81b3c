//! plcctl
//!
//! A command-line interface (CLI) application for reading and writing PLC memory with
//! Modbus TCP, Modbus RTU (serial), the Mitsubishi MC protocol or Omron FINS.
//!
//! This tool allows users to:
//! - Read consecutive registers, relays or words from an address.
//! - Write words or bits to an address.
//! - Read a list of addresses in one run.
//! - Read the CPU unit status of an Omron PLC.
//! - Describe a device in a YAML file instead of on the command line.
//!
//! The CLI leverages the `plclink_lib` crate for the protocol clients.

use anyhow::{Context, Result, bail};
use clap::Parser;
use commandline::{CliArgs, CliCommands, CliConnection};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use plclink_lib::config::{
    ConnectionConfig, DeviceConfig, FinsConfig, McConfig, NodeAddress, SerialConfig, TcpConfig,
};
use plclink_lib::fins::FinsClient;
use plclink_lib::modbus::{ModbusRtuClient, ModbusTcpClient};
use plclink_lib::{
    ClientFactory, ConfigError, OperationResult, ProtocolClient, ProtocolType, Value, protocol,
};
use std::{panic, time::Duration};

mod commandline;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

/// Modbus settings that are not part of a [`ConnectionConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
struct ModbusOptions {
    unit_id: u8,
    settle_delay: Duration,
}

impl Default for ModbusOptions {
    fn default() -> Self {
        Self {
            unit_id: protocol::DEFAULT_MODBUS_UNIT_ID,
            settle_delay: protocol::DEFAULT_RTU_SETTLE_DELAY,
        }
    }
}

/// FINS is kept concrete for the CPU status command.
enum Client {
    Fins(FinsClient),
    Generic(Box<dyn ProtocolClient>),
}

impl Client {
    fn as_protocol(&self) -> &dyn ProtocolClient {
        match self {
            Client::Fins(client) => client,
            Client::Generic(client) => client.as_ref(),
        }
    }
}

/// Translates the connection subcommand into a protocol tag and a configuration.
fn device_config(connection: &CliConnection) -> Result<(DeviceConfig, ModbusOptions)> {
    let (protocol, connection, modbus) = match connection {
        CliConnection::ModbusTcp {
            host, port, unit, ..
        } => (
            ProtocolType::ModbusTcp,
            TcpConfig::new(host.as_str(), *port).into(),
            ModbusOptions {
                unit_id: *unit,
                ..ModbusOptions::default()
            },
        ),
        CliConnection::ModbusRtu {
            device,
            baud_rate,
            parity,
            stop_bits,
            unit,
            settle_delay,
            ..
        } => {
            let mut serial = SerialConfig::new(device.as_str(), *baud_rate);
            serial.parity = *parity;
            serial.stop_bits = *stop_bits;
            (
                ProtocolType::ModbusRtu,
                serial.into(),
                ModbusOptions {
                    unit_id: *unit,
                    settle_delay: *settle_delay,
                },
            )
        }
        CliConnection::Mc {
            host,
            port,
            binary,
            network,
            pc,
            ..
        } => {
            let mut mc = McConfig::new(host.as_str(), *port);
            mc.use_binary_format = *binary;
            mc.network_number = *network;
            mc.pc_number = *pc;
            (ProtocolType::MitsubishiMc, mc.into(), ModbusOptions::default())
        }
        CliConnection::Fins {
            host,
            port,
            tcp,
            node,
            local_node,
            ..
        } => {
            let mut fins = FinsConfig::new(host.as_str(), *node);
            fins.use_tcp = *tcp;
            fins.tcp.port = *port;
            fins.udp_port = *port;
            fins.local = NodeAddress::new(0, *local_node, 0);
            (ProtocolType::OmronFins, fins.into(), ModbusOptions::default())
        }
        CliConnection::Device { config_file, .. } => {
            let device = DeviceConfig::from_yaml_file(config_file).with_context(|| {
                format!("Cannot load device configuration from {}", config_file.display())
            })?;
            return Ok((device, ModbusOptions::default()));
        }
    };
    Ok((
        DeviceConfig {
            protocol,
            connection,
        },
        modbus,
    ))
}

/// Builds the client; Modbus and FINS are built directly to apply their extra options.
fn create_client(
    factory: &ClientFactory,
    device: DeviceConfig,
    modbus: ModbusOptions,
) -> Result<Client, ConfigError> {
    let client = match (device.protocol, device.connection) {
        (ProtocolType::ModbusTcp, ConnectionConfig::Tcp(tcp)) => {
            tcp.validate()?;
            Client::Generic(Box::new(
                ModbusTcpClient::new(tcp).with_unit_id(modbus.unit_id),
            ))
        }
        (ProtocolType::ModbusRtu, ConnectionConfig::Serial(serial)) => {
            serial.validate()?;
            Client::Generic(Box::new(
                ModbusRtuClient::new(serial)
                    .with_unit_id(modbus.unit_id)
                    .with_settle_delay(modbus.settle_delay),
            ))
        }
        (ProtocolType::OmronFins, ConnectionConfig::OmronFins(fins)) => {
            fins.validate()?;
            Client::Fins(FinsClient::new(fins))
        }
        (protocol, connection) => Client::Generic(factory.create(protocol, connection)?),
    };
    Ok(client)
}

/// Values for a write command: one or many words, or one or many bits.
fn write_value(values: &[u16], bits: bool) -> Value {
    match (values, bits) {
        ([value], false) => Value::U16(*value),
        (values, false) => Value::Words(values.to_vec()),
        ([value], true) => Value::Bool(*value != 0),
        (values, true) => Value::Bits(values.iter().map(|value| *value != 0).collect()),
    }
}

async fn execute(client: &Client, command: &CliCommands) -> Result<()> {
    let plc = client.as_protocol();
    match command {
        CliCommands::Read { address, length } => {
            info!("Executing: Read {length} element(s) at {address}");
            let result = plc.read(address, *length).await;
            match result.value() {
                Some(value) => println!("{address}: {value}"),
                None => bail!(
                    "Cannot read {address}: {} (code {})",
                    result.error_message().unwrap_or_default(),
                    result.error_code()
                ),
            }
        }
        CliCommands::Write {
            address,
            values,
            bits,
        } => {
            let value = write_value(values, *bits);
            info!("Executing: Write {value} to {address}");
            let result = plc.write(address, value).await;
            if let Some(error) = result.error() {
                bail!("Cannot write {address}: {error} (code {})", error.code());
            }
            println!("{address}: written {}", result.value);
        }
        CliCommands::BatchRead { addresses } => {
            info!("Executing: Batch read of {} address(es)", addresses.len());
            let addresses: Vec<&str> = addresses.iter().map(String::as_str).collect();
            let batch = plc.batch_read(&addresses).await;
            for result in &batch.results {
                match (result.value(), result.error()) {
                    (Some(value), _) => println!("{}: {value}", result.address),
                    (_, Some(error)) => println!("{}: FAILED {error}", result.address),
                    (None, None) => println!("{}: -", result.address),
                }
            }
            if batch.results.len() < addresses.len() {
                println!(
                    "Stopped after the first failure, {} address(es) not read.",
                    addresses.len() - batch.results.len()
                );
            }
            if !batch.is_success() {
                bail!(
                    "Batch read failed: {}",
                    batch.error_message().unwrap_or_default()
                );
            }
        }
        CliCommands::CpuStatus => {
            info!("Executing: Read CPU Status");
            let Client::Fins(fins) = client else {
                bail!("The CPU status is only available for Omron FINS connections");
            };
            let result = fins.read_cpu_status().await;
            match result.value() {
                Some(value) => println!("CPU status: {value}"),
                None => bail!(
                    "Cannot read CPU status: {}",
                    result.error_message().unwrap_or_default()
                ),
            }
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // 1. Initialize logging as early as possible
    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "plcctl started. Log level: {}",
        args.verbose.log_level_filter()
    );

    // 2. Build the configuration, applying the global overrides
    let (mut device, modbus) = device_config(&args.connection)?;
    let common = device.connection.common_mut();
    if let Some(timeout) = args.timeout {
        common.read_timeout = timeout;
        common.write_timeout = timeout;
    }
    if let Some(retries) = args.retries {
        common.retry_count = retries;
    }

    // 3. Create and connect the client
    let protocol = device.protocol;
    let client = create_client(&ClientFactory::new(), device, modbus)
        .with_context(|| format!("Invalid {protocol} configuration"))?;
    if !client.as_protocol().connect().await {
        bail!("Cannot connect to the {protocol} device");
    }

    // 4. Execute the command
    let outcome = execute(&client, args.connection.command()).await;
    client.as_protocol().disconnect().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliConnection {
        CliArgs::try_parse_from(args).unwrap().connection
    }

    #[test]
    fn write_values() {
        assert_eq!(write_value(&[7], false), Value::U16(7));
        assert_eq!(write_value(&[1, 2], false), Value::Words(vec![1, 2]));
        assert_eq!(write_value(&[1], true), Value::Bool(true));
        assert_eq!(write_value(&[1, 0, 5], true), Value::Bits(vec![true, false, true]));
    }

    #[test]
    fn connection_subcommands_map_to_configs() {
        let (device, modbus) =
            device_config(&parse(&["plcctl", "modbus-tcp", "plc", "-u", "3", "read", "0"])).unwrap();
        assert_eq!(device.protocol, ProtocolType::ModbusTcp);
        assert_eq!(device.connection, ConnectionConfig::from(TcpConfig::new("plc", 502)));
        assert_eq!(modbus.unit_id, 3);

        let (device, _) =
            device_config(&parse(&["plcctl", "mc", "plc", "--binary", "read", "D0"])).unwrap();
        let ConnectionConfig::MitsubishiMc(mc) = device.connection else {
            panic!("expected an MC configuration");
        };
        assert!(mc.use_binary_format);
        assert_eq!(mc.tcp.port, 5007);

        let (device, _) = device_config(&parse(&[
            "plcctl", "fins", "plc", "--node", "5", "--port", "9601", "cpu-status",
        ]))
        .unwrap();
        let ConnectionConfig::OmronFins(fins) = device.connection else {
            panic!("expected a FINS configuration");
        };
        assert_eq!(fins.remote.node, 5);
        assert_eq!(fins.udp_port, 9601);
        assert!(!fins.use_tcp);
    }

    #[test]
    fn missing_device_file_is_reported() {
        let connection = parse(&["plcctl", "device", "/nonexistent/plc.yaml", "cpu-status"]);
        assert!(device_config(&connection).is_err());
    }

    #[test]
    fn clients_are_validated() {
        let factory = ClientFactory::new();
        let (device, modbus) =
            device_config(&parse(&["plcctl", "fins", "plc", "--node", "0", "read", "DM0"])).unwrap();
        assert!(matches!(
            create_client(&factory, device, modbus),
            Err(ConfigError::InvalidSetting { .. })
        ));

        let (device, modbus) =
            device_config(&parse(&["plcctl", "fins", "plc", "read", "DM0"])).unwrap();
        assert!(matches!(
            create_client(&factory, device, modbus),
            Ok(Client::Fins(_))
        ));

        let mismatched = DeviceConfig {
            protocol: ProtocolType::ModbusRtu,
            connection: TcpConfig::default().into(),
        };
        assert!(matches!(
            create_client(&factory, mismatched, ModbusOptions::default()),
            Err(ConfigError::WrongConfigType { .. })
        ));
    }
}

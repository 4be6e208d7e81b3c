use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use plclink_lib::config::{Parity, StopBits};
use plclink_lib::protocol as proto;
use std::path::PathBuf;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1") // Common default for Windows, though may vary.
    } else {
        String::from("/dev/ttyUSB0") // Common default for USB-to-serial adapters on Linux.
    }
}

fn parse_u8(s: &str) -> Result<u8, String> {
    clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid number format: {e}"))
}

fn parse_word(s: &str) -> Result<u16, String> {
    clap_num::maybe_hex::<u16>(s).map_err(|e| format!("Invalid word value format: {e}"))
}

fn parse_parity(s: &str) -> Result<Parity, String> {
    match s.to_ascii_lowercase().as_str() {
        "none" | "n" => Ok(Parity::None),
        "odd" | "o" => Ok(Parity::Odd),
        "even" | "e" => Ok(Parity::Even),
        _ => Err(format!("Invalid parity '{s}', expected none, odd or even")),
    }
}

fn parse_stop_bits(s: &str) -> Result<StopBits, String> {
    match s {
        "1" => Ok(StopBits::One),
        "2" => Ok(StopBits::Two),
        _ => Err(format!("Invalid stop bits '{s}', expected 1 or 2")),
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliConnection {
    /// Connect to a Modbus TCP device.
    /// Addresses are decimal register offsets, e.g. "100".
    #[clap(verbatim_doc_comment)]
    ModbusTcp {
        /// The IP address or hostname of the device.
        host: String,
        /// TCP port of the device.
        #[arg(short, long, default_value_t = proto::DEFAULT_MODBUS_TCP_PORT)]
        port: u16,
        /// The Modbus unit (slave) id, decimal or hexadecimal.
        #[arg(short, long, default_value_t = proto::DEFAULT_MODBUS_UNIT_ID, value_parser = parse_u8)]
        unit: u8,
        #[command(subcommand)]
        command: CliCommands,
    },
    /// Connect to a Modbus RTU device over a serial port.
    ModbusRtu {
        /// Serial port device name.
        /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
        #[arg(short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
        device: String,
        /// Baud rate for serial communication.
        #[arg(long, default_value_t = proto::DEFAULT_BAUD_RATE)]
        baud_rate: u32,
        /// Parity: none, odd or even.
        #[arg(long, default_value = "none", value_parser = parse_parity)]
        parity: Parity,
        /// Stop bits: 1 or 2.
        #[arg(long, default_value = "1", value_parser = parse_stop_bits)]
        stop_bits: StopBits,
        /// The Modbus unit (slave) id, decimal or hexadecimal.
        #[arg(short, long, default_value_t = proto::DEFAULT_MODBUS_UNIT_ID, value_parser = parse_u8)]
        unit: u8,
        /// Pause between sending a request and reading the response.
        /// Examples: "50ms", "100ms".
        #[arg(long, default_value = "50ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
        settle_delay: Duration,
        #[command(subcommand)]
        command: CliCommands,
    },
    /// Connect to a Mitsubishi PLC with the MC protocol (3E frames).
    /// Addresses are a device letter and a decimal offset, e.g. "D100" or "M0".
    #[clap(verbatim_doc_comment)]
    Mc {
        /// The IP address or hostname of the PLC.
        host: String,
        /// TCP port of the MC protocol listener.
        #[arg(short, long, default_value_t = proto::DEFAULT_MC_PORT)]
        port: u16,
        /// Use binary frames instead of ASCII frames.
        #[arg(long)]
        binary: bool,
        /// Network number.
        #[arg(long, default_value_t = 0, value_parser = parse_u8)]
        network: u8,
        /// PC number.
        #[arg(long, default_value_t = proto::DEFAULT_MC_PC_NUMBER, value_parser = parse_u8)]
        pc: u8,
        #[command(subcommand)]
        command: CliCommands,
    },
    /// Connect to an Omron PLC with FINS over UDP (default) or TCP.
    /// Addresses are a memory area and a decimal word offset, e.g. "DM100" or "CIO10".
    #[clap(verbatim_doc_comment)]
    Fins {
        /// The IP address or hostname of the PLC.
        host: String,
        /// UDP or TCP port of the PLC.
        #[arg(short, long, default_value_t = proto::DEFAULT_FINS_PORT)]
        port: u16,
        /// Use TCP instead of UDP.
        #[arg(long)]
        tcp: bool,
        /// FINS node number of the PLC.
        #[arg(long, default_value_t = proto::DEFAULT_FINS_REMOTE_NODE, value_parser = parse_u8)]
        node: u8,
        /// FINS node number of this host.
        #[arg(long, default_value_t = 0, value_parser = parse_u8)]
        local_node: u8,
        #[command(subcommand)]
        command: CliCommands,
    },
    /// Connect to a device described in a YAML file.
    /// The file holds a `protocol` and a `connection`, e.g.:
    ///     protocol: omron-fins
    ///     connection:
    ///       type: omron-fins
    ///       host: 192.168.250.1
    ///       port: 9600
    ///       remote: { node: 1 }
    #[clap(verbatim_doc_comment)]
    Device {
        /// Path to the device configuration file.
        config_file: PathBuf,
        #[command(subcommand)]
        command: CliCommands,
    },
}

impl CliConnection {
    pub fn command(&self) -> &CliCommands {
        match self {
            CliConnection::ModbusTcp { command, .. }
            | CliConnection::ModbusRtu { command, .. }
            | CliConnection::Mc { command, .. }
            | CliConnection::Fins { command, .. }
            | CliConnection::Device { command, .. } => command,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Read one or more consecutive elements starting at an address.
    Read {
        /// Start address, in the protocol's address format.
        address: String,
        /// Number of elements to read.
        #[arg(short, long, default_value_t = 1)]
        length: u16,
    },
    /// Write one or more values starting at an address.
    /// Values are 16-bit words, decimal or hexadecimal (e.g. "1234" or "0x04D2").
    /// With --bits every value is written as a bit (0 = off, anything else = on).
    #[clap(verbatim_doc_comment)]
    Write {
        /// Start address, in the protocol's address format.
        address: String,
        /// The values to write.
        #[arg(required = true, num_args = 1.., value_parser = parse_word)]
        values: Vec<u16>,
        /// Write the values as bits (coils, relays) instead of words.
        #[arg(long)]
        bits: bool,
    },
    /// Read one element from each address, in order, on the same connection.
    BatchRead {
        /// The addresses to read.
        #[arg(required = true, num_args = 1..)]
        addresses: Vec<String>,
    },
    /// Read the CPU unit status (Omron FINS only).
    CpuStatus,
}

const fn about_text() -> &'static str {
    "plcctl - Read and write PLC memory via Modbus TCP/RTU, Mitsubishi MC or Omron FINS."
}

#[derive(Parser, Debug)]
#[command(name="plcctl", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Specifies the connection method and the command to execute.
    #[command(subcommand)]
    pub connection: CliConnection,

    /// I/O timeout for read/write operations.
    /// Examples: "1s", "500ms". Defaults to the configured value (3s).
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Option<Duration>,

    /// Number of attempts per command for protocols that retry (Omron FINS).
    #[arg(global = true, long)]
    pub retries: Option<u32>,
}

//! Error types shared by every protocol client.
//!
//! Runtime failures are carried inside [`crate::result`] values as an [`Error`]; they never
//! escape the public client API as a `Result::Err`. Construction-time problems (wrong
//! configuration type, unknown protocol, invalid port) are reported as [`ConfigError`] by the
//! [`crate::factory::ClientFactory`].
use std::time::Duration;

/// Coarse classification of an [`Error`], used to decide whether a retry can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation was issued while the client had no open transport.
    NotConnected,
    /// The operation was issued after the client was disposed.
    Disposed,
    /// The symbolic address (or requested length) could not be parsed or is out of range.
    AddressFormat,
    /// The address names a region or device code the protocol does not know.
    UnsupportedRegion,
    /// The value handed to `write` has a shape the protocol cannot encode.
    UnsupportedValueType,
    /// No (complete) response arrived within the configured deadline.
    Timeout,
    /// The device answered, but the answer failed verification or carried an error code.
    ResponseError,
    /// The underlying socket or serial port failed.
    Transport,
}

impl ErrorKind {
    /// Returns `true` for failures where retrying the same request may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Transport | ErrorKind::NotConnected
        )
    }

    /// Returns `true` for failures caused by the request itself; retrying will not help.
    pub fn is_configuration(self) -> bool {
        matches!(
            self,
            ErrorKind::AddressFormat | ErrorKind::UnsupportedRegion | ErrorKind::UnsupportedValueType
        )
    }

    /// The numeric error code reported for this kind when the device supplied none.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::NotConnected => -1,
            ErrorKind::Disposed => -2,
            ErrorKind::AddressFormat => -10,
            ErrorKind::UnsupportedRegion => -11,
            ErrorKind::UnsupportedValueType => -12,
            ErrorKind::Timeout => -20,
            ErrorKind::Transport => -21,
            ErrorKind::ResponseError => -30,
        }
    }
}

/// A failed operation, as carried by read and write results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected to device")]
    NotConnected,

    #[error("Client has been disposed")]
    Disposed,

    #[error("Invalid address '{address}': {reason}")]
    AddressFormat { address: String, reason: String },

    #[error("Requested quantity {requested} is outside the supported range 1..={max}")]
    InvalidQuantity { requested: usize, max: usize },

    #[error("Unsupported region '{region}' in address '{address}'")]
    UnsupportedRegion { address: String, region: String },

    #[error("{protocol} cannot write a value of type {found}")]
    UnsupportedValueType {
        protocol: &'static str,
        found: &'static str,
    },

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("CRC mismatch: computed 0x{computed:04X}, received 0x{received:04X}")]
    Checksum { computed: u16, received: u16 },

    #[error("Modbus exception 0x{code:02X} for function code 0x{function:02X}")]
    ModbusException { function: u8, code: u8 },

    #[error("Device reported error code 0x{0:04X}")]
    DeviceError(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::AddressFormat`].
    pub fn address_format(address: &str, reason: impl Into<String>) -> Self {
        Error::AddressFormat {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::UnsupportedRegion`].
    pub fn unsupported_region(address: &str, region: &str) -> Self {
        Error::UnsupportedRegion {
            address: address.to_string(),
            region: region.to_string(),
        }
    }

    /// Shorthand for [`Error::InvalidResponse`].
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Error::InvalidResponse(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotConnected => ErrorKind::NotConnected,
            Error::Disposed => ErrorKind::Disposed,
            Error::AddressFormat { .. } | Error::InvalidQuantity { .. } => ErrorKind::AddressFormat,
            Error::UnsupportedRegion { .. } => ErrorKind::UnsupportedRegion,
            Error::UnsupportedValueType { .. } => ErrorKind::UnsupportedValueType,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Checksum { .. }
            | Error::ModbusException { .. }
            | Error::DeviceError(_)
            | Error::InvalidResponse(_) => ErrorKind::ResponseError,
            Error::Io(_) => ErrorKind::Transport,
        }
    }

    /// The numeric error code: the device-reported code where there is one, otherwise the
    /// fixed code of the error kind.
    pub fn code(&self) -> i32 {
        match self {
            Error::ModbusException { code, .. } => i32::from(*code),
            Error::DeviceError(code) => i32::from(*code),
            other => other.kind().code(),
        }
    }

    /// Whether this failure leaves the transport in an unknown state.
    ///
    /// Malformed or corrupted frames count too: the next response cannot be told apart from
    /// leftovers of this one.
    pub(crate) fn breaks_link(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Io(_) | Error::Checksum { .. } | Error::InvalidResponse(_)
        )
    }
}

/// The result type for internal protocol operations.
pub(crate) type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building a client from a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{protocol} requires a {expected} configuration, got {found}")]
    WrongConfigType {
        protocol: crate::protocol::ProtocolType,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Invalid port {0}, must be in 1..=65535")]
    InvalidPort(u32),

    #[error("Invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("Cannot parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

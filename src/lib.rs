//! A library for talking to PLCs over Modbus TCP/RTU, Mitsubishi MC (3E frames) and
//! Omron FINS.
//!
//! Every protocol is exposed through the same asynchronous contract, [`ProtocolClient`]:
//! connect, read, write, batch read/write, disconnect. Clients are usually built with a
//! [`ClientFactory`] from a [`ProtocolType`] and a [`config::ConnectionConfig`].
//!
//! ## Features
//!
//! - **Uniform Contract**: One object-safe `async` trait for all protocols, so callers can hold a
//!   `Box<dyn ProtocolClient>` without knowing the wire format behind it.
//! - **Failures as Values**: Operations never panic or return `Err`; every outcome is a
//!   [`ReadResult`]/[`WriteResult`] carrying an [`Error`] with a kind and a numeric code.
//! - **Single Flight**: Each client serializes its request/response exchanges internally and can
//!   be shared between tasks.
//! - **Cancellation**: Dropping an operation future (e.g. through `tokio::time::timeout`) closes
//!   the transport; the client then needs a new `connect()`.
//! - **Codecs**: The frame builders and parsers in [`modbus`], [`mc`] and [`fins`] work on byte
//!   buffers and can be used without a client.
//!
//! ## Quick Start
//!
//! ```no_run
//! use plclink_lib::{
//!     config::TcpConfig, ClientFactory, OperationResult, ProtocolType, Value,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = ClientFactory::new();
//!     let client = factory.create(ProtocolType::ModbusTcp, TcpConfig::new("192.168.1.100", 502).into())?;
//!
//!     if !client.connect().await {
//!         return Err("cannot connect".into());
//!     }
//!
//!     let result = client.read("100", 2).await;
//!     match result.value() {
//!         Some(value) => println!("Holding registers 100..102: {value}"),
//!         None => println!("Read failed: {:?}", result.error_message()),
//!     }
//!
//!     let result = client.write("100", Value::U16(1234)).await;
//!     println!("Write succeeded: {}", result.is_success());
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod fins;
pub mod mc;
pub mod modbus;
pub mod protocol;
pub mod result;
pub mod transport;
pub mod value;

pub use client::{BatchPolicy, ProtocolClient};
pub use error::{ConfigError, Error, ErrorKind};
pub use factory::ClientFactory;
pub use protocol::ProtocolType;
pub use result::{
    BatchReadResult, BatchWriteResult, OperationResult, ReadResult, Reading, WriteResult,
};
pub use value::{CpuStatus, DataType, ElementType, Value};

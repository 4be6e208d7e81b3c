//! Mitsubishi MC protocol, 3E frames over TCP.
//!
//! Addresses are a device letter followed by a decimal offset, e.g. `"D100"` (data register
//! 100) or `"M0"` (internal relay 0). Frames are ASCII unless
//! [`McConfig::use_binary_format`](crate::config::McConfig::use_binary_format) is set.
pub mod client;
pub mod device;
pub mod frame;

pub use client::McClient;
pub use device::{Device, McAddress};
pub use frame::FrameFormat;

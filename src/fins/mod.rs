//! Omron FINS over UDP or TCP.
//!
//! Addresses are a memory area name followed by a decimal word offset, e.g. `"DM100"` or
//! `"CIO10"`. See [`area::MemoryArea`] for the supported areas.
pub mod area;
pub mod client;
pub mod frame;

pub use area::{FinsAddress, MemoryArea};
pub use client::FinsClient;

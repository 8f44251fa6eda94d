//! lanchat-core — wire format, digests, and configuration shared by every
//! Lanchat crate.

pub mod config;
pub mod digest;
pub mod wire;

pub use config::LanchatConfig;
pub use wire::{Datagram, FileHeader, HeaderReply, VerifyReply, WireError};

//! Peer discovery over UDP broadcast.
//!
//! Peers announce themselves every heartbeat to the broadcast address of
//! each local interface. The same socket carries chat messages and the
//! file-transfer handshake, all as tagged JSON datagrams.

pub mod channel;
pub mod interfaces;

pub use channel::{recv_buffer, DiscoveryChannel, Inbound};

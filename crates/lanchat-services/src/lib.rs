//! lanchat-services — everything a Lanchat node does on the network.
//!
//! Presence and chat over UDP, file transfer over TCP, and the registries
//! that track both. [`Coordinator`] ties them together.

pub mod backoff;
pub mod bindings;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod event;
pub mod file_transfer;
pub mod presence;
pub mod transfer_registry;

pub use bindings::SavePathBindings;
pub use coordinator::Coordinator;
pub use discovery::{DiscoveryChannel, Inbound};
pub use error::TransferError;
pub use event::{EventBus, NetEvent};
pub use file_transfer::{FileOffer, FileTransferService};
pub use presence::{Peer, PresenceChange, PresenceRegistry};
pub use transfer_registry::{Operation, TransferRecord, TransferRegistry, TransferStatus};

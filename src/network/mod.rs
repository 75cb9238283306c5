// P2P networking

mod address_book;
mod memory;
mod message;
mod node;
mod peer;
pub mod server;
mod transport;

pub use address_book::AddressBook;
pub use memory::{MemoryNetwork, NodeId};
pub use message::{AddrEntry, MAX_FRAME_SIZE, Message, MessageError, MessageType, VersionMessage};
pub use node::{Node, NodeStatus, PeerInfo};
pub use peer::{NetworkError, Peer, read_frame, write_frame};
pub use server::RuntimeHandle;
pub use transport::{Direction, Outbound, PeerId, Recipient, TransportEvent};

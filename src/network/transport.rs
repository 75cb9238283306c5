// What the protocol handler needs from a transport

use crate::network::Message;
use std::fmt;

/// Connection handle, unique within one transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Which side opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We dialed the peer
    Outgoing,
    /// The peer dialed us
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Peer(PeerId),
    /// Every connected peer, optionally minus one (usually the sender)
    AllExcept(Option<PeerId>),
}

impl Recipient {
    pub fn includes(&self, peer: PeerId) -> bool {
        match self {
            Recipient::Peer(target) => *target == peer,
            Recipient::AllExcept(excluded) => *excluded != Some(peer),
        }
    }
}

/// Message queued by the protocol handler for the transport to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub recipient: Recipient,
    pub message: Message,
}

/// Something that happened on a connection
#[derive(Debug)]
pub enum TransportEvent {
    Disconnected(PeerId),
    /// Undecoded message body
    Message { peer: PeerId, body: Vec<u8> },
}

// Network protocol messages
//
// Every message is a JSON array `[type, ...args]`. Over TCP each one travels
// in a frame: a 4-byte big-endian length, then the JSON text.

use crate::core::{Block, Hash256, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest frame accepted from a peer
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

/// Message decoding errors
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
}

/// Network message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Version,
    Verack,
    Addr,
    GetAddr,
    Block,
    Tx,
    GetBlocks,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Version => "version",
            MessageType::Verack => "verack",
            MessageType::Addr => "addr",
            MessageType::GetAddr => "getaddr",
            MessageType::Block => "block",
            MessageType::Tx => "tx",
            MessageType::GetBlocks => "getblocks",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "version" => Some(MessageType::Version),
            "verack" => Some(MessageType::Verack),
            "addr" => Some(MessageType::Addr),
            "getaddr" => Some(MessageType::GetAddr),
            "block" => Some(MessageType::Block),
            "tx" => Some(MessageType::Tx),
            "getblocks" => Some(MessageType::GetBlocks),
            _ => None,
        }
    }
}

/// Version message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMessage {
    /// Address the sender accepts connections on, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// One address book entry as gossiped in `addr`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrEntry {
    pub address: String,
    /// Last seen, milliseconds since the Unix epoch
    pub time: u64,
}

/// Network message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Addr(Vec<AddrEntry>),
    GetAddr,
    Block(Block),
    Tx(Transaction),
    /// Block locator, most recent first
    GetBlocks(Vec<Hash256>),
}

impl Message {
    /// Get message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Version(_) => MessageType::Version,
            Message::Verack => MessageType::Verack,
            Message::Addr(_) => MessageType::Addr,
            Message::GetAddr => MessageType::GetAddr,
            Message::Block(_) => MessageType::Block,
            Message::Tx(_) => MessageType::Tx,
            Message::GetBlocks(_) => MessageType::GetBlocks,
        }
    }

    /// `[type, ...args]` form
    pub fn to_json(&self) -> Result<Value, MessageError> {
        let mut items = vec![Value::from(self.message_type().as_str())];
        match self {
            Message::Version(version) => items.push(serde_json::to_value(version)?),
            Message::Verack | Message::GetAddr => {}
            Message::Addr(entries) => items.push(serde_json::to_value(entries)?),
            Message::Block(block) => items.push(serde_json::to_value(block)?),
            Message::Tx(tx) => items.push(serde_json::to_value(tx)?),
            Message::GetBlocks(locator) => items.push(serde_json::to_value(locator)?),
        }
        Ok(Value::Array(items))
    }

    /// Parse the `[type, ...args]` form. Arguments beyond the ones a type
    /// uses are ignored.
    pub fn from_json(value: Value) -> Result<Self, MessageError> {
        let Value::Array(items) = value else {
            return Err(MessageError::Malformed("expected an array".to_string()));
        };
        let mut items = items.into_iter();
        let name = match items.next() {
            Some(Value::String(name)) => name,
            _ => {
                return Err(MessageError::Malformed(
                    "expected a message type".to_string(),
                ));
            }
        };
        let kind = MessageType::from_name(&name).ok_or(MessageError::UnknownType(name))?;

        let message = match kind {
            MessageType::Version => {
                // a version without payload advertises no address
                let version: VersionMessage = items
                    .next()
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_default();
                Message::Version(version)
            }
            MessageType::Verack => Message::Verack,
            MessageType::Addr => Message::Addr(payload(&mut items, kind)?),
            MessageType::GetAddr => Message::GetAddr,
            MessageType::Block => Message::Block(payload(&mut items, kind)?),
            MessageType::Tx => Message::Tx(payload(&mut items, kind)?),
            MessageType::GetBlocks => Message::GetBlocks(payload(&mut items, kind)?),
        };
        Ok(message)
    }

    /// JSON text of the message
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(&self.to_json()?)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        Self::from_json(serde_json::from_slice(bytes)?)
    }

    /// Length-prefixed frame for stream transports
    pub fn to_frame(&self) -> Result<Vec<u8>, MessageError> {
        let body = self.to_bytes()?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(MessageError::FrameTooLarge(body.len()));
        }
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }
}

fn payload<T: DeserializeOwned>(
    items: &mut impl Iterator<Item = Value>,
    kind: MessageType,
) -> Result<T, MessageError> {
    let value = items
        .next()
        .ok_or_else(|| MessageError::Malformed(format!("{} without payload", kind.as_str())))?;
    Ok(serde_json::from_value(value)?)
}

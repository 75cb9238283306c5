// Network node - chain state plus the sync protocol

use crate::config::NodeConfig;
use crate::consensus::{ChainParams, Miner, ValidationError};
use crate::core::{Block, Hash256, OutPoint, ParseError, Transaction, TxOutput, unix_millis};
use crate::mempool::{Admission, Mempool};
use crate::miner::{MiningError, build_candidate};
use crate::network::{
    AddrEntry, AddressBook, Direction, Message, Outbound, PeerId, Recipient, VersionMessage,
};
use crate::storage::{AddBlockOutcome, ChainIndex, ChainUpdate};
use crate::wallet::{KeyPair, TransactionBuilder, WalletError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Log through `log` with the node's address as prefix
macro_rules! node_log {
    ($level:ident, $node:expr, $($arg:tt)+) => {
        log::$level!("[{}] {}", $node.label(), format_args!($($arg)+))
    };
}

/// Connected peer
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Dialed address, or the one the peer advertised in `version`
    pub address: Option<String>,
    pub direction: Direction,
}

/// Snapshot of a node for status reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub address: Option<String>,
    pub height: u64,
    pub tip: Hash256,
    pub peers: usize,
    pub mempool: usize,
    pub orphans: usize,
    pub balance: u64,
    pub owner: String,
    pub mining: bool,
}

/// Protocol handler for one node.
///
/// The node never touches a socket: every call runs to completion and leaves
/// messages in an outbox that the transport drains with
/// [`take_outbox`](Node::take_outbox).
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    keypair: KeyPair,
    chain: ChainIndex,
    mempool: Mempool,
    address_book: AddressBook,
    peers: BTreeMap<PeerId, PeerInfo>,
    outbox: Vec<Outbound>,
    mining: bool,
}

impl Node {
    /// Create a node, using the configured private key or a fresh one
    pub fn new(config: NodeConfig, params: ChainParams) -> Result<Self, ParseError> {
        let keypair = match &config.private_key {
            Some(secret) => KeyPair::from_secret_hex(secret)?,
            None => KeyPair::generate(),
        };
        Ok(Self::with_keypair(config, params, keypair))
    }

    pub fn with_keypair(config: NodeConfig, params: ChainParams, keypair: KeyPair) -> Self {
        let address_book = AddressBook::new(
            config.initial_peers(),
            unix_millis(),
            !config.learns_addresses(),
        );
        let mining = config.mine;
        Self {
            config,
            keypair,
            chain: ChainIndex::new(params),
            mempool: Mempool::new(),
            address_book,
            peers: BTreeMap::new(),
            outbox: Vec::new(),
            mining,
        }
    }

    fn label(&self) -> &str {
        self.config.address.as_deref().unwrap_or("-")
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn address(&self) -> Option<&str> {
        self.config.address.as_deref()
    }

    /// Change the advertised address (e.g. once an ephemeral port is bound)
    pub fn set_address(&mut self, address: String) {
        self.config.address = Some(address);
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Public key our coinbase and change outputs pay
    pub fn owner(&self) -> Vec<u8> {
        self.keypair.owner()
    }

    pub fn chain(&self) -> &ChainIndex {
        &self.chain
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }

    pub fn peers(&self) -> impl Iterator<Item = (&PeerId, &PeerInfo)> {
        self.peers.iter()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            address: self.config.address.clone(),
            height: self.chain.height(),
            tip: self.chain.tip_hash(),
            peers: self.peers.len(),
            mempool: self.mempool.len(),
            orphans: self.chain.orphan_count(),
            balance: self.balance(),
            owner: self.keypair.public_key_hex(),
            mining: self.mining,
        }
    }

    /// Messages queued since the last call, in order
    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    fn send(&mut self, peer: PeerId, message: Message) {
        self.outbox.push(Outbound {
            recipient: Recipient::Peer(peer),
            message,
        });
    }

    fn broadcast(&mut self, message: Message, exclude: Option<PeerId>) {
        self.outbox.push(Outbound {
            recipient: Recipient::AllExcept(exclude),
            message,
        });
    }

    fn version(&self) -> Message {
        Message::Version(VersionMessage {
            address: self.config.address.clone(),
        })
    }

    // connection events

    /// A connection is up: announce ourselves and ask for missing blocks.
    /// Outgoing connections also ask for addresses.
    pub fn peer_connected(&mut self, peer: PeerId, address: Option<String>, direction: Direction) {
        match (&address, direction) {
            (Some(address), Direction::Outgoing) => node_log!(info, self, "connected to {}", address),
            _ => node_log!(info, self, "{} connected", peer),
        }
        self.peers.insert(peer, PeerInfo { address, direction });

        self.send(peer, self.version());
        if direction == Direction::Outgoing {
            self.send(peer, Message::GetAddr);
        }
        self.send(peer, Message::GetBlocks(self.chain.block_locator()));
    }

    pub fn peer_disconnected(&mut self, peer: PeerId) {
        if let Some(info) = self.peers.remove(&peer) {
            let name = info.address.unwrap_or_else(|| peer.to_string());
            match info.direction {
                Direction::Outgoing => node_log!(info, self, "disconnected from {}", name),
                Direction::Incoming => node_log!(info, self, "{} disconnected", name),
            }
        }
    }

    /// Addresses worth dialing now: fresh in the address book, not ourselves,
    /// not already connected, and no more than the free connection slots
    pub fn connection_candidates(&self) -> Vec<String> {
        let free = self.config.max_connections.saturating_sub(self.peers.len());
        let connected: Vec<&str> = self
            .peers
            .values()
            .filter_map(|info| info.address.as_deref())
            .collect();

        self.address_book
            .fresh(unix_millis(), self.config.peer_staleness)
            .filter(|address| Some(*address) != self.address())
            .filter(|address| !connected.contains(address))
            .take(free)
            .map(str::to_string)
            .collect()
    }

    // incoming messages

    /// Decode and handle one message body; undecodable ones are logged and
    /// dropped
    pub fn receive_bytes(&mut self, peer: PeerId, body: &[u8]) {
        match Message::from_bytes(body) {
            Ok(message) => self.receive(peer, message),
            Err(e) => node_log!(warn, self, "ignoring message from {}: {}", peer, e),
        }
    }

    pub fn receive(&mut self, peer: PeerId, message: Message) {
        node_log!(debug, self, "{} sent \"{}\"", peer, message.message_type().as_str());

        match message {
            Message::Version(version) => self.receive_version(peer, version),
            Message::Verack => {}
            Message::Addr(entries) => {
                for AddrEntry { address, time } in entries {
                    self.address_book.learn(address, time);
                }
            }
            Message::GetAddr => {
                let entries = self.address_book.entries();
                self.send(peer, Message::Addr(entries));
            }
            Message::Block(block) => {
                if let Err(e) = self.add_block(block, Some(peer)) {
                    node_log!(warn, self, "rejected block from {}: {}", peer, e);
                }
            }
            Message::Tx(tx) => {
                if let Err(e) = self.submit_transaction(tx, Some(peer)) {
                    node_log!(warn, self, "rejected tx from {}: {}", peer, e);
                }
            }
            Message::GetBlocks(locator) => {
                let blocks: Vec<Block> = self
                    .chain
                    .blocks_after(&locator)
                    .into_iter()
                    .cloned()
                    .collect();
                if !blocks.is_empty() {
                    node_log!(debug, self, "sending {} blocks to {}", blocks.len(), peer);
                }
                for block in blocks {
                    self.send(peer, Message::Block(block));
                }
            }
        }
    }

    fn receive_version(&mut self, peer: PeerId, version: VersionMessage) {
        self.send(peer, Message::Verack);

        let Some(address) = version.address else {
            return;
        };
        if let Some(info) = self.peers.get_mut(&peer) {
            info.address = Some(address.clone());
        }
        let now = unix_millis();
        self.address_book.learn(address.clone(), now);
        self.broadcast(Message::Addr(vec![AddrEntry { address, time: now }]), Some(peer));
    }

    // chain and mempool

    /// Offer a block to the chain. Every block that becomes the tip is relayed
    /// to all peers but `from`; blocks reactivated by a reorg go to everyone.
    pub fn add_block(
        &mut self,
        block: Block,
        from: Option<PeerId>,
    ) -> Result<AddBlockOutcome, ValidationError> {
        let outcome = self.chain.add_block(block)?;
        if let AddBlockOutcome::Connected(update) = &outcome {
            self.relay_update(update, from);
        }
        Ok(outcome)
    }

    fn relay_update(&mut self, update: &ChainUpdate, from: Option<PeerId>) {
        let mut confirmed = 0;
        for hash in &update.reactivated {
            if let Some(node) = self.chain.get(hash) {
                confirmed += self.mempool.remove_confirmed(&node.block);
                self.outbox.push(Outbound {
                    recipient: Recipient::AllExcept(None),
                    message: Message::Block(node.block.clone()),
                });
            }
        }
        for hash in &update.new_tips {
            if let Some(node) = self.chain.get(hash) {
                node_log!(info, self, "block {} at height {}", hash, node.height);
                confirmed += self.mempool.remove_confirmed(&node.block);
                self.outbox.push(Outbound {
                    recipient: Recipient::AllExcept(from),
                    message: Message::Block(node.block.clone()),
                });
            }
        }

        if confirmed > 0 {
            node_log!(debug, self, "{} mempool transactions confirmed", confirmed);
        }
        if update.tip_advanced() {
            let dropped = self.mempool.purge(self.chain.utxos());
            if dropped > 0 {
                node_log!(debug, self, "dropped {} mempool transactions", dropped);
            }
        }
    }

    /// Pool a transaction valid against the best chain and relay it to all
    /// peers but `from`
    pub fn submit_transaction(
        &mut self,
        tx: Transaction,
        from: Option<PeerId>,
    ) -> Result<Admission, ValidationError> {
        let admission = self.mempool.submit(tx.clone(), self.chain.utxos())?;
        if let Admission::Accepted(txid) = admission {
            node_log!(info, self, "tx {}", txid);
            self.broadcast(Message::Tx(tx), from);
        }
        Ok(admission)
    }

    // mining

    /// One bounded mining step on top of the tip with the current mempool.
    /// Returns the block if one was found and connected.
    pub fn mine_once(&mut self, max_attempts: u64) -> Result<Option<Block>, MiningError> {
        let mut block = build_candidate(&self.chain, self.mempool.transactions(), self.owner());

        let result = Miner::new(max_attempts).mine(&mut block);
        let Some(hash) = result.hash else {
            return Ok(None);
        };

        match self.add_block(block.clone(), None) {
            Ok(AddBlockOutcome::Connected(_)) => {
                node_log!(
                    info,
                    self,
                    "mined {} after {} attempts ({:.0} H/s)",
                    hash,
                    result.attempts,
                    result.hash_rate()
                );
                Ok(Some(block))
            }
            Ok(AddBlockOutcome::Duplicate) => Ok(None),
            Ok(AddBlockOutcome::Orphan) => {
                node_log!(error, self, "mined block {} does not extend our chain", hash);
                Err(MiningError::Detached)
            }
            Err(e) => {
                node_log!(error, self, "mined invalid block {}: {}", hash, e);
                Err(MiningError::SelfRejected(e))
            }
        }
    }

    pub fn start_mining(&mut self) {
        self.mining = true;
    }

    pub fn stop_mining(&mut self) {
        self.mining = false;
    }

    pub fn is_mining(&self) -> bool {
        self.mining
    }

    // wallet

    pub fn balance(&self) -> u64 {
        TransactionBuilder::new(&self.keypair, self.chain.utxos()).balance()
    }

    pub fn unspent_outputs(&self) -> Vec<(OutPoint, TxOutput)> {
        TransactionBuilder::new(&self.keypair, self.chain.utxos()).unspent_outputs()
    }

    /// Pay `value` to `recipient`: build and sign a transaction from our
    /// outputs, pool it, and broadcast it
    pub fn transfer(&mut self, recipient: Vec<u8>, value: u64) -> Result<Transaction, WalletError> {
        let tx = TransactionBuilder::new(&self.keypair, self.chain.utxos()).build(recipient, value)?;

        match self.submit_transaction(tx.clone(), None) {
            Ok(_) => Ok(tx),
            Err(e) => {
                node_log!(warn, self, "trying to send invalid tx {}: {}", tx.txid(), e);
                Err(WalletError::Rejected(e))
            }
        }
    }
}

// Shared fixtures for the multi-node tests

#![allow(dead_code)]

use minichain::consensus::ChainParams;
use minichain::network::{MemoryNetwork, NodeId};
use minichain::{KeyPair, Node, NodeConfig};

pub fn genesis_key() -> KeyPair {
    KeyPair::from_secret_bytes(&[7; 32]).unwrap()
}

pub fn params() -> ChainParams {
    ChainParams::regtest(genesis_key().owner())
}

pub fn key(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes(&[seed; 32]).unwrap()
}

pub fn node(name: &str, seed: u8) -> Node {
    Node::with_keypair(NodeConfig::with_address(name), params(), key(seed))
}

/// A network of `count` unconnected nodes named node0, node1, ...
pub fn network(count: usize) -> MemoryNetwork {
    let mut net = MemoryNetwork::new();
    for i in 0..count {
        net.add_node(node(&format!("node{}", i), i as u8 + 1));
    }
    net
}

pub fn mine_blocks(net: &mut MemoryNetwork, id: NodeId, count: usize) {
    for _ in 0..count {
        net.mine(id).unwrap();
    }
}

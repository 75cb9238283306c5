// Single-node ledger properties

mod common;

use common::{genesis_key, key, node};
use minichain::consensus::params::INITIAL_REWARD;
use minichain::core::{OutPoint, Transaction, TxInput, TxOutput};
use minichain::network::Node;
use minichain::storage::AddBlockOutcome;
use minichain::{Block, Hash256, NodeConfig};
use std::collections::HashSet;

fn mine(node: &mut Node) -> Block {
    loop {
        if let Some(block) = node.mine_once(1000).unwrap() {
            return block;
        }
    }
}

#[test]
fn test_main_chain_is_linked_from_genesis() {
    let mut node = node("a", 1);
    for _ in 0..12 {
        mine(&mut node);
    }

    let chain = node.chain();
    let main = chain.main_chain();
    assert_eq!(main.len(), 13);
    assert_eq!(main[0].hash, chain.genesis_hash());
    assert_eq!(main.last().unwrap().hash, chain.tip_hash());

    for (i, entry) in main.iter().enumerate() {
        assert_eq!(entry.height, i as u64);
        assert!(entry.main);
        if let Some(next) = main.get(i + 1) {
            assert_eq!(next.previous, Some(entry.hash));
            assert_eq!(entry.next, Some(next.hash));
        }
    }
    assert_eq!(chain.tip().next, None);

    // walking back from the tip ends at genesis
    let mut cursor = chain.tip();
    while let Some(previous) = cursor.previous {
        cursor = chain.get(&previous).unwrap();
    }
    assert_eq!(cursor.hash, chain.genesis_hash());
}

#[test]
fn test_mining_rewards_are_credited() {
    let mut node = node("a", 1);
    for _ in 0..5 {
        mine(&mut node);
    }

    let expected: u64 = (1..=5).map(|h| node.chain().params().block_reward(h)).sum();
    assert_eq!(expected, 5 * INITIAL_REWARD);
    assert_eq!(node.balance(), expected);
    assert_eq!(node.unspent_outputs().len(), 5);
}

#[test]
fn test_rewards_halve_every_era() {
    let mut params = common::params();
    params.era_length = 2;
    let mut node = Node::with_keypair(NodeConfig::with_address("a"), params, key(1));

    let paid: Vec<u64> = (0..5)
        .map(|_| mine(&mut node).transactions[0].outputs[0].value)
        .collect();

    assert_eq!(
        paid,
        vec![
            INITIAL_REWARD,
            INITIAL_REWARD / 2,
            INITIAL_REWARD / 2,
            INITIAL_REWARD / 4,
            INITIAL_REWARD / 4,
        ]
    );
    // 50 + 25 + 25 + 12.5 + 12.5 coins
    assert_eq!(node.balance(), 12_500_000_000);
    assert_eq!(node.chain().next_reward(), INITIAL_REWARD / 8);
}

#[test]
fn test_coinbase_ids_never_collide() {
    let mut node = node("a", 1);
    let coinbase_ids: HashSet<Hash256> = (0..4)
        .map(|_| mine(&mut node).transactions[0].txid())
        .collect();

    assert_eq!(coinbase_ids.len(), 4);
    assert_eq!(node.balance(), 4 * INITIAL_REWARD);
}

#[test]
fn test_genesis_output_belongs_to_genesis_key() {
    let node = node("a", 1);
    let genesis = genesis_key();
    assert_eq!(node.chain().utxos().balance(genesis.owner_bytes()), INITIAL_REWARD);
    assert_eq!(node.balance(), 0);
}

#[test]
fn test_transfer_splits_value() {
    let mut sender = node("a", 1);
    let recipient = key(2);
    let reward = mine(&mut sender);
    let funding = OutPoint::new(reward.transactions[0].txid(), 0);

    let tx = sender.transfer(recipient.owner(), 1_000).unwrap();
    assert!(sender.mempool().contains(&tx.txid()));
    assert_eq!(
        tx.stripped(),
        Transaction::new(
            vec![TxInput::spend(funding)],
            vec![
                TxOutput::new(1_000, recipient.owner()),
                TxOutput::new(INITIAL_REWARD - 1_000, sender.owner()),
            ],
        )
    );

    let block = mine(&mut sender);
    assert_eq!(block.transactions.len(), 2);
    assert!(sender.mempool().is_empty());

    let utxos = sender.chain().utxos();
    assert!(!utxos.contains(&funding));
    assert_eq!(utxos.balance(recipient.owner_bytes()), 1_000);
    assert_eq!(sender.balance(), 2 * INITIAL_REWARD - 1_000);
}

#[test]
fn test_redelivery_is_idempotent() {
    let mut miner = node("a", 1);
    let mut follower = node("b", 2);
    let block = mine(&mut miner);
    let tx = miner.transfer(key(3).owner(), 10).unwrap();

    assert!(matches!(
        follower.add_block(block.clone(), None),
        Ok(AddBlockOutcome::Connected(_))
    ));
    let tip = follower.chain().tip_hash();
    let nodes = follower.chain().len();
    follower.submit_transaction(tx.clone(), None).unwrap();
    follower.take_outbox();

    assert_eq!(follower.add_block(block, None), Ok(AddBlockOutcome::Duplicate));
    follower.submit_transaction(tx, None).unwrap();

    assert_eq!(follower.chain().tip_hash(), tip);
    assert_eq!(follower.chain().len(), nodes);
    assert_eq!(follower.mempool().len(), 1);
    assert!(follower.take_outbox().is_empty());
}

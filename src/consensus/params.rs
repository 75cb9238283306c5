// Consensus constants, genesis block and the reward / difficulty schedule

use crate::core::{Block, Target, Transaction, TxOutput};
use serde::{Deserialize, Serialize};

/// Initial block reward: 50 coins of 10^8 units
pub const INITIAL_REWARD: u64 = 50 * 100_000_000;
/// Reward halves every this many blocks
pub const ERA_LENGTH: u64 = 210_000;
/// Desired spacing between blocks
pub const TARGET_BLOCK_TIME_MS: u64 = 10_000;
/// Difficulty is recomputed every this many blocks
pub const TARGET_PERIOD: u64 = 10;
/// A single retarget moves difficulty by at most this factor either way
pub const TARGET_MAX_FACTOR: u64 = 4;
/// Fixed-point scale for the retarget adjustment factor
pub const RETARGET_PRECISION: u64 = 1_000_000;

const GENESIS_COINBASE: &[u8] =
    b"The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

/// Uncompressed public key paid by the mainnet genesis coinbase
const MAINNET_GENESIS_OWNER: [u8; 65] = [
    0x04, 0x2a, 0xc6, 0x55, 0x12, 0x67, 0x63, 0x9e, 0x7f, 0x8c, 0x5a, 0xbf,
    0x2e, 0x2f, 0xe2, 0x8e, 0xff, 0x5d, 0xf0, 0x22, 0xc2, 0x22, 0x0c, 0x82,
    0xae, 0x31, 0x00, 0xb1, 0xa4, 0x11, 0xb6, 0x50, 0x58, 0x17, 0x81, 0x12,
    0xfc, 0x4e, 0xb6, 0x21, 0x0a, 0x5f, 0xe9, 0xfc, 0x0d, 0xc7, 0xaa, 0x3a,
    0x69, 0xe8, 0x11, 0x8b, 0x19, 0x7d, 0x4e, 0x7e, 0xb0, 0xbf, 0x69, 0x77,
    0x06, 0x96, 0xc3, 0x4c, 0xc0,
];

/// Everything two nodes must agree on to share a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub genesis: Block,
    pub initial_reward: u64,
    pub era_length: u64,
    pub target_block_time_ms: u64,
    pub target_period: u64,
    pub max_factor: u64,
}

impl ChainParams {
    /// The public network: difficulty `0000800…0`, genesis paying the founder key
    pub fn mainnet() -> Self {
        let mut target = [0u8; 32];
        target[2] = 0x80;
        Self::with_genesis(genesis_block(
            1516127819161,
            33862,
            Target::from_be_bytes(target),
            MAINNET_GENESIS_OWNER.to_vec(),
        ))
    }

    /// Local testing: a block meets the target roughly once every 16 attempts
    pub fn regtest(genesis_owner: Vec<u8>) -> Self {
        let mut target = [0u8; 32];
        target[0] = 0x10;
        Self::with_genesis(genesis_block(
            1516161788000,
            38,
            Target::from_be_bytes(target),
            genesis_owner,
        ))
    }

    fn with_genesis(genesis: Block) -> Self {
        Self {
            genesis,
            initial_reward: INITIAL_REWARD,
            era_length: ERA_LENGTH,
            target_block_time_ms: TARGET_BLOCK_TIME_MS,
            target_period: TARGET_PERIOD,
            max_factor: TARGET_MAX_FACTOR,
        }
    }

    /// Key paid by the genesis coinbase
    pub fn genesis_owner(&self) -> Option<&[u8]> {
        let coinbase = self.genesis.coinbase()?;
        coinbase.outputs.first().map(|output| output.owner.as_slice())
    }

    pub fn genesis_target(&self) -> Target {
        self.genesis.target
    }

    /// Reward for the block at `height`: `round(initial / 2^era)`
    pub fn block_reward(&self, height: u64) -> u64 {
        let era = height / self.era_length.max(1);
        if era >= 64 {
            return 0;
        }
        let divisor = 1u128 << era;
        ((self.initial_reward as u128 + divisor / 2) / divisor) as u64
    }

    /// Target following a retarget boundary.
    ///
    /// `span_ms` is the time between the first and last of the `target_period`
    /// blocks that end at the boundary.
    pub fn retarget(&self, previous: &Target, span_ms: u64) -> Target {
        let max = self.max_factor.max(1) * RETARGET_PRECISION;
        let min = RETARGET_PRECISION / self.max_factor.max(1);

        // adjustment = target_block_time / (span / period), scaled and rounded
        let adjustment = if span_ms == 0 {
            max
        } else {
            let numerator = self.target_block_time_ms as u128
                * self.target_period as u128
                * RETARGET_PRECISION as u128;
            let scaled = (numerator + span_ms as u128 / 2) / span_ms as u128;
            scaled.clamp(min as u128, max as u128) as u64
        };

        previous.scale(RETARGET_PRECISION, adjustment)
    }
}

fn genesis_block(time: u64, nonce: u64, target: Target, owner: Vec<u8>) -> Block {
    let coinbase = Transaction::coinbase(
        GENESIS_COINBASE.to_vec(),
        TxOutput::new(INITIAL_REWARD, owner),
    );
    let mut block = Block::new(time, None, target, vec![coinbase]);
    block.nonce = nonce;
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_genesis() {
        let params = ChainParams::mainnet();
        let genesis = &params.genesis;
        assert!(genesis.is_genesis());
        assert_eq!(genesis.transactions.len(), 1);
        assert_eq!(genesis.transactions[0].outputs[0].value, 5_000_000_000);
        assert_eq!(genesis.transactions[0].outputs[0].owner.len(), 65);
        assert_eq!(
            genesis.target.to_hex(),
            "0000800000000000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_regtest_genesis_owner() {
        let params = ChainParams::regtest(vec![9; 65]);
        assert_eq!(params.genesis.transactions[0].outputs[0].owner, vec![9; 65]);
        assert_eq!(params.genesis_owner(), Some(&[9u8; 65][..]));
        assert_ne!(params.genesis.hash(), ChainParams::mainnet().genesis.hash());
    }

    #[test]
    fn test_block_reward_halving() {
        let params = ChainParams::mainnet();
        assert_eq!(params.block_reward(0), 5_000_000_000);
        assert_eq!(params.block_reward(209_999), 5_000_000_000);
        assert_eq!(params.block_reward(210_000), 2_500_000_000);
        assert_eq!(params.block_reward(420_000), 1_250_000_000);
        // 5e9 / 2^5 = 156250000 exactly, 5e9 / 2^10 = 4882812.5 rounds up
        assert_eq!(params.block_reward(5 * 210_000), 156_250_000);
        assert_eq!(params.block_reward(10 * 210_000), 4_882_813);
        assert_eq!(params.block_reward(64 * 210_000), 0);
    }

    #[test]
    fn test_retarget_on_schedule_keeps_target() {
        let params = ChainParams::mainnet();
        let target = params.genesis_target();
        let span = params.target_block_time_ms * params.target_period;
        assert_eq!(params.retarget(&target, span), target);
    }

    #[test]
    fn test_retarget_fast_blocks_is_harder() {
        let params = ChainParams::mainnet();
        let target = params.genesis_target();
        let span = params.target_block_time_ms * params.target_period / 2;
        assert_eq!(params.retarget(&target, span), target.scale(1, 2));
    }

    #[test]
    fn test_retarget_is_clamped() {
        let params = ChainParams::mainnet();
        let target = params.genesis_target();
        assert_eq!(params.retarget(&target, 0), target.scale(1, 4));
        assert_eq!(params.retarget(&target, 1), target.scale(1, 4));
        assert_eq!(params.retarget(&target, u64::MAX), target.scale(4, 1));
    }
}

// Block tree: every known block, the best chain through it and pending orphans

use crate::consensus::{ChainParams, ValidationError, apply_block, validate_block};
use crate::core::{Block, Hash256, Target};
use crate::storage::UtxoSet;
use std::cell::OnceCell;
use std::collections::{HashMap, VecDeque};

/// Locator entries taken one block apart before the step starts doubling
const LOCATOR_DENSE_ENTRIES: usize = 10;

/// One admitted block and its place in the tree
#[derive(Debug)]
pub struct ChainNode {
    pub block: Block,
    pub hash: Hash256,
    pub height: u64,
    pub previous: Option<Hash256>,
    /// Successor on the best chain; `None` off the best chain and at the tip
    pub next: Option<Hash256>,
    /// On the currently accepted best chain
    pub main: bool,
    /// Ledger after applying this block on top of `previous`
    pub utxos: UtxoSet,
    next_target: OnceCell<Target>,
}

impl ChainNode {
    fn new(block: Block, hash: Hash256, height: u64, utxos: UtxoSet) -> Self {
        Self {
            previous: block.previous_hash,
            block,
            hash,
            height,
            next: None,
            main: false,
            utxos,
            next_target: OnceCell::new(),
        }
    }
}

/// What happened to the best chain while admitting a block (and any orphans
/// it released)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChainUpdate {
    /// Blocks inserted into the index, the submitted one first
    pub connected: Vec<Hash256>,
    /// Every block that became the tip, in order
    pub new_tips: Vec<Hash256>,
    /// Blocks that joined the best chain through a reorg (below the new tip),
    /// lowest first
    pub reactivated: Vec<Hash256>,
    /// Blocks that left the best chain through a reorg
    pub abandoned: Vec<Hash256>,
    /// Released orphans that failed validation
    pub rejected: Vec<(Hash256, ValidationError)>,
}

impl ChainUpdate {
    pub fn tip_advanced(&self) -> bool {
        !self.new_tips.is_empty()
    }
}

/// Result of offering a block to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddBlockOutcome {
    /// Already known; nothing changed
    Duplicate,
    /// Parent unknown; buffered until it arrives
    Orphan,
    Connected(ChainUpdate),
}

impl AddBlockOutcome {
    pub fn tip_advanced(&self) -> bool {
        matches!(self, AddBlockOutcome::Connected(update) if update.tip_advanced())
    }
}

/// Every known block keyed by hash, with the best chain marked through
/// `main`/`next` and blocks awaiting their parent kept aside.
#[derive(Debug)]
pub struct ChainIndex {
    params: ChainParams,
    nodes: HashMap<Hash256, ChainNode>,
    orphans: HashMap<Hash256, Vec<Block>>,
    genesis: Hash256,
    tip: Hash256,
}

impl ChainIndex {
    /// Index holding only the genesis block, which is trusted as given
    pub fn new(params: ChainParams) -> Self {
        let genesis = params.genesis.clone();
        let hash = genesis.hash();

        let mut utxos = UtxoSet::new();
        apply_block(&genesis, &mut utxos);

        let mut node = ChainNode::new(genesis, hash, 0, utxos);
        node.main = true;

        let mut nodes = HashMap::new();
        nodes.insert(hash, node);

        Self {
            params,
            nodes,
            orphans: HashMap::new(),
            genesis: hash,
            tip: hash,
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn genesis_hash(&self) -> Hash256 {
        self.genesis
    }

    pub fn tip_hash(&self) -> Hash256 {
        self.tip
    }

    pub fn tip(&self) -> &ChainNode {
        &self.nodes[&self.tip]
    }

    pub fn height(&self) -> u64 {
        self.tip().height
    }

    /// Ledger snapshot of the best chain
    pub fn utxos(&self) -> &UtxoSet {
        &self.tip().utxos
    }

    pub fn get(&self, hash: &Hash256) -> Option<&ChainNode> {
        self.nodes.get(hash)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Number of admitted blocks, off-chain ones included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of buffered orphan blocks
    pub fn orphan_count(&self) -> usize {
        self.orphans.values().map(Vec::len).sum()
    }

    /// Best chain from genesis to tip
    pub fn main_chain(&self) -> Vec<&ChainNode> {
        let mut chain = Vec::with_capacity(self.height() as usize + 1);
        let mut cursor = Some(self.tip);
        while let Some(node) = cursor.and_then(|hash| self.nodes.get(&hash)) {
            chain.push(node);
            cursor = node.previous;
        }
        chain.reverse();
        chain
    }

    /// Target a block extending the tip must meet
    pub fn next_target(&self) -> Target {
        self.target_after(Some(self.tip()))
    }

    /// Reward a block extending the tip may claim
    pub fn next_reward(&self) -> u64 {
        self.reward_after(Some(self.tip()))
    }

    fn reward_after(&self, previous: Option<&ChainNode>) -> u64 {
        let height = previous.map_or(0, |node| node.height + 1);
        self.params.block_reward(height)
    }

    /// Target for the child of `previous`.
    ///
    /// Unchanged except on retarget boundaries, where it is computed from the
    /// time spanned by the last `target_period` blocks and cached on
    /// `previous`.
    fn target_after(&self, previous: Option<&ChainNode>) -> Target {
        let Some(node) = previous else {
            return self.params.genesis_target();
        };
        let period = self.params.target_period.max(1);
        if (node.height + 1) % period != 0 {
            return node.block.target;
        }

        *node.next_target.get_or_init(|| {
            let mut start = node;
            for _ in 1..period {
                match start.previous.and_then(|hash| self.nodes.get(&hash)) {
                    Some(previous) => start = previous,
                    None => break,
                }
            }
            // clocks running backwards count as the slowest possible period
            let span = node
                .block
                .time
                .checked_sub(start.block.time)
                .unwrap_or(u64::MAX);
            let target = self.params.retarget(&node.block.target, span);
            log::info!(
                "retarget at height {}: {} ms over {} blocks, target {}",
                node.height + 1,
                span,
                period,
                target
            );
            target
        })
    }

    /// Hashes from the tip back to genesis: the latest blocks one by one, then
    /// with doubling gaps. Always ends with the genesis hash.
    pub fn block_locator(&self) -> Vec<Hash256> {
        let mut hashes = Vec::new();
        let mut cursor = Some(self.tip());
        let mut step = 1usize;

        while let Some(node) = cursor {
            if hashes.len() >= LOCATOR_DENSE_ENTRIES {
                step = step.saturating_mul(2);
            }
            hashes.push(node.hash);
            for _ in 0..step {
                cursor = cursor
                    .and_then(|node| node.previous)
                    .and_then(|hash| self.nodes.get(&hash));
                if cursor.is_none() {
                    break;
                }
            }
        }

        if hashes.last() != Some(&self.genesis) {
            hashes.push(self.genesis);
        }
        hashes
    }

    /// Best-chain blocks after the first locator entry that is on our best
    /// chain, lowest first. Empty when no entry matches.
    pub fn blocks_after(&self, locator: &[Hash256]) -> Vec<&Block> {
        let Some(mut current) = locator
            .iter()
            .filter_map(|hash| self.nodes.get(hash))
            .find(|node| node.main)
        else {
            return Vec::new();
        };

        let mut blocks = Vec::new();
        while let Some(next) = current.next.and_then(|hash| self.nodes.get(&hash)) {
            if !next.main {
                break;
            }
            blocks.push(&next.block);
            current = next;
        }
        blocks
    }

    /// Admit a block.
    ///
    /// A block whose parent is unknown is buffered. A connected block may
    /// release buffered children, which are admitted in turn; each block
    /// becomes the tip only if it is strictly higher than the current one.
    /// The error reports why the submitted block itself was rejected; failed
    /// orphans are listed in the update.
    pub fn add_block(&mut self, block: Block) -> Result<AddBlockOutcome, ValidationError> {
        let hash = block.hash();
        if self.nodes.contains_key(&hash) {
            return Ok(AddBlockOutcome::Duplicate);
        }

        match block.previous_hash {
            None => {
                self.orphans.remove(&hash);
                return Err(ValidationError::Detached(hash));
            }
            Some(previous) if !self.nodes.contains_key(&previous) => {
                self.buffer_orphan(previous, block, hash);
                return Ok(AddBlockOutcome::Orphan);
            }
            Some(_) => {}
        }

        self.connect(block, hash)?;

        let mut update = ChainUpdate::default();
        update.connected.push(hash);
        self.update_best_chain(hash, &mut update);

        let mut released = VecDeque::from([hash]);
        while let Some(parent) = released.pop_front() {
            for orphan in self.orphans.remove(&parent).unwrap_or_default() {
                let orphan_hash = orphan.hash();
                if self.nodes.contains_key(&orphan_hash) {
                    continue;
                }
                match self.connect(orphan, orphan_hash) {
                    Ok(()) => {
                        update.connected.push(orphan_hash);
                        self.update_best_chain(orphan_hash, &mut update);
                        released.push_back(orphan_hash);
                    }
                    Err(err) => {
                        log::warn!("orphan {} rejected: {}", orphan_hash, err);
                        update.rejected.push((orphan_hash, err));
                    }
                }
            }
        }

        Ok(AddBlockOutcome::Connected(update))
    }

    fn buffer_orphan(&mut self, previous: Hash256, block: Block, hash: Hash256) {
        let pending = self.orphans.entry(previous).or_default();
        if pending.iter().any(|orphan| orphan.hash() == hash) {
            return;
        }
        log::debug!("orphan {} waiting for {}", hash, previous);
        pending.push(block);
    }

    /// Validate `block` against its parent and insert it off the best chain.
    /// The parent must already be indexed.
    fn connect(&mut self, block: Block, hash: Hash256) -> Result<(), ValidationError> {
        let previous = block.previous_hash.and_then(|hash| self.nodes.get(&hash));
        let Some(previous) = previous else {
            return Err(ValidationError::Detached(hash));
        };

        let target = self.target_after(Some(previous));
        let reward = self.reward_after(Some(previous));
        if let Err(err) = validate_block(&block, &previous.utxos, &target, reward) {
            // children of an invalid block can never connect
            self.orphans.remove(&hash);
            return Err(err);
        }

        let height = previous.height + 1;
        let mut utxos = previous.utxos.clone();
        apply_block(&block, &mut utxos);

        self.nodes
            .insert(hash, ChainNode::new(block, hash, height, utxos));
        Ok(())
    }

    /// Make `hash` the tip if it is strictly higher than the current one,
    /// switching branches when it does not extend the current tip.
    fn update_best_chain(&mut self, hash: Hash256, update: &mut ChainUpdate) {
        let Some(node) = self.nodes.get(&hash) else {
            return;
        };
        if node.height <= self.tip().height {
            return;
        }
        let previous = node.previous;

        if previous != Some(self.tip) {
            self.reorganize(previous, update);
        }

        if let Some(node) = self.nodes.get_mut(&hash) {
            node.main = true;
        }
        if let Some(previous) = previous.and_then(|hash| self.nodes.get_mut(&hash)) {
            previous.next = Some(hash);
        }
        self.tip = hash;
        update.new_tips.push(hash);
        log::info!("new tip {} at height {}", hash, self.tip().height);
    }

    /// Move the best chain onto the branch ending at `branch_tip`: mark the
    /// branch main back to the first node already on the best chain (the fork
    /// point), then unmark the old best chain down to that same point.
    fn reorganize(&mut self, branch_tip: Option<Hash256>, update: &mut ChainUpdate) {
        let mut activated = Vec::new();
        let mut fork = None;
        let mut cursor = branch_tip;

        while let Some(hash) = cursor {
            let Some(node) = self.nodes.get_mut(&hash) else {
                break;
            };
            if node.main {
                fork = Some(hash);
                break;
            }
            node.main = true;
            activated.push(hash);
            cursor = node.previous;
            if let Some(previous) = cursor.and_then(|prev| self.nodes.get_mut(&prev)) {
                previous.next = Some(hash);
            }
        }

        let mut abandoned = Vec::new();
        let mut cursor = Some(self.tip);
        while let Some(hash) = cursor {
            if Some(hash) == fork {
                break;
            }
            let Some(node) = self.nodes.get_mut(&hash) else {
                break;
            };
            node.main = false;
            node.next = None;
            abandoned.push(hash);
            cursor = node.previous;
        }

        activated.reverse();
        log::info!(
            "reorg at {}: {} blocks abandoned, {} reactivated",
            fork.map(|hash| hash.to_string()).unwrap_or_default(),
            abandoned.len(),
            activated.len()
        );
        update.reactivated.extend(activated);
        update.abandoned.extend(abandoned);
    }
}

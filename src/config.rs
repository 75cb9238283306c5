// Node configuration

use std::time::Duration;

/// Most peers a node dials on its own
pub const MAX_CONNECTIONS: usize = 8;
/// How often the address book is revisited for new connections
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);
/// Addresses not seen for this long are not dialed
pub const PEER_STALENESS: Duration = Duration::from_secs(60 * 60);
/// Proof-of-work attempts per mining step
pub const MINING_BATCH: u64 = 1000;

/// Per-node settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address this node listens on and advertises in `version`
    pub address: Option<String>,
    /// Fixed peer list; when set, gossip and seeds are ignored
    pub connect: Option<Vec<String>>,
    /// Addresses dialed in addition to the seeds
    pub addnode: Vec<String>,
    /// Default peers. Empty by default: the historical seed list consists of
    /// `wss:` relay URLs this TCP transport cannot dial.
    pub seeds: Vec<String>,
    /// Hex private key; a fresh key is generated when absent
    pub private_key: Option<String>,
    pub max_connections: usize,
    pub reconnect_interval: Duration,
    pub peer_staleness: Duration,
    pub mining_batch: u64,
    /// Mine from startup
    pub mine: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: None,
            connect: None,
            addnode: Vec::new(),
            seeds: Vec::new(),
            private_key: None,
            max_connections: MAX_CONNECTIONS,
            reconnect_interval: RECONNECT_INTERVAL,
            peer_staleness: PEER_STALENESS,
            mining_batch: MINING_BATCH,
            mine: false,
        }
    }
}

impl NodeConfig {
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    /// Addresses the address book starts with
    pub fn initial_peers(&self) -> Vec<String> {
        match &self.connect {
            Some(fixed) => fixed.clone(),
            None => self
                .seeds
                .iter()
                .chain(&self.addnode)
                .cloned()
                .collect(),
        }
    }

    /// Whether learned addresses are kept
    pub fn learns_addresses(&self) -> bool {
        self.connect.is_none()
    }
}

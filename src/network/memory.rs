// In-process transport: nodes exchange encoded messages through queues

use crate::core::Block;
use crate::miner::MiningError;
use crate::network::{Direction, Node, Outbound, PeerId, Recipient};
use std::collections::{HashMap, VecDeque};

/// Upper bound on deliveries per `run`, in case nodes keep gossiping forever
const MAX_DELIVERIES: usize = 1_000_000;

/// Position of a node within a [`MemoryNetwork`]
pub type NodeId = usize;

#[derive(Debug)]
struct Link {
    from: NodeId,
    to: NodeId,
    /// Messages held while this direction is paused
    held: VecDeque<Vec<u8>>,
    paused: bool,
    /// Peer id under which the receiving node knows the sender
    remote_peer: PeerId,
}

/// In-process transport for several [`Node`]s.
///
/// Every message goes through its JSON encoding, exactly as it would over a
/// socket. Each connection has two directions that can be paused separately;
/// a paused direction holds its messages until it is resumed.
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    nodes: Vec<Node>,
    /// (node, local peer id) -> outgoing direction of that connection
    links: HashMap<(NodeId, PeerId), Link>,
    queue: VecDeque<(NodeId, PeerId, Vec<u8>)>,
    next_peer: u64,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn peer_between(&self, from: NodeId, to: NodeId) -> Option<PeerId> {
        self.links
            .iter()
            .find(|((node, _), link)| *node == from && link.to == to)
            .map(|((_, peer), _)| *peer)
    }

    pub fn is_connected(&self, a: NodeId, b: NodeId) -> bool {
        self.peer_between(a, b).is_some()
    }

    /// Open a connection from `dialer` to `listener`; both sides get their
    /// connection event
    pub fn connect(&mut self, dialer: NodeId, listener: NodeId) {
        if dialer == listener || self.is_connected(dialer, listener) {
            return;
        }
        let dialer_peer = self.fresh_peer();
        let listener_peer = self.fresh_peer();

        self.links.insert(
            (dialer, dialer_peer),
            Link {
                from: dialer,
                to: listener,
                held: VecDeque::new(),
                paused: false,
                remote_peer: listener_peer,
            },
        );
        self.links.insert(
            (listener, listener_peer),
            Link {
                from: listener,
                to: dialer,
                held: VecDeque::new(),
                paused: false,
                remote_peer: dialer_peer,
            },
        );

        let address = self.nodes[listener].address().map(str::to_string);
        self.nodes[dialer].peer_connected(dialer_peer, address, Direction::Outgoing);
        self.nodes[listener].peer_connected(listener_peer, None, Direction::Incoming);
    }

    /// Close the connection between `a` and `b`, dropping anything in flight
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) {
        let (Some(a_peer), Some(b_peer)) = (self.peer_between(a, b), self.peer_between(b, a)) else {
            return;
        };
        self.links.remove(&(a, a_peer));
        self.links.remove(&(b, b_peer));
        self.queue
            .retain(|(node, peer, _)| (*node, *peer) != (a, a_peer) && (*node, *peer) != (b, b_peer));

        self.nodes[a].peer_disconnected(a_peer);
        self.nodes[b].peer_disconnected(b_peer);
    }

    /// Hold messages travelling from `from` to `to`
    pub fn pause(&mut self, from: NodeId, to: NodeId) {
        if let Some(link) = self.link_mut(from, to) {
            link.paused = true;
        }
    }

    /// Release held messages from `from` to `to`, in their original order
    pub fn resume(&mut self, from: NodeId, to: NodeId) {
        let Some(link) = self.link_mut(from, to) else {
            return;
        };
        link.paused = false;
        let target = (link.to, link.remote_peer);
        let held: Vec<Vec<u8>> = link.held.drain(..).collect();
        for body in held {
            self.queue.push_back((target.0, target.1, body));
        }
    }

    /// Pause both directions between `a` and `b`
    pub fn partition(&mut self, a: NodeId, b: NodeId) {
        self.pause(a, b);
        self.pause(b, a);
    }

    pub fn heal(&mut self, a: NodeId, b: NodeId) {
        self.resume(a, b);
        self.resume(b, a);
    }

    fn link_mut(&mut self, from: NodeId, to: NodeId) -> Option<&mut Link> {
        let peer = self.peer_between(from, to)?;
        self.links.get_mut(&(from, peer))
    }

    fn fresh_peer(&mut self) -> PeerId {
        self.next_peer += 1;
        PeerId(self.next_peer)
    }

    /// Move every node's outbox onto the links
    fn collect_outboxes(&mut self) {
        for from in 0..self.nodes.len() {
            for outbound in self.nodes[from].take_outbox() {
                self.route(from, outbound);
            }
        }
    }

    fn route(&mut self, from: NodeId, outbound: Outbound) {
        let body = match outbound.message.to_bytes() {
            Ok(body) => body,
            Err(e) => {
                log::error!("cannot encode {:?}: {}", outbound.message.message_type(), e);
                return;
            }
        };

        let mut targets: Vec<PeerId> = self
            .links
            .keys()
            .filter(|(node, peer)| *node == from && outbound.recipient.includes(*peer))
            .map(|(_, peer)| *peer)
            .collect();
        // deterministic fan-out order
        targets.sort();
        if let Recipient::Peer(peer) = outbound.recipient
            && !targets.contains(&peer)
        {
            log::debug!("dropping message for unknown {}", peer);
        }

        for peer in targets {
            let Some(link) = self.links.get_mut(&(from, peer)) else {
                continue;
            };
            if link.paused {
                link.held.push_back(body.clone());
            } else {
                self.queue.push_back((link.to, link.remote_peer, body.clone()));
            }
        }
    }

    /// Deliver messages until every queue is empty (paused directions keep
    /// theirs). Returns the number of messages delivered.
    pub fn run(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            self.collect_outboxes();
            let Some((node, peer, body)) = self.queue.pop_front() else {
                return delivered;
            };
            self.nodes[node].receive_bytes(peer, &body);
            delivered += 1;
            if delivered >= MAX_DELIVERIES {
                log::warn!("memory network still busy after {} deliveries", delivered);
                return delivered;
            }
        }
    }

    /// Mine on `id` until it finds a block, then deliver the fallout
    pub fn mine(&mut self, id: NodeId) -> Result<Block, MiningError> {
        let batch = self.nodes[id].config().mining_batch;
        loop {
            if let Some(block) = self.nodes[id].mine_once(batch)? {
                self.run();
                return Ok(block);
            }
        }
    }

    /// Connect every pair of nodes, the lower id dialing
    pub fn connect_all(&mut self) {
        for dialer in 0..self.nodes.len() {
            for listener in dialer + 1..self.nodes.len() {
                self.connect(dialer, listener);
            }
        }
    }

    /// Whether every node has the same tip
    pub fn converged(&self) -> bool {
        let mut tips = self.nodes.iter().map(|node| node.chain().tip_hash());
        match tips.next() {
            Some(first) => tips.all(|tip| tip == first),
            None => true,
        }
    }

    /// Messages queued or held on paused links
    pub fn in_flight(&self) -> usize {
        self.queue.len() + self.links.values().map(|link| link.held.len()).sum::<usize>()
    }

    /// Open directions as (from, to), sorted
    pub fn link_endpoints(&self) -> Vec<(NodeId, NodeId)> {
        let mut endpoints: Vec<(NodeId, NodeId)> =
            self.links.values().map(|link| (link.from, link.to)).collect();
        endpoints.sort();
        endpoints
    }
}

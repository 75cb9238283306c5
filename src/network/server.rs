// TCP runtime: drives one Node over real sockets

use crate::core::Transaction;
use crate::network::{Direction, NetworkError, Node, NodeStatus, Peer, PeerId, TransportEvent};
use crate::wallet::WalletError;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Requests from a [`RuntimeHandle`]
enum Command {
    Connect(String),
    Status(oneshot::Sender<NodeStatus>),
    Transfer {
        recipient: Vec<u8>,
        value: u64,
        reply: oneshot::Sender<Result<Transaction, WalletError>>,
    },
    Mining(bool),
    Stop,
}

/// Everything the runtime loop reacts to besides commands
enum Event {
    Transport(TransportEvent),
    /// Connection established; its frames will follow this event
    Attached {
        peer: PeerId,
        address: Option<String>,
        direction: Direction,
        writer: mpsc::UnboundedSender<Vec<u8>>,
    },
    DialFailed(String),
}

/// Control surface of a running node
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::UnboundedSender<Command>,
    local_addr: Option<SocketAddr>,
}

impl RuntimeHandle {
    /// Address the listener is bound to, if the node listens
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn command(&self, command: Command) -> Result<(), NetworkError> {
        self.commands.send(command).map_err(|_| NetworkError::Stopped)
    }

    pub fn connect(&self, address: impl Into<String>) -> Result<(), NetworkError> {
        self.command(Command::Connect(address.into()))
    }

    pub async fn status(&self) -> Result<NodeStatus, NetworkError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Status(reply))?;
        response.await.map_err(|_| NetworkError::Stopped)
    }

    pub async fn transfer(
        &self,
        recipient: Vec<u8>,
        value: u64,
    ) -> Result<Result<Transaction, WalletError>, NetworkError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Transfer {
            recipient,
            value,
            reply,
        })?;
        response.await.map_err(|_| NetworkError::Stopped)
    }

    pub fn start_mining(&self) -> Result<(), NetworkError> {
        self.command(Command::Mining(true))
    }

    pub fn stop_mining(&self) -> Result<(), NetworkError> {
        self.command(Command::Mining(false))
    }

    /// Close every connection and end the runtime; its task yields the node
    pub fn stop(&self) -> Result<(), NetworkError> {
        self.command(Command::Stop)
    }
}

/// Bind the listener (when the node has an address), then run the node on a
/// background task until [`RuntimeHandle::stop`].
///
/// A port of 0 is replaced by the bound port in the advertised address.
pub async fn start(mut node: Node) -> Result<(RuntimeHandle, JoinHandle<Node>), NetworkError> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let next_peer = Arc::new(AtomicU64::new(0));

    let mut local_addr = None;
    let mut listener_task = None;
    if let Some(address) = node.address().map(str::to_string) {
        let listener = TcpListener::bind(&address).await?;
        let bound = listener.local_addr()?;
        if bound.to_string() != address {
            node.set_address(bound.to_string());
        }
        log::info!("[{}] listening", bound);
        local_addr = Some(bound);
        listener_task = Some(tokio::spawn(accept_loop(
            listener,
            events_tx.clone(),
            next_peer.clone(),
        )));
    }

    let runtime = Runtime {
        node,
        peers: HashMap::new(),
        dialing: HashSet::new(),
        events_tx,
        events_rx,
        commands_rx,
        next_peer,
        listener_task,
    };
    let task = tokio::spawn(runtime.run());

    Ok((
        RuntimeHandle {
            commands: commands_tx,
            local_addr,
        },
        task,
    ))
}

async fn accept_loop(
    listener: TcpListener,
    events: mpsc::UnboundedSender<Event>,
    next_peer: Arc<AtomicU64>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let id = PeerId(next_peer.fetch_add(1, Ordering::Relaxed));
                attach(Peer::new(id, stream, addr), None, Direction::Incoming, &events);
            }
            Err(e) => log::warn!("failed to accept connection: {}", e),
        }
    }
}

/// Announce the connection, then start its reader and writer tasks
fn attach(
    peer: Peer,
    address: Option<String>,
    direction: Direction,
    events: &mpsc::UnboundedSender<Event>,
) {
    let frames = events.clone();
    let closed = events.clone();

    peer.spawn(
        |peer, writer| {
            let _ = events.send(Event::Attached {
                peer,
                address,
                direction,
                writer,
            });
        },
        move |peer, body| {
            frames
                .send(Event::Transport(TransportEvent::Message { peer, body }))
                .is_ok()
        },
        move |peer| {
            let _ = closed.send(Event::Transport(TransportEvent::Disconnected(peer)));
        },
    );
}

struct Runtime {
    node: Node,
    peers: HashMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>,
    /// Addresses with a connection attempt in progress
    dialing: HashSet<String>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    next_peer: Arc<AtomicU64>,
    listener_task: Option<JoinHandle<()>>,
}

impl Runtime {
    async fn run(mut self) -> Node {
        let mut reconnect = tokio::time::interval(self.node.config().reconnect_interval);
        reconnect.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                command = self.commands_rx.recv() => match command {
                    Some(Command::Stop) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = reconnect.tick() => self.reconnect(),
                _ = tokio::task::yield_now(), if self.node.is_mining() => self.mine_step(),
            }
            self.flush();
        }

        self.shutdown();
        self.node
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Attached {
                peer,
                address,
                direction,
                writer,
            } => {
                if let Some(address) = &address {
                    self.dialing.remove(address);
                }
                self.peers.insert(peer, writer);
                self.node.peer_connected(peer, address, direction);
            }
            Event::DialFailed(address) => {
                log::warn!("[{}] connect to {} failed", self.label(), address);
                self.dialing.remove(&address);
            }
            Event::Transport(TransportEvent::Message { peer, body }) => {
                if self.peers.contains_key(&peer) {
                    self.node.receive_bytes(peer, &body);
                }
            }
            Event::Transport(TransportEvent::Disconnected(peer)) => {
                if self.peers.remove(&peer).is_some() {
                    self.node.peer_disconnected(peer);
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(address) => self.dial(address),
            Command::Status(reply) => {
                let _ = reply.send(self.node.status());
            }
            Command::Transfer {
                recipient,
                value,
                reply,
            } => {
                let _ = reply.send(self.node.transfer(recipient, value));
            }
            Command::Mining(true) => self.node.start_mining(),
            Command::Mining(false) => self.node.stop_mining(),
            Command::Stop => {}
        }
    }

    fn label(&self) -> String {
        self.node.address().unwrap_or("-").to_string()
    }

    /// Dial address book candidates until the connection limit is reached
    fn reconnect(&mut self) {
        let limit = self.node.config().max_connections;
        for address in self.node.connection_candidates() {
            if self.peers.len() + self.dialing.len() >= limit {
                break;
            }
            if !self.dialing.contains(&address) {
                self.dial(address);
            }
        }
    }

    fn dial(&mut self, address: String) {
        if !self.dialing.insert(address.clone()) {
            return;
        }
        let events = self.events_tx.clone();
        let id = PeerId(self.next_peer.fetch_add(1, Ordering::Relaxed));
        tokio::spawn(async move {
            match Peer::connect(id, &address).await {
                Ok(peer) => attach(peer, Some(address), Direction::Outgoing, &events),
                Err(e) => {
                    log::debug!("dial {} failed: {}", address, e);
                    let _ = events.send(Event::DialFailed(address));
                }
            }
        });
    }

    fn mine_step(&mut self) {
        let batch = self.node.config().mining_batch;
        if let Err(e) = self.node.mine_once(batch) {
            log::error!("[{}] mining stopped: {}", self.label(), e);
            self.node.stop_mining();
        }
    }

    /// Hand queued messages to the peers' writer tasks
    fn flush(&mut self) {
        for outbound in self.node.take_outbox() {
            let frame = match outbound.message.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!("[{}] cannot encode message: {}", self.label(), e);
                    continue;
                }
            };
            for (peer, writer) in &self.peers {
                if outbound.recipient.includes(*peer) {
                    let _ = writer.send(frame.clone());
                }
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
        self.node.stop_mining();
        for peer in self.peers.drain().map(|(peer, _)| peer).collect::<Vec<_>>() {
            self.node.peer_disconnected(peer);
        }
        log::info!("[{}] stopped", self.label());
    }
}

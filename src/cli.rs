// CLI commands

use crate::config::{MAX_CONNECTIONS, MINING_BATCH, NodeConfig};
use crate::consensus::ChainParams;
use crate::core::ParseError;
use crate::network::{NetworkError, Node, server};
use crate::wallet::KeyPair;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "minichain")]
#[command(about = "Minimal proof-of-work blockchain node", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a node until interrupted
    Run(RunArgs),

    /// Print a key pair; derives the public key when a private key is given
    Keygen {
        /// Hex private key
        #[arg(long)]
        private_key: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Address to listen on and advertise to peers
    #[arg(long)]
    pub address: Option<String>,

    /// Only ever connect to these peers
    #[arg(long)]
    pub connect: Vec<String>,

    /// Additional peer, on top of the seeds
    #[arg(long)]
    pub addnode: Vec<String>,

    /// Seed peer
    #[arg(long)]
    pub seed: Vec<String>,

    /// Hex private key receiving mining rewards
    #[arg(long)]
    pub private_key: Option<String>,

    /// Start mining immediately
    #[arg(long)]
    pub mine: bool,

    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Proof-of-work attempts between message processing
    #[arg(long, default_value_t = MINING_BATCH)]
    pub mining_batch: u64,

    /// Use the easy local-testing difficulty
    #[arg(long)]
    pub regtest: bool,
}

impl RunArgs {
    pub fn to_config(&self) -> NodeConfig {
        NodeConfig {
            address: self.address.clone(),
            connect: (!self.connect.is_empty()).then(|| self.connect.clone()),
            addnode: self.addnode.clone(),
            seeds: self.seed.clone(),
            private_key: self.private_key.clone(),
            max_connections: self.max_connections,
            mining_batch: self.mining_batch,
            mine: self.mine,
            ..NodeConfig::default()
        }
    }

    pub fn chain_params(&self) -> ChainParams {
        let mainnet = ChainParams::mainnet();
        if !self.regtest {
            return mainnet;
        }
        let founder = mainnet.genesis_owner().map(<[u8]>::to_vec).unwrap_or_default();
        ChainParams::regtest(founder)
    }
}

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid key: {0}")]
    Key(#[from] ParseError),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// CLI handler
pub struct CliHandler;

impl CliHandler {
    /// Handle CLI command
    pub async fn handle(cli: Cli) -> Result<(), CliError> {
        match cli.command {
            Commands::Run(args) => Self::run(args).await,
            Commands::Keygen { private_key } => Self::keygen(private_key.as_deref()),
        }
    }

    fn keygen(private_key: Option<&str>) -> Result<(), CliError> {
        let keypair = match private_key {
            Some(secret) => KeyPair::from_secret_hex(secret)?,
            None => KeyPair::generate(),
        };
        println!("Private key: {}", keypair.secret_key_hex());
        println!("Public key:  {}", keypair.public_key_hex());
        Ok(())
    }

    async fn run(args: RunArgs) -> Result<(), CliError> {
        let node = Node::new(args.to_config(), args.chain_params())?;
        println!("Owner: {}", node.keypair().public_key_hex());
        println!("Genesis: {}", node.chain().genesis_hash());

        let (handle, task) = server::start(node).await?;
        if let Some(addr) = handle.local_addr() {
            println!("Listening on {}", addr);
        }

        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("cannot wait for ctrl-c: {}", e);
        }

        let status = handle.status().await?;
        handle.stop()?;
        if task.await.is_err() {
            log::error!("node task panicked");
        }

        println!("Stopped at height {} ({})", status.height, status.tip);
        println!("Balance: {}", status.balance);
        Ok(())
    }
}

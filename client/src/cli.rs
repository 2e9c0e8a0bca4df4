use alloy::primitives::Address;
use clap::Parser;
use serde::Serialize;
use url::Url;

#[derive(Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub enum Command {
    /// Publish the job content and fund a Direct Contract escrow
    Create(CreateConfig),
    /// Show a job merged with its off-chain content
    Show(JobConfig),
    /// Show a job and its work submissions in ledger order
    Updates(JobConfig),
    /// Report the authorized wallet account
    Accounts(AccountsConfig),
}

#[derive(Clone, Parser, Serialize)]
pub struct BaseConfig {
    /// Node host
    #[arg(long, env = "NODE_HOST", default_value = "localhost")]
    pub node_host: String,

    /// Node port
    #[arg(long, env = "NODE_PORT", default_value = "8545")]
    pub node_port: String,

    /// Escrow contract address
    #[arg(long, env = "ESCROW_ADDRESS")]
    pub escrow_address: Address,

    /// Local signer private key (with or without 0x prefix). Without it the
    /// JSON-RPC wallet at --wallet-url signs.
    #[arg(long, env = "OWNER_KEY")]
    #[serde(skip_serializing)]
    pub owner_key: Option<String>,

    /// JSON-RPC wallet endpoint, defaults to the node
    #[arg(long, env = "WALLET_URL")]
    pub wallet_url: Option<Url>,

    /// Content publishing endpoint
    #[arg(long, env = "PIN_URL", default_value = "http://localhost:3000/api/pinata/pinJobDetails")]
    pub pin_url: Url,

    /// Content gateway
    #[arg(long, env = "GATEWAY_URL", default_value = "https://gateway.pinata.cloud")]
    pub gateway_url: Url,

    /// Timeout for content gateway requests, in seconds
    #[arg(long, env = "CONTENT_TIMEOUT", default_value_t = 30)]
    pub content_timeout: u64,

    /// Gas limit for the funding transaction, estimated when unset
    #[arg(long, env = "MAX_GAS")]
    pub max_gas: Option<u64>,
}

impl BaseConfig {
    pub fn node_url(&self) -> Result<Url, url::ParseError> {
        let node_url = format!("http://{}:{}", self.node_host, self.node_port);
        Url::parse(&node_url)
    }

    pub fn wallet_url(&self) -> Result<Url, url::ParseError> {
        match &self.wallet_url {
            Some(url) => Ok(url.clone()),
            None => self.node_url(),
        }
    }

    /// Where funding transactions are sent. A local signer signs and
    /// broadcasts through the node; otherwise the wallet that authorized the
    /// account must receive the `eth_sendTransaction`.
    pub fn transaction_url(&self) -> Result<Url, url::ParseError> {
        match self.owner_key {
            Some(_) => self.node_url(),
            None => self.wallet_url(),
        }
    }
}

#[derive(Clone, Parser, Serialize)]
pub struct CreateConfig {
    #[clap(flatten)]
    pub base: BaseConfig,

    #[arg(long)]
    pub title: String,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long = "type", default_value = "")]
    pub job_type: String,

    /// Address of the job taker
    #[arg(long)]
    pub job_taker: Address,

    /// Escrow amount in ether, e.g. 1.5
    #[arg(long)]
    pub amount: String,
}

#[derive(Clone, Parser, Serialize)]
pub struct JobConfig {
    #[clap(flatten)]
    pub base: BaseConfig,

    #[arg(long)]
    pub job_id: String,
}

#[derive(Clone, Parser, Serialize)]
pub struct AccountsConfig {
    #[clap(flatten)]
    pub base: BaseConfig,

    /// Request authorization if no account is authorized yet
    #[arg(long, default_value_t = false)]
    pub connect: bool,
}

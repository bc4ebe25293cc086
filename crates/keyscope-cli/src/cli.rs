use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use keyscope_server::Backend;
use keyscope_store::TlsConfig;

#[derive(Parser)]
#[command(
    name = "keyscope",
    about = "keyscope: browse and edit a flat key-value store as a tree",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP front end
    Serve(ServeArgs),
    /// Print the tree under a key
    Tree(TreeArgs),
    /// Print a single key
    Get(GetArgs),
    /// Write a key
    Put(PutArgs),
    /// Delete a key
    Rm(RmArgs),
    /// Show cluster version, size and leader
    Info(InfoArgs),
}

/// How to reach the store and who to act as.
#[derive(Args, Clone, Debug)]
pub struct ConnectionArgs {
    #[arg(long, default_value = "http://127.0.0.1:2379")]
    pub endpoint: String,
    #[arg(short, long)]
    pub user: Option<String>,
    #[arg(short, long)]
    pub password: Option<String>,
    /// Password of the root user, used to look up role permissions
    #[arg(long)]
    pub root_password: Option<String>,
    #[arg(long, default_value = "/")]
    pub separator: String,
    /// The store has authentication disabled
    #[arg(long)]
    pub no_auth: bool,
    /// Connect and request timeout, in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
    #[command(flatten)]
    pub tls: TlsArgs,
}

/// Client TLS material for the store gateway.
#[derive(Args, Clone, Debug, Default)]
pub struct TlsArgs {
    /// PEM bundle of CA certificates to trust
    #[arg(long)]
    pub ca_file: Option<PathBuf>,
    /// PEM client certificate
    #[arg(long, requires = "key_file")]
    pub cert_file: Option<PathBuf>,
    /// PEM private key for --cert-file
    #[arg(long, requires = "cert_file")]
    pub key_file: Option<PathBuf>,
}

impl TlsArgs {
    pub fn to_config(&self) -> TlsConfig {
        TlsConfig {
            ca_file: self.ca_file.clone(),
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
        }
    }
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    #[arg(long)]
    pub backend: Option<Backend>,
    /// Store endpoint for requests that do not name one
    #[arg(long)]
    pub endpoint: Option<String>,
    #[arg(long)]
    pub separator: Option<String>,
    #[arg(long)]
    pub root_password: Option<String>,
    #[arg(long)]
    pub no_auth: bool,
    #[command(flatten)]
    pub tls: TlsArgs,
}

#[derive(Args)]
pub struct TreeArgs {
    #[arg(default_value = "/")]
    pub key: String,
    #[command(flatten)]
    pub conn: ConnectionArgs,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
    #[command(flatten)]
    pub conn: ConnectionArgs,
}

#[derive(Args)]
pub struct PutArgs {
    pub key: String,
    pub value: String,
    /// Bind the key to a lease that expires after this many seconds
    #[arg(long)]
    pub ttl: Option<i64>,
    #[command(flatten)]
    pub conn: ConnectionArgs,
}

#[derive(Args)]
pub struct RmArgs {
    pub key: String,
    /// Also delete every key nested under KEY
    #[arg(short, long)]
    pub recursive: bool,
    #[command(flatten)]
    pub conn: ConnectionArgs,
}

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub conn: ConnectionArgs,
}

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "inkwell")]
#[command(about = "Threshold-encrypted content: seal, decrypt, run key servers")]
pub struct Cli {
    /// Client configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Wallet secret key file (32 bytes, hex)
    #[arg(long, global = true, default_value = "wallet.key")]
    pub wallet: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KeyKind {
    /// Reader wallet (Ed25519)
    Wallet,
    /// Key-server master key (BLS12-381)
    KeyServer,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a key and write its hex secret to a file
    Keygen {
        #[arg(long, value_enum)]
        kind: KeyKind,
        /// Output path for the hex secret
        #[arg(long)]
        out: String,
    },
    /// Print the wallet address
    Address,
    /// Seal a file for the configured key servers
    Encrypt {
        /// Path to the plaintext file
        #[arg(long)]
        file: String,
        /// Collection the object id is derived from (hex)
        #[arg(long)]
        collection: String,
        /// Key shares required to decrypt
        #[arg(long, default_value = "2")]
        threshold: u8,
        /// Output path for the encrypted object
        #[arg(long)]
        out: String,
    },
    /// Fetch and decrypt every file listed in a manifest
    Decrypt {
        /// JSON array of { file_id, blob_ref: { content_id, fetch_key } }
        #[arg(long)]
        manifest: String,
        /// Collection the files belong to (hex)
        #[arg(long)]
        collection: String,
        /// Owner capability object id (owner role)
        #[arg(long, conflicts_with = "subscription")]
        owner_cap: Option<String>,
        /// Subscription object id (subscriber role)
        #[arg(long, requires = "payment_method")]
        subscription: Option<String>,
        /// Payment method object id (subscriber role)
        #[arg(long)]
        payment_method: Option<String>,
        /// Directory decrypted files are written to, one per file id
        #[arg(long)]
        out_dir: String,
    },
    /// Run a key server enforcing a local capability registry
    ServeKeyServer {
        /// Identifier advertised to clients
        #[arg(long)]
        server_id: String,
        /// Master key file written by `keygen --kind key-server`
        #[arg(long)]
        master_key: String,
        /// Capability registry (JSON)
        #[arg(long)]
        registry: String,
        #[arg(long, default_value = "127.0.0.1:8700")]
        listen: String,
    },
}

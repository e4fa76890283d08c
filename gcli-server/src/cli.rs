use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gcli-server",
    about = "gcli gateway - OpenAI and Gemini APIs over a pooled Google credential set",
    version = env!("CARGO_PKG_VERSION"),
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding config.json and credentials/
    #[arg(short, long, global = true, env = "GCLI_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the gateway (default if no command specified)")]
    Serve {
        #[arg(short, long, help = "Override the configured port")]
        port: Option<u16>,
    },

    #[command(about = "Import a Google credential JSON file")]
    Import {
        #[arg(help = "Path to an OAuth or service-account JSON file")]
        file: PathBuf,

        #[arg(long, help = "Credential id (defaults to the file name)")]
        name: Option<String>,

        #[arg(long, help = "Owning user; the credential joins that user's isolated pool")]
        user: Option<String>,
    },

    #[command(about = "List credentials with their pool status")]
    List {
        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Print every advertised model id")]
    Models,

    #[command(about = "Write the effective configuration to config.json")]
    InitConfig {
        #[arg(long, help = "Overwrite an existing config.json")]
        force: bool,
    },
}

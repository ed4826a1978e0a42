use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use carfuse::GenerationMode;

#[derive(Parser)]
#[command(name = "carfuse", version, about = "Fuse two car photos into one generated image")]
pub struct CliArgs {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, global = true, default_value_t = false)]
    pub log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve POST /fuse over HTTP
    Serve(ServeArgs),
    /// Fuse two local image files once and print the JSON result
    Fuse(FuseArgs),
}

/// Options shared by every command that talks to the generation backend
#[derive(Args)]
pub struct GenerationArgs {
    /// Images API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Images API base URL (with or without a trailing /v1)
    #[arg(long, env = "OPENAI_BASE_URL", default_value = carfuse::client::openai::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Model name sent to the backend; omitted when not set
    #[arg(long)]
    pub model: Option<String>,

    /// Timeout for the single outbound request, in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Generation mode (edit-with-mask or prompt-only)
    #[arg(long, value_enum, default_value_t = GenerationMode::EditWithMask)]
    pub mode: GenerationMode,

    /// Directory for staged uploads and per-request artifacts
    #[arg(long, default_value = "uploads")]
    pub work_dir: PathBuf,
}

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Request body limit in MiB (both uploads together)
    #[arg(long, default_value_t = 25)]
    pub max_upload_mb: usize,
}

#[derive(Args)]
pub struct FuseArgs {
    #[command(flatten)]
    pub generation: GenerationArgs,

    /// First car image
    pub car1: PathBuf,

    /// Second car image
    pub car2: PathBuf,
}

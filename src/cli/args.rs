use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct GenerateArgs {
    /// Workspace directory holding modelbridge.toml and service data
    /// (default: current directory)
    #[arg(value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Write the generated bundle files into this directory
    #[arg(long, value_name = "DIR", default_value = "bundle")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct TransferArgs {
    /// Workspace directory holding modelbridge.toml and service data
    #[arg(value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Override the target project name from configuration
    #[arg(long, value_name = "NAME")]
    pub project: Option<String>,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Workspace directory holding modelbridge.toml and service data
    #[arg(value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}

#[derive(Args)]
pub struct DraftArgs {
    /// Workspace directory holding modelbridge.toml and service data
    #[arg(value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Override the text-generation endpoint from configuration
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Workspace directory holding modelbridge.toml and service data
    #[arg(value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Address to bind the API listener on
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8470")]
    pub bind: String,
}

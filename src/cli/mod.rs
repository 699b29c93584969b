pub mod args;
pub mod commands;

pub use args::{DraftArgs, ExportArgs, GenerateArgs, ServeArgs, TransferArgs};
use clap::{Parser, Subcommand};

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
BUNDLE COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "modelbridge")]
#[command(version = crate::VERSION)]
#[command(about = "Bundle generator and transfer engine for Manual-Service BPMN documentation")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: generate a bundle to inspect it, then transfer it into the Modeler workspace or export it as an archive."
)]
pub struct Args {
    /// Enable verbose (debug-level) log output
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Generate a bundle and write it to disk",
        long_about = "Generate rewrites the service diagram and its subprocesses, materializes a form per form-bearing node, and writes the bundle (main BPMN, subprocesses/, forms/, manifest.json) to the output directory.",
        after_help = "Example:\n    modelbridge generate ./workspace --out ./bundle"
    )]
    Generate(GenerateArgs),
    #[command(
        about = "Generate a bundle and transfer it to the Modeler workspace",
        long_about = "Transfer authenticates against the configured OAuth endpoint, resolves or creates the target project, creates a timestamped folder, and uploads every bundle file with bounded per-file retries.",
        after_help = "Example:\n    MODELBRIDGE_CLIENT_ID=... MODELBRIDGE_CLIENT_SECRET=... modelbridge transfer ./workspace"
    )]
    Transfer(TransferArgs),
    #[command(
        about = "Generate a bundle and package it as an archive",
        long_about = "Export writes every bundle file to the configured blob storage under a service/timestamp prefix and produces a single zip archive with fixed subfolder names.",
        after_help = "Example:\n    modelbridge export ./workspace"
    )]
    Export(ExportArgs),
    #[command(
        about = "Draft the service description from its diagram",
        long_about = "Draft sends the service BPMN to the configured text-generation endpoint, clamps the answer to two sentences, and stores it as the service-level description.",
        after_help = "Example:\n    modelbridge draft ./workspace --endpoint https://textgen.example/v1/generate"
    )]
    Draft(DraftArgs),
    #[command(
        about = "Serve the bundle pipeline as an HTTP API",
        long_about = "Serve exposes bundle generation, transfer, export, job polling, diagram saves, and the diagram-change SSE feed over HTTP.",
        after_help = "Example:\n    modelbridge serve ./workspace --bind 127.0.0.1:8470"
    )]
    Serve(ServeArgs),
}

pub async fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Generate(generate_args) => commands::generate(generate_args).await,
        Command::Transfer(transfer_args) => commands::transfer(transfer_args).await,
        Command::Export(export_args) => commands::export(export_args).await,
        Command::Draft(draft_args) => commands::draft(draft_args).await,
        Command::Serve(serve_args) => commands::serve(serve_args).await,
    }
}

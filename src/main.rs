use clap::Parser;
use modelbridge::{cli, logging, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let _guard = logging::init(args.verbose)?;
    cli::run(args).await
}

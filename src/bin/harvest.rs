use anyhow::Result;
use clap::Parser;
use fastharvest::{logging, run_harvester, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);
    run_harvester(cli)?;
    Ok(())
}

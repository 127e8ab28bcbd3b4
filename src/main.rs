use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    flickrpress::logging::init().context("init logging")?;

    let cli = flickrpress::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        flickrpress::cli::Command::Export(args) => {
            flickrpress::export::run(args).context("export")?;
        }
        flickrpress::cli::Command::Scan(args) => {
            flickrpress::scan::run(args).context("scan")?;
        }
    }

    Ok(())
}

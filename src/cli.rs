use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert the Flickr export into WordPress WXR import files.
    Export(ExportArgs),
    /// List discovered photos and their metadata status; writes nothing.
    Scan(ScanArgs),
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Path to the JSON config file.
    #[arg(long, default_value = "config.json")]
    pub config: String,

    /// Provenance tag archived on each attachment
    /// (default: flickrphotos-<timestamp>).
    #[arg(long)]
    pub origin: Option<String>,

    /// Write one file per record category instead of a single combined
    /// document.
    #[arg(long)]
    pub split: bool,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Path to the JSON config file.
    #[arg(long, default_value = "config.json")]
    pub config: String,
}

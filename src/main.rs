use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;

use image_converter::{
    client::{ConversionClient, Outcome, Selection},
    config::Config,
    server, utils,
};

#[derive(Parser)]
#[command(name = "image-converter", about = "Batch image conversion to WebP/AVIF")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the conversion service
    Serve {
        /// Address to listen on (overrides CONVERTER_ADDR)
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Send images to a running service and save converted.zip
    Convert {
        /// Base URL of the service
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,
        /// Output format: webp or avif
        #[arg(long, default_value = "webp")]
        format: String,
        /// Encoder quality, 1-100
        #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,
        /// Directory to write converted.zip into
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Images to convert
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    // Initialize logging
    utils::logger::initialize(&config)?;

    match cli.command {
        Commands::Serve { addr } => {
            if let Some(addr) = addr {
                config.addr = addr;
            }
            server::serve(config).await
        }
        Commands::Convert {
            server,
            format,
            quality,
            out,
            files,
        } => {
            let mut selection = Selection::new(format, quality);
            selection
                .add_paths(&files)
                .await
                .context("failed to read input files")?;

            let client = ConversionClient::new(&server)?;
            match client.convert(&selection, &out).await? {
                Outcome::Saved(path) => info!("Saved {}", path.display()),
                Outcome::Skipped => info!("Nothing to convert"),
            }
            Ok(())
        }
    }
}

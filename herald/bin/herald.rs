#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald::run(herald::Cli::parse()).await
}

//! Command-line interface for sending push notifications

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line utility for sending push notifications
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(about = "Send push notifications through APNs, GCM, ADM and C2DM", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file (overrides HERALD_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one notification
    Send {
        #[command(subcommand)]
        provider: SendCommand,
    },
    /// Read invalidated device tokens from the APNs feedback service
    Feedback {
        /// Records buffered between the listener and the printer
        #[arg(long, default_value_t = 64)]
        capacity: usize,

        /// Wait for the printer instead of dropping records when the buffer is full
        #[arg(long)]
        block: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SendCommand {
    /// Send through the APNs binary gateway
    Apns {
        /// Hex-encoded device token
        #[arg(long)]
        token: String,

        /// Alert text
        #[arg(long)]
        alert: String,

        #[arg(long)]
        badge: Option<u32>,

        #[arg(long)]
        sound: Option<String>,

        /// Expiry as epoch seconds (0 means deliver once or not at all)
        #[arg(long, default_value_t = 0)]
        expiry: u32,

        /// Extra top-level payload fields
        #[arg(long = "data", value_parser = parse_pair)]
        data: Vec<(String, String)>,
    },
    /// Send through Google Cloud Messaging
    Gcm {
        /// Registration id; repeat for several recipients
        #[arg(long = "token", required = true)]
        tokens: Vec<String>,

        #[arg(long = "data", value_parser = parse_pair)]
        data: Vec<(String, String)>,

        #[arg(long)]
        collapse_key: Option<String>,

        /// Have GCM validate the request without delivering it
        #[arg(long)]
        dry_run: bool,
    },
    /// Send through Amazon Device Messaging
    Adm {
        #[arg(long)]
        token: String,

        #[arg(long = "data", value_parser = parse_pair)]
        data: Vec<(String, String)>,

        #[arg(long)]
        consolidation_key: Option<String>,

        /// Seconds ADM keeps the message for an offline device
        #[arg(long)]
        expires_after: Option<u32>,
    },
    /// Send through Android Cloud to Device Messaging
    C2dm {
        #[arg(long)]
        token: String,

        #[arg(long = "data", value_parser = parse_pair)]
        data: Vec<(String, String)>,

        #[arg(long)]
        collapse_key: Option<String>,
    },
}

/// Parses a `key=value` argument.
fn parse_pair(arg: &str) -> Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{arg}'"))?;

    if key.is_empty() {
        return Err(format!("empty key in '{arg}'"));
    }

    Ok((key.to_string(), value.to_string()))
}

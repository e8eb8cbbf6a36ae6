//! The `herald` command: sends one notification through a configured
//! provider, or drains the APNs feedback service.

pub mod cli;
pub mod config;

use std::fmt::Write as _;

use herald_apns::{Aps, Notification, Overflow};
use herald_common::{Response, internal, logging, tracing};
use herald_http::{AdmMessage, C2dmMessage, GcmMessage};
use herald_tracing::traced;

pub use cli::{Cli, Command, SendCommand};
pub use config::Herald;

/// Runs one command against the configuration the CLI points at.
///
/// # Errors
///
/// Fails when the configuration cannot be loaded, the provider section is
/// missing, or no provider verdict could be obtained.
#[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "ms"))]
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = config::find_config_file(cli.config.as_deref())?;
    let herald = Herald::load(&path)?;

    logging::init();
    internal!(
        level = DEBUG,
        config = %path.display(),
        environment = %herald.environment,
        "Configuration loaded"
    );

    match cli.command {
        Command::Send { provider } => {
            let response = send(&herald, provider).await?;
            println!("{}", describe(&response));
        }
        Command::Feedback { capacity, block } => {
            let overflow = if block {
                Overflow::Block
            } else {
                Overflow::DropNewest
            };

            let mut stream = herald.feedback_listener()?.spawn(capacity, overflow);
            while let Some(record) = stream.recv().await {
                println!("{}\t{}", record.time().to_rfc3339(), record.device_token);
            }

            let summary = stream.finish().await?;
            println!(
                "received: {}, skipped: {}, dropped: {}, end: {:?}",
                summary.received, summary.skipped, summary.dropped, summary.end
            );
        }
    }

    Ok(())
}

/// Sends the notification a `send` subcommand describes.
pub async fn send(herald: &Herald, command: SendCommand) -> anyhow::Result<Response> {
    let response = match command {
        SendCommand::Apns {
            token,
            alert,
            badge,
            sound,
            expiry,
            data,
        } => {
            let mut aps = Aps::alert(alert);
            if let Some(badge) = badge {
                aps = aps.with_badge(badge);
            }
            if let Some(sound) = sound {
                aps = aps.with_sound(sound);
            }

            let mut notification = Notification::new(&token, &aps, expiry)?;
            for (key, value) in data {
                notification.set(&key, value)?;
            }

            herald.apns_client()?.send(&notification).await?
        }
        SendCommand::Gcm {
            tokens,
            data,
            collapse_key,
            dry_run,
        } => {
            let mut message = GcmMessage::new(tokens).with_dry_run(dry_run);
            message.collapse_key = collapse_key;
            for (key, value) in data {
                message.set_payload(key, value);
            }

            herald.gcm_client()?.send(&message).await?
        }
        SendCommand::Adm {
            token,
            data,
            consolidation_key,
            expires_after,
        } => {
            let mut message = AdmMessage::new(token);
            message.consolidation_key = consolidation_key;
            message.expires_after = expires_after;
            message.data.extend(data);

            herald.adm_client()?.send(&message).await?
        }
        SendCommand::C2dm {
            token,
            data,
            collapse_key,
        } => {
            let mut message = C2dmMessage::new(token);
            message.collapse_key = collapse_key;
            message.data.extend(data);

            herald.c2dm_client()?.send(&message).await?
        }
    };

    Ok(response)
}

/// One-line summary of a response for terminal output.
pub fn describe(response: &Response) -> String {
    let mut line = format!(
        "{} {}: {}",
        response.provider, response.status, response.outcome
    );
    if let Some(identifier) = &response.identifier {
        let _ = write!(line, " (id {identifier})");
    }
    for recipient in &response.recipients {
        let _ = write!(line, "\n  [{}] {}", recipient.index, recipient.outcome);
    }
    line
}

//! The `herald` configuration file.
//!
//! Every provider section is optional; a command for a provider without a
//! section fails with a message naming the missing section. Endpoints default
//! to the ones of the configured [`Environment`].

use std::path::{Path, PathBuf};

use anyhow::Context;
use herald_apns::{ApnsClient, ApnsConfig, FeedbackListener};
use herald_common::{
    Environment,
    config::{ApnsTimeouts, Credentials, HttpTimeouts},
};
use herald_http::{AdmClient, C2dmClient, GcmClient};
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "HERALD_CONFIG";

#[derive(Debug, Deserialize)]
pub struct ApnsSection {
    pub credentials: Credentials,
    /// Overrides the environment's gateway address.
    #[serde(default)]
    pub gateway: Option<String>,
    /// Overrides the environment's feedback address.
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub pool_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct GcmSection {
    pub api_key: String,
    #[serde(default)]
    pub url: Option<String>,
    /// HTTP proxy every GCM request goes through.
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdmSection {
    pub access_token: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct C2dmSection {
    pub auth_token: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Timeouts {
    #[serde(default)]
    pub apns: ApnsTimeouts,
    #[serde(default)]
    pub http: HttpTimeouts,
}

#[derive(Debug, Default, Deserialize)]
pub struct Herald {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub apns: Option<ApnsSection>,
    #[serde(default)]
    pub gcm: Option<GcmSection>,
    #[serde(default)]
    pub adm: Option<AdmSection>,
    #[serde(default)]
    pub c2dm: Option<C2dmSection>,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl Herald {
    /// Reads and parses the RON file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    fn apns_section(&self) -> anyhow::Result<&ApnsSection> {
        self.apns
            .as_ref()
            .context("No apns section in the configuration")
    }

    pub fn apns_config(&self) -> anyhow::Result<ApnsConfig> {
        let section = self.apns_section()?;

        let mut config = ApnsConfig::for_environment(self.environment, section.credentials.clone())
            .with_timeouts(self.timeouts.apns);
        if let Some(gateway) = &section.gateway {
            config.gateway.clone_from(gateway);
        }
        if let Some(feedback) = &section.feedback {
            config.feedback.clone_from(feedback);
        }
        if let Some(pool_size) = section.pool_size {
            config = config.with_pool_size(pool_size);
        }

        Ok(config)
    }

    pub fn apns_client(&self) -> anyhow::Result<ApnsClient> {
        Ok(ApnsClient::new(&self.apns_config()?)?)
    }

    pub fn feedback_listener(&self) -> anyhow::Result<FeedbackListener> {
        let config = self.apns_config()?;
        Ok(FeedbackListener::new(
            config.feedback,
            &config.credentials,
            &config.timeouts,
        )?)
    }

    pub fn gcm_client(&self) -> anyhow::Result<GcmClient> {
        let section = self
            .gcm
            .as_ref()
            .context("No gcm section in the configuration")?;
        let url = section
            .url
            .as_deref()
            .unwrap_or_else(|| self.environment.gcm_url());

        Ok(GcmClient::new(
            url,
            section.api_key.clone(),
            section.proxy.as_deref(),
            &self.timeouts.http,
        )?)
    }

    pub fn adm_client(&self) -> anyhow::Result<AdmClient> {
        let section = self
            .adm
            .as_ref()
            .context("No adm section in the configuration")?;
        let url = match &section.url {
            Some(url) => url.as_str(),
            None => self.environment.adm_url()?,
        };

        Ok(AdmClient::new(
            url,
            section.access_token.clone(),
            &self.timeouts.http,
        )?)
    }

    pub fn c2dm_client(&self) -> anyhow::Result<C2dmClient> {
        let section = self
            .c2dm
            .as_ref()
            .context("No c2dm section in the configuration")?;
        let url = section
            .url
            .as_deref()
            .unwrap_or_else(|| self.environment.c2dm_url());

        Ok(C2dmClient::new(
            url,
            section.auth_token.clone(),
            &self.timeouts.http,
        )?)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit`, from the command line
/// 2. `HERALD_CONFIG` environment variable
/// 3. ./herald.config.ron (current working directory)
/// 4. /etc/herald/herald.config.ron (system-wide config)
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    locate(
        explicit,
        std::env::var(CONFIG_ENV).ok().as_deref(),
        &[
            PathBuf::from("./herald.config.ron"),
            PathBuf::from("/etc/herald/herald.config.ron"),
        ],
    )
}

fn locate(
    explicit: Option<&Path>,
    env_path: Option<&str>,
    default_paths: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Config file does not exist: {}", path.display());
    }

    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

use std::time::Duration;

use sharemirror_core::Credential;
use thiserror::Error;

use crate::sync::SyncOptions;
use crate::sync::engine::{DEFAULT_TOKEN_TTL, DEFAULT_WORKERS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("destination needs {0}_KEY or {0}_TOKEN")]
    MissingCredential(&'static str),
}

#[derive(Clone, Debug)]
pub struct EndpointConfig {
    pub base_url: String,
    pub share: String,
    pub credential: Credential,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub source: EndpointConfig,
    pub destination: EndpointConfig,
    pub workers: usize,
    pub max_in_flight: usize,
    pub token_ttl: Duration,
    pub pause_on_exit: bool,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        // Read tokens can only be minted with an account key.
        let source = EndpointConfig {
            base_url: required("SHAREMIRROR_SOURCE_URL")?,
            share: required("SHAREMIRROR_SOURCE_SHARE")?,
            credential: Credential::AccountKey(required("SHAREMIRROR_SOURCE_KEY")?),
        };
        let destination_credential = match (
            required("SHAREMIRROR_DEST_KEY"),
            required("SHAREMIRROR_DEST_TOKEN"),
        ) {
            (Ok(key), _) => Credential::AccountKey(key),
            (Err(_), Ok(token)) => Credential::SharedToken(token),
            (Err(_), Err(_)) => return Err(ConfigError::MissingCredential("SHAREMIRROR_DEST")),
        };
        let destination = EndpointConfig {
            base_url: required("SHAREMIRROR_DEST_URL")?,
            share: required("SHAREMIRROR_DEST_SHARE")?,
            credential: destination_credential,
        };

        let workers = read_u64(&lookup, "SHAREMIRROR_WORKERS", DEFAULT_WORKERS as u64) as usize;
        let max_in_flight = read_u64(&lookup, "SHAREMIRROR_MAX_IN_FLIGHT", workers as u64) as usize;
        let token_ttl = Duration::from_secs(read_u64(
            &lookup,
            "SHAREMIRROR_TOKEN_TTL_SECS",
            DEFAULT_TOKEN_TTL.as_secs(),
        ));
        let pause_on_exit = read_bool(&lookup, "SHAREMIRROR_PAUSE_ON_EXIT", true);

        Ok(Self {
            source,
            destination,
            workers,
            max_in_flight,
            token_ttl,
            pause_on_exit,
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        let mut options = SyncOptions::with_workers(self.workers);
        options.max_in_flight = self.max_in_flight.max(1);
        options.token_ttl = self.token_ttl;
        options
    }
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|value| value.max(1))
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        })
        .unwrap_or(default)
}

//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration for local development.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use huddle_shared::constants::DEFAULT_PUSH_BUFFER;
use huddle_store::{database, SqliteBackend, StoreError};

/// What happens to the provisional entry when a send fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendFailurePolicy {
    /// Keep the entry, flagged as failed, so the user can retry it.
    #[default]
    MarkFailed,
    /// Remove the entry from the cache.
    Rollback,
}

impl FromStr for SendFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mark-failed" => Ok(Self::MarkFailed),
            "rollback" => Ok(Self::Rollback),
            other => Err(format!("unknown send failure policy: {other}")),
        }
    }
}

impl fmt::Display for SendFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MarkFailed => "mark-failed",
            Self::Rollback => "rollback",
        })
    }
}

/// Where new entries land in a conversation's cached list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderingPolicy {
    /// Keep the list sorted by creation time; equal timestamps keep arrival order.
    #[default]
    Chronological,
    /// Append in arrival order.
    Arrival,
}

impl FromStr for OrderingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "chronological" => Ok(Self::Chronological),
            "arrival" => Ok(Self::Arrival),
            other => Err(format!("unknown ordering policy: {other}")),
        }
    }
}

impl fmt::Display for OrderingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Chronological => "chronological",
            Self::Arrival => "arrival",
        })
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path of the local SQLite store.
    /// Env: `HUDDLE_DB_PATH`
    /// Default: platform data directory (`huddle.db`).
    pub database_path: Option<PathBuf>,

    /// Capacity of each push subscription channel.
    /// Env: `HUDDLE_PUSH_BUFFER`
    /// Default: `256`
    pub push_buffer: usize,

    /// Capacity of the UI event broadcast channel.
    /// Env: `HUDDLE_EVENT_BUFFER`
    /// Default: `64`
    pub event_buffer: usize,

    /// Env: `HUDDLE_SEND_FAILURE` (`mark-failed` | `rollback`)
    /// Default: `mark-failed`
    pub send_failure: SendFailurePolicy,

    /// Env: `HUDDLE_ORDERING` (`chronological` | `arrival`)
    /// Default: `chronological`
    pub ordering: OrderingPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            push_buffer: DEFAULT_PUSH_BUFFER,
            event_buffer: 64,
            send_failure: SendFailurePolicy::default(),
            ordering: OrderingPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("HUDDLE_DB_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("HUDDLE_PUSH_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.push_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid HUDDLE_PUSH_BUFFER, using default"),
            }
        }

        if let Some(val) = lookup("HUDDLE_EVENT_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.event_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid HUDDLE_EVENT_BUFFER, using default"),
            }
        }

        if let Some(val) = lookup("HUDDLE_SEND_FAILURE") {
            match val.parse() {
                Ok(policy) => config.send_failure = policy,
                Err(e) => tracing::warn!(error = %e, "Invalid HUDDLE_SEND_FAILURE, using default"),
            }
        }

        if let Some(val) = lookup("HUDDLE_ORDERING") {
            match val.parse() {
                Ok(policy) => config.ordering = policy,
                Err(e) => tracing::warn!(error = %e, "Invalid HUDDLE_ORDERING, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Open the SQLite store this configuration points at.
    pub fn open_backend(&self) -> Result<SqliteBackend, StoreError> {
        let path = match &self.database_path {
            Some(path) => path.clone(),
            None => database::default_path()?,
        };
        SqliteBackend::open_at(&path, self.push_buffer)
    }
}

//! # huddle-client
//!
//! Client-side chat state for Huddle: the conversation directory, the
//! per-conversation message cache, and the reconciler that merges optimistic
//! sends with pushed inserts.
//!
//! Everything hangs off one explicitly constructed [`ChatClient`]:
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use huddle_client::{ChatClient, ClientConfig};
//!
//! huddle_client::logging::init();
//! let config = ClientConfig::from_env();
//! let backend = Arc::new(config.open_backend()?);
//! let client = ChatClient::new(backend, config);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod logging;
pub mod reconciler;

mod commands;
mod state;

#[cfg(test)]
mod testing;

pub use cache::{CachedMessage, DeliveryState, EntryId, LocalId};
pub use client::ChatClient;
pub use config::{ClientConfig, OrderingPolicy, SendFailurePolicy};
pub use error::{ClientError, Result};
pub use events::ChatEvent;

//! # huddle-store
//!
//! The authoritative store seen by the Huddle chat client.
//!
//! [`ChatBackend`] is the async seam every client operation goes through:
//! directory queries, message history, inserts and push subscriptions.
//! [`SqliteBackend`] implements it on top of a local SQLite [`Database`]
//! and fans every insert out to the live subscriptions of its conversation.

pub mod backend;
pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod profiles;
pub mod sqlite_backend;

mod error;

pub use backend::{ChatBackend, Subscription, SubscriptionId};
pub use database::Database;
pub use error::{Result, StoreError};
pub use sqlite_backend::SqliteBackend;

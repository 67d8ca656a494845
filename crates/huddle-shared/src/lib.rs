//! # huddle-shared
//!
//! Domain types shared by the Huddle store and client crates: identifiers,
//! conversations, messages and user profiles.

pub mod constants;
pub mod error;
pub mod types;

pub use error::ModelError;
pub use types::*;

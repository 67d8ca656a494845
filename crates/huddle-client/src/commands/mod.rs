//! UI-facing operations of [`ChatClient`](crate::ChatClient).
//!
//! Each sub-module adds one `impl ChatClient` block, grouped by domain.

mod conversations;
mod messaging;
mod session;

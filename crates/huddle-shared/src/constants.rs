/// Shown for conversations whose stored name is empty.
pub const UNTITLED_CONVERSATION: &str = "Untitled Chat";

/// Number of members a private conversation must have.
pub const PRIVATE_MEMBER_COUNT: usize = 2;

/// Default capacity of a push subscription channel.
pub const DEFAULT_PUSH_BUFFER: usize = 256;

/// Maximum message body size in bytes (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

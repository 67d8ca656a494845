//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `profiles`, `conversations`,
//! `conversation_members` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID
    full_name  TEXT,
    avatar_url TEXT,
    role       TEXT NOT NULL DEFAULT 'user'   -- 'user' | 'admin'
);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    name       TEXT NOT NULL DEFAULT '',
    kind       TEXT NOT NULL,                 -- 'private' | 'group' | 'broadcast'
    created_at TEXT NOT NULL                  -- RFC-3339, UTC, microseconds
);

CREATE INDEX IF NOT EXISTS idx_conversations_kind ON conversations(kind);

CREATE TABLE IF NOT EXISTS conversation_members (
    conversation_id TEXT NOT NULL,            -- FK -> conversations(id)
    user_id         TEXT NOT NULL,
    joined_at       TEXT NOT NULL,

    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_members_user_id ON conversation_members(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4, assigned on insert
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    author_id       TEXT NOT NULL,
    body            TEXT NOT NULL,
    created_at      TEXT NOT NULL,              -- RFC-3339, UTC, microseconds

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

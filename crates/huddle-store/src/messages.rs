use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use huddle_shared::{AuthorInfo, ConversationId, Message, MessageId, UserId};

use crate::database::{format_ts, parse_ts, parse_uuid, Database};
use crate::error::{Result, StoreError};

const SELECT_MESSAGE: &str = "
    SELECT m.id, m.conversation_id, m.author_id, m.body, m.created_at,
           p.id, p.full_name, p.avatar_url
    FROM messages m
    LEFT JOIN profiles p ON p.id = m.author_id";

impl Database {
    /// Persist a message body; the id and timestamp are assigned here.
    pub fn insert_message(
        &self,
        conversation_id: &ConversationId,
        author_id: &UserId,
        body: &str,
    ) -> Result<Message> {
        // Membership of the conversation is enforced by the caller's access
        // rules, existence is enforced here.
        let exists: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![conversation_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        let message = Message {
            id: MessageId::new(),
            conversation_id: *conversation_id,
            author_id: *author_id,
            body: body.to_string(),
            created_at: Utc::now(),
            author: None,
        };

        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, author_id, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.author_id.to_string(),
                message.body,
                format_ts(&message.created_at),
            ],
        )?;
        Ok(message)
    }

    /// Full history of a conversation, oldest first, with author profiles
    /// joined in.
    pub fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let sql = format!(
            "{SELECT_MESSAGE}
             WHERE m.conversation_id = ?1
             ORDER BY m.created_at ASC, m.rowid ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![conversation_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let conversation_str: String = row.get(1)?;
    let author_str: String = row.get(2)?;
    let body: String = row.get(3)?;
    let ts_str: String = row.get(4)?;
    let profile_id: Option<String> = row.get(5)?;
    let full_name: Option<String> = row.get(6)?;
    let avatar_url: Option<String> = row.get(7)?;

    Ok(Message {
        id: MessageId(parse_uuid(0, &id_str)?),
        conversation_id: ConversationId(parse_uuid(1, &conversation_str)?),
        author_id: UserId(parse_uuid(2, &author_str)?),
        body,
        created_at: parse_ts(4, &ts_str)?,
        author: profile_id.map(|_| AuthorInfo {
            name: full_name,
            avatar_url,
        }),
    })
}

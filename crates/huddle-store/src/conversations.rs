//! CRUD operations for [`Conversation`] records and their memberships.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{params, params_from_iter};

use huddle_shared::{Conversation, ConversationId, ConversationKind, NewConversation, UserId};

use crate::database::{conversion_err, format_ts, parse_ts, parse_uuid, Database};
use crate::error::Result;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new conversation together with its member rows.
    pub fn create_conversation(&mut self, new: &NewConversation) -> Result<Conversation> {
        new.validate()?;

        let conversation = Conversation {
            id: ConversationId::new(),
            name: new.name.clone(),
            kind: new.kind,
            members: new.members.clone(),
            created_at: Utc::now(),
        };
        let created = format_ts(&conversation.created_at);

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO conversations (id, name, kind, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.id.to_string(),
                conversation.name,
                conversation.kind.as_str(),
                created,
            ],
        )?;
        for member in &conversation.members {
            tx.execute(
                "INSERT INTO conversation_members (conversation_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![conversation.id.to_string(), member.to_string(), created],
            )?;
        }
        tx.commit()?;

        Ok(conversation)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Ids of the conversations the user is an explicit member of, oldest
    /// membership first.
    pub fn list_memberships(&self, user: &UserId) -> Result<Vec<ConversationId>> {
        let mut stmt = self.conn().prepare(
            "SELECT conversation_id
             FROM conversation_members
             WHERE user_id = ?1
             ORDER BY joined_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![user.to_string()], |row| {
            let id_str: String = row.get(0)?;
            parse_uuid(0, &id_str).map(ConversationId)
        })?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// All conversations of one kind, ordered by creation date ascending.
    pub fn list_conversations_by_kind(&self, kind: ConversationKind) -> Result<Vec<Conversation>> {
        let ids = {
            let mut stmt = self.conn().prepare(
                "SELECT id FROM conversations
                 WHERE kind = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![kind.as_str()], |row| {
                let id_str: String = row.get(0)?;
                parse_uuid(0, &id_str).map(ConversationId)
            })?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };

        self.get_conversations_by_ids(&ids)
    }

    /// Fetch the conversations whose ids are given, in the order given.
    /// Unknown ids are skipped.
    pub fn get_conversations_by_ids(&self, ids: &[ConversationId]) -> Result<Vec<Conversation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, name, kind, created_at FROM conversations WHERE id IN ({placeholders})"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter().map(|id| id.to_string())), |row| {
            row_to_conversation(row)
        })?;

        let mut found = Vec::new();
        for row in rows {
            let mut conversation = row?;
            conversation.members = self.list_members(&conversation.id)?;
            found.push(conversation);
        }

        // SQL `IN` does not preserve the requested order.
        let mut ordered = Vec::with_capacity(found.len());
        for id in ids {
            if let Some(pos) = found.iter().position(|c| c.id == *id) {
                ordered.push(found.swap_remove(pos));
            }
        }
        Ok(ordered)
    }

    pub fn list_members(&self, id: &ConversationId) -> Result<BTreeSet<UserId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM conversation_members WHERE conversation_id = ?1")?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            parse_uuid(0, &id_str).map(UserId)
        })?;

        let mut members = BTreeSet::new();
        for row in rows {
            members.insert(row?);
        }
        Ok(members)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Conversation`] without members.
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;

    let kind = kind_str
        .parse::<ConversationKind>()
        .map_err(|e| conversion_err(2, e))?;

    Ok(Conversation {
        id: ConversationId(parse_uuid(0, &id_str)?),
        name,
        kind,
        members: BTreeSet::new(),
        created_at: parse_ts(3, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_create_and_get() {
        let mut db = Database::open_in_memory().unwrap();
        let (a, b) = (UserId::new(), UserId::new());

        let created = db
            .create_conversation(&NewConversation::private(a, b).unwrap())
            .unwrap();
        let fetched = db.get_conversations_by_ids(&[created.id]).unwrap();

        assert_eq!(fetched, vec![created.clone()]);
        assert_eq!(fetched[0].members, created.members);
        assert_eq!(created.members.len(), 2);
    }

    #[test]
    fn test_private_needs_two_members() {
        let mut db = Database::open_in_memory().unwrap();
        let bad = NewConversation {
            name: String::new(),
            kind: ConversationKind::Private,
            members: [UserId::new()].into_iter().collect(),
        };

        assert!(matches!(
            db.create_conversation(&bad),
            Err(StoreError::InvalidConversation(_))
        ));
    }

    #[test]
    fn test_memberships_and_kinds() {
        let mut db = Database::open_in_memory().unwrap();
        let me = UserId::new();

        let group = db
            .create_conversation(&NewConversation::group("team", [me, UserId::new()]))
            .unwrap();
        let news = db
            .create_conversation(&NewConversation::broadcast("news", UserId::new()))
            .unwrap();

        assert_eq!(db.list_memberships(&me).unwrap(), vec![group.id]);

        let broadcasts = db.list_conversations_by_kind(ConversationKind::Broadcast).unwrap();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].id, news.id);
    }

    #[test]
    fn test_get_by_ids_keeps_request_order() {
        let mut db = Database::open_in_memory().unwrap();
        let me = UserId::new();
        let first = db.create_conversation(&NewConversation::group("a", [me])).unwrap();
        let second = db.create_conversation(&NewConversation::group("b", [me])).unwrap();

        let got = db
            .get_conversations_by_ids(&[second.id, ConversationId::new(), first.id])
            .unwrap();
        let ids: Vec<_> = got.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}

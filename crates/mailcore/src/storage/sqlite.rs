//! SQLite-backed mailbox storage
//!
//! Metadata lives in queryable tables; full message bodies are stored as
//! zstd-compressed BLOBs inline. Timestamps are stored as integer
//! milliseconds so cursor comparisons never depend on string formatting.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use super::traits::{MailboxStore, PageCursor};
use crate::models::{
    is_system_label, ConversationDraft, EmailAddress, Label, LabelId, LocalConversation,
    LocalConversationId, LocalLabelId, LocalMessage, LocalMessageId, MessageDraft,
};
use crate::pending::{ActionKind, DeadLetter, PendingAction};

/// Database migrations
///
/// Each migration is applied in order; the user_version pragma tracks which
/// have run.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        -- Local/remote label mapping
        CREATE TABLE labels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            is_system INTEGER NOT NULL DEFAULT 0
        );

        -- Conversation snapshots
        CREATE TABLE conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL,
            snippet TEXT NOT NULL,
            sender_name TEXT,
            sender_email TEXT NOT NULL,
            last_activity_at INTEGER NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            is_read INTEGER NOT NULL DEFAULT 0,
            is_starred INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX idx_conversations_activity
            ON conversations(last_activity_at DESC, id DESC);

        -- Label membership (many-to-many)
        CREATE TABLE conversation_labels (
            conversation_id INTEGER NOT NULL,
            label_id INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, label_id),
            FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
            FOREIGN KEY (label_id) REFERENCES labels(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_conversation_labels_label ON conversation_labels(label_id);

        -- Messages with zstd-compressed bodies
        CREATE TABLE messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL,
            from_name TEXT,
            from_email TEXT NOT NULL,
            subject TEXT NOT NULL,
            body_preview TEXT NOT NULL,
            body_text BLOB,  -- zstd compressed
            received_at INTEGER NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            is_starred INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_messages_conversation
            ON messages(conversation_id, received_at ASC);

        CREATE TABLE message_labels (
            message_id INTEGER NOT NULL,
            label_id INTEGER NOT NULL,
            PRIMARY KEY (message_id, label_id),
            FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
            FOREIGN KEY (label_id) REFERENCES labels(id) ON DELETE CASCADE
        );

        -- Pending-action queue (payloads serialized as JSON)
        CREATE TABLE pending_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            conversation_ids TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            retry_at INTEGER
        );

        -- Actions that exhausted their retry budget
        CREATE TABLE dead_letters (
            id INTEGER PRIMARY KEY,
            kind TEXT NOT NULL,
            conversation_ids TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            attempts INTEGER NOT NULL,
            last_error TEXT,
            failed_at INTEGER NOT NULL
        );
        "#,
    )])
}

/// zstd level for message bodies; 3 is the speed/ratio sweet spot here
const BODY_COMPRESSION_LEVEL: i32 = 3;

/// SQLite-based mailbox storage
pub struct SqliteMailboxStore {
    conn: Mutex<Connection>,
}

impl SqliteMailboxStore {
    /// Open (or create) a store at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL for concurrent readers during writes; NORMAL sync is safe with
        // WAL; foreign_keys needed for ON DELETE CASCADE.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_conversation_labels(
        conn: &Connection,
        conversation_id: i64,
    ) -> Result<Vec<LocalLabelId>> {
        let mut stmt = conn.prepare(
            "SELECT label_id FROM conversation_labels WHERE conversation_id = ? ORDER BY label_id",
        )?;
        let labels = stmt
            .query_map([conversation_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels.into_iter().map(LocalLabelId::new).collect())
    }

    fn load_message_labels(conn: &Connection, message_id: i64) -> Result<Vec<LocalLabelId>> {
        let mut stmt = conn
            .prepare("SELECT label_id FROM message_labels WHERE message_id = ? ORDER BY label_id")?;
        let labels = stmt
            .query_map([message_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels.into_iter().map(LocalLabelId::new).collect())
    }

    /// Row shape shared by all conversation queries
    const CONVERSATION_COLUMNS: &'static str =
        "id, subject, snippet, sender_name, sender_email, last_activity_at, \
         message_count, is_read, is_starred";

    fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocalConversation> {
        let sender_name: Option<String> = row.get(3)?;
        let sender_email: String = row.get(4)?;
        let sender = match sender_name {
            Some(name) => EmailAddress::with_name(name, sender_email),
            None => EmailAddress::new(sender_email),
        };
        Ok(LocalConversation {
            id: LocalConversationId::new(row.get(0)?),
            subject: row.get(1)?,
            snippet: row.get(2)?,
            sender,
            last_activity_at: millis_to_datetime(row.get(5)?),
            message_count: row.get::<_, i64>(6)? as usize,
            is_read: row.get(7)?,
            is_starred: row.get(8)?,
            labels: Vec::new(), // filled in by the caller
        })
    }

    fn get_conversation_inner(
        conn: &Connection,
        id: LocalConversationId,
    ) -> Result<Option<LocalConversation>> {
        let sql = format!(
            "SELECT {} FROM conversations WHERE id = ?",
            Self::CONVERSATION_COLUMNS
        );
        let conversation = conn
            .query_row(&sql, [id.raw()], Self::conversation_from_row)
            .optional()?;

        match conversation {
            Some(mut c) => {
                c.labels = Self::load_conversation_labels(conn, c.id.raw())?;
                Ok(Some(c))
            }
            None => Ok(None),
        }
    }

    fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(LocalMessage, Option<Vec<u8>>)> {
        let from_name: Option<String> = row.get(2)?;
        let from_email: String = row.get(3)?;
        let from = match from_name {
            Some(name) => EmailAddress::with_name(name, from_email),
            None => EmailAddress::new(from_email),
        };
        let body_blob: Option<Vec<u8>> = row.get(6)?;
        Ok((
            LocalMessage {
                id: LocalMessageId::new(row.get(0)?),
                conversation_id: LocalConversationId::new(row.get(1)?),
                from,
                subject: row.get(4)?,
                body_preview: row.get(5)?,
                body_text: None, // decompressed by the caller
                received_at: millis_to_datetime(row.get(7)?),
                is_read: row.get(8)?,
                is_starred: row.get(9)?,
                labels: Vec::new(),
            },
            body_blob,
        ))
    }

    const MESSAGE_COLUMNS: &'static str =
        "id, conversation_id, from_name, from_email, subject, body_preview, \
         body_text, received_at, is_read, is_starred";

    fn finish_message(
        conn: &Connection,
        mut message: LocalMessage,
        body_blob: Option<Vec<u8>>,
    ) -> Result<LocalMessage> {
        message.body_text = body_blob.map(decompress_body).transpose()?;
        message.labels = Self::load_message_labels(conn, message.id.raw())?;
        Ok(message)
    }

    fn pending_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(PendingAction, String, String)> {
        let kind_json: String = row.get(1)?;
        let ids_json: String = row.get(2)?;
        Ok((
            PendingAction {
                id: row.get(0)?,
                kind: ActionKind::MarkRead, // placeholder, parsed by the caller
                conversation_ids: Vec::new(),
                created_at: millis_to_datetime(row.get(3)?),
                attempts: row.get::<_, i64>(4)? as u32,
                last_error: row.get(5)?,
            },
            kind_json,
            ids_json,
        ))
    }

    fn parse_pending(raw: (PendingAction, String, String)) -> Result<PendingAction> {
        let (mut action, kind_json, ids_json) = raw;
        action.kind =
            serde_json::from_str(&kind_json).context("Failed to parse pending action kind")?;
        action.conversation_ids =
            serde_json::from_str(&ids_json).context("Failed to parse pending action ids")?;
        Ok(action)
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}

fn compress_body(body: &str) -> Result<Vec<u8>> {
    zstd::encode_all(body.as_bytes(), BODY_COMPRESSION_LEVEL)
        .context("Failed to compress message body")
}

fn decompress_body(blob: Vec<u8>) -> Result<String> {
    let bytes = zstd::decode_all(&blob[..]).context("Failed to decompress message body")?;
    String::from_utf8(bytes).context("Message body is not valid UTF-8")
}

impl MailboxStore for SqliteMailboxStore {
    fn insert_conversation(&self, draft: ConversationDraft) -> Result<LocalConversation> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO conversations
                 (subject, snippet, sender_name, sender_email, last_activity_at,
                  message_count, is_read, is_starred)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
            params![
                draft.subject,
                draft.snippet,
                draft.sender.name,
                draft.sender.email,
                draft.last_activity_at.timestamp_millis(),
                draft.is_read,
                draft.is_starred,
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO conversation_labels (conversation_id, label_id) VALUES (?, ?)",
            )?;
            for label in &draft.labels {
                stmt.execute(params![id, label.raw()])?;
            }
        }
        tx.commit()?;

        Ok(LocalConversation {
            id: LocalConversationId::new(id),
            subject: draft.subject,
            snippet: draft.snippet,
            sender: draft.sender,
            last_activity_at: draft.last_activity_at,
            message_count: 0,
            is_read: draft.is_read,
            is_starred: draft.is_starred,
            labels: draft.labels,
        })
    }

    fn get_conversation(&self, id: LocalConversationId) -> Result<Option<LocalConversation>> {
        let conn = self.conn.lock().unwrap();
        Self::get_conversation_inner(&conn, id)
    }

    fn get_conversations(&self, ids: &[LocalConversationId]) -> Result<Vec<LocalConversation>> {
        let conn = self.conn.lock().unwrap();
        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(c) = Self::get_conversation_inner(&conn, *id)? {
                result.push(c);
            }
        }
        Ok(result)
    }

    fn list_conversations(
        &self,
        label: LocalLabelId,
        limit: usize,
        after: Option<&PageCursor>,
    ) -> Result<Vec<LocalConversation>> {
        let conn = self.conn.lock().unwrap();

        let (cursor_millis, cursor_id) = match after {
            Some(c) => (c.last_activity_at_millis, c.id.raw()),
            None => (i64::MAX, i64::MAX),
        };
        let limit = limit.min(i64::MAX as usize) as i64;

        let sql = format!(
            "SELECT {} FROM conversations c
             JOIN conversation_labels cl ON cl.conversation_id = c.id
             WHERE cl.label_id = ?1
               AND (c.last_activity_at < ?2
                    OR (c.last_activity_at = ?2 AND c.id < ?3))
             ORDER BY c.last_activity_at DESC, c.id DESC
             LIMIT ?4",
            "c.id, c.subject, c.snippet, c.sender_name, c.sender_email, \
             c.last_activity_at, c.message_count, c.is_read, c.is_starred"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![label.raw(), cursor_millis, cursor_id, limit],
                Self::conversation_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(rows.len());
        for mut c in rows {
            c.labels = Self::load_conversation_labels(&conn, c.id.raw())?;
            result.push(c);
        }
        Ok(result)
    }

    fn count_conversations(&self, label: LocalLabelId) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversation_labels WHERE label_id = ?",
            [label.raw()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert_message(&self, draft: MessageDraft) -> Result<LocalMessage> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let body_blob = draft.body_text.as_deref().map(compress_body).transpose()?;
        let received_millis = draft.received_at.timestamp_millis();

        tx.execute(
            "INSERT INTO messages
                 (conversation_id, from_name, from_email, subject, body_preview,
                  body_text, received_at, is_read, is_starred)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                draft.conversation_id.raw(),
                draft.from.name,
                draft.from.email,
                draft.subject,
                draft.body_preview,
                body_blob,
                received_millis,
                draft.is_read,
                draft.is_starred,
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO message_labels (message_id, label_id) VALUES (?, ?)",
            )?;
            for label in &draft.labels {
                stmt.execute(params![id, label.raw()])?;
            }
        }

        // Keep the conversation summary consistent with its messages
        tx.execute(
            "UPDATE conversations SET message_count = message_count + 1 WHERE id = ?",
            [draft.conversation_id.raw()],
        )?;
        tx.execute(
            "UPDATE conversations SET last_activity_at = ?1, snippet = ?2
             WHERE id = ?3 AND last_activity_at < ?1",
            params![received_millis, draft.body_preview, draft.conversation_id.raw()],
        )?;
        if !draft.is_read {
            tx.execute(
                "UPDATE conversations SET is_read = 0 WHERE id = ?",
                [draft.conversation_id.raw()],
            )?;
        }
        if draft.is_starred {
            tx.execute(
                "UPDATE conversations SET is_starred = 1 WHERE id = ?",
                [draft.conversation_id.raw()],
            )?;
        }
        tx.commit()?;

        Ok(LocalMessage {
            id: LocalMessageId::new(id),
            conversation_id: draft.conversation_id,
            from: draft.from,
            subject: draft.subject,
            body_preview: draft.body_preview,
            body_text: draft.body_text,
            received_at: draft.received_at,
            is_read: draft.is_read,
            is_starred: draft.is_starred,
            labels: draft.labels,
        })
    }

    fn get_message(&self, id: LocalMessageId) -> Result<Option<LocalMessage>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM messages WHERE id = ?",
            Self::MESSAGE_COLUMNS
        );
        let row = conn
            .query_row(&sql, [id.raw()], Self::message_from_row)
            .optional()?;

        match row {
            Some((message, blob)) => Ok(Some(Self::finish_message(&conn, message, blob)?)),
            None => Ok(None),
        }
    }

    fn list_messages(&self, conversation: LocalConversationId) -> Result<Vec<LocalMessage>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM messages WHERE conversation_id = ? ORDER BY received_at ASC, id ASC",
            Self::MESSAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([conversation.raw()], Self::message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(rows.len());
        for (message, blob) in rows {
            result.push(Self::finish_message(&conn, message, blob)?);
        }
        Ok(result)
    }

    fn set_read(&self, ids: &[LocalConversationId], read: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for id in ids {
            tx.execute(
                "UPDATE conversations SET is_read = ? WHERE id = ?",
                params![read, id.raw()],
            )?;
            tx.execute(
                "UPDATE messages SET is_read = ? WHERE conversation_id = ?",
                params![read, id.raw()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn set_starred(&self, ids: &[LocalConversationId], starred: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for id in ids {
            tx.execute(
                "UPDATE conversations SET is_starred = ? WHERE id = ?",
                params![starred, id.raw()],
            )?;
            tx.execute(
                "UPDATE messages SET is_starred = ? WHERE conversation_id = ?",
                params![starred, id.raw()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_conversations(&self, ids: &[LocalConversationId]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for id in ids {
            // Messages and label links cascade
            tx.execute("DELETE FROM conversations WHERE id = ?", [id.raw()])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn add_label(&self, ids: &[LocalConversationId], label: LocalLabelId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for id in ids {
            tx.execute(
                "INSERT OR IGNORE INTO conversation_labels (conversation_id, label_id) VALUES (?, ?)",
                params![id.raw(), label.raw()],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO message_labels (message_id, label_id)
                 SELECT id, ? FROM messages WHERE conversation_id = ?",
                params![label.raw(), id.raw()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_label(&self, ids: &[LocalConversationId], label: LocalLabelId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for id in ids {
            tx.execute(
                "DELETE FROM conversation_labels WHERE conversation_id = ? AND label_id = ?",
                params![id.raw(), label.raw()],
            )?;
            tx.execute(
                "DELETE FROM message_labels WHERE label_id = ?
                 AND message_id IN (SELECT id FROM messages WHERE conversation_id = ?)",
                params![label.raw(), id.raw()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn move_conversations(
        &self,
        ids: &[LocalConversationId],
        from: LocalLabelId,
        to: LocalLabelId,
    ) -> Result<()> {
        self.remove_label(ids, from)?;
        self.add_label(ids, to)
    }

    fn resolve_label(&self, remote: &LabelId) -> Result<LocalLabelId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO labels (remote_id, name, is_system) VALUES (?, ?, ?)",
            params![
                remote.as_str(),
                remote.as_str(),
                is_system_label(remote.as_str())
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM labels WHERE remote_id = ?",
            [remote.as_str()],
            |row| row.get(0),
        )?;
        Ok(LocalLabelId::new(id))
    }

    fn find_label(&self, remote: &LabelId) -> Result<Option<LocalLabelId>> {
        let conn = self.conn.lock().unwrap();
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM labels WHERE remote_id = ?",
                [remote.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(LocalLabelId::new))
    }

    fn remote_label(&self, local: LocalLabelId) -> Result<Option<LabelId>> {
        let conn = self.conn.lock().unwrap();
        let remote: Option<String> = conn
            .query_row(
                "SELECT remote_id FROM labels WHERE id = ?",
                [local.raw()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(remote.map(LabelId::new))
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, remote_id, name, is_system FROM labels ORDER BY id")?;
        let labels = stmt
            .query_map([], |row| {
                Ok(Label {
                    id: LocalLabelId::new(row.get(0)?),
                    remote_id: LabelId::new(row.get::<_, String>(1)?),
                    name: row.get(2)?,
                    is_system: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    fn enqueue_action(
        &self,
        kind: ActionKind,
        ids: &[LocalConversationId],
    ) -> Result<PendingAction> {
        let conn = self.conn.lock().unwrap();
        let created_at = Utc::now();
        let kind_json = serde_json::to_string(&kind)?;
        let ids_json = serde_json::to_string(ids)?;

        conn.execute(
            "INSERT INTO pending_actions (kind, conversation_ids, created_at) VALUES (?, ?, ?)",
            params![kind_json, ids_json, created_at.timestamp_millis()],
        )?;

        Ok(PendingAction {
            id: conn.last_insert_rowid(),
            kind,
            conversation_ids: ids.to_vec(),
            created_at,
            attempts: 0,
            last_error: None,
        })
    }

    fn next_actions(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PendingAction>> {
        let conn = self.conn.lock().unwrap();
        let limit = limit.min(i64::MAX as usize) as i64;
        let mut stmt = conn.prepare(
            "SELECT id, kind, conversation_ids, created_at, attempts, last_error
             FROM pending_actions
             WHERE retry_at IS NULL OR retry_at <= ?
             ORDER BY id ASC
             LIMIT ?",
        )?;
        let rows = stmt
            .query_map(params![now.timestamp_millis(), limit], Self::pending_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::parse_pending).collect()
    }

    fn complete_action(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM pending_actions WHERE id = ?", [id])?;
        Ok(())
    }

    fn fail_action(&self, id: i64, error: &str, retry_at: DateTime<Utc>) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE pending_actions
             SET attempts = attempts + 1, last_error = ?, retry_at = ?
             WHERE id = ?",
            params![error, retry_at.timestamp_millis(), id],
        )?;
        let attempts: Option<i64> = conn
            .query_row(
                "SELECT attempts FROM pending_actions WHERE id = ?",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(attempts.unwrap_or(0) as u32)
    }

    fn dead_letter_action(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO dead_letters
                 (id, kind, conversation_ids, created_at, attempts, last_error, failed_at)
             SELECT id, kind, conversation_ids, created_at, attempts, last_error, ?
             FROM pending_actions WHERE id = ?",
            params![Utc::now().timestamp_millis(), id],
        )?;
        tx.execute("DELETE FROM pending_actions WHERE id = ?", [id])?;
        tx.commit()?;
        Ok(())
    }

    fn count_pending_actions(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM pending_actions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, kind, conversation_ids, created_at, attempts, last_error, failed_at
             FROM dead_letters ORDER BY failed_at ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let kind_json: String = row.get(1)?;
                let ids_json: String = row.get(2)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    kind_json,
                    ids_json,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, kind_json, ids_json, created, attempts, last_error, failed)| {
                Ok(DeadLetter {
                    id,
                    kind: serde_json::from_str(&kind_json)
                        .context("Failed to parse dead letter kind")?,
                    conversation_ids: serde_json::from_str(&ids_json)
                        .context("Failed to parse dead letter ids")?,
                    created_at: millis_to_datetime(created),
                    attempts: attempts as u32,
                    last_error,
                    failed_at: millis_to_datetime(failed),
                })
            })
            .collect()
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "DELETE FROM message_labels;
             DELETE FROM messages;
             DELETE FROM conversation_labels;
             DELETE FROM conversations;
             DELETE FROM labels;
             DELETE FROM pending_actions;
             DELETE FROM dead_letters;",
        )?;
        Ok(())
    }
}

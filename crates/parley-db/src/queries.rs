use crate::{Database, WriteGate};
use crate::models::{MessageRow, ReactionRow};
use crate::store::StatusUpdate;
use anyhow::{Result, anyhow};
use parley_types::MessageStatus;
use rusqlite::{Connection, OptionalExtension, Row};

/// Keep IN (...) lists well under SQLite's bound-parameter limit.
const REACTION_BATCH: usize = 500;

const MESSAGE_COLUMNS: &str =
    "id, chat_id, participant_a, participant_b, sender_id, content, status, reply_to, created_at";

impl Database {
    // -- Messages --

    /// Insert a message. `row.created_at` is a proposal: it is raised to the
    /// newest timestamp already stored for the chat so per-chat order never
    /// goes backwards. Returns the timestamp actually stored.
    pub fn insert_message(&self, gate: &WriteGate, row: &MessageRow) -> Result<i64> {
        self.write(gate, |tx| {
            let latest: Option<i64> = tx.query_row(
                "SELECT MAX(created_at) FROM messages WHERE chat_id = ?1",
                [&row.chat_id],
                |r| r.get(0),
            )?;
            let created_at = latest.map_or(row.created_at, |l| l.max(row.created_at));

            tx.execute(
                "INSERT INTO messages (id, chat_id, participant_a, participant_b, sender_id, content, status, reply_to, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    row.id,
                    row.chat_id,
                    row.participant_a,
                    row.participant_b,
                    row.sender_id,
                    row.content,
                    row.status,
                    row.reply_to,
                    created_at,
                ],
            )?;
            Ok(created_at)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                    [id],
                    message_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Unconditional status write. Returns false if the message does not exist.
    pub fn set_message_status(
        &self,
        gate: &WriteGate,
        id: &str,
        status: MessageStatus,
    ) -> Result<bool> {
        self.write(gate, |conn| {
            let changed = conn.execute(
                "UPDATE messages SET status = ?2 WHERE id = ?1",
                (id, status.as_str()),
            )?;
            Ok(changed > 0)
        })
    }

    /// Forward-only status write. Returns None if the message does not exist.
    pub fn advance_message_status(
        &self,
        gate: &WriteGate,
        id: &str,
        status: MessageStatus,
    ) -> Result<Option<StatusUpdate>> {
        self.write(gate, |conn| {
            let current: Option<String> = conn
                .query_row("SELECT status FROM messages WHERE id = ?1", [id], |r| r.get(0))
                .optional()?;

            let Some(current) = current else {
                return Ok(None);
            };
            let current: MessageStatus = current
                .parse()
                .map_err(|e: String| anyhow!("message {}: {}", id, e))?;

            if !current.can_advance_to(status) {
                return Ok(Some(StatusUpdate::Rejected { current }));
            }

            conn.execute(
                "UPDATE messages SET status = ?2 WHERE id = ?1",
                (id, status.as_str()),
            )?;
            Ok(Some(StatusUpdate::Applied))
        })
    }

    pub fn get_messages_by_chat(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE chat_id = ?1
                     ORDER BY created_at ASC, rowid ASC"
                ),
                chat_id,
            )
        })
    }

    pub fn get_messages_by_participant(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE participant_a = ?1 OR participant_b = ?1
                     ORDER BY created_at ASC, rowid ASC"
                ),
                user_id,
            )
        })
    }

    // -- Reactions --

    /// Append a reaction unless the same (user, emoji) pair is already on the
    /// message. Returns None if the message does not exist, Some(added)
    /// otherwise.
    pub fn insert_reaction(
        &self,
        gate: &WriteGate,
        message_id: &str,
        user_id: &str,
        emoji: &str,
        created_at: i64,
    ) -> Result<Option<bool>> {
        self.write(gate, |conn| {
            let exists = conn
                .query_row("SELECT 1 FROM messages WHERE id = ?1", [message_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(None);
            }

            // UNIQUE(message_id, user_id, emoji) does the duplicate check
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO reactions (message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![message_id, user_id, emoji, created_at],
            )?;
            Ok(Some(inserted > 0))
        })
    }

    /// Batch-fetch reactions for a set of message IDs, in insertion order.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let mut out = Vec::new();

            for batch in message_ids.chunks(REACTION_BATCH) {
                let placeholders: Vec<String> =
                    (1..=batch.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "SELECT id, message_id, user_id, emoji, created_at FROM reactions
                     WHERE message_id IN ({})
                     ORDER BY id ASC",
                    placeholders.join(", ")
                );

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(batch.iter()), |row| {
                        Ok(ReactionRow {
                            id: row.get(0)?,
                            message_id: row.get(1)?,
                            user_id: row.get(2)?,
                            emoji: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                out.extend(rows);
            }

            Ok(out)
        })
    }
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        participant_a: row.get(2)?,
        participant_b: row.get(3)?,
        sender_id: row.get(4)?,
        content: row.get(5)?,
        status: row.get(6)?,
        reply_to: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn query_messages(conn: &Connection, sql: &str, key: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([key], message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (messages, reactions)");
        conn.execute_batch(
            "
            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                chat_id         TEXT NOT NULL,
                participant_a   TEXT NOT NULL,
                participant_b   TEXT NOT NULL,
                sender_id       TEXT NOT NULL,
                content         TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'sent'
                                CHECK (status IN ('sent', 'delivered', 'read')),
                reply_to        TEXT,
                created_at      INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_chat
                ON messages(chat_id, created_at);
            CREATE INDEX idx_messages_participant_a
                ON messages(participant_a, created_at);
            CREATE INDEX idx_messages_participant_b
                ON messages(participant_b, created_at);

            CREATE TABLE reactions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id  TEXT NOT NULL REFERENCES messages(id),
                user_id     TEXT NOT NULL,
                emoji       TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                UNIQUE(message_id, user_id, emoji)
            );

            CREATE INDEX idx_reactions_message
                ON reactions(message_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

//! SQL migration definitions for the MeetNews database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: meetings",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Meeting records and their news enrichment
CREATE TABLE IF NOT EXISTS meetings (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id          INTEGER NOT NULL,
    title            TEXT NOT NULL,
    created_dt       TEXT NOT NULL,
    original_meeting TEXT NOT NULL,
    summary_meeting  TEXT,
    keywords         TEXT,
    news_items       TEXT
);

CREATE INDEX IF NOT EXISTS idx_meetings_user ON meetings(user_id, created_dt);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Record how stored news items were selected",
            sql: r#"
ALTER TABLE meetings ADD COLUMN news_ranking TEXT;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
        Migration {
            version: 3,
            description: "Track when a record was handed to a worker",
            sql: r#"
ALTER TABLE meetings ADD COLUMN news_queued_at TEXT;

INSERT INTO schema_migrations (version) VALUES (3);
"#,
        },
    ]
}

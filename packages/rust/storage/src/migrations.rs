//! SQL migration definitions for the progress and corpus databases.
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
            description: "Initial schema: index mirror, checkpoint, transcripts, corpus tables",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Local mirror of the remote document index
CREATE TABLE IF NOT EXISTS index_entry (
    location         TEXT PRIMARY KEY,
    source_partition TEXT NOT NULL,
    last_modified    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_index_entry_partition ON index_entry(source_partition);

-- Process-wide key/value state (crawl checkpoint)
CREATE TABLE IF NOT EXISTS process_data (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Per-transcript retrieval state
CREATE TABLE IF NOT EXISTS transcript (
    location       TEXT PRIMARY KEY,
    last_modified  TEXT,
    retrieved_at   TEXT NOT NULL,
    reference_page TEXT,
    pdf_link       TEXT,
    markup_link    TEXT,
    markup_dialect TEXT,
    raw_markup     TEXT
);

CREATE INDEX IF NOT EXISTS idx_transcript_last_modified ON transcript(last_modified);

-- Normalized corpus
CREATE TABLE IF NOT EXISTS session (
    session_id INTEGER PRIMARY KEY,
    location   TEXT NOT NULL UNIQUE,
    pdf_link   TEXT,
    date       TEXT,
    chamber    TEXT
);

CREATE TABLE IF NOT EXISTS debate (
    debate_id  INTEGER PRIMARY KEY,
    session_id INTEGER NOT NULL REFERENCES session(session_id),
    debate_no  INTEGER NOT NULL,
    title      TEXT NOT NULL,
    UNIQUE(session_id, debate_no)
);

CREATE TABLE IF NOT EXISTS paragraph (
    para_id         INTEGER PRIMARY KEY,
    session_id      INTEGER NOT NULL REFERENCES session(session_id),
    sequence_number INTEGER NOT NULL,
    speaker_id      TEXT,
    debate_id       INTEGER NOT NULL REFERENCES debate(debate_id),
    fragment_number INTEGER NOT NULL,
    fragment_type   TEXT,
    paragraph_text  TEXT NOT NULL,
    UNIQUE(session_id, sequence_number)
);

CREATE INDEX IF NOT EXISTS idx_paragraph_speaker ON paragraph(speaker_id);

CREATE TABLE IF NOT EXISTS paragraph_enclosing_context (
    session_id      INTEGER NOT NULL,
    sequence_number INTEGER NOT NULL,
    tag             TEXT NOT NULL,
    PRIMARY KEY (session_id, sequence_number, tag),
    FOREIGN KEY (session_id, sequence_number) REFERENCES paragraph(session_id, sequence_number)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Run log and per-document normalization issues",
            sql: r#"
CREATE TABLE IF NOT EXISTS pipeline_runs (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE TABLE IF NOT EXISTS normalization_issue (
    location TEXT PRIMARY KEY,
    kind     TEXT NOT NULL,
    detail   TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}

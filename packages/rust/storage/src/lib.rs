//! libSQL entity store for discovery state, retrieval state, and the corpus.
//!
//! The [`Storage`] struct wraps a local libSQL database. Every table lives in
//! the same schema, so the progress store and the corpus store are simply two
//! files opened through the same type.
//!
//! **Access rules:**
//! - Pipeline runs: read-write (sole writer) via [`Storage::open`]
//! - `status` and ad-hoc inspection: read-only via [`Storage::open_readonly`]
//!
//! Transactions are explicit: callers bracket units of work with
//! [`Storage::begin`] / [`Storage::commit`] / [`Storage::rollback`].

mod migrations;

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use hansard_shared::{
    CrawlCheckpoint, Debate, DueTranscript, EPOCH_SENTINEL, EnclosingContextTag, HansardError,
    IndexEntry, MarkupDialect, Paragraph, Result, RetrievedTranscript, Session, StoredMarkup,
    TranscriptRecord,
};
use libsql::{Connection, Database, params};
use uuid::Uuid;

const LAST_REFRESH_KEY: &str = "last_refresh_time";
const LAST_FULL_REFRESH_KEY: &str = "last_full_refresh_time";

fn db_err(e: libsql::Error) -> HansardError {
    HansardError::Storage(e.to_string())
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| HansardError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HansardError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        HansardError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", ())
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(HansardError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Start a transaction on the writer connection.
    pub async fn begin(&self) -> Result<()> {
        self.check_writable()?;
        self.conn.execute("BEGIN", ()).await.map_err(db_err)?;
        Ok(())
    }

    /// Commit the open transaction.
    pub async fn commit(&self) -> Result<()> {
        self.conn.execute("COMMIT", ()).await.map_err(db_err)?;
        Ok(())
    }

    /// Roll back the open transaction. A missing transaction is not an error.
    pub async fn rollback(&self) -> Result<()> {
        if let Err(e) = self.conn.execute("ROLLBACK", ()).await {
            tracing::debug!(error = %e, "rollback without an open transaction");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Index mirror
    // -----------------------------------------------------------------------

    /// Insert or overwrite an index entry by location.
    pub async fn upsert_index_entry(&self, entry: &IndexEntry) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO index_entry (location, source_partition, last_modified)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(location) DO UPDATE SET
                   source_partition = excluded.source_partition,
                   last_modified = excluded.last_modified",
                params![
                    entry.location.as_str(),
                    entry.source_partition.as_str(),
                    entry.last_modified.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Shards that have been visited at least once.
    pub async fn visited_partitions(&self) -> Result<HashSet<String>> {
        let mut rows = self
            .conn
            .query("SELECT DISTINCT source_partition FROM index_entry", ())
            .await
            .map_err(db_err)?;

        let mut results = HashSet::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.insert(row.get::<String>(0).map_err(db_err)?);
        }
        Ok(results)
    }

    /// Index entries whose location contains `needle`, ordered by location.
    pub async fn list_index_entries_containing(&self, needle: &str) -> Result<Vec<IndexEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT location, source_partition, last_modified
                 FROM index_entry WHERE instr(location, ?1) > 0 ORDER BY location",
                params![needle],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(IndexEntry {
                location: row.get::<String>(0).map_err(db_err)?,
                source_partition: row.get::<String>(1).map_err(db_err)?,
                last_modified: row.get::<String>(2).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    /// Every index entry, ordered by location.
    pub async fn list_index_entries(&self) -> Result<Vec<IndexEntry>> {
        self.list_index_entries_containing("").await
    }

    // -----------------------------------------------------------------------
    // Crawl checkpoint
    // -----------------------------------------------------------------------

    /// Load the crawl checkpoint, if one has been initialized.
    pub async fn load_checkpoint(&self) -> Result<Option<CrawlCheckpoint>> {
        let last_refresh = self.get_process_value(LAST_REFRESH_KEY).await?;
        let last_full = self.get_process_value(LAST_FULL_REFRESH_KEY).await?;

        match (last_refresh, last_full) {
            (Some(refresh), Some(full)) => Ok(Some(CrawlCheckpoint {
                last_refresh_time: parse_timestamp(&refresh)?,
                last_full_refresh_time: parse_timestamp(&full)?,
            })),
            _ => Ok(None),
        }
    }

    /// Store the checkpoint only where no value exists yet.
    pub async fn init_checkpoint(&self, checkpoint: &CrawlCheckpoint) -> Result<()> {
        self.check_writable()?;
        for (key, value) in checkpoint_pairs(checkpoint) {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO process_data (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    /// Overwrite the stored checkpoint.
    pub async fn save_checkpoint(&self, checkpoint: &CrawlCheckpoint) -> Result<()> {
        self.check_writable()?;
        for (key, value) in checkpoint_pairs(checkpoint) {
            self.conn
                .execute(
                    "INSERT INTO process_data (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    async fn get_process_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM process_data WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(db_err)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Transcript records
    // -----------------------------------------------------------------------

    /// Register a first-page-of-day transcript.
    ///
    /// New records start at the epoch sentinel so they are due immediately;
    /// `last_modified` is refreshed either way. Returns `true` for new records.
    pub async fn register_transcript(&self, location: &str, last_modified: &str) -> Result<bool> {
        self.check_writable()?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO transcript (location, retrieved_at) VALUES (?1, ?2)",
                params![location, EPOCH_SENTINEL],
            )
            .await
            .map_err(db_err)?;

        self.conn
            .execute(
                "UPDATE transcript SET last_modified = ?2 WHERE location = ?1",
                params![location, last_modified],
            )
            .await
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    /// Transcripts whose last retrieval predates their last modification, oldest first.
    pub async fn list_due_transcripts(&self) -> Result<Vec<DueTranscript>> {
        let mut rows = self
            .conn
            .query(
                "SELECT location, last_modified FROM transcript
                 WHERE retrieved_at < last_modified
                 ORDER BY last_modified, location",
                (),
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(DueTranscript {
                location: row.get::<String>(0).map_err(db_err)?,
                last_modified: row.get::<String>(1).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    /// Write back the outcome of one retrieval.
    pub async fn record_retrieval(&self, retrieved: &RetrievedTranscript) -> Result<()> {
        self.check_writable()?;
        let updated = self
            .conn
            .execute(
                "UPDATE transcript SET
                   retrieved_at = ?2,
                   reference_page = ?3,
                   pdf_link = ?4,
                   markup_link = ?5,
                   markup_dialect = ?6,
                   raw_markup = ?7
                 WHERE location = ?1",
                params![
                    retrieved.location.as_str(),
                    retrieved.retrieved_at.to_rfc3339(),
                    retrieved.reference_page.as_str(),
                    retrieved.pdf_link.as_deref(),
                    retrieved.markup_link.as_str(),
                    retrieved.dialect.as_str(),
                    retrieved.markup.as_deref(),
                ],
            )
            .await
            .map_err(db_err)?;

        if updated == 0 {
            return Err(HansardError::Storage(format!(
                "no transcript record for {}",
                retrieved.location
            )));
        }
        Ok(())
    }

    /// Get a transcript record by location.
    pub async fn get_transcript(&self, location: &str) -> Result<Option<TranscriptRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT location, last_modified, retrieved_at, reference_page, pdf_link,
                        markup_link, markup_dialect, raw_markup
                 FROM transcript WHERE location = ?1",
                params![location],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_transcript(&row)?)),
            None => Ok(None),
        }
    }

    /// Locations of retrieved transcripts with resolved markup, in location order.
    pub async fn list_normalizable_locations(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT location FROM transcript
                 WHERE raw_markup IS NOT NULL AND markup_dialect IS NOT NULL
                 ORDER BY location",
                (),
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row.get::<String>(0).map_err(db_err)?);
        }
        Ok(results)
    }

    /// Load the markup of one transcript for normalization.
    pub async fn load_markup(&self, location: &str) -> Result<Option<StoredMarkup>> {
        let mut rows = self
            .conn
            .query(
                "SELECT location, pdf_link, markup_dialect, raw_markup FROM transcript
                 WHERE location = ?1 AND raw_markup IS NOT NULL AND markup_dialect IS NOT NULL",
                params![location],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let dialect: String = row.get(2).map_err(db_err)?;
                Ok(Some(StoredMarkup {
                    location: row.get::<String>(0).map_err(db_err)?,
                    pdf_link: row.get::<String>(1).ok(),
                    dialect: dialect.parse()?,
                    markup: row.get::<String>(3).map_err(db_err)?,
                }))
            }
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Corpus
    // -----------------------------------------------------------------------

    /// Remove every normalized row ahead of a rebuild.
    pub async fn clear_corpus(&self) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute_batch(
                "DELETE FROM paragraph_enclosing_context;
                 DELETE FROM paragraph;
                 DELETE FROM debate;
                 DELETE FROM session;
                 DELETE FROM normalization_issue;",
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Insert a session row.
    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO session (session_id, location, pdf_link, date, chamber)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.session_id,
                    session.location.as_str(),
                    session.pdf_link.as_deref(),
                    session.date.as_deref(),
                    session.chamber.as_deref(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Insert a debate row.
    pub async fn insert_debate(&self, debate: &Debate) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO debate (debate_id, session_id, debate_no, title)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    debate.debate_id,
                    debate.session_id,
                    debate.debate_no,
                    debate.title.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Insert a paragraph row.
    pub async fn insert_paragraph(&self, paragraph: &Paragraph) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO paragraph (para_id, session_id, sequence_number, speaker_id,
                                        debate_id, fragment_number, fragment_type, paragraph_text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    paragraph.para_id,
                    paragraph.session_id,
                    paragraph.sequence_number,
                    paragraph.speaker_id.as_deref(),
                    paragraph.debate_id,
                    paragraph.fragment_number,
                    paragraph.fragment_type.as_deref(),
                    paragraph.text.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Record that `tag` enclosed a paragraph.
    pub async fn insert_enclosing_tag(&self, tag: &EnclosingContextTag) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO paragraph_enclosing_context (session_id, sequence_number, tag)
                 VALUES (?1, ?2, ?3)",
                params![tag.session_id, tag.sequence_number, tag.tag.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Record why a document was excluded from the corpus.
    pub async fn record_normalization_issue(
        &self,
        location: &str,
        kind: &str,
        detail: &str,
    ) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO normalization_issue (location, kind, detail) VALUES (?1, ?2, ?3)
                 ON CONFLICT(location) DO UPDATE SET kind = excluded.kind, detail = excluded.detail",
                params![location, kind, detail],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// All sessions, by id.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut rows = self
            .conn
            .query(
                "SELECT session_id, location, pdf_link, date, chamber FROM session
                 ORDER BY session_id",
                (),
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(Session {
                session_id: row.get::<i64>(0).map_err(db_err)?,
                location: row.get::<String>(1).map_err(db_err)?,
                pdf_link: row.get::<String>(2).ok(),
                date: row.get::<String>(3).ok(),
                chamber: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }

    /// All debates, by id.
    pub async fn list_debates(&self) -> Result<Vec<Debate>> {
        let mut rows = self
            .conn
            .query(
                "SELECT debate_id, session_id, debate_no, title FROM debate ORDER BY debate_id",
                (),
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(Debate {
                debate_id: row.get::<i64>(0).map_err(db_err)?,
                session_id: row.get::<i64>(1).map_err(db_err)?,
                debate_no: row.get::<i64>(2).map_err(db_err)?,
                title: row.get::<String>(3).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    /// All paragraphs, by id.
    pub async fn list_paragraphs(&self) -> Result<Vec<Paragraph>> {
        let mut rows = self
            .conn
            .query(
                "SELECT para_id, session_id, sequence_number, speaker_id, debate_id,
                        fragment_number, fragment_type, paragraph_text
                 FROM paragraph ORDER BY para_id",
                (),
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(Paragraph {
                para_id: row.get::<i64>(0).map_err(db_err)?,
                session_id: row.get::<i64>(1).map_err(db_err)?,
                sequence_number: row.get::<i64>(2).map_err(db_err)?,
                speaker_id: row.get::<String>(3).ok(),
                debate_id: row.get::<i64>(4).map_err(db_err)?,
                fragment_number: row.get::<i64>(5).map_err(db_err)?,
                fragment_type: row.get::<String>(6).ok(),
                text: row.get::<String>(7).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    /// All enclosing-context rows, in key order.
    pub async fn list_enclosing_tags(&self) -> Result<Vec<EnclosingContextTag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT session_id, sequence_number, tag FROM paragraph_enclosing_context
                 ORDER BY session_id, sequence_number, tag",
                (),
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(EnclosingContextTag {
                session_id: row.get::<i64>(0).map_err(db_err)?,
                sequence_number: row.get::<i64>(1).map_err(db_err)?,
                tag: row.get::<String>(2).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    /// Recorded normalization issues as `(location, kind, detail)`.
    pub async fn list_normalization_issues(&self) -> Result<Vec<(String, String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT location, kind, detail FROM normalization_issue ORDER BY location",
                (),
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push((
                row.get::<String>(0).map_err(db_err)?,
                row.get::<String>(1).map_err(db_err)?,
                row.get::<String>(2).map_err(db_err)?,
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Run log
    // -----------------------------------------------------------------------

    /// Insert a new pipeline run. Returns the generated run ID.
    pub async fn insert_run(&self, kind: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO pipeline_runs (id, kind, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), kind, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Mark a pipeline run finished with its stats.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE pipeline_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// The most recent runs as `(kind, started_at, finished_at, stats_json)`.
    pub async fn recent_runs(
        &self,
        limit: u32,
    ) -> Result<Vec<(String, String, Option<String>, Option<String>)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT kind, started_at, finished_at, stats_json FROM pipeline_runs
                 ORDER BY started_at DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push((
                row.get::<String>(0).map_err(db_err)?,
                row.get::<String>(1).map_err(db_err)?,
                row.get::<String>(2).ok(),
                row.get::<String>(3).ok(),
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    /// Row counts across every table.
    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            index_entries: self.count("SELECT COUNT(*) FROM index_entry").await?,
            shards: self
                .count("SELECT COUNT(DISTINCT source_partition) FROM index_entry")
                .await?,
            transcripts: self.count("SELECT COUNT(*) FROM transcript").await?,
            due: self
                .count("SELECT COUNT(*) FROM transcript WHERE retrieved_at < last_modified")
                .await?,
            with_markup: self
                .count("SELECT COUNT(*) FROM transcript WHERE raw_markup IS NOT NULL")
                .await?,
            unresolved: self
                .count(
                    "SELECT COUNT(*) FROM transcript
                     WHERE raw_markup IS NULL AND markup_link IS NOT NULL",
                )
                .await?,
            sessions: self.count("SELECT COUNT(*) FROM session").await?,
            debates: self.count("SELECT COUNT(*) FROM debate").await?,
            paragraphs: self.count("SELECT COUNT(*) FROM paragraph").await?,
            issues: self.count("SELECT COUNT(*) FROM normalization_issue").await?,
        })
    }

    async fn count(&self, sql: &'static str) -> Result<u64> {
        let mut rows = self.conn.query(sql, ()).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as u64),
            None => Ok(0),
        }
    }
}

/// Row counts reported by `hansard status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub index_entries: u64,
    pub shards: u64,
    pub transcripts: u64,
    pub due: u64,
    pub with_markup: u64,
    pub unresolved: u64,
    pub sessions: u64,
    pub debates: u64,
    pub paragraphs: u64,
    pub issues: u64,
}

fn checkpoint_pairs(checkpoint: &CrawlCheckpoint) -> [(&'static str, String); 2] {
    [
        (LAST_REFRESH_KEY, checkpoint.last_refresh_time.to_rfc3339()),
        (
            LAST_FULL_REFRESH_KEY,
            checkpoint.last_full_refresh_time.to_rfc3339(),
        ),
    ]
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HansardError::Storage(format!("invalid timestamp {s:?}: {e}")))
}

/// Convert a database row to a [`TranscriptRecord`].
fn row_to_transcript(row: &libsql::Row) -> Result<TranscriptRecord> {
    let markup_dialect = match row.get::<String>(6).ok() {
        Some(s) => Some(s.parse::<MarkupDialect>()?),
        None => None,
    };

    Ok(TranscriptRecord {
        location: row.get::<String>(0).map_err(db_err)?,
        last_modified: row.get::<String>(1).unwrap_or_default(),
        retrieved_at: row.get::<String>(2).map_err(db_err)?,
        reference_page: row.get::<String>(3).ok(),
        pdf_link: row.get::<String>(4).ok(),
        markup_link: row.get::<String>(5).ok(),
        markup_dialect,
        raw_markup: row.get::<String>(7).ok(),
    })
}

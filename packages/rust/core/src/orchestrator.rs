//! Normalization Orchestrator: rebuild the corpus from retrieved markup.
//!
//! Every transcript with markup gets a fixed ordinal (ascending location)
//! before dispatch. Workers normalize on the blocking pool and may finish in
//! any order; results wait in a reorder buffer and are committed strictly in
//! ordinal order. Surrogate ids are handed out at commit time, so identical
//! inputs produce identical ids for any worker count.
//!
//! At most `workers` documents are held between dispatch and commit, whether
//! still running or waiting in the buffer.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use hansard_markup::NormalizedTranscript;
use hansard_shared::{
    AppConfig, Debate, EnclosingContextTag, HansardError, Paragraph, Result, Session,
    StoredMarkup,
};
use hansard_storage::Storage;

use crate::pipeline::ProgressReporter;

// ---------------------------------------------------------------------------
// Options & result
// ---------------------------------------------------------------------------

/// Configuration for a normalize run.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Worker pool size, and the bound on documents in flight.
    pub workers: usize,
    /// Transcripts to exclude without parsing.
    pub ignore_locations: HashSet<String>,
}

impl From<&AppConfig> for NormalizeOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.normalize.workers,
            ignore_locations: config.normalize.ignore_locations.iter().cloned().collect(),
        }
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Rows written by a normalize run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusCounts {
    pub sessions: usize,
    pub debates: usize,
    pub paragraphs: usize,
    /// Documents excluded and recorded in `normalization_issue`.
    pub issues: usize,
}

/// Result of a normalize run.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizeRunResult {
    /// `pipeline_runs` row for this run.
    pub run_id: String,
    /// Transcripts considered.
    pub documents: usize,
    /// Pool size used.
    pub workers: usize,
    #[serde(flatten)]
    pub counts: CorpusCounts,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// What a worker hands back for one ordinal.
#[derive(Debug)]
enum Outcome {
    Normalized(NormalizedTranscript),
    Excluded {
        location: String,
        kind: &'static str,
        detail: String,
    },
}

impl Outcome {
    fn from_result(location: String, result: Result<NormalizedTranscript>) -> Self {
        match result {
            Ok(doc) => Self::Normalized(doc),
            Err(e) => Self::Excluded {
                location,
                kind: e.kind(),
                detail: e.to_string(),
            },
        }
    }
}

/// Rebuild the corpus from every transcript in `progress_store` that has markup.
///
/// The corpus is cleared first, so a re-run replaces rather than appends.
/// Documents that fail to parse or assemble, or that are on the ignore list,
/// are recorded as issues and consume no ids. Storage errors abort the run.
#[instrument(skip_all, fields(workers = opts.workers))]
pub async fn normalize_corpus(
    progress_store: &Storage,
    corpus_store: &Storage,
    opts: &NormalizeOptions,
    progress: &dyn ProgressReporter,
) -> Result<NormalizeRunResult> {
    let start = Instant::now();
    let workers = opts.workers.max(1);
    let run_id = corpus_store.insert_run("normalize").await?;

    let locations = progress_store.list_normalizable_locations().await?;
    let total = locations.len();
    info!(%run_id, documents = total, workers, "starting normalize run");
    progress.phase(&format!("Normalizing {total} transcripts with {workers} workers"));

    corpus_store.begin().await?;
    if let Err(e) = corpus_store.clear_corpus().await {
        corpus_store.rollback().await?;
        return Err(e);
    }
    corpus_store.commit().await?;

    let mut writer = CorpusWriter::new(corpus_store, total);
    let mut in_flight: JoinSet<(usize, Outcome)> = JoinSet::new();
    let mut ready: BTreeMap<usize, Outcome> = BTreeMap::new();

    for (ordinal, location) in locations.into_iter().enumerate() {
        while ordinal - writer.next_ordinal >= workers {
            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (done, outcome) = joined.map_err(|e| HansardError::Worker(e.to_string()))?;
            ready.insert(done, outcome);
            writer.commit_ready(&mut ready, progress).await?;
        }

        if opts.ignore_locations.contains(&location) {
            ready.insert(
                ordinal,
                Outcome::Excluded {
                    location,
                    kind: "ignored",
                    detail: "listed in normalize.ignore_locations".into(),
                },
            );
        } else {
            match progress_store.load_markup(&location).await? {
                Some(markup) => {
                    in_flight.spawn_blocking(move || (ordinal, normalize_stored(markup)));
                }
                None => {
                    ready.insert(
                        ordinal,
                        Outcome::Excluded {
                            location,
                            kind: "missing",
                            detail: "markup disappeared before dispatch".into(),
                        },
                    );
                }
            }
        }

        writer.commit_ready(&mut ready, progress).await?;
    }

    while let Some(joined) = in_flight.join_next().await {
        let (done, outcome) = joined.map_err(|e| HansardError::Worker(e.to_string()))?;
        ready.insert(done, outcome);
        writer.commit_ready(&mut ready, progress).await?;
    }

    let result = NormalizeRunResult {
        run_id,
        documents: total,
        workers,
        counts: writer.counts,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    let stats = serde_json::to_string(&result).unwrap_or_default();
    corpus_store.finish_run(&result.run_id, &stats).await?;

    progress.done(&format!(
        "{} sessions, {} paragraphs, {} issues",
        result.counts.sessions, result.counts.paragraphs, result.counts.issues
    ));
    info!(
        run_id = %result.run_id,
        sessions = result.counts.sessions,
        debates = result.counts.debates,
        paragraphs = result.counts.paragraphs,
        issues = result.counts.issues,
        elapsed_ms = result.elapsed_ms,
        "normalize run complete"
    );

    Ok(result)
}

/// Worker body: pure, no I/O.
fn normalize_stored(markup: StoredMarkup) -> Outcome {
    let result = hansard_markup::normalize(
        &markup.location,
        markup.pdf_link.as_deref(),
        &markup.markup,
        markup.dialect,
    );
    Outcome::from_result(markup.location, result)
}

// ---------------------------------------------------------------------------
// Single writer
// ---------------------------------------------------------------------------

/// Commits outcomes in ordinal order and owns the id counters.
struct CorpusWriter<'a> {
    store: &'a Storage,
    total: usize,
    next_ordinal: usize,
    next_session_id: i64,
    next_debate_id: i64,
    next_para_id: i64,
    counts: CorpusCounts,
}

impl<'a> CorpusWriter<'a> {
    fn new(store: &'a Storage, total: usize) -> Self {
        Self {
            store,
            total,
            next_ordinal: 0,
            next_session_id: 1,
            next_debate_id: 1,
            next_para_id: 1,
            counts: CorpusCounts::default(),
        }
    }

    /// Commit the contiguous run of buffered outcomes starting at the next ordinal.
    async fn commit_ready(
        &mut self,
        ready: &mut BTreeMap<usize, Outcome>,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        while let Some(outcome) = ready.remove(&self.next_ordinal) {
            let location = match outcome {
                Outcome::Normalized(doc) => {
                    self.commit_transcript(&doc).await?;
                    doc.location
                }
                Outcome::Excluded {
                    location,
                    kind,
                    detail,
                } => {
                    warn!(%location, kind, %detail, "transcript excluded from corpus");
                    self.store
                        .record_normalization_issue(&location, kind, &detail)
                        .await?;
                    self.counts.issues += 1;
                    location
                }
            };

            self.next_ordinal += 1;
            progress.item_progress(self.next_ordinal, self.total, &location);
        }
        Ok(())
    }

    /// Write one transcript in its own transaction, then advance the counters.
    async fn commit_transcript(&mut self, doc: &NormalizedTranscript) -> Result<()> {
        self.store.begin().await?;
        if let Err(e) = self.insert_transcript(doc).await {
            self.store.rollback().await?;
            return Err(e);
        }
        self.store.commit().await?;

        debug!(
            location = %doc.location,
            session_id = self.next_session_id,
            paragraphs = doc.paragraphs.len(),
            "transcript committed"
        );

        self.next_session_id += 1;
        self.next_debate_id += doc.debates.len() as i64;
        self.next_para_id += doc.paragraphs.len() as i64;
        self.counts.sessions += 1;
        self.counts.debates += doc.debates.len();
        self.counts.paragraphs += doc.paragraphs.len();
        Ok(())
    }

    async fn insert_transcript(&self, doc: &NormalizedTranscript) -> Result<()> {
        let session_id = self.next_session_id;

        self.store
            .insert_session(&Session {
                session_id,
                location: doc.location.clone(),
                pdf_link: doc.pdf_link.clone(),
                date: doc.session.date.clone(),
                chamber: doc.session.chamber.clone(),
            })
            .await?;

        for debate in &doc.debates {
            self.store
                .insert_debate(&Debate {
                    debate_id: self.debate_id(debate.debate_no),
                    session_id,
                    debate_no: debate.debate_no,
                    title: debate.title.clone(),
                })
                .await?;
        }

        for (offset, para) in doc.paragraphs.iter().enumerate() {
            self.store
                .insert_paragraph(&Paragraph {
                    para_id: self.next_para_id + offset as i64,
                    session_id,
                    sequence_number: para.sequence_number,
                    speaker_id: para.speaker_id.clone(),
                    debate_id: self.debate_id(para.debate_no),
                    fragment_number: para.fragment_number,
                    fragment_type: para.fragment_type.clone(),
                    text: para.text.clone(),
                })
                .await?;

            for tag in &para.enclosing_tags {
                self.store
                    .insert_enclosing_tag(&EnclosingContextTag {
                        session_id,
                        sequence_number: para.sequence_number,
                        tag: tag.clone(),
                    })
                    .await?;
            }
        }

        Ok(())
    }

    /// Debate numbers start at 1 within each transcript.
    fn debate_id(&self, debate_no: i64) -> i64 {
        self.next_debate_id + debate_no - 1
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::pipeline::SilentProgress;
    use hansard_shared::{MarkupDialect, RetrievedTranscript};
    use uuid::Uuid;

    const BROKEN: usize = 7;
    const LEGACY: usize = 13;
    const IGNORED: usize = 21;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("hansard_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn location(i: usize) -> String {
        format!("https://parlinfo.test/day/{i:03}")
    }

    /// A transcript whose size varies with `i`, so workers finish out of order.
    fn synthetic_transcript(i: usize) -> String {
        let mut body = String::new();
        for d in 0..(i % 4 + 1) {
            body.push_str(&format!(
                "<debate><debateinfo><title>DEBATE {i}-{d}</title></debateinfo>"
            ));
            for s in 0..(i % 3 + 1) {
                body.push_str(&format!(
                    "<speech><talk.start><talker><name.id>m{s}x</name.id></talker>\
                     <para>Speech {s} in debate {d} of day {i}.</para></talk.start>"
                ));
                for p in 0..(i * 7 % 11) {
                    body.push_str(&format!("<p>Paragraph {p} of speech {s}.</p>"));
                }
                body.push_str("</speech>");
            }
            body.push_str("</debate>");
        }
        format!(
            "<hansard><session.header><date>2001-01-{:02}</date><chamber>SENATE</chamber>\
             </session.header><chamber.xscript>{body}</chamber.xscript></hansard>",
            i % 28 + 1
        )
    }

    /// Fifty retrieved transcripts, registered in reverse order.
    async fn seeded_progress_store() -> Storage {
        let store = test_storage().await;
        for i in (0..50).rev() {
            let loc = location(i);
            store.register_transcript(&loc, "2024-01-01").await.unwrap();

            let (dialect, markup) = match i {
                BROKEN => (MarkupDialect::Xml, "<hansard><p>unclosed".to_string()),
                LEGACY => (
                    MarkupDialect::Legacy,
                    "<HANSARD><PARA>Old text</PARA></HANSARD>".to_string(),
                ),
                _ => (MarkupDialect::Xml, synthetic_transcript(i)),
            };
            store
                .record_retrieval(&RetrievedTranscript {
                    location: loc.clone(),
                    retrieved_at: Utc::now(),
                    reference_page: "<html/>".into(),
                    pdf_link: Some(format!("{loc}.pdf")),
                    markup_link: format!("{loc}.xml"),
                    dialect,
                    markup: Some(markup),
                })
                .await
                .unwrap();
        }
        store
    }

    fn options(workers: usize) -> NormalizeOptions {
        NormalizeOptions {
            workers,
            ignore_locations: HashSet::from([location(IGNORED)]),
        }
    }

    type Snapshot = (
        Vec<Session>,
        Vec<Debate>,
        Vec<Paragraph>,
        Vec<EnclosingContextTag>,
        Vec<(String, String, String)>,
    );

    async fn snapshot(store: &Storage) -> Snapshot {
        (
            store.list_sessions().await.unwrap(),
            store.list_debates().await.unwrap(),
            store.list_paragraphs().await.unwrap(),
            store.list_enclosing_tags().await.unwrap(),
            store.list_normalization_issues().await.unwrap(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn identical_corpus_for_any_worker_count() {
        let progress_store = seeded_progress_store().await;

        let mut snapshots = Vec::new();
        for workers in [1, 4, 16] {
            let corpus = test_storage().await;
            let result = normalize_corpus(&progress_store, &corpus, &options(workers), &SilentProgress)
                .await
                .unwrap();
            assert_eq!(result.documents, 50);
            assert_eq!(result.counts.sessions, 47);
            assert_eq!(result.counts.issues, 3);
            snapshots.push(snapshot(&corpus).await);
        }

        assert_eq!(snapshots[0], snapshots[1]);
        assert_eq!(snapshots[0], snapshots[2]);
    }

    #[tokio::test]
    async fn ids_follow_location_order_and_skip_issues() {
        let progress_store = seeded_progress_store().await;
        let corpus = test_storage().await;
        normalize_corpus(&progress_store, &corpus, &options(4), &SilentProgress)
            .await
            .unwrap();

        let (sessions, debates, paragraphs, _, issues) = snapshot(&corpus).await;

        let ids: Vec<i64> = sessions.iter().map(|s| s.session_id).collect();
        assert_eq!(ids, (1..=47).collect::<Vec<_>>());
        let mut locations: Vec<&str> = sessions.iter().map(|s| s.location.as_str()).collect();
        let unsorted = locations.clone();
        locations.sort();
        assert_eq!(locations, unsorted);
        assert_eq!(sessions[0].location, location(0));
        assert_eq!(sessions[0].chamber.as_deref(), Some("SENATE"));

        let debate_ids: Vec<i64> = debates.iter().map(|d| d.debate_id).collect();
        assert_eq!(debate_ids, (1..=debates.len() as i64).collect::<Vec<_>>());
        let para_ids: Vec<i64> = paragraphs.iter().map(|p| p.para_id).collect();
        assert_eq!(para_ids, (1..=paragraphs.len() as i64).collect::<Vec<_>>());

        // Day 0: one debate, one speech with one para and no p elements.
        assert_eq!(debates[0].title, "DEBATE 0-0");
        assert_eq!(paragraphs[0].speaker_id.as_deref(), Some("M0X"));
        assert_eq!(paragraphs[0].fragment_type.as_deref(), Some("speech"));

        let mut kinds: Vec<(&str, &str)> = issues
            .iter()
            .map(|(loc, kind, _)| (loc.as_str(), kind.as_str()))
            .collect();
        kinds.sort();
        let broken = location(BROKEN);
        let legacy = location(LEGACY);
        let ignored = location(IGNORED);
        assert_eq!(
            kinds,
            [
                (broken.as_str(), "parse"),
                (legacy.as_str(), "assembly"),
                (ignored.as_str(), "ignored"),
            ]
        );
    }

    #[tokio::test]
    async fn rerun_replaces_corpus() {
        let progress_store = seeded_progress_store().await;
        let corpus = test_storage().await;

        normalize_corpus(&progress_store, &corpus, &options(2), &SilentProgress)
            .await
            .unwrap();
        let first = snapshot(&corpus).await;

        normalize_corpus(&progress_store, &corpus, &options(8), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(snapshot(&corpus).await, first);

        let runs = corpus.recent_runs(5).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|(kind, ..)| kind == "normalize"));
    }

    #[tokio::test]
    async fn fixture_transcript_end_to_end() {
        let xml = std::fs::read_to_string("../../../fixtures/xml_transcript.xml")
            .expect("read transcript fixture");
        let progress_store = test_storage().await;
        let loc = "https://parlinfo.test/day/fixture";
        progress_store.register_transcript(loc, "2024-01-01").await.unwrap();
        progress_store
            .record_retrieval(&RetrievedTranscript {
                location: loc.into(),
                retrieved_at: Utc::now(),
                reference_page: "<html/>".into(),
                pdf_link: None,
                markup_link: format!("{loc}.xml"),
                dialect: MarkupDialect::Xml,
                markup: Some(xml),
            })
            .await
            .unwrap();

        let corpus = test_storage().await;
        let result = normalize_corpus(&progress_store, &corpus, &options(1), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(result.counts.sessions, 1);
        assert_eq!(result.counts.debates, 2);

        let (sessions, debates, paragraphs, tags, _) = snapshot(&corpus).await;
        assert_eq!(sessions[0].date.as_deref(), Some("2012-06-20"));
        assert_eq!(debates[1].title, "QUESTIONS WITHOUT NOTICE\nEconomy");
        assert_eq!(paragraphs[0].speaker_id.as_deref(), Some("HWK"));
        assert!(
            tags.iter()
                .any(|t| t.sequence_number == 0 && t.tag == "subdebate.2")
        );
    }
}

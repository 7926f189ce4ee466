//! Markup Normalizer: raw transcript markup to session, debate, and paragraph records.
//!
//! [`normalize`] is a pure function of its inputs, which makes it the unit of
//! parallel work for the orchestrator. Each [`MarkupDialect`] carries its own
//! [`DialectStrategy`] for repair and assembly.

pub mod assemble;
pub mod legacy;
pub mod tree;
pub mod walk;

use std::borrow::Cow;

use hansard_shared::{HansardError, MarkupDialect, Result};
use serde::Serialize;
use tracing::debug;

pub use assemble::{DebateRecord, ParagraphRecord, SessionInfo};
pub use tree::{Element, Node};
pub use walk::ParagraphFact;

/// Everything the orchestrator needs to key and commit one transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTranscript {
    pub location: String,
    pub pdf_link: Option<String>,
    pub session: SessionInfo,
    pub debates: Vec<DebateRecord>,
    pub paragraphs: Vec<ParagraphRecord>,
}

// ---------------------------------------------------------------------------
// Dialect strategies
// ---------------------------------------------------------------------------

/// Per-dialect preprocessing and assembly.
pub trait DialectStrategy: Send + Sync {
    /// Repair raw markup until it parses as a tree.
    fn prepare<'a>(&self, raw: &'a str) -> Cow<'a, str>;

    /// Build session and paragraph records from the parsed tree.
    fn assemble(&self, root: &Element) -> Result<(SessionInfo, Vec<ParagraphFact>)>;

    /// Dialect name for tracing.
    fn name(&self) -> &'static str;
}

/// Modern tree-structured transcripts.
pub struct XmlStrategy;

impl DialectStrategy for XmlStrategy {
    fn prepare<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(raw)
    }

    fn assemble(&self, root: &Element) -> Result<(SessionInfo, Vec<ParagraphFact>)> {
        let session = assemble::session_info(root)?;
        Ok((session, walk::walk(root)))
    }

    fn name(&self) -> &'static str {
        "xml"
    }
}

/// Legacy SGML transcripts.
///
/// These are repaired and parsed, which catches broken documents, but their
/// tree shape has no defined paragraph assembly yet.
pub struct LegacyStrategy;

impl DialectStrategy for LegacyStrategy {
    fn prepare<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        Cow::Owned(legacy::prepare(raw))
    }

    fn assemble(&self, root: &Element) -> Result<(SessionInfo, Vec<ParagraphFact>)> {
        Err(HansardError::Assembly(format!(
            "legacy <{}> transcript parsed but paragraph assembly is not defined for this dialect",
            root.name
        )))
    }

    fn name(&self) -> &'static str {
        "sgml"
    }
}

/// The strategy for a dialect.
pub fn strategy_for(dialect: MarkupDialect) -> &'static dyn DialectStrategy {
    match dialect {
        MarkupDialect::Xml => &XmlStrategy,
        MarkupDialect::Legacy => &LegacyStrategy,
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Normalize one transcript.
///
/// Returns [`HansardError::Parse`] when the markup does not form a tree after
/// repair, and [`HansardError::Assembly`] for dialects without assembly.
pub fn normalize(
    location: &str,
    pdf_link: Option<&str>,
    raw: &str,
    dialect: MarkupDialect,
) -> Result<NormalizedTranscript> {
    let strategy = strategy_for(dialect);
    let prepared = strategy.prepare(raw);
    let root = tree::parse_tree(&prepared)?;
    let (session, facts) = strategy.assemble(&root)?;
    let (debates, paragraphs) = assemble::derive_debates(&facts);

    debug!(
        location,
        dialect = strategy.name(),
        debates = debates.len(),
        paragraphs = paragraphs.len(),
        "normalized transcript"
    );

    Ok(NormalizedTranscript {
        location: location.to_string(),
        pdf_link: pdf_link.map(str::to_string),
        session,
        debates,
        paragraphs,
    })
}

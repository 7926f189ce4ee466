//! Sitemap index and shard parser.
//!
//! The remote index follows the sitemaps.org protocol:
//! - the root is a `<sitemapindex>` listing shard locations in `<loc>`
//! - each shard is a `<urlset>` of `<url>` entries with `<loc>` and `<lastmod>`
//!
//! Elements are matched by local name, so namespace prefixes are ignored.

use hansard_shared::{HansardError, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::warn;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One `<url>` entry from a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardEntry {
    /// Document location.
    pub location: String,
    /// Remote change date, as published.
    pub last_modified: String,
}

/// Which element's text is currently being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    LastMod,
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

/// Parse the root index into shard locations, in published order.
pub fn parse_sitemap_index(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut shards = Vec::new();
    let mut in_loc = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"loc" => {
                in_loc = true;
                text.clear();
            }
            Ok(Event::Text(t)) if in_loc => {
                text.push_str(&t.unescape().map_err(|e| parse_err("sitemap index", e))?);
            }
            Ok(Event::CData(c)) if in_loc => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"loc" => {
                in_loc = false;
                let loc = text.trim();
                if !loc.is_empty() {
                    shards.push(loc.to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_err("sitemap index", e)),
            _ => {}
        }
    }

    Ok(shards)
}

/// Parse one shard into its entries.
///
/// Entries missing either `<loc>` or `<lastmod>` are skipped with a warning.
pub fn parse_sitemap_shard(xml: &str) -> Result<Vec<ShardEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut field: Option<Field> = None;
    let mut loc: Option<String> = None;
    let mut lastmod: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"url" => {
                    loc = None;
                    lastmod = None;
                }
                b"loc" => {
                    field = Some(Field::Loc);
                    text.clear();
                }
                b"lastmod" => {
                    field = Some(Field::LastMod);
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) if field.is_some() => {
                text.push_str(&t.unescape().map_err(|e| parse_err("sitemap shard", e))?);
            }
            Ok(Event::CData(c)) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"loc" | b"lastmod" => {
                    let value = Some(text.trim().to_string()).filter(|v| !v.is_empty());
                    match field.take() {
                        Some(Field::Loc) => loc = value,
                        Some(Field::LastMod) => lastmod = value,
                        None => {}
                    }
                }
                b"url" => match (loc.take(), lastmod.take()) {
                    (Some(location), Some(last_modified)) => entries.push(ShardEntry {
                        location,
                        last_modified,
                    }),
                    (location, _) => {
                        warn!(?location, "skipping sitemap entry without loc/lastmod");
                    }
                },
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_err("sitemap shard", e)),
            _ => {}
        }
    }

    Ok(entries)
}

fn parse_err(what: &str, e: impl std::fmt::Display) -> HansardError {
    HansardError::parse(format!("malformed {what}: {e}"))
}

//! Reference page analysis.
//!
//! Each sitting day has an HTML reference page that links to the PDF and, for
//! recent days, the structured XML transcript. Older days only expose a
//! `System Id` in the page metadata, from which the legacy SGML location is
//! derived by convention.

use std::collections::HashMap;

use hansard_shared::{HansardError, Result};
use scraper::{Html, Selector};
use url::Url;

/// Marker in links to the PDF rendition.
const PDF_MARKER: &str = "toc_pdf";

/// Marker in links to the structured XML transcript.
const STRUCTURED_MARKER: &str = "toc_unixml";

/// Metadata label holding the `chamber/<house>/<date>/<page>` identifier.
const SYSTEM_ID_LABEL: &str = "System Id";

/// Owned view of the parts of a reference page retrieval needs.
#[derive(Debug, Clone)]
pub struct ReferencePage {
    /// Outbound links, resolved against the page location.
    pub links: Vec<String>,
    /// Metadata label → value, for non-empty values.
    pub metadata: HashMap<String, String>,
}

/// Where a legacy transcript lives remotely and in the side-channel directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyLocation {
    /// Download link for the SGML file.
    pub link: String,
    /// File name the fetch infrastructure saves the download under.
    pub artifact_name: String,
}

impl ReferencePage {
    /// Parse a reference page fetched from `page_url`.
    pub fn parse(page_url: &str, html: &str) -> Result<Self> {
        let base = Url::parse(page_url)
            .map_err(|e| HansardError::validation(format!("invalid page URL {page_url}: {e}")))?;
        let doc = Html::parse_document(html);

        Ok(Self {
            links: extract_links(&doc, &base),
            metadata: extract_metadata(&doc),
        })
    }

    /// The PDF rendition, if the page links one.
    pub fn pdf_link(&self) -> Result<Option<&str>> {
        self.unique_link(PDF_MARKER)
    }

    /// The structured XML transcript, if the page links one.
    pub fn structured_markup_link(&self) -> Result<Option<&str>> {
        self.unique_link(STRUCTURED_MARKER)
    }

    /// Derive the legacy SGML location from the `System Id` metadata.
    ///
    /// `chamber/hansardr/1998-03-02/0000` under `base` becomes
    /// `{base}/chamber/hansardr/1998-03-02/toc_sgml/reps%201998-03-02.sgm`.
    pub fn legacy_markup_location(&self, download_base: &str) -> Result<LegacyLocation> {
        let system_id = self.metadata.get(SYSTEM_ID_LABEL).ok_or_else(|| {
            HansardError::validation("reference page has no System Id metadata")
        })?;

        let components: Vec<&str> = system_id.trim().split('/').collect();
        if components.len() < 4 {
            return Err(HansardError::validation(format!(
                "unexpected System Id shape: {system_id}"
            )));
        }

        let house = match components[1] {
            "hansardr" => "reps",
            "hansards" => "senate",
            other => {
                return Err(HansardError::validation(format!(
                    "unknown house code {other:?} in System Id {system_id}"
                )));
            }
        };
        let date = components[2];
        let transcript_id = components[..components.len() - 1].join("/");

        Ok(LegacyLocation {
            link: format!(
                "{}/{transcript_id}/toc_sgml/{house}%20{date}.sgm",
                download_base.trim_end_matches('/')
            ),
            artifact_name: format!("{house} {date}.sgm"),
        })
    }

    fn unique_link(&self, marker: &str) -> Result<Option<&str>> {
        let mut matches = self.links.iter().filter(|link| link.contains(marker));
        let first = matches.next();
        if matches.next().is_some() {
            return Err(HansardError::Ambiguity(format!(
                "more than one {marker} link on reference page"
            )));
        }
        Ok(first.map(String::as_str))
    }
}

/// Extract all links from a document, resolved against the base URL.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<String> {
    let link_sel = Selector::parse("a[href]").expect("valid selector");
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            if href.starts_with('#') || href.starts_with("javascript:") {
                continue;
            }
            if let Ok(resolved) = base_url.join(href) {
                links.push(resolved.to_string());
            }
        }
    }

    links
}

/// Pair `.mdLabel` and `.mdValue` elements in document order.
fn extract_metadata(doc: &Html) -> HashMap<String, String> {
    let label_sel = Selector::parse(".mdLabel").expect("valid selector");
    let value_sel = Selector::parse(".mdValue").expect("valid selector");

    doc.select(&label_sel)
        .zip(doc.select(&value_sel))
        .filter_map(|(label, value)| {
            let value = value.text().collect::<String>();
            if value.trim().is_empty() {
                return None;
            }
            let label = label.text().collect::<String>().trim().to_string();
            Some((label, value.trim().to_string()))
        })
        .collect()
}

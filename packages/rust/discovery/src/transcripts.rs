//! Identify first-page-of-day transcripts among mirrored index entries.
//!
//! A sitting day is published as many pages, roughly one per speech. Each page
//! location carries a `;query=Id:"chamber/<house>/<date>/<page>"` parameter;
//! page `0000` is the entry point retrieval works from.

use std::collections::HashMap;

use hansard_shared::Result;
use hansard_storage::Storage;
use tracing::{debug, info, instrument};

/// Marker for locations that may be transcripts.
const TRANSCRIPT_MARKER: &str = "hansard";

/// Page number of the first page of a sitting day.
const FIRST_PAGE: &str = "0000";

/// Counts from one identification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IdentifyResult {
    /// Index entries that looked like transcripts.
    pub candidates: usize,
    /// First pages found, new or already known.
    pub first_pages: usize,
    /// First pages registered for the first time.
    pub registered: usize,
    /// Locations whose identifier could not be read.
    pub unparseable: usize,
}

/// Register every first-page transcript found in the index mirror.
///
/// The pass runs in one transaction. Known transcripts keep their retrieval
/// state but pick up the latest `last_modified`.
#[instrument(skip_all)]
pub async fn identify_transcripts(storage: &Storage) -> Result<IdentifyResult> {
    storage.begin().await?;
    match register_first_pages(storage).await {
        Ok(result) => {
            storage.commit().await?;
            Ok(result)
        }
        Err(e) => {
            storage.rollback().await?;
            Err(e)
        }
    }
}

async fn register_first_pages(storage: &Storage) -> Result<IdentifyResult> {
    let entries = storage
        .list_index_entries_containing(TRANSCRIPT_MARKER)
        .await?;

    let mut result = IdentifyResult {
        candidates: entries.len(),
        ..Default::default()
    };
    let mut pages: HashMap<String, usize> = HashMap::new();

    for entry in &entries {
        let Some(page) = transcript_id(&entry.location)
            .as_deref()
            .and_then(|id| id.rsplit('/').next())
            .map(str::to_string)
        else {
            debug!(location = %entry.location, "no transcript identifier in location");
            result.unparseable += 1;
            continue;
        };

        if page == FIRST_PAGE {
            result.first_pages += 1;
            if storage
                .register_transcript(&entry.location, &entry.last_modified)
                .await?
            {
                result.registered += 1;
            }
        }

        *pages.entry(page).or_default() += 1;
    }

    let mut common: Vec<(String, usize)> = pages.into_iter().collect();
    common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    common.truncate(10);

    info!(
        candidates = result.candidates,
        first_pages = result.first_pages,
        registered = result.registered,
        most_common_pages = ?common,
        "transcripts identified"
    );

    Ok(result)
}

/// The quoted identifier in a location's `query` path parameter.
///
/// `…/display.w3p;query=Id%3A%22chamber%2Fhansards%2F2004-02-10%2F0000%22;src1=sm1`
/// yields `chamber/hansards/2004-02-10/0000`.
pub fn transcript_id(location: &str) -> Option<String> {
    let path = match url::Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location.to_string(),
    };

    let query = path
        .split(';')
        .filter(|segment| segment.starts_with("query="))
        .find_map(|segment| {
            url::form_urlencoded::parse(segment.as_bytes())
                .find(|(key, _)| key == "query")
                .map(|(_, value)| value.into_owned())
        })?;

    query.split('"').nth(1).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hansard_shared::IndexEntry;
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("hansard_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    const FIRST: &str = "https://parlinfo.aph.gov.au/parlInfo/search/display/display.w3p;query=Id%3A%22chamber%2Fhansards%2F2004-02-10%2F0000%22;src1=sm1";
    const SECOND: &str = "https://parlinfo.aph.gov.au/parlInfo/search/display/display.w3p;query=Id%3A%22chamber%2Fhansards%2F2004-02-10%2F0001%22;src1=sm1";

    #[test]
    fn extracts_quoted_identifier() {
        assert_eq!(
            transcript_id(FIRST).as_deref(),
            Some("chamber/hansards/2004-02-10/0000")
        );
        assert_eq!(transcript_id("https://parlinfo.aph.gov.au/hansard/index.html"), None);
    }

    #[tokio::test]
    async fn registers_first_pages_only() {
        let storage = test_storage().await;
        for (location, lastmod) in [
            (FIRST, "2024-01-01"),
            (SECOND, "2024-01-01"),
            ("https://parlinfo.aph.gov.au/hansard/about", "2024-01-01"),
            ("https://parlinfo.aph.gov.au/media/x", "2024-01-01"),
        ] {
            storage
                .upsert_index_entry(&IndexEntry {
                    location: location.into(),
                    source_partition: "shard-1".into(),
                    last_modified: lastmod.into(),
                })
                .await
                .unwrap();
        }

        let result = identify_transcripts(&storage).await.unwrap();
        assert_eq!(
            result,
            IdentifyResult {
                candidates: 3,
                first_pages: 1,
                registered: 1,
                unparseable: 1,
            }
        );

        let record = storage.get_transcript(FIRST).await.unwrap().unwrap();
        assert_eq!(record.last_modified, "2024-01-01");
        assert!(storage.get_transcript(SECOND).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reidentification_updates_last_modified_only() {
        let storage = test_storage().await;
        let mut entry = IndexEntry {
            location: FIRST.into(),
            source_partition: "shard-1".into(),
            last_modified: "2024-01-01".into(),
        };
        storage.upsert_index_entry(&entry).await.unwrap();
        identify_transcripts(&storage).await.unwrap();

        entry.last_modified = "2024-02-01".into();
        storage.upsert_index_entry(&entry).await.unwrap();
        let result = identify_transcripts(&storage).await.unwrap();
        assert_eq!(result.registered, 0);
        assert_eq!(result.first_pages, 1);

        let record = storage.get_transcript(FIRST).await.unwrap().unwrap();
        assert_eq!(record.last_modified, "2024-02-01");
        assert_eq!(record.retrieved_at, hansard_shared::EPOCH_SENTINEL);
    }
}

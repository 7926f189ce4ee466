//! Session and debate derivation from a walked transcript.

use hansard_shared::{HansardError, Result};
use serde::Serialize;

use crate::tree::Element;
use crate::walk::{InfoMap, ParagraphFact};

/// Sitting-day details from the transcript header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub date: Option<String>,
    pub chamber: Option<String>,
}

/// One debate within a session, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebateRecord {
    pub debate_no: i64,
    pub title: String,
}

/// A paragraph ready to be keyed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParagraphRecord {
    /// Document-order position within the session, from 0.
    pub sequence_number: i64,
    /// Uppercased speaker reference.
    pub speaker_id: Option<String>,
    /// The [`DebateRecord::debate_no`] this paragraph belongs to.
    pub debate_no: i64,
    pub fragment_number: i64,
    pub fragment_type: Option<String>,
    pub text: String,
    pub enclosing_tags: Vec<String>,
}

/// Read the session header. A transcript without one cannot be keyed.
pub fn session_info(root: &Element) -> Result<SessionInfo> {
    let header = root
        .find("session.header")
        .ok_or_else(|| HansardError::parse(format!("<{}> has no session.header", root.name)))?;

    let field = |name: &str| {
        header
            .find(name)
            .and_then(Element::text)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    Ok(SessionInfo {
        date: field("date"),
        chamber: field("chamber"),
    })
}

/// Title of the debate a fact belongs to: every open heading's title, one per line.
pub fn debate_title(debate_info: &[InfoMap]) -> String {
    debate_info
        .iter()
        .map(|info| info.get("title").map(String::as_str).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fold the fact sequence into debates and numbered paragraphs.
///
/// A new debate starts at the first paragraph and whenever the computed
/// title differs from the previous paragraph's.
pub fn derive_debates(facts: &[ParagraphFact]) -> (Vec<DebateRecord>, Vec<ParagraphRecord>) {
    let mut debates: Vec<DebateRecord> = Vec::new();
    let mut paragraphs = Vec::with_capacity(facts.len());
    let mut last_title: Option<String> = None;

    for (sequence_number, fact) in facts.iter().enumerate() {
        let title = debate_title(&fact.debate_info);

        if last_title.as_deref() != Some(title.as_str()) {
            debates.push(DebateRecord {
                debate_no: debates.len() as i64 + 1,
                title: title.clone(),
            });
            last_title = Some(title);
        }

        paragraphs.push(ParagraphRecord {
            sequence_number: sequence_number as i64,
            speaker_id: fact.speaker.as_deref().map(str::to_uppercase),
            debate_no: debates.len() as i64,
            fragment_number: fact.fragment_number,
            fragment_type: fact.fragment_type.clone(),
            text: fact.text.clone(),
            enclosing_tags: fact.enclosing_tags.iter().cloned().collect(),
        });
    }

    (debates, paragraphs)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::tree::parse_tree;

    fn fact(titles: &[&str], speaker: Option<&str>) -> ParagraphFact {
        let info: Vec<InfoMap> = titles
            .iter()
            .map(|t| InfoMap::from([("title".to_string(), t.to_string())]))
            .collect();
        ParagraphFact {
            text: "text".into(),
            speaker: speaker.map(str::to_string),
            debate_info: Arc::new(info),
            fragment_number: 0,
            fragment_type: None,
            enclosing_tags: Arc::new(BTreeSet::new()),
        }
    }

    #[test]
    fn title_changes_start_debates() {
        let facts = [
            fact(&["Bills"], None),
            fact(&["Bills"], None),
            fact(&["Questions"], None),
        ];
        let (debates, paragraphs) = derive_debates(&facts);

        assert_eq!(
            debates,
            [
                DebateRecord {
                    debate_no: 1,
                    title: "Bills".into()
                },
                DebateRecord {
                    debate_no: 2,
                    title: "Questions".into()
                },
            ]
        );
        let owners: Vec<i64> = paragraphs.iter().map(|p| p.debate_no).collect();
        assert_eq!(owners, [1, 1, 2]);
    }

    #[test]
    fn returning_title_opens_a_new_debate() {
        let facts = [fact(&["A"], None), fact(&["B"], None), fact(&["A"], None)];
        let (debates, _) = derive_debates(&facts);
        assert_eq!(debates.len(), 3);
    }

    #[test]
    fn paragraphs_before_any_heading_share_an_untitled_debate() {
        let facts = [fact(&[], None), fact(&[], None)];
        let (debates, paragraphs) = derive_debates(&facts);
        assert_eq!(debates.len(), 1);
        assert_eq!(debates[0].title, "");
        assert_eq!(paragraphs[1].debate_no, 1);
    }

    #[test]
    fn nested_titles_join_with_newlines() {
        let facts = [fact(&["BILLS", "Second Reading"], None)];
        let (debates, _) = derive_debates(&facts);
        assert_eq!(debates[0].title, "BILLS\nSecond Reading");
    }

    #[test]
    fn sequence_numbers_follow_document_order() {
        let facts = [fact(&["A"], None), fact(&["A"], None), fact(&["B"], None)];
        let (_, paragraphs) = derive_debates(&facts);
        let sequence: Vec<i64> = paragraphs.iter().map(|p| p.sequence_number).collect();
        assert_eq!(sequence, [0, 1, 2]);
    }

    #[test]
    fn speaker_ids_are_uppercased() {
        let facts = [fact(&["A"], Some("e5x")), fact(&["A"], None)];
        let (_, paragraphs) = derive_debates(&facts);
        assert_eq!(paragraphs[0].speaker_id.as_deref(), Some("E5X"));
        assert_eq!(paragraphs[1].speaker_id, None);
    }

    #[test]
    fn session_header_fields() {
        let root = parse_tree(
            "<hansard><session.header><date>2024-05-01</date>\
             <parliament.no>47</parliament.no><chamber>REPS</chamber></session.header></hansard>",
        )
        .unwrap();
        let info = session_info(&root).unwrap();
        assert_eq!(info.date.as_deref(), Some("2024-05-01"));
        assert_eq!(info.chamber.as_deref(), Some("REPS"));
    }

    #[test]
    fn missing_session_header_is_parse_error() {
        let root = parse_tree("<hansard><p>x</p></hansard>").unwrap();
        assert_eq!(session_info(&root).unwrap_err().kind(), "parse");
    }
}

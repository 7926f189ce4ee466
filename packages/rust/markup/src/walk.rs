//! Context-propagating depth-first walk over a transcript tree.
//!
//! Traversal uses an explicit stack so arbitrarily deep documents cannot
//! overflow. Each stack entry carries an immutable [`WalkContext`]; a node
//! that changes the context gets a fresh `Arc`, and its children share it,
//! so sibling subtrees never observe each other's updates.
//!
//! The speaker is the exception: runs of paragraphs are not re-attributed in
//! the modern dialect, so the active speaker follows document order instead
//! of the tree.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::tree::Element;

/// Child tag → direct text for one heading element.
pub type InfoMap = BTreeMap<String, String>;

/// Elements that begin a procedural unit.
const FRAGMENT_KINDS: &[&str] = &["speech", "motionnospeech", "petition", "question", "answer"];

/// Nested debate elements, including misspellings found in the archive.
const SUBDEBATE_KINDS: &[&str] = &[
    "subdebate.1",
    "subdebate.2",
    "subdebate.3",
    "subdebate.4",
    "subdeabte.1",
    "subdebate",
];

/// Duplicates of the heading information, only present in recent transcripts.
const SKIPPED_KINDS: &[&str] = &["debate.text", "subdebate.text"];

/// Leaf text-bearing elements.
const PARAGRAPH_KINDS: &[&str] = &["p", "para"];

/// Inherited state for one subtree.
#[derive(Debug, Clone, Default)]
struct WalkContext {
    debate_info: Arc<Vec<InfoMap>>,
    enclosing_tags: Arc<BTreeSet<String>>,
    fragment_number: i64,
    fragment_type: Option<String>,
}

/// One emitted paragraph with the context it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphFact {
    /// Descendant text, whitespace-collapsed.
    pub text: String,
    /// Raw speaker reference, as written in the transcript.
    pub speaker: Option<String>,
    pub debate_info: Arc<Vec<InfoMap>>,
    pub fragment_number: i64,
    pub fragment_type: Option<String>,
    pub enclosing_tags: Arc<BTreeSet<String>>,
}

/// Walk `root` and emit one fact per paragraph element, in document order.
pub fn walk(root: &Element) -> Vec<ParagraphFact> {
    let mut facts = Vec::new();
    let mut stack: Vec<(Arc<WalkContext>, &Element)> =
        vec![(Arc::new(WalkContext::default()), root)];

    let mut speaker: Option<String> = None;
    let mut fragment_counter: i64 = 0;

    while let Some((mut ctx, element)) = stack.pop() {
        let tag = element.name.as_str();

        if FRAGMENT_KINDS.contains(&tag) {
            fragment_counter += 1;
            ctx = Arc::new(WalkContext {
                fragment_number: fragment_counter,
                fragment_type: Some(tag.to_string()),
                ..(*ctx).clone()
            });
        }

        if let Some(debate_info) = next_debate_info(&ctx.debate_info, element) {
            speaker = None;
            ctx = Arc::new(WalkContext {
                debate_info: Arc::new(debate_info),
                ..(*ctx).clone()
            });
        } else if tag == "talker" {
            speaker = talker_reference(element);
        } else if SKIPPED_KINDS.contains(&tag) {
            continue;
        } else if PARAGRAPH_KINDS.contains(&tag) {
            if tag == "p" {
                if let Some(href) = element.find("a").and_then(|a| a.attr("href")) {
                    speaker = Some(href.to_string());
                }
            }

            facts.push(ParagraphFact {
                text: collapse_whitespace(&element.itertext()),
                speaker: speaker.clone(),
                debate_info: Arc::clone(&ctx.debate_info),
                fragment_number: ctx.fragment_number,
                fragment_type: ctx.fragment_type.clone(),
                enclosing_tags: Arc::clone(&ctx.enclosing_tags),
            });
            continue;
        }

        if !ctx.enclosing_tags.contains(tag) {
            let mut tags = (*ctx.enclosing_tags).clone();
            tags.insert(tag.to_string());
            ctx = Arc::new(WalkContext {
                enclosing_tags: Arc::new(tags),
                ..(*ctx).clone()
            });
        }

        for child in element.child_elements().rev() {
            stack.push((Arc::clone(&ctx), child));
        }
    }

    facts
}

/// The debate headings in force beneath `element`, if it introduces any.
///
/// A top-level debate starts from scratch; nested debates extend what their
/// parent opened.
fn next_debate_info(current: &[InfoMap], element: &Element) -> Option<Vec<InfoMap>> {
    let tag = element.name.as_str();
    if tag == "debate" {
        let info: Vec<InfoMap> = element
            .find_all("debateinfo")
            .chain(element.find_all("debate.info"))
            .map(info_map)
            .collect();
        Some(info)
    } else if SUBDEBATE_KINDS.contains(&tag) {
        let mut info = current.to_vec();
        info.extend(
            element
                .find_all("subdebateinfo")
                .chain(element.find_all("subdebateinfo.1"))
                .map(info_map),
        );
        Some(info)
    } else {
        None
    }
}

fn info_map(element: &Element) -> InfoMap {
    element
        .child_elements()
        .map(|child| (child.name.clone(), child.text().unwrap_or_default().to_string()))
        .collect()
}

/// A talker announces the speaker for what follows, by `name.id`.
fn talker_reference(talker: &Element) -> Option<String> {
    talker
        .find("name.id")
        .and_then(Element::text)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

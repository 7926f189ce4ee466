//! Repair pipeline that turns legacy SGML transcripts into parseable markup.
//!
//! Each pass is a function `&str -> String` applied in sequence. The legacy
//! dialect omits closing tags inconsistently and uses SGML named entities, so
//! the passes brute-force it into a shape an XML parser accepts.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Every legacy transcript opens with this root tag.
const ROOT_MARKER: &str = "<HANSARD";

/// Tags removed outright, open and close forms alike.
const UNBALANCED_TAGS: &[&str] = &[
    "chamber.xscript",
    "debate",
    "debate.sub1",
    "link",
    "meta",
    "para",
    "question",
    "row",
    "emsg",
    "graphic",
    "qwn",
    "talk.start",
    "speech",
    "emphasis",
    "spanspec",
    "proctext",
    "sso",
    "interject",
    "break",
    "colspec",
    "tab",
];

/// Named character references and their replacements.
///
/// The bare ampersand must stay last: alternation is leftmost-first, so every
/// named reference gets a chance to match before the catch-all escapes it.
const ENTITY_TABLE: &[(&str, &str)] = &[
    ("&half;", "½"),
    ("&frac34;", "¾"),
    ("&bull;", "•"),
    ("&yen;", "¥"),
    ("&mdash;", "—"),
    ("&cent;", "¢"),
    ("&frac23;", "⅔"),
    ("&hyphen;", "-"),
    ("&frac13;", "⅓"),
    ("&dagger;", "†"),
    ("&pound;", "£"),
    ("&sup2;", "²"),
    ("&frac14;", "¼"),
    ("&rsquo;", "’"),
    ("&", "&amp;"),
];

/// Run the full repair pipeline on a raw legacy transcript.
pub fn prepare(raw: &str) -> String {
    let mut result = chop_preamble(raw);

    result = strip_unbalanced_tags(&result);
    result = substitute_entities(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Discard the preamble
// ---------------------------------------------------------------------------

/// Drop the doctype and anything else before the root tag.
///
/// A document without the marker collapses to just the marker, which then
/// fails to parse as a per-document error.
pub fn chop_preamble(raw: &str) -> String {
    match raw.find(ROOT_MARKER) {
        Some(idx) => raw[idx..].to_string(),
        None => ROOT_MARKER.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pass 2: Remove tags that never balance
// ---------------------------------------------------------------------------

/// Remove every open or close tag from the fixed catalogue.
///
/// Matching is by prefix and case-insensitive, and a tag may span lines.
pub fn strip_unbalanced_tags(markup: &str) -> String {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        let alternatives = UNBALANCED_TAGS
            .iter()
            .map(|tag| regex::escape(tag))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?is)</?(?:{alternatives}).*?>")).expect("valid regex")
    });

    TAG_RE.replace_all(markup, "").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 3: Substitute named entities
// ---------------------------------------------------------------------------

/// Replace SGML named entities with literal characters in a single pass.
///
/// Replacement text is never rescanned, so the ampersand catch-all cannot
/// fire on anything a named reference produced.
pub fn substitute_entities(markup: &str) -> String {
    static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
        let alternatives = ENTITY_TABLE
            .iter()
            .map(|(entity, _)| regex::escape(entity))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&alternatives).expect("valid regex")
    });

    ENTITY_RE
        .replace_all(markup, |caps: &Captures<'_>| {
            let matched = &caps[0];
            ENTITY_TABLE
                .iter()
                .find(|(entity, _)| *entity == matched)
                .map_or(matched, |(_, replacement)| *replacement)
                .to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::parse_tree;

    #[test]
    fn preamble_is_discarded() {
        let raw = "<!DOCTYPE hansard SYSTEM \"hansard.dtd\">\n<HANSARD DATE=\"1998-03-02\"></HANSARD>";
        assert_eq!(
            chop_preamble(raw),
            "<HANSARD DATE=\"1998-03-02\"></HANSARD>"
        );
        assert_eq!(chop_preamble("<html>error</html>"), "<HANSARD");
    }

    #[test]
    fn catalogue_tags_are_removed_by_prefix() {
        let markup = "<DEBATE><PARA ID=\"1\">\nText<Break>more</para></debate>";
        assert_eq!(strip_unbalanced_tags(markup), "\nTextmore");

        // `tab` also takes out `table`, as the catalogue matches by prefix.
        assert_eq!(strip_unbalanced_tags("<table><b>x</b></TABLE>"), "<b>x</b>");
    }

    #[test]
    fn tags_spanning_lines_are_removed() {
        let markup = "<speech\n  ID=\"s1\"\n>words</speech>";
        assert_eq!(strip_unbalanced_tags(markup), "words");
    }

    #[test]
    fn named_entities_become_characters() {
        assert_eq!(
            substitute_entities("A &amp;hellip; B &yen; C"),
            "A &amp;amp;hellip; B ¥ C"
        );
        assert_eq!(
            substitute_entities("&half;&frac34;&mdash;&pound;&rsquo;"),
            "½¾—£’"
        );
    }

    #[test]
    fn catch_all_never_touches_substituted_text() {
        let out = substitute_entities("Minister for Trade & Industry &dagger;");
        assert_eq!(out, "Minister for Trade &amp; Industry †");
        assert!(!out.contains("&amp;dagger;"));
    }

    #[test]
    fn entity_fixture_parses_to_literal_characters() {
        let prepared = prepare("junk<HANSARD><P>A &amp;hellip; B &yen; C &frac14;</P></HANSARD>");
        let root = parse_tree(&prepared).unwrap();
        let p = root.find("P").unwrap();
        assert_eq!(p.itertext(), "A &amp;hellip; B ¥ C ¼");
    }

    #[test]
    fn repaired_fixture_parses() {
        let raw = include_str!("../../../../fixtures/legacy_transcript.sgm");
        let root = parse_tree(&prepare(raw)).unwrap();
        assert_eq!(root.name, "HANSARD");
    }
}

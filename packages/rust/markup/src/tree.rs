//! A minimal owned element tree built from `quick-xml` events.
//!
//! The normalizer needs random access to children (reverse pushes, direct
//! child lookups), so the streaming reader is folded into [`Element`]s first.

use hansard_shared::{HansardError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// A node in the element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its attributes and ordered children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Value of the attribute `key`, if present.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements, in document order.
    pub fn child_elements(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// First direct child named `name`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name == name)
    }

    /// Every direct child named `name`.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements().filter(move |el| el.name == name)
    }

    /// Text preceding the first child element, if any.
    pub fn text(&self) -> Option<&str> {
        match self.children.first() {
            Some(Node::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// All descendant text concatenated in document order.
    pub fn itertext(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<&Node> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => stack.extend(el.children.iter().rev()),
            }
        }
        out
    }

    /// Number of elements in this subtree, including `self`.
    pub fn count_elements(&self, pred: impl Fn(&Element) -> bool) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(el) = stack.pop() {
            if pred(el) {
                count += 1;
            }
            stack.extend(el.child_elements());
        }
        count
    }

    fn push_text(&mut self, text: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }
}

/// Parse well-formed markup into an element tree.
///
/// Declarations, comments, processing instructions, and doctypes are
/// dropped. Anything that is not a single well-formed root element is a
/// [`HansardError::Parse`].
pub fn parse_tree(text: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = true;

    let mut open: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            HansardError::parse(format!(
                "malformed markup at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(start) => {
                ensure_no_second_root(&root)?;
                open.push(start_element(&start)?);
            }
            Event::Empty(start) => {
                ensure_no_second_root(&root)?;
                let el = start_element(&start)?;
                close(el, &mut open, &mut root);
            }
            Event::End(_) => {
                let el = open
                    .pop()
                    .ok_or_else(|| HansardError::parse("closing tag without an open element"))?;
                close(el, &mut open, &mut root);
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| HansardError::parse(format!("bad character reference: {e}")))?;
                match open.last_mut() {
                    Some(parent) => parent.push_text(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(HansardError::parse("text outside the root element")),
                }
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                let text = String::from_utf8_lossy(&raw);
                if let Some(parent) = open.last_mut() {
                    parent.push_text(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(HansardError::parse(format!(
            "unexpected end of input inside <{}>",
            unclosed.name
        )));
    }

    root.ok_or_else(|| HansardError::parse("no root element"))
}

fn ensure_no_second_root(root: &Option<Element>) -> Result<()> {
    if root.is_some() {
        return Err(HansardError::parse("content after the root element"));
    }
    Ok(())
}

fn close(el: Element, open: &mut Vec<Element>, root: &mut Option<Element>) {
    match open.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => *root = Some(el),
    }
}

fn start_element(start: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr =
            attr.map_err(|e| HansardError::parse(format!("bad attribute on <{name}>: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| HansardError::parse(format!("bad attribute value on <{name}>: {e}")))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree() {
        let root = parse_tree(
            r#"<?xml version="1.0"?>
<hansard version="2.2">
  <session.header><date>2024-05-01</date></session.header>
  <p>Hello <b>big</b> world</p>
</hansard>"#,
        )
        .unwrap();

        assert_eq!(root.name, "hansard");
        assert_eq!(root.attr("version"), Some("2.2"));
        let header = root.find("session.header").unwrap();
        assert_eq!(header.find("date").unwrap().text(), Some("2024-05-01"));
        assert_eq!(root.find("p").unwrap().itertext(), "Hello big world");
    }

    #[test]
    fn unescapes_text_and_attributes() {
        let root = parse_tree(r#"<a title="x &amp; y">1 &lt; 2</a>"#).unwrap();
        assert_eq!(root.attr("title"), Some("x & y"));
        assert_eq!(root.text(), Some("1 < 2"));
    }

    #[test]
    fn empty_elements_are_children() {
        let root = parse_tree("<a><b/><c>t</c></a>").unwrap();
        let names: Vec<&str> = root.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b", "c"]);
        assert_eq!(root.count_elements(|_| true), 3);
    }

    #[test]
    fn mismatched_end_tag_is_parse_error() {
        let err = parse_tree("<a><b></a></b>").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn unclosed_element_is_parse_error() {
        let err = parse_tree("<a><b>text</b>").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn unknown_entity_is_parse_error() {
        assert!(parse_tree("<a>&hellip;</a>").is_err());
    }

    #[test]
    fn second_root_is_parse_error() {
        assert!(parse_tree("<a/><b/>").is_err());
        assert!(parse_tree("").is_err());
    }
}

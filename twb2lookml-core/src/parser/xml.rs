//! Minimal owned element tree over `quick-xml` events.
//!
//! The workbook walk needs random access (metadata records are matched
//! against columns, zones against worksheets), so the event stream is folded
//! into a small tree first and the typed walk works on that.

use crate::error::ParseError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Concatenated text and CDATA content, unescaped.
    pub text: String,
}

impl XmlElement {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, ignoring empty strings.
    pub fn attr_nonempty(&self, key: &str) -> Option<&str> {
        self.attr(key).filter(|v| !v.trim().is_empty())
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k == key)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a `/`-separated path of child names, first match at each step.
    pub fn path(&self, path: &str) -> Option<&XmlElement> {
        path.split('/')
            .try_fold(self, |node, step| node.child(step))
    }

    /// All descendants in document order (pre-order, excluding `self`).
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        let mut stack: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

fn start_element(
    document: &str,
    start: &BytesStart<'_>,
    position: u64,
) -> Result<XmlElement, ParseError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::malformed(document, position, e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::malformed(document, position, e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

/// Decode a complete document into its root element.
pub fn parse_document(document: &str, xml: &str) -> Result<XmlElement, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|e| ParseError::malformed(document, position, e.to_string()))?;

        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(ParseError::malformed(
                        document,
                        position,
                        "content after the root element",
                    ));
                }
                stack.push(start_element(document, &start, position)?);
            }
            Event::Empty(start) => {
                let element = start_element(document, &start, position)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => {
                        return Err(ParseError::malformed(
                            document,
                            position,
                            "content after the root element",
                        ))
                    }
                }
            }
            Event::End(end) => {
                let element = stack.pop().ok_or_else(|| {
                    ParseError::malformed(document, position, "unexpected closing tag")
                })?;
                if end.name().as_ref() != element.name.as_bytes() {
                    return Err(ParseError::malformed(
                        document,
                        position,
                        format!(
                            "closing tag '{}' does not match '{}'",
                            String::from_utf8_lossy(end.name().as_ref()),
                            element.name
                        ),
                    ));
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let unescaped = text
                        .unescape()
                        .map_err(|e| ParseError::malformed(document, position, e.to_string()))?;
                    current.text.push_str(&unescaped);
                }
            }
            Event::CData(cdata) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&cdata));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::malformed(
            document,
            reader.buffer_position() as u64,
            format!("unclosed element '{}'", open.name),
        ));
    }

    root.ok_or_else(|| {
        ParseError::malformed(document, reader.buffer_position() as u64, "no root element")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tree_with_text_and_attrs() {
        let root = parse_document(
            "t",
            r#"<?xml version='1.0'?><a x='1 &amp; 2'><b>hi <![CDATA[<raw>]]></b><c/></a>"#,
        )
        .unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1 & 2"));
        assert_eq!(root.child("b").map(|b| b.text.as_str()), Some("hi <raw>"));
        assert!(root.path("c").is_some());
        assert_eq!(root.descendants().len(), 2);
    }

    #[test]
    fn rejects_unclosed_and_mismatched() {
        let err = parse_document("t", "<a><b></a>").unwrap_err();
        assert!(matches!(err, ParseError::MalformedDocument { .. }));

        let err = parse_document("t", "<a><b>").unwrap_err();
        assert!(err.to_string().contains("unclosed") || err.to_string().contains("malformed"));

        let err = parse_document("t", "").unwrap_err();
        assert!(err.to_string().contains("no root element"));
    }

    #[test]
    fn descendants_are_preorder() {
        let root = parse_document("t", "<r><a><b/></a><c/></r>").unwrap();
        let names: Vec<&str> = root.descendants().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}

//! Minimal element tree over `quick-xml`.
//!
//! WFS servers disagree on namespace prefixes (`wfs:`, `gml:`, `ogc:`, `ows:`,
//! default namespaces, none at all), so lookups try the exact qualified name
//! first and fall back to matching the local name under any prefix.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{WfsError, WfsResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Qualified name as written, e.g. `wfs:member`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated direct text content.
    pub text: String,
}

impl Element {
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn is(&self, local: &str) -> bool {
        self.local_name().eq_ignore_ascii_case(local)
    }

    /// Attribute by qualified name, then by local name under any prefix.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .or_else(|| {
                let local = local_part(name);
                self.attributes
                    .iter()
                    .filter(|(key, _)| !key.starts_with("xmlns"))
                    .find(|(key, _)| local_part(key) == local)
            })
            .map(|(_, value)| value.as_str())
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// Text of this element and all of its descendants.
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out.trim().to_string()
    }

    /// Element children (direct) whose local name matches.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.is(local))
    }

    pub fn child(&self, local: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.is(local))
    }

    /// Descendants (including self) matching `name`. An exact qualified-name
    /// match wins; without one, any element with the same local name counts.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut exact = Vec::new();
        self.walk(&mut |element| {
            if element.name == name {
                exact.push(element);
            }
        });
        if !exact.is_empty() {
            return exact;
        }

        let local = local_part(name);
        let mut by_local = Vec::new();
        self.walk(&mut |element| {
            if element.local_name() == local {
                by_local.push(element);
            }
        });
        by_local
    }

    pub fn find_first(&self, name: &str) -> Option<&Element> {
        self.find_all(name).into_iter().next()
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Element)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

pub fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

fn collect_text(element: &Element, out: &mut String) {
    if !element.text.trim().is_empty() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(element.text.trim());
    }
    for child in &element.children {
        collect_text(child, out);
    }
}

/// Parse a document into its root element.
///
/// Fails with `Format` when the input is not well-formed or has no root.
pub fn parse_document(source: &str) -> WfsResult<Element> {
    let mut reader = Reader::from_str(source);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(open_element(&start)?),
            Ok(Event::Empty(start)) => {
                let element = open_element(&start)?;
                attach(element, &mut stack, &mut root)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| WfsError::Format("unbalanced closing tag".to_string()))?;
                attach(element, &mut stack, &mut root)?;
            }
            Ok(Event::Text(text)) => {
                let content = text.unescape()?;
                push_text(&mut stack, &content);
            }
            Ok(Event::CData(data)) => {
                let bytes = data.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&bytes));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(WfsError::Format(format!(
                    "invalid XML at position {}: {}",
                    reader.buffer_position(),
                    err
                )))
            }
        }
    }

    if !stack.is_empty() {
        return Err(WfsError::Format(format!(
            "unexpected end of document inside <{}>",
            stack.last().map(|element| element.name.as_str()).unwrap_or_default()
        )));
    }
    root.ok_or_else(|| WfsError::Format("document has no root element".to_string()))
}

fn open_element(start: &BytesStart<'_>) -> WfsResult<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute
            .map_err(|err| WfsError::Format(format!("invalid attribute on <{}>: {}", name, err)))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) -> WfsResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(WfsError::Format(format!(
                "second root element <{}>",
                element.name
            )))
        }
    }
    Ok(())
}

fn push_text(stack: &mut [Element], content: &str) {
    // Text outside the root (e.g. stray whitespace) is ignored.
    if let Some(current) = stack.last_mut() {
        if !current.text.is_empty() {
            current.text.push(' ');
        }
        current.text.push_str(content);
    }
}

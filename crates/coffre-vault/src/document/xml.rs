//! Minimal in-memory XML element tree on top of `quick-xml`.
//!
//! The whole input is parsed before any element is interpreted, so a
//! truncated or malformed file is rejected as a unit. Writing goes the other
//! way: the complete element tree is rendered into a `String` before anything
//! touches the destination file.

use std::io::Cursor;
use std::str;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::VaultError;

/// One element with its attributes, child elements and concatenated text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Builder form of [`Self::set_attribute`].
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Set or replace an attribute.
    pub fn set_attribute(&mut self, key: &str, value: &str) {
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value.to_string();
        } else {
            self.attributes.push((key.to_string(), value.to_string()));
        }
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Boolean attribute written as `"0"`/`"1"`. Absent means `false`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.attribute(key), Some("1" | "true"))
    }

    /// Set a `"0"`/`"1"` attribute.
    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.set_attribute(key, if value { "1" } else { "0" });
    }

    /// First child element called `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Append a child and return a handle to it.
    pub fn push_child(&mut self, child: Self) -> &mut Self {
        self.children.push(child);
        let last = self.children.len().saturating_sub(1);
        &mut self.children[last]
    }

    /// Parse `input` into its root element.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Xml`] for syntax errors, mismatched tags, an
    /// empty document, or input that ends with elements still open.
    pub fn parse(input: &str) -> Result<Self, VaultError> {
        let mut reader = Reader::from_str(input);
        let mut stack: Vec<Self> = Vec::new();
        let mut root: Option<Self> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    stack.push(element_from_start(e)?);
                }
                Ok(Event::Empty(ref e)) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| VaultError::Xml("unbalanced closing tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(ref e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| VaultError::Xml(format!("invalid text: {e}")))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    let bytes = e.into_inner();
                    let text = str::from_utf8(&bytes)
                        .map_err(|_| VaultError::Xml("invalid UTF-8 in CDATA".into()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(VaultError::Xml(format!(
                        "XML error at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
                Ok(_) => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(VaultError::Xml(format!(
                "unexpected end of document inside <{}>",
                open.name
            )));
        }
        root.ok_or_else(|| VaultError::Xml("document has no root element".into()))
    }

    /// Render this element as a complete XML document.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Xml`] if serialization fails.
    pub fn to_xml_string(&self) -> Result<String, VaultError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 4);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| VaultError::Xml(e.to_string()))?;
        write_element(&mut writer, self)?;
        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| VaultError::Xml(e.to_string()))
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement, VaultError> {
    let name = str::from_utf8(e.name().as_ref())
        .map_err(|_| VaultError::Xml("invalid UTF-8 in tag name".into()))?
        .to_string();
    let mut element = XmlElement::new(&name);
    for attr in e.attributes() {
        let attr = attr?;
        let key = str::from_utf8(attr.key.as_ref())
            .map_err(|_| VaultError::Xml("invalid UTF-8 in attribute name".into()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| VaultError::Xml(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), VaultError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(VaultError::Xml("more than one root element".into()))
    }
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &XmlElement,
) -> Result<(), VaultError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| VaultError::Xml(e.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| VaultError::Xml(e.to_string()))?;
    if element.children.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(|e| VaultError::Xml(e.to_string()))?;
    } else {
        for child in &element.children {
            write_element(writer, child)?;
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| VaultError::Xml(e.to_string()))
}

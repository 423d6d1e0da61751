//! Parsed markup tree.
//!
//! Mirrors the element model the corpus is authored against: every element
//! carries its leading `text` and the `tail` text that follows its closing
//! tag inside the parent. Subtrees are shared through `Arc` so registries and
//! indices can hold handles into a loaded file without copying it.

use std::fmt::Write as _;
use std::sync::Arc;

/// Tag of the synthetic element that owns a file's top-level elements.
pub const DOCUMENT_TAG: &str = "#document";

/// Tag names the registry, indexer, and expander dispatch on.
pub mod tags {
    pub const EVENT: &str = "event";
    pub const EVENT_LIST: &str = "eventList";
    pub const TEXT_LIST: &str = "textList";
    pub const TEXT: &str = "text";
    pub const CHOICE: &str = "choice";
    pub const SHIP: &str = "ship";
    pub const LOAD_EVENT: &str = "loadEvent";
    pub const LOAD_EVENT_LIST: &str = "loadEventList";
}

/// One element of a parsed markup file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Local tag name, namespace prefix stripped.
    pub tag: String,
    /// Attributes in source order, values unescaped.
    pub attrs: Vec<(String, String)>,
    /// Text between the opening tag and the first child.
    pub text: String,
    /// Text between this element's closing tag and the next sibling.
    pub tail: String,
    pub children: Vec<Arc<Element>>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k == key)
    }

    /// The `name` attribute, if present and non-empty.
    pub fn name(&self) -> Option<&str> {
        self.attr("name").filter(|v| !v.is_empty())
    }

    /// The `load` attribute, if present and non-empty.
    pub fn load(&self) -> Option<&str> {
        self.attr("load").filter(|v| !v.is_empty())
    }

    pub fn children_tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Arc<Element>> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub fn first_child(&self, tag: &str) -> Option<&Arc<Element>> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Pre-order walk over this element and all of its descendants.
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// Pre-order walk over the descendants only, yielding shared handles.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// All text pieces of the subtree in document order, tails included.
    pub fn itertext(&self) -> Vec<&str> {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts
    }

    fn collect_text<'a>(&'a self, parts: &mut Vec<&'a str>) {
        if !self.text.is_empty() {
            parts.push(&self.text);
        }
        for child in &self.children {
            child.collect_text(parts);
            if !child.tail.is_empty() {
                parts.push(&child.tail);
            }
        }
    }

    /// Visible text of the subtree: every piece trimmed, blanks dropped,
    /// joined by single spaces.
    pub fn gather_text(&self) -> String {
        self.itertext()
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Copy of the subtree that shares no storage with the original.
    pub fn deep_clone(&self) -> Element {
        Element {
            tag: self.tag.clone(),
            attrs: self.attrs.clone(),
            text: self.text.clone(),
            tail: self.tail.clone(),
            children: self
                .children
                .iter()
                .map(|c| Arc::new(c.deep_clone()))
                .collect(),
        }
    }

    /// Canonical serialization of the subtree (own tail excluded). Two
    /// subtrees with identical content serialize identically.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out);
        out
    }

    fn write_markup(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.tag);
        for (k, v) in &self.attrs {
            let _ = write!(out, " {}=\"{}\"", k, quick_xml::escape::escape(v.as_str()));
        }
        if self.text.is_empty() && self.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        out.push_str(&quick_xml::escape::escape(self.text.as_str()));
        for child in &self.children {
            child.write_markup(out);
            out.push_str(&quick_xml::escape::escape(child.tail.as_str()));
        }
        let _ = write!(out, "</{}>", self.tag);
    }
}

/// Iterator returned by [`Element::iter`].
pub struct Iter<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let el = self.stack.pop()?;
        self.stack.extend(el.children.iter().rev().map(|c| c.as_ref()));
        Some(el)
    }
}

/// Iterator returned by [`Element::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a Arc<Element>>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Arc<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        let el = self.stack.pop()?;
        self.stack.extend(el.children.iter().rev());
        Some(el)
    }
}

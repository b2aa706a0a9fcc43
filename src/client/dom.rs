//! Document port for the sync controller, and an in-memory implementation.

use std::collections::{BTreeMap, BTreeSet};

/// The slice of a browser document the controller touches.
///
/// Elements are addressed by id. `<time>` elements are addressed by their
/// position in document order.
pub trait DocumentHost {
    /// Whether an element with this id exists.
    fn has_element(&self, id: &str) -> bool;

    /// Create an empty element with `id` directly before `anchor_id`.
    ///
    /// Appends to the document if the anchor is missing.
    fn create_element_before(&mut self, id: &str, anchor_id: &str);

    /// Remove an element. No-op if absent.
    fn remove_element(&mut self, id: &str);

    /// Replace an element's text content.
    fn set_text(&mut self, id: &str, text: &str);

    /// Add or remove a class on an element.
    fn toggle_class(&mut self, id: &str, class: &str, on: bool);

    /// Set a form control's value.
    fn set_value(&mut self, id: &str, value: &str);

    /// Move focus to an element.
    fn focus(&mut self, id: &str);

    /// Replace the contents of `target_id` with an HTML fragment.
    ///
    /// If the fragment's root carries the same id it replaces the target
    /// itself.
    fn swap_fragment(&mut self, target_id: &str, html: &str);

    /// The `datetime` attribute of every `<time>` element, in document order.
    fn time_sources(&self) -> Vec<String>;

    /// Replace the visible text of the `index`-th `<time>` element.
    fn set_time_text(&mut self, index: usize, text: &str);
}

/// One element in a [`VirtualDocument`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualElement {
    pub text: String,
    pub value: String,
    pub classes: BTreeSet<String>,
    /// Raw HTML last swapped into this element
    pub inner_html: String,
}

/// A `<time>` element in a [`VirtualDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeNode {
    pub datetime: String,
    pub text: String,
}

/// In-memory document for tests and headless use.
///
/// Keeps element order so banner placement can be asserted. Swapped
/// fragments are scanned for `<time datetime="...">` elements; nothing else
/// in the markup is interpreted.
#[derive(Debug, Clone, Default)]
pub struct VirtualDocument {
    order: Vec<String>,
    elements: BTreeMap<String, VirtualElement>,
    times: Vec<TimeNode>,
    focused: Option<String>,
}

impl VirtualDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element with the given id.
    pub fn with_element(mut self, id: &str) -> Self {
        if !self.elements.contains_key(id) {
            self.order.push(id.to_string());
            self.elements.insert(id.to_string(), VirtualElement::default());
        }
        self
    }

    /// Append a `<time>` element whose visible text equals its source.
    pub fn with_time(mut self, datetime: &str) -> Self {
        self.times.push(TimeNode {
            datetime: datetime.to_string(),
            text: datetime.to_string(),
        });
        self
    }

    /// Look up an element.
    pub fn element(&self, id: &str) -> Option<&VirtualElement> {
        self.elements.get(id)
    }

    /// Element ids in document order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// All `<time>` elements.
    pub fn times(&self) -> &[TimeNode] {
        &self.times
    }

    /// Id of the focused element.
    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Number of elements with this id. Always zero or one.
    pub fn count(&self, id: &str) -> usize {
        self.order.iter().filter(|existing| *existing == id).count()
    }
}

impl DocumentHost for VirtualDocument {
    fn has_element(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    fn create_element_before(&mut self, id: &str, anchor_id: &str) {
        if self.elements.contains_key(id) {
            return;
        }
        let position = self
            .order
            .iter()
            .position(|existing| existing == anchor_id)
            .unwrap_or(self.order.len());
        self.order.insert(position, id.to_string());
        self.elements.insert(id.to_string(), VirtualElement::default());
    }

    fn remove_element(&mut self, id: &str) {
        if self.elements.remove(id).is_some() {
            self.order.retain(|existing| existing != id);
            if self.focused.as_deref() == Some(id) {
                self.focused = None;
            }
        }
    }

    fn set_text(&mut self, id: &str, text: &str) {
        if let Some(element) = self.elements.get_mut(id) {
            element.text = text.to_string();
        }
    }

    fn toggle_class(&mut self, id: &str, class: &str, on: bool) {
        if let Some(element) = self.elements.get_mut(id) {
            if on {
                element.classes.insert(class.to_string());
            } else {
                element.classes.remove(class);
            }
        }
    }

    fn set_value(&mut self, id: &str, value: &str) {
        if let Some(element) = self.elements.get_mut(id) {
            element.value = value.to_string();
        }
    }

    fn focus(&mut self, id: &str) {
        if self.elements.contains_key(id) {
            self.focused = Some(id.to_string());
        }
    }

    fn swap_fragment(&mut self, target_id: &str, html: &str) {
        let Some(element) = self.elements.get_mut(target_id) else {
            return;
        };
        element.inner_html = html.to_string();
        // Time elements are only ever rendered inside swapped fragments
        self.times = scan_times(html);
    }

    fn time_sources(&self) -> Vec<String> {
        self.times.iter().map(|time| time.datetime.clone()).collect()
    }

    fn set_time_text(&mut self, index: usize, text: &str) {
        if let Some(time) = self.times.get_mut(index) {
            time.text = text.to_string();
        }
    }
}

fn scan_times(html: &str) -> Vec<TimeNode> {
    const ATTR: &str = "datetime=\"";
    let mut times = Vec::new();
    let mut rest = html;
    while let Some(open) = rest.find("<time") {
        rest = &rest[open..];
        let Some(tag_end) = rest.find('>') else { break };
        let tag = &rest[..tag_end];
        if let Some(start) = tag.find(ATTR) {
            let value = &tag[start + ATTR.len()..];
            if let Some(end) = value.find('"') {
                let after = &rest[tag_end + 1..];
                let text = after.find("</time>").map(|close| &after[..close]).unwrap_or("");
                times.push(TimeNode {
                    datetime: value[..end].to_string(),
                    text: text.to_string(),
                });
            }
        }
        rest = &rest[tag_end..];
    }
    times
}

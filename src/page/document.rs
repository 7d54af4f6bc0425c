//! Mutable element tree parsed from HTML
//!
//! `scraper` gives us a read-only tree that cannot cross an await point, so
//! the parsed markup is copied into a small arena that supports the writes a
//! checkout page goes through: value edits, text re-renders, inserted and
//! removed nodes.

use scraper::{ElementRef, Html};

use crate::traits::{ElementHandle, ElementQuery, ElementSnapshot, Rect};
use crate::watch::DomMutation;

/// Elements whose content never renders
const NON_RENDERED_TAGS: &[&str] = &["head", "script", "style", "template", "noscript", "title"];

/// Elements that break rendered text into separate runs
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "br", "dd", "div", "dl", "dt", "fieldset", "footer", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "section",
    "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

#[derive(Debug, Clone)]
enum Child {
    Element(usize),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Child>,
    parent: Option<usize>,
    value: String,
    rect: Option<Rect>,
    attached: bool,
}

impl Node {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn input_type(&self) -> String {
        self.attr("type")
            .map_or_else(|| "text".to_string(), |t| t.trim().to_lowercase())
    }

    /// Declarations of the inline `style` attribute, lowercased
    fn style(&self, property: &str) -> Option<String> {
        self.attr("style")?
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .filter(|(key, _)| key.trim().eq_ignore_ascii_case(property))
            .map(|(_, value)| value.replace("!important", "").trim().to_lowercase())
            .last()
    }

    fn display_none(&self) -> bool {
        self.attr("hidden").is_some() || self.style("display").as_deref() == Some("none")
    }

    fn transparent(&self) -> bool {
        self.style("opacity")
            .and_then(|o| o.parse::<f64>().ok())
            .is_some_and(|o| o == 0.0)
    }

    fn matches(&self, query: ElementQuery) -> bool {
        let tag = self.tag.as_str();
        match query {
            ElementQuery::TextInputs => {
                tag == "input" && self.input_type() != "hidden" && self.attr("hidden").is_none()
            }
            ElementQuery::Clickables => match tag {
                "button" | "a" => true,
                "input" => matches!(self.input_type().as_str(), "submit" | "button"),
                "span" | "div" => self
                    .attr("role")
                    .is_some_and(|role| role.eq_ignore_ascii_case("button")),
                _ => false,
            },
            ElementQuery::ResetControls => match tag {
                "button" | "a" => true,
                "input" => matches!(self.input_type().as_str(), "submit" | "button"),
                _ => false,
            },
        }
    }
}

/// In-memory element tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: usize,
    journal: Vec<DomMutation>,
    clicks: Vec<ElementHandle>,
}

impl Document {
    /// Parse a full HTML document
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut document = Self {
            nodes: Vec::new(),
            root: 0,
            journal: Vec::new(),
            clicks: Vec::new(),
        };
        document.root = document.graft(parsed.root_element(), None);
        document
    }

    fn graft(&mut self, element: ElementRef<'_>, parent: Option<usize>) -> usize {
        let source = element.value();
        let index = self.nodes.len();
        self.nodes.push(Node {
            tag: source.name().to_lowercase(),
            attributes: source
                .attrs()
                .map(|(key, value)| (key.to_lowercase(), value.to_string()))
                .collect(),
            children: Vec::new(),
            parent,
            value: source.attr("value").unwrap_or_default().to_string(),
            rect: None,
            attached: true,
        });

        for child in element.children() {
            match child.value() {
                scraper::Node::Text(text) => {
                    self.nodes[index]
                        .children
                        .push(Child::Text(String::from(&**text)));
                }
                scraper::Node::Element(_) => {
                    if let Some(child_element) = ElementRef::wrap(child) {
                        let child_index = self.graft(child_element, Some(index));
                        self.nodes[index].children.push(Child::Element(child_index));
                    }
                }
                _ => {}
            }
        }

        index
    }

    fn node(&self, handle: ElementHandle) -> Option<&Node> {
        usize::try_from(handle.0)
            .ok()
            .and_then(|index| self.nodes.get(index))
            .filter(|node| node.attached)
    }

    fn node_mut(&mut self, handle: ElementHandle) -> Option<&mut Node> {
        usize::try_from(handle.0)
            .ok()
            .and_then(|index| self.nodes.get_mut(index))
            .filter(|node| node.attached)
    }

    fn handle(index: usize) -> ElementHandle {
        ElementHandle(index as u64)
    }

    pub fn is_attached(&self, handle: ElementHandle) -> bool {
        self.node(handle).is_some()
    }

    /// Attached elements in document order
    fn walk(&self) -> Vec<usize> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            order.push(index);
            for child in self.nodes[index].children.iter().rev() {
                if let Child::Element(child_index) = child {
                    stack.push(*child_index);
                }
            }
        }
        order
    }

    pub fn query(&self, query: ElementQuery) -> Vec<ElementHandle> {
        self.walk()
            .into_iter()
            .filter(|index| self.nodes[*index].matches(query))
            .map(Self::handle)
            .collect()
    }

    /// First attached element carrying the given `id` attribute
    pub fn find_by_id(&self, id: &str) -> Option<ElementHandle> {
        self.walk()
            .into_iter()
            .find(|index| self.nodes[*index].attr("id") == Some(id))
            .map(Self::handle)
    }

    /// Attached elements with the given tag, in document order
    pub fn find_by_tag(&self, tag: &str) -> Vec<ElementHandle> {
        self.walk()
            .into_iter()
            .filter(|index| self.nodes[*index].tag.eq_ignore_ascii_case(tag))
            .map(Self::handle)
            .collect()
    }

    pub fn value(&self, handle: ElementHandle) -> Option<&str> {
        self.node(handle).map(|node| node.value.as_str())
    }

    pub fn set_value(&mut self, handle: ElementHandle, value: &str) -> bool {
        match self.node_mut(handle) {
            Some(node) => {
                node.value = value.to_string();
                true
            }
            None => false,
        }
    }

    pub fn set_rect(&mut self, handle: ElementHandle, rect: Rect) {
        if let Some(node) = self.node_mut(handle) {
            node.rect = Some(rect);
        }
    }

    /// Replace an element's content with a single text node
    pub fn set_text(&mut self, handle: ElementHandle, text: &str) {
        let Some(index) = self.node(handle).map(|_| handle.0 as usize) else {
            return;
        };
        let removed = self.nodes[index].children.len();
        for child in std::mem::take(&mut self.nodes[index].children) {
            if let Child::Element(child_index) = child {
                self.detach(child_index);
            }
        }
        self.nodes[index].children.push(Child::Text(text.to_string()));
        self.journal.push(DomMutation::ChildList { added: 1, removed });
    }

    pub fn set_attribute(&mut self, handle: ElementHandle, name: &str, value: &str) {
        let Some(node) = self.node_mut(handle) else {
            return;
        };
        let name = name.to_lowercase();
        match node.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => node.attributes.push((name.clone(), value.to_string())),
        }
        let tag = node.tag.clone();
        self.journal.push(DomMutation::Attribute { tag, name });
    }

    /// Parse an HTML fragment and append its nodes to `parent`
    pub fn append_html(&mut self, parent: ElementHandle, html: &str) -> Vec<ElementHandle> {
        let Some(parent_index) = self.node(parent).map(|_| parent.0 as usize) else {
            return Vec::new();
        };

        let fragment = Html::parse_fragment(html);
        let mut added = Vec::new();
        for child in fragment.root_element().children() {
            match child.value() {
                scraper::Node::Text(text) => {
                    self.nodes[parent_index]
                        .children
                        .push(Child::Text(String::from(&**text)));
                }
                scraper::Node::Element(_) => {
                    if let Some(element) = ElementRef::wrap(child) {
                        let index = self.graft(element, Some(parent_index));
                        self.nodes[parent_index].children.push(Child::Element(index));
                        added.push(Self::handle(index));
                    }
                }
                _ => {}
            }
        }

        if !added.is_empty() {
            self.journal.push(DomMutation::ChildList {
                added: added.len(),
                removed: 0,
            });
        }
        added
    }

    /// Detach an element and its subtree from the document
    pub fn remove(&mut self, handle: ElementHandle) {
        let Some(index) = self.node(handle).map(|_| handle.0 as usize) else {
            return;
        };
        if let Some(parent) = self.nodes[index].parent {
            self.nodes[parent]
                .children
                .retain(|child| !matches!(child, Child::Element(i) if *i == index));
        }
        self.detach(index);
        self.journal.push(DomMutation::ChildList {
            added: 0,
            removed: 1,
        });
    }

    fn detach(&mut self, index: usize) {
        self.nodes[index].attached = false;
        let children: Vec<usize> = self.nodes[index]
            .children
            .iter()
            .filter_map(|child| match child {
                Child::Element(i) => Some(*i),
                Child::Text(_) => None,
            })
            .collect();
        for child in children {
            self.detach(child);
        }
    }

    pub(crate) fn record_click(&mut self, handle: ElementHandle) {
        self.clicks.push(handle);
    }

    /// Every element clicked so far, oldest first
    pub fn clicks(&self) -> &[ElementHandle] {
        &self.clicks
    }

    pub(crate) fn take_mutations(&mut self) -> Vec<DomMutation> {
        std::mem::take(&mut self.journal)
    }

    fn ancestors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(index), move |i| self.nodes[*i].parent)
    }

    fn rendered(&self, index: usize) -> bool {
        self.ancestors(index).all(|i| {
            let node = &self.nodes[i];
            !node.display_none() && !NON_RENDERED_TAGS.contains(&node.tag.as_str())
        })
    }

    fn visibility_hidden(&self, index: usize) -> bool {
        self.ancestors(index)
            .find_map(|i| self.nodes[i].style("visibility"))
            .is_some_and(|v| v == "hidden" || v == "collapse")
    }

    fn visible(&self, index: usize) -> bool {
        self.rendered(index) && !self.visibility_hidden(index) && !self.nodes[index].transparent()
    }

    fn text_content(&self, index: usize) -> String {
        let mut text = String::new();
        self.collect_text(index, &mut text);
        text
    }

    fn collect_text(&self, index: usize, out: &mut String) {
        for child in &self.nodes[index].children {
            match child {
                Child::Text(text) => out.push_str(text),
                Child::Element(child_index) => self.collect_text(*child_index, out),
            }
        }
    }

    /// Approximation of `innerText`: rendered text with collapsed whitespace
    pub fn visible_text(&self) -> String {
        let mut raw = String::new();
        self.collect_visible_text(self.root, &mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_visible_text(&self, index: usize, out: &mut String) {
        let node = &self.nodes[index];
        if node.display_none() || NON_RENDERED_TAGS.contains(&node.tag.as_str()) {
            return;
        }
        let block = BLOCK_TAGS.contains(&node.tag.as_str());
        if block {
            out.push(' ');
        }
        let hidden = self.visibility_hidden(index);
        for child in &node.children {
            match child {
                Child::Text(text) if !hidden => out.push_str(text),
                Child::Text(_) => {}
                Child::Element(child_index) => self.collect_visible_text(*child_index, out),
            }
        }
        if block {
            out.push(' ');
        }
    }

    fn element_siblings(&self, index: usize) -> (Option<usize>, Option<usize>) {
        let Some(parent) = self.nodes[index].parent else {
            return (None, None);
        };
        let siblings: Vec<usize> = self.nodes[parent]
            .children
            .iter()
            .filter_map(|child| match child {
                Child::Element(i) => Some(*i),
                Child::Text(_) => None,
            })
            .collect();
        let Some(position) = siblings.iter().position(|i| *i == index) else {
            return (None, None);
        };
        let previous = position.checked_sub(1).map(|p| siblings[p]);
        let next = siblings.get(position + 1).copied();
        (previous, next)
    }

    pub fn snapshot(&self, handle: ElementHandle) -> Option<ElementSnapshot> {
        let node = self.node(handle)?;
        let index = handle.0 as usize;
        let (previous, next) = self.element_siblings(index);
        let form = self
            .ancestors(index)
            .skip(1)
            .find(|i| self.nodes[*i].tag == "form");

        Some(ElementSnapshot {
            handle,
            tag: node.tag.clone(),
            attributes: node.attributes.clone(),
            text: self.text_content(index),
            value: node.value.clone(),
            visible: self.visible(index),
            rect: node.rect,
            parent: node.parent.map(Self::handle),
            previous_sibling: previous.map(Self::handle),
            next_sibling: next.map(Self::handle),
            form: form.map(Self::handle),
            parent_text: node.parent.map(|p| self.text_content(p)),
            previous_sibling_text: previous.map(|p| self.text_content(p)),
            next_sibling_text: next.map(|n| self.text_content(n)),
        })
    }
}

//! Arena-backed in-memory DOM.
//!
//! Nodes live in a flat arena and are addressed by [`NodeId`]. The arena never
//! frees nodes: detaching only unlinks them, which keeps handles stable for the
//! lifetime of the document.

use std::fmt;

use serde::Serialize;

use crate::error::DomError;

mod parse;
mod serialize;

/// Handle to a node of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Document,
    /// A document fragment. With a `host` it is that element's shadow root
    /// and shares its host's connectedness.
    Fragment { host: Option<NodeId> },
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// Set once a script element has been prepared, or when it came out of the
    /// parser. Such scripts never run.
    pub already_started: bool,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            already_started: false,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set or replace an attribute. Names are lowercased like `setAttribute`
    /// does for HTML elements.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attributes.push((name, value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// A document tree. The root is always the document node.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Comment(text.to_string()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.push(NodeData::Fragment { host: None })
    }

    /// Attach a shadow root to the element `host` and return it.
    pub fn attach_shadow(&mut self, host: NodeId) -> Result<NodeId, DomError> {
        if self.element(host).is_none() {
            return Err(DomError::Rejected(format!(
                "{} cannot host a shadow root",
                host
            )));
        }
        Ok(self.push(NodeData::Fragment { host: Some(host) }))
    }

    pub(crate) fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| DomError::UnknownNode(id.to_string()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| DomError::UnknownNode(id.to_string()))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).map(|n| &n.data)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.data(id) {
            Some(NodeData::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            Some(NodeData::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(name))
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        self.element(id)
            .map(|e| e.attributes.as_slice())
            .unwrap_or(&[])
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element(element) => {
                element.set_attribute(name, value);
                Ok(())
            }
            _ => Err(DomError::Rejected(format!("{} is not an element", id))),
        }
    }

    /// DOM `textContent`: the node's own data for text and comments, the
    /// concatenated descendant text for elements, `None` for the document.
    pub fn text_content(&self, id: NodeId) -> Option<String> {
        match self.data(id)? {
            NodeData::Document => None,
            NodeData::Text(text) | NodeData::Comment(text) => Some(text.clone()),
            NodeData::Element(_) | NodeData::Fragment { .. } => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                Some(out)
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in self.children(id) {
            match self.data(child) {
                Some(NodeData::Text(text)) => out.push_str(text),
                Some(NodeData::Element(_)) => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    /// DOM `textContent` setter: replaces an element's children with a single
    /// text node (none for the empty string).
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        match &mut self.node_mut(id)?.data {
            NodeData::Text(data) | NodeData::Comment(data) => {
                *data = text.to_string();
                return Ok(());
            }
            NodeData::Document => return Ok(()),
            NodeData::Element(_) | NodeData::Fragment { .. } => {}
        }

        let old = std::mem::take(&mut self.node_mut(id)?.children);
        for child in old {
            self.node_mut(child)?.parent = None;
        }
        if !text.is_empty() {
            let text = self.create_text(text);
            self.attach(id, text);
        }
        Ok(())
    }

    /// Documents, fragments and elements; text and comments are leaves.
    pub fn can_have_children(&self, id: NodeId) -> bool {
        matches!(
            self.data(id),
            Some(NodeData::Document | NodeData::Fragment { .. } | NodeData::Element(_))
        )
    }

    /// DOM `appendChild`: moves `child` (detaching it from any previous
    /// parent) to the end of `parent`'s children.
    ///
    /// Fragments are only ever parents here; inserting one is rejected.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.node(parent)?;
        if !self.can_have_children(parent) {
            return Err(DomError::HierarchyRequest(format!(
                "{} cannot have children",
                parent
            )));
        }
        match self.node(child)?.data {
            NodeData::Document => {
                return Err(DomError::HierarchyRequest(
                    "the document node cannot be inserted".to_string(),
                ));
            }
            NodeData::Fragment { .. } => {
                return Err(DomError::HierarchyRequest(format!(
                    "fragment {} cannot be inserted",
                    child
                )));
            }
            _ => {}
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest(format!(
                "{} is an ancestor of {}",
                child, parent
            )));
        }

        self.detach(child);
        self.attach(parent, child);
        Ok(())
    }

    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Parent, or the host when `id` is a shadow root.
    fn host_including_parent(&self, id: NodeId) -> Option<NodeId> {
        match self.data(id) {
            Some(NodeData::Fragment { host: Some(host) }) => Some(*host),
            _ => self.parent(id),
        }
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.host_including_parent(id);
        }
        false
    }

    /// Whether the node is in the document tree, crossing from shadow roots
    /// to their hosts.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(id) && self.is_inclusive_ancestor(self.root(), id)
    }
}

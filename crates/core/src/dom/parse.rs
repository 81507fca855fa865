use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{parse_document, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use super::{Document, ElementData, NodeData, NodeId};

/// Puts the tree builder in the "in body" insertion mode before the fragment
/// starts, so whitespace, comments and head-only elements land in `<body>` in
/// source order, the way a body-context fragment parse places them.
const BODY_CONTEXT: &str = "<!DOCTYPE html><body>";

impl Document {
    /// Parse an HTML fragment into detached nodes of this document.
    ///
    /// Script elements produced here are marked already started: like
    /// `innerHTML`, parsing never yields a runnable script.
    pub fn parse_fragment(&mut self, html: &str) -> Vec<NodeId> {
        let opts = ParseOpts {
            tree_builder: TreeBuilderOpts {
                drop_doctype: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut input = String::with_capacity(BODY_CONTEXT.len() + html.len());
        input.push_str(BODY_CONTEXT);
        input.push_str(html);

        let dom = parse_document(RcDom::default(), opts).one(input);

        let Some(body) = find_body(&dom.document) else {
            return Vec::new();
        };
        let children = body.children.borrow();
        children
            .iter()
            .filter_map(|child| self.import(child))
            .collect()
    }

    fn import(&mut self, handle: &Handle) -> Option<NodeId> {
        let mut template = None;
        let id = match &handle.data {
            RcNodeData::Element {
                name,
                attrs,
                template_contents,
                ..
            } => {
                let mut element = ElementData::new(&name.local);
                for attr in attrs.borrow().iter() {
                    element
                        .attributes
                        .push((qualified_name(&attr.name), attr.value.to_string()));
                }
                element.already_started = element.tag == "script";
                template = template_contents.borrow().clone();
                self.push(NodeData::Element(element))
            }
            RcNodeData::Text { contents } => self.push(NodeData::Text(contents.borrow().to_string())),
            RcNodeData::Comment { contents } => self.push(NodeData::Comment(contents.to_string())),
            // Doctypes and processing instructions have no place in a fragment.
            _ => return None,
        };

        // A template's parsed content hangs off a separate fragment; it is
        // kept as the template's children so it serializes in place.
        let source = template.unwrap_or_else(|| handle.clone());
        for child in source.children.borrow().iter() {
            if let Some(child_id) = self.import(child) {
                self.attach(id, child_id);
            }
        }
        Some(id)
    }
}

fn find_body(document: &Handle) -> Option<Handle> {
    let html = find_element(document, "html")?;
    find_element(&html, "body")
}

fn find_element(parent: &Handle, tag: &str) -> Option<Handle> {
    parent
        .children
        .borrow()
        .iter()
        .find(|child| match &child.data {
            RcNodeData::Element { name, .. } => &*name.local == tag,
            _ => false,
        })
        .cloned()
}

fn qualified_name(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", prefix, name.local),
        None => name.local.to_string(),
    }
}

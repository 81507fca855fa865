//! Rebuilding executable scripts from inert markup.
//!
//! A script element that came out of the fragment parser is marked as already
//! started and will never run, so it cannot be inserted as-is. Instead its
//! attributes and inline text are read into a [`ScriptDescriptor`] and a fresh
//! element is built from that.

use crate::error::{preview, DomError};
use crate::host::Host;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub attributes: Vec<(String, String)>,
    /// Inline source; only recorded when there is no `src` attribute.
    pub text: Option<String>,
}

impl ScriptDescriptor {
    /// Parse a script segment inertly and describe the script element in it.
    pub fn from_segment<H: Host>(host: &H, segment: &str) -> Result<Self, DomError> {
        let nodes = host.parse_fragment(segment)?;
        let inert = nodes
            .iter()
            .find(|node| host.tag_name(node).as_deref() == Some("script"))
            .ok_or_else(|| DomError::MissingScript(preview(segment)))?;
        Ok(Self::read(host, inert))
    }

    /// Describe an inert script element.
    pub fn read<H: Host>(host: &H, inert: &H::Node) -> Self {
        let attributes = host.attributes(inert);
        let has_src = attributes.iter().any(|(name, _)| name == "src");
        let text = if has_src {
            None
        } else {
            host.text_content(inert).filter(|text| !text.is_empty())
        };
        Self { attributes, text }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attribute("src")
    }

    /// `async` scripts are appended without waiting for them.
    pub fn is_async(&self) -> bool {
        self.attribute("async").is_some()
    }

    /// Build a new, execution-eligible script element carrying the same
    /// attributes and inline text. The element is returned detached.
    pub fn build<H: Host>(&self, host: &H) -> Result<H::Node, DomError> {
        let script = host.create_element("script")?;
        for (name, value) in &self.attributes {
            host.set_attribute(&script, name, value)?;
        }
        if let Some(text) = &self.text {
            host.set_text_content(&script, text)?;
        }
        Ok(script)
    }
}

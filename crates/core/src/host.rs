//! The seam between the sequencer and a document.
//!
//! A [`Host`] is everything the sequencer needs from its environment: an inert
//! HTML parser, element construction, attribute and text access, `appendChild`,
//! a way to observe a script's load/error signal and a one-shot timer. The
//! in-memory [`SimHost`](crate::sim::SimHost) and the browser binding in
//! `htmlsplice-wasm` both implement it.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::error::DomError;

/// How an appended script settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptOutcome {
    Loaded,
    Failed,
}

pub trait Host {
    /// Handle to a node of the host's document.
    type Node: Clone;

    /// Parse `html` without running any script it contains and return the
    /// top-level nodes, detached and in document order.
    fn parse_fragment(&self, html: &str) -> Result<Vec<Self::Node>, DomError>;

    /// Create a detached, execution-eligible element.
    fn create_element(&self, tag: &str) -> Result<Self::Node, DomError>;

    /// Whether `node` accepts children: elements, documents, fragments and
    /// shadow roots do, text and comments do not.
    fn can_have_children(&self, node: &Self::Node) -> bool;

    /// Lowercase tag name, or `None` when `node` is not an element.
    fn tag_name(&self, node: &Self::Node) -> Option<String>;

    /// Attributes of an element in document order; empty for other nodes.
    fn attributes(&self, node: &Self::Node) -> Vec<(String, String)>;

    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str) -> Result<(), DomError>;

    fn text_content(&self, node: &Self::Node) -> Option<String>;

    fn set_text_content(&self, node: &Self::Node, text: &str) -> Result<(), DomError>;

    /// Move `child` to the end of `parent`'s children.
    ///
    /// Appending a script element into the document is what starts it: inline
    /// scripts run before this returns, remote ones begin fetching.
    fn append_child(&self, parent: &Self::Node, child: &Self::Node) -> Result<(), DomError>;

    /// Resolve when an appended script fires load or error.
    ///
    /// Scripts without a `src` have already run by the time `append_child`
    /// returns and settle immediately. A script that never fires either signal
    /// never settles.
    fn script_settled(&self, script: &Self::Node) -> impl Future<Output = ScriptOutcome>;

    /// One-shot timer. Dropping the future before it fires cancels it.
    fn delay(&self, duration: Duration) -> impl Future<Output = ()>;
}

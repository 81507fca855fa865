//! A deterministic in-memory browser.
//!
//! [`SimHost`] owns a [`Document`] whose root stands for the live page. It
//! follows the browser's script preparation rules closely enough to exercise
//! the sequencer:
//! - an inline script runs the moment it is appended into the page;
//! - a script with `src` starts a fetch answered by a [`Resource`] rule;
//! - parser-created scripts and scripts of a non-JavaScript type never run.
//!
//! Time is tokio time, so tests on a paused clock see exact latencies.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::future::{pending, Future};
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, trace};

use crate::dom::{Document, NodeId};
use crate::error::DomError;
use crate::host::{Host, ScriptOutcome};

mod resource;

pub use resource::{parse_rule, Behavior, Resource, ResourceParseError};

const JAVASCRIPT_TYPES: &[&str] = &[
    "module",
    "text/javascript",
    "application/javascript",
    "application/ecmascript",
    "application/x-ecmascript",
    "application/x-javascript",
    "text/ecmascript",
    "text/jscript",
    "text/livescript",
    "text/x-ecmascript",
    "text/x-javascript",
];

/// One script execution (or failed fetch) observed by the simulated page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptRun {
    /// Position in the run log.
    pub order: usize,
    pub node: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Inline source text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub outcome: ScriptOutcome,
    /// Virtual milliseconds since the host was created.
    pub at_ms: u64,
}

#[derive(Debug, Clone)]
enum ScriptState {
    /// Inline script that ran on insertion.
    Executed,
    /// Script the page will never run.
    Ignored,
    Fetching(Fetch),
    Settled(ScriptOutcome),
}

#[derive(Debug, Clone)]
struct Fetch {
    src: String,
    due: Instant,
    behavior: Behavior,
}

type RunHook = Box<dyn FnMut(&ScriptRun)>;

pub struct SimHost {
    document: RefCell<Document>,
    resources: HashMap<String, Resource>,
    fallback: Resource,
    scripts: RefCell<HashMap<NodeId, ScriptState>>,
    runs: RefCell<Vec<ScriptRun>>,
    hooks: RefCell<Vec<RunHook>>,
    epoch: Instant,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// A page with no known resources; unknown URLs hang.
    pub fn new() -> Self {
        Self {
            document: RefCell::new(Document::new()),
            resources: HashMap::new(),
            fallback: Resource::hang(),
            scripts: RefCell::new(HashMap::new()),
            runs: RefCell::new(Vec::new()),
            hooks: RefCell::new(Vec::new()),
            epoch: Instant::now(),
        }
    }

    pub fn with_resource(mut self, src: impl Into<String>, resource: Resource) -> Self {
        self.resources.insert(src.into(), resource);
        self
    }

    /// Rule for URLs without an explicit resource.
    pub fn with_fallback(mut self, resource: Resource) -> Self {
        self.fallback = resource;
        self
    }

    /// Call `hook` for every script run, in order.
    pub fn on_run(&self, hook: impl FnMut(&ScriptRun) + 'static) {
        self.hooks.borrow_mut().push(Box::new(hook));
    }

    /// Create an element attached to the page, ready to be used as a container.
    pub fn container(&self, tag: &str) -> Result<NodeId, DomError> {
        let mut document = self.document.borrow_mut();
        let id = document.create_element(tag);
        let root = document.root();
        document.append_child(root, id)?;
        Ok(id)
    }

    /// Create a connected `tag` element with a shadow root and return the
    /// shadow root.
    pub fn shadow_container(&self, tag: &str) -> Result<NodeId, DomError> {
        let host = self.container(tag)?;
        self.document.borrow_mut().attach_shadow(host)
    }

    /// Create a detached document fragment.
    pub fn fragment(&self) -> NodeId {
        self.document.borrow_mut().create_fragment()
    }

    pub fn document(&self) -> Ref<'_, Document> {
        self.document.borrow()
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        self.document.borrow().inner_html(id)
    }

    /// The run log so far.
    pub fn runs(&self) -> Vec<ScriptRun> {
        self.runs.borrow().clone()
    }

    /// Fetches started but not yet settled, hanging ones included.
    pub fn pending_fetches(&self) -> usize {
        self.scripts
            .borrow()
            .values()
            .filter(|state| matches!(state, ScriptState::Fetching(_)))
            .count()
    }

    /// Complete every fetch nobody awaited (async scripts, scripts whose wait
    /// timed out) in the order they come due. Hanging fetches stay pending.
    /// Returns the number of fetches completed.
    pub async fn drain(&self) -> usize {
        let mut due: Vec<(Instant, NodeId)> = self
            .scripts
            .borrow()
            .iter()
            .filter_map(|(id, state)| match state {
                ScriptState::Fetching(fetch) if fetch.behavior != Behavior::Hang => {
                    Some((fetch.due, *id))
                }
                _ => None,
            })
            .collect();
        due.sort();

        for &(at, id) in &due {
            sleep_until(at).await;
            self.complete(id);
        }
        due.len()
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Browser "prepare the script element", run when a node is inserted.
    fn prepare_script(&self, id: NodeId) {
        let (src, script_type, source) = {
            let mut document = self.document.borrow_mut();
            if !document.is_connected(id) {
                return;
            }
            let source = document.text_content(id).unwrap_or_default();
            let Some(element) = document.element_mut(id) else {
                return;
            };
            if element.tag != "script" || element.already_started {
                return;
            }
            element.already_started = true;
            (
                element.attribute("src").map(str::to_owned),
                element.attribute("type").map(str::to_owned),
                source,
            )
        };

        let state = if !is_javascript_type(script_type.as_deref()) {
            trace!(node = %id, "script type is not JavaScript, ignoring");
            ScriptState::Ignored
        } else if let Some(src) = src {
            let resource = if src.is_empty() {
                Resource::fail(0)
            } else {
                self.resources.get(&src).copied().unwrap_or(self.fallback)
            };
            debug!(node = %id, src = %src, rule = %resource, "fetch started");
            ScriptState::Fetching(Fetch {
                src,
                due: Instant::now() + resource.latency,
                behavior: resource.behavior,
            })
        } else {
            if !source.is_empty() {
                self.record(id, None, Some(source), ScriptOutcome::Loaded);
            }
            ScriptState::Executed
        };

        self.scripts.borrow_mut().insert(id, state);
    }

    /// Settle a due fetch, recording the run. Idempotent.
    fn complete(&self, id: NodeId) -> ScriptOutcome {
        let fetch = match self.scripts.borrow().get(&id) {
            Some(ScriptState::Fetching(fetch)) => fetch.clone(),
            Some(ScriptState::Settled(outcome)) => return *outcome,
            _ => return ScriptOutcome::Loaded,
        };

        let outcome = match fetch.behavior {
            Behavior::Fail => ScriptOutcome::Failed,
            Behavior::Load | Behavior::Hang => ScriptOutcome::Loaded,
        };
        self.scripts
            .borrow_mut()
            .insert(id, ScriptState::Settled(outcome));
        self.record(id, Some(fetch.src), None, outcome);
        outcome
    }

    fn record(
        &self,
        node: NodeId,
        src: Option<String>,
        source: Option<String>,
        outcome: ScriptOutcome,
    ) {
        let run = {
            let mut runs = self.runs.borrow_mut();
            let run = ScriptRun {
                order: runs.len(),
                node,
                src,
                source,
                outcome,
                at_ms: self.elapsed_ms(),
            };
            runs.push(run.clone());
            run
        };
        debug!(order = run.order, node = %node, outcome = ?outcome, at_ms = run.at_ms, "script run");

        for hook in self.hooks.borrow_mut().iter_mut() {
            hook(&run);
        }
    }
}

fn is_javascript_type(script_type: Option<&str>) -> bool {
    match script_type.map(str::trim) {
        None | Some("") => true,
        Some(t) => JAVASCRIPT_TYPES.contains(&t.to_ascii_lowercase().as_str()),
    }
}

impl Host for SimHost {
    type Node = NodeId;

    fn parse_fragment(&self, html: &str) -> Result<Vec<NodeId>, DomError> {
        Ok(self.document.borrow_mut().parse_fragment(html))
    }

    fn create_element(&self, tag: &str) -> Result<NodeId, DomError> {
        Ok(self.document.borrow_mut().create_element(tag))
    }

    fn can_have_children(&self, node: &NodeId) -> bool {
        self.document.borrow().can_have_children(*node)
    }

    fn tag_name(&self, node: &NodeId) -> Option<String> {
        self.document.borrow().tag_name(*node).map(str::to_owned)
    }

    fn attributes(&self, node: &NodeId) -> Vec<(String, String)> {
        self.document.borrow().attributes(*node).to_vec()
    }

    fn set_attribute(&self, node: &NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.document.borrow_mut().set_attribute(*node, name, value)
    }

    fn text_content(&self, node: &NodeId) -> Option<String> {
        self.document.borrow().text_content(*node)
    }

    fn set_text_content(&self, node: &NodeId, text: &str) -> Result<(), DomError> {
        self.document.borrow_mut().set_text_content(*node, text)
    }

    fn append_child(&self, parent: &NodeId, child: &NodeId) -> Result<(), DomError> {
        self.document.borrow_mut().append_child(*parent, *child)?;
        trace!(parent = %parent, child = %child, "appended");
        self.prepare_script(*child);
        Ok(())
    }

    fn script_settled(&self, script: &NodeId) -> impl Future<Output = ScriptOutcome> {
        let id = *script;
        async move {
            let state = self.scripts.borrow().get(&id).cloned();
            match state {
                Some(ScriptState::Executed) => ScriptOutcome::Loaded,
                Some(ScriptState::Settled(outcome)) => outcome,
                Some(ScriptState::Fetching(fetch)) if fetch.behavior != Behavior::Hang => {
                    sleep_until(fetch.due).await;
                    self.complete(id)
                }
                Some(ScriptState::Fetching(_)) | Some(ScriptState::Ignored) | None => {
                    pending().await
                }
            }
        }
    }

    fn delay(&self, duration: Duration) -> impl Future<Output = ()> {
        sleep(duration)
    }
}

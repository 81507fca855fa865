//! Browser binding: `appendHtml` over the live DOM.
//!
//! ```js
//! import init, { appendHtml, initTracing } from "./htmlsplice_wasm.js";
//! await init();
//! initTracing(); // optional: script waits and timeouts go to the console
//! await appendHtml(html, document.getElementById("slot"), 2000);
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Once;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_channel::oneshot;
use htmlsplice_core::{AppendError, AppendOptions, DomError, Host, ScriptOutcome};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, EventTarget, HtmlTemplateElement, Node, Window};

/// [`Host`] backed by `window.document`.
pub struct WebHost {
    window: Window,
    document: Document,
}

impl WebHost {
    pub fn new() -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;
        Ok(Self { window, document })
    }
}

fn rejected(e: JsValue) -> DomError {
    DomError::Rejected(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

fn as_element(node: &Node) -> Result<&Element, DomError> {
    node.dyn_ref::<Element>()
        .ok_or_else(|| DomError::Rejected(format!("{} is not an element", node.node_name())))
}

impl Host for WebHost {
    type Node = Node;

    /// Parses through a `<template>`: its contents live in an inert document
    /// and scripts created by `innerHTML` are already marked as started.
    fn parse_fragment(&self, html: &str) -> Result<Vec<Node>, DomError> {
        let template = self
            .document
            .create_element("template")
            .map_err(rejected)?
            .dyn_into::<HtmlTemplateElement>()
            .map_err(|_| DomError::Rejected("template element unavailable".to_string()))?;
        template.set_inner_html(html);

        let content = template.content();
        let children = content.child_nodes();
        let nodes: Vec<Node> = (0..children.length())
            .filter_map(|i| children.get(i))
            .collect();
        for node in &nodes {
            content.remove_child(node).map_err(rejected)?;
        }
        Ok(nodes)
    }

    fn create_element(&self, tag: &str) -> Result<Node, DomError> {
        self.document
            .create_element(tag)
            .map(Node::from)
            .map_err(rejected)
    }

    fn can_have_children(&self, node: &Node) -> bool {
        matches!(
            node.node_type(),
            Node::ELEMENT_NODE | Node::DOCUMENT_NODE | Node::DOCUMENT_FRAGMENT_NODE
        )
    }

    fn tag_name(&self, node: &Node) -> Option<String> {
        node.dyn_ref::<Element>()
            .map(|element| element.local_name().to_ascii_lowercase())
    }

    fn attributes(&self, node: &Node) -> Vec<(String, String)> {
        let Some(element) = node.dyn_ref::<Element>() else {
            return Vec::new();
        };
        let attributes = element.attributes();
        (0..attributes.length())
            .filter_map(|i| attributes.item(i))
            .map(|attr| (attr.name(), attr.value()))
            .collect()
    }

    fn set_attribute(&self, node: &Node, name: &str, value: &str) -> Result<(), DomError> {
        as_element(node)?
            .set_attribute(name, value)
            .map_err(rejected)
    }

    fn text_content(&self, node: &Node) -> Option<String> {
        node.text_content()
    }

    fn set_text_content(&self, node: &Node, text: &str) -> Result<(), DomError> {
        node.set_text_content(Some(text));
        Ok(())
    }

    fn append_child(&self, parent: &Node, child: &Node) -> Result<(), DomError> {
        parent.append_child(child).map(|_| ()).map_err(rejected)
    }

    fn script_settled(&self, script: &Node) -> impl Future<Output = ScriptOutcome> {
        let inline = as_element(script)
            .map(|element| !element.has_attribute("src"))
            .unwrap_or(true);
        let listener = if inline {
            None
        } else {
            Some(LoadListener::new(script))
        };

        async move {
            match listener {
                None => ScriptOutcome::Loaded,
                Some(Ok(listener)) => listener.await,
                Some(Err(e)) => {
                    tracing::warn!(error = ?e, "could not observe script load");
                    ScriptOutcome::Failed
                }
            }
        }
    }

    fn delay(&self, duration: Duration) -> impl Future<Output = ()> {
        Timer::new(&self.window, duration)
    }
}

type Slot<T> = Rc<RefCell<Option<oneshot::Sender<T>>>>;

fn fire<T>(slot: &Slot<T>, value: T) {
    if let Some(sender) = slot.borrow_mut().take() {
        let _ = sender.send(value);
    }
}

/// Resolves on the first `load` or `error` event of a script element.
/// Both listeners are removed on drop.
struct LoadListener {
    target: EventTarget,
    on_load: Closure<dyn FnMut()>,
    on_error: Closure<dyn FnMut()>,
    receiver: oneshot::Receiver<ScriptOutcome>,
}

impl LoadListener {
    fn new(script: &Node) -> Result<Self, JsValue> {
        let (sender, receiver) = oneshot::channel();
        let slot: Slot<ScriptOutcome> = Rc::new(RefCell::new(Some(sender)));

        let load_slot = slot.clone();
        let on_load = Closure::wrap(
            Box::new(move || fire(&load_slot, ScriptOutcome::Loaded)) as Box<dyn FnMut()>
        );
        let on_error = Closure::wrap(
            Box::new(move || fire(&slot, ScriptOutcome::Failed)) as Box<dyn FnMut()>
        );

        let target: EventTarget = script.clone().into();
        target.add_event_listener_with_callback("load", on_load.as_ref().unchecked_ref())?;
        target.add_event_listener_with_callback("error", on_error.as_ref().unchecked_ref())?;

        Ok(Self {
            target,
            on_load,
            on_error,
            receiver,
        })
    }
}

impl Future for LoadListener {
    type Output = ScriptOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<ScriptOutcome> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(ScriptOutcome::Failed))
    }
}

impl Drop for LoadListener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback("load", self.on_load.as_ref().unchecked_ref());
        let _ = self
            .target
            .remove_event_listener_with_callback("error", self.on_error.as_ref().unchecked_ref());
    }
}

/// `setTimeout` as a future; dropping it calls `clearTimeout`.
struct Timer {
    window: Window,
    handle: Option<i32>,
    _callback: Closure<dyn FnMut()>,
    receiver: Option<oneshot::Receiver<()>>,
}

impl Timer {
    fn new(window: &Window, duration: Duration) -> Self {
        let (sender, receiver) = oneshot::channel();
        let slot: Slot<()> = Rc::new(RefCell::new(Some(sender)));
        let callback = Closure::wrap(Box::new(move || fire(&slot, ())) as Box<dyn FnMut()>);

        let handle = window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                timeout_millis(duration),
            )
            .map_err(|e| tracing::warn!(error = ?e, "setTimeout failed, firing immediately"))
            .ok();

        Self {
            window: window.clone(),
            receiver: handle.map(|_| receiver),
            handle,
            _callback: callback,
        }
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.receiver.as_mut() {
            Some(receiver) => Pin::new(receiver).poll(cx).map(|_| ()),
            None => Poll::Ready(()),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.window.clear_timeout_with_handle(handle);
        }
    }
}

fn timeout_millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

fn options(timeout_ms: Option<u32>) -> AppendOptions {
    match timeout_ms {
        Some(millis) => AppendOptions::with_timeout_ms(u64::from(millis)),
        None => AppendOptions::default(),
    }
}

fn to_js_error(err: AppendError) -> JsValue {
    let message = err.to_string();
    match err {
        AppendError::ScriptLoad { .. } => {
            let error = js_sys::Error::new(&message);
            error.set_name("ScriptLoadError");
            error.into()
        }
        AppendError::InvalidContainer(_) => js_sys::TypeError::new(&message).into(),
        AppendError::Dom(_) => js_sys::Error::new(&message).into(),
    }
}

/// Append `html` to `container`, executing its scripts in document order.
///
/// Resolves once the whole fragment is in place. Rejects with a
/// `ScriptLoadError` when a synchronous script fails to load, leaving the
/// nodes before it appended.
#[wasm_bindgen(js_name = appendHtml)]
pub async fn append_html(
    html: String,
    container: JsValue,
    timeout_ms: Option<u32>,
) -> Result<(), JsValue> {
    let container = container
        .dyn_into::<Node>()
        .map_err(|_| JsValue::from(js_sys::TypeError::new("container is not a DOM node")))?;
    let host = WebHost::new()?;

    let report = htmlsplice_core::append_html(&host, &html, &container, &options(timeout_ms))
        .await
        .map_err(to_js_error)?;
    tracing::debug!(
        nodes = report.nodes_appended,
        timed_out = report.timed_out(),
        "appendHtml finished"
    );
    Ok(())
}

/// Route this crate's `tracing` events to the browser console. Safe to call
/// more than once; only the first call installs the subscriber.
#[wasm_bindgen(js_name = initTracing)]
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = wasm_tracing::set_as_global_default();
    });
}

/// Wait limit used when `appendHtml` gets no timeout, in milliseconds.
#[wasm_bindgen(js_name = defaultScriptTimeout)]
pub fn default_script_timeout() -> u32 {
    htmlsplice_core::DEFAULT_SCRIPT_TIMEOUT.as_millis() as u32
}

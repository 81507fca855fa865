//! The append pipeline.
//!
//! Segments are processed strictly in source order. Markup is parsed and moved
//! into the container; each script segment is rebuilt as an executable element,
//! appended, and, unless it is `async`, awaited before the next segment starts.
//! A wait ends on the first of load, error or timeout: load and timeout let the
//! pipeline continue, error aborts it.

use std::pin::pin;
use std::time::Duration;

use futures::future::{select, Either};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{AppendError, DomError};
use crate::host::{Host, ScriptOutcome};
use crate::script::ScriptDescriptor;
use crate::split::{split_fragment, SegmentKind};

/// How long a synchronous script may take before the pipeline moves on.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Options for [`append_html`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOptions {
    /// Per-script wait limit. Reaching it is not an error.
    pub timeout: Duration,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }
}

impl AppendOptions {
    pub fn with_timeout_ms(millis: u64) -> Self {
        Self {
            timeout: Duration::from_millis(millis),
        }
    }
}

/// How the wait on an appended script ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitOutcome {
    Loaded,
    TimedOut,
    /// `async` script; the pipeline did not wait.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptReport {
    /// Index of the script's segment.
    pub segment: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    pub wait: WaitOutcome,
}

/// Summary of a successful append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppendReport {
    /// Segments the fragment was split into, empty ones included.
    pub segments: usize,
    /// Top-level nodes appended to the container, scripts included.
    pub nodes_appended: usize,
    pub scripts: Vec<ScriptReport>,
}

impl AppendReport {
    pub fn timed_out(&self) -> usize {
        self.scripts
            .iter()
            .filter(|s| s.wait == WaitOutcome::TimedOut)
            .count()
    }
}

/// Append `html` to `container`, running its scripts in document order.
///
/// Resolves once every segment has been appended and every non-async script
/// has loaded or timed out. The first script that fails to load aborts the
/// operation; everything appended before it stays in place.
pub async fn append_html<H: Host>(
    host: &H,
    html: &str,
    container: &H::Node,
    options: &AppendOptions,
) -> Result<AppendReport, AppendError> {
    if !host.can_have_children(container) {
        return Err(AppendError::InvalidContainer(
            "container cannot have children".to_string(),
        ));
    }

    let segments = split_fragment(html);
    debug!(
        segments = segments.len(),
        timeout_ms = options.timeout.as_millis() as u64,
        "appending fragment"
    );

    let mut report = AppendReport {
        segments: segments.len(),
        ..Default::default()
    };

    for (index, segment) in segments.iter().enumerate() {
        match segment.kind {
            SegmentKind::Markup => {
                report.nodes_appended += append_markup(host, segment.text, container)?;
            }
            SegmentKind::Script => {
                let script =
                    append_script(host, index, segment.text, container, options.timeout).await?;
                report.nodes_appended += 1;
                report.scripts.push(script);
            }
        }
    }

    Ok(report)
}

/// Parse a markup segment and move its nodes into `container`.
/// Returns the number of top-level nodes appended.
pub fn append_markup<H: Host>(
    host: &H,
    markup: &str,
    container: &H::Node,
) -> Result<usize, DomError> {
    if markup.is_empty() {
        return Ok(0);
    }
    let nodes = host.parse_fragment(markup)?;
    for node in &nodes {
        host.append_child(container, node)?;
    }
    trace!(nodes = nodes.len(), "appended markup");
    Ok(nodes.len())
}

/// Rebuild a script segment as an executable element, append it and wait for
/// it unless it is `async`.
pub async fn append_script<H: Host>(
    host: &H,
    segment: usize,
    source: &str,
    container: &H::Node,
    timeout: Duration,
) -> Result<ScriptReport, AppendError> {
    let descriptor = ScriptDescriptor::from_segment(host, source)?;
    let script = descriptor.build(host)?;
    host.append_child(container, &script)?;

    let src = descriptor.src().map(str::to_owned);
    if descriptor.is_async() {
        debug!(segment, src = ?src, "async script appended");
        return Ok(ScriptReport {
            segment,
            src,
            wait: WaitOutcome::Skipped,
        });
    }

    let wait = match wait_for_script(host, &script, timeout).await {
        Settlement::Loaded => WaitOutcome::Loaded,
        Settlement::TimedOut => {
            warn!(segment, src = ?src, "script did not settle in time, continuing");
            WaitOutcome::TimedOut
        }
        Settlement::Failed => {
            debug!(segment, src = ?src, "script failed to load");
            return Err(AppendError::ScriptLoad { segment, src });
        }
    };
    debug!(segment, src = ?src, wait = ?wait, "script settled");

    Ok(ScriptReport { segment, src, wait })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Loaded,
    Failed,
    TimedOut,
}

/// Race the script's settlement against the timer. The losing future is
/// dropped, which cancels the timer or the listeners.
async fn wait_for_script<H: Host>(host: &H, script: &H::Node, timeout: Duration) -> Settlement {
    let settled = pin!(host.script_settled(script));
    let timer = pin!(host.delay(timeout));

    match select(settled, timer).await {
        Either::Left((ScriptOutcome::Loaded, _)) => Settlement::Loaded,
        Either::Left((ScriptOutcome::Failed, _)) => Settlement::Failed,
        Either::Right(((), _)) => Settlement::TimedOut,
    }
}

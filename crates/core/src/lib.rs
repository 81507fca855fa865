//! Append HTML fragments to a container the way a page load would.
//!
//! Markup and `<script>` elements are appended in source order, and every
//! non-`async` script has to load (or time out) before anything after it is
//! touched. Scripts are rebuilt from inert markup so they actually execute.
//!
//! ```
//! use htmlsplice_core::{split_fragment, SegmentKind};
//!
//! let segments = split_fragment("<p>a</p><script>go()</script>");
//! assert_eq!(segments.len(), 3);
//! assert_eq!(segments[1].kind, SegmentKind::Script);
//! ```

pub mod dom;
pub mod error;
pub mod host;
pub mod script;
pub mod sequencer;
#[cfg(feature = "sim")]
pub mod sim;
pub mod split;

pub use error::{AppendError, DomError};
pub use host::{Host, ScriptOutcome};
pub use script::ScriptDescriptor;
pub use sequencer::{
    append_html, append_markup, append_script, AppendOptions, AppendReport, ScriptReport,
    WaitOutcome, DEFAULT_SCRIPT_TIMEOUT,
};
pub use split::{count_scripts, split_fragment, Segment, SegmentKind};

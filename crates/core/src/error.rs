//! Error types.

use std::fmt;

/// A DOM operation the host refused or could not perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The handle does not name a node the host knows about.
    UnknownNode(String),
    /// The insertion would produce an invalid tree.
    HierarchyRequest(String),
    /// A script segment parsed to nodes without a script element.
    MissingScript(String),
    /// The host rejected the call (for example a thrown DOM exception).
    Rejected(String),
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomError::UnknownNode(node) => write!(f, "Unknown node: {}", node),
            DomError::HierarchyRequest(e) => write!(f, "Hierarchy request error: {}", e),
            DomError::MissingScript(segment) => {
                write!(f, "Script segment has no script element: {}", segment)
            }
            DomError::Rejected(e) => write!(f, "DOM operation rejected: {}", e),
        }
    }
}

impl std::error::Error for DomError {}

/// Failure of an append operation.
///
/// Nodes appended before the failure stay in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    /// A synchronous script fired its error signal.
    ScriptLoad {
        /// Index of the script's segment in the split fragment.
        segment: usize,
        src: Option<String>,
    },
    /// The container handle cannot receive children.
    InvalidContainer(String),
    Dom(DomError),
}

impl fmt::Display for AppendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppendError::ScriptLoad {
                segment,
                src: Some(src),
            } => write!(f, "Script {} (segment {}) failed to load", src, segment),
            AppendError::ScriptLoad { segment, src: None } => {
                write!(f, "Inline script (segment {}) failed", segment)
            }
            AppendError::InvalidContainer(e) => write!(f, "Invalid container: {}", e),
            AppendError::Dom(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AppendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppendError::Dom(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DomError> for AppendError {
    fn from(e: DomError) -> Self {
        AppendError::Dom(e)
    }
}

/// First characters of a segment, for error messages.
pub(crate) fn preview(text: &str) -> String {
    const LIMIT: usize = 60;
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

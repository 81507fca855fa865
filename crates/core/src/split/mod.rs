//! Fragment splitting.
//!
//! A fragment is cut into alternating markup and script segments. The cut is
//! purely textual: script segments are the exact substrings of every
//! `<script ...>...</script>` element and the markup segments are whatever lies
//! between them, so concatenating every segment's text gives back the input.
//!
//! The tag name must be followed by whitespace, `/` or `>`, so `<scripts>` stays
//! markup. Matching is case-insensitive and the body is captured lazily up to
//! the first closing tag, which means an opening tag without a closing tag is
//! left in markup, and a nested `<script>` ends at the first `</script>`.

use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::Serialize;

static SCRIPT_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[\s/>].*?</script\s*>").expect("script pattern is valid")
});

/// What a segment holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Markup,
    Script,
}

/// A slice of the input fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    pub text: &'a str,
    /// Byte offset of `text` in the fragment.
    pub offset: usize,
}

impl<'a> Segment<'a> {
    pub fn markup(text: &'a str, offset: usize) -> Self {
        Self {
            kind: SegmentKind::Markup,
            text,
            offset,
        }
    }

    pub fn script(text: &'a str, offset: usize) -> Self {
        Self {
            kind: SegmentKind::Script,
            text,
            offset,
        }
    }

    pub fn is_script(&self) -> bool {
        self.kind == SegmentKind::Script
    }

    /// Empty markup segments are no-ops for the appender.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Split `html` into ordered segments.
///
/// The result always starts and ends with a markup segment and alternates in
/// between, so a fragment with `n` scripts yields `2n + 1` segments. Markup
/// segments may be empty.
pub fn split_fragment(html: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for found in SCRIPT_ELEMENT.find_iter(html) {
        // The pattern has no backtracking constructs, so matching cannot fail;
        // if it ever did the remainder is kept as markup.
        let Ok(found) = found else { break };
        segments.push(Segment::markup(&html[cursor..found.start()], cursor));
        segments.push(Segment::script(found.as_str(), found.start()));
        cursor = found.end();
    }
    segments.push(Segment::markup(&html[cursor..], cursor));

    segments
}

/// Number of script segments in a split fragment.
pub fn count_scripts(segments: &[Segment<'_>]) -> usize {
    segments.iter().filter(|s| s.is_script()).count()
}

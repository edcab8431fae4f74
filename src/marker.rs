//! Ticket reference marker carried in processed message subjects.

use std::sync::LazyLock;

use regex::Regex;

/// Marker prepended to the subject once a ticket has been opened.
pub const MARKER: &str = "Ticket opened";

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("(?i){}", regex::escape(MARKER))).expect("marker pattern is valid")
});

/// Does this subject already carry the "ticket opened" marker?
///
/// Matches anywhere in the subject, ignoring case. Empty subjects are
/// never marked.
pub fn has_marker(subject: &str) -> bool {
    MARKER_RE.is_match(subject)
}

/// Build the subject written back after a ticket is created.
pub fn mark_subject(subject: &str) -> String {
    format!("{MARKER} - {subject}")
}

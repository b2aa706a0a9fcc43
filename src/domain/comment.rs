//! Comments as stored and rendered.

use chrono::{DateTime, SecondsFormat, Utc};

/// A posted comment. The body is already escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    pub author: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl CommentRecord {
    /// Machine-readable UTC instant used as the `datetime` attribute.
    pub fn datetime_attr(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// One page of a room's comments, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPage {
    pub comments: Vec<CommentRecord>,
    pub current_page: usize,
    pub total_pages: usize,
}

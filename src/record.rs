//! Harvested record and page types shared by the source client, controller, and sink.

use std::fmt;

/// Opaque continuation token handed out by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    /// Wraps a raw continuation token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for the next request.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One item as returned by the source, before the controller numbers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Display name of the author.
    pub author: String,
    /// Body text, kept byte-for-byte as received.
    pub text: String,
    /// Creation time exactly as the source rendered it, e.g.
    /// `Mon Jan 01 10:00:00 +0300 2024`. Never reparsed or normalized.
    pub created_at: String,
    /// Share/repost count.
    pub retweets: u64,
    /// Like/favorite count.
    pub likes: u64,
}

/// A record paired with the sequence number the controller assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedRecord {
    /// 1-based position in harvest order.
    pub sequence: u64,
    /// The harvested item.
    pub record: Record,
}

impl SequencedRecord {
    /// Pairs a record with its sequence number.
    pub fn new(sequence: u64, record: Record) -> Self {
        Self { sequence, record }
    }
}

/// One batch of records plus the token for the following batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    records: Vec<Record>,
    next_cursor: Option<Cursor>,
}

impl Page {
    /// Builds a page from its records and optional continuation token.
    pub fn new(records: Vec<Record>, next_cursor: Option<Cursor>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    /// An empty page with no continuation; signals exhaustion.
    pub fn exhausted() -> Self {
        Self::default()
    }

    /// Records in source order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records on the page.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the page carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Token for the next page, if the source offered one.
    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next_cursor.as_ref()
    }

    /// Splits the page into its records and continuation token.
    pub fn into_parts(self) -> (Vec<Record>, Option<Cursor>) {
        (self.records, self.next_cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_displays_raw_token() {
        let cursor = Cursor::new("DAABCgABF");
        assert_eq!(cursor.to_string(), "DAABCgABF");
        assert_eq!(cursor.as_str(), "DAABCgABF");
    }

    #[test]
    fn exhausted_page_has_no_cursor() {
        let page = Page::exhausted();
        assert!(page.is_empty());
        assert!(page.next_cursor().is_none());
    }
}

//! Aggregated response documents

use serde::Serialize;

/// Ordered text fragments forming one markdown answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseDocument {
    fragments: Vec<String>,
}

impl ResponseDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next fragment in arrival order
    pub fn push(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    /// The fragments received so far
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Concatenated markdown text
    pub fn text(&self) -> String {
        self.fragments.concat()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(|f| f.is_empty())
    }

    /// Total length of the text in bytes
    pub fn len(&self) -> usize {
        self.fragments.iter().map(String::len).sum()
    }
}

impl<S: Into<String>> FromIterator<S> for ResponseDocument {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            fragments: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_concatenate_in_order() {
        let mut doc = ResponseDocument::new();
        doc.push("Hel");
        doc.push("lo, ");
        doc.push("world");
        assert_eq!(doc.text(), "Hello, world");
        assert_eq!(doc.len(), 12);
        assert_eq!(doc.fragments().len(), 3);
    }

    #[test]
    fn test_empty_fragments_are_empty() {
        let doc: ResponseDocument = ["", ""].into_iter().collect();
        assert!(doc.is_empty());
        assert!(ResponseDocument::new().is_empty());
    }
}

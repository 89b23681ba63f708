//! Append-only accumulator for the document being streamed.

/// Owns the growing document text of one session.
///
/// Chunks are appended exactly as they arrive: no reordering, no
/// deduplication, no trimming. Snapshots borrow the full text, so a reader
/// always sees every chunk appended so far and never half of one.
#[derive(Debug, Default, Clone)]
pub struct Assembler {
    text: String,
    chunks: usize,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk. Amortised O(len of chunk).
    pub fn append(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.chunks += 1;
    }

    /// The full accumulated text.
    pub fn snapshot(&self) -> &str {
        &self.text
    }

    /// Clear everything. Only called when a session starts or is cancelled.
    pub fn reset(&mut self) {
        self.text.clear();
        self.chunks = 0;
    }

    /// Number of chunks appended since the last reset.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Consume the assembler, yielding the accumulated text.
    pub fn into_text(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_order() {
        let mut a = Assembler::new();
        a.append("# Hi");
        a.append("\nworld");
        assert_eq!(a.snapshot(), "# Hi\nworld");
        assert_eq!(a.chunk_count(), 2);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut a = Assembler::new();
        a.append("la");
        a.append("la");
        a.append("");
        assert_eq!(a.snapshot(), "lala");
        assert_eq!(a.chunk_count(), 3);
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let mut a = Assembler::new();
        a.append("x");
        let first = a.snapshot().to_string();
        assert_eq!(a.snapshot(), first);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn reset_clears() {
        let mut a = Assembler::new();
        a.append("stale");
        a.reset();
        assert!(a.is_empty());
        assert_eq!(a.chunk_count(), 0);
        a.append("fresh");
        assert_eq!(a.into_text(), "fresh");
    }
}

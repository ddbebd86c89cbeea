//! Bounded replay buffer for session output.

/// Maximum characters of output retained per session for catch-up replay.
pub const MAX_REPLAY_CHARS: usize = 10_000;

/// Append-only text buffer that discards its oldest characters once full.
///
/// The cap is counted in characters, not bytes, and trimming always lands on
/// a char boundary so the retained tail stays valid UTF-8.
#[derive(Debug)]
pub struct ReplayBuffer {
    text: String,
    chars: usize,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            capacity,
        }
    }

    /// Append a chunk, trimming from the front to stay within capacity.
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.chars += chunk.chars().count();

        if self.chars > self.capacity {
            let excess = self.chars - self.capacity;
            let cut = self
                .text
                .char_indices()
                .nth(excess)
                .map_or(self.text.len(), |(idx, _)| idx);
            self.text.drain(..cut);
            self.chars = self.capacity.min(self.chars);
        }
    }

    /// Current buffer contents, oldest first.
    pub fn snapshot(&self) -> String {
        self.text.clone()
    }

    pub const fn char_count(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn retains_everything_under_capacity() {
        let mut buf = ReplayBuffer::new(100);
        buf.push("hello ");
        buf.push("world");
        assert_eq!(buf.snapshot(), "hello world");
        assert_eq!(buf.char_count(), 11);
    }

    #[test]
    fn trims_oldest_first_at_capacity() {
        let mut buf = ReplayBuffer::new(5);
        buf.push("abcdef");
        assert_eq!(buf.snapshot(), "bcdef");

        buf.push("gh");
        assert_eq!(buf.snapshot(), "defgh");
        assert_eq!(buf.char_count(), 5);
    }

    #[test]
    fn oversized_single_chunk_keeps_tail() {
        let mut buf = ReplayBuffer::new(4);
        buf.push("0123456789");
        assert_eq!(buf.snapshot(), "6789");
    }

    #[test]
    fn trim_respects_multibyte_boundaries() {
        let mut buf = ReplayBuffer::new(3);
        buf.push("aé漢x");
        assert_eq!(buf.snapshot(), "é漢x");
        assert_eq!(buf.char_count(), 3);
    }

    #[test]
    fn capacity_holds_across_many_appends() {
        let mut buf = ReplayBuffer::new(MAX_REPLAY_CHARS);
        for i in 0..1000 {
            buf.push(&format!("line {i}\n"));
            assert!(buf.char_count() <= MAX_REPLAY_CHARS);
        }
        assert_eq!(buf.char_count(), MAX_REPLAY_CHARS);
        assert!(buf.snapshot().ends_with("line 999\n"));
    }
}

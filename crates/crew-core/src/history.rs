//! Bounded in-memory message history.

use std::collections::VecDeque;

use crate::event::ChatMessage;

/// Default number of chat messages kept in memory.
pub const DEFAULT_CAPACITY: usize = 100;

/// Append-only FIFO of chat messages, capped at `capacity`.
///
/// Insertion order is arrival order. When full, appending evicts the oldest
/// entry.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
    /// Messages ever appended, evicted ones included. Poll cursors count
    /// against this, so they stay valid after eviction starts.
    appended: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
            appended: 0,
        }
    }

    /// Append a message, evicting the oldest one if at capacity.
    pub fn append(&mut self, message: ChatMessage) {
        self.appended += 1;
        if self.capacity == 0 {
            return;
        }
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// The last `min(k, len)` messages, oldest first.
    pub fn tail(&self, k: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(k);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// Up to `limit` messages appended after cursor `after`, oldest first,
    /// plus the cursor to poll from next.
    ///
    /// Cursors count every message ever appended. A cursor that points at
    /// evicted messages resumes from the oldest one still held.
    pub fn page(&self, after: usize, limit: usize) -> (Vec<ChatMessage>, usize) {
        let evicted = self.appended - self.messages.len();
        let start = after.saturating_sub(evicted).min(self.messages.len());
        let page: Vec<ChatMessage> = self.messages.iter().skip(start).take(limit).cloned().collect();
        let cursor = evicted + start + page.len();
        (page, cursor)
    }

    /// Messages ever appended, evicted ones included.
    pub fn appended(&self) -> usize {
        self.appended
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Source;
    use crate::roster::Roster;

    fn msg(text: &str) -> ChatMessage {
        let roster = Roster::crew();
        ChatMessage::new(
            roster.resolve("G").unwrap(),
            text.to_string(),
            Vec::new(),
            false,
            Source::Interactive,
        )
    }

    fn texts(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.message.as_str()).collect()
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut history = HistoryBuffer::new(5);
        for i in 0..12 {
            history.append(msg(&i.to_string()));
            assert!(history.len() <= 5);
        }
        assert_eq!(history.len(), 5);
        assert_eq!(texts(&history.tail(5)), ["7", "8", "9", "10", "11"]);
    }

    #[test]
    fn tail_returns_most_recent_in_order() {
        let mut history = HistoryBuffer::default();
        for text in ["a", "b", "c", "d"] {
            history.append(msg(text));
        }
        assert_eq!(texts(&history.tail(2)), ["c", "d"]);
        assert_eq!(texts(&history.tail(10)), ["a", "b", "c", "d"]);
        assert!(history.tail(0).is_empty());
    }

    #[test]
    fn default_capacity_stabilises_at_one_hundred() {
        let mut history = HistoryBuffer::default();
        for i in 0..151 {
            history.append(msg(&format!("m{i}")));
        }
        assert_eq!(history.len(), DEFAULT_CAPACITY);
        let all = history.tail(DEFAULT_CAPACITY);
        assert_eq!(all.first().unwrap().message, "m51");
        assert_eq!(all.last().unwrap().message, "m150");
    }

    #[test]
    fn page_walks_from_cursor() {
        let mut history = HistoryBuffer::new(10);
        for text in ["a", "b", "c", "d", "e"] {
            history.append(msg(text));
        }
        let (page, cursor) = history.page(1, 2);
        assert_eq!(texts(&page), ["b", "c"]);
        assert_eq!(cursor, 3);
        let (page, cursor) = history.page(4, 50);
        assert_eq!(texts(&page), ["e"]);
        assert_eq!(cursor, 5);
        let (page, cursor) = history.page(9, 5);
        assert!(page.is_empty());
        assert_eq!(cursor, 5);
    }

    #[test]
    fn cursor_keeps_working_after_eviction() {
        let mut history = HistoryBuffer::new(100);
        for i in 0..100 {
            history.append(msg(&format!("m{i}")));
        }
        let (page, cursor) = history.page(0, 200);
        assert_eq!(page.len(), 100);
        assert_eq!(cursor, 100);

        for i in 100..110 {
            history.append(msg(&format!("m{i}")));
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.appended(), 110);

        let (page, cursor) = history.page(100, 200);
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].message, "m100");
        assert_eq!(page[9].message, "m109");
        assert_eq!(cursor, 110);

        // A cursor into evicted messages resumes at the oldest retained one.
        let (page, cursor) = history.page(3, 5);
        assert_eq!(texts(&page), ["m10", "m11", "m12", "m13", "m14"]);
        assert_eq!(cursor, 15);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut history = HistoryBuffer::new(0);
        history.append(msg("dropped"));
        assert!(history.is_empty());
    }
}

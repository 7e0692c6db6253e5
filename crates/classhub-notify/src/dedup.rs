//! Bounded memory of delivered server ids.

use std::collections::{HashSet, VecDeque};

/// Remembers the last `capacity` ids; the oldest is forgotten first.
#[derive(Debug, Clone)]
pub struct SeenWindow {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenWindow {
    /// Window holding at most `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(1024)),
            ids: HashSet::new(),
        }
    }

    /// Record `id`. Returns `false` if it was already remembered.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }

    /// Whether `id` is remembered.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_repeats() {
        let mut seen = SeenWindow::new(4);
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.contains("a"));
    }

    #[test]
    fn test_forgets_oldest_past_capacity() {
        let mut seen = SeenWindow::new(2);
        seen.insert("a");
        seen.insert("b");
        seen.insert("c");

        assert!(!seen.contains("a"));
        assert!(seen.contains("b") && seen.contains("c"));
        assert_eq!(seen.len(), 2);
        assert!(seen.insert("a"));
    }

    #[test]
    fn test_zero_capacity_remembers_nothing() {
        let mut seen = SeenWindow::new(0);
        assert!(seen.insert("a"));
        assert!(seen.insert("a"));
        assert!(seen.is_empty());
    }
}

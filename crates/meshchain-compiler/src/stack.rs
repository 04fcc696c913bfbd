//! LIFO stack of strings, used to walk the graph without recursion.

#[derive(Debug, Clone, Default)]
pub struct StringStack {
    items: Vec<String>,
}

impl StringStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: impl Into<String>) {
        self.items.push(item.into());
    }

    pub fn peek(&self) -> Option<&str> {
        self.items.last().map(String::as_str)
    }

    pub fn pop(&mut self) -> Option<String> {
        self.items.pop()
    }

    /// Items from bottom to top.
    pub fn items(&self) -> &[String] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut s = StringStack::new();
        assert!(s.is_empty());
        assert_eq!(s.pop(), None);

        s.push("a");
        s.push("b");
        assert_eq!(s.len(), 2);
        assert_eq!(s.peek(), Some("b"));
        assert_eq!(s.items(), ["a", "b"]);

        assert_eq!(s.pop().as_deref(), Some("b"));
        assert_eq!(s.pop().as_deref(), Some("a"));
        assert!(s.is_empty());
    }
}

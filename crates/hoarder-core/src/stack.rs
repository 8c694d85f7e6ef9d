/// LIFO holder of pending tasks.
///
/// [`Stack::push_all`] keeps the order of the pushed batch: the first item of the batch is
/// popped first, and the whole batch is popped before anything pushed earlier.
#[derive(Debug)]
pub struct Stack<T> {
    items: Vec<T>,
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Stack<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn push_all(&mut self, items: impl IntoIterator<Item = T>) {
        let start = self.items.len();
        self.items.extend(items);
        self.items[start..].reverse();
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_pop_before_siblings() {
        let mut stack = Stack::new();
        stack.push_all(["accounts", "invest"]);

        let mut order = Vec::new();
        while let Some(item) = stack.pop() {
            order.push(item);
            if item == "accounts" {
                stack.push_all(["statements", "operations", "receipts"]);
            }
        }

        assert_eq!(
            order,
            vec!["accounts", "statements", "operations", "receipts", "invest"]
        );
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut stack: Stack<u8> = Stack::new();
        stack.push(1);
        stack.push_all([]);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.pop(), Some(1));
        assert!(stack.is_empty());
    }
}

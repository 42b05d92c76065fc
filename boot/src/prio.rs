//! Lists kept sorted by descending priority.
//!
//! Restart handlers, poweroff handlers and notifier chains are all small
//! lists walked highest priority first. Entries of equal priority stay in
//! registration order.

use alloc::{boxed::Box, vec::Vec};

/// Identifies one registration, returned by [PriorityList::register].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListHandle(u64);

pub struct PriorityEntry<T> {
    handle: ListHandle,
    name: Box<str>,
    priority: i32,
    item: T,
}

impl<T> PriorityEntry<T> {
    pub fn handle(&self) -> ListHandle {
        self.handle
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn priority(&self) -> i32 {
        self.priority
    }
    pub fn item(&self) -> &T {
        &self.item
    }
}

pub struct PriorityList<T> {
    entries: Vec<PriorityEntry<T>>,
    next_handle: u64,
}

impl<T> Default for PriorityList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityList<T> {
    pub const fn new() -> PriorityList<T> {
        PriorityList {
            entries: Vec::new(),
            next_handle: 0,
        }
    }

    /// Insert `item` behind every entry with a priority greater than or equal to `priority`.
    pub fn register(&mut self, name: &str, priority: i32, item: T) -> ListHandle {
        let handle = ListHandle(self.next_handle);
        self.next_handle += 1;
        let pos = self
            .entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            pos,
            PriorityEntry {
                handle,
                name: Box::from(name),
                priority,
                item,
            },
        );
        handle
    }

    /// Remove a registration. Returns `None` if the handle is not (or no longer) listed.
    pub fn unregister(&mut self, handle: ListHandle) -> Option<T> {
        let pos = self.entries.iter().position(|entry| entry.handle == handle)?;
        Some(self.entries.remove(pos).item)
    }

    /// Entries from the highest priority to the lowest.
    pub fn iter(&self) -> impl Iterator<Item = &PriorityEntry<T>> {
        self.entries.iter()
    }

    pub fn first(&self) -> Option<&PriorityEntry<T>> {
        self.entries.first()
    }

    /// The highest priority entry registered under `name`.
    pub fn find(&self, name: &str) -> Option<&PriorityEntry<T>> {
        self.entries.iter().find(|entry| &*entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn names<T>(list: &PriorityList<T>) -> Vec<&str> {
        list.iter().map(|entry| entry.name()).collect()
    }

    #[test]
    fn sorted_highest_first() {
        let mut list = PriorityList::new();
        list.register("low", 50, ());
        list.register("high", 200, ());
        list.register("mid", 100, ());
        assert_eq!(names(&list), ["high", "mid", "low"]);
        assert_eq!(list.first().map(|e| e.priority()), Some(200));
    }

    #[test]
    fn ties_keep_registration_order() {
        let mut list = PriorityList::new();
        list.register("a", 100, 1);
        list.register("b", 100, 2);
        list.register("top", 300, 0);
        list.register("c", 100, 3);
        assert_eq!(names(&list), ["top", "a", "b", "c"]);
    }

    #[test]
    fn unregister_by_handle() {
        let mut list = PriorityList::new();
        let a = list.register("a", 10, 'a');
        let b = list.register("b", 20, 'b');
        assert_eq!(list.unregister(a), Some('a'));
        assert_eq!(list.unregister(a), None);
        assert_eq!(names(&list), ["b"]);
        assert_eq!(list.find("b").map(|e| e.handle()), Some(b));
        assert_eq!(list.unregister(b), Some('b'));
        assert!(list.is_empty());
    }
}

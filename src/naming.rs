//! Unique name allocation for widgets and unsaved projects.

use std::collections::{BTreeSet, HashMap, HashSet};

/// Hands out the smallest free positive integer.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    used: BTreeSet<u32>,
}

impl IdAllocator {
    pub fn allocate(&mut self) -> u32 {
        let mut id = 1;
        for &used in self.used.range(1..) {
            if used != id {
                break;
            }
            id += 1;
        }
        self.used.insert(id);
        id
    }

    pub fn reserve(&mut self, id: u32) {
        self.used.insert(id);
    }

    pub fn release(&mut self, id: u32) {
        self.used.remove(&id);
    }

    pub fn is_used(&self, id: u32) -> bool {
        self.used.contains(&id)
    }
}

/// Splits `button12` into `("button", Some(12))`.
fn split_number(name: &str) -> (&str, Option<u32>) {
    let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
    (base, name[base.len()..].parse().ok())
}

/// Names in use within one project.
#[derive(Debug, Default)]
pub struct NameContext {
    names: HashSet<String>,
    allocators: HashMap<String, IdAllocator>,
}

impl NameContext {
    /// Returns a free name built from `base` plus a number. When `suffix` is
    /// given it is appended after an underscore.
    pub fn new_name(&mut self, base: &str, suffix: Option<usize>) -> String {
        let (base, _) = split_number(base);
        let base = if base.is_empty() { "widget" } else { base };
        let allocator = self.allocators.entry(base.to_string()).or_default();
        loop {
            let id = allocator.allocate();
            let name = match suffix {
                Some(suffix) => format!("{base}{id}_{suffix}"),
                None => format!("{base}{id}"),
            };
            if !self.names.contains(&name) {
                return name;
            }
        }
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Claims `name`. Returns false if it was already taken.
    pub fn add_name(&mut self, name: &str) -> bool {
        if !self.names.insert(name.to_string()) {
            return false;
        }
        if let (base, Some(id)) = split_number(name) {
            self.allocators.entry(base.to_string()).or_default().reserve(id);
        }
        true
    }

    pub fn release_name(&mut self, name: &str) {
        if !self.names.remove(name) {
            return;
        }
        if let (base, Some(id)) = split_number(name)
            && let Some(allocator) = self.allocators.get_mut(base)
        {
            allocator.release(id);
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_reuses_smallest() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.allocate(), 3);
        ids.release(2);
        assert_eq!(ids.allocate(), 2);
        ids.reserve(130);
        assert!(ids.is_used(130));
        assert_eq!(ids.allocate(), 4);
    }

    #[test]
    fn test_huge_suffix_is_sparse() {
        let mut ids = IdAllocator::default();
        ids.reserve(4_000_000_000);
        assert!(ids.is_used(4_000_000_000));
        assert_eq!(ids.allocate(), 1);

        let mut names = NameContext::default();
        assert!(names.add_name("label4000000000"));
        assert_eq!(names.new_name("label", None), "label1");
    }

    #[test]
    fn test_new_name_skips_taken() {
        let mut names = NameContext::default();
        assert!(names.add_name("button1"));
        let name = names.new_name("button", None);
        assert_eq!(name, "button2");
        assert!(names.add_name(&name));
        assert!(!names.add_name("button2"));
    }

    #[test]
    fn test_release_frees_number() {
        let mut names = NameContext::default();
        let first = names.new_name("label", None);
        names.add_name(&first);
        names.release_name(&first);
        assert!(!names.has_name("label1"));
        assert_eq!(names.new_name("label", None), "label1");
    }

    #[test]
    fn test_trailing_digits_and_suffix() {
        let mut names = NameContext::default();
        assert_eq!(names.new_name("entry7", None), "entry1");
        assert_eq!(names.new_name("window", Some(2)), "window1_2");
        assert_eq!(names.new_name("", None), "widget1");
    }
}

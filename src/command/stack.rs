//! Undo/redo history with nested groups and a save point.

use super::{Command, CommandGroup};

#[derive(Debug)]
pub struct UndoStack {
    undo: Vec<Box<dyn Command>>,
    redo: Vec<Box<dyn Command>>,
    group: Option<CommandGroup>,
    depth: usize,
    applying: bool,
    /// Undo depth at the last save; `None` once that state is unreachable.
    saved_at: Option<usize>,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoStack {
    pub fn new() -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            group: None,
            depth: 0,
            applying: false,
            saved_at: Some(0),
        }
    }

    pub fn is_applying(&self) -> bool {
        self.applying
    }

    pub(crate) fn set_applying(&mut self, applying: bool) {
        self.applying = applying;
    }

    pub fn group_depth(&self) -> usize {
        self.depth
    }

    /// Opens a group, or nests inside the open one. Only the outermost
    /// description is kept.
    pub fn push_group(&mut self, description: &str) {
        if self.depth == 0 {
            self.group = Some(CommandGroup::new(description));
        }
        self.depth += 1;
    }

    /// Closes one nesting level. Returns the finished group when the
    /// outermost level closes and something was recorded in it.
    pub fn pop_group(&mut self) -> Option<Box<dyn Command>> {
        if self.depth == 0 {
            log::error!("pop_group without a matching push_group");
            return None;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return None;
        }
        let group = self.group.take()?;
        if group.is_empty() {
            return None;
        }
        Some(Box::new(group))
    }

    /// Records an executed command. Returns commands that dropped out of the
    /// history and must be discarded.
    pub(crate) fn record(&mut self, command: Box<dyn Command>) -> Vec<Box<dyn Command>> {
        if let Some(group) = self.group.as_mut() {
            group.push(command);
            return Vec::new();
        }

        let evicted: Vec<Box<dyn Command>> = std::mem::take(&mut self.redo);
        if self.saved_at.is_some_and(|s| s > self.undo.len()) {
            self.saved_at = None;
        }

        self.undo.push(command);
        evicted
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo.last().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo.last().map(|c| c.description())
    }

    /// Descriptions from oldest to newest.
    pub fn undo_descriptions(&self) -> impl Iterator<Item = &str> {
        self.undo.iter().map(|c| c.description())
    }

    /// Descriptions from next-to-redo onwards.
    pub fn redo_descriptions(&self) -> impl Iterator<Item = &str> {
        self.redo.iter().rev().map(|c| c.description())
    }

    pub(crate) fn take_undo(&mut self) -> Option<Box<dyn Command>> {
        self.undo.pop()
    }

    pub(crate) fn take_redo(&mut self) -> Option<Box<dyn Command>> {
        self.redo.pop()
    }

    pub(crate) fn push_redo(&mut self, command: Box<dyn Command>) {
        self.redo.push(command);
    }

    /// Puts a command back on the undo side without touching redo.
    pub(crate) fn restore_undo(&mut self, command: Box<dyn Command>) {
        self.undo.push(command);
    }

    pub fn is_modified(&self) -> bool {
        self.saved_at != Some(self.undo.len())
    }

    pub fn mark_saved(&mut self) {
        self.saved_at = Some(self.undo.len());
    }

    /// Empties the history, returning every command for discarding.
    pub(crate) fn clear(&mut self) -> Vec<Box<dyn Command>> {
        self.saved_at = if self.is_modified() { None } else { Some(0) };
        let mut all = std::mem::take(&mut self.undo);
        all.append(&mut self.redo);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;
    use crate::project::Project;
    use std::any::Any;

    /// A command with no effect.
    #[derive(Debug)]
    struct Note {
        text: String,
    }

    fn note(text: &str) -> Box<dyn Command> {
        Box::new(Note {
            text: text.to_string(),
        })
    }

    impl Command for Note {
        fn description(&self) -> &str {
            &self.text
        }

        fn set_description(&mut self, description: String) {
            self.text = description;
        }

        fn execute(&mut self, _project: &mut Project) -> Result<(), CommandError> {
            Ok(())
        }

        fn undo(&mut self, _project: &mut Project) -> Result<(), CommandError> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_record_truncates_redo() {
        let mut stack = UndoStack::new();
        assert!(stack.record(note("a")).is_empty());
        assert!(stack.record(note("b")).is_empty());
        let b = stack.take_undo().unwrap();
        stack.push_redo(b);
        assert!(stack.can_redo());

        let evicted = stack.record(note("c"));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].description(), "b");
        assert!(!stack.can_redo());
        assert_eq!(stack.undo_descriptions().collect::<Vec<_>>(), ["a", "c"]);
    }

    #[test]
    fn test_nested_groups_keep_outer_description() {
        let mut stack = UndoStack::new();
        stack.push_group("outer");
        stack.record(note("a"));
        stack.push_group("inner");
        stack.record(note("b"));
        assert!(stack.pop_group().is_none());
        assert_eq!(stack.group_depth(), 1);
        let group = stack.pop_group().unwrap();
        assert_eq!(group.description(), "outer");
        let group = group.as_any().downcast_ref::<CommandGroup>().unwrap();
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_empty_and_unbalanced_groups() {
        let mut stack = UndoStack::new();
        stack.push_group("nothing");
        assert!(stack.pop_group().is_none());
        assert!(stack.pop_group().is_none());
        assert_eq!(stack.group_depth(), 0);
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_each_record_is_one_step() {
        let mut stack = UndoStack::new();
        stack.record(note("h"));
        stack.mark_saved();
        assert!(!stack.is_modified());
        stack.record(note("i"));
        assert_eq!(stack.undo_descriptions().collect::<Vec<_>>(), ["h", "i"]);
        assert!(stack.is_modified());

        let i = stack.take_undo().unwrap();
        stack.push_redo(i);
        assert!(!stack.is_modified());
        assert_eq!(stack.undo_description(), Some("h"));
    }

    #[test]
    fn test_clear_keeps_modified_state() {
        let mut stack = UndoStack::new();
        stack.record(note("a"));
        assert_eq!(stack.clear().len(), 1);
        assert!(stack.is_modified());

        let mut stack = UndoStack::new();
        stack.record(note("a"));
        stack.mark_saved();
        stack.clear();
        assert!(!stack.is_modified());
    }
}

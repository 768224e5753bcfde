//! Undoable commands. Every user-visible mutation of a project is built here,
//! applied once and recorded on the project's undo stack.

pub mod stack;
mod structure;

pub use structure::{
    AddRemoveCommand, add_child, copy, create, cut, delete, paste, reorder_child,
};

use crate::error::{CommandError, PropertyError};
use crate::project::Project;
use crate::toolkit::ObjectId;
use crate::value::Value;
use crate::widget::{I18n, Signal, WidgetId};
use std::any::Any;
use std::fmt;

pub trait Command: fmt::Debug {
    fn description(&self) -> &str;

    fn set_description(&mut self, description: String);

    fn execute(&mut self, project: &mut Project) -> Result<(), CommandError>;

    fn undo(&mut self, project: &mut Project) -> Result<(), CommandError>;

    /// Called when the command leaves the history for good.
    fn discard(self: Box<Self>, _project: &mut Project) {}

    fn as_any(&self) -> &dyn Any;
}

/// Commands recorded between a push_group and its matching pop.
#[derive(Debug)]
pub struct CommandGroup {
    description: String,
    commands: Vec<Box<dyn Command>>,
}

impl CommandGroup {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: Box<dyn Command>) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Command for CommandGroup {
    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: String) {
        self.description = description;
    }

    fn execute(&mut self, project: &mut Project) -> Result<(), CommandError> {
        for i in 0..self.commands.len() {
            if let Err(err) = self.commands[i].execute(project) {
                for done in self.commands[..i].iter_mut().rev() {
                    if let Err(undo_err) = done.undo(project) {
                        log::error!("rollback of `{}` failed: {undo_err}", done.description());
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn undo(&mut self, project: &mut Project) -> Result<(), CommandError> {
        let len = self.commands.len();
        for i in (0..len).rev() {
            if let Err(err) = self.commands[i].undo(project) {
                for done in self.commands[i + 1..].iter_mut() {
                    if let Err(redo_err) = done.execute(project) {
                        log::error!("rollback of `{}` failed: {redo_err}", done.description());
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn discard(self: Box<Self>, project: &mut Project) {
        for command in self.commands {
            command.discard(project);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Applies `command` and records it. A command that fails is dropped and
/// leaves the history untouched.
pub(crate) fn run(project: &mut Project, mut command: Box<dyn Command>) -> Result<(), CommandError> {
    if project.stack().is_applying() {
        log::error!("`{}` issued while another command is applied", command.description());
        return Err(CommandError::Reentrant);
    }
    project.begin_apply();
    let result = command.execute(project);
    project.end_apply();
    match result {
        Ok(()) => {
            log::debug!("push: {}", command.description());
            project.record(command);
            Ok(())
        }
        Err(err) => {
            log::warn!("`{}` failed: {err}", command.description());
            command.discard(project);
            Err(err)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct PropertyChange {
    widget: WidgetId,
    property: String,
    old: Value,
    new: Value,
}

#[derive(Debug)]
pub struct SetPropertyCommand {
    description: String,
    changes: Vec<PropertyChange>,
}

impl Command for SetPropertyCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: String) {
        self.description = description;
    }

    fn execute(&mut self, project: &mut Project) -> Result<(), CommandError> {
        for change in &self.changes {
            project.set_property(change.widget, &change.property, change.new.clone())?;
        }
        Ok(())
    }

    fn undo(&mut self, project: &mut Project) -> Result<(), CommandError> {
        for change in self.changes.iter().rev() {
            project.set_property(change.widget, &change.property, change.old.clone())?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Validates one edit and captures the current value. `None` means the
/// edit would have no effect.
fn property_change(
    project: &Project,
    widget: WidgetId,
    property: &str,
    value: Value,
) -> Result<Option<PropertyChange>, CommandError> {
    let node = project
        .widget(widget)
        .ok_or(CommandError::UnknownWidget(widget))?;
    let prop = node.property(property).ok_or_else(|| PropertyError::NotFound {
        widget: node.name().to_string(),
        property: property.to_string(),
    })?;
    prop.def().check_type(&value)?;
    if !prop.enabled() {
        log::debug!("{}: `{property}` is disabled, ignoring edit", node.name());
        return Ok(None);
    }
    let value = prop.def().normalize(value);
    if *prop.value() == value {
        return Ok(None);
    }
    project.verify_property(widget, property, &value)?;
    Ok(Some(PropertyChange {
        widget,
        property: property.to_string(),
        old: prop.value().clone(),
        new: value,
    }))
}

pub fn set_property(
    project: &mut Project,
    widget: WidgetId,
    property: &str,
    value: Value,
) -> Result<(), CommandError> {
    let Some(change) = property_change(project, widget, property, value)? else {
        return Ok(());
    };
    let description = match project.widget(widget) {
        Some(node) => {
            let label = node
                .property(property)
                .map_or(property, |p| p.def().name.as_str());
            format!("Setting {label} of {}", node.name())
        }
        None => format!("Setting {property}"),
    };
    run(
        project,
        Box::new(SetPropertyCommand {
            description,
            changes: vec![change],
        }),
    )
}

/// Applies several edits as one undoable step.
pub fn set_properties(
    project: &mut Project,
    edits: Vec<(WidgetId, String, Value)>,
) -> Result<(), CommandError> {
    let mut changes = Vec::with_capacity(edits.len());
    for (widget, property, value) in edits {
        if let Some(change) = property_change(project, widget, &property, value)? {
            changes.push(change);
        }
    }
    if changes.is_empty() {
        return Ok(());
    }
    run(
        project,
        Box::new(SetPropertyCommand {
            description: "Setting multiple properties".to_string(),
            changes,
        }),
    )
}

#[derive(Debug)]
pub struct PropertyEnabledCommand {
    description: String,
    widget: WidgetId,
    property: String,
    enabled: bool,
}

impl Command for PropertyEnabledCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: String) {
        self.description = description;
    }

    fn execute(&mut self, project: &mut Project) -> Result<(), CommandError> {
        Ok(project.set_property_enabled(self.widget, &self.property, self.enabled)?)
    }

    fn undo(&mut self, project: &mut Project) -> Result<(), CommandError> {
        Ok(project.set_property_enabled(self.widget, &self.property, !self.enabled)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn set_property_enabled(
    project: &mut Project,
    widget: WidgetId,
    property: &str,
    enabled: bool,
) -> Result<(), CommandError> {
    let node = project
        .widget(widget)
        .ok_or(CommandError::UnknownWidget(widget))?;
    let prop = node.property(property).ok_or_else(|| PropertyError::NotFound {
        widget: node.name().to_string(),
        property: property.to_string(),
    })?;
    if !prop.def().optional || prop.enabled() == enabled {
        return Ok(());
    }
    let verb = if enabled { "Enabling" } else { "Disabling" };
    let description = format!("{verb} {} of {}", prop.def().name, node.name());
    run(
        project,
        Box::new(PropertyEnabledCommand {
            description,
            widget,
            property: property.to_string(),
            enabled,
        }),
    )
}

#[derive(Debug)]
pub struct I18nCommand {
    description: String,
    widget: WidgetId,
    property: String,
    old: I18n,
    new: I18n,
}

impl Command for I18nCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: String) {
        self.description = description;
    }

    fn execute(&mut self, project: &mut Project) -> Result<(), CommandError> {
        Ok(project.set_property_i18n(self.widget, &self.property, self.new.clone())?)
    }

    fn undo(&mut self, project: &mut Project) -> Result<(), CommandError> {
        Ok(project.set_property_i18n(self.widget, &self.property, self.old.clone())?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Changes the translation metadata of a string property.
pub fn set_property_i18n(
    project: &mut Project,
    widget: WidgetId,
    property: &str,
    i18n: I18n,
) -> Result<(), CommandError> {
    let node = project
        .widget(widget)
        .ok_or(CommandError::UnknownWidget(widget))?;
    let prop = node.property(property).ok_or_else(|| PropertyError::NotFound {
        widget: node.name().to_string(),
        property: property.to_string(),
    })?;
    if *prop.i18n() == i18n {
        return Ok(());
    }
    let description = format!("Setting i18n of {} of {}", prop.def().name, node.name());
    let old = prop.i18n().clone();
    run(
        project,
        Box::new(I18nCommand {
            description,
            widget,
            property: property.to_string(),
            old,
            new: i18n,
        }),
    )
}

#[derive(Debug)]
pub struct SetNameCommand {
    description: String,
    widget: WidgetId,
    old: String,
    new: String,
}

impl Command for SetNameCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: String) {
        self.description = description;
    }

    fn execute(&mut self, project: &mut Project) -> Result<(), CommandError> {
        project.rename_widget(self.widget, &self.new)
    }

    fn undo(&mut self, project: &mut Project) -> Result<(), CommandError> {
        project.rename_widget(self.widget, &self.old)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn set_name(project: &mut Project, widget: WidgetId, name: &str) -> Result<(), CommandError> {
    let node = project
        .widget(widget)
        .ok_or(CommandError::UnknownWidget(widget))?;
    if node.name() == name {
        return Ok(());
    }
    if !project.is_name_available(name) {
        log::warn!("rename refused: `{name}` is taken");
        return Err(CommandError::NameTaken(name.to_string()));
    }
    let old = node.name().to_string();
    run(
        project,
        Box::new(SetNameCommand {
            description: format!("Renaming {old} to {name}"),
            widget,
            old,
            new: name.to_string(),
        }),
    )
}

#[derive(Clone, Debug)]
enum SignalEdit {
    Add(Signal),
    Remove(Signal),
    Change { old: Signal, new: Signal },
}

#[derive(Debug)]
pub struct SignalCommand {
    description: String,
    widget: WidgetId,
    edit: SignalEdit,
}

impl SignalCommand {
    fn apply(&self, project: &mut Project, forward: bool) -> Result<(), CommandError> {
        let done = match (&self.edit, forward) {
            (SignalEdit::Add(s), true) | (SignalEdit::Remove(s), false) => {
                project.add_signal(self.widget, s.clone());
                true
            }
            (SignalEdit::Add(s), false) | (SignalEdit::Remove(s), true) => {
                project.remove_signal(self.widget, s)
            }
            (SignalEdit::Change { old, new }, true) => {
                project.change_signal(self.widget, old, new.clone())
            }
            (SignalEdit::Change { old, new }, false) => {
                project.change_signal(self.widget, new, old.clone())
            }
        };
        if done {
            Ok(())
        } else {
            Err(CommandError::UnknownWidget(self.widget))
        }
    }
}

impl Command for SignalCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: String) {
        self.description = description;
    }

    fn execute(&mut self, project: &mut Project) -> Result<(), CommandError> {
        self.apply(project, true)
    }

    fn undo(&mut self, project: &mut Project) -> Result<(), CommandError> {
        self.apply(project, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn signal_command(
    project: &mut Project,
    widget: WidgetId,
    verb: &str,
    edit: SignalEdit,
) -> Result<(), CommandError> {
    let node = project
        .widget(widget)
        .ok_or(CommandError::UnknownWidget(widget))?;
    let name = match &edit {
        SignalEdit::Add(s) | SignalEdit::Remove(s) | SignalEdit::Change { old: s, .. } => &s.name,
    };
    let description = format!("{verb} signal handler for {name} of {}", node.name());
    run(
        project,
        Box::new(SignalCommand {
            description,
            widget,
            edit,
        }),
    )
}

pub fn add_signal(project: &mut Project, widget: WidgetId, signal: Signal) -> Result<(), CommandError> {
    signal_command(project, widget, "Add", SignalEdit::Add(signal))
}

pub fn remove_signal(
    project: &mut Project,
    widget: WidgetId,
    signal: Signal,
) -> Result<(), CommandError> {
    signal_command(project, widget, "Remove", SignalEdit::Remove(signal))
}

pub fn change_signal(
    project: &mut Project,
    widget: WidgetId,
    old: Signal,
    new: Signal,
) -> Result<(), CommandError> {
    if old == new {
        return Ok(());
    }
    signal_command(project, widget, "Change", SignalEdit::Change { old, new })
}

/// Runs a class action on a widget. Actions record their own commands.
pub fn activate_action(project: &mut Project, widget: WidgetId, action: &str) -> Result<(), CommandError> {
    let node = project
        .widget(widget)
        .ok_or(CommandError::UnknownWidget(widget))?;
    let (adaptor, object) = (std::sync::Arc::clone(node.adaptor()), node.object());
    adaptor.activate_action(project, object, action)
}

/// Runs a packing action of `container` on one of its children, which may
/// be a placeholder.
pub fn activate_child_action(
    project: &mut Project,
    container: WidgetId,
    child: ObjectId,
    action: &str,
) -> Result<(), CommandError> {
    let node = project
        .widget(container)
        .ok_or(CommandError::UnknownWidget(container))?;
    let (adaptor, object) = (std::sync::Arc::clone(node.adaptor()), node.object());
    adaptor.activate_child_action(project, object, child, action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::testing::{create, test_project};

    fn label_text(project: &Project, widget: WidgetId) -> Value {
        project.get_property(widget, "label").unwrap()
    }

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_set_property_undo_redo() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        set_property(&mut project, label, "label", text("hello")).unwrap();
        assert_eq!(label_text(&project, label), text("hello"));

        assert!(project.undo().unwrap());
        assert_eq!(label_text(&project, label), text("label"));
        assert!(project.redo().unwrap());
        assert_eq!(label_text(&project, label), text("hello"));
        assert_eq!(
            project.stack().undo_description(),
            Some("Setting Label of label1")
        );
    }

    #[test]
    fn test_empty_stacks_are_noops() {
        let mut project = test_project();
        assert!(!project.undo().unwrap());
        assert!(!project.redo().unwrap());
    }

    #[test]
    fn test_consecutive_edits_undo_one_at_a_time() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        project.mark_saved();
        set_property(&mut project, label, "label", text("x")).unwrap();
        set_property(&mut project, label, "label", text("y")).unwrap();
        assert_eq!(project.stack().undo_descriptions().count(), 3);

        project.undo().unwrap();
        assert_eq!(label_text(&project, label), text("x"));
        assert!(project.is_modified());
        project.undo().unwrap();
        assert_eq!(label_text(&project, label), text("label"));
        assert!(!project.is_modified());
    }

    #[test]
    fn test_edit_after_save_point() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        set_property(&mut project, label, "label", text("a")).unwrap();
        project.mark_saved();
        set_property(&mut project, label, "label", text("b")).unwrap();
        assert!(project.is_modified());
        project.undo().unwrap();
        assert!(!project.is_modified());
        assert_eq!(label_text(&project, label), text("a"));
    }

    #[test]
    fn test_redo_invalidated_by_new_command() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        set_property(&mut project, label, "label", text("a")).unwrap();
        set_property(&mut project, label, "wrap", Value::Bool(true)).unwrap();
        project.undo().unwrap();
        assert!(project.can_redo());
        set_property(&mut project, label, "selectable", Value::Bool(true)).unwrap();
        assert!(!project.can_redo());
        assert!(!project.redo().unwrap());
        assert_eq!(project.get_property(label, "wrap").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_save_point_lost_after_truncation() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        set_property(&mut project, label, "wrap", Value::Bool(true)).unwrap();
        project.mark_saved();
        project.undo().unwrap();
        set_property(&mut project, label, "selectable", Value::Bool(true)).unwrap();
        assert!(project.is_modified());
        project.undo().unwrap();
        assert!(project.is_modified());
    }

    #[test]
    fn test_nested_groups_strict_inverse() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        let entry = create(&mut project, "Entry");
        let snapshot = |p: &Project| {
            (
                label_text(p, label),
                p.get_property(label, "wrap").unwrap(),
                p.get_property(entry, "text").unwrap(),
                p.get_property(entry, "editable").unwrap(),
                p.widget(entry).unwrap().name().to_string(),
            )
        };
        let before = snapshot(&project);

        project.push_group("Outer");
        set_property(&mut project, label, "label", text("one")).unwrap();
        project.push_group("Middle");
        set_property(&mut project, label, "wrap", Value::Bool(true)).unwrap();
        project.push_group("Inner");
        set_property(&mut project, entry, "text", text("two")).unwrap();
        set_name(&mut project, entry, "field").unwrap();
        project.pop_group();
        set_property(&mut project, entry, "editable", Value::Bool(false)).unwrap();
        project.pop_group();
        project.pop_group();
        let after = snapshot(&project);

        assert_eq!(project.stack().undo_description(), Some("Outer"));
        project.undo().unwrap();
        assert_eq!(snapshot(&project), before);
        project.redo().unwrap();
        assert_eq!(snapshot(&project), after);
        project.undo().unwrap();
        assert_eq!(snapshot(&project), before);
    }

    #[test]
    fn test_unbalanced_pop_ignored() {
        let mut project = test_project();
        project.pop_group();
        assert_eq!(project.stack().group_depth(), 0);
        assert!(!project.can_undo());
    }

    #[test]
    fn test_undo_rejected_while_group_open() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        project.push_group("Open");
        set_property(&mut project, label, "wrap", Value::Bool(true)).unwrap();
        assert!(matches!(project.undo(), Err(CommandError::Reentrant)));
        project.pop_group();
        assert!(project.undo().unwrap());
    }

    #[test]
    fn test_enable_command_round_trip() {
        let mut project = test_project();
        let entry = create(&mut project, "Entry");
        let object = project.widget(entry).unwrap().object();
        set_property_enabled(&mut project, entry, "max-length", true).unwrap();
        assert_eq!(
            project.toolkit().get_property(object, "max-length").unwrap(),
            Value::Int(64)
        );
        project.undo().unwrap();
        assert!(!project.widget(entry).unwrap().property("max-length").unwrap().enabled());
    }

    #[test]
    fn test_disabled_edit_records_nothing() {
        let mut project = test_project();
        let entry = create(&mut project, "Entry");
        let depth = project.stack().undo_descriptions().count();
        set_property(&mut project, entry, "max-length", Value::Int(10)).unwrap();
        assert_eq!(project.stack().undo_descriptions().count(), depth);
    }

    #[test]
    fn test_rename_taken() {
        let mut project = test_project();
        let a = create(&mut project, "Label");
        let b = create(&mut project, "Label");
        let err = set_name(&mut project, b, "label1").unwrap_err();
        assert!(matches!(err, CommandError::NameTaken(_)));
        set_name(&mut project, a, "title").unwrap();
        set_name(&mut project, b, "label1").unwrap();
        project.undo().unwrap();
        project.undo().unwrap();
        assert_eq!(project.widget(a).unwrap().name(), "label1");
        assert_eq!(project.widget_by_name("label2"), Some(b));
    }

    #[test]
    fn test_signal_commands() {
        let mut project = test_project();
        let button = create(&mut project, "Button");
        let clicked = Signal::new("clicked", "on_button_clicked");
        add_signal(&mut project, button, clicked.clone()).unwrap();
        let mut renamed = clicked.clone();
        renamed.handler = "on_ok".to_string();
        change_signal(&mut project, button, clicked.clone(), renamed.clone()).unwrap();
        let handlers: Vec<_> = project.widget(button).unwrap().handlers().cloned().collect();
        assert_eq!(handlers, vec![renamed.clone()]);

        remove_signal(&mut project, button, renamed).unwrap();
        assert!(project.widget(button).unwrap().signals().is_empty());
        project.undo().unwrap();
        project.undo().unwrap();
        let handlers: Vec<_> = project.widget(button).unwrap().handlers().cloned().collect();
        assert_eq!(handlers, vec![clicked]);
    }

    #[test]
    fn test_failed_command_not_recorded() {
        let mut project = test_project();
        let hbox = create(&mut project, "Box");
        let b = create(&mut project, "Button");
        add_child(&mut project, b, hbox, None).unwrap();
        let depth = project.stack().undo_descriptions().count();
        assert!(set_property(&mut project, hbox, "size", Value::Int(0)).is_err());
        assert_eq!(project.stack().undo_descriptions().count(), depth);
    }

    #[test]
    fn test_i18n_edit_is_undoable() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        project.mark_saved();
        let before = project.widget(label).unwrap().property("label").unwrap().i18n().clone();
        let i18n = I18n {
            translatable: true,
            context: Some("menu".into()),
            comment: Some("verb".into()),
        };
        set_property_i18n(&mut project, label, "label", i18n.clone()).unwrap();
        assert!(project.is_modified());
        assert_eq!(project.widget(label).unwrap().property("label").unwrap().i18n(), &i18n);

        set_property_i18n(&mut project, label, "label", i18n).unwrap();
        assert_eq!(project.stack().undo_descriptions().count(), 2);

        project.undo().unwrap();
        assert_eq!(project.widget(label).unwrap().property("label").unwrap().i18n(), &before);
        assert!(!project.is_modified());
    }

    #[test]
    fn test_set_properties_is_one_step() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        let depth = project.stack().undo_descriptions().count();
        set_properties(
            &mut project,
            vec![
                (label, "label".to_string(), text("x")),
                (label, "wrap".to_string(), Value::Bool(true)),
            ],
        )
        .unwrap();
        assert_eq!(project.stack().undo_descriptions().count(), depth + 1);

        project.undo().unwrap();
        assert_eq!(label_text(&project, label), text("label"));
        assert_eq!(project.get_property(label, "wrap").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_unknown_action() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        assert!(matches!(
            activate_action(&mut project, label, "explode"),
            Err(CommandError::UnknownAction { .. })
        ));
    }
}

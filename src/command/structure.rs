//! Commands that change the shape of the widget tree.

use super::{Command, CommandGroup, PropertyChange, SetPropertyCommand, run};
use crate::adaptor::ClassAdaptor;
use crate::document::{self, ObjectNode};
use crate::error::{CommandError, CreateError};
use crate::project::{CreateOptions, CreateReason, Project, PropertyQuery};
use crate::toolkit::{ContainerKind, ObjectId};
use crate::value::Value;
use crate::widget::WidgetId;
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

/// Where a widget sat and how it was packed, captured on removal.
#[derive(Debug, Clone)]
struct Entry {
    widget: WidgetId,
    parent: Option<WidgetId>,
    placeholder: Option<ObjectId>,
    index: Option<usize>,
    packing: Vec<(String, Value)>,
}

impl Entry {
    fn new(widget: WidgetId, parent: Option<WidgetId>, placeholder: Option<ObjectId>) -> Self {
        Self {
            widget,
            parent,
            placeholder,
            index: None,
            packing: Vec::new(),
        }
    }
}

/// Adds widgets to, or removes them from, the project.
#[derive(Debug)]
pub struct AddRemoveCommand {
    description: String,
    add: bool,
    entries: Vec<Entry>,
}

impl AddRemoveCommand {
    fn apply(&mut self, project: &mut Project, add: bool) -> Result<(), CommandError> {
        if add {
            for entry in self.entries.iter_mut() {
                do_add(project, entry)?;
            }
        } else {
            for entry in self.entries.iter_mut().rev() {
                do_remove(project, entry)?;
            }
        }
        Ok(())
    }
}

impl Command for AddRemoveCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: String) {
        self.description = description;
    }

    fn execute(&mut self, project: &mut Project) -> Result<(), CommandError> {
        let add = self.add;
        self.apply(project, add)
    }

    fn undo(&mut self, project: &mut Project) -> Result<(), CommandError> {
        let add = self.add;
        self.apply(project, !add)
    }

    /// Widgets that are out of the project when the command is dropped
    /// belong to nothing else.
    fn discard(self: Box<Self>, project: &mut Project) {
        for entry in &self.entries {
            if project
                .widget(entry.widget)
                .is_some_and(|w| !w.in_project() && w.parent().is_none())
            {
                project.destroy_widget(entry.widget);
            }
            if let Some(placeholder) = entry.placeholder
                && project.toolkit().contains(placeholder)
                && project.toolkit().parent(placeholder).is_none()
            {
                project.toolkit_mut().destroy(placeholder);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn container(project: &Project, widget: WidgetId) -> Result<(Arc<ClassAdaptor>, ObjectId), CommandError> {
    let node = project
        .widget(widget)
        .ok_or(CommandError::UnknownWidget(widget))?;
    Ok((Arc::clone(node.adaptor()), node.object()))
}

fn do_add(project: &mut Project, entry: &mut Entry) -> Result<(), CommandError> {
    let object = project
        .widget(entry.widget)
        .map(|w| w.object())
        .ok_or(CommandError::UnknownWidget(entry.widget))?;

    let Some(parent) = entry.parent else {
        project.set_parent(entry.widget, None, false)?;
        project.attach(entry.widget);
        if let Some(index) = entry.index {
            project.place_toplevel(entry.widget, index);
        }
        return Ok(());
    };

    let (adaptor, parent_object) = container(project, parent)?;
    let slot = entry
        .placeholder
        .take()
        .filter(|ph| project.toolkit().parent(*ph) == Some(parent_object));
    match slot {
        Some(placeholder) => {
            adaptor.replace_child(project, parent_object, placeholder, object)?;
            project.toolkit_mut().destroy(placeholder);
        }
        None => {
            adaptor.add_child(project, parent_object, object)?;
            if let Some(index) = entry.index {
                project.toolkit_mut().reorder(parent_object, object, index)?;
            }
        }
    }

    project.set_parent(entry.widget, Some(parent), entry.packing.is_empty())?;
    project.push_superuser();
    for (id, value) in entry.packing.iter().filter(|(id, _)| id != "position") {
        if let Err(err) = project.set_property(entry.widget, id, value.clone()) {
            log::warn!("could not restore packing `{id}`: {err}");
        }
    }
    project.pop_superuser();
    project.attach(entry.widget);
    project.refresh_child_packing(parent_object);
    Ok(())
}

fn do_remove(project: &mut Project, entry: &mut Entry) -> Result<(), CommandError> {
    let node = project
        .widget(entry.widget)
        .ok_or(CommandError::UnknownWidget(entry.widget))?;
    let object = node.object();
    entry.parent = node.parent();
    entry.packing = node
        .packing_properties()
        .iter()
        .map(|p| (p.id().to_string(), p.value().clone()))
        .collect();
    entry.placeholder = None;

    let Some(parent) = entry.parent else {
        entry.index = project.toplevels().iter().position(|t| *t == entry.widget);
        project.detach(entry.widget);
        return Ok(());
    };

    let (adaptor, parent_object) = container(project, parent)?;
    entry.index = project.toolkit().index_of(parent_object, object);
    if adaptor.uses_placeholders {
        let placeholder = project.toolkit_mut().create_placeholder()?;
        if let Err(err) = adaptor.replace_child(project, parent_object, object, placeholder) {
            project.toolkit_mut().destroy(placeholder);
            return Err(err.into());
        }
        entry.placeholder = Some(placeholder);
    } else {
        adaptor.remove_child(project, parent_object, object)?;
    }
    project.detach(entry.widget);
    project.set_parent(entry.widget, None, false)?;
    project.refresh_child_packing(parent_object);
    Ok(())
}

fn widget_name(project: &Project, widget: WidgetId) -> String {
    project
        .widget(widget)
        .map(|w| w.name().to_string())
        .unwrap_or_default()
}

/// Checks that `child_adaptor` may be placed inside `parent`.
fn check_parent(
    project: &Project,
    child_adaptor: &ClassAdaptor,
    parent: WidgetId,
) -> Result<(), CommandError> {
    let (parent_adaptor, _) = container(project, parent)?;
    if child_adaptor.toplevel || !parent_adaptor.is_container() {
        log::warn!(
            "refusing to place {} inside {}",
            child_adaptor.name,
            parent_adaptor.name
        );
        return Err(CommandError::IncompatibleParent {
            child: child_adaptor.name.clone(),
            parent: widget_name(project, parent),
        });
    }
    Ok(())
}

/// Creates a widget of `adaptor` and adds it under `parent`, optionally into
/// `placeholder`. With no parent the widget becomes a toplevel.
pub fn create(
    project: &mut Project,
    adaptor: &Arc<ClassAdaptor>,
    parent: Option<WidgetId>,
    placeholder: Option<ObjectId>,
    query: Option<&mut dyn PropertyQuery>,
) -> Result<WidgetId, CommandError> {
    if let Some(parent) = parent {
        check_parent(project, adaptor, parent)?;
    }
    let widget = project.create_widget(
        adaptor,
        CreateOptions {
            reason: CreateReason::User,
            query,
            ..Default::default()
        },
    )?;
    let description = format!("Create {}", widget_name(project, widget));
    run(
        project,
        Box::new(AddRemoveCommand {
            description,
            add: true,
            entries: vec![Entry::new(widget, parent, placeholder)],
        }),
    )?;
    project.select(widget);
    Ok(widget)
}

fn move_command(
    project: &Project,
    child: WidgetId,
    parent: WidgetId,
    placeholder: Option<ObjectId>,
) -> Result<CommandGroup, CommandError> {
    let node = project
        .widget(child)
        .ok_or(CommandError::UnknownWidget(child))?;
    if let Some(internal) = node.internal() {
        return Err(CommandError::InternalChild(internal.to_string()));
    }
    check_parent(project, node.adaptor(), parent)?;
    if parent == child || project.is_ancestor(child, parent) {
        return Err(CommandError::IncompatibleParent {
            child: node.name().to_string(),
            parent: widget_name(project, parent),
        });
    }
    let mut group = CommandGroup::new(&format!(
        "Add {} to {}",
        node.name(),
        widget_name(project, parent)
    ));
    if node.in_project() {
        group.push(Box::new(AddRemoveCommand {
            description: format!("Remove {}", node.name()),
            add: false,
            entries: vec![Entry::new(child, None, None)],
        }));
    }
    group.push(Box::new(AddRemoveCommand {
        description: format!("Add {}", node.name()),
        add: true,
        entries: vec![Entry::new(child, Some(parent), placeholder)],
    }));
    Ok(group)
}

/// Moves an existing widget under `parent` as one undoable step.
pub fn add_child(
    project: &mut Project,
    child: WidgetId,
    parent: WidgetId,
    placeholder: Option<ObjectId>,
) -> Result<(), CommandError> {
    let group = move_command(project, child, parent, placeholder)?;
    run(project, Box::new(group))
}

/// Drops widgets whose ancestor is also in the list.
fn roots(project: &Project, widgets: &[WidgetId]) -> Vec<WidgetId> {
    let mut out: Vec<WidgetId> = Vec::new();
    for w in widgets {
        if out.contains(w) || widgets.iter().any(|o| o != w && project.is_ancestor(*o, *w)) {
            continue;
        }
        out.push(*w);
    }
    out
}

fn check_removable(project: &Project, widgets: &[WidgetId]) -> Result<(), CommandError> {
    if widgets.is_empty() {
        return Err(CommandError::NothingSelected);
    }
    for w in widgets {
        let node = project.widget(*w).ok_or(CommandError::UnknownWidget(*w))?;
        if node.internal().is_some() {
            log::warn!("{} is an internal child", node.name());
            return Err(CommandError::InternalChild(node.name().to_string()));
        }
    }
    Ok(())
}

/// Deletes widgets and clears object references that point into them.
pub fn delete(project: &mut Project, widgets: &[WidgetId]) -> Result<(), CommandError> {
    remove_widgets(project, widgets, "Delete")
}

fn remove_widgets(project: &mut Project, widgets: &[WidgetId], verb: &str) -> Result<(), CommandError> {
    check_removable(project, widgets)?;
    let roots = roots(project, widgets);

    let doomed: HashSet<ObjectId> = roots
        .iter()
        .flat_map(|r| project.subtree(*r))
        .filter_map(|w| project.widget(w).map(|n| n.object()))
        .collect();
    let mut changes = Vec::new();
    for w in project.widgets() {
        let Some(node) = project.widget(w) else {
            continue;
        };
        if doomed.contains(&node.object()) {
            continue;
        }
        for prop in node.properties() {
            if prop.value().as_object().is_some_and(|o| doomed.contains(&o)) {
                changes.push(PropertyChange {
                    widget: w,
                    property: prop.id().to_string(),
                    old: prop.value().clone(),
                    new: Value::Object(None),
                });
            }
        }
    }

    let description = match roots.as_slice() {
        [one] => format!("{verb} {}", widget_name(project, *one)),
        _ => verb.to_string(),
    };
    let mut group = CommandGroup::new(&description);
    if !changes.is_empty() {
        group.push(Box::new(SetPropertyCommand {
            description: "Clear references".to_string(),
            changes,
        }));
    }
    group.push(Box::new(AddRemoveCommand {
        description: description.clone(),
        add: false,
        entries: roots.iter().map(|w| Entry::new(*w, None, None)).collect(),
    }));
    run(project, Box::new(group))
}

/// Snapshots widgets for the clipboard. Records no command.
pub fn copy(project: &Project, widgets: &[WidgetId]) -> Result<Vec<ObjectNode>, CommandError> {
    check_removable(project, widgets)?;
    Ok(roots(project, widgets)
        .into_iter()
        .filter_map(|w| document::snapshot(project, w))
        .collect())
}

pub fn cut(project: &mut Project, widgets: &[WidgetId]) -> Result<Vec<ObjectNode>, CommandError> {
    let nodes = copy(project, widgets)?;
    remove_widgets(project, widgets, "Cut")?;
    Ok(nodes)
}

/// Free slots of `parent`, starting with `preferred` when it is one.
fn placeholders(project: &Project, parent: ObjectId, preferred: Option<ObjectId>) -> Vec<ObjectId> {
    let toolkit = project.toolkit();
    let mut slots: Vec<ObjectId> = preferred
        .filter(|p| toolkit.parent(*p) == Some(parent))
        .into_iter()
        .collect();
    slots.extend(
        toolkit
            .children(parent)
            .into_iter()
            .filter(|c| toolkit.is_placeholder(*c) && Some(*c) != preferred),
    );
    slots
}

/// Instantiates clipboard templates under `parent`, filling placeholders
/// from `placeholder` onwards.
pub fn paste(
    project: &mut Project,
    nodes: &[ObjectNode],
    parent: Option<WidgetId>,
    placeholder: Option<ObjectId>,
) -> Result<Vec<WidgetId>, CommandError> {
    if nodes.is_empty() {
        return Err(CommandError::NothingToPaste);
    }
    let registry = Arc::clone(project.registry());
    let mut adaptors = Vec::with_capacity(nodes.len());
    for node in nodes {
        let adaptor = registry
            .lookup_by_name(&node.class)
            .ok_or_else(|| CreateError::UnknownClass(node.class.clone()))?;
        adaptors.push(Arc::clone(adaptor));
    }

    let mut slots: Vec<Option<ObjectId>> = vec![None; nodes.len()];
    if let Some(parent) = parent {
        for adaptor in &adaptors {
            check_parent(project, adaptor, parent)?;
        }
        let (parent_adaptor, parent_object) = container(project, parent)?;
        let name = widget_name(project, parent);
        let kind = project.toolkit().container_kind(parent_object)?;
        if kind == ContainerKind::Bin && nodes.len() > 1 {
            return Err(CommandError::MultipleIntoSingleSlot(name));
        }
        if parent_adaptor.uses_placeholders {
            let free = placeholders(project, parent_object, placeholder);
            if free.len() < nodes.len() {
                log::warn!("{name}: {} free slots for {} widgets", free.len(), nodes.len());
                return Err(CommandError::InsufficientPlaceholders(name));
            }
            for (slot, ph) in slots.iter_mut().zip(free) {
                *slot = Some(ph);
            }
        }
    }

    let mut widgets = Vec::with_capacity(nodes.len());
    for node in nodes {
        match document::instantiate(project, node, CreateReason::Paste) {
            Ok(widget) => widgets.push(widget),
            Err(err) => {
                for w in widgets {
                    project.destroy_widget(w);
                }
                return Err(err.into());
            }
        }
    }

    let description = match widgets.as_slice() {
        [one] => format!("Paste {}", widget_name(project, *one)),
        _ => "Paste".to_string(),
    };
    run(
        project,
        Box::new(AddRemoveCommand {
            description,
            add: true,
            entries: widgets
                .iter()
                .zip(slots)
                .map(|(w, slot)| Entry::new(*w, parent, slot))
                .collect(),
        }),
    )?;
    if let Some(first) = widgets.first() {
        project.select(*first);
    }
    Ok(widgets)
}

/// Moves a child of a box to `position`.
pub fn reorder_child(project: &mut Project, widget: WidgetId, position: usize) -> Result<(), CommandError> {
    let node = project
        .widget(widget)
        .ok_or(CommandError::UnknownWidget(widget))?;
    if node.parent().is_none() {
        log::warn!("{} has no parent to reorder in", node.name());
    }
    super::set_property(project, widget, "position", Value::Int(position as i64))
}

//! Operation bundles for the stock widget set, resolved by symbol name from
//! catalog entries.

use super::ClassAdaptor;
use super::ops::{AdaptorOps, defaults};
use crate::command;
use crate::error::{CommandError, ToolkitError};
use crate::project::{CreateReason, Project};
use crate::toolkit::ObjectId;
use crate::value::Value;
use crate::widget::WidgetId;

pub fn lookup_ops(symbol: &str) -> Option<AdaptorOps> {
    let ops = match symbol {
        "object" => AdaptorOps {
            construct_object: Some(defaults::construct_object),
            get_internal_child: Some(defaults::get_internal_child),
            ..Default::default()
        },
        "container" => AdaptorOps {
            add: Some(defaults::add),
            remove: Some(defaults::remove),
            get_children: Some(defaults::get_children),
            replace_child: Some(defaults::replace_child),
            child_set_property: Some(defaults::child_set_property),
            child_get_property: Some(defaults::child_get_property),
            ..Default::default()
        },
        "bin" => AdaptorOps {
            add: Some(bin_add),
            post_create: Some(bin_post_create),
            ..Default::default()
        },
        "box" => AdaptorOps {
            set_property: Some(box_set_property),
            get_property: Some(box_get_property),
            verify_property: Some(box_verify_property),
            add: Some(box_add),
            remove: Some(box_remove),
            child_verify_property: Some(box_child_verify_property),
            child_action_activate: Some(box_child_action),
            ..Default::default()
        },
        "label" => AdaptorOps {
            set_property: Some(label_set_property),
            post_create: Some(label_post_create),
            ..Default::default()
        },
        "dialog" => AdaptorOps {
            post_create: Some(dialog_post_create),
            ..Default::default()
        },
        _ => return None,
    };
    Some(ops)
}

fn last_placeholder(project: &Project, container: ObjectId) -> Option<ObjectId> {
    let toolkit = project.toolkit();
    toolkit
        .children(container)
        .into_iter()
        .rev()
        .find(|c| toolkit.is_placeholder(*c))
}

fn bin_add(
    _adaptor: &ClassAdaptor,
    project: &mut Project,
    container: ObjectId,
    child: ObjectId,
) -> Result<(), ToolkitError> {
    match last_placeholder(project, container) {
        Some(placeholder) => {
            let toolkit = project.toolkit_mut();
            toolkit.replace(container, placeholder, child)?;
            toolkit.destroy(placeholder);
            Ok(())
        }
        None => project.toolkit_mut().add(container, child),
    }
}

fn bin_post_create(
    adaptor: &ClassAdaptor,
    project: &mut Project,
    widget: WidgetId,
    reason: CreateReason,
) {
    if reason != CreateReason::User || !adaptor.uses_placeholders {
        return;
    }
    let Some(object) = project.widget(widget).map(|w| w.object()) else {
        return;
    };
    if !project.toolkit().children(object).is_empty() {
        return;
    }
    let result = project
        .toolkit_mut()
        .create_placeholder()
        .and_then(|ph| project.toolkit_mut().add(object, ph));
    if let Err(err) = result {
        log::error!("{}: could not add placeholder: {err}", adaptor.name);
    }
}

fn box_set_size(project: &mut Project, object: ObjectId, value: &Value) -> Result<(), ToolkitError> {
    if project.is_loading() {
        return Ok(());
    }
    let target = value.as_int().unwrap_or(0).max(0) as usize;
    let mut current = project.toolkit().children(object).len();
    while current < target {
        let toolkit = project.toolkit_mut();
        let placeholder = toolkit.create_placeholder()?;
        toolkit.add(object, placeholder)?;
        current += 1;
    }
    while current > target {
        let Some(placeholder) = last_placeholder(project, object) else {
            log::warn!("box {object}: cannot shrink below its widget count");
            break;
        };
        let toolkit = project.toolkit_mut();
        toolkit.remove(object, placeholder)?;
        toolkit.destroy(placeholder);
        current -= 1;
    }
    project.refresh_child_packing(object);
    Ok(())
}

fn box_set_property(
    adaptor: &ClassAdaptor,
    project: &mut Project,
    object: ObjectId,
    id: &str,
    value: &Value,
) -> Result<(), ToolkitError> {
    if id == "size" {
        return box_set_size(project, object, value);
    }
    defaults::set_property(adaptor, project, object, id, value)
}

fn box_get_property(
    adaptor: &ClassAdaptor,
    project: &Project,
    object: ObjectId,
    id: &str,
) -> Result<Value, ToolkitError> {
    if id == "size" {
        return Ok(Value::Int(project.toolkit().children(object).len() as i64));
    }
    defaults::get_property(adaptor, project, object, id)
}

/// A box may only shrink by dropping placeholders.
fn box_verify_property(
    _adaptor: &ClassAdaptor,
    project: &Project,
    object: ObjectId,
    id: &str,
    value: &Value,
) -> bool {
    if id != "size" {
        return true;
    }
    let toolkit = project.toolkit();
    let widgets = toolkit
        .children(object)
        .into_iter()
        .filter(|c| !toolkit.is_placeholder(*c))
        .count();
    value.as_int().is_some_and(|size| size >= widgets as i64)
}

fn box_add(
    _adaptor: &ClassAdaptor,
    project: &mut Project,
    container: ObjectId,
    child: ObjectId,
) -> Result<(), ToolkitError> {
    // Take over the last free slot so the box keeps its size.
    if !project.is_superuser()
        && !project.is_loading()
        && !project.toolkit().is_placeholder(child)
        && let Some(placeholder) = last_placeholder(project, container)
    {
        let toolkit = project.toolkit_mut();
        toolkit.remove(container, placeholder)?;
        toolkit.destroy(placeholder);
    }
    project.toolkit_mut().add(container, child)?;
    if let Some(widget) = project.widget_for_object(container) {
        project.refresh_virtual_properties(widget);
    }
    Ok(())
}

fn box_remove(
    _adaptor: &ClassAdaptor,
    project: &mut Project,
    container: ObjectId,
    child: ObjectId,
) -> Result<(), ToolkitError> {
    project.toolkit_mut().remove(container, child)?;
    if let Some(widget) = project.widget_for_object(container) {
        project.refresh_virtual_properties(widget);
    }
    Ok(())
}

fn box_child_verify_property(
    _adaptor: &ClassAdaptor,
    project: &Project,
    container: ObjectId,
    _child: ObjectId,
    id: &str,
    value: &Value,
) -> bool {
    if id != "position" {
        return true;
    }
    let len = project.toolkit().children(container).len() as i64;
    value.as_int().is_some_and(|p| (0..len).contains(&p))
}

/// Moves every widget child at or after `from` by `delta` slots, one position
/// command each, ordered so that no move lands on a widget still to be moved.
fn shift_children(
    project: &mut Project,
    container: ObjectId,
    from: usize,
    delta: i64,
) -> Result<(), CommandError> {
    let children = project.toolkit().children(container);
    let mut widgets: Vec<(usize, WidgetId)> = children
        .iter()
        .enumerate()
        .skip(from)
        .filter_map(|(i, c)| project.widget_for_object(*c).map(|w| (i, w)))
        .collect();
    if delta > 0 {
        widgets.reverse();
    }
    for (index, widget) in widgets {
        let target = Value::Int(index as i64 + delta);
        command::set_property(project, widget, "position", target)?;
    }
    Ok(())
}

fn box_insert_slot(
    project: &mut Project,
    widget: WidgetId,
    container: ObjectId,
    index: usize,
) -> Result<(), CommandError> {
    let size = project.toolkit().children(container).len() as i64;
    project.push_group("Insert placeholder");
    let result = command::set_property(project, widget, "size", Value::Int(size + 1))
        .and_then(|()| shift_children(project, container, index, 1));
    project.pop_group();
    result
}

fn box_remove_slot(
    project: &mut Project,
    widget: WidgetId,
    container: ObjectId,
    index: usize,
) -> Result<(), CommandError> {
    let size = project.toolkit().children(container).len() as i64;
    project.push_group("Remove placeholder");
    let result = shift_children(project, container, index + 1, -1)
        .and_then(|()| command::set_property(project, widget, "size", Value::Int(size - 1)));
    project.pop_group();
    result
}

fn box_child_action(
    adaptor: &ClassAdaptor,
    project: &mut Project,
    container: ObjectId,
    child: ObjectId,
    action: &str,
) -> Result<(), CommandError> {
    let widget = project
        .widget_for_object(container)
        .ok_or(ToolkitError::UnknownObject(container))?;
    let index = project
        .toolkit()
        .index_of(container, child)
        .ok_or(ToolkitError::NotAChild { container, child })?;
    match action {
        "insert_before" => box_insert_slot(project, widget, container, index),
        "insert_after" => box_insert_slot(project, widget, container, index + 1),
        "remove_slot" if project.toolkit().is_placeholder(child) => {
            box_remove_slot(project, widget, container, index)
        }
        "remove_slot" => {
            log::warn!("{}: only placeholder slots can be removed", adaptor.name);
            Ok(())
        }
        _ => Err(CommandError::UnknownAction {
            class: adaptor.name.clone(),
            action: action.to_string(),
        }),
    }
}

/// The mnemonic target only matters while the label uses an underline.
fn sync_mnemonic_sensitivity(project: &mut Project, object: ObjectId, underline: bool) {
    let Some(widget) = project.widget_for_object(object) else {
        return;
    };
    let reason = (!underline).then_some("Only used when \"Use underline\" is set");
    if let Err(err) = project.set_property_sensitive(widget, "mnemonic-widget", underline, reason) {
        log::debug!("label {object}: {err}");
    }
}

fn label_set_property(
    adaptor: &ClassAdaptor,
    project: &mut Project,
    object: ObjectId,
    id: &str,
    value: &Value,
) -> Result<(), ToolkitError> {
    defaults::set_property(adaptor, project, object, id, value)?;
    if id == "use-underline" {
        sync_mnemonic_sensitivity(project, object, value.as_bool().unwrap_or(false));
    }
    Ok(())
}

fn label_post_create(
    _adaptor: &ClassAdaptor,
    project: &mut Project,
    widget: WidgetId,
    _reason: CreateReason,
) {
    let Some(node) = project.widget(widget) else {
        return;
    };
    let object = node.object();
    let underline = node
        .property("use-underline")
        .and_then(|p| p.value().as_bool())
        .unwrap_or(false);
    sync_mnemonic_sensitivity(project, object, underline);
}

fn dialog_post_create(
    adaptor: &ClassAdaptor,
    project: &mut Project,
    widget: WidgetId,
    reason: CreateReason,
) {
    if reason != CreateReason::User {
        return;
    }
    let Some(object) = project.widget(widget).map(|w| w.object()) else {
        return;
    };
    let Some(vbox) = project.toolkit().internal_child(object, "vbox") else {
        log::error!("{}: missing internal child `vbox`", adaptor.name);
        return;
    };
    let result = project
        .toolkit_mut()
        .create_placeholder()
        .and_then(|ph| project.toolkit_mut().insert(vbox, 0, ph));
    if let Err(err) = result {
        log::error!("{}: could not add placeholder: {err}", adaptor.name);
        return;
    }
    project.refresh_child_packing(vbox);
    if let Some(vbox_widget) = project.widget_for_object(vbox) {
        project.refresh_virtual_properties(vbox_widget);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::testing::{create, test_project};

    #[test]
    fn test_unknown_symbol() {
        assert!(lookup_ops("nonexistent").is_none());
        assert!(lookup_ops("container").unwrap().is_container());
    }

    #[test]
    fn test_box_size_adds_placeholders() {
        let mut project = test_project();
        let hbox = create(&mut project, "Box");
        let object = project.widget(hbox).unwrap().object();
        assert_eq!(project.toolkit().children(object).len(), 3);

        command::set_property(&mut project, hbox, "size", Value::Int(5)).unwrap();
        assert_eq!(project.toolkit().children(object).len(), 5);
        project.undo().unwrap();
        assert_eq!(project.toolkit().children(object).len(), 3);
    }

    #[test]
    fn test_box_cannot_drop_widgets_by_shrinking() {
        let mut project = test_project();
        let hbox = create(&mut project, "Box");
        let b1 = create(&mut project, "Button");
        let b2 = create(&mut project, "Button");
        command::add_child(&mut project, b1, hbox, None).unwrap();
        command::add_child(&mut project, b2, hbox, None).unwrap();

        let err = command::set_property(&mut project, hbox, "size", Value::Int(1)).unwrap_err();
        assert!(matches!(err, CommandError::Property(_)));
        command::set_property(&mut project, hbox, "size", Value::Int(2)).unwrap();
        let object = project.widget(hbox).unwrap().object();
        assert_eq!(project.toolkit().children(object).len(), 2);
    }

    #[test]
    fn test_box_insert_before_and_undo() {
        let mut project = test_project();
        let hbox = create(&mut project, "Box");
        command::set_property(&mut project, hbox, "size", Value::Int(2)).unwrap();
        let a = create(&mut project, "Label");
        let b = create(&mut project, "Label");
        command::add_child(&mut project, a, hbox, None).unwrap();
        command::add_child(&mut project, b, hbox, None).unwrap();
        let object = project.widget(hbox).unwrap().object();
        let a_obj = project.widget(a).unwrap().object();

        command::activate_child_action(&mut project, hbox, a_obj, "insert_before").unwrap();
        let children = project.toolkit().children(object);
        assert_eq!(children.len(), 3);
        assert!(project.toolkit().is_placeholder(children[0]));
        assert_eq!(children[1], a_obj);
        assert_eq!(
            project.get_property(b, "position").unwrap(),
            Value::Int(2)
        );

        project.undo().unwrap();
        let children = project.toolkit().children(object);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], a_obj);
        assert_eq!(
            project.get_property(b, "position").unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_label_mnemonic_follows_underline() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        let mnemonic = |p: &Project| {
            let prop = p.widget(label).unwrap().property("mnemonic-widget").unwrap();
            (prop.sensitive(), prop.insensitive_reason().is_some())
        };
        assert_eq!(mnemonic(&project), (false, true));

        command::set_property(&mut project, label, "use-underline", Value::Bool(true)).unwrap();
        assert_eq!(mnemonic(&project), (true, false));

        project.undo().unwrap();
        assert_eq!(mnemonic(&project), (false, true));
    }

    #[test]
    fn test_dialog_gets_placeholder_in_vbox() {
        let mut project = test_project();
        let dialog = create(&mut project, "Dialog");
        let object = project.widget(dialog).unwrap().object();
        let vbox = project.toolkit().internal_child(object, "vbox").unwrap();
        let children = project.toolkit().children(vbox);
        assert_eq!(children.len(), 2);
        assert!(project.toolkit().is_placeholder(children[0]));
    }
}

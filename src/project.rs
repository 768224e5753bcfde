//! A project: the live widget graph, its toolkit objects, selection and
//! undo history.

use crate::adaptor::{ClassAdaptor, PropertyDef};
use crate::command::Command;
use crate::command::stack::UndoStack;
use crate::error::{CommandError, CreateError, PropertyError};
use crate::naming::NameContext;
use crate::observer::{HandlerId, Observers};
use crate::registry::ClassRegistry;
use crate::toolkit::{InternalChildSpec, ObjectId, Toolkit};
use crate::value::Value;
use crate::widget::{I18n, Property, Signal, Widget, WidgetId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Why a widget is being created; adaptors use it in their post-create hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateReason {
    User,
    Load,
    Paste,
}

/// Asks the user for the values of query properties before creation.
pub trait PropertyQuery {
    /// Returns `None` to cancel the creation.
    fn query(&mut self, adaptor: &ClassAdaptor, def: &PropertyDef, current: &Value) -> Option<Value>;
}

pub struct CreateOptions<'a> {
    pub reason: CreateReason,
    /// Preferred name; a fresh one is generated when absent or taken.
    pub name: Option<String>,
    /// Values applied over the class defaults before construction.
    pub initial: Vec<(String, Value)>,
    pub query: Option<&'a mut dyn PropertyQuery>,
}

impl Default for CreateOptions<'_> {
    fn default() -> Self {
        Self {
            reason: CreateReason::User,
            name: None,
            initial: Vec::new(),
            query: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProjectEvent {
    WidgetAdded(WidgetId),
    WidgetRemoved(WidgetId),
    WidgetRenamed { widget: WidgetId, old_name: String },
    PropertyChanged { widget: WidgetId, property: String },
    SignalsChanged(WidgetId),
    SelectionChanged,
    ModifiedChanged(bool),
    HistoryChanged,
}

/// One slot of a container as shown in the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildSlot {
    Widget(WidgetId),
    Placeholder(ObjectId),
}

pub struct Project {
    registry: Arc<ClassRegistry>,
    toolkit: Toolkit,
    widgets: HashMap<WidgetId, Widget>,
    by_object: HashMap<ObjectId, WidgetId>,
    by_name: HashMap<String, WidgetId>,
    names: NameContext,
    toplevels: Vec<WidgetId>,
    next_widget: u64,
    name: String,
    path: Option<PathBuf>,
    instance: usize,
    selection: Vec<WidgetId>,
    stack: UndoStack,
    superuser: u32,
    loading: bool,
    batch: u32,
    pending: Vec<ProjectEvent>,
    observers: Observers<ProjectEvent>,
    was_modified: bool,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("widgets", &self.widgets.len())
            .field("toplevels", &self.toplevels)
            .finish_non_exhaustive()
    }
}

impl Project {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        let toolkit = Toolkit::new(Arc::clone(registry.types()));
        Self {
            registry,
            toolkit,
            widgets: HashMap::new(),
            by_object: HashMap::new(),
            by_name: HashMap::new(),
            names: NameContext::default(),
            toplevels: Vec::new(),
            next_widget: 1,
            name: String::new(),
            path: None,
            instance: 0,
            selection: Vec::new(),
            stack: UndoStack::new(),
            superuser: 0,
            loading: false,
            batch: 0,
            pending: Vec::new(),
            observers: Observers::default(),
            was_modified: false,
        }
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    pub fn toolkit_mut(&mut self) -> &mut Toolkit {
        &mut self.toolkit
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    /// Index among open projects sharing this project's name.
    pub fn instance(&self) -> usize {
        self.instance
    }

    pub fn set_instance(&mut self, instance: usize) {
        self.instance = instance;
    }

    // ---- widget graph ----

    pub fn widget(&self, id: WidgetId) -> Option<&Widget> {
        self.widgets.get(&id)
    }

    pub(crate) fn widget_mut(&mut self, id: WidgetId) -> Option<&mut Widget> {
        self.widgets.get_mut(&id)
    }

    pub fn widget_for_object(&self, object: ObjectId) -> Option<WidgetId> {
        self.by_object.get(&object).copied()
    }

    pub fn widget_by_name(&self, name: &str) -> Option<WidgetId> {
        self.by_name.get(name).copied()
    }

    pub fn toplevels(&self) -> &[WidgetId] {
        &self.toplevels
    }

    /// Child widgets of `id` in container order.
    pub fn children(&self, id: WidgetId) -> Vec<WidgetId> {
        self.widget(id)
            .map(|w| {
                self.toolkit
                    .children(w.object)
                    .into_iter()
                    .filter_map(|c| self.widget_for_object(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn child_slots(&self, id: WidgetId) -> Vec<ChildSlot> {
        let Some(widget) = self.widget(id) else {
            return Vec::new();
        };
        self.toolkit
            .children(widget.object)
            .into_iter()
            .map(|c| match self.widget_for_object(c) {
                Some(w) => ChildSlot::Widget(w),
                None => ChildSlot::Placeholder(c),
            })
            .collect()
    }

    /// `id` followed by all of its descendants, depth first.
    pub fn subtree(&self, id: WidgetId) -> Vec<WidgetId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            let children = self.children(out[i]);
            out.splice(i + 1..i + 1, children);
            i += 1;
        }
        out
    }

    /// Every widget in the project, depth first from each toplevel.
    pub fn widgets(&self) -> Vec<WidgetId> {
        self.toplevels.iter().flat_map(|t| self.subtree(*t)).collect()
    }

    pub fn is_ancestor(&self, ancestor: WidgetId, mut id: WidgetId) -> bool {
        while let Some(parent) = self.widget(id).and_then(|w| w.parent) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    pub fn adaptor_for_object(&self, object: ObjectId) -> Option<Arc<ClassAdaptor>> {
        match self.widget_for_object(object) {
            Some(w) => self.widget(w).map(|w| Arc::clone(&w.adaptor)),
            None => {
                let key = self.toolkit.type_of(object).ok()?;
                self.registry.lookup_by_type(key).cloned()
            }
        }
    }

    /// Widget name used when writing object references.
    pub fn object_name(&self, object: ObjectId) -> Option<String> {
        self.widget_for_object(object)
            .and_then(|w| self.widget(w))
            .map(|w| w.name.clone())
    }

    // ---- modes ----

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser > 0
    }

    /// Internal fixups run as superuser: no commands, no verification.
    pub fn push_superuser(&mut self) {
        self.superuser += 1;
    }

    pub fn pop_superuser(&mut self) {
        if self.superuser == 0 {
            log::error!("unbalanced superuser pop");
            return;
        }
        self.superuser -= 1;
    }

    fn verify_bypassed(&self) -> bool {
        self.loading || self.superuser > 0 || self.stack.is_applying()
    }

    // ---- events ----

    pub fn connect(&mut self, handler: impl FnMut(&ProjectEvent) + 'static) -> HandlerId {
        self.observers.connect(handler)
    }

    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        self.observers.disconnect(id)
    }

    /// Watches one property. The handler sees the value once the change is
    /// reported, so grouped edits are delivered after the group closes.
    pub fn connect_property(
        &mut self,
        id: WidgetId,
        property: &str,
        handler: impl FnMut(&Value) + 'static,
    ) -> Result<HandlerId, PropertyError> {
        Ok(self.property_mut(id, property)?.connect(handler))
    }

    pub fn disconnect_property(&mut self, id: WidgetId, property: &str, handler: HandlerId) -> bool {
        self.widgets
            .get_mut(&id)
            .and_then(|w| w.property_mut(property))
            .is_some_and(|p| p.disconnect(handler))
    }

    fn emit(&mut self, event: ProjectEvent) {
        self.pending.push(event);
        self.flush_events();
    }

    /// Holds notifications until the matching `end_batch`.
    pub fn begin_batch(&mut self) {
        self.batch += 1;
    }

    pub fn end_batch(&mut self) {
        self.batch = self.batch.saturating_sub(1);
        self.flush_events();
    }

    fn flush_events(&mut self) {
        if self.batch > 0 || self.stack.is_applying() || self.stack.group_depth() > 0 {
            return;
        }
        let modified = self.stack.is_modified();
        if modified != self.was_modified {
            self.was_modified = modified;
            self.pending.push(ProjectEvent::ModifiedChanged(modified));
        }
        for event in std::mem::take(&mut self.pending) {
            if let ProjectEvent::PropertyChanged { widget, property } = &event
                && let Some(prop) = self.widgets.get_mut(widget).and_then(|w| w.property_mut(property))
            {
                prop.notify();
            }
            self.observers.emit(&event);
        }
    }

    // ---- properties ----

    fn property_of(&self, id: WidgetId, property: &str) -> Result<&Property, PropertyError> {
        let widget = self.widget(id).ok_or(PropertyError::UnknownWidget(id))?;
        widget
            .property(property)
            .ok_or_else(|| PropertyError::NotFound {
                widget: widget.name.clone(),
                property: property.to_string(),
            })
    }

    fn property_mut(&mut self, id: WidgetId, property: &str) -> Result<&mut Property, PropertyError> {
        let widget = self
            .widgets
            .get_mut(&id)
            .ok_or(PropertyError::UnknownWidget(id))?;
        let name = widget.name.clone();
        widget
            .property_mut(property)
            .ok_or(PropertyError::NotFound {
                widget: name,
                property: property.to_string(),
            })
    }

    pub fn get_property(&self, id: WidgetId, property: &str) -> Result<Value, PropertyError> {
        Ok(self.property_of(id, property)?.value().clone())
    }

    /// Parent container adaptor and object of a parented widget.
    fn container_of(&self, id: WidgetId) -> Option<(Arc<ClassAdaptor>, ObjectId)> {
        let parent = self.widget(id)?.parent?;
        let parent = self.widget(parent)?;
        Some((Arc::clone(&parent.adaptor), parent.object))
    }

    /// Runs the adaptor verify gate for a prospective value.
    pub fn verify_property(
        &self,
        id: WidgetId,
        property: &str,
        value: &Value,
    ) -> Result<(), PropertyError> {
        let widget = self.widget(id).ok_or(PropertyError::UnknownWidget(id))?;
        let prop = self.property_of(id, property)?;
        prop.def().check_type(value)?;
        let accepted = if prop.def().packing {
            match self.container_of(id) {
                Some((adaptor, container)) => {
                    adaptor.child_verify_property(self, container, widget.object, property, value)
                }
                None => true,
            }
        } else {
            widget
                .adaptor
                .verify_property(self, widget.object, property, value)
        };
        if !accepted {
            log::warn!("{}: value {value:?} rejected for `{property}`", widget.name);
            return Err(PropertyError::Rejected {
                property: property.to_string(),
            });
        }
        Ok(())
    }

    /// Sets a normal or packing property and pushes it to the toolkit.
    /// Returns `Ok(false)` without touching anything when the property is
    /// disabled or already being assigned.
    pub fn set_property(
        &mut self,
        id: WidgetId,
        property: &str,
        value: Value,
    ) -> Result<bool, PropertyError> {
        let (def, enabled, loading) = {
            let prop = self.property_of(id, property)?;
            (Arc::clone(prop.def()), prop.enabled(), prop.loading)
        };
        if let Err(err) = def.check_type(&value) {
            log::error!("refusing assignment: {err}");
            return Err(err);
        }
        if !enabled || loading {
            return Ok(false);
        }
        let value = def.normalize(value);
        if !self.verify_bypassed() {
            self.verify_property(id, property, &value)?;
        }

        self.property_mut(id, property)?.loading = true;
        let result = self.push_to_toolkit(id, &def, &value);
        self.property_mut(id, property)?.loading = false;
        result?;

        if def.packing {
            let stored = match (self.widget(id).map(|w| w.object), self.container_of(id)) {
                (Some(object), Some((adaptor, container))) => adaptor
                    .child_get_property(self, container, object, property)
                    .unwrap_or(value),
                _ => value,
            };
            self.property_mut(id, property)?.assign(stored);
            if let Some((_, container)) = self.container_of(id) {
                self.refresh_child_packing(container);
            }
        } else {
            self.property_mut(id, property)?.assign(value);
        }
        self.emit(ProjectEvent::PropertyChanged {
            widget: id,
            property: property.to_string(),
        });
        Ok(true)
    }

    fn push_to_toolkit(
        &mut self,
        id: WidgetId,
        def: &PropertyDef,
        value: &Value,
    ) -> Result<(), PropertyError> {
        if def.ignore {
            return Ok(());
        }
        let Some(widget) = self.widget(id) else {
            return Err(PropertyError::UnknownWidget(id));
        };
        let (adaptor, object) = (Arc::clone(&widget.adaptor), widget.object);
        if def.packing {
            if let Some((container_adaptor, container)) = self.container_of(id) {
                container_adaptor.child_set_property(self, container, object, &def.id, value)?;
            }
            return Ok(());
        }
        if def.construct_only && !def.is_virtual {
            return self.rebuild_object(id, &def.id, value);
        }
        if let Some(accessor) = adaptor.accessor(&def.id) {
            accessor.set(&adaptor, self, object, &def.id, value)?;
        }
        Ok(())
    }

    /// Re-applies the stored value of a property to the toolkit.
    pub fn refresh_property(&mut self, id: WidgetId, property: &str) -> Result<(), PropertyError> {
        let prop = self.property_of(id, property)?;
        if !prop.enabled() {
            return Ok(());
        }
        let (def, value) = (Arc::clone(prop.def()), prop.value().clone());
        self.push_superuser();
        let result = self.push_to_toolkit(id, &def, &value);
        self.pop_superuser();
        result
    }

    /// Puts a property back to its class default.
    pub fn reset_property(&mut self, id: WidgetId, property: &str) -> Result<bool, PropertyError> {
        let default = self.property_of(id, property)?.def().default.clone();
        self.set_property(id, property, default)
    }

    pub fn set_property_enabled(
        &mut self,
        id: WidgetId,
        property: &str,
        enabled: bool,
    ) -> Result<(), PropertyError> {
        let prop = self.property_mut(id, property)?;
        if !prop.def().optional || prop.enabled() == enabled {
            return Ok(());
        }
        prop.set_enabled(enabled);
        if enabled {
            self.refresh_property(id, property)?;
        }
        self.emit(ProjectEvent::PropertyChanged {
            widget: id,
            property: property.to_string(),
        });
        Ok(())
    }

    pub fn set_property_sensitive(
        &mut self,
        id: WidgetId,
        property: &str,
        sensitive: bool,
        reason: Option<&str>,
    ) -> Result<(), PropertyError> {
        self.property_mut(id, property)?
            .set_sensitive(sensitive, reason.map(str::to_string));
        Ok(())
    }

    pub fn set_property_i18n(
        &mut self,
        id: WidgetId,
        property: &str,
        i18n: I18n,
    ) -> Result<(), PropertyError> {
        self.property_mut(id, property)?.set_i18n(i18n);
        self.emit(ProjectEvent::PropertyChanged {
            widget: id,
            property: property.to_string(),
        });
        Ok(())
    }

    pub fn set_property_save_always(
        &mut self,
        id: WidgetId,
        property: &str,
        save_always: bool,
    ) -> Result<(), PropertyError> {
        self.property_mut(id, property)?.set_save_always(save_always);
        Ok(())
    }

    /// Re-reads the packing values of every child of `container`.
    pub fn refresh_child_packing(&mut self, container: ObjectId) {
        let Some(adaptor) = self.adaptor_for_object(container) else {
            return;
        };
        let mut updates = Vec::new();
        for child in self.toolkit.children(container) {
            let Some(widget) = self.widget_for_object(child).and_then(|w| self.widget(w)) else {
                continue;
            };
            for prop in &widget.packing_properties {
                if let Ok(value) = adaptor.child_get_property(self, container, child, prop.id()) {
                    updates.push((widget.id, prop.id().to_string(), value));
                }
            }
        }
        self.sync_values(updates);
    }

    /// Re-reads virtual properties that the adaptor can report.
    pub fn refresh_virtual_properties(&mut self, id: WidgetId) {
        let Some(widget) = self.widget(id) else {
            return;
        };
        let adaptor = Arc::clone(&widget.adaptor);
        let updates: Vec<_> = widget
            .properties
            .iter()
            .filter(|p| p.def().is_virtual)
            .filter_map(|p| {
                let accessor = adaptor.accessor(p.id())?;
                let value = accessor.get(&adaptor, self, widget.object, p.id()).ok()?;
                Some((id, p.id().to_string(), value))
            })
            .collect();
        self.sync_values(updates);
    }

    fn sync_values(&mut self, updates: Vec<(WidgetId, String, Value)>) {
        for (widget, property, value) in updates {
            let changed = self
                .property_mut(widget, &property)
                .map(|p| p.assign(value))
                .unwrap_or(false);
            if changed {
                self.emit(ProjectEvent::PropertyChanged { widget, property });
            }
        }
    }

    /// Reconstructs the toolkit object of `id` after a construct-only change.
    fn rebuild_object(&mut self, id: WidgetId, property: &str, value: &Value) -> Result<(), PropertyError> {
        let widget = self.widget(id).ok_or(PropertyError::UnknownWidget(id))?;
        let construct: Vec<(String, Value)> = widget
            .properties
            .iter()
            .filter(|p| p.def().construct_only && !p.def().is_virtual && p.enabled())
            .map(|p| {
                let v = if p.id() == property { value.clone() } else { p.value().clone() };
                (p.id().to_string(), v)
            })
            .collect();
        let object = widget.object;
        self.toolkit.rebuild(object, &construct)?;
        Ok(())
    }

    // ---- creation and parenting ----

    fn alloc_widget_id(&mut self) -> WidgetId {
        let id = WidgetId::new(self.next_widget);
        self.next_widget += 1;
        id
    }

    pub fn new_widget_name(&mut self, base: &str) -> String {
        let suffix = (self.instance > 0).then_some(self.instance);
        self.names.new_name(base, suffix)
    }

    pub fn is_name_available(&self, name: &str) -> bool {
        !name.is_empty() && !self.names.has_name(name)
    }

    fn claim_name(&mut self, id: WidgetId) {
        let Some(widget) = self.widget(id) else {
            return;
        };
        if self.by_name.get(&widget.name) == Some(&id) {
            return;
        }
        let mut name = widget.name.clone();
        let base = widget.adaptor.generic_name.clone();
        if !self.names.add_name(&name) {
            let fresh = self.new_widget_name(&base);
            log::warn!("name `{name}` is taken, renaming to `{fresh}`");
            name = fresh;
            self.names.add_name(&name);
            if let Some(widget) = self.widget_mut(id) {
                widget.name = name.clone();
            }
        }
        self.by_name.insert(name, id);
    }

    fn release_name(&mut self, id: WidgetId) {
        let Some(widget) = self.widget(id) else {
            return;
        };
        if self.by_name.get(&widget.name) == Some(&id) {
            let name = widget.name.clone();
            self.by_name.remove(&name);
            self.names.release_name(&name);
        }
    }

    /// Builds a widget and its toolkit object. The widget starts out
    /// floating; commands attach it to the project.
    pub fn create_widget(
        &mut self,
        adaptor: &Arc<ClassAdaptor>,
        mut options: CreateOptions<'_>,
    ) -> Result<WidgetId, CreateError> {
        let mut properties: Vec<Property> = adaptor
            .properties
            .iter()
            .map(|d| Property::new(Arc::clone(d)))
            .collect();
        for (id, value) in &options.initial {
            let Some(prop) = properties.iter_mut().find(|p| p.id() == id) else {
                return Err(PropertyError::NotFound {
                    widget: adaptor.name.clone(),
                    property: id.clone(),
                }
                .into());
            };
            prop.def().check_type(value)?;
            let value = prop.def().normalize(value.clone());
            prop.assign(value);
            prop.set_enabled(true);
        }

        if options.reason == CreateReason::User
            && let Some(query) = options.query.as_deref_mut()
        {
            for prop in properties.iter_mut().filter(|p| p.def().query) {
                let Some(value) = query.query(adaptor, prop.def(), prop.value()) else {
                    log::info!("creation of {} cancelled", adaptor.name);
                    return Err(CreateError::Cancelled);
                };
                prop.def().check_type(&value)?;
                prop.assign(value);
            }
        }

        let construct: Vec<(String, Value)> = properties
            .iter()
            .filter(|p| p.def().construct_only && !p.def().is_virtual && p.enabled())
            .map(|p| (p.id().to_string(), p.value().clone()))
            .collect();
        let object = adaptor.construct_object(&mut self.toolkit, &construct)?;

        let name = match options.name.take() {
            Some(name) if self.is_name_available(&name) => name,
            _ => self.new_widget_name(&adaptor.generic_name),
        };
        let id = self.alloc_widget_id();
        self.widgets.insert(
            id,
            Widget::new(id, name, Arc::clone(adaptor), object, properties),
        );
        self.by_object.insert(object, id);
        self.claim_name(id);

        let result = self
            .create_internal_children(id, &adaptor.internal_children)
            .and_then(|()| {
                self.push_superuser();
                let synced = self.sync_to_object(id);
                self.pop_superuser();
                synced.map_err(CreateError::from)
            });
        if let Err(err) = result {
            self.destroy_widget(id);
            return Err(err);
        }

        adaptor.post_create(self, id, options.reason);
        log::debug!("created {} `{}`", adaptor.name, self.widget(id).map_or("", |w| w.name.as_str()));
        Ok(id)
    }

    fn create_internal_children(
        &mut self,
        owner: WidgetId,
        specs: &[InternalChildSpec],
    ) -> Result<(), CreateError> {
        for spec in specs {
            let Some(owner_widget) = self.widget(owner) else {
                return Err(PropertyError::UnknownWidget(owner).into());
            };
            let owner_adaptor = Arc::clone(&owner_widget.adaptor);
            let owner_object = owner_widget.object;
            let Some(object) = owner_adaptor.get_internal_child(self, owner_object, &spec.name) else {
                log::error!("{}: no internal child `{}`", owner_adaptor.name, spec.name);
                continue;
            };
            let adaptor = self
                .adaptor_for_object(object)
                .ok_or_else(|| CreateError::UnknownClass(spec.type_name.clone()))?;

            let mut properties = Vec::with_capacity(adaptor.properties.len());
            for def in &adaptor.properties {
                let mut prop = Property::new(Arc::clone(def));
                if let Some(accessor) = adaptor.accessor(&def.id)
                    && let Ok(value) = accessor.get(&adaptor, self, object, &def.id)
                {
                    prop.assign(value);
                }
                properties.push(prop);
            }

            let name = self.new_widget_name(&spec.name);
            let id = self.alloc_widget_id();
            let mut widget = Widget::new(id, name, Arc::clone(&adaptor), object, properties);
            widget.internal = Some(spec.name.clone());
            self.widgets.insert(id, widget);
            self.by_object.insert(object, id);
            self.claim_name(id);

            let parent = self
                .toolkit
                .parent(object)
                .and_then(|p| self.widget_for_object(p))
                .unwrap_or(owner);
            self.set_parent(id, Some(parent), false)?;
            self.create_internal_children(id, &spec.children)?;
        }
        Ok(())
    }

    /// Pushes every enabled property value to the object.
    fn sync_to_object(&mut self, id: WidgetId) -> Result<(), PropertyError> {
        let Some(widget) = self.widget(id) else {
            return Err(PropertyError::UnknownWidget(id));
        };
        let adaptor = Arc::clone(&widget.adaptor);
        let object = widget.object;
        let values: Vec<(String, Value)> = widget
            .properties
            .iter()
            .filter(|p| p.enabled() && !p.def().ignore && !p.def().construct_only)
            .map(|p| (p.id().to_string(), p.value().clone()))
            .collect();
        for (property, value) in values {
            if let Some(accessor) = adaptor.accessor(&property) {
                accessor.set(&adaptor, self, object, &property, &value)?;
            }
        }
        Ok(())
    }

    /// Records a new parent and rebuilds the packing property list from the
    /// parent's adaptor. With `apply_defaults`, class packing defaults are
    /// pushed to the container first.
    pub(crate) fn set_parent(
        &mut self,
        id: WidgetId,
        parent: Option<WidgetId>,
        apply_defaults: bool,
    ) -> Result<(), PropertyError> {
        let widget = self.widget_mut(id).ok_or(PropertyError::UnknownWidget(id))?;
        widget.parent = parent;
        widget.packing_properties.clear();
        let adaptor = Arc::clone(&widget.adaptor);
        let object = widget.object;
        let Some((parent_adaptor, container)) = self.container_of(id) else {
            return Ok(());
        };

        let registry = Arc::clone(&self.registry);
        let mut packing = Vec::with_capacity(parent_adaptor.packing_properties.len());
        self.push_superuser();
        for def in &parent_adaptor.packing_properties {
            let mut prop = Property::new(Arc::clone(def));
            let default = apply_defaults
                .then(|| adaptor.packing_default(&registry, &parent_adaptor, &def.id))
                .flatten()
                .and_then(|s| def.value_from_string(s).ok());
            if let Some(value) = default
                && let Err(err) =
                    parent_adaptor.child_set_property(self, container, object, &def.id, &value)
            {
                log::warn!("{}: packing default for `{}` failed: {err}", adaptor.name, def.id);
            }
            if let Ok(value) = parent_adaptor.child_get_property(self, container, object, &def.id) {
                prop.assign(value);
            }
            packing.push(prop);
        }
        self.pop_superuser();
        if let Some(widget) = self.widget_mut(id) {
            widget.packing_properties = packing;
        }
        Ok(())
    }

    /// Marks a subtree as part of the project. A parentless root becomes a
    /// toplevel.
    pub(crate) fn attach(&mut self, id: WidgetId) {
        for w in self.subtree(id) {
            self.claim_name(w);
            if let Some(widget) = self.widget_mut(w) {
                widget.in_project = true;
            }
            self.emit(ProjectEvent::WidgetAdded(w));
        }
        if self.widget(id).is_some_and(|w| w.parent.is_none()) && !self.toplevels.contains(&id) {
            self.toplevels.push(id);
        }
    }

    pub(crate) fn place_toplevel(&mut self, id: WidgetId, index: usize) {
        if let Some(from) = self.toplevels.iter().position(|t| *t == id) {
            self.toplevels.remove(from);
            let index = index.min(self.toplevels.len());
            self.toplevels.insert(index, id);
        }
    }

    /// Takes a subtree out of the project; the widgets stay alive.
    pub(crate) fn detach(&mut self, id: WidgetId) {
        let subtree = self.subtree(id);
        let before = self.selection.len();
        self.selection.retain(|s| !subtree.contains(s));
        if self.selection.len() != before {
            self.emit(ProjectEvent::SelectionChanged);
        }
        for w in subtree {
            self.release_name(w);
            if let Some(widget) = self.widget_mut(w) {
                widget.in_project = false;
            }
            self.emit(ProjectEvent::WidgetRemoved(w));
        }
        self.toplevels.retain(|t| *t != id);
    }

    /// Drops a floating subtree and its toolkit objects.
    pub(crate) fn destroy_widget(&mut self, id: WidgetId) {
        let Some(object) = self.widget(id).map(|w| w.object) else {
            return;
        };
        for w in self.subtree(id) {
            self.release_name(w);
            if let Some(widget) = self.widgets.remove(&w) {
                self.by_object.remove(&widget.object);
            }
        }
        self.toplevels.retain(|t| *t != id);
        self.toolkit.destroy(object);
        log::trace!("destroyed widget {id}");
    }

    pub fn rename_widget(&mut self, id: WidgetId, name: &str) -> Result<(), CommandError> {
        let widget = self.widget(id).ok_or(CommandError::UnknownWidget(id))?;
        if widget.name == name {
            return Ok(());
        }
        if !self.is_name_available(name) {
            return Err(CommandError::NameTaken(name.to_string()));
        }
        let old_name = widget.name.clone();
        let held = self.by_name.get(&old_name) == Some(&id);
        if held {
            self.release_name(id);
        }
        if let Some(widget) = self.widget_mut(id) {
            widget.name = name.to_string();
        }
        if held {
            self.claim_name(id);
        }
        self.emit(ProjectEvent::WidgetRenamed {
            widget: id,
            old_name,
        });
        Ok(())
    }

    // ---- signals ----

    pub(crate) fn add_signal(&mut self, id: WidgetId, signal: Signal) {
        if let Some(widget) = self.widget_mut(id) {
            widget
                .signals
                .entry(signal.name.clone())
                .or_default()
                .push(signal);
            self.emit(ProjectEvent::SignalsChanged(id));
        }
    }

    pub(crate) fn remove_signal(&mut self, id: WidgetId, signal: &Signal) -> bool {
        let Some(widget) = self.widget_mut(id) else {
            return false;
        };
        let Some(list) = widget.signals.get_mut(&signal.name) else {
            return false;
        };
        let Some(index) = list.iter().position(|s| s == signal) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            widget.signals.shift_remove(&signal.name);
        }
        self.emit(ProjectEvent::SignalsChanged(id));
        true
    }

    pub(crate) fn change_signal(&mut self, id: WidgetId, old: &Signal, new: Signal) -> bool {
        let Some(widget) = self.widget_mut(id) else {
            return false;
        };
        let Some(slot) = widget
            .signals
            .get_mut(&old.name)
            .and_then(|list| list.iter_mut().find(|s| *s == old))
        else {
            return false;
        };
        *slot = new;
        self.emit(ProjectEvent::SignalsChanged(id));
        true
    }

    // ---- selection ----

    pub fn selection(&self) -> &[WidgetId] {
        &self.selection
    }

    /// The toolkit objects behind the selection, in selection order.
    pub fn selected_objects(&self) -> Vec<ObjectId> {
        self.selection
            .iter()
            .filter_map(|w| self.widget(*w).map(|w| w.object))
            .collect()
    }

    pub fn is_selected(&self, id: WidgetId) -> bool {
        self.selection.contains(&id)
    }

    pub fn select(&mut self, id: WidgetId) {
        if self.selection == [id] || !self.widget(id).is_some_and(|w| w.in_project) {
            return;
        }
        self.selection = vec![id];
        self.emit(ProjectEvent::SelectionChanged);
    }

    pub fn toggle_selection(&mut self, id: WidgetId) {
        if let Some(index) = self.selection.iter().position(|s| *s == id) {
            self.selection.remove(index);
        } else if self.widget(id).is_some_and(|w| w.in_project) {
            self.selection.push(id);
        } else {
            return;
        }
        self.emit(ProjectEvent::SelectionChanged);
    }

    pub fn clear_selection(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        self.selection.clear();
        self.emit(ProjectEvent::SelectionChanged);
    }

    // ---- undo history ----

    pub fn stack(&self) -> &UndoStack {
        &self.stack
    }

    pub fn push_group(&mut self, description: &str) {
        self.stack.push_group(description);
    }

    pub fn pop_group(&mut self) {
        if let Some(group) = self.stack.pop_group() {
            self.record(group);
        }
        self.flush_events();
    }

    pub(crate) fn begin_apply(&mut self) {
        self.stack.set_applying(true);
    }

    pub(crate) fn end_apply(&mut self) {
        self.stack.set_applying(false);
        self.flush_events();
    }

    /// Stores an executed command, releasing whatever it evicts.
    pub(crate) fn record(&mut self, command: Box<dyn Command>) {
        for evicted in self.stack.record(command) {
            evicted.discard(self);
        }
        self.emit(ProjectEvent::HistoryChanged);
    }

    pub fn can_undo(&self) -> bool {
        self.stack.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.stack.can_redo()
    }

    /// Reverts the latest command. Returns false when there was none.
    pub fn undo(&mut self) -> Result<bool, CommandError> {
        if self.stack.is_applying() || self.stack.group_depth() > 0 {
            log::error!("undo requested while a command is being recorded");
            return Err(CommandError::Reentrant);
        }
        let Some(mut command) = self.stack.take_undo() else {
            return Ok(false);
        };
        log::debug!("undo: {}", command.description());
        self.begin_apply();
        let result = command.undo(self);
        if result.is_ok() {
            self.stack.push_redo(command);
        } else {
            self.stack.restore_undo(command);
        }
        self.end_apply();
        self.emit(ProjectEvent::HistoryChanged);
        result.map(|()| true)
    }

    /// Replays the latest undone command. Returns false when there was none.
    pub fn redo(&mut self) -> Result<bool, CommandError> {
        if self.stack.is_applying() || self.stack.group_depth() > 0 {
            log::error!("redo requested while a command is being recorded");
            return Err(CommandError::Reentrant);
        }
        let Some(mut command) = self.stack.take_redo() else {
            return Ok(false);
        };
        log::debug!("redo: {}", command.description());
        self.begin_apply();
        let result = command.execute(self);
        if result.is_ok() {
            self.stack.restore_undo(command);
        } else {
            self.stack.push_redo(command);
        }
        self.end_apply();
        self.emit(ProjectEvent::HistoryChanged);
        result.map(|()| true)
    }

    pub fn is_modified(&self) -> bool {
        self.stack.is_modified()
    }

    pub fn mark_saved(&mut self) {
        self.stack.mark_saved();
        self.flush_events();
    }

    /// Releases everything held by the undo history.
    pub fn clear_history(&mut self) {
        for command in self.stack.clear() {
            command.discard(self);
        }
        self.emit(ProjectEvent::HistoryChanged);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::catalog::Catalog;
    use crate::command;
    use crate::toolkit::TypeSystem;

    pub(crate) fn registry() -> Arc<ClassRegistry> {
        let types = Arc::new(TypeSystem::builtin().unwrap());
        Arc::new(ClassRegistry::from_catalogs(types, &[Catalog::builtin().unwrap()]).unwrap())
    }

    pub(crate) fn test_project() -> Project {
        Project::new(registry())
    }

    /// Creates a toplevel widget of `class` through the command layer.
    pub(crate) fn create(project: &mut Project, class: &str) -> WidgetId {
        let adaptor = Arc::clone(project.registry().lookup_by_name(class).unwrap());
        command::create(project, &adaptor, None, None, None).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{create, test_project};
    use super::*;
    use crate::adaptor::PropertyTab;
    use crate::command;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_create_names_and_defaults() {
        let mut project = test_project();
        let a = create(&mut project, "Button");
        let b = create(&mut project, "Button");
        assert_eq!(project.widget(a).unwrap().name(), "button1");
        assert_eq!(project.widget(b).unwrap().name(), "button2");
        assert_eq!(
            project.get_property(a, "label").unwrap(),
            Value::String("button".into())
        );
        let object = project.widget(a).unwrap().object();
        assert_eq!(
            project.toolkit().get_property(object, "label").unwrap(),
            Value::String("button".into())
        );
        assert_eq!(project.toplevels(), &[a, b]);
    }

    #[test]
    fn test_instance_suffix() {
        let mut project = test_project();
        project.set_instance(2);
        let label = create(&mut project, "Label");
        assert_eq!(project.widget(label).unwrap().name(), "label1_2");
    }

    #[test]
    fn test_set_property_unknown_id() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        assert!(matches!(
            project.set_property(label, "nonsense", Value::Int(1)),
            Err(PropertyError::NotFound { .. })
        ));
    }

    #[test]
    fn test_type_mismatch_refused() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        let err = project
            .set_property(label, "label", Value::Int(3))
            .unwrap_err();
        assert!(matches!(err, PropertyError::TypeMismatch { .. }));
        assert_eq!(
            project.get_property(label, "label").unwrap(),
            Value::String("label".into())
        );
    }

    #[test]
    fn test_optional_property_gating() {
        let mut project = test_project();
        let window = create(&mut project, "Window");
        let object = project.widget(window).unwrap().object();
        let before = project.toolkit().get_property(object, "default-width").unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let e = Rc::clone(&events);
        project.connect(move |ev| e.borrow_mut().push(ev.clone()));

        assert!(!project
            .set_property(window, "default-width", Value::Int(600))
            .unwrap());
        assert_eq!(
            project.toolkit().get_property(object, "default-width").unwrap(),
            before
        );
        assert!(events.borrow().is_empty());

        project
            .set_property_enabled(window, "default-width", true)
            .unwrap();
        assert_eq!(
            project.toolkit().get_property(object, "default-width").unwrap(),
            Value::Int(440)
        );
    }

    #[test]
    fn test_loading_guard_blocks_reentry() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        project.property_mut(label, "label").unwrap().loading = true;
        assert!(!project
            .set_property(label, "label", Value::String("x".into()))
            .unwrap());
    }

    #[test]
    fn test_packing_rebuilt_on_reparent() {
        let mut project = test_project();
        let hbox = create(&mut project, "Box");
        let frame = create(&mut project, "Frame");
        let button = create(&mut project, "Button");
        assert!(project.widget(button).unwrap().packing_properties().is_empty());

        command::add_child(&mut project, button, hbox, None).unwrap();
        let ids: Vec<_> = project
            .widget(button)
            .unwrap()
            .packing_properties()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        let expected: Vec<_> = project
            .widget(hbox)
            .unwrap()
            .adaptor()
            .packing_properties
            .iter()
            .map(|d| d.id.clone())
            .collect();
        assert_eq!(ids, expected);
        assert_eq!(
            project.get_property(button, "expand").unwrap(),
            Value::Bool(false)
        );

        command::add_child(&mut project, button, frame, None).unwrap();
        let widget = project.widget(button).unwrap();
        assert!(widget.packing_properties().is_empty());
        assert!(widget.property("position").is_none());
        assert_eq!(widget.parent(), Some(frame));
    }

    #[test]
    fn test_construct_only_rebuilds_object() {
        let mut project = test_project();
        let window = create(&mut project, "Window");
        let child = create(&mut project, "Label");
        command::add_child(&mut project, child, window, None).unwrap();
        let object = project.widget(window).unwrap().object();

        command::set_property(&mut project, window, "type", Value::Enum(1)).unwrap();
        assert_eq!(project.widget(window).unwrap().object(), object);
        assert_eq!(project.widget_for_object(object), Some(window));
        assert_eq!(project.toolkit().get_property(object, "type").unwrap(), Value::Enum(1));
        let child_object = project.widget(child).unwrap().object();
        assert_eq!(project.toolkit().parent(child_object), Some(object));
    }

    #[test]
    fn test_rebuild_keeps_history_references() {
        let mut project = test_project();
        let window = create(&mut project, "Window");
        let label = create(&mut project, "Label");
        let target = Value::Object(Some(project.widget(window).unwrap().object()));
        command::set_property(&mut project, label, "mnemonic-widget", target).unwrap();
        command::set_property(&mut project, window, "type", Value::Enum(1)).unwrap();

        project.undo().unwrap();
        project.undo().unwrap();
        project.redo().unwrap();
        project.redo().unwrap();

        let object = project.widget(window).unwrap().object();
        assert!(project.toolkit().contains(object));
        let reference = project.widget(label).unwrap().property("mnemonic-widget").unwrap().value().clone();
        assert_eq!(reference, Value::Object(Some(object)));
        assert_eq!(project.toolkit().get_property(object, "type").unwrap(), Value::Enum(1));
    }

    #[test]
    fn test_internal_children_wrapped() {
        let mut project = test_project();
        let dialog = create(&mut project, "Dialog");
        let children = project.children(dialog);
        assert_eq!(children.len(), 1);
        let vbox = project.widget(children[0]).unwrap();
        assert_eq!(vbox.internal(), Some("vbox"));
        assert_eq!(vbox.parent(), Some(dialog));
        assert!(vbox.in_project());
        let area = project.children(vbox.id());
        assert_eq!(
            area.iter()
                .filter_map(|w| project.widget(*w))
                .filter_map(|w| w.internal())
                .collect::<Vec<_>>(),
            vec!["action_area"]
        );
        assert_eq!(project.get_property(vbox.id(), "size").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_events_deferred_until_group_closes() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        let events = Rc::new(RefCell::new(Vec::new()));
        let e = Rc::clone(&events);
        project.connect(move |ev| {
            if let ProjectEvent::PropertyChanged { property, .. } = ev {
                e.borrow_mut().push(property.clone());
            }
        });

        project.push_group("Edit");
        command::set_property(&mut project, label, "label", Value::String("a".into())).unwrap();
        command::set_property(&mut project, label, "wrap", Value::Bool(true)).unwrap();
        assert!(events.borrow().is_empty());
        project.pop_group();
        assert_eq!(*events.borrow(), vec!["label", "wrap"]);
    }

    #[test]
    fn test_property_observer_waits_for_group() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let handler = project
            .connect_property(label, "label", move |v| s.borrow_mut().push(v.clone()))
            .unwrap();

        project.push_group("Edit");
        command::set_property(&mut project, label, "label", Value::String("a".into())).unwrap();
        command::set_property(&mut project, label, "label", Value::String("b".into())).unwrap();
        assert!(seen.borrow().is_empty());
        project.pop_group();
        assert_eq!(seen.borrow().last(), Some(&Value::String("b".into())));

        assert!(project.disconnect_property(label, "label", handler));
        let count = seen.borrow().len();
        command::set_property(&mut project, label, "label", Value::String("c".into())).unwrap();
        assert_eq!(seen.borrow().len(), count);
        assert!(project.connect_property(label, "nope", |_| {}).is_err());
    }

    #[test]
    fn test_properties_by_tab_sorted() {
        let mut project = test_project();
        let toggle = create(&mut project, "ToggleButton");
        let widget = project.widget(toggle).unwrap();
        let general = widget.properties_by_tab(PropertyTab::General);
        let weights: Vec<f64> = general.iter().map(|p| p.def().weight).collect();
        let mut sorted = weights.clone();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(weights, sorted);
        assert!(general.iter().any(|p| p.id() == "active"));
        assert!(widget
            .properties_by_tab(PropertyTab::Common)
            .iter()
            .any(|p| p.id() == "visible"));
    }

    #[test]
    fn test_reset_and_save_always() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        project.set_property(label, "wrap", Value::Bool(true)).unwrap();
        assert!(project.reset_property(label, "wrap").unwrap());
        let wrap = |p: &Project| {
            let prop = p.widget(label).unwrap().property("wrap").unwrap();
            (prop.is_default(), prop.should_save())
        };
        assert_eq!(wrap(&project), (true, false));

        project.set_property_save_always(label, "wrap", true).unwrap();
        assert_eq!(wrap(&project), (true, true));
    }

    #[test]
    fn test_selection_follows_detach() {
        let mut project = test_project();
        let label = create(&mut project, "Label");
        project.select(label);
        assert_eq!(project.selection(), &[label]);
        let object = project.widget(label).unwrap().object();
        assert_eq!(project.selected_objects(), vec![object]);
        project.undo().unwrap();
        assert!(project.selection().is_empty());
        assert!(!project.widget(label).unwrap().in_project());
    }
}

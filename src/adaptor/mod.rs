//! Class adaptors: the per-class description of properties, signals and
//! child handling, plus the dispatch surface over their operation tables.

pub mod builtin;
pub mod ops;
pub mod property_def;

pub use ops::{AdaptorOps, PropertyAccessor};
pub use property_def::{PropertyDef, PropertyTab};

use crate::catalog::{ActionDef, CatalogClass, ChildPacking};
use crate::error::{CommandError, RegistryError, ToolkitError};
use crate::project::{CreateReason, Project};
use crate::registry::ClassRegistry;
use crate::toolkit::{InternalChildSpec, ObjectId, Toolkit, TypeKey, TypeSystem};
use crate::value::Value;
use crate::widget::WidgetId;
use ops::{OverrideAccessor, ReflectAccessor, VirtualAccessor};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalDef {
    pub name: String,
    pub owner_type: String,
    pub run_last: bool,
    pub action: bool,
}

#[derive(Debug)]
pub struct ClassAdaptor {
    pub type_key: TypeKey,
    pub name: String,
    pub title: String,
    pub generic_name: String,
    pub catalog: String,
    pub icon_name: String,
    /// Name of the adaptor this one inherited from.
    pub parent_name: Option<String>,
    pub toplevel: bool,
    pub uses_placeholders: bool,
    pub default_width: i32,
    pub default_height: i32,
    pub properties: Vec<Arc<PropertyDef>>,
    pub packing_properties: Vec<Arc<PropertyDef>>,
    pub signals: Vec<SignalDef>,
    /// Packing values this class takes inside particular parents.
    pub child_packings: Vec<ChildPacking>,
    pub internal_children: Vec<InternalChildSpec>,
    pub actions: Vec<ActionDef>,
    pub packing_actions: Vec<ActionDef>,
    pub ops: AdaptorOps,
    accessors: HashMap<String, Arc<dyn PropertyAccessor>>,
}

fn merge_spec(list: &mut Vec<Arc<PropertyDef>>, def: PropertyDef) {
    match list.iter_mut().find(|d| d.id == def.id) {
        Some(slot) => *slot = Arc::new(def),
        None => list.push(Arc::new(def)),
    }
}

impl ClassAdaptor {
    /// Starts an adaptor for `type_key`: the parent's resolved lists come
    /// first, then properties and signals the type itself introduces.
    pub fn new(
        types: &TypeSystem,
        type_key: TypeKey,
        parent: Option<&ClassAdaptor>,
        catalog: &str,
    ) -> Self {
        let info = types.info(type_key);
        let name = info.name.clone();

        let inherit = |list: &[Arc<PropertyDef>]| -> Vec<Arc<PropertyDef>> {
            list.iter().map(|d| Arc::new(d.inherit(&name))).collect()
        };
        let mut properties = parent.map(|p| inherit(&p.properties)).unwrap_or_default();
        let mut packing_properties = parent
            .map(|p| inherit(&p.packing_properties))
            .unwrap_or_default();
        let mut signals = parent.map(|p| p.signals.clone()).unwrap_or_default();

        for spec in info.properties.iter().filter(|s| s.readable && s.writable) {
            merge_spec(&mut properties, PropertyDef::from_param_spec(spec, &name, false));
        }
        for spec in info.child_properties.iter().filter(|s| s.readable && s.writable) {
            merge_spec(
                &mut packing_properties,
                PropertyDef::from_param_spec(spec, &name, true),
            );
        }
        signals.extend(info.signals.iter().map(|s| SignalDef {
            name: s.name.clone(),
            owner_type: name.clone(),
            run_last: s.run_last,
            action: s.action,
        }));

        Self {
            type_key,
            title: name.clone(),
            generic_name: name.to_lowercase(),
            catalog: catalog.to_string(),
            icon_name: parent
                .map(|p| p.icon_name.clone())
                .unwrap_or_else(|| "widget-generic".to_string()),
            parent_name: parent.map(|p| p.name.clone()),
            toplevel: parent.is_some_and(|p| p.toplevel),
            uses_placeholders: parent.is_some_and(|p| p.uses_placeholders),
            default_width: parent.map_or(-1, |p| p.default_width),
            default_height: parent.map_or(-1, |p| p.default_height),
            properties,
            packing_properties,
            signals,
            child_packings: parent.map(|p| p.child_packings.clone()).unwrap_or_default(),
            internal_children: types.internal_children(type_key).to_vec(),
            actions: parent.map(|p| p.actions.clone()).unwrap_or_default(),
            packing_actions: parent.map(|p| p.packing_actions.clone()).unwrap_or_default(),
            ops: parent.map(|p| p.ops).unwrap_or_default(),
            accessors: HashMap::new(),
            name,
        }
    }

    /// Overlays a catalog entry on the inherited and introspected data.
    pub fn extend_from(&mut self, entry: &CatalogClass) -> Result<(), RegistryError> {
        if let Some(title) = &entry.title {
            self.title = title.clone();
        }
        if let Some(generic_name) = &entry.generic_name {
            self.generic_name = generic_name.clone();
        }
        if let Some(icon_name) = &entry.icon_name {
            self.icon_name = icon_name.clone();
        }
        self.toplevel = entry.toplevel.unwrap_or(self.toplevel);
        self.uses_placeholders = entry.uses_placeholders.unwrap_or(self.uses_placeholders);
        self.default_width = entry.default_width.unwrap_or(self.default_width);
        self.default_height = entry.default_height.unwrap_or(self.default_height);

        if let Some(symbol) = &entry.ops {
            let bundle = builtin::lookup_ops(symbol).ok_or_else(|| RegistryError::UnknownOps {
                class: self.name.clone(),
                symbol: symbol.clone(),
            })?;
            self.ops = self.ops.overlay(bundle);
        }

        for (list, entries, packing) in [
            (&mut self.properties, &entry.properties, false),
            (&mut self.packing_properties, &entry.packing_properties, true),
        ] {
            for prop in entries {
                match list.iter_mut().find(|d| d.id == prop.id) {
                    Some(def) => Arc::make_mut(def).update_from(prop)?,
                    None if prop.is_virtual => {
                        list.push(Arc::new(PropertyDef::new_virtual(prop, &self.name, packing)?));
                    }
                    None => {
                        return Err(RegistryError::UnknownProperty {
                            class: self.name.clone(),
                            id: prop.id.clone(),
                        });
                    }
                }
            }
        }

        for packing in &entry.packing_defaults {
            self.child_packings.retain(|p| p.parent != packing.parent);
            self.child_packings.push(packing.clone());
        }
        for action in &entry.actions {
            self.actions.retain(|a| a.id != action.id);
            self.actions.push(action.clone());
        }
        for action in &entry.packing_actions {
            self.packing_actions.retain(|a| a.id != action.id);
            self.packing_actions.push(action.clone());
        }
        Ok(())
    }

    /// Checks id uniqueness, assigns tab weights and resolves accessors.
    pub fn finish(mut self, types: &TypeSystem) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for def in self.properties.iter().chain(&self.packing_properties) {
            if !seen.insert(def.id.as_str()) {
                return Err(RegistryError::DuplicateProperty {
                    class: self.name.clone(),
                    id: def.id.clone(),
                });
            }
        }

        // Counters run on across inheritance levels so a subclass's own
        // properties sort after the inherited ones.
        let mut chain: Vec<&str> = types.ancestry(self.type_key).map(|k| types.name(k)).collect();
        chain.reverse();
        let (mut normal, mut common, mut packing) = (0.0, 0.0, 0.0);
        for level in chain {
            for def in self
                .properties
                .iter_mut()
                .chain(self.packing_properties.iter_mut())
            {
                if !def.visible || def.owner_type != level {
                    continue;
                }
                let counter = match def.tab() {
                    PropertyTab::Packing => &mut packing,
                    PropertyTab::Common => &mut common,
                    PropertyTab::General => &mut normal,
                };
                *counter += 1.0;
                if def.weight < 0.0 {
                    Arc::make_mut(def).weight = *counter;
                }
            }
        }

        let ops = self.ops;
        self.accessors = self
            .properties
            .iter()
            .map(|def| {
                let accessor: Arc<dyn PropertyAccessor> = if def.is_virtual {
                    Arc::new(VirtualAccessor {
                        set: ops.set_property,
                        get: ops.get_property,
                    })
                } else if let Some(set) = ops.set_property {
                    Arc::new(OverrideAccessor {
                        set,
                        get: ops.get_property,
                    })
                } else {
                    Arc::new(ReflectAccessor)
                };
                (def.id.clone(), accessor)
            })
            .collect();
        Ok(self)
    }

    pub fn property_def(&self, id: &str) -> Option<&Arc<PropertyDef>> {
        self.properties.iter().find(|d| d.id == id)
    }

    pub fn packing_def(&self, id: &str) -> Option<&Arc<PropertyDef>> {
        self.packing_properties.iter().find(|d| d.id == id)
    }

    pub fn signal(&self, name: &str) -> Option<&SignalDef> {
        self.signals.iter().find(|s| s.name == name)
    }

    pub fn accessor(&self, id: &str) -> Option<Arc<dyn PropertyAccessor>> {
        self.accessors.get(id).cloned()
    }

    /// Packing default for property `id` when this class is a child of
    /// `container`, searching the container's adaptor chain.
    pub fn packing_default<'a>(
        &'a self,
        registry: &ClassRegistry,
        container: &ClassAdaptor,
        id: &str,
    ) -> Option<&'a str> {
        let mut current = Some(container);
        while let Some(adaptor) = current {
            if let Some(value) = self
                .child_packings
                .iter()
                .find(|p| p.parent == adaptor.name)
                .and_then(|p| p.defaults.get(id))
                .map(String::as_str)
            {
                return Some(value);
            }
            current = adaptor
                .parent_name
                .as_deref()
                .and_then(|n| registry.lookup_by_name(n))
                .map(|a| a.as_ref());
        }
        None
    }

    pub fn is_container(&self) -> bool {
        self.ops.is_container()
    }

    fn missing(&self, op: &'static str) -> ToolkitError {
        if self.is_container() {
            log::error!("{}: container adaptor resolves no `{op}` operation", self.name);
        }
        ToolkitError::Unsupported {
            class: self.name.clone(),
            op,
        }
    }

    pub fn construct_object(
        &self,
        toolkit: &mut Toolkit,
        construct: &[(String, Value)],
    ) -> Result<ObjectId, ToolkitError> {
        match self.ops.construct_object {
            Some(construct_object) => construct_object(self, toolkit, construct),
            None => ops::defaults::construct_object(self, toolkit, construct),
        }
    }

    pub fn post_create(&self, project: &mut Project, widget: WidgetId, reason: CreateReason) {
        if let Some(post_create) = self.ops.post_create {
            post_create(self, project, widget, reason);
        }
    }

    pub fn add_child(
        &self,
        project: &mut Project,
        container: ObjectId,
        child: ObjectId,
    ) -> Result<(), ToolkitError> {
        match self.ops.add {
            Some(add) => add(self, project, container, child),
            None => Err(self.missing("add")),
        }
    }

    pub fn remove_child(
        &self,
        project: &mut Project,
        container: ObjectId,
        child: ObjectId,
    ) -> Result<(), ToolkitError> {
        match self.ops.remove {
            Some(remove) => remove(self, project, container, child),
            None => Err(self.missing("remove")),
        }
    }

    pub fn get_children(&self, project: &Project, container: ObjectId) -> Vec<ObjectId> {
        match self.ops.get_children {
            Some(get_children) => get_children(self, project, container),
            None => Vec::new(),
        }
    }

    pub fn replace_child(
        &self,
        project: &mut Project,
        container: ObjectId,
        old: ObjectId,
        new: ObjectId,
    ) -> Result<(), ToolkitError> {
        match self.ops.replace_child {
            Some(replace_child) => replace_child(self, project, container, old, new),
            None => Err(self.missing("replace_child")),
        }
    }

    pub fn child_set_property(
        &self,
        project: &mut Project,
        container: ObjectId,
        child: ObjectId,
        id: &str,
        value: &Value,
    ) -> Result<(), ToolkitError> {
        match self.ops.child_set_property {
            Some(set) => set(self, project, container, child, id, value),
            None => Err(self.missing("child_set_property")),
        }
    }

    pub fn child_get_property(
        &self,
        project: &Project,
        container: ObjectId,
        child: ObjectId,
        id: &str,
    ) -> Result<Value, ToolkitError> {
        match self.ops.child_get_property {
            Some(get) => get(self, project, container, child, id),
            None => Err(self.missing("child_get_property")),
        }
    }

    /// Advisory gate run before a user edit is committed.
    pub fn verify_property(
        &self,
        project: &Project,
        object: ObjectId,
        id: &str,
        value: &Value,
    ) -> bool {
        self.ops
            .verify_property
            .is_none_or(|verify| verify(self, project, object, id, value))
    }

    pub fn child_verify_property(
        &self,
        project: &Project,
        container: ObjectId,
        child: ObjectId,
        id: &str,
        value: &Value,
    ) -> bool {
        self.ops
            .child_verify_property
            .is_none_or(|verify| verify(self, project, container, child, id, value))
    }

    pub fn get_internal_child(
        &self,
        project: &Project,
        object: ObjectId,
        name: &str,
    ) -> Option<ObjectId> {
        self.ops
            .get_internal_child
            .and_then(|get| get(self, project, object, name))
    }

    pub fn activate_action(
        &self,
        project: &mut Project,
        object: ObjectId,
        action: &str,
    ) -> Result<(), CommandError> {
        match self.ops.action_activate {
            Some(activate) if self.actions.iter().any(|a| a.id == action) => {
                activate(self, project, object, action)
            }
            _ => Err(CommandError::UnknownAction {
                class: self.name.clone(),
                action: action.to_string(),
            }),
        }
    }

    pub fn activate_child_action(
        &self,
        project: &mut Project,
        container: ObjectId,
        child: ObjectId,
        action: &str,
    ) -> Result<(), CommandError> {
        match self.ops.child_action_activate {
            Some(activate) if self.packing_actions.iter().any(|a| a.id == action) => {
                activate(self, project, container, child, action)
            }
            _ => Err(CommandError::UnknownAction {
                class: self.name.clone(),
                action: action.to_string(),
            }),
        }
    }
}

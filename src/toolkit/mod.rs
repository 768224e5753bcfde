//! Retained toolkit binding: the live objects the designer model mirrors.

pub mod types;

pub use types::{ContainerKind, InternalChildSpec, ParamSpec, TypeInfo, TypeKey, TypeSystem};

use crate::error::ToolkitError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

#[derive(Debug)]
struct ChildSlot {
    object: ObjectId,
    packing: HashMap<String, Value>,
}

#[derive(Debug)]
struct ObjectData {
    type_key: TypeKey,
    properties: HashMap<String, Value>,
    parent: Option<ObjectId>,
    children: Vec<ChildSlot>,
    internal: Vec<(String, ObjectId)>,
}

/// Object store for one project.
#[derive(Debug)]
pub struct Toolkit {
    types: Arc<TypeSystem>,
    objects: HashMap<ObjectId, ObjectData>,
    next_id: u64,
}

fn check_type(spec: &ParamSpec, value: &Value) -> Result<(), ToolkitError> {
    if spec.value_type != value.value_type() {
        return Err(ToolkitError::TypeMismatch {
            property: spec.name.clone(),
            expected: spec.value_type,
            found: value.value_type(),
        });
    }
    Ok(())
}

impl Toolkit {
    pub fn new(types: Arc<TypeSystem>) -> Self {
        Self {
            types,
            objects: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn types(&self) -> &TypeSystem {
        &self.types
    }

    fn data(&self, id: ObjectId) -> Result<&ObjectData, ToolkitError> {
        self.objects.get(&id).ok_or(ToolkitError::UnknownObject(id))
    }

    fn data_mut(&mut self, id: ObjectId) -> Result<&mut ObjectData, ToolkitError> {
        self.objects
            .get_mut(&id)
            .ok_or(ToolkitError::UnknownObject(id))
    }

    fn alloc(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn type_of(&self, id: ObjectId) -> Result<TypeKey, ToolkitError> {
        Ok(self.data(id)?.type_key)
    }

    pub fn type_name(&self, id: ObjectId) -> Result<&str, ToolkitError> {
        let key = self.type_of(id)?;
        Ok(self.types.name(key))
    }

    pub fn is_placeholder(&self, id: ObjectId) -> bool {
        self.type_name(id)
            .map(|n| n == types::PLACEHOLDER_TYPE)
            .unwrap_or(false)
    }

    pub fn container_kind(&self, id: ObjectId) -> Result<ContainerKind, ToolkitError> {
        let key = self.type_of(id)?;
        Ok(self.types.info(key).container)
    }

    /// Constructs an object, applying `construct` over the type defaults and
    /// building the type's internal children.
    pub fn create(
        &mut self,
        type_key: TypeKey,
        construct: &[(String, Value)],
    ) -> Result<ObjectId, ToolkitError> {
        let types = Arc::clone(&self.types);
        let info = types.info(type_key);
        if info.is_abstract {
            return Err(ToolkitError::Abstract(info.name.clone()));
        }

        let mut properties: HashMap<String, Value> = types
            .all_properties(type_key)
            .into_iter()
            .map(|spec| (spec.name.clone(), spec.default.clone()))
            .collect();
        for (name, value) in construct {
            let spec = types.find_property(type_key, name).ok_or_else(|| {
                ToolkitError::UnknownProperty {
                    type_name: info.name.clone(),
                    property: name.clone(),
                }
            })?;
            check_type(spec, value)?;
            properties.insert(name.clone(), value.clone());
        }

        let id = self.alloc();
        self.objects.insert(
            id,
            ObjectData {
                type_key,
                properties,
                parent: None,
                children: Vec::new(),
                internal: Vec::new(),
            },
        );
        for spec in types.internal_children(type_key) {
            self.create_internal(id, spec)?;
        }
        log::trace!("created {} ({})", id, info.name);
        Ok(id)
    }

    fn create_internal(
        &mut self,
        owner: ObjectId,
        spec: &InternalChildSpec,
    ) -> Result<(), ToolkitError> {
        let key = self
            .types
            .lookup(&spec.type_name)
            .ok_or_else(|| ToolkitError::UnknownType(spec.type_name.clone()))?;
        let child = self.create(key, &[])?;
        self.add(owner, child)?;
        for nested in &spec.children {
            self.create_internal(child, nested)?;
        }
        self.data_mut(owner)?.internal.push((spec.name.clone(), child));
        Ok(())
    }

    pub fn create_placeholder(&mut self) -> Result<ObjectId, ToolkitError> {
        let key = self
            .types
            .lookup(types::PLACEHOLDER_TYPE)
            .ok_or_else(|| ToolkitError::UnknownType(types::PLACEHOLDER_TYPE.to_string()))?;
        self.create(key, &[])
    }

    /// Destroys an object and everything below it.
    pub fn destroy(&mut self, id: ObjectId) {
        let Some(data) = self.objects.get(&id) else {
            return;
        };
        let parent = data.parent;
        let children: Vec<ObjectId> = data.children.iter().map(|c| c.object).collect();
        for child in children {
            if let Some(c) = self.objects.get_mut(&child) {
                c.parent = None;
            }
            self.destroy(child);
        }
        if let Some(parent) = parent {
            let _ = self.remove(parent, id);
        }
        self.objects.remove(&id);
    }

    pub fn set_property(
        &mut self,
        id: ObjectId,
        name: &str,
        value: &Value,
    ) -> Result<(), ToolkitError> {
        let key = self.type_of(id)?;
        let spec = self.types.find_property(key, name).ok_or_else(|| {
            ToolkitError::UnknownProperty {
                type_name: self.types.name(key).to_string(),
                property: name.to_string(),
            }
        })?;
        if spec.construct_only {
            return Err(ToolkitError::ConstructOnly(name.to_string()));
        }
        check_type(spec, value)?;
        self.data_mut(id)?
            .properties
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    pub fn get_property(&self, id: ObjectId, name: &str) -> Result<Value, ToolkitError> {
        let data = self.data(id)?;
        let spec = self
            .types
            .find_property(data.type_key, name)
            .ok_or_else(|| ToolkitError::UnknownProperty {
                type_name: self.types.name(data.type_key).to_string(),
                property: name.to_string(),
            })?;
        Ok(data
            .properties
            .get(name)
            .cloned()
            .unwrap_or_else(|| spec.default.clone()))
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects.get(&id).and_then(|d| d.parent)
    }

    pub fn children(&self, id: ObjectId) -> Vec<ObjectId> {
        self.objects
            .get(&id)
            .map(|d| d.children.iter().map(|c| c.object).collect())
            .unwrap_or_default()
    }

    pub fn index_of(&self, container: ObjectId, child: ObjectId) -> Option<usize> {
        self.objects
            .get(&container)?
            .children
            .iter()
            .position(|c| c.object == child)
    }

    /// Looks up an internal child by name, searching nested composites.
    pub fn internal_child(&self, id: ObjectId, name: &str) -> Option<ObjectId> {
        let data = self.objects.get(&id)?;
        data.internal
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, o)| *o)
            .or_else(|| {
                data.internal
                    .iter()
                    .find_map(|(_, o)| self.internal_child(*o, name))
            })
    }

    fn container_checked(&self, container: ObjectId) -> Result<ContainerKind, ToolkitError> {
        let kind = self.container_kind(container)?;
        if kind == ContainerKind::None {
            return Err(ToolkitError::NotAContainer(
                self.type_name(container)?.to_string(),
            ));
        }
        Ok(kind)
    }

    fn default_packing(&self, container: ObjectId) -> Result<HashMap<String, Value>, ToolkitError> {
        let key = self.type_of(container)?;
        Ok(self
            .types
            .all_child_properties(key)
            .into_iter()
            .map(|spec| (spec.name.clone(), spec.default.clone()))
            .collect())
    }

    fn renumber(&mut self, container: ObjectId) -> Result<(), ToolkitError> {
        if self.container_kind(container)? != ContainerKind::Box {
            return Ok(());
        }
        for (i, slot) in self.data_mut(container)?.children.iter_mut().enumerate() {
            slot.packing.insert("position".to_string(), Value::Int(i as i64));
        }
        Ok(())
    }

    pub fn add(&mut self, container: ObjectId, child: ObjectId) -> Result<(), ToolkitError> {
        let len = self.data(container)?.children.len();
        self.insert(container, len, child)
    }

    pub fn insert(
        &mut self,
        container: ObjectId,
        index: usize,
        child: ObjectId,
    ) -> Result<(), ToolkitError> {
        let kind = self.container_checked(container)?;
        if self.data(child)?.parent.is_some() {
            return Err(ToolkitError::AlreadyParented(child));
        }
        if kind == ContainerKind::Bin && !self.data(container)?.children.is_empty() {
            return Err(ToolkitError::SlotOccupied(
                self.type_name(container)?.to_string(),
            ));
        }
        let packing = self.default_packing(container)?;
        let data = self.data_mut(container)?;
        let index = index.min(data.children.len());
        data.children.insert(
            index,
            ChildSlot {
                object: child,
                packing,
            },
        );
        self.data_mut(child)?.parent = Some(container);
        self.renumber(container)
    }

    pub fn remove(&mut self, container: ObjectId, child: ObjectId) -> Result<(), ToolkitError> {
        self.container_checked(container)?;
        let index = self
            .index_of(container, child)
            .ok_or(ToolkitError::NotAChild { container, child })?;
        self.data_mut(container)?.children.remove(index);
        if let Some(c) = self.objects.get_mut(&child) {
            c.parent = None;
        }
        self.renumber(container)
    }

    /// Puts `new` into the slot held by `old`, keeping the slot's packing.
    pub fn replace(
        &mut self,
        container: ObjectId,
        old: ObjectId,
        new: ObjectId,
    ) -> Result<(), ToolkitError> {
        self.container_checked(container)?;
        if self.data(new)?.parent.is_some() {
            return Err(ToolkitError::AlreadyParented(new));
        }
        let index = self
            .index_of(container, old)
            .ok_or(ToolkitError::NotAChild {
                container,
                child: old,
            })?;
        self.data_mut(container)?.children[index].object = new;
        self.data_mut(new)?.parent = Some(container);
        if let Some(o) = self.objects.get_mut(&old) {
            o.parent = None;
        }
        Ok(())
    }

    /// Moves `child` to `index` (clamped); other children keep their
    /// relative order.
    pub fn reorder(
        &mut self,
        container: ObjectId,
        child: ObjectId,
        index: usize,
    ) -> Result<(), ToolkitError> {
        let from = self
            .index_of(container, child)
            .ok_or(ToolkitError::NotAChild { container, child })?;
        let data = self.data_mut(container)?;
        let slot = data.children.remove(from);
        let index = index.min(data.children.len());
        data.children.insert(index, slot);
        self.renumber(container)
    }

    pub fn child_set_property(
        &mut self,
        container: ObjectId,
        child: ObjectId,
        name: &str,
        value: &Value,
    ) -> Result<(), ToolkitError> {
        let key = self.type_of(container)?;
        let spec = self
            .types
            .find_child_property(key, name)
            .ok_or_else(|| ToolkitError::UnknownProperty {
                type_name: self.types.name(key).to_string(),
                property: name.to_string(),
            })?;
        check_type(spec, value)?;
        let index = self
            .index_of(container, child)
            .ok_or(ToolkitError::NotAChild { container, child })?;

        if self.types.info(key).container == ContainerKind::Box && name == "position" {
            let last = self.data(container)?.children.len().saturating_sub(1);
            let target = match value.as_int() {
                Some(p) if p >= 0 => (p as usize).min(last),
                _ => last,
            };
            return self.reorder(container, child, target);
        }

        self.data_mut(container)?.children[index]
            .packing
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    pub fn child_get_property(
        &self,
        container: ObjectId,
        child: ObjectId,
        name: &str,
    ) -> Result<Value, ToolkitError> {
        let data = self.data(container)?;
        let spec = self
            .types
            .find_child_property(data.type_key, name)
            .ok_or_else(|| ToolkitError::UnknownProperty {
                type_name: self.types.name(data.type_key).to_string(),
                property: name.to_string(),
            })?;
        let slot = data
            .children
            .iter()
            .find(|c| c.object == child)
            .ok_or(ToolkitError::NotAChild { container, child })?;
        Ok(slot
            .packing
            .get(name)
            .cloned()
            .unwrap_or_else(|| spec.default.clone()))
    }

    /// Reconstructs an object in place with new construct-time values.
    /// The id stays valid, so children, internal children, the parent slot
    /// and any stored references to it are unaffected.
    pub fn rebuild(&mut self, id: ObjectId, construct: &[(String, Value)]) -> Result<(), ToolkitError> {
        let key = self.type_of(id)?;
        for (name, value) in construct {
            let spec = self.types.find_property(key, name).ok_or_else(|| {
                ToolkitError::UnknownProperty {
                    type_name: self.types.name(key).to_string(),
                    property: name.clone(),
                }
            })?;
            check_type(spec, value)?;
        }

        let data = self.data_mut(id)?;
        for (name, value) in construct {
            data.properties.insert(name.clone(), value.clone());
        }
        log::debug!("rebuilt {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolkit() -> Toolkit {
        Toolkit::new(Arc::new(TypeSystem::builtin().unwrap()))
    }

    fn create(tk: &mut Toolkit, name: &str) -> ObjectId {
        let key = tk.types().lookup(name).unwrap();
        tk.create(key, &[]).unwrap()
    }

    #[test]
    fn test_create_applies_defaults_and_construct_props() {
        let mut tk = toolkit();
        let label = create(&mut tk, "Label");
        assert_eq!(tk.get_property(label, "xalign").unwrap(), Value::Float(0.5));

        let key = tk.types().lookup("Window").unwrap();
        let window = tk
            .create(key, &[("type".to_string(), Value::Enum(1))])
            .unwrap();
        assert_eq!(tk.get_property(window, "type").unwrap(), Value::Enum(1));
        assert!(matches!(
            tk.set_property(window, "type", &Value::Enum(0)),
            Err(ToolkitError::ConstructOnly(_))
        ));
    }

    #[test]
    fn test_abstract_types_cannot_be_created() {
        let mut tk = toolkit();
        let key = tk.types().lookup("Container").unwrap();
        assert!(matches!(tk.create(key, &[]), Err(ToolkitError::Abstract(_))));
    }

    #[test]
    fn test_set_property_type_checked() {
        let mut tk = toolkit();
        let label = create(&mut tk, "Label");
        let err = tk
            .set_property(label, "label", &Value::Int(3))
            .unwrap_err();
        assert!(matches!(err, ToolkitError::TypeMismatch { .. }));
        tk.set_property(label, "label", &Value::String("Hi".into()))
            .unwrap();
        assert_eq!(
            tk.get_property(label, "label").unwrap(),
            Value::String("Hi".into())
        );
    }

    #[test]
    fn test_box_position_tracks_order() {
        let mut tk = toolkit();
        let hbox = create(&mut tk, "Box");
        let a = create(&mut tk, "Label");
        let b = create(&mut tk, "Label");
        let c = create(&mut tk, "Label");
        tk.add(hbox, a).unwrap();
        tk.add(hbox, b).unwrap();
        tk.add(hbox, c).unwrap();

        tk.child_set_property(hbox, a, "position", &Value::Int(2))
            .unwrap();
        assert_eq!(tk.children(hbox), vec![b, c, a]);
        assert_eq!(
            tk.child_get_property(hbox, b, "position").unwrap(),
            Value::Int(0)
        );

        tk.child_set_property(hbox, c, "position", &Value::Int(99))
            .unwrap();
        assert_eq!(tk.children(hbox), vec![b, a, c]);
    }

    #[test]
    fn test_bin_holds_one_child() {
        let mut tk = toolkit();
        let frame = create(&mut tk, "Frame");
        let a = create(&mut tk, "Label");
        let b = create(&mut tk, "Label");
        tk.add(frame, a).unwrap();
        assert!(matches!(tk.add(frame, b), Err(ToolkitError::SlotOccupied(_))));
        tk.replace(frame, a, b).unwrap();
        assert_eq!(tk.children(frame), vec![b]);
        assert_eq!(tk.parent(a), None);
    }

    #[test]
    fn test_non_container_rejects_children() {
        let mut tk = toolkit();
        let label = create(&mut tk, "Label");
        let other = create(&mut tk, "Label");
        assert!(matches!(
            tk.add(label, other),
            Err(ToolkitError::NotAContainer(_))
        ));
    }

    #[test]
    fn test_internal_children_created() {
        let mut tk = toolkit();
        let dialog = create(&mut tk, "Dialog");
        let vbox = tk.internal_child(dialog, "vbox").unwrap();
        let area = tk.internal_child(dialog, "action_area").unwrap();
        assert_eq!(tk.parent(vbox), Some(dialog));
        assert_eq!(tk.parent(area), Some(vbox));
    }

    #[test]
    fn test_rebuild_keeps_children_and_slot() {
        let mut tk = toolkit();
        let hbox = create(&mut tk, "Box");
        let key = tk.types().lookup("Window").unwrap();
        let window = tk.create(key, &[]).unwrap();
        tk.add(window, hbox).unwrap();
        tk.set_property(window, "title", &Value::String("Main".into()))
            .unwrap();

        tk.rebuild(window, &[("type".to_string(), Value::Enum(1))])
            .unwrap();
        assert!(tk.contains(window));
        assert_eq!(tk.children(window), vec![hbox]);
        assert_eq!(tk.parent(hbox), Some(window));
        assert_eq!(
            tk.get_property(window, "title").unwrap(),
            Value::String("Main".into())
        );
        assert_eq!(tk.get_property(window, "type").unwrap(), Value::Enum(1));
    }

    #[test]
    fn test_destroy_is_recursive() {
        let mut tk = toolkit();
        let hbox = create(&mut tk, "Box");
        let a = create(&mut tk, "Label");
        tk.add(hbox, a).unwrap();
        tk.destroy(hbox);
        assert!(!tk.contains(hbox));
        assert!(!tk.contains(a));
        assert_eq!(tk.len(), 0);
    }
}

//! Capability tables and property accessors.

use super::ClassAdaptor;
use crate::error::{CommandError, ToolkitError};
use crate::project::{CreateReason, Project};
use crate::toolkit::{ObjectId, Toolkit};
use crate::value::Value;
use crate::widget::WidgetId;
use std::fmt;

pub type ConstructFn =
    fn(&ClassAdaptor, &mut Toolkit, &[(String, Value)]) -> Result<ObjectId, ToolkitError>;
pub type PostCreateFn = fn(&ClassAdaptor, &mut Project, WidgetId, CreateReason);
pub type SetPropertyFn =
    fn(&ClassAdaptor, &mut Project, ObjectId, &str, &Value) -> Result<(), ToolkitError>;
pub type GetPropertyFn = fn(&ClassAdaptor, &Project, ObjectId, &str) -> Result<Value, ToolkitError>;
pub type VerifyPropertyFn = fn(&ClassAdaptor, &Project, ObjectId, &str, &Value) -> bool;
pub type ChildFn = fn(&ClassAdaptor, &mut Project, ObjectId, ObjectId) -> Result<(), ToolkitError>;
pub type GetChildrenFn = fn(&ClassAdaptor, &Project, ObjectId) -> Vec<ObjectId>;
pub type ReplaceChildFn =
    fn(&ClassAdaptor, &mut Project, ObjectId, ObjectId, ObjectId) -> Result<(), ToolkitError>;
pub type ChildSetPropertyFn = fn(
    &ClassAdaptor,
    &mut Project,
    ObjectId,
    ObjectId,
    &str,
    &Value,
) -> Result<(), ToolkitError>;
pub type ChildGetPropertyFn =
    fn(&ClassAdaptor, &Project, ObjectId, ObjectId, &str) -> Result<Value, ToolkitError>;
pub type ChildVerifyPropertyFn = fn(&ClassAdaptor, &Project, ObjectId, ObjectId, &str, &Value) -> bool;
pub type InternalChildFn = fn(&ClassAdaptor, &Project, ObjectId, &str) -> Option<ObjectId>;
pub type ActionFn = fn(&ClassAdaptor, &mut Project, ObjectId, &str) -> Result<(), CommandError>;
pub type ChildActionFn =
    fn(&ClassAdaptor, &mut Project, ObjectId, ObjectId, &str) -> Result<(), CommandError>;

/// Resolved operation table of an adaptor. Built by copying the nearest
/// ancestor's table and overlaying the class's own bundle.
#[derive(Clone, Copy, Default)]
pub struct AdaptorOps {
    pub construct_object: Option<ConstructFn>,
    pub post_create: Option<PostCreateFn>,
    pub set_property: Option<SetPropertyFn>,
    pub get_property: Option<GetPropertyFn>,
    pub verify_property: Option<VerifyPropertyFn>,
    pub add: Option<ChildFn>,
    pub remove: Option<ChildFn>,
    pub get_children: Option<GetChildrenFn>,
    pub replace_child: Option<ReplaceChildFn>,
    pub child_set_property: Option<ChildSetPropertyFn>,
    pub child_get_property: Option<ChildGetPropertyFn>,
    pub child_verify_property: Option<ChildVerifyPropertyFn>,
    pub get_internal_child: Option<InternalChildFn>,
    pub action_activate: Option<ActionFn>,
    pub child_action_activate: Option<ChildActionFn>,
}

impl AdaptorOps {
    /// Slots set in `overrides` win; the rest keep their inherited value.
    pub fn overlay(self, overrides: AdaptorOps) -> Self {
        Self {
            construct_object: overrides.construct_object.or(self.construct_object),
            post_create: overrides.post_create.or(self.post_create),
            set_property: overrides.set_property.or(self.set_property),
            get_property: overrides.get_property.or(self.get_property),
            verify_property: overrides.verify_property.or(self.verify_property),
            add: overrides.add.or(self.add),
            remove: overrides.remove.or(self.remove),
            get_children: overrides.get_children.or(self.get_children),
            replace_child: overrides.replace_child.or(self.replace_child),
            child_set_property: overrides.child_set_property.or(self.child_set_property),
            child_get_property: overrides.child_get_property.or(self.child_get_property),
            child_verify_property: overrides
                .child_verify_property
                .or(self.child_verify_property),
            get_internal_child: overrides.get_internal_child.or(self.get_internal_child),
            action_activate: overrides.action_activate.or(self.action_activate),
            child_action_activate: overrides
                .child_action_activate
                .or(self.child_action_activate),
        }
    }

    pub fn is_container(&self) -> bool {
        self.add.is_some() && self.remove.is_some() && self.get_children.is_some()
    }
}

impl fmt::Debug for AdaptorOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptorOps")
            .field("construct_object", &self.construct_object.is_some())
            .field("post_create", &self.post_create.is_some())
            .field("set_property", &self.set_property.is_some())
            .field("get_property", &self.get_property.is_some())
            .field("verify_property", &self.verify_property.is_some())
            .field("add", &self.add.is_some())
            .field("remove", &self.remove.is_some())
            .field("get_children", &self.get_children.is_some())
            .field("replace_child", &self.replace_child.is_some())
            .field("child_set_property", &self.child_set_property.is_some())
            .field("child_get_property", &self.child_get_property.is_some())
            .field("child_verify_property", &self.child_verify_property.is_some())
            .field("get_internal_child", &self.get_internal_child.is_some())
            .field("action_activate", &self.action_activate.is_some())
            .field("child_action_activate", &self.child_action_activate.is_some())
            .finish()
    }
}

/// Reads and writes one property on a live object.
pub trait PropertyAccessor: Send + Sync + fmt::Debug {
    fn set(
        &self,
        adaptor: &ClassAdaptor,
        project: &mut Project,
        object: ObjectId,
        id: &str,
        value: &Value,
    ) -> Result<(), ToolkitError>;

    fn get(
        &self,
        adaptor: &ClassAdaptor,
        project: &Project,
        object: ObjectId,
        id: &str,
    ) -> Result<Value, ToolkitError>;
}

/// Plain toolkit property access.
#[derive(Debug)]
pub struct ReflectAccessor;

impl PropertyAccessor for ReflectAccessor {
    fn set(
        &self,
        _adaptor: &ClassAdaptor,
        project: &mut Project,
        object: ObjectId,
        id: &str,
        value: &Value,
    ) -> Result<(), ToolkitError> {
        project.toolkit_mut().set_property(object, id, value)
    }

    fn get(
        &self,
        _adaptor: &ClassAdaptor,
        project: &Project,
        object: ObjectId,
        id: &str,
    ) -> Result<Value, ToolkitError> {
        project.toolkit().get_property(object, id)
    }
}

/// Routes through the class's property overrides.
pub struct OverrideAccessor {
    pub set: SetPropertyFn,
    pub get: Option<GetPropertyFn>,
}

impl fmt::Debug for OverrideAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideAccessor")
            .field("get", &self.get.is_some())
            .finish()
    }
}

impl PropertyAccessor for OverrideAccessor {
    fn set(
        &self,
        adaptor: &ClassAdaptor,
        project: &mut Project,
        object: ObjectId,
        id: &str,
        value: &Value,
    ) -> Result<(), ToolkitError> {
        (self.set)(adaptor, project, object, id, value)
    }

    fn get(
        &self,
        adaptor: &ClassAdaptor,
        project: &Project,
        object: ObjectId,
        id: &str,
    ) -> Result<Value, ToolkitError> {
        match self.get {
            Some(get) => get(adaptor, project, object, id),
            None => project.toolkit().get_property(object, id),
        }
    }
}

/// Virtual properties only exist in the model; overrides give them effect.
pub struct VirtualAccessor {
    pub set: Option<SetPropertyFn>,
    pub get: Option<GetPropertyFn>,
}

impl fmt::Debug for VirtualAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualAccessor")
            .field("set", &self.set.is_some())
            .field("get", &self.get.is_some())
            .finish()
    }
}

impl PropertyAccessor for VirtualAccessor {
    fn set(
        &self,
        adaptor: &ClassAdaptor,
        project: &mut Project,
        object: ObjectId,
        id: &str,
        value: &Value,
    ) -> Result<(), ToolkitError> {
        match self.set {
            Some(set) => set(adaptor, project, object, id, value),
            None => Ok(()),
        }
    }

    fn get(
        &self,
        adaptor: &ClassAdaptor,
        project: &Project,
        object: ObjectId,
        id: &str,
    ) -> Result<Value, ToolkitError> {
        match self.get {
            Some(get) => get(adaptor, project, object, id),
            None => Err(ToolkitError::Unsupported {
                class: adaptor.name.clone(),
                op: "get_property",
            }),
        }
    }
}

/// Generic implementations backed directly by the toolkit.
pub mod defaults {
    use super::*;

    pub fn construct_object(
        adaptor: &ClassAdaptor,
        toolkit: &mut Toolkit,
        construct: &[(String, Value)],
    ) -> Result<ObjectId, ToolkitError> {
        toolkit.create(adaptor.type_key, construct)
    }

    pub fn set_property(
        _adaptor: &ClassAdaptor,
        project: &mut Project,
        object: ObjectId,
        id: &str,
        value: &Value,
    ) -> Result<(), ToolkitError> {
        project.toolkit_mut().set_property(object, id, value)
    }

    pub fn get_property(
        _adaptor: &ClassAdaptor,
        project: &Project,
        object: ObjectId,
        id: &str,
    ) -> Result<Value, ToolkitError> {
        project.toolkit().get_property(object, id)
    }

    pub fn add(
        _adaptor: &ClassAdaptor,
        project: &mut Project,
        container: ObjectId,
        child: ObjectId,
    ) -> Result<(), ToolkitError> {
        project.toolkit_mut().add(container, child)
    }

    pub fn remove(
        _adaptor: &ClassAdaptor,
        project: &mut Project,
        container: ObjectId,
        child: ObjectId,
    ) -> Result<(), ToolkitError> {
        project.toolkit_mut().remove(container, child)
    }

    pub fn get_children(_adaptor: &ClassAdaptor, project: &Project, container: ObjectId) -> Vec<ObjectId> {
        project.toolkit().children(container)
    }

    pub fn replace_child(
        _adaptor: &ClassAdaptor,
        project: &mut Project,
        container: ObjectId,
        old: ObjectId,
        new: ObjectId,
    ) -> Result<(), ToolkitError> {
        project.toolkit_mut().replace(container, old, new)
    }

    pub fn child_set_property(
        _adaptor: &ClassAdaptor,
        project: &mut Project,
        container: ObjectId,
        child: ObjectId,
        id: &str,
        value: &Value,
    ) -> Result<(), ToolkitError> {
        project
            .toolkit_mut()
            .child_set_property(container, child, id, value)
    }

    pub fn child_get_property(
        _adaptor: &ClassAdaptor,
        project: &Project,
        container: ObjectId,
        child: ObjectId,
        id: &str,
    ) -> Result<Value, ToolkitError> {
        project.toolkit().child_get_property(container, child, id)
    }

    pub fn get_internal_child(
        _adaptor: &ClassAdaptor,
        project: &Project,
        object: ObjectId,
        name: &str,
    ) -> Option<ObjectId> {
        project.toolkit().internal_child(object, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_keeps_inherited_slots() {
        let base = AdaptorOps {
            add: Some(defaults::add),
            remove: Some(defaults::remove),
            get_children: Some(defaults::get_children),
            ..Default::default()
        };
        let overrides = AdaptorOps {
            set_property: Some(defaults::set_property),
            ..Default::default()
        };
        let merged = base.overlay(overrides);
        assert!(merged.is_container());
        assert!(merged.set_property.is_some());
        assert!(merged.verify_property.is_none());
    }

    #[test]
    fn test_container_needs_all_three_child_ops() {
        let ops = AdaptorOps {
            add: Some(defaults::add),
            get_children: Some(defaults::get_children),
            ..Default::default()
        };
        assert!(!ops.is_container());
    }
}

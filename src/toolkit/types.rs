//! Introspectable type system of the toolkit binding.

use crate::error::ToolkitError;
use crate::value::{EnumValue, Value, ValueType};
use std::collections::HashMap;
use std::fmt;

/// Index of a type inside its [`TypeSystem`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(usize);

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Describes one property or child property of a type.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub nick: String,
    pub blurb: String,
    pub value_type: ValueType,
    pub default: Value,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub enum_values: Vec<EnumValue>,
    /// Required type name of an object reference.
    pub object_type: Option<String>,
    pub construct_only: bool,
    pub readable: bool,
    pub writable: bool,
}

impl ParamSpec {
    fn new(name: &str, nick: &str, value_type: ValueType, default: Value) -> Self {
        Self {
            name: name.to_string(),
            nick: nick.to_string(),
            blurb: String::new(),
            value_type,
            default,
            minimum: None,
            maximum: None,
            enum_values: Vec::new(),
            object_type: None,
            construct_only: false,
            readable: true,
            writable: true,
        }
    }

    pub fn int(name: &str, nick: &str, min: i64, max: i64, default: i64) -> Self {
        let mut spec = Self::new(name, nick, ValueType::Int, Value::Int(default));
        spec.minimum = Some(min as f64);
        spec.maximum = Some(max as f64);
        spec
    }

    pub fn float(name: &str, nick: &str, min: f64, max: f64, default: f64) -> Self {
        let mut spec = Self::new(name, nick, ValueType::Float, Value::Float(default));
        spec.minimum = Some(min);
        spec.maximum = Some(max);
        spec
    }

    pub fn string(name: &str, nick: &str, default: &str) -> Self {
        Self::new(name, nick, ValueType::String, Value::String(default.to_string()))
    }

    pub fn boolean(name: &str, nick: &str, default: bool) -> Self {
        Self::new(name, nick, ValueType::Bool, Value::Bool(default))
    }

    pub fn unichar(name: &str, nick: &str, default: char) -> Self {
        Self::new(name, nick, ValueType::Unichar, Value::Unichar(default))
    }

    pub fn enumeration(name: &str, nick: &str, values: &[(&str, &str)], default: u32) -> Self {
        let mut spec = Self::new(name, nick, ValueType::Enum, Value::Enum(default));
        spec.enum_values = values
            .iter()
            .enumerate()
            .map(|(i, (nick, label))| EnumValue::new(i as u32, nick, label))
            .collect();
        spec
    }

    pub fn flags(name: &str, nick: &str, values: &[(&str, &str)], default: u32) -> Self {
        let mut spec = Self::new(name, nick, ValueType::Flags, Value::Flags(default));
        spec.enum_values = values
            .iter()
            .enumerate()
            .map(|(i, (nick, label))| EnumValue::new(1 << i, nick, label))
            .collect();
        spec
    }

    pub fn object(name: &str, nick: &str, object_type: &str) -> Self {
        let mut spec = Self::new(name, nick, ValueType::Object, Value::Object(None));
        spec.object_type = Some(object_type.to_string());
        spec
    }

    pub fn blurb(mut self, blurb: &str) -> Self {
        self.blurb = blurb.to_string();
        self
    }

    pub fn construct_only(mut self) -> Self {
        self.construct_only = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalSpec {
    pub name: String,
    pub run_last: bool,
    pub action: bool,
}

impl SignalSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            run_last: true,
            action: false,
        }
    }

    pub fn run_first(mut self) -> Self {
        self.run_last = false;
        self
    }

    pub fn action(mut self) -> Self {
        self.action = true;
        self
    }
}

/// A child object created by a composite type as part of its own structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InternalChildSpec {
    pub name: String,
    pub type_name: String,
    pub children: Vec<InternalChildSpec>,
}

impl InternalChildSpec {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: InternalChildSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// How an object natively stores its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    None,
    /// Ordered list of children.
    List,
    /// A single child slot.
    Bin,
    /// Ordered list with a native `position` child property.
    Box,
}

#[derive(Clone, Debug)]
pub struct TypeInfo {
    pub name: String,
    pub parent: Option<TypeKey>,
    pub is_abstract: bool,
    pub container: ContainerKind,
    /// Properties introduced by this type, in declaration order.
    pub properties: Vec<ParamSpec>,
    /// Child properties introduced by this type.
    pub child_properties: Vec<ParamSpec>,
    pub signals: Vec<SignalSpec>,
    pub internal_children: Vec<InternalChildSpec>,
}

impl TypeInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            is_abstract: false,
            container: ContainerKind::None,
            properties: Vec::new(),
            child_properties: Vec::new(),
            signals: Vec::new(),
            internal_children: Vec::new(),
        }
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn container(mut self, kind: ContainerKind) -> Self {
        self.container = kind;
        self
    }

    pub fn property(mut self, spec: ParamSpec) -> Self {
        self.properties.push(spec);
        self
    }

    pub fn child_property(mut self, spec: ParamSpec) -> Self {
        self.child_properties.push(spec);
        self
    }

    pub fn signal(mut self, spec: SignalSpec) -> Self {
        self.signals.push(spec);
        self
    }

    pub fn internal_child(mut self, spec: InternalChildSpec) -> Self {
        self.internal_children.push(spec);
        self
    }
}

/// Registry of toolkit types with single inheritance.
#[derive(Clone, Debug, Default)]
pub struct TypeSystem {
    types: Vec<TypeInfo>,
    by_name: HashMap<String, TypeKey>,
}

pub const PLACEHOLDER_TYPE: &str = "Placeholder";

impl TypeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type below `parent`. Parents must be registered first, so
    /// iteration order always visits ancestors before descendants.
    pub fn register(
        &mut self,
        mut info: TypeInfo,
        parent: Option<&str>,
    ) -> Result<TypeKey, ToolkitError> {
        if self.by_name.contains_key(&info.name) {
            return Err(ToolkitError::DuplicateType(info.name));
        }
        if let Some(parent) = parent {
            let key = self
                .lookup(parent)
                .ok_or_else(|| ToolkitError::UnknownType(parent.to_string()))?;
            info.parent = Some(key);
            if info.container == ContainerKind::None {
                info.container = self.info(key).container;
            }
        }
        let key = TypeKey(self.types.len());
        self.by_name.insert(info.name.clone(), key);
        self.types.push(info);
        Ok(key)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeKey> {
        self.by_name.get(name).copied()
    }

    pub fn info(&self, key: TypeKey) -> &TypeInfo {
        &self.types[key.0]
    }

    pub fn name(&self, key: TypeKey) -> &str {
        &self.types[key.0].name
    }

    pub fn parent(&self, key: TypeKey) -> Option<TypeKey> {
        self.types[key.0].parent
    }

    /// All types, ancestors first.
    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        (0..self.types.len()).map(TypeKey)
    }

    /// `key` followed by each of its ancestors.
    pub fn ancestry(&self, key: TypeKey) -> impl Iterator<Item = TypeKey> + '_ {
        std::iter::successors(Some(key), move |k| self.parent(*k))
    }

    pub fn is_a(&self, key: TypeKey, ancestor: TypeKey) -> bool {
        self.ancestry(key).any(|k| k == ancestor)
    }

    pub fn find_property(&self, key: TypeKey, name: &str) -> Option<&ParamSpec> {
        self.ancestry(key)
            .find_map(|k| self.info(k).properties.iter().find(|p| p.name == name))
    }

    pub fn find_child_property(&self, key: TypeKey, name: &str) -> Option<&ParamSpec> {
        self.ancestry(key).find_map(|k| {
            self.info(k)
                .child_properties
                .iter()
                .find(|p| p.name == name)
        })
    }

    /// Every property of `key`, root type first.
    pub fn all_properties(&self, key: TypeKey) -> Vec<&ParamSpec> {
        let mut chain: Vec<TypeKey> = self.ancestry(key).collect();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|k| self.info(k).properties.iter())
            .collect()
    }

    pub fn all_child_properties(&self, key: TypeKey) -> Vec<&ParamSpec> {
        let mut chain: Vec<TypeKey> = self.ancestry(key).collect();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|k| self.info(k).child_properties.iter())
            .collect()
    }

    /// Internal children declared by the closest type in the chain.
    pub fn internal_children(&self, key: TypeKey) -> &[InternalChildSpec] {
        self.ancestry(key)
            .map(|k| self.info(k).internal_children.as_slice())
            .find(|c| !c.is_empty())
            .unwrap_or(&[])
    }

    /// The stock widget set.
    pub fn builtin() -> Result<Self, ToolkitError> {
        let mut ts = TypeSystem::new();

        ts.register(
            TypeInfo::new("Object")
                .abstract_type()
                .signal(SignalSpec::new("notify").run_first()),
            None,
        )?;

        ts.register(
            TypeInfo::new("Widget")
                .abstract_type()
                .property(ParamSpec::boolean("visible", "Visible", false))
                .property(
                    ParamSpec::boolean("sensitive", "Sensitive", true)
                        .blurb("Whether the widget responds to input"),
                )
                .property(ParamSpec::string("tooltip-text", "Tooltip", ""))
                .property(ParamSpec::boolean("can-focus", "Can focus", false))
                .property(ParamSpec::int("width-request", "Width request", -1, i32::MAX as i64, -1))
                .property(ParamSpec::int("height-request", "Height request", -1, i32::MAX as i64, -1))
                .property(ParamSpec::flags(
                    "events",
                    "Events",
                    &[
                        ("pointer-motion-mask", "Pointer motion"),
                        ("button-press-mask", "Button press"),
                        ("key-press-mask", "Key press"),
                        ("scroll-mask", "Scroll"),
                    ],
                    0,
                ))
                .signal(SignalSpec::new("show").run_first())
                .signal(SignalSpec::new("hide").run_first())
                .signal(SignalSpec::new("destroy"))
                .signal(SignalSpec::new("button-press-event"))
                .signal(SignalSpec::new("key-press-event")),
            Some("Object"),
        )?;

        ts.register(
            TypeInfo::new("Container")
                .abstract_type()
                .container(ContainerKind::List)
                .property(ParamSpec::int("border-width", "Border width", 0, 65535, 0))
                .signal(SignalSpec::new("add").run_first())
                .signal(SignalSpec::new("remove").run_first()),
            Some("Widget"),
        )?;

        ts.register(
            TypeInfo::new("Bin")
                .abstract_type()
                .container(ContainerKind::Bin),
            Some("Container"),
        )?;

        ts.register(
            TypeInfo::new("Box")
                .container(ContainerKind::Box)
                .property(ParamSpec::enumeration(
                    "orientation",
                    "Orientation",
                    &[("horizontal", "Horizontal"), ("vertical", "Vertical")],
                    0,
                ))
                .property(ParamSpec::int("spacing", "Spacing", 0, i32::MAX as i64, 0))
                .property(ParamSpec::boolean("homogeneous", "Homogeneous", false))
                .child_property(ParamSpec::boolean("expand", "Expand", true))
                .child_property(ParamSpec::boolean("fill", "Fill", true))
                .child_property(ParamSpec::int("padding", "Padding", 0, i32::MAX as i64, 0))
                .child_property(ParamSpec::enumeration(
                    "pack-type",
                    "Pack type",
                    &[("start", "Start"), ("end", "End")],
                    0,
                ))
                .child_property(ParamSpec::int("position", "Position", -1, i32::MAX as i64, 0)),
            Some("Container"),
        )?;

        ts.register(
            TypeInfo::new("Window")
                .property(
                    ParamSpec::enumeration(
                        "type",
                        "Window type",
                        &[("toplevel", "Top level"), ("popup", "Popup")],
                        0,
                    )
                    .construct_only(),
                )
                .property(ParamSpec::string("title", "Title", ""))
                .property(ParamSpec::boolean("resizable", "Resizable", true))
                .property(ParamSpec::boolean("modal", "Modal", false))
                .property(ParamSpec::int("default-width", "Default width", -1, i32::MAX as i64, -1))
                .property(ParamSpec::int("default-height", "Default height", -1, i32::MAX as i64, -1))
                .signal(SignalSpec::new("activate-default").action())
                .signal(SignalSpec::new("set-focus")),
            Some("Bin"),
        )?;

        ts.register(
            TypeInfo::new("Dialog")
                .internal_child(
                    InternalChildSpec::new("vbox", "Box")
                        .with_child(InternalChildSpec::new("action_area", "Box")),
                )
                .signal(SignalSpec::new("response"))
                .signal(SignalSpec::new("close").action()),
            Some("Window"),
        )?;

        ts.register(
            TypeInfo::new("Button")
                .property(ParamSpec::string("label", "Label", ""))
                .property(ParamSpec::boolean("use-underline", "Use underline", false))
                .property(ParamSpec::enumeration(
                    "relief",
                    "Border relief",
                    &[("normal", "Normal"), ("half", "Half"), ("none", "None")],
                    0,
                ))
                .signal(SignalSpec::new("clicked").run_first().action())
                .signal(SignalSpec::new("pressed").run_first())
                .signal(SignalSpec::new("released").run_first()),
            Some("Bin"),
        )?;

        ts.register(
            TypeInfo::new("ToggleButton")
                .property(ParamSpec::boolean("active", "Active", false))
                .property(ParamSpec::boolean("draw-indicator", "Draw indicator", false))
                .signal(SignalSpec::new("toggled").run_first()),
            Some("Button"),
        )?;

        ts.register(TypeInfo::new("CheckButton"), Some("ToggleButton"))?;

        ts.register(
            TypeInfo::new("Label")
                .property(ParamSpec::string("label", "Label", ""))
                .property(ParamSpec::boolean("use-markup", "Use markup", false))
                .property(ParamSpec::boolean("use-underline", "Use underline", false))
                .property(ParamSpec::boolean("wrap", "Wrap", false))
                .property(ParamSpec::enumeration(
                    "justify",
                    "Justification",
                    &[
                        ("left", "Left"),
                        ("right", "Right"),
                        ("center", "Center"),
                        ("fill", "Fill"),
                    ],
                    0,
                ))
                .property(ParamSpec::object("mnemonic-widget", "Mnemonic widget", "Widget"))
                .property(ParamSpec::float("xalign", "X align", 0.0, 1.0, 0.5))
                .property(ParamSpec::boolean("selectable", "Selectable", false))
                .property(ParamSpec::int("cursor-position", "Cursor position", 0, i32::MAX as i64, 0).read_only())
                .signal(SignalSpec::new("activate-link")),
            Some("Widget"),
        )?;

        ts.register(
            TypeInfo::new("Entry")
                .property(ParamSpec::string("text", "Text", ""))
                .property(ParamSpec::int("max-length", "Maximum length", 0, 65535, 0))
                .property(ParamSpec::boolean("visibility", "Visibility", true))
                .property(ParamSpec::unichar("invisible-char", "Invisible character", '*'))
                .property(ParamSpec::string("placeholder-text", "Placeholder text", ""))
                .property(ParamSpec::boolean("editable", "Editable", true))
                .signal(SignalSpec::new("activate").action())
                .signal(SignalSpec::new("changed")),
            Some("Widget"),
        )?;

        ts.register(
            TypeInfo::new("Frame")
                .property(ParamSpec::string("label", "Label", ""))
                .property(ParamSpec::float("label-xalign", "Label X align", 0.0, 1.0, 0.0))
                .property(ParamSpec::enumeration(
                    "shadow-type",
                    "Shadow type",
                    &[
                        ("none", "None"),
                        ("in", "In"),
                        ("out", "Out"),
                        ("etched-in", "Etched in"),
                        ("etched-out", "Etched out"),
                    ],
                    3,
                )),
            Some("Bin"),
        )?;

        ts.register(
            TypeInfo::new("Image")
                .property(ParamSpec::string("icon-name", "Icon name", ""))
                .property(ParamSpec::int("pixel-size", "Pixel size", -1, i32::MAX as i64, -1)),
            Some("Widget"),
        )?;

        ts.register(TypeInfo::new(PLACEHOLDER_TYPE), Some("Widget"))?;

        Ok(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_inheritance() {
        let ts = TypeSystem::builtin().unwrap();
        let check = ts.lookup("CheckButton").unwrap();
        let button = ts.lookup("Button").unwrap();
        let label = ts.lookup("Label").unwrap();
        assert!(ts.is_a(check, button));
        assert!(!ts.is_a(label, button));
        assert_eq!(ts.info(check).container, ContainerKind::Bin);
    }

    #[test]
    fn test_properties_resolve_through_chain() {
        let ts = TypeSystem::builtin().unwrap();
        let check = ts.lookup("CheckButton").unwrap();
        assert!(ts.find_property(check, "label").is_some());
        assert!(ts.find_property(check, "visible").is_some());
        assert!(ts.find_property(check, "text").is_none());

        let names: Vec<_> = ts.all_properties(check).iter().map(|p| p.name.clone()).collect();
        let visible = names.iter().position(|n| n == "visible").unwrap();
        let active = names.iter().position(|n| n == "active").unwrap();
        assert!(visible < active, "ancestor properties come first");
    }

    #[test]
    fn test_register_requires_known_parent() {
        let mut ts = TypeSystem::new();
        assert!(ts.register(TypeInfo::new("Orphan"), Some("Missing")).is_err());
        ts.register(TypeInfo::new("Root"), None).unwrap();
        assert!(ts.register(TypeInfo::new("Root"), None).is_err());
    }

    #[test]
    fn test_internal_children_inherited() {
        let ts = TypeSystem::builtin().unwrap();
        let dialog = ts.lookup("Dialog").unwrap();
        let specs = ts.internal_children(dialog);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].children[0].name, "action_area");
        assert!(ts.internal_children(ts.lookup("Window").unwrap()).is_empty());
    }
}

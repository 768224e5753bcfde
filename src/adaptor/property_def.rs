//! Property descriptors: per-property metadata shared by every instance.

use crate::catalog::PropertyEntry;
use crate::error::{PropertyError, RegistryError};
use crate::toolkit::{ObjectId, ParamSpec};
use crate::value::{EnumValue, Value, ValueType, format_bool, parse_bool};

/// Editor tab a property is shown on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyTab {
    General,
    Common,
    Packing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDef {
    pub id: String,
    pub name: String,
    pub tooltip: String,
    /// Adaptor this copy of the descriptor belongs to.
    pub adaptor: String,
    /// Type (or virtual-property owner) that introduced the property.
    pub owner_type: String,
    pub value_type: ValueType,
    pub default: Value,
    /// Default as reported by the toolkit, before catalog overrides.
    pub orig_default: Value,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub enum_values: Vec<EnumValue>,
    pub object_type: Option<String>,

    pub visible: bool,
    pub common: bool,
    pub packing: bool,
    pub optional: bool,
    pub optional_default: bool,
    pub query: bool,
    pub translatable: bool,
    pub construct_only: bool,
    pub save: bool,
    pub save_always: bool,
    pub ignore: bool,
    pub is_virtual: bool,

    /// Sort key within the tab; negative until assigned.
    pub weight: f64,
}

impl PropertyDef {
    pub fn from_param_spec(spec: &ParamSpec, adaptor: &str, packing: bool) -> Self {
        Self {
            id: spec.name.clone(),
            name: spec.nick.clone(),
            tooltip: spec.blurb.clone(),
            adaptor: adaptor.to_string(),
            owner_type: adaptor.to_string(),
            value_type: spec.value_type,
            default: spec.default.clone(),
            orig_default: spec.default.clone(),
            minimum: spec.minimum,
            maximum: spec.maximum,
            enum_values: spec.enum_values.clone(),
            object_type: spec.object_type.clone(),
            visible: true,
            common: false,
            packing,
            optional: false,
            optional_default: false,
            query: false,
            translatable: false,
            construct_only: spec.construct_only,
            save: true,
            save_always: false,
            ignore: false,
            is_virtual: false,
            weight: -1.0,
        }
    }

    /// A property with no toolkit counterpart, handled by adaptor overrides.
    pub fn new_virtual(
        entry: &PropertyEntry,
        adaptor: &str,
        packing: bool,
    ) -> Result<Self, RegistryError> {
        let value_type = entry.value_type.ok_or_else(|| RegistryError::MissingType {
            class: adaptor.to_string(),
            id: entry.id.clone(),
        })?;
        let zero = Value::zero(value_type);
        let mut def = Self {
            id: entry.id.clone(),
            name: entry.id.clone(),
            tooltip: String::new(),
            adaptor: adaptor.to_string(),
            owner_type: adaptor.to_string(),
            value_type,
            default: zero.clone(),
            orig_default: zero,
            minimum: None,
            maximum: None,
            enum_values: Vec::new(),
            object_type: None,
            visible: true,
            common: false,
            packing,
            optional: false,
            optional_default: false,
            query: false,
            translatable: false,
            construct_only: false,
            save: true,
            save_always: false,
            ignore: false,
            is_virtual: true,
            weight: -1.0,
        };
        def.update_from(entry)?;
        Ok(def)
    }

    /// Copy for a subclass adaptor.
    pub fn inherit(&self, adaptor: &str) -> Self {
        Self {
            adaptor: adaptor.to_string(),
            ..self.clone()
        }
    }

    /// Applies a catalog override entry.
    pub fn update_from(&mut self, entry: &PropertyEntry) -> Result<(), RegistryError> {
        if let Some(name) = &entry.name {
            self.name = name.clone();
        }
        if let Some(tooltip) = &entry.tooltip {
            self.tooltip = tooltip.clone();
        }
        if self.is_virtual
            && let Some(value_type) = entry.value_type
        {
            self.value_type = value_type;
        }
        self.visible = entry.visible.unwrap_or(self.visible);
        self.common = entry.common.unwrap_or(self.common);
        self.optional = entry.optional.unwrap_or(self.optional);
        self.optional_default = entry.optional_default.unwrap_or(self.optional_default);
        self.query = entry.query.unwrap_or(self.query);
        self.translatable = entry.translatable.unwrap_or(self.translatable);
        self.save = entry.save.unwrap_or(self.save);
        self.save_always = entry.save_always.unwrap_or(self.save_always);
        self.ignore = entry.ignore.unwrap_or(self.ignore);
        if let Some(weight) = entry.weight {
            self.weight = weight;
        }
        if entry.minimum.is_some() {
            self.minimum = entry.minimum;
        }
        if entry.maximum.is_some() {
            self.maximum = entry.maximum;
        }
        if !entry.enum_values.is_empty() {
            self.enum_values = entry.enum_values.clone();
        }
        for alias in &entry.displayable_values {
            match self.enum_values.iter_mut().find(|v| v.nick == alias.nick) {
                Some(v) => v.name = alias.name.clone(),
                None => log::warn!(
                    "{}: no value `{}` in `{}` to relabel",
                    self.adaptor,
                    alias.nick,
                    self.id
                ),
            }
        }
        if let Some(default) = &entry.default {
            self.default = self
                .value_from_string(default)
                .map_err(|_| RegistryError::BadDefault {
                    class: self.adaptor.clone(),
                    id: self.id.clone(),
                    value: default.clone(),
                })?;
        }
        Ok(())
    }

    pub fn tab(&self) -> PropertyTab {
        if self.packing {
            PropertyTab::Packing
        } else if self.common {
            PropertyTab::Common
        } else {
            PropertyTab::General
        }
    }

    pub fn check_type(&self, value: &Value) -> Result<(), PropertyError> {
        if value.value_type() != self.value_type {
            return Err(PropertyError::TypeMismatch {
                property: self.id.clone(),
                expected: self.value_type,
                found: value.value_type(),
            });
        }
        Ok(())
    }

    /// Clamps numeric values into range and drops unknown enum/flag bits.
    pub fn normalize(&self, value: Value) -> Value {
        match value {
            Value::Int(v) => {
                let mut v = v;
                if let Some(min) = self.minimum {
                    v = v.max(min as i64);
                }
                if let Some(max) = self.maximum {
                    v = v.min(max as i64);
                }
                Value::Int(v)
            }
            Value::Float(v) => {
                let mut v = v;
                if let Some(min) = self.minimum {
                    v = v.max(min);
                }
                if let Some(max) = self.maximum {
                    v = v.min(max);
                }
                Value::Float(v)
            }
            Value::Enum(v) if !self.enum_values.is_empty() => {
                if self.enum_values.iter().any(|e| e.value == v) {
                    Value::Enum(v)
                } else {
                    self.default.clone()
                }
            }
            Value::Flags(v) if !self.enum_values.is_empty() => {
                let mask = self.enum_values.iter().fold(0, |m, e| m | e.value);
                Value::Flags(v & mask)
            }
            other => other,
        }
    }

    pub fn is_default(&self, value: &Value) -> bool {
        match (value, &self.default) {
            (Value::Float(a), Value::Float(b)) => (a - b).abs() < f64::EPSILON,
            (a, b) => a == b,
        }
    }

    /// Serialized form. Object references are written by widget name.
    pub fn value_to_string(
        &self,
        value: &Value,
        object_name: impl Fn(ObjectId) -> Option<String>,
    ) -> String {
        match value {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::String(v) => v.clone(),
            Value::Bool(v) => format_bool(*v).to_string(),
            Value::Enum(v) => self
                .enum_values
                .iter()
                .find(|e| e.value == *v)
                .map(|e| e.nick.clone())
                .unwrap_or_else(|| v.to_string()),
            Value::Flags(v) => self
                .enum_values
                .iter()
                .filter(|e| e.value != 0 && v & e.value == e.value)
                .map(|e| e.nick.as_str())
                .collect::<Vec<_>>()
                .join("|"),
            Value::Unichar(c) if *c == '\0' => String::new(),
            Value::Unichar(c) => c.to_string(),
            Value::Object(Some(id)) => object_name(*id).unwrap_or_default(),
            Value::Object(None) => String::new(),
        }
    }

    /// Parses a serialized value. Object references parse to an unset
    /// reference; callers resolve the name themselves.
    pub fn value_from_string(&self, s: &str) -> Result<Value, PropertyError> {
        let bad = || PropertyError::Parse {
            property: self.id.clone(),
            value: s.to_string(),
        };
        let value = match self.value_type {
            ValueType::Int => Value::Int(s.trim().parse().map_err(|_| bad())?),
            ValueType::Float => Value::Float(s.trim().parse().map_err(|_| bad())?),
            ValueType::String => Value::String(s.to_string()),
            ValueType::Bool => Value::Bool(parse_bool(s).ok_or_else(bad)?),
            ValueType::Enum => Value::Enum(self.parse_enum(s.trim()).ok_or_else(bad)?),
            ValueType::Flags => {
                let mut bits = 0;
                for part in s.split('|').map(str::trim).filter(|p| !p.is_empty()) {
                    bits |= self.parse_enum(part).ok_or_else(bad)?;
                }
                Value::Flags(bits)
            }
            ValueType::Unichar => Value::Unichar(s.chars().next().unwrap_or('\0')),
            ValueType::Object => Value::Object(None),
        };
        Ok(value)
    }

    fn parse_enum(&self, s: &str) -> Option<u32> {
        self.enum_values
            .iter()
            .find(|e| e.nick == s || e.name == s)
            .map(|e| e.value)
            .or_else(|| s.parse().ok())
    }

    /// Label shown in the editor for an enum value.
    pub fn enum_label(&self, value: u32) -> String {
        self.enum_values
            .iter()
            .find(|e| e.value == value)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DisplayableValue;

    fn justify() -> PropertyDef {
        let spec = ParamSpec::enumeration(
            "justify",
            "Justification",
            &[("left", "Left"), ("right", "Right"), ("center", "Center")],
            0,
        );
        PropertyDef::from_param_spec(&spec, "Label", false)
    }

    #[test]
    fn test_enum_string_forms() {
        let def = justify();
        assert_eq!(def.value_to_string(&Value::Enum(2), |_| None), "center");
        assert_eq!(def.value_from_string("right").unwrap(), Value::Enum(1));
        assert_eq!(def.value_from_string("Center").unwrap(), Value::Enum(2));
        assert!(def.value_from_string("diagonal").is_err());
    }

    #[test]
    fn test_flags_string_forms() {
        let spec = ParamSpec::flags("events", "Events", &[("a", "A"), ("b", "B"), ("c", "C")], 0);
        let def = PropertyDef::from_param_spec(&spec, "Widget", false);
        assert_eq!(def.value_to_string(&Value::Flags(0b101), |_| None), "a|c");
        assert_eq!(def.value_from_string("a | c").unwrap(), Value::Flags(0b101));
        assert_eq!(def.value_from_string("").unwrap(), Value::Flags(0));
    }

    #[test]
    fn test_update_from_catalog_entry() {
        let mut def = justify();
        let entry = PropertyEntry {
            id: "justify".into(),
            default: Some("center".into()),
            common: Some(true),
            displayable_values: vec![DisplayableValue {
                nick: "center".into(),
                name: "Centered".into(),
            }],
            ..Default::default()
        };
        def.update_from(&entry).unwrap();
        assert_eq!(def.default, Value::Enum(2));
        assert_eq!(def.orig_default, Value::Enum(0));
        assert_eq!(def.tab(), PropertyTab::Common);
        assert_eq!(def.enum_label(2), "Centered");
    }

    #[test]
    fn test_bad_default_is_configuration_error() {
        let mut def = justify();
        let entry = PropertyEntry {
            id: "justify".into(),
            default: Some("sideways".into()),
            ..Default::default()
        };
        assert!(matches!(
            def.update_from(&entry),
            Err(RegistryError::BadDefault { .. })
        ));
    }

    #[test]
    fn test_virtual_requires_type() {
        let entry = PropertyEntry {
            id: "size".into(),
            is_virtual: true,
            default: Some("3".into()),
            ..Default::default()
        };
        assert!(PropertyDef::new_virtual(&entry, "Box", false).is_err());
        let entry = PropertyEntry {
            value_type: Some(ValueType::Int),
            ..entry
        };
        let def = PropertyDef::new_virtual(&entry, "Box", false).unwrap();
        assert_eq!(def.default, Value::Int(3));
        assert!(def.is_virtual);
    }

    #[test]
    fn test_normalize_clamps() {
        let spec = ParamSpec::int("spacing", "Spacing", 0, 10, 0);
        let def = PropertyDef::from_param_spec(&spec, "Box", false);
        assert_eq!(def.normalize(Value::Int(-4)), Value::Int(0));
        assert_eq!(def.normalize(Value::Int(40)), Value::Int(10));
        assert_eq!(justify().normalize(Value::Enum(9)), Value::Enum(0));
    }

    #[test]
    fn test_inherit_copies_tables() {
        let def = justify();
        let mut child = def.inherit("FancyLabel");
        child.enum_values[0].name = "Flush left".into();
        assert_eq!(def.enum_values[0].name, "Left");
        assert_eq!(child.adaptor, "FancyLabel");
        assert_eq!(child.owner_type, "Label");
    }
}

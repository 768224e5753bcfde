//! Catalog bundles: per-class overrides merged over introspected data.

use crate::error::RegistryError;
use crate::value::{EnumValue, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const BASE_CATALOG: &str = include_str!("../catalogs/base.json");

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Catalog {
    pub name: String,
    pub library: Option<String>,
    pub depends: Vec<String>,
    pub classes: Vec<CatalogClass>,
    pub groups: Vec<PaletteGroup>,
}

/// A named palette section listing classes in display order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PaletteGroup {
    pub name: String,
    pub title: String,
    pub classes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CatalogClass {
    #[serde(rename = "type")]
    pub type_name: String,
    pub title: Option<String>,
    pub generic_name: Option<String>,
    pub icon_name: Option<String>,
    pub toplevel: Option<bool>,
    pub uses_placeholders: Option<bool>,
    pub default_width: Option<i32>,
    pub default_height: Option<i32>,
    /// Name of the operation bundle overlaid on the inherited table.
    pub ops: Option<String>,
    pub properties: Vec<PropertyEntry>,
    pub packing_properties: Vec<PropertyEntry>,
    pub packing_defaults: Vec<ChildPacking>,
    pub actions: Vec<ActionDef>,
    pub packing_actions: Vec<ActionDef>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PropertyEntry {
    pub id: String,
    pub name: Option<String>,
    pub tooltip: Option<String>,
    #[serde(rename = "type")]
    pub value_type: Option<ValueType>,
    pub default: Option<String>,
    pub visible: Option<bool>,
    pub common: Option<bool>,
    pub optional: Option<bool>,
    pub optional_default: Option<bool>,
    pub query: Option<bool>,
    pub translatable: Option<bool>,
    pub save: Option<bool>,
    pub save_always: Option<bool>,
    pub ignore: Option<bool>,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    pub weight: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub enum_values: Vec<EnumValue>,
    pub displayable_values: Vec<DisplayableValue>,
}

/// Display-only label for an enum or flags value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayableValue {
    pub nick: String,
    pub name: String,
}

/// Packing values a child class takes when added to `parent`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildPacking {
    pub parent: String,
    pub defaults: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionDef {
    pub id: String,
    pub label: String,
    pub important: bool,
}

impl Catalog {
    /// The catalog describing the stock widget set.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::parse(BASE_CATALOG)
    }

    pub fn parse(json: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::parse(&json)?;
        log::info!("loaded catalog `{}` from {}", catalog.name, path.display());
        Ok(catalog)
    }

    pub fn class(&self, type_name: &str) -> Option<&CatalogClass> {
        self.classes.iter().find(|c| c.type_name == type_name)
    }
}

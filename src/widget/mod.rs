pub mod property;
pub mod signal;

pub use property::{I18n, Property};
pub use signal::Signal;

use crate::adaptor::{ClassAdaptor, PropertyTab};
use crate::toolkit::ObjectId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WidgetId(u64);

impl WidgetId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Editable mirror of one toolkit object.
#[derive(Debug)]
pub struct Widget {
    pub(crate) id: WidgetId,
    pub(crate) name: String,
    /// Set for children that belong to a composite's fixed structure.
    pub(crate) internal: Option<String>,
    pub(crate) adaptor: Arc<ClassAdaptor>,
    pub(crate) object: ObjectId,
    pub(crate) parent: Option<WidgetId>,
    /// False while the widget only lives in a command or the clipboard.
    pub(crate) in_project: bool,
    pub(crate) properties: Vec<Property>,
    /// Present only while parented.
    pub(crate) packing_properties: Vec<Property>,
    pub(crate) signals: IndexMap<String, Vec<Signal>>,
}

impl Widget {
    pub(crate) fn new(
        id: WidgetId,
        name: String,
        adaptor: Arc<ClassAdaptor>,
        object: ObjectId,
        properties: Vec<Property>,
    ) -> Self {
        Self {
            id,
            name,
            internal: None,
            adaptor,
            object,
            parent: None,
            in_project: false,
            properties,
            packing_properties: Vec::new(),
            signals: IndexMap::new(),
        }
    }

    pub fn id(&self) -> WidgetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn internal(&self) -> Option<&str> {
        self.internal.as_deref()
    }

    pub fn adaptor(&self) -> &Arc<ClassAdaptor> {
        &self.adaptor
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn parent(&self) -> Option<WidgetId> {
        self.parent
    }

    pub fn in_project(&self) -> bool {
        self.in_project
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn packing_properties(&self) -> &[Property] {
        &self.packing_properties
    }

    /// Normal properties first, then packing.
    pub fn property(&self, id: &str) -> Option<&Property> {
        self.properties
            .iter()
            .chain(&self.packing_properties)
            .find(|p| p.id() == id)
    }

    pub(crate) fn property_mut(&mut self, id: &str) -> Option<&mut Property> {
        self.properties
            .iter_mut()
            .chain(self.packing_properties.iter_mut())
            .find(|p| p.id() == id)
    }

    /// Visible properties of one editor tab, ordered by weight.
    pub fn properties_by_tab(&self, tab: PropertyTab) -> Vec<&Property> {
        let mut list: Vec<&Property> = self
            .properties
            .iter()
            .chain(&self.packing_properties)
            .filter(|p| p.def().visible && p.def().tab() == tab)
            .collect();
        list.sort_by(|a, b| a.def().weight.total_cmp(&b.def().weight));
        list
    }

    pub fn signals(&self) -> &IndexMap<String, Vec<Signal>> {
        &self.signals
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Signal> {
        self.signals.values().flatten()
    }
}

//! The class registry: one adaptor per toolkit type, with ancestor fallback.

use crate::adaptor::ClassAdaptor;
use crate::catalog::{Catalog, CatalogClass, PaletteGroup};
use crate::error::RegistryError;
use crate::toolkit::types::PLACEHOLDER_TYPE;
use crate::toolkit::{TypeKey, TypeSystem};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct ClassRegistry {
    types: Arc<TypeSystem>,
    adaptors: HashMap<TypeKey, Arc<ClassAdaptor>>,
    by_name: HashMap<String, TypeKey>,
    order: Vec<TypeKey>,
    catalogs: Vec<String>,
    groups: Vec<PaletteGroup>,
}

impl ClassRegistry {
    pub fn new(types: Arc<TypeSystem>) -> Self {
        Self {
            types,
            adaptors: HashMap::new(),
            by_name: HashMap::new(),
            order: Vec::new(),
            catalogs: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Builds every adaptor from the type system and a set of catalogs.
    /// Types are visited ancestors first; a type without a catalog entry gets
    /// an adaptor synthesized from its nearest registered ancestor.
    pub fn from_catalogs(
        types: Arc<TypeSystem>,
        catalogs: &[Catalog],
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(types);
        let mut entries: HashMap<&str, (&str, &CatalogClass)> = HashMap::new();

        for catalog in catalogs {
            for dependency in &catalog.depends {
                if !registry.catalogs.contains(dependency) {
                    return Err(RegistryError::MissingDependency {
                        catalog: catalog.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
            for class in &catalog.classes {
                if registry.types.lookup(&class.type_name).is_none() {
                    return Err(RegistryError::UnknownType(class.type_name.clone()));
                }
                entries.insert(class.type_name.as_str(), (catalog.name.as_str(), class));
            }
            registry.catalogs.push(catalog.name.clone());
            registry.groups.extend(catalog.groups.iter().cloned());
        }

        let types = Arc::clone(&registry.types);
        for key in types.keys() {
            let name = types.name(key);
            if name == PLACEHOLDER_TYPE {
                continue;
            }
            let adaptor = match entries.get(name) {
                Some((catalog, entry)) => registry.create_adaptor(key, Some(entry), catalog)?,
                None => {
                    let catalog = registry
                        .nearest_ancestor_adaptor(key)
                        .map(|a| a.catalog.clone())
                        .unwrap_or_default();
                    registry.create_adaptor(key, None, &catalog)?
                }
            };
            registry.register(adaptor)?;
        }
        log::info!(
            "registered {} classes from {} catalog(s)",
            registry.adaptors().count(),
            registry.catalogs.len()
        );
        Ok(registry)
    }

    /// Builds an adaptor for `key` on top of its nearest registered ancestor.
    pub fn create_adaptor(
        &self,
        key: TypeKey,
        entry: Option<&CatalogClass>,
        catalog: &str,
    ) -> Result<ClassAdaptor, RegistryError> {
        let parent = self.nearest_ancestor_adaptor(key);
        let mut adaptor = ClassAdaptor::new(&self.types, key, parent.map(|p| p.as_ref()), catalog);
        if let Some(entry) = entry {
            adaptor.extend_from(entry)?;
        }
        adaptor.finish(&self.types)
    }

    pub fn register(&mut self, adaptor: ClassAdaptor) -> Result<Arc<ClassAdaptor>, RegistryError> {
        let key = adaptor.type_key;
        if self.adaptors.contains_key(&key) {
            log::warn!("adaptor for `{}` is already registered", adaptor.name);
            return Err(RegistryError::AlreadyRegistered(adaptor.name));
        }
        if let Some(derived) = self
            .order
            .iter()
            .find(|k| self.types.is_a(**k, key))
            .map(|k| self.types.name(*k).to_string())
        {
            log::error!(
                "adaptor for `{}` registered after its derived type `{derived}`",
                adaptor.name
            );
            return Err(RegistryError::DerivedAdaptorExists {
                name: adaptor.name,
                derived,
            });
        }
        let adaptor = Arc::new(adaptor);
        self.by_name.insert(adaptor.name.clone(), key);
        self.adaptors.insert(key, Arc::clone(&adaptor));
        self.order.push(key);
        log::debug!("registered adaptor `{}`", adaptor.name);
        Ok(adaptor)
    }

    pub fn types(&self) -> &Arc<TypeSystem> {
        &self.types
    }

    pub fn lookup_by_type(&self, key: TypeKey) -> Option<&Arc<ClassAdaptor>> {
        self.adaptors.get(&key)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Arc<ClassAdaptor>> {
        self.by_name.get(name).and_then(|k| self.adaptors.get(k))
    }

    /// Walks the toolkit type chain upward from the parent of `key`.
    pub fn nearest_ancestor_adaptor(&self, key: TypeKey) -> Option<&Arc<ClassAdaptor>> {
        self.types
            .ancestry(key)
            .skip(1)
            .find_map(|k| self.adaptors.get(&k))
    }

    /// Adaptors in registration order.
    pub fn adaptors(&self) -> impl Iterator<Item = &Arc<ClassAdaptor>> {
        self.order.iter().filter_map(|k| self.adaptors.get(k))
    }

    pub fn catalogs(&self) -> &[String] {
        &self.catalogs
    }

    pub fn groups(&self) -> &[PaletteGroup] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptor::PropertyTab;
    use crate::value::Value;

    fn builtin() -> ClassRegistry {
        let types = Arc::new(TypeSystem::builtin().unwrap());
        ClassRegistry::from_catalogs(types, &[Catalog::builtin().unwrap()]).unwrap()
    }

    #[test]
    fn test_lookup_by_name_and_type() {
        let registry = builtin();
        let button = registry.lookup_by_name("Button").unwrap();
        assert_eq!(
            registry.lookup_by_type(button.type_key).unwrap().name,
            "Button"
        );
        assert!(registry.lookup_by_name("Placeholder").is_none());
        assert!(registry.lookup_by_name("Spinner").is_none());
    }

    #[test]
    fn test_read_only_properties_not_exposed() {
        let registry = builtin();
        let label = registry.lookup_by_name("Label").unwrap();
        assert!(label.property_def("cursor-position").is_none());
        assert!(label.property_def("use-underline").is_some());
    }

    #[test]
    fn test_ancestor_adaptor_before_and_after_registration() {
        let types = Arc::new(TypeSystem::builtin().unwrap());
        let mut registry = ClassRegistry::new(Arc::clone(&types));
        for name in ["Object", "Widget", "Container", "Bin", "Button"] {
            let key = types.lookup(name).unwrap();
            let adaptor = registry.create_adaptor(key, None, "test").unwrap();
            registry.register(adaptor).unwrap();
        }
        let toggle = types.lookup("ToggleButton").unwrap();
        assert_eq!(
            registry.nearest_ancestor_adaptor(toggle).unwrap().name,
            "Button"
        );

        let adaptor = registry.create_adaptor(toggle, None, "test").unwrap();
        let registered = registry.register(adaptor).unwrap();
        let parent = registry.lookup_by_name("Button").unwrap();
        let ids: Vec<_> = registered.properties.iter().map(|d| d.id.clone()).collect();
        let inherited: Vec<_> = parent.properties.iter().map(|d| d.id.clone()).collect();
        assert_eq!(&ids[..inherited.len()], &inherited[..]);
        assert!(ids.contains(&"active".to_string()));
    }

    #[test]
    fn test_register_rejects_ancestor_after_descendant() {
        let types = Arc::new(TypeSystem::builtin().unwrap());
        let mut registry = ClassRegistry::new(Arc::clone(&types));
        let button = types.lookup("Button").unwrap();
        let bin = types.lookup("Bin").unwrap();
        let adaptor = registry.create_adaptor(button, None, "test").unwrap();
        registry.register(adaptor).unwrap();

        let adaptor = registry.create_adaptor(bin, None, "test").unwrap();
        assert!(matches!(
            registry.register(adaptor),
            Err(RegistryError::DerivedAdaptorExists { .. })
        ));

        let again = registry.create_adaptor(button, None, "test").unwrap();
        assert!(matches!(
            registry.register(again),
            Err(RegistryError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_catalog_overrides_merge_over_inheritance() {
        let registry = builtin();
        let window = registry.lookup_by_name("Window").unwrap();
        let dialog = registry.lookup_by_name("Dialog").unwrap();
        assert_eq!(
            window.property_def("visible").unwrap().default,
            Value::Bool(false)
        );
        assert_eq!(
            registry
                .lookup_by_name("Label")
                .unwrap()
                .property_def("visible")
                .unwrap()
                .default,
            Value::Bool(true)
        );
        assert!(dialog.toplevel);
        assert!(dialog.property_def("title").unwrap().translatable);
        assert!(dialog.is_container());
        assert!(!registry.lookup_by_name("Label").unwrap().is_container());
    }

    #[test]
    fn test_synthesized_adaptor_inherits_ops() {
        let registry = builtin();
        let check = registry.lookup_by_name("CheckButton").unwrap();
        assert!(check.is_container());
        // Object has no catalog entry at all.
        let object = registry.lookup_by_name("Object").unwrap();
        assert_eq!(object.generic_name, "object");
    }

    #[test]
    fn test_weights_per_tab() {
        let registry = builtin();
        let toggle = registry.lookup_by_name("ToggleButton").unwrap();
        let weight = |id: &str| toggle.property_def(id).unwrap().weight;
        assert!(weight("label") < weight("active"));
        let visible = toggle.property_def("visible").unwrap();
        assert_eq!(visible.tab(), PropertyTab::Common);
        assert!(visible.weight > 0.0);

        let hbox = registry.lookup_by_name("Box").unwrap();
        let position = hbox.packing_def("position").unwrap();
        assert_eq!(position.tab(), PropertyTab::Packing);
        assert!(hbox.packing_def("expand").unwrap().weight < position.weight);
    }

    #[test]
    fn test_ids_unique_across_normal_and_packing() {
        let registry = builtin();
        for adaptor in registry.adaptors() {
            let mut ids: Vec<_> = adaptor
                .properties
                .iter()
                .chain(&adaptor.packing_properties)
                .map(|d| d.id.as_str())
                .collect();
            let len = ids.len();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), len, "{}", adaptor.name);
        }
    }

    #[test]
    fn test_unknown_catalog_class_is_an_error() {
        let types = Arc::new(TypeSystem::builtin().unwrap());
        let bad = Catalog::parse(r#"{"name": "bad", "classes": [{"type": "Spinner"}]}"#).unwrap();
        assert!(matches!(
            ClassRegistry::from_catalogs(types, &[bad]),
            Err(RegistryError::UnknownType(_))
        ));
    }

    #[test]
    fn test_missing_dependency() {
        let types = Arc::new(TypeSystem::builtin().unwrap());
        let extra = Catalog::parse(r#"{"name": "extra", "depends": ["base"]}"#).unwrap();
        assert!(matches!(
            ClassRegistry::from_catalogs(types, &[extra]),
            Err(RegistryError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_packing_default_searches_container_chain() {
        let registry = builtin();
        let button = registry.lookup_by_name("Button").unwrap();
        let hbox = registry.lookup_by_name("Box").unwrap();
        let frame = registry.lookup_by_name("Frame").unwrap();
        assert_eq!(button.packing_default(&registry, hbox, "expand"), Some("False"));
        assert_eq!(button.packing_default(&registry, frame, "expand"), None);
    }
}

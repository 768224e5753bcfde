//! The project file format: a JSON tree of objects with string-formatted
//! property values, packing, signal handlers and placeholders.

use crate::error::{CreateError, DocumentError, PropertyError};
use crate::project::{CreateOptions, CreateReason, Project};
use crate::registry::ClassRegistry;
use crate::toolkit::ObjectId;
use crate::value::{Value, ValueType};
use crate::widget::{I18n, Property, Signal, WidgetId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

pub const FORMAT: &str = "rad-designer";
pub const VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub format: String,
    pub version: u32,
    /// Catalogs the document's classes come from.
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub objects: Vec<ObjectNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectNode {
    pub class: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<Signal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyNode {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub translatable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// One slot of a container. A slot without an object is a placeholder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_child: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packing: Vec<PropertyNode>,
}

impl ChildNode {
    pub fn is_placeholder(&self) -> bool {
        self.object.is_none()
    }
}

fn property_node(project: &Project, prop: &Property) -> PropertyNode {
    let def = prop.def();
    let i18n = prop.i18n();
    let translatable = def.translatable && i18n.translatable;
    PropertyNode {
        name: def.id.clone(),
        value: def.value_to_string(prop.value(), |o| project.object_name(o)),
        translatable,
        context: i18n.context.clone().filter(|_| def.translatable),
        comments: i18n.comment.clone().filter(|_| def.translatable),
    }
}

/// Serializes one widget and everything below it.
pub fn snapshot(project: &Project, widget: WidgetId) -> Option<ObjectNode> {
    let node = project.widget(widget)?;
    let properties = node
        .properties()
        .iter()
        .filter(|p| p.should_save())
        .map(|p| property_node(project, p))
        .collect();

    let toolkit = project.toolkit();
    let mut children = Vec::new();
    for child in toolkit.children(node.object()) {
        match project.widget_for_object(child).and_then(|w| project.widget(w)) {
            Some(child_node) => children.push(ChildNode {
                internal_child: child_node.internal().map(str::to_string),
                object: snapshot(project, child_node.id()),
                packing: child_node
                    .packing_properties()
                    .iter()
                    .filter(|p| p.should_save())
                    .map(|p| property_node(project, p))
                    .collect(),
            }),
            None => children.push(ChildNode::default()),
        }
    }

    Some(ObjectNode {
        class: node.adaptor().name.clone(),
        id: node.name().to_string(),
        properties,
        signals: node.handlers().cloned().collect(),
        children,
    })
}

impl Document {
    pub fn from_project(project: &Project) -> Self {
        let objects: Vec<ObjectNode> = project
            .toplevels()
            .iter()
            .filter_map(|t| snapshot(project, *t))
            .collect();
        let requires: BTreeSet<String> = project
            .widgets()
            .into_iter()
            .filter_map(|w| project.widget(w).map(|n| n.adaptor().catalog.clone()))
            .collect();
        Self {
            format: FORMAT.to_string(),
            version: VERSION,
            requires: requires.into_iter().collect(),
            objects,
        }
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let doc: Document = serde_json::from_str(json)?;
        if doc.format != FORMAT || doc.version > VERSION {
            return Err(DocumentError::UnsupportedFormat {
                format: doc.format,
                version: doc.version,
            });
        }
        Ok(doc)
    }

    /// Builds the document's widgets in `project`. Runs in loading mode:
    /// no verification, no queries, no commands.
    pub fn load_into(&self, project: &mut Project) -> Result<(), DocumentError> {
        for catalog in &self.requires {
            if !project.registry().catalogs().contains(catalog) {
                return Err(DocumentError::MissingCatalog(catalog.clone()));
            }
        }

        let was_loading = project.is_loading();
        project.set_loading(true);
        project.begin_batch();
        let mut builder = Builder::new(CreateReason::Load);
        let mut toplevels = Vec::with_capacity(self.objects.len());
        let mut result: Result<(), CreateError> = Ok(());
        for object in &self.objects {
            match builder.build(project, object) {
                Ok(widget) => toplevels.push(widget),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        if result.is_ok() {
            builder.resolve_references(project);
            for widget in &toplevels {
                project.attach(*widget);
            }
        } else {
            for widget in &toplevels {
                project.destroy_widget(*widget);
            }
        }
        project.set_loading(was_loading);
        for widget in project.widgets() {
            project.refresh_virtual_properties(widget);
        }
        project.end_batch();
        result?;

        project.clear_history();
        project.mark_saved();
        log::info!(
            "loaded {} toplevel(s) into `{}`",
            toplevels.len(),
            project.name()
        );
        Ok(())
    }
}

/// Creates a floating widget tree from a template. Object references are
/// resolved inside the template first, then against the project.
pub fn instantiate(
    project: &mut Project,
    node: &ObjectNode,
    reason: CreateReason,
) -> Result<WidgetId, CreateError> {
    let was_loading = project.is_loading();
    project.set_loading(true);
    let mut builder = Builder::new(reason);
    let result = builder.build(project, node);
    if result.is_ok() {
        builder.resolve_references(project);
    }
    project.set_loading(was_loading);
    if let Ok(widget) = result {
        for w in project.subtree(widget) {
            project.refresh_virtual_properties(w);
        }
    }
    result
}

struct Builder {
    reason: CreateReason,
    /// File id to the widget built for it.
    names: HashMap<String, WidgetId>,
    /// Object-typed properties, set once every widget exists.
    references: Vec<(WidgetId, String, String)>,
}

impl Builder {
    fn new(reason: CreateReason) -> Self {
        Self {
            reason,
            names: HashMap::new(),
            references: Vec::new(),
        }
    }

    fn build(&mut self, project: &mut Project, node: &ObjectNode) -> Result<WidgetId, CreateError> {
        let registry = Arc::clone(project.registry());
        let adaptor = registry
            .lookup_by_name(&node.class)
            .ok_or_else(|| CreateError::UnknownClass(node.class.clone()))?;

        let mut initial = Vec::new();
        for prop in &node.properties {
            let Some(def) = adaptor.property_def(&prop.name) else {
                log::warn!("{}: ignoring unknown property `{}`", node.class, prop.name);
                continue;
            };
            if def.value_type != ValueType::Object {
                initial.push((prop.name.clone(), def.value_from_string(&prop.value)?));
            }
        }

        let widget = project.create_widget(
            adaptor,
            CreateOptions {
                reason: self.reason,
                name: Some(node.id.clone()),
                initial,
                query: None,
            },
        )?;
        self.names.insert(node.id.clone(), widget);
        if let Err(err) = self.fill(project, widget, node, false) {
            project.destroy_widget(widget);
            return Err(err);
        }
        Ok(widget)
    }

    /// Applies what creation does not cover: i18n, references, signals and
    /// children. `assign` also sets plain properties, for internal children
    /// that already exist.
    fn fill(
        &mut self,
        project: &mut Project,
        widget: WidgetId,
        node: &ObjectNode,
        assign: bool,
    ) -> Result<(), CreateError> {
        for prop in &node.properties {
            let Some(def) = project
                .widget(widget)
                .and_then(|w| w.property(&prop.name))
                .map(|p| Arc::clone(p.def()))
            else {
                continue;
            };
            if def.value_type == ValueType::Object {
                self.references
                    .push((widget, prop.name.clone(), prop.value.clone()));
            } else if assign {
                if def.optional {
                    project.set_property_enabled(widget, &prop.name, true)?;
                }
                project.set_property(widget, &prop.name, def.value_from_string(&prop.value)?)?;
            }
            if def.translatable {
                project.set_property_i18n(
                    widget,
                    &prop.name,
                    I18n {
                        translatable: prop.translatable,
                        context: prop.context.clone(),
                        comment: prop.comments.clone(),
                    },
                )?;
            }
        }

        for signal in &node.signals {
            project.add_signal(widget, signal.clone());
        }

        if !node.children.is_empty() {
            self.fill_children(project, widget, &node.children)?;
        }
        project.refresh_virtual_properties(widget);
        Ok(())
    }

    fn fill_children(
        &mut self,
        project: &mut Project,
        widget: WidgetId,
        children: &[ChildNode],
    ) -> Result<(), CreateError> {
        let (adaptor, container) = project
            .widget(widget)
            .map(|w| (Arc::clone(w.adaptor()), w.object()))
            .ok_or(PropertyError::UnknownWidget(widget))?;

        let mut order: Vec<ObjectId> = Vec::with_capacity(children.len());
        let mut packed: Vec<(WidgetId, &[PropertyNode])> = Vec::new();
        for child in children {
            match (&child.internal_child, &child.object) {
                (Some(internal), object) => {
                    let Some(found) = project
                        .subtree(widget)
                        .into_iter()
                        .skip(1)
                        .find(|w| project.widget(*w).and_then(|n| n.internal()) == Some(internal.as_str()))
                    else {
                        log::warn!("no internal child `{internal}` to load into");
                        continue;
                    };
                    if let Some(object) = object {
                        if project.is_name_available(&object.id)
                            && let Err(err) = project.rename_widget(found, &object.id)
                        {
                            log::warn!("could not rename internal child: {err}");
                        }
                        self.names.insert(object.id.clone(), found);
                        self.fill(project, found, object, true)?;
                    }
                    if let Some(node) = project.widget(found) {
                        order.push(node.object());
                    }
                    packed.push((found, child.packing.as_slice()));
                }
                (None, Some(object)) => {
                    let built = self.build(project, object)?;
                    let child_object = project
                        .widget(built)
                        .map(|w| w.object())
                        .ok_or(PropertyError::UnknownWidget(built))?;
                    if let Err(err) = adaptor.add_child(project, container, child_object) {
                        project.destroy_widget(built);
                        return Err(err.into());
                    }
                    project.set_parent(built, Some(widget), false)?;
                    order.push(child_object);
                    packed.push((built, child.packing.as_slice()));
                }
                (None, None) => {
                    let placeholder = project.toolkit_mut().create_placeholder()?;
                    adaptor.add_child(project, container, placeholder)?;
                    order.push(placeholder);
                }
            }
        }

        for (index, object) in order.iter().enumerate() {
            if project.toolkit().parent(*object) == Some(container) {
                project.toolkit_mut().reorder(container, *object, index)?;
            }
        }
        project.refresh_child_packing(container);

        for (child, packing) in packed {
            for prop in packing.iter().filter(|p| p.name != "position") {
                let Some(def) = project
                    .widget(child)
                    .and_then(|w| w.property(&prop.name))
                    .map(|p| Arc::clone(p.def()))
                else {
                    log::warn!("ignoring unknown packing property `{}`", prop.name);
                    continue;
                };
                project.set_property(child, &prop.name, def.value_from_string(&prop.value)?)?;
            }
        }
        Ok(())
    }

    fn resolve_references(&mut self, project: &mut Project) {
        for (widget, property, name) in std::mem::take(&mut self.references) {
            if name.is_empty() {
                continue;
            }
            let target = self
                .names
                .get(&name)
                .copied()
                .or_else(|| project.widget_by_name(&name))
                .and_then(|w| project.widget(w))
                .map(|w| w.object());
            let Some(target) = target else {
                log::warn!("unresolved reference `{name}` for `{property}`");
                continue;
            };
            if let Err(err) = project.set_property(widget, &property, Value::Object(Some(target))) {
                log::warn!("could not set `{property}`: {err}");
            }
        }
    }
}

pub fn save(project: &mut Project, path: &Path) -> Result<(), DocumentError> {
    let json = Document::from_project(project).to_json()?;
    std::fs::write(path, json)?;
    project.set_path(Some(path.to_path_buf()));
    project.mark_saved();
    log::info!("saved {}", path.display());
    Ok(())
}

/// Opens a project file into a fresh project.
pub fn load(registry: Arc<ClassRegistry>, path: &Path) -> Result<Project, DocumentError> {
    let json = std::fs::read_to_string(path)?;
    let doc = Document::from_json(&json)?;
    let mut project = Project::new(registry);
    if let Some(stem) = path.file_stem() {
        project.set_name(&stem.to_string_lossy());
    }
    project.set_path(Some(path.to_path_buf()));
    doc.load_into(&mut project)?;
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command;
    use crate::project::testing::{create, registry, test_project};

    fn sample(project: &mut Project) -> WidgetId {
        let window = create(project, "Window");
        command::set_property(project, window, "title", Value::String("Main".into())).unwrap();
        command::set_property_enabled(project, window, "default-width", true).unwrap();
        let hbox = create(project, "Box");
        command::add_child(project, hbox, window, None).unwrap();
        let label = create(project, "Label");
        let entry = create(project, "Entry");
        command::add_child(project, label, hbox, None).unwrap();
        command::add_child(project, entry, hbox, None).unwrap();
        command::set_property(project, label, "padding", Value::Int(4)).unwrap();
        let target = Value::Object(Some(project.widget(entry).unwrap().object()));
        command::set_property(project, label, "mnemonic-widget", target).unwrap();
        command::add_signal(project, entry, Signal::new("activate", "on_entry_activate")).unwrap();
        command::set_property_i18n(
            project,
            label,
            "label",
            I18n {
                translatable: true,
                context: Some("form".into()),
                comment: None,
            },
        )
        .unwrap();
        window
    }

    #[test]
    fn test_round_trip() {
        let mut project = test_project();
        sample(&mut project);
        let dialog = create(&mut project, "Dialog");
        command::set_property(&mut project, dialog, "title", Value::String("Ask".into())).unwrap();
        let original = Document::from_project(&project);

        let json = original.to_json().unwrap();
        let mut loaded = test_project();
        Document::from_json(&json).unwrap().load_into(&mut loaded).unwrap();
        assert_eq!(Document::from_project(&loaded), original);
        assert!(!loaded.is_modified());
        assert!(!loaded.can_undo());

        let label = loaded.widget_by_name("label1").unwrap();
        let entry = loaded.widget_by_name("entry1").unwrap();
        assert_eq!(
            loaded.get_property(label, "mnemonic-widget").unwrap(),
            Value::Object(Some(loaded.widget(entry).unwrap().object()))
        );
        assert_eq!(loaded.get_property(label, "padding").unwrap(), Value::Int(4));
    }

    #[test]
    fn test_saved_values_are_gated() {
        let mut project = test_project();
        let window = sample(&mut project);
        let doc = Document::from_project(&project);
        let node = &doc.objects[0];
        assert_eq!(node.id, project.widget(window).unwrap().name());
        let names: Vec<_> = node.properties.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"title"));
        assert!(names.contains(&"default-width"));
        assert!(!names.contains(&"default-height"));
        assert!(!names.contains(&"resizable"));

        let hbox = node.children[0].object.as_ref().unwrap();
        assert!(hbox.properties.iter().all(|p| p.name != "size"));
        assert_eq!(hbox.children.len(), 3);
        assert!(hbox.children[0].is_placeholder());
        let label = &hbox.children[1];
        assert!(label.packing.iter().any(|p| p.name == "position" && p.value == "1"));
        let mnemonic = label
            .object
            .as_ref()
            .unwrap()
            .properties
            .iter()
            .find(|p| p.name == "mnemonic-widget")
            .unwrap();
        assert_eq!(mnemonic.value, "entry1");
    }

    #[test]
    fn test_enabled_optional_survives_round_trip() {
        let mut project = test_project();
        let window = create(&mut project, "Window");
        command::set_property_enabled(&mut project, window, "default-width", true).unwrap();
        let json = Document::from_project(&project).to_json().unwrap();

        let mut loaded = test_project();
        Document::from_json(&json).unwrap().load_into(&mut loaded).unwrap();
        let window = loaded.widget_by_name("window1").unwrap();
        let prop = loaded.widget(window).unwrap().property("default-width").unwrap();
        assert!(prop.enabled());
        assert!(prop.is_default());
        assert!(!loaded.widget(window).unwrap().property("default-height").unwrap().enabled());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("form.json");
        let mut project = test_project();
        sample(&mut project);
        assert!(project.is_modified());
        save(&mut project, &path).unwrap();
        assert!(!project.is_modified());

        let loaded = load(registry(), &path).unwrap();
        assert_eq!(loaded.name(), "form");
        assert_eq!(loaded.path(), Some(path.as_path()));
        assert_eq!(Document::from_project(&loaded), Document::from_project(&project));
    }

    #[test]
    fn test_rejects_foreign_format() {
        let err = Document::from_json(r#"{"format":"other","version":1}"#).unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_missing_catalog() {
        let doc = Document {
            format: FORMAT.into(),
            version: VERSION,
            requires: vec!["extras".into()],
            objects: Vec::new(),
        };
        let mut project = test_project();
        assert!(matches!(
            doc.load_into(&mut project),
            Err(DocumentError::MissingCatalog(_))
        ));
    }

    #[test]
    fn test_unknown_class_leaves_project_empty() {
        let json = r#"{"format":"rad-designer","version":1,"objects":[
            {"class":"Label","id":"a"},
            {"class":"Spinner","id":"b"}
        ]}"#;
        let mut project = test_project();
        let err = Document::from_json(json).unwrap().load_into(&mut project).unwrap_err();
        assert!(matches!(err, DocumentError::Create(CreateError::UnknownClass(_))));
        assert!(project.toplevels().is_empty());
        assert!(project.widget_by_name("a").is_none());
    }
}

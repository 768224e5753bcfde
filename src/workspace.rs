//! Process-wide editor state: the class registry, open projects, the
//! clipboard and preferences.

use crate::catalog::Catalog;
use crate::clipboard::Clipboard;
use crate::config::Preferences;
use crate::document;
use crate::error::{DocumentError, RegistryError};
use crate::naming::IdAllocator;
use crate::project::Project;
use crate::registry::ClassRegistry;
use crate::toolkit::TypeSystem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builds the registry from the builtin catalog plus any extra catalog
/// files, in the given order.
pub fn build_registry(extra: &[PathBuf]) -> Result<ClassRegistry, RegistryError> {
    let types = Arc::new(TypeSystem::builtin()?);
    let mut catalogs = vec![Catalog::builtin()?];
    for path in extra {
        catalogs.push(Catalog::from_file(path)?);
    }
    ClassRegistry::from_catalogs(types, &catalogs)
}

struct OpenProject {
    project: Project,
    /// Number in "Untitled N" while the project has never been saved.
    untitled: Option<u32>,
}

pub struct Workspace {
    registry: Arc<ClassRegistry>,
    projects: Vec<OpenProject>,
    active: Option<usize>,
    untitled: IdAllocator,
    clipboard: Clipboard,
    preferences: Preferences,
}

impl Workspace {
    pub fn new(registry: Arc<ClassRegistry>, preferences: Preferences) -> Self {
        Self {
            registry,
            projects: Vec::new(),
            active: None,
            untitled: IdAllocator::default(),
            clipboard: Clipboard::new(),
            preferences,
        }
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn preferences_mut(&mut self) -> &mut Preferences {
        &mut self.preferences
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.iter().map(|p| &p.project)
    }

    pub fn project(&self, index: usize) -> Option<&Project> {
        self.projects.get(index).map(|p| &p.project)
    }

    pub fn project_mut(&mut self, index: usize) -> Option<&mut Project> {
        self.projects.get_mut(index).map(|p| &mut p.project)
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active(&self) -> Option<&Project> {
        self.project(self.active?)
    }

    pub fn active_mut(&mut self) -> Option<&mut Project> {
        let index = self.active?;
        self.project_mut(index)
    }

    /// Splits the borrow so the clipboard can work on the active project.
    pub fn active_with_clipboard(&mut self) -> Option<(&mut Project, &mut Clipboard)> {
        let index = self.active?;
        let entry = self.projects.get_mut(index)?;
        Some((&mut entry.project, &mut self.clipboard))
    }

    pub fn set_active(&mut self, index: usize) {
        if index < self.projects.len() {
            self.active = Some(index);
        }
    }

    /// Instance number for a project named `name`: one past the highest
    /// instance already open under that name.
    fn next_instance(&self, name: &str, skip: Option<usize>) -> usize {
        self.projects
            .iter()
            .enumerate()
            .filter(|(i, p)| Some(*i) != skip && p.project.name() == name)
            .map(|(_, p)| p.project.instance() + 1)
            .max()
            .unwrap_or(0)
    }

    fn push(&mut self, project: Project, untitled: Option<u32>) -> usize {
        self.projects.push(OpenProject { project, untitled });
        let index = self.projects.len() - 1;
        self.active = Some(index);
        index
    }

    pub fn new_project(&mut self) -> usize {
        let number = self.untitled.allocate();
        let mut project = Project::new(Arc::clone(&self.registry));
        let name = format!("Untitled {number}");
        project.set_instance(self.next_instance(&name, None));
        project.set_name(&name);
        log::info!("new project `{name}`");
        self.push(project, Some(number))
    }

    /// Opens a file, or activates it if it is already open.
    pub fn open(&mut self, path: &Path) -> Result<usize, DocumentError> {
        if let Some(index) = self.find_path(path) {
            self.active = Some(index);
            return Ok(index);
        }
        let mut project = document::load(Arc::clone(&self.registry), path)?;
        let instance = self.next_instance(project.name(), None);
        if instance > 0 {
            // Widget names were assigned while loading; only new widgets
            // pick up the suffix.
            project.set_instance(instance);
        }
        self.remember(path);
        Ok(self.push(project, None))
    }

    pub fn find_path(&self, path: &Path) -> Option<usize> {
        self.projects
            .iter()
            .position(|p| p.project.path() == Some(path))
    }

    /// Saves to `path`, or to the project's own path when `None`.
    pub fn save(&mut self, index: usize, path: Option<&Path>) -> Result<(), DocumentError> {
        let target = {
            let entry = self.projects.get(index).ok_or_else(|| {
                DocumentError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no open project #{index}"),
                ))
            })?;
            match path.or(entry.project.path()) {
                Some(path) => path.to_path_buf(),
                None => {
                    return Err(DocumentError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "project has no file name",
                    )));
                }
            }
        };

        let name = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
        let instance = name
            .as_deref()
            .map(|n| self.next_instance(n, Some(index)));
        let Some(entry) = self.projects.get_mut(index) else {
            return Ok(());
        };
        document::save(&mut entry.project, &target)?;
        if let (Some(name), Some(instance)) = (name, instance)
            && entry.project.name() != name
        {
            entry.project.set_name(&name);
            entry.project.set_instance(instance);
        }
        if let Some(number) = entry.untitled.take() {
            self.untitled.release(number);
        }
        self.remember(&target);
        Ok(())
    }

    /// Removes a project without asking; the caller checks for unsaved
    /// changes first.
    pub fn close(&mut self, index: usize) -> Option<Project> {
        if index >= self.projects.len() {
            return None;
        }
        let entry = self.projects.remove(index);
        if let Some(number) = entry.untitled {
            self.untitled.release(number);
        }
        self.active = match self.active {
            _ if self.projects.is_empty() => None,
            Some(active) if active > index => Some(active - 1),
            Some(active) if active == index => Some(index.min(self.projects.len() - 1)),
            other => other,
        };
        log::info!("closed `{}`", entry.project.name());
        Some(entry.project)
    }

    pub fn has_unsaved(&self) -> bool {
        self.projects.iter().any(|p| p.project.is_modified())
    }

    fn remember(&mut self, path: &Path) {
        if let Err(err) = self.preferences.push_recent_file(path) {
            self.preferences.report_error(&err);
        }
    }
}

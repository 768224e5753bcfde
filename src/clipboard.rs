use crate::command;
use crate::document::ObjectNode;
use crate::error::CommandError;
use crate::project::Project;
use crate::toolkit::ObjectId;
use crate::widget::WidgetId;

/// A deep, project-independent copy of a widget subtree.
pub type WidgetTemplate = ObjectNode;

/// Holds the templates of the last copy or cut. Shared by every open project.
#[derive(Debug, Default)]
pub struct Clipboard {
    templates: Vec<WidgetTemplate>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn templates(&self) -> &[WidgetTemplate] {
        &self.templates
    }

    pub fn clear(&mut self) {
        self.templates.clear();
    }

    pub fn copy(&mut self, project: &Project, widgets: &[WidgetId]) -> Result<usize, CommandError> {
        let templates = command::copy(project, widgets)?;
        if templates.is_empty() {
            return Err(CommandError::NothingSelected);
        }
        self.templates = templates;
        log::debug!("copied {} widget(s)", self.templates.len());
        Ok(self.templates.len())
    }

    pub fn cut(&mut self, project: &mut Project, widgets: &[WidgetId]) -> Result<usize, CommandError> {
        let templates = command::cut(project, widgets)?;
        if templates.is_empty() {
            return Err(CommandError::NothingSelected);
        }
        self.templates = templates;
        log::debug!("cut {} widget(s)", self.templates.len());
        Ok(self.templates.len())
    }

    /// Pastes into `parent` (or as toplevels). The templates stay on the
    /// clipboard for further pastes.
    pub fn paste(
        &self,
        project: &mut Project,
        parent: Option<WidgetId>,
        placeholder: Option<ObjectId>,
    ) -> Result<Vec<WidgetId>, CommandError> {
        command::paste(project, &self.templates, parent, placeholder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::testing::{create, test_project};

    #[test]
    fn test_copy_between_projects() {
        let mut source = test_project();
        let window = create(&mut source, "Window");
        let mut clipboard = Clipboard::new();
        assert_eq!(clipboard.copy(&source, &[window]).unwrap(), 1);

        let mut target = test_project();
        let pasted = clipboard.paste(&mut target, None, None).unwrap();
        assert_eq!(pasted.len(), 1);
        assert_eq!(target.toplevels(), pasted.as_slice());
        assert_eq!(target.widget(pasted[0]).unwrap().name(), "window1");

        clipboard.paste(&mut target, None, None).unwrap();
        assert_eq!(target.toplevels().len(), 2);
        assert_eq!(clipboard.len(), 1);
    }

    #[test]
    fn test_cut_keeps_templates_after_undo() {
        let mut project = test_project();
        let window = create(&mut project, "Window");
        let mut clipboard = Clipboard::new();
        clipboard.cut(&mut project, &[window]).unwrap();
        assert!(project.toplevels().is_empty());
        project.undo().unwrap();
        assert_eq!(project.toplevels(), &[window]);
        assert!(!clipboard.is_empty());
    }

    #[test]
    fn test_empty_selection() {
        let project = test_project();
        let mut clipboard = Clipboard::new();
        assert!(clipboard.copy(&project, &[]).is_err());
        assert!(clipboard.is_empty());
        let mut project = project;
        assert!(matches!(
            clipboard.paste(&mut project, None, None),
            Err(CommandError::NothingToPaste)
        ));
    }
}

//! The editor window: palette, hierarchy, inspector and document preview.
//! Every model change goes through the command layer.

use crate::adaptor::{ClassAdaptor, PropertyDef, PropertyTab};
use crate::command;
use crate::config::keys;
use crate::document::Document;
use crate::error::CommandError;
use crate::highlight::{self, Highlighter};
use crate::project::{ChildSlot, Project, PropertyQuery};
use crate::toolkit::ObjectId;
use crate::value::Value;
use crate::widget::{I18n, Property, Signal, Widget, WidgetId};
use crate::workspace::Workspace;
use chrono::{DateTime, Local};
use egui::collapsing_header::CollapsingState;
use egui::{Key, KeyboardShortcut, Modifiers, RichText};
use egui_extras::{Column, TableBuilder};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

const FILE_FILTER_NAME: &str = "Designer project";
const FILE_EXTENSIONS: &[&str] = &["json"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RightTab {
    #[default]
    Properties,
    Signals,
    History,
}

/// Panel state kept in the preferences between sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub palette_open: bool,
    pub preview_open: bool,
    pub right_tab: RightTab,
    pub inner_size: Option<egui::Vec2>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            palette_open: true,
            preview_open: true,
            right_tab: RightTab::Properties,
            inner_size: None,
        }
    }
}

/// Model edits requested by the panels, applied after drawing.
#[derive(Debug)]
enum Edit {
    Set(WidgetId, String, Value),
    Enable(WidgetId, String, bool),
    I18n(WidgetId, String, I18n),
    Rename(WidgetId, String),
    AddSignal(WidgetId, Signal),
    RemoveSignal(WidgetId, Signal),
    ChangeSignal(WidgetId, Signal, Signal),
    Action(WidgetId, String),
    ChildAction(WidgetId, ObjectId, String),
}

#[derive(Debug)]
enum Action {
    NewProject,
    OpenDialog,
    Open(PathBuf),
    Save,
    SaveAs,
    Close(usize),
    ForceClose(usize),
    Activate(usize),
    Undo,
    Redo,
    Cut,
    Copy,
    Paste,
    Delete,
    Select(WidgetId, bool),
    Target(WidgetId, ObjectId),
    Create(Arc<ClassAdaptor>),
    Edit(Edit),
}

/// A creation waiting for the user to fill in its query properties.
struct PendingCreate {
    adaptor: Arc<ClassAdaptor>,
    parent: Option<WidgetId>,
    placeholder: Option<ObjectId>,
    values: Vec<(Arc<PropertyDef>, Value)>,
}

/// Answers creation queries with values collected beforehand.
struct PresetQuery<'a>(&'a [(Arc<PropertyDef>, Value)]);

impl PropertyQuery for PresetQuery<'_> {
    fn query(&mut self, _adaptor: &ClassAdaptor, def: &PropertyDef, current: &Value) -> Option<Value> {
        let value = self
            .0
            .iter()
            .find(|(d, _)| d.id == def.id)
            .map_or_else(|| current.clone(), |(_, v)| v.clone());
        Some(value)
    }
}

#[derive(Default)]
struct SignalDraft {
    name: String,
    handler: String,
}

pub(crate) struct DesignerApp {
    workspace: Workspace,
    layout: Layout,
    highlighter: Highlighter,
    property_tab: PropertyTab,
    /// Placeholder picked as the destination for create and paste.
    target: Option<(WidgetId, ObjectId)>,
    name_buffer: Option<(WidgetId, String)>,
    signal_draft: SignalDraft,
    pending_create: Option<PendingCreate>,
    confirm_close: Option<usize>,
    confirm_quit: bool,
    force_quit: bool,
    actions: Vec<Action>,
    /// Last preview text, the theme it was highlighted with, and the layout.
    preview: Option<(String, String, egui::text::LayoutJob)>,
    title: String,
    status: Option<(String, DateTime<Local>)>,
}

impl DesignerApp {
    pub fn new(mut workspace: Workspace, open: Option<PathBuf>) -> Self {
        let mut layout: Layout = workspace
            .preferences()
            .get_json(keys::LAYOUT)
            .unwrap_or_default();
        let mut highlighter = Highlighter::new();
        if let Some(theme) = workspace.preferences().get(keys::PREVIEW_THEME) {
            highlighter.set_theme(theme);
        }
        layout.preview_open = workspace
            .preferences()
            .get_bool(keys::SHOW_PREVIEW, layout.preview_open);

        let mut status = None;
        match open {
            Some(path) => {
                if let Err(err) = workspace.open(&path) {
                    log::error!("could not open {}: {err}", path.display());
                    status = Some((format!("Could not open {}: {err}", path.display()), Local::now()));
                    workspace.new_project();
                }
            }
            None => {
                workspace.new_project();
            }
        }

        Self {
            workspace,
            layout,
            highlighter,
            property_tab: PropertyTab::General,
            target: None,
            name_buffer: None,
            signal_draft: SignalDraft::default(),
            pending_create: None,
            confirm_close: None,
            confirm_quit: false,
            force_quit: false,
            actions: Vec::new(),
            preview: None,
            title: String::new(),
            status,
        }
    }

    fn set_status(&mut self, msg: String) {
        log::info!("{msg}");
        self.status = Some((msg, Local::now()));
    }

    fn report(&mut self, err: &dyn Display) {
        log::warn!("{err}");
        self.status = Some((err.to_string(), Local::now()));
    }

    /// Runs `f` on the active project, reporting failures in the status bar.
    fn with_active<T>(
        &mut self,
        f: impl FnOnce(&mut Project) -> Result<T, CommandError>,
    ) -> Option<T> {
        let result = f(self.workspace.active_mut()?);
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    // ---- actions ----

    fn apply(&mut self, action: Action) {
        match action {
            Action::NewProject => {
                self.workspace.new_project();
                self.target = None;
            }
            Action::OpenDialog => {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter(FILE_FILTER_NAME, FILE_EXTENSIONS)
                    .pick_file()
                {
                    self.open(path);
                }
            }
            Action::Open(path) => self.open(path),
            Action::Save => self.save(false),
            Action::SaveAs => self.save(true),
            Action::Close(index) => {
                if self.workspace.project(index).is_some_and(Project::is_modified) {
                    self.confirm_close = Some(index);
                } else {
                    self.close(index);
                }
            }
            Action::ForceClose(index) => self.close(index),
            Action::Activate(index) => {
                self.workspace.set_active(index);
                self.target = None;
            }
            Action::Undo => {
                if self.with_active(Project::undo) == Some(false) {
                    self.set_status("Nothing to undo".into());
                }
            }
            Action::Redo => {
                if self.with_active(Project::redo) == Some(false) {
                    self.set_status("Nothing to redo".into());
                }
            }
            Action::Cut => self.cut(),
            Action::Copy => self.copy(),
            Action::Paste => self.paste(),
            Action::Delete => {
                self.with_active(|p| {
                    let selection = p.selection().to_vec();
                    command::delete(p, &selection)
                });
            }
            Action::Select(id, toggle) => {
                self.target = None;
                if let Some(project) = self.workspace.active_mut() {
                    if toggle {
                        project.toggle_selection(id);
                    } else {
                        project.select(id);
                    }
                }
            }
            Action::Target(parent, placeholder) => {
                self.target = Some((parent, placeholder));
                if let Some(project) = self.workspace.active_mut() {
                    project.clear_selection();
                }
            }
            Action::Create(adaptor) => self.begin_create(adaptor),
            Action::Edit(edit) => self.apply_edit(edit),
        }
    }

    fn apply_edit(&mut self, edit: Edit) {
        self.with_active(|p| match edit {
            Edit::Set(w, id, value) => command::set_property(p, w, &id, value),
            Edit::Enable(w, id, enabled) => command::set_property_enabled(p, w, &id, enabled),
            Edit::I18n(w, id, i18n) => command::set_property_i18n(p, w, &id, i18n),
            Edit::Rename(w, name) => command::set_name(p, w, &name),
            Edit::AddSignal(w, signal) => command::add_signal(p, w, signal),
            Edit::RemoveSignal(w, signal) => command::remove_signal(p, w, signal),
            Edit::ChangeSignal(w, old, new) => command::change_signal(p, w, old, new),
            Edit::Action(w, action) => command::activate_action(p, w, &action),
            Edit::ChildAction(w, child, action) => command::activate_child_action(p, w, child, &action),
        });
    }

    fn open(&mut self, path: PathBuf) {
        match self.workspace.open(&path) {
            Ok(_) => {
                self.target = None;
                self.set_status(format!("Opened {}", path.display()));
            }
            Err(err) => self.report(&format!("Could not open {}: {err}", path.display())),
        }
    }

    fn save(&mut self, ask: bool) {
        let Some(index) = self.workspace.active_index() else {
            return;
        };
        let current = self.workspace.project(index).and_then(|p| p.path().map(PathBuf::from));
        let path = match current {
            Some(path) if !ask => path,
            _ => {
                let name = self
                    .workspace
                    .project(index)
                    .map(|p| format!("{}.json", p.name()))
                    .unwrap_or_default();
                let Some(path) = rfd::FileDialog::new()
                    .add_filter(FILE_FILTER_NAME, FILE_EXTENSIONS)
                    .set_file_name(name)
                    .save_file()
                else {
                    return;
                };
                path
            }
        };
        match self.workspace.save(index, Some(&path)) {
            Ok(()) => self.set_status(format!("Saved {}", path.display())),
            Err(err) => self.report(&format!("Could not save {}: {err}", path.display())),
        }
    }

    fn close(&mut self, index: usize) {
        self.target = None;
        self.name_buffer = None;
        if self.workspace.close(index).is_some() && self.workspace.is_empty() {
            self.workspace.new_project();
        }
    }

    fn copy(&mut self) {
        let Some((project, clipboard)) = self.workspace.active_with_clipboard() else {
            return;
        };
        let selection = project.selection().to_vec();
        match clipboard.copy(project, &selection) {
            Ok(n) => self.set_status(format!("Copied {n} widget(s)")),
            Err(err) => self.report(&err),
        }
    }

    fn cut(&mut self) {
        let Some((project, clipboard)) = self.workspace.active_with_clipboard() else {
            return;
        };
        let selection = project.selection().to_vec();
        match clipboard.cut(project, &selection) {
            Ok(n) => self.set_status(format!("Cut {n} widget(s)")),
            Err(err) => self.report(&err),
        }
    }

    /// Pastes into the targeted placeholder, the selected container, or as
    /// toplevels.
    fn paste(&mut self) {
        let target = self.target.take();
        let Some((project, clipboard)) = self.workspace.active_with_clipboard() else {
            return;
        };
        let (parent, placeholder) = match target {
            Some((parent, placeholder)) => (Some(parent), Some(placeholder)),
            None => match project.selection() {
                [one] if project.widget(*one).is_some_and(|w| w.adaptor().is_container()) => {
                    (Some(*one), None)
                }
                _ => (None, None),
            },
        };
        match clipboard.paste(project, parent, placeholder) {
            Ok(pasted) => {
                if let Some(first) = pasted.first() {
                    project.select(*first);
                }
                self.set_status(format!("Pasted {} widget(s)", pasted.len()));
            }
            Err(err) => self.report(&err),
        }
    }

    fn create_target(
        &self,
        project: &Project,
        adaptor: &ClassAdaptor,
    ) -> Result<(Option<WidgetId>, Option<ObjectId>), String> {
        if adaptor.toplevel {
            return Ok((None, None));
        }
        if let Some((parent, placeholder)) = self.target
            && project
                .widget(parent)
                .is_some_and(|w| project.toolkit().parent(placeholder) == Some(w.object()))
        {
            return Ok((Some(parent), Some(placeholder)));
        }
        match project.selection() {
            [one] if project.widget(*one).is_some_and(|w| w.adaptor().is_container()) => {
                Ok((Some(*one), None))
            }
            _ => Err(format!("Pick a placeholder to place the new {}", adaptor.title)),
        }
    }

    fn begin_create(&mut self, adaptor: Arc<ClassAdaptor>) {
        let Some(project) = self.workspace.active() else {
            return;
        };
        let (parent, placeholder) = match self.create_target(project, &adaptor) {
            Ok(target) => target,
            Err(msg) => {
                self.report(&msg);
                return;
            }
        };
        let values: Vec<(Arc<PropertyDef>, Value)> = adaptor
            .properties
            .iter()
            .filter(|d| d.query)
            .map(|d| (Arc::clone(d), d.default.clone()))
            .collect();
        let pending = PendingCreate {
            adaptor,
            parent,
            placeholder,
            values,
        };
        if pending.values.is_empty() {
            self.finish_create(pending);
        } else {
            self.pending_create = Some(pending);
        }
    }

    fn finish_create(&mut self, pending: PendingCreate) {
        let PendingCreate {
            adaptor,
            parent,
            placeholder,
            values,
        } = pending;
        let mut query = PresetQuery(&values);
        let created = self.with_active(|p| {
            let id = command::create(p, &adaptor, parent, placeholder, Some(&mut query))?;
            Ok(p.widget(id).map(|w| w.name().to_string()).unwrap_or_default())
        });
        if let Some(name) = created {
            self.target = None;
            self.set_status(format!("Created {name}"));
        }
    }

    // ---- panels ----

    fn shortcuts(&mut self, ctx: &egui::Context) {
        let typing = ctx.wants_keyboard_input();
        let shortcut = |m, k| KeyboardShortcut::new(m, k);
        let redo_shift = shortcut(Modifiers::COMMAND | Modifiers::SHIFT, Key::Z);
        let pressed: Vec<Action> = ctx.input_mut(|i| {
            let mut out = Vec::new();
            if i.consume_shortcut(&shortcut(Modifiers::COMMAND, Key::N)) {
                out.push(Action::NewProject);
            }
            if i.consume_shortcut(&shortcut(Modifiers::COMMAND, Key::O)) {
                out.push(Action::OpenDialog);
            }
            if i.consume_shortcut(&shortcut(Modifiers::COMMAND | Modifiers::SHIFT, Key::S)) {
                out.push(Action::SaveAs);
            } else if i.consume_shortcut(&shortcut(Modifiers::COMMAND, Key::S)) {
                out.push(Action::Save);
            }
            if typing {
                return out;
            }
            if i.consume_shortcut(&redo_shift)
                || i.consume_shortcut(&shortcut(Modifiers::COMMAND, Key::Y))
            {
                out.push(Action::Redo);
            } else if i.consume_shortcut(&shortcut(Modifiers::COMMAND, Key::Z)) {
                out.push(Action::Undo);
            }
            if i.consume_shortcut(&shortcut(Modifiers::COMMAND, Key::X)) {
                out.push(Action::Cut);
            }
            if i.consume_shortcut(&shortcut(Modifiers::COMMAND, Key::C)) {
                out.push(Action::Copy);
            }
            if i.consume_shortcut(&shortcut(Modifiers::COMMAND, Key::V)) {
                out.push(Action::Paste);
            }
            if i.key_pressed(Key::Delete) {
                out.push(Action::Delete);
            }
            out
        });
        self.actions.extend(pressed);
    }

    fn menu_bar(&mut self, ui: &mut egui::Ui) {
        let Self {
            workspace,
            layout,
            highlighter,
            actions,
            ..
        } = self;
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("New").on_hover_text("Ctrl+N").clicked() {
                    actions.push(Action::NewProject);
                    ui.close_kind(egui::UiKind::Menu);
                }
                if ui.button("Open...").on_hover_text("Ctrl+O").clicked() {
                    actions.push(Action::OpenDialog);
                    ui.close_kind(egui::UiKind::Menu);
                }
                let recent = workspace.preferences().recent_files();
                ui.add_enabled_ui(!recent.is_empty(), |ui| {
                    ui.menu_button("Open Recent", |ui| {
                        for path in recent {
                            if ui.button(path.display().to_string()).clicked() {
                                actions.push(Action::Open(path));
                                ui.close_kind(egui::UiKind::Menu);
                            }
                        }
                    });
                });
                ui.separator();
                if ui.button("Save").on_hover_text("Ctrl+S").clicked() {
                    actions.push(Action::Save);
                    ui.close_kind(egui::UiKind::Menu);
                }
                if ui.button("Save As...").on_hover_text("Ctrl+Shift+S").clicked() {
                    actions.push(Action::SaveAs);
                    ui.close_kind(egui::UiKind::Menu);
                }
                ui.separator();
                if let Some(index) = workspace.active_index()
                    && ui.button("Close").clicked()
                {
                    actions.push(Action::Close(index));
                    ui.close_kind(egui::UiKind::Menu);
                }
                if ui.button("Quit").clicked() {
                    ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close);
                    ui.close_kind(egui::UiKind::Menu);
                }
            });

            ui.menu_button("Edit", |ui| {
                let project = workspace.active();
                let undo = project.and_then(|p| p.stack().undo_description());
                let redo = project.and_then(|p| p.stack().redo_description());
                let has_selection = project.is_some_and(|p| !p.selection().is_empty());
                let undo_label = undo.map_or_else(|| "Undo".to_string(), |d| format!("Undo: {d}"));
                if ui.add_enabled(undo.is_some(), egui::Button::new(undo_label)).clicked() {
                    actions.push(Action::Undo);
                    ui.close_kind(egui::UiKind::Menu);
                }
                let redo_label = redo.map_or_else(|| "Redo".to_string(), |d| format!("Redo: {d}"));
                if ui.add_enabled(redo.is_some(), egui::Button::new(redo_label)).clicked() {
                    actions.push(Action::Redo);
                    ui.close_kind(egui::UiKind::Menu);
                }
                ui.separator();
                if ui.add_enabled(has_selection, egui::Button::new("Cut")).clicked() {
                    actions.push(Action::Cut);
                    ui.close_kind(egui::UiKind::Menu);
                }
                if ui.add_enabled(has_selection, egui::Button::new("Copy")).clicked() {
                    actions.push(Action::Copy);
                    ui.close_kind(egui::UiKind::Menu);
                }
                let can_paste = !workspace.clipboard().is_empty();
                if ui.add_enabled(can_paste, egui::Button::new("Paste")).clicked() {
                    actions.push(Action::Paste);
                    ui.close_kind(egui::UiKind::Menu);
                }
                if ui.add_enabled(has_selection, egui::Button::new("Delete")).clicked() {
                    actions.push(Action::Delete);
                    ui.close_kind(egui::UiKind::Menu);
                }
            });

            ui.menu_button("View", |ui| {
                ui.checkbox(&mut layout.palette_open, "Palette");
                ui.checkbox(&mut layout.preview_open, "Document preview");
                ui.menu_button("Preview theme", |ui| {
                    let names: Vec<String> = highlighter.theme_names().map(str::to_string).collect();
                    for name in names {
                        let current = highlighter.theme_name() == name;
                        if ui.selectable_label(current, &name).clicked() {
                            highlighter.set_theme(&name);
                            ui.close_kind(egui::UiKind::Menu);
                        }
                    }
                });
            });

            ui.menu_button("Projects", |ui| {
                let active = workspace.active_index();
                for (i, project) in workspace.projects().enumerate() {
                    if ui.selectable_label(active == Some(i), project_title(project)).clicked() {
                        actions.push(Action::Activate(i));
                        ui.close_kind(egui::UiKind::Menu);
                    }
                }
            });
        });
    }

    fn status_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if let Some((msg, time)) = &self.status {
                ui.weak(time.format("%H:%M:%S").to_string());
                ui.label(msg);
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(project) = self.workspace.active() {
                    ui.label(format!("{} widgets", project.widgets().len()));
                    ui.separator();
                    ui.label(project_title(project));
                }
            });
        });
    }

    fn palette_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Palette");
        ui.separator();
        let registry = Arc::clone(self.workspace.registry());
        egui::ScrollArea::vertical().id_salt("palette_scroll").show(ui, |ui| {
            for group in registry.groups() {
                egui::CollapsingHeader::new(&group.title)
                    .id_salt(("palette", &group.name))
                    .default_open(true)
                    .show(ui, |ui| {
                        for class in &group.classes {
                            let Some(adaptor) = registry.lookup_by_name(class) else {
                                continue;
                            };
                            if ui
                                .button(&adaptor.title)
                                .on_hover_text(&adaptor.name)
                                .clicked()
                            {
                                self.actions.push(Action::Create(Arc::clone(adaptor)));
                            }
                        }
                    });
            }
        });
    }

    fn hierarchy_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Hierarchy");
        ui.separator();
        let Some(project) = self.workspace.active() else {
            return;
        };
        let actions = &mut self.actions;
        let target = self.target;
        egui::ScrollArea::both().id_salt("hierarchy_scroll").show(ui, |ui| {
            if project.toplevels().is_empty() {
                ui.weak("Empty project");
            }
            for top in project.toplevels() {
                widget_row(ui, project, *top, target, actions);
            }
        });
    }

    fn inspector_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for (tab, label) in [
                (RightTab::Properties, "Properties"),
                (RightTab::Signals, "Signals"),
                (RightTab::History, "History"),
            ] {
                if ui.selectable_label(self.layout.right_tab == tab, label).clicked() {
                    self.layout.right_tab = tab;
                }
            }
        });
        ui.separator();
        match self.layout.right_tab {
            RightTab::Properties => self.properties_ui(ui),
            RightTab::Signals => self.signals_ui(ui),
            RightTab::History => self.history_ui(ui),
        }
    }

    fn properties_ui(&mut self, ui: &mut egui::Ui) {
        let Self {
            workspace,
            property_tab,
            name_buffer,
            actions,
            ..
        } = self;
        let Some(project) = workspace.active() else {
            return;
        };
        let Some(widget) = single_selection(project) else {
            ui.weak("Select one widget to edit its properties.");
            return;
        };
        let id = widget.id();

        ui.horizontal(|ui| {
            ui.label("Name");
            if name_buffer.as_ref().is_none_or(|(w, _)| *w != id) {
                *name_buffer = Some((id, widget.name().to_string()));
            }
            let Some((_, buffer)) = name_buffer.as_mut() else {
                return;
            };
            let response = ui.add_enabled(
                widget.internal().is_none(),
                egui::TextEdit::singleline(buffer).desired_width(f32::INFINITY),
            );
            if response.lost_focus() {
                if buffer.as_str() != widget.name() && !buffer.is_empty() {
                    actions.push(Action::Edit(Edit::Rename(id, buffer.clone())));
                }
                *name_buffer = None;
            } else if !response.has_focus() && buffer.as_str() != widget.name() {
                *buffer = widget.name().to_string();
            }
        });
        ui.weak(format!("{} ({})", widget.adaptor().title, widget.adaptor().name));

        if !widget.adaptor().actions.is_empty() {
            ui.horizontal_wrapped(|ui| {
                for action in &widget.adaptor().actions {
                    if ui.button(&action.label).clicked() {
                        actions.push(Action::Edit(Edit::Action(id, action.id.clone())));
                    }
                }
            });
        }
        ui.separator();

        ui.horizontal(|ui| {
            for (tab, label) in [
                (PropertyTab::General, "General"),
                (PropertyTab::Packing, "Packing"),
                (PropertyTab::Common, "Common"),
            ] {
                if ui.selectable_label(*property_tab == tab, label).clicked() {
                    *property_tab = tab;
                }
            }
        });
        ui.separator();

        let properties = widget.properties_by_tab(*property_tab);
        if properties.is_empty() {
            ui.weak("No properties on this tab.");
        }
        egui::ScrollArea::vertical().id_salt("properties_scroll").show(ui, |ui| {
            egui::Grid::new(("properties", id))
                .num_columns(2)
                .striped(true)
                .show(ui, |ui| {
                    for prop in properties {
                        property_row(ui, project, id, prop, actions);
                        ui.end_row();
                    }
                });
        });
    }

    fn signals_ui(&mut self, ui: &mut egui::Ui) {
        let Self {
            workspace,
            signal_draft,
            actions,
            ..
        } = self;
        let Some(project) = workspace.active() else {
            return;
        };
        let Some(widget) = single_selection(project) else {
            ui.weak("Select one widget to edit its signal handlers.");
            return;
        };
        let id = widget.id();
        let handlers: Vec<Signal> = widget.handlers().cloned().collect();

        TableBuilder::new(ui)
            .id_salt(("signals", id))
            .striped(true)
            .resizable(true)
            .column(Column::auto().at_least(100.0))
            .column(Column::remainder().at_least(100.0))
            .column(Column::auto())
            .column(Column::auto())
            .column(Column::auto())
            .header(20.0, |mut header| {
                for title in ["Signal", "Handler", "After", "Swapped", ""] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for signal in &handlers {
                    body.row(20.0, |mut row| {
                        row.col(|ui| {
                            ui.label(&signal.name);
                        });
                        row.col(|ui| {
                            ui.monospace(&signal.handler);
                        });
                        row.col(|ui| {
                            let mut after = signal.after;
                            if ui.checkbox(&mut after, "").changed() {
                                let new = Signal { after, ..signal.clone() };
                                actions.push(Action::Edit(Edit::ChangeSignal(id, signal.clone(), new)));
                            }
                        });
                        row.col(|ui| {
                            let mut swapped = signal.swapped;
                            if ui.checkbox(&mut swapped, "").changed() {
                                let new = Signal {
                                    swapped,
                                    ..signal.clone()
                                };
                                actions.push(Action::Edit(Edit::ChangeSignal(id, signal.clone(), new)));
                            }
                        });
                        row.col(|ui| {
                            if ui.small_button("Remove").clicked() {
                                actions.push(Action::Edit(Edit::RemoveSignal(id, signal.clone())));
                            }
                        });
                    });
                }
            });

        ui.separator();
        ui.horizontal(|ui| {
            egui::ComboBox::from_id_salt(("new_signal", id))
                .selected_text(if signal_draft.name.is_empty() {
                    "Signal"
                } else {
                    signal_draft.name.as_str()
                })
                .show_ui(ui, |ui| {
                    for def in &widget.adaptor().signals {
                        if ui
                            .selectable_label(signal_draft.name == def.name, &def.name)
                            .on_hover_text(&def.owner_type)
                            .clicked()
                        {
                            signal_draft.name = def.name.clone();
                            if signal_draft.handler.is_empty() {
                                signal_draft.handler =
                                    format!("on_{}_{}", widget.name(), def.name).replace('-', "_");
                            }
                        }
                    }
                });
            ui.add(egui::TextEdit::singleline(&mut signal_draft.handler).hint_text("handler"));
            let ready = !signal_draft.name.is_empty() && !signal_draft.handler.is_empty();
            if ui.add_enabled(ready, egui::Button::new("Add")).clicked() {
                let signal = Signal::new(&signal_draft.name, &signal_draft.handler);
                actions.push(Action::Edit(Edit::AddSignal(id, signal)));
                *signal_draft = SignalDraft::default();
            }
        });
    }

    fn history_ui(&mut self, ui: &mut egui::Ui) {
        let Some(project) = self.workspace.active() else {
            return;
        };
        ui.horizontal(|ui| {
            if ui.add_enabled(project.can_undo(), egui::Button::new("Undo")).clicked() {
                self.actions.push(Action::Undo);
            }
            if ui.add_enabled(project.can_redo(), egui::Button::new("Redo")).clicked() {
                self.actions.push(Action::Redo);
            }
        });
        ui.separator();
        egui::ScrollArea::vertical().id_salt("history_scroll").show(ui, |ui| {
            let stack = project.stack();
            if !stack.can_undo() && !stack.can_redo() {
                ui.weak("No changes yet");
            }
            for description in stack.undo_descriptions() {
                ui.label(description);
            }
            for description in stack.redo_descriptions() {
                ui.label(RichText::new(description).italics().weak());
            }
        });
    }

    fn central_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            let active = self.workspace.active_index();
            for (i, project) in self.workspace.projects().enumerate() {
                if ui.selectable_label(active == Some(i), project_title(project)).clicked() {
                    self.actions.push(Action::Activate(i));
                }
                if ui.small_button("x").on_hover_text("Close project").clicked() {
                    self.actions.push(Action::Close(i));
                }
                ui.separator();
            }
        });
        ui.separator();

        if !self.layout.preview_open {
            ui.weak("Document preview is hidden (View > Document preview).");
            return;
        }
        let Some(project) = self.workspace.active() else {
            return;
        };
        let text = match Document::from_project(project).to_json() {
            Ok(text) => text,
            Err(err) => {
                ui.colored_label(ui.visuals().error_fg_color, err.to_string());
                return;
            }
        };
        let theme = self.highlighter.theme_name();
        let stale = self
            .preview
            .as_ref()
            .is_none_or(|(cached, cached_theme, _)| *cached != text || cached_theme != theme);
        if stale {
            let job = self.highlighter.layout_job(&text);
            self.preview = Some((text, theme.to_string(), job));
        }
        if let Some((_, _, job)) = &self.preview {
            highlight::code_viewer(ui, job.clone());
        }
    }

    fn dialogs(&mut self, ctx: &egui::Context) {
        if let Some(mut pending) = self.pending_create.take() {
            let mut decision = None;
            egui::Window::new(format!("New {}", pending.adaptor.title))
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    egui::Grid::new("query_grid").num_columns(2).show(ui, |ui| {
                        let project = self.workspace.active();
                        for (def, value) in &mut pending.values {
                            ui.label(&def.name);
                            if let Some(project) = project
                                && let Some(new) = value_editor(ui, project, None, def, value)
                            {
                                *value = new;
                            }
                            ui.end_row();
                        }
                    });
                    ui.horizontal(|ui| {
                        if ui.button("Create").clicked() {
                            decision = Some(true);
                        }
                        if ui.button("Cancel").clicked() {
                            decision = Some(false);
                        }
                    });
                });
            match decision {
                Some(true) => self.finish_create(pending),
                Some(false) => log::info!("creation of {} cancelled", pending.adaptor.name),
                None => self.pending_create = Some(pending),
            }
        }

        if let Some(index) = self.confirm_close {
            let name = self
                .workspace
                .project(index)
                .map(|p| p.name().to_string())
                .unwrap_or_default();
            egui::Window::new("Unsaved changes")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label(format!("Save changes to \"{name}\" before closing?"));
                    ui.horizontal(|ui| {
                        if ui.button("Save").clicked() {
                            self.confirm_close = None;
                            self.workspace.set_active(index);
                            self.actions.push(Action::Save);
                            self.actions.push(Action::Close(index));
                        }
                        if ui.button("Discard").clicked() {
                            self.confirm_close = None;
                            self.actions.push(Action::ForceClose(index));
                        }
                        if ui.button("Cancel").clicked() {
                            self.confirm_close = None;
                        }
                    });
                });
        }

        if self.confirm_quit {
            egui::Window::new("Quit")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label("Some projects have unsaved changes. Quit anyway?");
                    ui.horizontal(|ui| {
                        if ui.button("Quit").clicked() {
                            self.confirm_quit = false;
                            self.force_quit = true;
                            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        }
                        if ui.button("Cancel").clicked() {
                            self.confirm_quit = false;
                        }
                    });
                });
        }
    }

    fn update_title(&mut self, ctx: &egui::Context) {
        let title = match self.workspace.active() {
            Some(project) => format!("{} - rad-designer", project_title(project)),
            None => "rad-designer".to_string(),
        };
        if title != self.title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.title = title;
        }
    }

    fn persist(&mut self, ctx: &egui::Context) {
        self.layout.inner_size = ctx.input(|i| i.viewport().inner_rect.map(|r| r.size()));
        let theme = self.highlighter.theme_name().to_string();
        let prefs = self.workspace.preferences_mut();
        prefs.set(keys::PREVIEW_THEME, theme);
        prefs.set(keys::SHOW_PREVIEW, crate::value::format_bool(self.layout.preview_open));
        let result = prefs
            .set_json(keys::LAYOUT, &self.layout)
            .and_then(|()| prefs.save());
        if let Err(err) = result
            && let Some(msg) = prefs.report_error(&err)
        {
            self.status = Some((msg, Local::now()));
        }
    }

    fn handle_close_request(&mut self, ctx: &egui::Context) {
        if !ctx.input(|i| i.viewport().close_requested()) {
            return;
        }
        if self.workspace.has_unsaved() && !self.force_quit {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.confirm_quit = true;
            return;
        }
        self.persist(ctx);
    }
}

impl eframe::App for DesignerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.shortcuts(ctx);

        egui::TopBottomPanel::top("menubar").show(ctx, |ui| self.menu_bar(ui));
        egui::TopBottomPanel::bottom("statusbar").show(ctx, |ui| self.status_bar(ui));
        if self.layout.palette_open {
            egui::SidePanel::left("palette")
                .resizable(true)
                .default_width(160.0)
                .show(ctx, |ui| self.palette_ui(ui));
        }
        egui::SidePanel::left("hierarchy")
            .resizable(true)
            .default_width(220.0)
            .show(ctx, |ui| self.hierarchy_ui(ui));
        egui::SidePanel::right("inspector")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| self.inspector_ui(ui));
        egui::CentralPanel::default().show(ctx, |ui| self.central_ui(ui));
        self.dialogs(ctx);

        for action in std::mem::take(&mut self.actions) {
            self.apply(action);
        }
        self.update_title(ctx);
        self.handle_close_request(ctx);
    }
}

fn project_title(project: &Project) -> String {
    if project.is_modified() {
        format!("*{}", project.name())
    } else {
        project.name().to_string()
    }
}

fn single_selection(project: &Project) -> Option<&Widget> {
    match project.selection() {
        [one] => project.widget(*one),
        _ => None,
    }
}

fn widget_row(
    ui: &mut egui::Ui,
    project: &Project,
    id: WidgetId,
    target: Option<(WidgetId, ObjectId)>,
    actions: &mut Vec<Action>,
) {
    let Some(node) = project.widget(id) else {
        return;
    };
    let mut text = RichText::new(format!("{}  {}", node.name(), node.adaptor().title));
    if node.internal().is_some() {
        text = text.italics();
    }
    let selected = project.is_selected(id);
    let slots = project.child_slots(id);

    let mut header = |ui: &mut egui::Ui| {
        let response = ui.selectable_label(selected, text.clone());
        if response.clicked() {
            let toggle = ui.input(|i| i.modifiers.command);
            actions.push(Action::Select(id, toggle));
        }
        response.context_menu(|ui| widget_menu(ui, project, node, actions));
    };

    if slots.is_empty() {
        header(ui);
        return;
    }
    let state = CollapsingState::load_with_default_open(ui.ctx(), ui.make_persistent_id(("tree", id)), true);
    state.show_header(ui, |ui| header(ui)).body(|ui| {
        for slot in slots {
            match slot {
                ChildSlot::Widget(child) => widget_row(ui, project, child, target, actions),
                ChildSlot::Placeholder(object) => placeholder_row(ui, node, object, target, actions),
            }
        }
    });
}

fn widget_menu(ui: &mut egui::Ui, project: &Project, node: &Widget, actions: &mut Vec<Action>) {
    let id = node.id();
    let removable = node.internal().is_none();
    for (label, action, enabled) in [
        ("Cut", Action::Cut, removable),
        ("Copy", Action::Copy, removable),
        ("Paste", Action::Paste, node.adaptor().is_container()),
        ("Delete", Action::Delete, removable),
    ] {
        if ui.add_enabled(enabled, egui::Button::new(label)).clicked() {
            actions.push(Action::Select(id, false));
            actions.push(action);
            ui.close_kind(egui::UiKind::Menu);
        }
    }
    for action in &node.adaptor().actions {
        if ui.button(&action.label).clicked() {
            actions.push(Action::Edit(Edit::Action(id, action.id.clone())));
            ui.close_kind(egui::UiKind::Menu);
        }
    }
    if let Some(parent) = node.parent().and_then(|p| project.widget(p)) {
        packing_menu(ui, parent, node.object(), actions);
    }
}

fn packing_menu(ui: &mut egui::Ui, parent: &Widget, child: ObjectId, actions: &mut Vec<Action>) {
    let packing_actions = &parent.adaptor().packing_actions;
    if packing_actions.is_empty() {
        return;
    }
    ui.separator();
    for action in packing_actions {
        if ui.button(&action.label).clicked() {
            actions.push(Action::Edit(Edit::ChildAction(parent.id(), child, action.id.clone())));
            ui.close_kind(egui::UiKind::Menu);
        }
    }
}

fn placeholder_row(
    ui: &mut egui::Ui,
    parent: &Widget,
    object: ObjectId,
    target: Option<(WidgetId, ObjectId)>,
    actions: &mut Vec<Action>,
) {
    let selected = target == Some((parent.id(), object));
    let response = ui.selectable_label(selected, RichText::new("<placeholder>").italics().weak());
    if response.clicked() {
        actions.push(Action::Target(parent.id(), object));
    }
    response.context_menu(|ui| {
        if ui.button("Paste here").clicked() {
            actions.push(Action::Target(parent.id(), object));
            actions.push(Action::Paste);
            ui.close_kind(egui::UiKind::Menu);
        }
        packing_menu(ui, parent, object, actions);
    });
}

fn property_row(
    ui: &mut egui::Ui,
    project: &Project,
    widget: WidgetId,
    prop: &Property,
    actions: &mut Vec<Action>,
) {
    let def = prop.def();
    let label = if def.optional {
        let mut enabled = prop.enabled();
        let response = ui.checkbox(&mut enabled, &def.name);
        if response.changed() {
            actions.push(Action::Edit(Edit::Enable(widget, def.id.clone(), enabled)));
        }
        response
    } else {
        ui.label(&def.name)
    };
    if !def.tooltip.is_empty() {
        label.on_hover_text(&def.tooltip);
    }

    ui.horizontal(|ui| {
        let editable = prop.enabled() && prop.sensitive();
        let inner = ui.add_enabled_ui(editable, |ui| {
            value_editor(ui, project, Some(widget), def, prop.value())
        });
        if let Some(reason) = prop.insensitive_reason() {
            inner.response.on_disabled_hover_text(reason);
        }
        if let Some(value) = inner.inner {
            actions.push(Action::Edit(Edit::Set(widget, def.id.clone(), value)));
        }
        if def.translatable {
            ui.menu_button("i18n", |ui| i18n_editor(ui, widget, prop, actions));
        }
    });
}

fn i18n_editor(ui: &mut egui::Ui, widget: WidgetId, prop: &Property, actions: &mut Vec<Action>) {
    let current = prop.i18n();
    let mut i18n = current.clone();
    ui.checkbox(&mut i18n.translatable, "Translatable");
    let mut context = i18n.context.clone().unwrap_or_default();
    ui.label("Context");
    ui.text_edit_singleline(&mut context);
    let mut comment = i18n.comment.clone().unwrap_or_default();
    ui.label("Comment for translators");
    ui.text_edit_multiline(&mut comment);
    i18n.context = (!context.is_empty()).then_some(context);
    i18n.comment = (!comment.is_empty()).then_some(comment);
    if i18n != *current {
        actions.push(Action::Edit(Edit::I18n(widget, prop.def().id.clone(), i18n)));
    }
}

/// Draws an editor for `value`; returns the new value when the user changed
/// it. `owner` is excluded from object choices.
fn value_editor(
    ui: &mut egui::Ui,
    project: &Project,
    owner: Option<WidgetId>,
    def: &PropertyDef,
    value: &Value,
) -> Option<Value> {
    let salt = (owner, def.id.as_str());
    match value {
        Value::Bool(v) => {
            let mut v = *v;
            ui.checkbox(&mut v, "").changed().then_some(Value::Bool(v))
        }
        Value::Int(v) => {
            let mut v = *v;
            let mut drag = egui::DragValue::new(&mut v);
            if let (Some(min), Some(max)) = (def.minimum, def.maximum) {
                drag = drag.range(min..=max);
            }
            ui.add(drag).changed().then_some(Value::Int(v))
        }
        Value::Float(v) => {
            let mut v = *v;
            let mut drag = egui::DragValue::new(&mut v).speed(0.1);
            if let (Some(min), Some(max)) = (def.minimum, def.maximum) {
                drag = drag.range(min..=max);
            }
            ui.add(drag).changed().then_some(Value::Float(v))
        }
        Value::String(s) => {
            let mut s = s.clone();
            let changed = ui
                .add(egui::TextEdit::singleline(&mut s).id_salt(salt).desired_width(180.0))
                .changed();
            changed.then_some(Value::String(s))
        }
        Value::Unichar(c) => {
            let mut s = c.to_string();
            let changed = ui
                .add(egui::TextEdit::singleline(&mut s).id_salt(salt).char_limit(1).desired_width(24.0))
                .changed();
            if changed { s.chars().next().map(Value::Unichar) } else { None }
        }
        Value::Enum(current) => {
            let mut picked = None;
            let selected = def
                .enum_values
                .iter()
                .find(|e| e.value == *current)
                .map_or_else(|| current.to_string(), |e| e.name.clone());
            egui::ComboBox::from_id_salt(salt)
                .selected_text(selected)
                .show_ui(ui, |ui| {
                    for entry in &def.enum_values {
                        if ui.selectable_label(entry.value == *current, &entry.name).clicked() {
                            picked = Some(Value::Enum(entry.value));
                        }
                    }
                });
            picked.filter(|v| v != value)
        }
        Value::Flags(bits) => {
            let mut bits_out = *bits;
            ui.vertical(|ui| {
                for entry in &def.enum_values {
                    let mut on = bits_out & entry.value != 0;
                    if ui.checkbox(&mut on, &entry.name).changed() {
                        bits_out ^= entry.value;
                    }
                }
            });
            (bits_out != *bits).then_some(Value::Flags(bits_out))
        }
        Value::Object(current) => {
            let types = project.registry().types();
            let wanted = def.object_type.as_deref().and_then(|t| types.lookup(t));
            let candidates: Vec<&Widget> = project
                .widgets()
                .into_iter()
                .filter(|w| Some(*w) != owner)
                .filter_map(|w| project.widget(w))
                .filter(|w| wanted.is_none_or(|k| types.is_a(w.adaptor().type_key, k)))
                .collect();
            let selected = current
                .and_then(|o| project.object_name(o))
                .unwrap_or_else(|| "(none)".to_string());
            let mut picked = None;
            egui::ComboBox::from_id_salt(salt)
                .selected_text(selected)
                .show_ui(ui, |ui| {
                    if ui.selectable_label(current.is_none(), "(none)").clicked() {
                        picked = Some(Value::Object(None));
                    }
                    for w in candidates {
                        let is_current = *current == Some(w.object());
                        if ui.selectable_label(is_current, w.name()).clicked() {
                            picked = Some(Value::Object(Some(w.object())));
                        }
                    }
                });
            picked.filter(|v| v != value)
        }
    }
}

//! Syntax highlighting for the document preview using syntect.

use egui::Color32;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Cached syntax highlighting resources.
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    theme_name: String,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter {
    pub fn new() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            theme_name: DEFAULT_THEME.to_string(),
        }
    }

    pub fn theme_name(&self) -> &str {
        &self.theme_name
    }

    pub fn theme_names(&self) -> impl Iterator<Item = &str> {
        self.theme_set.themes.keys().map(String::as_str)
    }

    /// Unknown names are ignored and the current theme is kept.
    pub fn set_theme(&mut self, name: &str) -> bool {
        if !self.theme_set.themes.contains_key(name) {
            log::warn!("unknown highlighting theme `{name}`");
            return false;
        }
        self.theme_name = name.to_string();
        true
    }

    fn theme(&self) -> Option<&Theme> {
        self.theme_set
            .themes
            .get(&self.theme_name)
            .or_else(|| self.theme_set.themes.values().next())
    }

    /// Highlight a JSON document and return a list of (text, color) spans.
    pub fn highlight_json(&self, text: &str) -> Vec<(String, Color32)> {
        let syntax = self
            .syntax_set
            .find_syntax_by_extension("json")
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());
        let Some(theme) = self.theme() else {
            return vec![(text.to_string(), Color32::LIGHT_GRAY)];
        };

        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut result = Vec::new();
        for line in LinesWithEndings::from(text) {
            match highlighter.highlight_line(line, &self.syntax_set) {
                Ok(ranges) => {
                    for (style, text) in ranges {
                        result.push((text.to_string(), style_to_color32(style)));
                    }
                }
                Err(err) => {
                    log::trace!("highlighting failed: {err}");
                    result.push((line.to_string(), Color32::LIGHT_GRAY));
                }
            }
        }
        result
    }

    /// Render highlighted text as a LayoutJob for egui.
    pub fn layout_job(&self, text: &str) -> egui::text::LayoutJob {
        let mut job = egui::text::LayoutJob::default();
        for (text, color) in self.highlight_json(text) {
            job.append(
                &text,
                0.0,
                egui::TextFormat {
                    font_id: egui::FontId::monospace(12.0),
                    color,
                    ..Default::default()
                },
            );
        }
        job
    }
}

fn style_to_color32(style: Style) -> Color32 {
    Color32::from_rgb(style.foreground.r, style.foreground.g, style.foreground.b)
}

/// Read-only viewer for a job built by [`Highlighter::layout_job`].
pub fn code_viewer(ui: &mut egui::Ui, job: egui::text::LayoutJob) {
    egui::ScrollArea::both()
        .id_salt("document_preview_scroll")
        .auto_shrink([false, false])
        .show(ui, |ui| {
            ui.add(egui::Label::new(job).selectable(true));
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_json() {
        let highlighter = Highlighter::new();
        let spans = highlighter.highlight_json("{\n  \"class\": \"Window\",\n  \"id\": 1\n}\n");
        assert!(spans.len() > 1);
        let text: String = spans.iter().map(|(t, _)| t.as_str()).collect();
        assert!(text.contains("\"Window\""));
    }

    #[test]
    fn test_set_theme() {
        let mut highlighter = Highlighter::new();
        assert!(!highlighter.set_theme("no-such-theme"));
        assert_eq!(highlighter.theme_name(), DEFAULT_THEME);
        let other = highlighter
            .theme_names()
            .find(|n| *n != DEFAULT_THEME)
            .unwrap()
            .to_string();
        assert!(highlighter.set_theme(&other));
        assert_eq!(highlighter.theme_name(), other);
    }

    #[test]
    fn test_layout_job() {
        let highlighter = Highlighter::new();
        let job = highlighter.layout_job("[]");
        assert_eq!(job.text, "[]");
    }
}

//! A visual designer for retained-mode widget trees, with full undo/redo.

mod adaptor;
mod app;
mod catalog;
mod clipboard;
mod command;
mod config;
mod document;
mod error;
mod highlight;
mod naming;
mod observer;
mod project;
mod registry;
mod toolkit;
mod value;
mod widget;
mod workspace;

use crate::app::{DesignerApp, Layout};
use crate::config::{Preferences, keys};
use crate::workspace::Workspace;
use clap::Parser;
use eframe::egui;
use std::path::PathBuf;
use std::sync::Arc;

/// rad-designer - compose widget trees and save them as declarative documents
#[derive(Parser, Debug)]
#[command(name = "rad-designer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,

    /// Extra widget catalog to load after the builtin one (repeatable)
    #[arg(short = 'c', long = "catalog", value_name = "PATH")]
    catalogs: Vec<PathBuf>,

    /// Project file to open at startup
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,
}

fn main() -> eframe::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG overrides --debug.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
    log::info!("starting rad-designer v{}", env!("CARGO_PKG_VERSION"));

    let preferences = Preferences::load();
    let mut catalogs = preferences.catalog_paths();
    catalogs.extend(cli.catalogs);

    let registry = match workspace::build_registry(&catalogs) {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            log::error!("widget catalogs are unusable: {err}");
            std::process::exit(1);
        }
    };

    let layout: Layout = preferences.get_json(keys::LAYOUT).unwrap_or_default();
    let size = layout.inner_size.unwrap_or(egui::vec2(1280.0, 800.0));
    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport = egui::ViewportBuilder::default()
        .with_inner_size(size)
        .with_min_inner_size(egui::vec2(800.0, 500.0))
        .with_resizable(true);

    let workspace = Workspace::new(registry, preferences);
    let file = cli.file;
    eframe::run_native(
        "rad-designer",
        native_options,
        Box::new(move |_cc| Ok(Box::new(DesignerApp::new(workspace, file)))),
    )
}

//! Error types for every layer of the designer.

use crate::toolkit::ObjectId;
use crate::value::ValueType;
use crate::widget::WidgetId;
use thiserror::Error;

/// Class registration and catalog problems. These are configuration bugs and
/// abort startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("an adaptor for `{0}` is already registered")]
    AlreadyRegistered(String),

    #[error("cannot register `{name}`: an adaptor for derived type `{derived}` already exists")]
    DerivedAdaptorExists { name: String, derived: String },

    #[error("unknown toolkit type `{0}`")]
    UnknownType(String),

    #[error("class `{class}` refers to unknown operation bundle `{symbol}`")]
    UnknownOps { class: String, symbol: String },

    #[error("class `{class}` defines property `{id}` more than once")]
    DuplicateProperty { class: String, id: String },

    #[error("class `{class}` overrides unknown property `{id}`")]
    UnknownProperty { class: String, id: String },

    #[error("class `{class}`: invalid default `{value}` for `{id}`")]
    BadDefault {
        class: String,
        id: String,
        value: String,
    },

    #[error("virtual property `{id}` of `{class}` has no value type")]
    MissingType { class: String, id: String },

    #[error("catalog `{catalog}` depends on `{dependency}`, which is not loaded")]
    MissingDependency { catalog: String, dependency: String },

    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("toolkit type system: {0}")]
    Toolkit(#[from] ToolkitError),
}

/// Failures reported by the toolkit binding itself.
#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("no such object {0}")]
    UnknownObject(ObjectId),

    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("type `{0}` is registered twice")]
    DuplicateType(String),

    #[error("type `{0}` is abstract")]
    Abstract(String),

    #[error("`{type_name}` has no property `{property}`")]
    UnknownProperty { type_name: String, property: String },

    #[error("property `{property}` expects {expected}, got {found}")]
    TypeMismatch {
        property: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("property `{0}` can only be set at construction")]
    ConstructOnly(String),

    #[error("`{0}` is not a container")]
    NotAContainer(String),

    #[error("object {child} is not a child of {container}")]
    NotAChild { container: ObjectId, child: ObjectId },

    #[error("object {0} already has a parent")]
    AlreadyParented(ObjectId),

    #[error("`{0}` can only hold one child")]
    SlotOccupied(String),

    #[error("`{class}` does not implement `{op}`")]
    Unsupported { class: String, op: &'static str },
}

/// Property lookups and assignments on live widgets.
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("no widget with id {0}")]
    UnknownWidget(WidgetId),

    #[error("widget `{widget}` has no property `{property}`")]
    NotFound { widget: String, property: String },

    #[error("property `{property}` expects {expected}, got {found}")]
    TypeMismatch {
        property: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("value rejected for `{property}`")]
    Rejected { property: String },

    #[error("cannot parse `{value}` as a value for `{property}`")]
    Parse { property: String, value: String },

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),
}

/// Widget creation failures.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("creation was cancelled")]
    Cancelled,

    #[error("no adaptor for class `{0}`")]
    UnknownClass(String),

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),

    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// User-facing failures from the command layer. The model is left untouched
/// when one of these is returned.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no widget with id {0}")]
    UnknownWidget(WidgetId),

    #[error("nothing is selected")]
    NothingSelected,

    #[error("the clipboard is empty")]
    NothingToPaste,

    #[error("`{child}` cannot be placed in `{parent}`")]
    IncompatibleParent { child: String, parent: String },

    #[error("not enough placeholders in `{0}`")]
    InsufficientPlaceholders(String),

    #[error("only one widget can be pasted into `{0}`")]
    MultipleIntoSingleSlot(String),

    #[error("`{0}` is an internal child and cannot be removed or copied")]
    InternalChild(String),

    #[error("the name `{0}` is already in use")]
    NameTaken(String),

    #[error("`{class}` has no action `{action}`")]
    UnknownAction { class: String, action: String },

    #[error("a command cannot be recorded while another is being applied")]
    Reentrant,

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Create(#[from] CreateError),

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),
}

/// Loading and saving project documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported document format `{format}` version {version}")]
    UnsupportedFormat { format: String, version: u32 },

    #[error("document requires catalog `{0}`, which is not loaded")]
    MissingCatalog(String),

    #[error(transparent)]
    Create(#[from] CreateError),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),
}

/// Preferences storage.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a configuration directory")]
    NoConfigDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed preferences: {0}")]
    Json(#[from] serde_json::Error),
}

use serde::{Deserialize, Serialize};

/// A handler connected to one signal of a widget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub handler: String,
    /// Name of the widget passed as user data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub after: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub swapped: bool,
}

impl Signal {
    pub fn new(name: &str, handler: &str) -> Self {
        Self {
            name: name.to_string(),
            handler: handler.to_string(),
            object: None,
            after: false,
            swapped: false,
        }
    }
}

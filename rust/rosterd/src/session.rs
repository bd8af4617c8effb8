use serde::{Deserialize, Serialize};

use crate::roster::ClassId;

/// Signed-in user as reported by the UI. Authentication happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub name: String,
    #[serde(default)]
    pub form_class: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
}

impl CurrentUser {
    /// The form class if set, otherwise the first class taught.
    pub fn class_level(&self) -> Option<ClassId> {
        self.form_class
            .as_deref()
            .and_then(ClassId::parse)
            .or_else(|| self.classes.first().and_then(|c| ClassId::parse(c)))
    }
}

//! Import blueprints.

use serde::{Deserialize, Serialize};

use super::view::View;

/// Server-facing description of the schema a file import should produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Number of leading (header) rows to skip.
    pub skip: u32,
    pub columns: Vec<BlueprintColumn>,
}

/// One column of a [`Blueprint`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlueprintColumn {
    pub name: String,
    pub description: Option<String>,
    pub datatype: String,
}

impl Blueprint {
    /// Build a blueprint from `view`'s name, description and columns, in order.
    pub fn from_view(view: &View, skip: u32) -> Self {
        Self {
            name: view.name.clone(),
            description: view.description.clone(),
            skip,
            columns: view
                .columns
                .iter()
                .map(|c| BlueprintColumn {
                    name: c.name.clone(),
                    description: c.description.clone(),
                    datatype: c.data_type_name.clone(),
                })
                .collect(),
        }
    }
}

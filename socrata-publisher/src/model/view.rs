//! Views: datasets, filtered views and their metadata.
//!
//! A [`View`] owns its columns. Operations that need to know which view a
//! column belongs to take the view explicitly and check membership.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::ops::Deref;

use super::blueprint::Blueprint;
use super::column::Column;
use crate::error::{Result, SocrataError};
use crate::strings::underscoreize;

/// Field names the service reserves for row metadata.
pub const RESERVED_FIELD_NAMES: [&str; 4] = ["_id", "_uuid", "_position", "_address"];

/// Key of the custom-field container inside `metadata` / `privateMetadata`.
pub const CUSTOM_FIELDS_ID: &str = "custom_fields";

/// A dataset or view on the service.
///
/// Unknown fields in a server response are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_updated_at: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flags: BTreeSet<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rights: BTreeSet<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_identifier_column_id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<Column>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl View {
    /// A new, not yet created dataset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// The view's id, or a precondition error if it has not been created yet.
    pub fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| SocrataError::precondition("the view has not been created yet"))
    }

    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    pub fn column_by_id(&self, id: i64) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Look a column up by its derived field name (its "API identifier").
    pub fn column_by_field_name(&self, field_name: &str) -> Option<&Column> {
        (0..self.columns.len())
            .find(|&index| self.field_name_at(index) == field_name)
            .map(|index| &self.columns[index])
    }

    /// Position of `column` in `columns`: the same instance, or a persisted
    /// column with the same id.
    pub fn index_of(&self, column: &Column) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| std::ptr::eq(c, column))
            .or_else(|| {
                if column.is_persisted() {
                    self.columns.iter().position(|c| c.id == column.id)
                } else {
                    None
                }
            })
    }

    pub fn contains_column(&self, column: &Column) -> bool {
        self.index_of(column).is_some()
    }

    /// Derive the stable external identifier of `column` within this view.
    ///
    /// Computed on every call: renaming or repositioning columns changes the
    /// result. Fails if `column` is not one of this view's columns.
    pub fn field_name(&self, column: &Column) -> Result<String> {
        let index = self.index_of(column).ok_or_else(|| {
            SocrataError::precondition(format!(
                "column '{}' does not belong to this view",
                column.name
            ))
        })?;
        Ok(self.field_name_at(index))
    }

    /// Derived field names of every column, in column order.
    pub fn field_names(&self) -> Vec<String> {
        (0..self.columns.len())
            .map(|index| self.field_name_at(index))
            .collect()
    }

    // A name is suffixed with `_<position>` when it is reserved or when an
    // earlier column (lower position, then lower index) normalizes the same.
    fn field_name_at(&self, index: usize) -> String {
        let column = &self.columns[index];
        let base = underscoreize(&column.name);

        let reserved = RESERVED_FIELD_NAMES.contains(&base.as_str());
        let shadowed = self.columns.iter().enumerate().any(|(i, other)| {
            (other.position, i) < (column.position, index) && underscoreize(&other.name) == base
        });

        if reserved || shadowed {
            format!("{}_{}", base, column.position)
        } else {
            base
        }
    }

    pub fn row_identifier_column(&self) -> Option<&Column> {
        self.row_identifier_column_id
            .and_then(|id| self.column_by_id(id))
    }

    /// Use `column` as the row identifier. It must be a persisted column of this view.
    pub fn set_row_identifier_column(&mut self, column: &Column) -> Result<()> {
        if !self.contains_column(column) {
            return Err(SocrataError::precondition(format!(
                "column '{}' is not a part of this view",
                column.name
            )));
        }
        if !column.is_persisted() {
            return Err(SocrataError::precondition(format!(
                "column '{}' has not been created yet",
                column.name
            )));
        }
        self.row_identifier_column_id = Some(column.id);
        Ok(())
    }

    /// Describe this view's schema for a file import.
    pub fn blueprint(&self) -> Blueprint {
        Blueprint::from_view(self, 0)
    }

    fn metadata_container(&self, public: bool) -> Option<&Map<String, Value>> {
        if public {
            self.metadata.as_ref()
        } else {
            self.private_metadata.as_ref()
        }
    }

    /// The `custom_fields` container of the public or private metadata.
    pub fn custom_metadata_fields(&self, public: bool) -> Option<&Map<String, Value>> {
        self.metadata_container(public)?
            .get(CUSTOM_FIELDS_ID)?
            .as_object()
    }

    /// Read a custom metadata field.
    pub fn custom_field_value(&self, fieldset: &str, field: &str, public: bool) -> Option<&str> {
        self.custom_metadata_fields(public)?
            .get(fieldset)?
            .get(field)?
            .as_str()
    }

    /// Set a custom metadata field, creating the containers along the way.
    ///
    /// Fails if an existing container on the path is not a JSON object.
    pub fn set_custom_metadata_field(
        &mut self,
        fieldset: &str,
        field: &str,
        value: impl Into<String>,
        public: bool,
    ) -> Result<()> {
        let target = if public {
            self.metadata.get_or_insert_with(Map::new)
        } else {
            self.private_metadata.get_or_insert_with(Map::new)
        };
        let fieldset = deep_object(target, &[CUSTOM_FIELDS_ID, fieldset])?;
        fieldset.insert(field.to_string(), Value::String(value.into()));
        Ok(())
    }
}

fn deep_object<'a>(
    mut container: &'a mut Map<String, Value>,
    keys: &[&str],
) -> Result<&'a mut Map<String, Value>> {
    for key in keys {
        container = container
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| {
                SocrataError::precondition(format!("metadata entry '{}' is not an object", key))
            })?;
    }
    Ok(container)
}

/// Temporarily replaces a view's columns, restoring the originals on drop.
///
/// Restoration happens on every exit path, including early returns and
/// panics while the guard is alive.
pub(crate) struct ColumnSwap<'a> {
    view: &'a mut View,
    original: Option<Vec<Column>>,
}

impl<'a> ColumnSwap<'a> {
    pub(crate) fn new(view: &'a mut View, columns: Vec<Column>) -> Self {
        let original = std::mem::replace(&mut view.columns, columns);
        Self {
            view,
            original: Some(original),
        }
    }
}

impl Deref for ColumnSwap<'_> {
    type Target = View;

    fn deref(&self) -> &View {
        self.view
    }
}

impl Drop for ColumnSwap<'_> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            self.view.columns = original;
        }
    }
}

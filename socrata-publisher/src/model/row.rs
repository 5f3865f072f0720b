//! Rows and their mapping onto columns.
//!
//! Row data is always keyed by numeric column id in memory. The wire shapes
//! are produced at the boundary:
//! - bulk/update shape: `{"<id>": value}`
//! - new-row shape: `{":<id>": value}`, which tells the service to insert
//! - by-identifier shape (read only): keys are derived field names

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::column::Column;
use super::view::View;
use crate::error::{Result, SocrataError};

/// Prefix marking a key of the new-row shape.
pub const NEW_ROW_PREFIX: char = ':';

/// A row of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Server row id; 0 until the row has been created.
    pub sid: i64,
    pub uuid: Option<String>,
    pub position: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    data: BTreeMap<i64, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of `column`, which must be a persisted column of `view`.
    pub fn put_field(&mut self, view: &View, column: &Column, value: impl Into<Value>) -> Result<()> {
        if !view.contains_column(column) {
            return Err(SocrataError::precondition(format!(
                "column '{}' does not belong to the row's view",
                column.name
            )));
        }
        if !column.is_persisted() {
            return Err(SocrataError::precondition(format!(
                "column '{}' has not been created yet",
                column.name
            )));
        }
        self.data.insert(column.id, value.into());
        Ok(())
    }

    /// Set a value by raw column id, without checking it against a view.
    pub fn put_field_by_id(&mut self, column_id: i64, value: impl Into<Value>) {
        self.data.insert(column_id, value.into());
    }

    pub fn get_field(&self, column: &Column) -> Option<&Value> {
        self.data.get(&column.id)
    }

    /// The id-keyed data store.
    pub fn data(&self) -> &BTreeMap<i64, Value> {
        &self.data
    }

    /// Every stored value paired with its column in `view`.
    ///
    /// Ids with no matching column are skipped.
    pub fn fields<'v>(&self, view: &'v View) -> Vec<(&'v Column, &Value)> {
        self.data
            .iter()
            .filter_map(|(id, value)| view.column_by_id(*id).map(|c| (c, value)))
            .collect()
    }

    /// Bulk/update shape: column id as a decimal string.
    pub fn to_bulk_json(&self) -> Map<String, Value> {
        self.data
            .iter()
            .map(|(id, value)| (id.to_string(), value.clone()))
            .collect()
    }

    /// New-row shape: `:` followed by the column id.
    pub fn to_new_row_json(&self) -> Map<String, Value> {
        self.data
            .iter()
            .map(|(id, value)| (format!("{}{}", NEW_ROW_PREFIX, id), value.clone()))
            .collect()
    }

    /// Serializable view of this row in the new-row shape.
    pub fn as_new_row(&self) -> NewRow<'_> {
        NewRow(self)
    }

    /// Decode the bulk shape. Integer keys become data; `sid`, `id`,
    /// `position`, `createdAt` and `updatedAt` fill the metadata; anything
    /// else is ignored.
    pub fn from_bulk_json(map: Map<String, Value>) -> Self {
        let mut row = Row::new();
        for (key, value) in map {
            match key.as_str() {
                "sid" => row.sid = value.as_i64().unwrap_or_default(),
                "id" => row.uuid = value.as_str().map(str::to_string),
                "position" => row.position = value.as_i64().unwrap_or_default(),
                "createdAt" => row.created_at = timestamp(&value),
                "updatedAt" => row.updated_at = timestamp(&value),
                _ => {
                    if let Ok(column_id) = key.parse::<i64>() {
                        row.data.insert(column_id, value);
                    }
                }
            }
        }
        row
    }

    /// Decode a single row fetched by identifier, whose keys are field names.
    ///
    /// `_id`, `_uuid` and `_position` fill the metadata and `_address` is
    /// ignored. Keys matching no column of `view` are dropped.
    pub fn from_identifier_json(view: &View, map: Map<String, Value>) -> Self {
        let field_names = view.field_names();
        let mut row = Row::new();
        for (key, value) in map {
            match key.as_str() {
                "_id" => row.sid = value.as_i64().unwrap_or_default(),
                "_uuid" => row.uuid = value.as_str().map(str::to_string),
                "_position" => row.position = value.as_i64().unwrap_or_default(),
                "_address" => {}
                _ => match field_names.iter().position(|name| *name == key) {
                    Some(index) => {
                        row.data.insert(view.columns[index].id, value);
                    }
                    None => debug!(field = %key, "Dropping row field with no matching column"),
                },
            }
        }
        row
    }
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// The bulk shape, plus `sid` once the server has assigned one.
impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let saved = self.sid != 0;
        let mut map = serializer.serialize_map(Some(self.data.len() + usize::from(saved)))?;
        if saved {
            map.serialize_entry("sid", &self.sid)?;
        }
        for (id, value) in &self.data {
            map.serialize_entry(&id.to_string(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Row::from_bulk_json(map))
    }
}

/// A row serialized in the new-row (insert) shape.
#[derive(Debug, Clone, Copy)]
pub struct NewRow<'a>(pub &'a Row);

impl Serialize for NewRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.data.len()))?;
        for (id, value) in &self.0.data {
            map.serialize_entry(&format!("{}{}", NEW_ROW_PREFIX, id), value)?;
        }
        map.end()
    }
}

/// Build new rows from string records whose header holds field names.
///
/// Header entries that match no column are skipped with a warning, as are
/// record values beyond the end of the header.
pub fn rows_from_records<R, S>(view: &View, header: &[S], records: R) -> Vec<Row>
where
    R: IntoIterator,
    R::Item: AsRef<[String]>,
    S: AsRef<str>,
{
    let targets: Vec<Option<i64>> = header
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let target = view.column_by_field_name(name).map(|c| c.id);
            if target.is_none() {
                warn!(identifier = %name, "Could not find column matching identifier");
            }
            target
        })
        .collect();

    records
        .into_iter()
        .map(|record| {
            let mut row = Row::new();
            for (value, target) in record.as_ref().iter().zip(&targets) {
                if let Some(id) = target {
                    row.put_field_by_id(*id, value.clone());
                }
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn view() -> View {
        let mut view = View::new("Inspections");
        view.id = Some("abcd-1234".into());
        for (id, name, position) in [(11, "Name", 1), (12, "Score", 2), (13, "name", 3)] {
            view.add_column(Column {
                id,
                position,
                ..Column::new(name, "text")
            });
        }
        view
    }

    #[test]
    fn test_put_and_get_field() {
        let view = view();
        let mut row = Row::new();
        row.put_field(&view, &view.columns[1], 97).unwrap();
        assert_eq!(row.get_field(&view.columns[1]), Some(&json!(97)));
        assert_eq!(row.get_field(&view.columns[0]), None);
    }

    #[test]
    fn test_put_field_rejects_foreign_or_unsaved_column() {
        let view = view();
        let mut row = Row::new();

        let foreign = Column {
            id: 99,
            ..Column::new("Other", "text")
        };
        assert!(matches!(
            row.put_field(&view, &foreign, "x"),
            Err(SocrataError::Precondition { .. })
        ));

        let mut draft = view.clone();
        draft.add_column(Column::new("Draft", "text"));
        let unsaved = draft.columns.last().unwrap();
        assert!(row.put_field(&draft, unsaved, "x").is_err());
        assert!(row.data().is_empty());
    }

    #[test]
    fn test_bulk_and_new_row_shapes() {
        let view = view();
        let mut row = Row::new();
        row.put_field(&view, &view.columns[0], "Joe's Diner").unwrap();
        row.put_field(&view, &view.columns[1], 88).unwrap();

        assert_eq!(
            Value::Object(row.to_bulk_json()),
            json!({"11": "Joe's Diner", "12": 88})
        );
        assert_eq!(
            Value::Object(row.to_new_row_json()),
            json!({":11": "Joe's Diner", ":12": 88})
        );
        assert_eq!(serde_json::to_value(&row).unwrap(), json!({"11": "Joe's Diner", "12": 88}));
        assert_eq!(
            serde_json::to_value(row.as_new_row()).unwrap(),
            json!({":11": "Joe's Diner", ":12": 88})
        );
    }

    #[test]
    fn test_saved_row_serializes_its_sid() {
        let view = view();
        let mut row = Row::new();
        row.sid = 42;
        row.put_field(&view, &view.columns[1], 88).unwrap();

        assert_eq!(serde_json::to_value(&row).unwrap(), json!({"sid": 42, "12": 88}));
        // The bulk and new-row shapes carry data only.
        assert_eq!(Value::Object(row.to_bulk_json()), json!({"12": 88}));
        assert_eq!(serde_json::to_value(row.as_new_row()).unwrap(), json!({":12": 88}));

        let decoded: Row = serde_json::from_value(serde_json::to_value(&row).unwrap()).unwrap();
        assert_eq!(decoded.sid, 42);
        assert_eq!(decoded.data(), row.data());
    }

    #[test]
    fn test_from_bulk_json_reads_metadata_and_data() {
        let row: Row = serde_json::from_value(json!({
            "sid": 42,
            "id": "8B2F-11AA",
            "position": 3,
            "createdAt": 1335900000,
            "updatedAt": 1335990000,
            "meta": "ignored",
            "11": "Joe's Diner",
            "12": null
        }))
        .unwrap();
        assert_eq!(row.sid, 42);
        assert_eq!(row.uuid.as_deref(), Some("8B2F-11AA"));
        assert_eq!(row.position, 3);
        assert_eq!(row.created_at.unwrap().timestamp(), 1335900000);
        assert_eq!(row.data().len(), 2);
        assert_eq!(row.data()[&12], Value::Null);
    }

    #[test]
    fn test_from_identifier_json_maps_field_names() {
        let view = view();
        let map = json!({
            "_id": 7,
            "_uuid": "AAAA-0001",
            "_position": 2,
            "_address": "ignored",
            "name": "Joe's Diner",
            "name_3": "duplicate",
            "score": 91,
            "unknown_field": true
        });
        let row = Row::from_identifier_json(&view, map.as_object().unwrap().clone());
        assert_eq!(row.sid, 7);
        assert_eq!(row.uuid.as_deref(), Some("AAAA-0001"));
        assert_eq!(row.position, 2);
        assert_eq!(row.data().len(), 3);
        assert_eq!(row.data()[&11], json!("Joe's Diner"));
        assert_eq!(row.data()[&12], json!(91));
        assert_eq!(row.data()[&13], json!("duplicate"));
    }

    #[test]
    fn test_fields_resolves_columns() {
        let view = view();
        let mut row = Row::new();
        row.put_field_by_id(12, 50);
        row.put_field_by_id(404, "orphan");
        let fields = row.fields(&view);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].0.name, "Score");
    }

    #[test]
    fn test_rows_from_records_skips_unmatched_headers() {
        let view = view();
        let header = ["name", "nonexistent", "score"];
        let records = vec![
            vec!["Joe's Diner".to_string(), "x".to_string(), "88".to_string()],
            vec!["Cafe Rio".to_string()],
        ];
        let rows = rows_from_records(&view, &header, &records);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            Value::Object(rows[0].to_new_row_json()),
            json!({":11": "Joe's Diner", ":12": "88"})
        );
        assert_eq!(Value::Object(rows[1].to_new_row_json()), json!({":11": "Cafe Rio"}));
    }
}

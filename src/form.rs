//! Posted form payload.
//!
//! `FormData` wraps the decoded request body as nested JSON:
//!
//! ```text
//! {
//!   "Invoice":     { "customer": "ACME" },
//!   "InvoiceLine": { "0": { "id": 5, "sku": "A" }, "1": { "sku": "B" } }
//! }
//! ```
//!
//! Decoding `InvoiceLine[0][sku]=A` style request bodies into this shape is the
//! web framework's job; the binder only reads the result.

use crate::executor::TabularError;
use serde_json::{Map, Value as JsonValue};

/// One posted row of a tabular section
#[derive(Debug, Clone, PartialEq)]
pub struct FormRow<'a> {
    /// Submission index (`"0"`, `"1"`, ... or whatever keys the form used)
    pub index: String,
    pub fields: &'a Map<String, JsonValue>,
}

/// Decoded form submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    sections: Map<String, JsonValue>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a decoded payload, which must be a JSON object
    pub fn from_json(value: JsonValue) -> Result<Self, TabularError> {
        match value {
            JsonValue::Object(sections) => Ok(Self { sections }),
            other => Err(TabularError::InvalidFormData(format!(
                "form payload must be an object, got {}",
                crate::active_model::traits::json_kind(&other)
            ))),
        }
    }

    /// Add or replace a section
    #[must_use]
    pub fn with_section(mut self, key: &str, value: JsonValue) -> Self {
        self.sections.insert(key.to_string(), value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sections.contains_key(key)
    }

    pub fn section(&self, key: &str) -> Option<&JsonValue> {
        self.sections.get(key)
    }

    /// Fields posted for a single model, `None` when the section is absent
    pub fn fields(&self, key: &str) -> Result<Option<&Map<String, JsonValue>>, TabularError> {
        match self.sections.get(key) {
            None => Ok(None),
            Some(JsonValue::Object(fields)) => Ok(Some(fields)),
            Some(other) => Err(TabularError::InvalidFormData(format!(
                "section {key} must be an object, got {}",
                crate::active_model::traits::json_kind(other)
            ))),
        }
    }

    /// Rows posted under a tabular section, in submission order
    ///
    /// Object sections yield their keys as indices; array sections yield their
    /// positions. An empty string section (what browsers send when every row was
    /// removed) yields no rows. `None` when the section is absent.
    pub fn rows<'a>(&'a self, key: &str) -> Result<Option<Vec<FormRow<'a>>>, TabularError> {
        let Some(section) = self.sections.get(key) else {
            return Ok(None);
        };

        let rows = match section {
            JsonValue::Object(rows) => rows
                .iter()
                .map(|(index, row)| {
                    row_fields(key, index, row).map(|fields| FormRow {
                        index: index.clone(),
                        fields,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            JsonValue::Array(rows) => rows
                .iter()
                .enumerate()
                .map(|(position, row)| {
                    let index = position.to_string();
                    row_fields(key, &index, row).map(|fields| FormRow { index, fields })
                })
                .collect::<Result<Vec<_>, _>>()?,
            JsonValue::Null => Vec::new(),
            JsonValue::String(raw) if raw.is_empty() => Vec::new(),
            other => {
                return Err(TabularError::InvalidFormData(format!(
                    "section {key} must be an object or array of rows, got {}",
                    crate::active_model::traits::json_kind(other)
                )))
            }
        };

        Ok(Some(rows))
    }
}

impl TryFrom<JsonValue> for FormData {
    type Error = TabularError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

fn row_fields<'a>(
    key: &str,
    index: &str,
    row: &'a JsonValue,
) -> Result<&'a Map<String, JsonValue>, TabularError> {
    match row {
        JsonValue::Object(fields) => Ok(fields),
        other => Err(TabularError::InvalidFormData(format!(
            "row {key}[{index}] must be an object, got {}",
            crate::active_model::traits::json_kind(other)
        ))),
    }
}

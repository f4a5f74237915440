//! Core traits for ActiveModel operations.
//!
//! This module provides `ActiveModelTrait` for the attribute-level operations the
//! tabular binder needs (primary key access, form binding, validation) and
//! `ActiveModelBehavior` for persistence lifecycle hooks.
//!
//! Attribute access is reflective over the model's serde representation, so a
//! plain `#[derive(Serialize, Deserialize)]` struct only needs to name its key
//! type to take part in tabular binding.

use super::error::ActiveModelError;
use crate::json_helpers::{coerce_form_value, form_value_candidates, parse_key};
use crate::validation::ValidationErrors;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt::Debug;
use std::hash::Hash;

/// Trait for ActiveModel operations
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tabular::{ActiveModelTrait, ValidationErrors};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct InvoiceLine {
///     id: Option<i64>,
///     invoice_id: Option<i64>,
///     sku: String,
///     quantity: i64,
/// }
///
/// impl ActiveModelTrait for InvoiceLine {
///     type Id = i64;
///
///     fn validate(&self, _attributes: Option<&[&str]>) -> ValidationErrors {
///         let mut errors = ValidationErrors::new();
///         if self.sku.is_empty() {
///             errors.add("sku", "Sku cannot be blank.");
///         }
///         errors
///     }
/// }
///
/// assert_eq!(InvoiceLine::form_name(), "InvoiceLine");
/// ```
pub trait ActiveModelTrait: Clone + Debug + Serialize + DeserializeOwned + 'static {
    /// Primary key type
    type Id: Clone + Debug + Eq + Ord + Hash + Serialize + DeserializeOwned;

    /// Key under which this model's rows are posted
    ///
    /// Defaults to the type's short name, so `app::models::InvoiceLine` posts
    /// under `"InvoiceLine"`.
    fn form_name() -> String {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base).to_string()
    }

    /// Name of the primary key attribute
    fn primary_key_attribute() -> &'static str {
        "id"
    }

    /// Attributes that may be bound from posted data, `None` for all
    ///
    /// The primary key is never bound regardless of this list.
    fn safe_attributes() -> Option<&'static [&'static str]> {
        None
    }

    /// Current primary key value, `None` for a record that was never saved
    fn primary_key(&self) -> Option<Self::Id> {
        self.attribute(Self::primary_key_attribute())
            .ok()
            .flatten()
            .and_then(|value| parse_key::<Self::Id>(&value))
    }

    /// Serialize the model into its JSON object form
    fn to_json(&self) -> Result<Map<String, JsonValue>, ActiveModelError> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map),
            other => Err(ActiveModelError::Serialization(format!(
                "model must serialize to an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Rebuild the model from its JSON object form
    fn from_json(map: Map<String, JsonValue>) -> Result<Self, ActiveModelError>
    where
        Self: Sized,
    {
        Ok(serde_json::from_value(JsonValue::Object(map))?)
    }

    /// Read an attribute, `None` when the model has no such attribute
    fn attribute(&self, name: &str) -> Result<Option<JsonValue>, ActiveModelError> {
        Ok(self.to_json()?.remove(name))
    }

    /// Overwrite a single attribute
    fn set_attribute(&mut self, name: &str, value: JsonValue) -> Result<(), ActiveModelError>
    where
        Self: Sized,
    {
        let mut map = self.to_json()?;
        if !map.contains_key(name) {
            return Err(ActiveModelError::AttributeNotFound(name.to_string()));
        }
        map.insert(name.to_string(), value);
        *self = Self::from_json(map)?;
        Ok(())
    }

    /// Bind posted fields onto the model
    ///
    /// Skips the primary key, attributes outside [`safe_attributes`](Self::safe_attributes)
    /// and attributes the model does not have. Posted strings are coerced into the
    /// JSON kind of the current attribute value; a null attribute (an unset
    /// `Option`) takes the first of [`form_value_candidates`] the model accepts.
    /// The model is left untouched when the result does not deserialize.
    fn set_attributes(&mut self, values: &Map<String, JsonValue>) -> Result<(), ActiveModelError>
    where
        Self: Sized,
    {
        let original = self.to_json()?;
        let mut map = original.clone();
        let primary_key = Self::primary_key_attribute();
        let safe = Self::safe_attributes();

        for (name, posted) in values {
            if name == primary_key {
                continue;
            }
            if let Some(safe) = safe {
                if !safe.contains(&name.as_str()) {
                    continue;
                }
            }
            let value = match map.get(name) {
                Some(JsonValue::Null) => resolve_untyped::<Self>(&original, name, posted),
                Some(current) => coerce_form_value(current, posted),
                None => continue,
            };
            map.insert(name.clone(), value);
        }

        match Self::from_json(map.clone()) {
            Ok(bound) => {
                *self = bound;
                Ok(())
            }
            Err(err) => Err(locate_invalid_attribute::<Self>(&original, &map).unwrap_or(err)),
        }
    }

    /// Validate the model, returning every failed rule
    ///
    /// `attributes` restricts validation to the listed attributes. The default
    /// accepts everything.
    fn validate(&self, _attributes: Option<&[&str]>) -> ValidationErrors {
        ValidationErrors::new()
    }
}

/// Pick the first candidate for a null attribute that the model accepts
///
/// Each candidate is tried on the original attributes with only `name` changed.
/// Falls back to the posted value so the failure is reported against `name`.
fn resolve_untyped<M: ActiveModelTrait>(
    original: &Map<String, JsonValue>,
    name: &str,
    posted: &JsonValue,
) -> JsonValue {
    form_value_candidates(posted)
        .into_iter()
        .find(|candidate| {
            let mut trial = original.clone();
            trial.insert(name.to_string(), candidate.clone());
            serde_json::from_value::<M>(JsonValue::Object(trial)).is_ok()
        })
        .unwrap_or_else(|| posted.clone())
}

/// Find the first changed attribute that breaks deserialization on its own
fn locate_invalid_attribute<M: ActiveModelTrait>(
    original: &Map<String, JsonValue>,
    bound: &Map<String, JsonValue>,
) -> Option<ActiveModelError> {
    bound.iter().find_map(|(name, value)| {
        if original.get(name) == Some(value) {
            return None;
        }
        let mut trial = original.clone();
        trial.insert(name.clone(), value.clone());
        match serde_json::from_value::<M>(JsonValue::Object(trial)) {
            Ok(_) => None,
            Err(err) => Some(ActiveModelError::InvalidValueType {
                attribute: name.clone(),
                expected: match original.get(name) {
                    Some(current) => json_kind(current).to_string(),
                    None => "a valid value".to_string(),
                },
                actual: format!("{} ({})", json_kind(value), err),
            }),
        }
    })
}

pub(crate) fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// ActiveModelBehavior trait for lifecycle hooks
///
/// Storage backends call these around each persistence operation. All methods
/// have default empty implementations, so only override the hooks you need.
///
/// # Example
///
/// ```no_run
/// use tabular::{ActiveModelBehavior, ActiveModelError};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Serialize, Deserialize)]
/// # struct InvoiceLine { id: Option<i64>, sku: String }
/// # impl tabular::ActiveModelTrait for InvoiceLine { type Id = i64; }
///
/// impl ActiveModelBehavior for InvoiceLine {
///     fn before_save(&mut self, _insert: bool) -> Result<(), ActiveModelError> {
///         self.sku = self.sku.trim().to_uppercase();
///         Ok(())
///     }
/// }
/// ```
pub trait ActiveModelBehavior: ActiveModelTrait {
    /// Hook called before an insert or update
    ///
    /// Returns an error to abort the save.
    fn before_save(&mut self, _insert: bool) -> Result<(), ActiveModelError> {
        Ok(())
    }

    /// Hook called after an insert or update succeeded
    fn after_save(&mut self, _insert: bool) -> Result<(), ActiveModelError> {
        Ok(())
    }

    /// Hook called before delete
    ///
    /// Returns an error to abort the delete.
    fn before_delete(&self) -> Result<(), ActiveModelError> {
        Ok(())
    }

    /// Hook called after delete succeeded
    fn after_delete(&self) -> Result<(), ActiveModelError> {
        Ok(())
    }
}

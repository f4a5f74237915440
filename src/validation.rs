//! Validation error bag shared by models and the tabular binder.

use serde::Serialize;
use std::collections::BTreeMap;

/// Per-attribute validation messages
///
/// Models return this from [`ActiveModelTrait::validate`](crate::ActiveModelTrait::validate);
/// the binder keeps one per bound row. Serializes as `{"attribute": ["message", ...]}`
/// so it can be sent straight back to the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against an attribute
    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn has(&self, attribute: &str) -> bool {
        self.errors.contains_key(attribute)
    }

    /// Messages recorded against an attribute, empty if none
    pub fn get(&self, attribute: &str) -> &[String] {
        self.errors
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First message of the first attribute with errors
    pub fn first(&self) -> Option<&str> {
        self.errors
            .values()
            .find_map(|messages| messages.first())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors
            .iter()
            .map(|(attribute, messages)| (attribute.as_str(), messages.as_slice()))
    }

    /// Append every message of `other`
    pub fn merge(&mut self, other: ValidationErrors) {
        for (attribute, messages) in other.errors {
            self.errors.entry(attribute).or_default().extend(messages);
        }
    }

    /// Keep only the listed attributes
    pub fn retain_attributes(&mut self, attributes: &[&str]) {
        self.errors
            .retain(|attribute, _| attributes.contains(&attribute.as_str()));
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}

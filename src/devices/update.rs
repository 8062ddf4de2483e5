use serde_json::{Map, Value};

use crate::db::KEY_ATTRIBUTE;

use super::models::{LAST_UPDATED, REQUIRED_FIELDS};
use super::service::DevicesError;

/// Ordered set of attribute assignments applied to one device
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    fields: Vec<(String, Value)>,
}

impl UpdatePlan {
    /// Build a plan from a caller-supplied update body.
    ///
    /// The key attribute and any caller `lastUpdated` are dropped; `lastUpdated`
    /// is always appended with `last_updated`.
    ///
    /// The emptiness check runs before the timestamp is appended, so a body
    /// holding only `deviceId` and/or `lastUpdated` is rejected with
    /// [`DevicesError::NoUpdatableFields`] rather than treated as a
    /// timestamp-only touch of the device.
    pub fn from_body(body: Map<String, Value>, last_updated: String) -> Result<Self, DevicesError> {
        if body.is_empty() {
            return Err(DevicesError::EmptyUpdate);
        }

        let mut fields = Vec::with_capacity(body.len() + 1);
        for (name, value) in body {
            if name == KEY_ATTRIBUTE || name == LAST_UPDATED {
                continue;
            }
            validate_field(&name, &value)?;
            fields.push((name, value));
        }

        if fields.is_empty() {
            return Err(DevicesError::NoUpdatableFields);
        }

        fields.push((LAST_UPDATED.to_string(), Value::String(last_updated)));

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Render as a DynamoDB-style update expression, e.g.
    /// `SET #status = :status, #lastUpdated = :lastUpdated`
    pub fn expression(&self) -> String {
        let assignments: Vec<String> = self
            .field_names()
            .map(|name| format!("#{name} = :{name}"))
            .collect();
        format!("SET {}", assignments.join(", "))
    }
}

/// Well-known attributes keep their stored shape; anything else is freeform
fn validate_field(name: &str, value: &Value) -> Result<(), DevicesError> {
    if REQUIRED_FIELDS.contains(&name) {
        return match value {
            Value::String(s) if !s.is_empty() => Ok(()),
            Value::String(_) | Value::Null => Err(DevicesError::EmptyField(name.to_string())),
            _ => Err(DevicesError::NotAString(name.to_string())),
        };
    }

    match (name, value) {
        ("location", Value::String(_)) => Ok(()),
        ("location", _) => Err(DevicesError::NotAString(name.to_string())),
        ("properties", Value::Object(_)) => Ok(()),
        ("properties", _) => Err(DevicesError::InvalidProperties),
        _ => Ok(()),
    }
}

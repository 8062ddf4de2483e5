use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::db::{Item, KEY_ATTRIBUTE};

use super::service::DevicesError;

/// Fields every stored device must carry as non-empty strings
pub const REQUIRED_FIELDS: [&str; 3] = ["name", "type", "status"];

pub const LAST_UPDATED: &str = "lastUpdated";

/// A smart home device record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Unique device ID, client-supplied or generated on creation
    pub device_id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub device_type: String,

    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Freeform device properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub properties: Option<Map<String, Value>>,

    /// ISO-8601 UTC timestamp of the last write
    pub last_updated: String,
}

impl Device {
    /// Validate a creation body and build the record to store.
    ///
    /// `generate_id` is only called when the body carries no usable `deviceId`.
    pub fn from_body(
        body: &Map<String, Value>,
        last_updated: String,
        generate_id: impl FnOnce() -> String,
    ) -> Result<Self, DevicesError> {
        let name = required_string(body, "name")?;
        let device_type = required_string(body, "type")?;
        let status = required_string(body, "status")?;

        let device_id = match body.get(KEY_ATTRIBUTE) {
            None | Some(Value::Null) => generate_id(),
            Some(Value::String(id)) if id.is_empty() => generate_id(),
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Err(DevicesError::NotAString(KEY_ATTRIBUTE.to_string())),
        };

        // Optional fields are kept only when they carry something useful
        let location = match body.get("location") {
            Some(Value::String(location)) if !location.is_empty() => Some(location.clone()),
            _ => None,
        };
        let properties = match body.get("properties") {
            Some(Value::Object(properties)) => Some(properties.clone()),
            _ => None,
        };

        Ok(Self {
            device_id,
            name,
            device_type,
            status,
            location,
            properties,
            last_updated,
        })
    }
}

fn required_string(body: &Map<String, Value>, field: &'static str) -> Result<String, DevicesError> {
    match body.get(field) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        _ => Err(DevicesError::MissingField(field)),
    }
}

impl From<Device> for Item {
    fn from(device: Device) -> Self {
        let mut item = Item::new();
        item.insert(KEY_ATTRIBUTE.to_string(), Value::String(device.device_id));
        item.insert("name".to_string(), Value::String(device.name));
        item.insert("type".to_string(), Value::String(device.device_type));
        item.insert("status".to_string(), Value::String(device.status));
        if let Some(location) = device.location {
            item.insert("location".to_string(), Value::String(location));
        }
        if let Some(properties) = device.properties {
            item.insert("properties".to_string(), Value::Object(properties));
        }
        item.insert(LAST_UPDATED.to_string(), Value::String(device.last_updated));
        item
    }
}

/// Response for create and update operations
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceResponse {
    pub message: String,
    #[schema(value_type = Object)]
    pub device: Item,
}

impl DeviceResponse {
    pub fn new(message: impl Into<String>, device: Item) -> Self {
        Self {
            message: message.into(),
            device,
        }
    }
}

/// One page of devices
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListResponse {
    #[schema(value_type = Vec<Object>)]
    pub devices: Vec<Item>,
    /// Cursor for the next page, absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<String>,
}

/// Plain confirmation message
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

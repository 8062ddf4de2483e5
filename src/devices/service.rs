use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{DbError, DeviceTable, Item, ScanPage};
use crate::error::HttpError;

use super::models::Device;
use super::update::UpdatePlan;

#[derive(Error, Debug)]
pub enum DevicesError {
    #[error("Request body is missing.")]
    MissingBody,

    #[error("Invalid JSON in request body.")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Request body must be a JSON object.")]
    NotAnObject,

    #[error("Missing or empty required field: {0}")]
    MissingField(&'static str),

    #[error("Field cannot be empty: {0}")]
    EmptyField(String),

    #[error("Field must be a string: {0}")]
    NotAString(String),

    #[error("Field must be a JSON object: properties")]
    InvalidProperties,

    #[error("Device ID is missing from path parameters.")]
    MissingDeviceId,

    #[error("Request body cannot be empty for update operation.")]
    EmptyUpdate,

    #[error("No valid fields provided for update.")]
    NoUpdatableFields,

    #[error("Invalid limit parameter: {0}")]
    InvalidLimit(String),

    #[error("Device with ID '{0}' not found.")]
    NotFound(String),

    #[error("Could not {action} due to a database error.")]
    Store {
        action: &'static str,
        #[source]
        source: DbError,
    },

    #[error("An unexpected error occurred.")]
    Unexpected(String),
}

impl DevicesError {
    /// Classify a table failure: failures of the store itself stay generic,
    /// anything else is reported as unexpected with its raw text.
    fn from_db(action: &'static str) -> impl FnOnce(DbError) -> Self {
        move |source| match source {
            DbError::Sqlx(_) | DbError::Migration(_) => DevicesError::Store { action, source },
            other => DevicesError::Unexpected(other.to_string()),
        }
    }
}

impl HttpError for DevicesError {
    fn status_code(&self) -> StatusCode {
        match self {
            DevicesError::NotFound(_) => StatusCode::NOT_FOUND,
            DevicesError::Store { .. } | DevicesError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            DevicesError::Unexpected(details) => Some(details.clone()),
            _ => None,
        }
    }
}

/// Tunables for the device operations
#[derive(Debug, Clone)]
pub struct DevicesOptions {
    /// Page size used when the caller gives no limit
    pub default_page_limit: u32,
    /// Reject updates of unknown devices instead of creating them
    pub strict_updates: bool,
}

impl Default for DevicesOptions {
    fn default() -> Self {
        Self {
            default_page_limit: 100,
            strict_updates: false,
        }
    }
}

/// Service implementing the device CRUD operations over a device table
pub struct DevicesService {
    table: Arc<dyn DeviceTable>,
    options: DevicesOptions,
}

impl DevicesService {
    /// Create a new devices service
    pub fn new(table: Arc<dyn DeviceTable>, options: DevicesOptions) -> Self {
        Self { table, options }
    }

    /// Current UTC time as an ISO-8601 string
    fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_object(body: Option<&str>) -> Result<Map<String, Value>, DevicesError> {
        let raw = body.ok_or(DevicesError::MissingBody)?;
        match serde_json::from_str::<Value>(raw).map_err(DevicesError::InvalidJson)? {
            Value::Object(map) => Ok(map),
            _ => Err(DevicesError::NotAnObject),
        }
    }

    fn require_id(device_id: Option<&str>) -> Result<&str, DevicesError> {
        device_id
            .filter(|id| !id.is_empty())
            .ok_or(DevicesError::MissingDeviceId)
    }

    /// Create a device from a JSON body, overwriting any device with the same ID
    pub async fn create(&self, body: Option<&str>) -> Result<Item, DevicesError> {
        let body = Self::parse_object(body)?;
        let device = Device::from_body(&body, Self::now(), || Uuid::new_v4().to_string())?;
        let device_id = device.device_id.clone();
        let item = Item::from(device);

        self.table
            .put(&item)
            .await
            .map_err(DevicesError::from_db("create device"))?;

        tracing::info!(device_id = %device_id, "Device created");

        Ok(item)
    }

    /// Get a single device
    pub async fn get(&self, device_id: Option<&str>) -> Result<Item, DevicesError> {
        let device_id = Self::require_id(device_id)?;

        let item = self
            .table
            .get(device_id)
            .await
            .map_err(DevicesError::from_db("retrieve device"))?
            .ok_or_else(|| DevicesError::NotFound(device_id.to_string()))?;

        tracing::info!(device_id = %device_id, "Device retrieved");

        Ok(item)
    }

    /// List one page of devices
    pub async fn list(
        &self,
        limit: Option<&str>,
        exclusive_start_key: Option<&str>,
    ) -> Result<ScanPage, DevicesError> {
        let limit = match limit {
            None => self.options.default_page_limit,
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or_else(|| DevicesError::InvalidLimit(raw.to_string()))?,
        };
        let exclusive_start_key = exclusive_start_key.filter(|key| !key.is_empty());

        let page = self
            .table
            .scan(limit, exclusive_start_key)
            .await
            .map_err(DevicesError::from_db("retrieve devices"))?;

        tracing::info!(
            count = page.items.len(),
            has_more = page.last_evaluated_key.is_some(),
            "Devices retrieved"
        );

        Ok(page)
    }

    /// Merge the fields of a JSON body into a device and return the new record
    pub async fn update(
        &self,
        device_id: Option<&str>,
        body: Option<&str>,
    ) -> Result<Item, DevicesError> {
        let device_id = Self::require_id(device_id)?;

        let body = match body {
            Some(raw) => match serde_json::from_str::<Value>(raw).map_err(DevicesError::InvalidJson)? {
                Value::Null => return Err(DevicesError::EmptyUpdate),
                Value::Object(map) => map,
                _ => return Err(DevicesError::NotAnObject),
            },
            None => return Err(DevicesError::MissingBody),
        };

        let plan = UpdatePlan::from_body(body, Self::now())?;
        tracing::debug!(
            device_id = %device_id,
            expression = %plan.expression(),
            "Applying device update"
        );

        let updated = self
            .table
            .update(device_id, plan.fields(), self.options.strict_updates)
            .await
            .map_err(DevicesError::from_db("update device"))?;

        let Some(item) = updated else {
            return Err(DevicesError::NotFound(device_id.to_string()));
        };

        tracing::info!(device_id = %device_id, "Device updated");

        Ok(item)
    }

    /// Delete a device, returning the removed record
    pub async fn delete(&self, device_id: Option<&str>) -> Result<Item, DevicesError> {
        let device_id = Self::require_id(device_id)?;

        let removed = self
            .table
            .delete(device_id)
            .await
            .map_err(DevicesError::from_db("delete device"))?;

        match removed {
            Some(item) => {
                tracing::info!(device_id = %device_id, "Device deleted");
                Ok(item)
            }
            None => Err(DevicesError::NotFound(device_id.to_string())),
        }
    }

    /// Get device count
    pub async fn count(&self) -> Result<usize, DevicesError> {
        self.table
            .count()
            .await
            .map_err(DevicesError::from_db("count devices"))
    }
}

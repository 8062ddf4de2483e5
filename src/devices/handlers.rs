use axum::{extract::State, http::StatusCode};

use crate::db::KEY_ATTRIBUTE;
use crate::error::into_response;
use crate::gateway::{GatewayRequest, GatewayResponse};
use crate::AppState;

use super::models::{DeviceListResponse, DeviceResponse, MessageResponse};
use super::service::DevicesError;

fn error_response(state: &AppState, err: DevicesError) -> GatewayResponse {
    into_response(&err, state.config.expose_error_details)
}

/// POST /devices - Create a device
pub async fn create_device(
    State(state): State<AppState>,
    request: GatewayRequest,
) -> GatewayResponse {
    tracing::debug!("CreateDevice invoked");

    match state.devices_service.create(request.body.as_deref()).await {
        Ok(device) => GatewayResponse::json(
            StatusCode::CREATED,
            &DeviceResponse::new("Device created successfully", device),
        ),
        Err(e) => error_response(&state, e),
    }
}

/// GET /devices/{deviceId} - Get a single device
pub async fn get_device(
    State(state): State<AppState>,
    request: GatewayRequest,
) -> GatewayResponse {
    let device_id = request.path_parameter(KEY_ATTRIBUTE);
    tracing::debug!(device_id = ?device_id, "GetDevice invoked");

    match state.devices_service.get(device_id).await {
        Ok(device) => GatewayResponse::json(StatusCode::OK, &device),
        Err(e) => error_response(&state, e),
    }
}

/// GET /devices - List devices, optionally paginated
pub async fn get_all_devices(
    State(state): State<AppState>,
    request: GatewayRequest,
) -> GatewayResponse {
    tracing::debug!("GetAllDevices invoked");

    let limit = request.query_parameter("limit");
    let exclusive_start_key = request.query_parameter("exclusiveStartKey");

    match state
        .devices_service
        .list(limit, exclusive_start_key)
        .await
    {
        Ok(page) => GatewayResponse::json(
            StatusCode::OK,
            &DeviceListResponse {
                devices: page.items,
                last_evaluated_key: page.last_evaluated_key,
            },
        ),
        Err(e) => error_response(&state, e),
    }
}

/// PUT /devices/{deviceId} - Update a device
pub async fn update_device(
    State(state): State<AppState>,
    request: GatewayRequest,
) -> GatewayResponse {
    let device_id = request.path_parameter(KEY_ATTRIBUTE);
    tracing::debug!(device_id = ?device_id, "UpdateDevice invoked");

    match state
        .devices_service
        .update(device_id, request.body.as_deref())
        .await
    {
        Ok(device) => GatewayResponse::json(
            StatusCode::OK,
            &DeviceResponse::new("Device updated successfully", device),
        ),
        Err(e) => error_response(&state, e),
    }
}

/// DELETE /devices/{deviceId} - Delete a device
pub async fn delete_device(
    State(state): State<AppState>,
    request: GatewayRequest,
) -> GatewayResponse {
    let device_id = request.path_parameter(KEY_ATTRIBUTE);
    tracing::debug!(device_id = ?device_id, "DeleteDevice invoked");

    match state.devices_service.delete(device_id).await {
        Ok(_) => GatewayResponse::json(
            StatusCode::OK,
            &MessageResponse {
                message: format!(
                    "Device '{}' deleted successfully",
                    device_id.unwrap_or_default()
                ),
            },
        ),
        Err(e) => error_response(&state, e),
    }
}

//! Request and response envelopes exchanged between the gateway and the
//! device handlers.
//!
//! Handlers only ever see a [`GatewayRequest`] and produce a
//! [`GatewayResponse`]; the axum glue in this module converts HTTP requests
//! into envelopes and envelopes back into HTTP responses.

use std::collections::{BTreeMap, HashMap};

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::ErrorResponse;

const CONTENT_TYPE_JSON: &str = "application/json";
const ALLOW_ANY_ORIGIN: &str = "*";

/// Inbound request envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    /// Raw request body, absent when the client sent none
    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,

    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
}

impl GatewayRequest {
    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        self.path_parameters
            .as_ref()
            .and_then(|params| params.get(name))
            .map(String::as_str)
    }

    pub fn query_parameter(&self, name: &str) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|params| params.get(name))
            .map(String::as_str)
    }
}

#[cfg(test)]
impl GatewayRequest {
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_path_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_query_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.query_string_parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }
}

impl<S> FromRequest<S> for GatewayRequest
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        // Routes without captures have no path parameters at all
        let path_parameters = Path::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
            .ok()
            .map(|Path(params)| params)
            .filter(|params| !params.is_empty());

        let query_string_parameters =
            Query::<HashMap<String, String>>::from_request_parts(&mut parts, state)
                .await
                .ok()
                .map(|Query(params)| params)
                .filter(|params| !params.is_empty());

        let bytes = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(IntoResponse::into_response)?;

        let body = if bytes.is_empty() {
            None
        } else {
            let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
                tracing::warn!(error = %e, "Rejected request body that is not valid UTF-8");
                GatewayResponse::json(
                    StatusCode::BAD_REQUEST,
                    &ErrorResponse::new("Invalid JSON in request body."),
                )
                .into_response()
            })?;
            Some(text)
        };

        Ok(Self {
            body,
            path_parameters,
            query_string_parameters,
        })
    }
}

/// Outbound response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded payload
    pub body: String,
}

impl GatewayResponse {
    /// Build a JSON response carrying the standard headers
    pub fn json<T: Serialize>(status: StatusCode, payload: &T) -> Self {
        let (status, body) = match serde_json::to_string(payload) {
            Ok(body) => (status, body),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response body");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    r#"{"error":"An unexpected error occurred."}"#.to_string(),
                )
            }
        };

        let headers = BTreeMap::from([
            (header::CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string()),
            (
                header::ACCESS_CONTROL_ALLOW_ORIGIN.to_string(),
                ALLOW_ANY_ORIGIN.to_string(),
            ),
        ]);

        Self {
            status_code: status.as_u16(),
            headers,
            body,
        }
    }

    /// Decode the body back into JSON
    #[cfg(test)]
    pub fn json_body(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Dropping invalid response header"),
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_response_carries_standard_headers() {
        let response = GatewayResponse::json(StatusCode::CREATED, &json!({ "ok": true }));

        assert_eq!(response.status_code, 201);
        assert_eq!(response.headers["content-type"], "application/json");
        assert_eq!(response.headers["access-control-allow-origin"], "*");
        assert_eq!(response.json_body().unwrap(), json!({ "ok": true }));
    }

    #[test]
    fn test_envelope_uses_gateway_field_names() {
        let raw = json!({
            "body": "{\"status\":\"on\"}",
            "pathParameters": { "deviceId": "lamp-1" },
            "queryStringParameters": null,
        });
        let request: GatewayRequest = serde_json::from_value(raw).unwrap();

        assert_eq!(request.path_parameter("deviceId"), Some("lamp-1"));
        assert_eq!(request.query_parameter("limit"), None);
        assert_eq!(request.body.as_deref(), Some("{\"status\":\"on\"}"));

        let response = GatewayResponse::json(StatusCode::OK, &json!({}));
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["statusCode"], 200);
        assert!(encoded["headers"].is_object());
        assert_eq!(encoded["body"], "{}");
    }

    #[tokio::test]
    async fn test_extracts_envelope_from_http_request() {
        let req = axum::http::Request::builder()
            .uri("/devices?limit=2&exclusiveStartKey=abc")
            .body(Body::from("{\"name\":\"Lamp\"}"))
            .unwrap();

        let request = GatewayRequest::from_request(req, &()).await.unwrap();

        assert_eq!(request.query_parameter("limit"), Some("2"));
        assert_eq!(request.query_parameter("exclusiveStartKey"), Some("abc"));
        assert!(request.path_parameters.is_none());
        assert_eq!(request.body.as_deref(), Some("{\"name\":\"Lamp\"}"));
    }

    #[tokio::test]
    async fn test_empty_http_body_is_absent() {
        let req = axum::http::Request::builder().uri("/devices").body(Body::empty()).unwrap();

        let request = GatewayRequest::from_request(req, &()).await.unwrap();

        assert!(request.body.is_none());
        assert!(request.query_string_parameters.is_none());
    }

    #[tokio::test]
    async fn test_non_utf8_body_rejected() {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/devices")
            .body(Body::from(b"{\"name\":\"La\xFFmp\"}".to_vec()))
            .unwrap();

        let response = GatewayRequest::from_request(req, &()).await.unwrap_err();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "Invalid JSON in request body." }));
    }

    #[test]
    fn test_into_http_response() {
        let response =
            GatewayResponse::json(StatusCode::NOT_FOUND, &json!({ "error": "nope" })).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}

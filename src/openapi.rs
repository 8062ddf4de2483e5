use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::devices::models::{DeviceListResponse, DeviceResponse, MessageResponse};
use crate::devices::Device;
use crate::error::ErrorResponse;

/// OpenAPI documentation for the device API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Home Devices API",
        version = "1.0.0",
        description = "Create, read, update and delete smart home device records.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    tags(
        (name = "devices", description = "Device records")
    ),
    components(
        schemas(
            Device,
            DeviceResponse,
            DeviceListResponse,
            MessageResponse,
            ErrorResponse,
        )
    )
)]
pub struct ApiDoc;

/// Create the Swagger UI router
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}

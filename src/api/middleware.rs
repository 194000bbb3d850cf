//! Request tagging and cross-origin policy for the game API.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Id attached to every request; error bodies and logs carry it.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    /// The caller's `x-request-id` if it sent a usable one, otherwise a fresh UUID
    fn for_request(request: &Request) -> Self {
        let supplied = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|id| !id.is_empty());

        Self(supplied.map_or_else(|| Uuid::new_v4().to_string(), str::to_owned))
    }
}

/// Tag the request with a [`RequestId`] and echo it on the response
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::for_request(&request);
    let echoed = HeaderValue::from_str(&request_id.0).ok();
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Some(value) = echoed {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// CORS policy. An empty list or `*` opens the API to every origin.
///
/// Game traffic is GET and POST only; browsers may read the request id header.
pub fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let open = allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*");
    let origins = if open {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

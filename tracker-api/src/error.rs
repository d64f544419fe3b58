//! Mapping of tracker errors and request rejections onto HTTP responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error};
use tracker::error::TrackerError;

/// Error returned by handlers. Rendered as `{"detail": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    Tracker(TrackerError),
    /// The request could not be decoded into handler arguments.
    Malformed { status: StatusCode, detail: String },
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        ApiError::Tracker(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Malformed {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Malformed {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Tracker(TrackerError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Tracker(TrackerError::Invalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Tracker(TrackerError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Tracker(TrackerError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Malformed { status, .. } => *status,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Tracker(err) => format!("{:#}", err),
            ApiError::Malformed { detail, .. } => detail.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            error!(error = %detail, "request failed");
        } else if matches!(self, ApiError::Malformed { .. }) {
            debug!(status = status.as_u16(), error = %detail, "request rejected");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// JSON request body whose decode failures render as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Path parameters whose decode failures render as [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Query string whose decode failures render as [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::Value;
    use tracker::core::types::NewReading;
    use tracker::error::RecordKind;

    async fn detail_of(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        body["detail"].as_str().expect("detail string").to_string()
    }

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (TrackerError::not_found(RecordKind::Test, "x"), StatusCode::NOT_FOUND),
            (
                TrackerError::Invalid(vec!["bad".to_string()]),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (TrackerError::Conflict("done".to_string()), StatusCode::CONFLICT),
            (
                TrackerError::Storage(anyhow::anyhow!("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn mistyped_body_renders_detail() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/cycles/x/readings")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"kind":"OCV","cell_values":["abc"]}"#))
            .expect("request");

        let Err(err) = ApiJson::<NewReading>::from_request(request, &()).await else {
            panic!("string cell value must be rejected");
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert!(detail_of(response).await.contains("cell_values"));
    }

    #[tokio::test]
    async fn missing_content_type_renders_detail() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/tests")
            .body(Body::from("{}"))
            .expect("request");

        let Err(err) = ApiJson::<NewReading>::from_request(request, &()).await else {
            panic!("body without content type must be rejected");
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(!detail_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_query_value_renders_detail() {
        #[derive(Debug, serde::Deserialize)]
        struct KindQuery {
            #[allow(dead_code)]
            kind: Option<tracker::record::ReadingKind>,
        }

        let request = Request::builder()
            .uri("/api/cycles/x/readings/latest?kind=XYZ")
            .body(Body::empty())
            .expect("request");
        let (mut parts, _) = request.into_parts();

        let Err(err) = ApiQuery::<KindQuery>::from_request_parts(&mut parts, &()).await else {
            panic!("unknown kind must be rejected");
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(detail_of(response).await.contains("XYZ"));
    }
}

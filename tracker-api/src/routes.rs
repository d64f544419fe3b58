//! HTTP route handlers for the tracker API.

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracker::core::report::TestStatusReport;
use tracker::core::types::{NewReading, NewTest};
use tracker::error::{RecordKind, TrackerError};
use tracker::io::export::ExportScope;
use tracker::record::{Bank, Cycle, Reading, ReadingKind, Test};
use tracker::service::{CsvExport, CycleCompleted};
use uuid::Uuid;

use crate::error::{ApiError, ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/tests", post(create_test).get(list_tests))
        .route("/tests/{test_id}", get(get_test).delete(delete_test))
        .route("/tests/{test_id}/status", get(get_test_status))
        .route("/tests/{test_id}/export", get(export_test))
        .route("/banks/{bank_id}", get(get_bank))
        .route("/banks/{bank_id}/export", get(export_bank))
        .route("/cycles/{cycle_id}", get(get_cycle))
        .route("/cycles/{cycle_id}/export", get(export_cycle))
        .route(
            "/cycles/{cycle_id}/readings",
            get(list_readings).post(submit_reading),
        )
        .route("/cycles/{cycle_id}/readings/latest", get(latest_reading))
        .route("/cycles/{cycle_id}/complete", put(complete_cycle))
        .route("/readings/{reading_id}", get(get_reading))
}

async fn health() -> &'static str {
    "ok"
}

/// POST /api/tests
async fn create_test(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewTest>,
) -> ApiResult<(StatusCode, Json<Test>)> {
    let test = state.service.lock().await.create_test(&input)?;
    Ok((StatusCode::CREATED, Json(test)))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    skip: usize,
    limit: Option<usize>,
}

/// GET /api/tests?skip&limit
async fn list_tests(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<Vec<Test>>> {
    let tests = state
        .service
        .lock()
        .await
        .list_tests(query.skip, query.limit)?;
    Ok(Json(tests))
}

async fn get_test(
    State(state): State<AppState>,
    ApiPath(test_id): ApiPath<Uuid>,
) -> ApiResult<Json<Test>> {
    Ok(Json(state.service.lock().await.get_test(test_id)?))
}

async fn delete_test(
    State(state): State<AppState>,
    ApiPath(test_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.service.lock().await.delete_test(test_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/tests/{test_id}/status
async fn get_test_status(
    State(state): State<AppState>,
    ApiPath(test_id): ApiPath<Uuid>,
) -> ApiResult<Json<TestStatusReport>> {
    Ok(Json(state.service.lock().await.get_test_status(test_id)?))
}

async fn get_bank(
    State(state): State<AppState>,
    ApiPath(bank_id): ApiPath<Uuid>,
) -> ApiResult<Json<Bank>> {
    Ok(Json(state.service.lock().await.get_bank(bank_id)?))
}

async fn get_cycle(
    State(state): State<AppState>,
    ApiPath(cycle_id): ApiPath<Uuid>,
) -> ApiResult<Json<Cycle>> {
    Ok(Json(state.service.lock().await.get_cycle(cycle_id)?))
}

async fn list_readings(
    State(state): State<AppState>,
    ApiPath(cycle_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<Reading>>> {
    Ok(Json(
        state.service.lock().await.get_cycle_readings(cycle_id)?,
    ))
}

/// POST /api/cycles/{cycle_id}/readings
async fn submit_reading(
    State(state): State<AppState>,
    ApiPath(cycle_id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<NewReading>,
) -> ApiResult<(StatusCode, Json<Reading>)> {
    let recorded = state
        .service
        .lock()
        .await
        .submit_reading(cycle_id, &input)?;
    Ok((StatusCode::CREATED, Json(recorded.reading)))
}

#[derive(Debug, Default, Deserialize)]
struct LatestQuery {
    kind: Option<ReadingKind>,
}

/// GET /api/cycles/{cycle_id}/readings/latest?kind=OCV|CCV
async fn latest_reading(
    State(state): State<AppState>,
    ApiPath(cycle_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<LatestQuery>,
) -> ApiResult<Json<Reading>> {
    state
        .service
        .lock()
        .await
        .get_latest_reading(cycle_id, query.kind)?
        .map(Json)
        .ok_or_else(|| {
            TrackerError::not_found(RecordKind::Reading, format!("latest of cycle {cycle_id}"))
                .into()
        })
}

#[derive(Debug, Default, Deserialize)]
struct CompleteRequest {
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
}

/// PUT /api/cycles/{cycle_id}/complete with an optional `{"end_time": ...}` body.
async fn complete_cycle(
    State(state): State<AppState>,
    ApiPath(cycle_id): ApiPath<Uuid>,
    body: Result<Option<Json<CompleteRequest>>, JsonRejection>,
) -> ApiResult<Json<CycleCompleted>> {
    let end_time = body?.and_then(|Json(request)| request.end_time);
    let completed = state
        .service
        .lock()
        .await
        .complete_cycle(cycle_id, end_time)?;
    Ok(Json(completed))
}

async fn get_reading(
    State(state): State<AppState>,
    ApiPath(reading_id): ApiPath<Uuid>,
) -> ApiResult<Json<Reading>> {
    Ok(Json(state.service.lock().await.get_reading(reading_id)?))
}

async fn export_test(
    State(state): State<AppState>,
    ApiPath(test_id): ApiPath<Uuid>,
) -> ApiResult<Response> {
    export(&state, ExportScope::Test(test_id)).await
}

async fn export_bank(
    State(state): State<AppState>,
    ApiPath(bank_id): ApiPath<Uuid>,
) -> ApiResult<Response> {
    export(&state, ExportScope::Bank(bank_id)).await
}

async fn export_cycle(
    State(state): State<AppState>,
    ApiPath(cycle_id): ApiPath<Uuid>,
) -> ApiResult<Response> {
    export(&state, ExportScope::Cycle(cycle_id)).await
}

async fn export(state: &AppState, scope: ExportScope) -> ApiResult<Response> {
    let export = state.service.lock().await.export_csv(scope)?;
    Ok(csv_response(export))
}

fn csv_response(export: CsvExport) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", export.file_name),
            ),
        ],
        export.contents,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker::record::TestStatus;
    use tracker::test_support::{TrackerProject, new_bank, new_test, ocv};

    fn app_state(project: &TrackerProject) -> AppState {
        AppState::open(project.temp.path().to_path_buf()).expect("open project")
    }

    async fn created(state: &AppState) -> Test {
        let (status, Json(test)) = create_test(
            State(state.clone()),
            ApiJson(new_test("JOB-API", 1, vec![new_bank(1, 10)])),
        )
        .await
        .expect("create");
        assert_eq!(status, StatusCode::CREATED);
        test
    }

    #[tokio::test]
    async fn reading_then_complete_reports_completed() {
        let project = TrackerProject::new();
        let state = app_state(&project);
        let test = created(&state).await;
        let cycle_id = test.banks[0].cycles[0].id;

        let (status, Json(reading)) = submit_reading(
            State(state.clone()),
            ApiPath(cycle_id),
            ApiJson(ocv(10, 3.7, None)),
        )
        .await
        .expect("reading");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reading.reading_number, 0);

        let Json(completed) = complete_cycle(State(state.clone()), ApiPath(cycle_id), Ok(None))
            .await
            .expect("complete");
        assert_eq!(completed.transition.status, TestStatus::Completed);

        let Json(report) = get_test_status(State(state.clone()), ApiPath(test.id))
            .await
            .expect("status");
        assert_eq!(report.status, TestStatus::Completed);

        let Json(latest) = latest_reading(
            State(state.clone()),
            ApiPath(cycle_id),
            ApiQuery(LatestQuery {
                kind: Some(ReadingKind::Ocv),
            }),
        )
        .await
        .expect("latest");
        assert_eq!(latest.id, reading.id);
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let project = TrackerProject::new();
        let state = app_state(&project);
        let test = created(&state).await;
        let cycle_id = test.banks[0].cycles[0].id;

        let missing = get_test(State(state.clone()), ApiPath(Uuid::new_v4()))
            .await
            .expect_err("missing");
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let invalid = submit_reading(
            State(state.clone()),
            ApiPath(cycle_id),
            ApiJson(ocv(10, 1.5, None)),
        )
        .await
        .expect_err("invalid");
        assert_eq!(
            invalid.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let not_started = complete_cycle(State(state.clone()), ApiPath(cycle_id), Ok(None))
            .await
            .expect_err("not started");
        assert_eq!(not_started.into_response().status(), StatusCode::CONFLICT);

        let duplicate = create_test(
            State(state.clone()),
            ApiJson(new_test("JOB-API", 1, vec![new_bank(1, 10)])),
        )
        .await
        .expect_err("duplicate");
        assert_eq!(duplicate.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn export_sets_csv_headers() {
        let project = TrackerProject::new();
        let state = app_state(&project);
        let test = created(&state).await;

        let response = export_test(State(state.clone()), ApiPath(test.id))
            .await
            .expect("export");
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            format!("attachment; filename=test_{}_export.csv", test.id).as_str()
        );
    }

    #[tokio::test]
    async fn delete_then_list_is_empty() {
        let project = TrackerProject::new();
        let state = app_state(&project);
        let test = created(&state).await;

        let status = delete_test(State(state.clone()), ApiPath(test.id))
            .await
            .expect("delete");
        assert_eq!(status, StatusCode::NO_CONTENT);

        let Json(tests) = list_tests(State(state.clone()), ApiQuery(ListQuery::default()))
            .await
            .expect("list");
        assert!(tests.is_empty());
    }

    /// Send one raw HTTP/1.1 request through the full router.
    async fn send(state: AppState, request: String) -> (u16, serde_json::Value) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new().nest("/api", api_router()).with_state(state);
        tokio::spawn(async move { axum::serve(listener, app).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
        stream.write_all(request.as_bytes()).await.expect("write");
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.expect("read");

        let (head, body) = raw.split_once("\r\n\r\n").expect("header terminator");
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("status code");
        (status, serde_json::from_str(body).expect("json body"))
    }

    #[tokio::test]
    async fn undecodable_requests_render_detail() {
        let project = TrackerProject::new();
        let state = app_state(&project);
        let test = created(&state).await;
        let cycle_id = test.banks[0].cycles[0].id;

        let (status, body) = send(
            state.clone(),
            "GET /api/tests/not-a-uuid HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
                .to_string(),
        )
        .await;
        assert_eq!(status, 400);
        assert!(body["detail"].is_string());

        let payload = r#"{"kind":"OCV","cell_values":["abc"]}"#;
        let (status, body) = send(
            state.clone(),
            format!(
                "POST /api/cycles/{cycle_id}/readings HTTP/1.1\r\nHost: localhost\r\n\
                 Content-Type: application/json\r\nContent-Length: {}\r\n\
                 Connection: close\r\n\r\n{payload}",
                payload.len()
            ),
        )
        .await;
        assert_eq!(status, 422);
        assert!(body["detail"].as_str().expect("detail").contains("cell_values"));

        let (status, body) = send(
            state.clone(),
            format!(
                "PUT /api/cycles/{cycle_id}/complete HTTP/1.1\r\nHost: localhost\r\n\
                 Content-Type: application/json\r\nContent-Length: 6\r\n\
                 Connection: close\r\n\r\nnot js"
            ),
        )
        .await;
        assert_eq!(status, 400);
        assert!(body["detail"].is_string());

        let stored = state.service.lock().await.get_test(test.id).expect("fetch");
        assert_eq!(stored, test);
    }
}

use crate::infra::{AppState, InMemoryPositionStore, StoreError};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use position_desk::positions::{
    Candidate, MemberId, MemberKind, MemberRecord, Position, PositionId, Reviewer, TestQuestion,
};
use serde_json::json;
use tracing::{debug, info};

/// REST surface of the remote positions service plus the operational endpoints.
pub(crate) fn with_position_routes(store: InMemoryPositionStore) -> Router {
    Router::new()
        .route(
            "/positions/:position_id",
            get(fetch_position).put(update_position),
        )
        .route("/candidats", post(create_candidate))
        .route("/candidats/:member_id", delete(delete_candidate))
        .route("/viewers", post(create_reviewer))
        .route("/viewers/:member_id", delete(delete_reviewer))
        .route("/tests", post(create_test_question))
        .route("/tests/:member_id", delete(delete_test_question))
        .with_state(store)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Mismatch(_) => StatusCode::BAD_REQUEST,
            StoreError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let payload = json!({ "error": self.to_string() });
        (status, Json(payload)).into_response()
    }
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn fetch_position(
    State(store): State<InMemoryPositionStore>,
    Path(position_id): Path<i64>,
) -> Result<Json<Position>, StoreError> {
    debug!(position_id, "serving position");
    store.fetch(PositionId(position_id)).map(Json)
}

pub(crate) async fn update_position(
    State(store): State<InMemoryPositionStore>,
    Path(position_id): Path<i64>,
    Json(update): Json<Position>,
) -> Result<StatusCode, StoreError> {
    store.update_fields(PositionId(position_id), update)?;
    info!(position_id, "position fields replaced");
    Ok(StatusCode::NO_CONTENT)
}

fn create(store: &InMemoryPositionStore, record: MemberRecord) -> Response {
    let kind = record.kind();
    match store.create_member(record) {
        Ok(created) => {
            info!(%kind, member_id = created.id().0, "member created");
            let body = match created {
                MemberRecord::Candidate(candidate) => Json(candidate).into_response(),
                MemberRecord::Reviewer(reviewer) => Json(reviewer).into_response(),
                MemberRecord::TestQuestion(question) => Json(question).into_response(),
            };
            (StatusCode::CREATED, body).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_candidate(
    State(store): State<InMemoryPositionStore>,
    Json(candidate): Json<Candidate>,
) -> Response {
    create(&store, MemberRecord::Candidate(candidate))
}

pub(crate) async fn create_reviewer(
    State(store): State<InMemoryPositionStore>,
    Json(reviewer): Json<Reviewer>,
) -> Response {
    create(&store, MemberRecord::Reviewer(reviewer))
}

pub(crate) async fn create_test_question(
    State(store): State<InMemoryPositionStore>,
    Json(question): Json<TestQuestion>,
) -> Response {
    create(&store, MemberRecord::TestQuestion(question))
}

fn remove(store: &InMemoryPositionStore, kind: MemberKind, member_id: i64) -> Response {
    match store.delete_member(kind, MemberId(member_id)) {
        Ok(()) => {
            info!(%kind, member_id, "member deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn delete_candidate(
    State(store): State<InMemoryPositionStore>,
    Path(member_id): Path<i64>,
) -> Response {
    remove(&store, MemberKind::Candidate, member_id)
}

pub(crate) async fn delete_reviewer(
    State(store): State<InMemoryPositionStore>,
    Path(member_id): Path<i64>,
) -> Response {
    remove(&store, MemberKind::Reviewer, member_id)
}

pub(crate) async fn delete_test_question(
    State(store): State<InMemoryPositionStore>,
    Path(member_id): Path<i64>,
) -> Response {
    remove(&store, MemberKind::TestQuestion, member_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn build_router(ready: bool) -> Router {
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_position_routes(InMemoryPositionStore::seeded()).layer(Extension(state))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::to_vec(&body).expect("serialize body"),
            ))
            .expect("request")
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn read_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        serde_json::from_slice(&body).expect("json")
    }

    #[tokio::test]
    async fn serves_the_seeded_position_with_epoch_dates() {
        let response = build_router(true)
            .oneshot(empty_request("GET", "/positions/42"))
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["openDate"], json!(1_709_251_200));
        assert_eq!(payload["candidats"][0]["name"], json!("Ada Lovelace"));
        assert_eq!(payload["viewers"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unknown_position_is_not_found() {
        let response = build_router(true)
            .oneshot(empty_request("GET", "/positions/7"))
            .await
            .expect("router dispatch");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_returns_the_assigned_identifier() {
        let response = build_router(true)
            .oneshot(json_request(
                "POST",
                "/tests",
                json!({ "id": 0, "name": "Explain lifetimes", "time": 300, "positionId": 42 }),
            ))
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::CREATED);
        let payload = read_json(response).await;
        assert_eq!(payload["id"], json!(4));
        assert_eq!(payload["positionId"], json!(42));
    }

    #[tokio::test]
    async fn blank_member_names_are_unprocessable() {
        let response = build_router(true)
            .oneshot(json_request(
                "POST",
                "/candidats",
                json!({ "name": " ", "email": "nobody@example.com", "positionId": 42 }),
            ))
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let payload = read_json(response).await;
        assert_eq!(payload["error"], json!("candidate name must not be empty"));
    }

    #[tokio::test]
    async fn mismatched_position_body_is_a_bad_request() {
        let mut body = serde_json::to_value(crate::infra::demo_position()).expect("encode");
        body["id"] = json!(43);
        let response = build_router(true)
            .oneshot(json_request("PUT", "/positions/42", body))
            .await
            .expect("router dispatch");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deletes_members_once() {
        let router = build_router(true);
        let first = router
            .clone()
            .oneshot(empty_request("DELETE", "/viewers/2"))
            .await
            .expect("router dispatch");
        assert_eq!(first.status(), StatusCode::NO_CONTENT);

        let second = router
            .oneshot(empty_request("DELETE", "/viewers/2"))
            .await
            .expect("router dispatch");
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_bound() {
        let response = build_router(false)
            .oneshot(empty_request("GET", "/ready"))
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let payload = read_json(response).await;
        assert_eq!(payload["status"], json!("initializing"));
    }
}

// 🌐 REST API - the assembled board over HTTP
//
// Routes are mounted under /api by `router`:
//   GET  /health
//   GET  /board
//   GET  /board/status
//   POST /board/refresh
//   GET  /board/columns/:id
//   GET  /external-data

use crate::board::Board;
use crate::errors::{BoardError, BoardErrorKind};
use crate::query::{BoardQuery, QueryStatus};
use crate::source::DealSource;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(kind: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                kind: kind.to_string(),
                message: message.into(),
            }),
        }
    }
}

/// Network trouble upstream is a gateway problem; bad data is ours.
fn status_for(kind: BoardErrorKind) -> StatusCode {
    match kind {
        BoardErrorKind::Transport => StatusCode::BAD_GATEWAY,
        BoardErrorKind::Transform => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn board_error_response(err: &BoardError) -> Response {
    warn!(kind = ?err.kind, detail = %err.detail, "board request failed");
    let kind = match err.kind {
        BoardErrorKind::Transport => "transport",
        BoardErrorKind::Transform => "transform",
    };
    (
        status_for(err.kind),
        Json(ApiResponse::<()>::err(kind, err.message.clone())),
    )
        .into_response()
}

fn board_response(board: &Board) -> Response {
    (StatusCode::OK, Json(ApiResponse::ok(board))).into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/board - Cached board, fetched when stale
async fn get_board<S: DealSource>(State(query): State<Arc<BoardQuery<S>>>) -> Response {
    match query.fetch_board().await {
        Ok(board) => board_response(&board),
        Err(err) => board_error_response(&err),
    }
}

/// POST /api/board/refresh - Fetch now, ignoring freshness
async fn refresh_board<S: DealSource>(State(query): State<Arc<BoardQuery<S>>>) -> Response {
    match query.refetch().await {
        Ok(board) => board_response(&board),
        Err(err) => board_error_response(&err),
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: QueryStatus,
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

/// GET /api/board/status - Query lifecycle without triggering a fetch
async fn board_status<S: DealSource>(State(query): State<Arc<BoardQuery<S>>>) -> impl IntoResponse {
    Json(ApiResponse::ok(StatusResponse {
        status: query.status(),
        stale: query.is_stale(),
        last_error: query.last_error().map(|err| err.message),
    }))
}

/// GET /api/board/columns/:id - A single column of the board
async fn get_column<S: DealSource>(
    State(query): State<Arc<BoardQuery<S>>>,
    Path(column_id): Path<String>,
) -> Response {
    // `Path` has already percent-decoded the segment
    match query.fetch_board().await {
        Ok(board) => match board.column(&column_id) {
            Some(column) => (StatusCode::OK, Json(ApiResponse::ok(column))).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<()>::err(
                    "not_found",
                    format!("No column '{}' on the board", column_id),
                )),
            )
                .into_response(),
        },
        Err(err) => board_error_response(&err),
    }
}

#[derive(Debug, Serialize)]
struct ExternalDeal {
    id: u32,
    name: &'static str,
    value: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExternalData {
    message: &'static str,
    timestamp: String,
    example_data: Vec<ExternalDeal>,
}

/// GET /api/external-data - Placeholder for an external integration
async fn external_data() -> impl IntoResponse {
    Json(ApiResponse::ok(ExternalData {
        message: "This endpoint can be used to fetch external data for your CRM",
        timestamp: Utc::now().to_rfc3339(),
        example_data: vec![
            ExternalDeal { id: 1, name: "Sample Deal 1", value: 10000 },
            ExternalDeal { id: 2, name: "Sample Deal 2", value: 25000 },
            ExternalDeal { id: 3, name: "Sample Deal 3", value: 15000 },
        ],
    }))
}

/// API routes, ready to be nested under `/api`.
pub fn router<S: DealSource>(query: Arc<BoardQuery<S>>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/board", get(get_board::<S>))
        .route("/board/status", get(board_status::<S>))
        .route("/board/refresh", post(refresh_board::<S>))
        .route("/board/columns/:id", get(get_column::<S>))
        .route("/external-data", get(external_data))
        .with_state(query)
}

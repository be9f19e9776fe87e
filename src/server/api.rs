use std::sync::Arc;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::auth::{Actor, AuthenticationContext, CallDeadline, RequestTimeouts, Viewer};
use crate::error::{DiscussionError, DiscussionResult};
use crate::model::{DiscussionFilter, DiscussionKind, MessageKind, NewDiscussion, NewMessage};
use crate::paging::PageRequest;
use crate::service::DiscussionService;

/// Message bodies are plain text plus file references, never uploads.
/// Oversized bodies fail JSON extraction and get the usual 400 envelope.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DiscussionService>,
    pub auth: Arc<dyn AuthenticationContext>,
    pub timeouts: RequestTimeouts,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "DX Discuss Server" }))
        .route("/health", get(|| async { Json("OK") }))
        .route("/discussions/create", post(create_discussion))
        .route("/discussions/course/{course_id}", get(list_discussions))
        .route("/discussions/{discussion_id}", get(get_discussion))
        .route("/discussions/{discussion_id}/pin", post(set_pinned))
        .route("/discussions/{discussion_id}/messages", post(add_message))
        .route(
            "/discussions/{discussion_id}/messages/{message_id}",
            delete(delete_message),
        )
        .route(
            "/discussions/{discussion_id}/messages/{message_id}/reactions",
            post(toggle_reaction),
        )
        .fallback(route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ListQuery {
    lesson_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

async fn list_discussions(
    State(state): State<AppState>,
    CallDeadline(deadline): CallDeadline,
    Path(course_id): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> DiscussionResult<impl IntoResponse> {
    let Query(query) = query.map_err(|e| DiscussionError::invalid(e.body_text()))?;

    let filter = DiscussionFilter {
        lesson_id: non_empty(query.lesson_id),
        kind: non_empty(query.kind)
            .map(|k| k.parse::<DiscussionKind>())
            .transpose()?,
    };
    let page = parse_number(query.page, "page", 1)?;
    let limit = parse_number(query.limit, "limit", PageRequest::DEFAULT_LIMIT as i64)?;

    let page = state
        .service
        .list_discussions(&course_id, filter, page, limit, deadline)
        .await?;

    Ok(Json(json!({
        "success": true,
        "discussions": page.items,
        "pagination": {
            "currentPage": page.current_page,
            "totalPages": page.total_pages,
            "total": page.total,
        },
    })))
}

async fn get_discussion(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    CallDeadline(deadline): CallDeadline,
    Path(discussion_id): Path<String>,
) -> DiscussionResult<impl IntoResponse> {
    let discussion_id = parse_id(&discussion_id, "discussion")?;
    let discussion = state
        .service
        .get_discussion(discussion_id, viewer.as_deref(), deadline)
        .await?;

    Ok(Json(json!({ "success": true, "discussion": discussion })))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct CreateDiscussionBody {
    course_id: String,
    title: String,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    lesson_id: Option<String>,
    tags: Option<Vec<String>>,
}

async fn create_discussion(
    State(state): State<AppState>,
    Actor(actor): Actor,
    CallDeadline(deadline): CallDeadline,
    body: Result<Json<CreateDiscussionBody>, JsonRejection>,
) -> DiscussionResult<impl IntoResponse> {
    let Json(body) = body.map_err(|e| DiscussionError::invalid(e.body_text()))?;

    let mut input = NewDiscussion::new(body.course_id, body.title)
        .description(body.description.unwrap_or_default())
        .tags(body.tags.unwrap_or_default());
    if let Some(kind) = non_empty(body.kind) {
        input = input.kind(kind.parse()?);
    }
    if let Some(lesson_id) = non_empty(body.lesson_id) {
        input = input.lesson(lesson_id);
    }

    let discussion = state
        .service
        .create_discussion(input, &actor, deadline)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "discussion": discussion })),
    ))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct AddMessageBody {
    content: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    emoji: Option<String>,
    file_url: Option<String>,
    file_name: Option<String>,
}

async fn add_message(
    State(state): State<AppState>,
    Actor(actor): Actor,
    CallDeadline(deadline): CallDeadline,
    Path(discussion_id): Path<String>,
    body: Result<Json<AddMessageBody>, JsonRejection>,
) -> DiscussionResult<impl IntoResponse> {
    let discussion_id = parse_id(&discussion_id, "discussion")?;
    let Json(body) = body.map_err(|e| DiscussionError::invalid(e.body_text()))?;

    let kind = match non_empty(body.kind) {
        Some(kind) => kind.parse::<MessageKind>()?,
        None => MessageKind::Text,
    };
    let input = NewMessage {
        content: body.content.unwrap_or_default(),
        kind,
        emoji: non_empty(body.emoji),
        file_url: non_empty(body.file_url),
        file_name: non_empty(body.file_name),
    };

    let message = state
        .service
        .add_message(discussion_id, &actor, input, deadline)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": message })),
    ))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ReactionBody {
    emoji: String,
}

async fn toggle_reaction(
    State(state): State<AppState>,
    Actor(actor): Actor,
    CallDeadline(deadline): CallDeadline,
    Path((discussion_id, message_id)): Path<(String, String)>,
    body: Result<Json<ReactionBody>, JsonRejection>,
) -> DiscussionResult<impl IntoResponse> {
    let discussion_id = parse_id(&discussion_id, "discussion")?;
    let message_id = parse_id(&message_id, "message")?;
    let Json(body) = body.map_err(|e| DiscussionError::invalid(e.body_text()))?;

    let message = state
        .service
        .add_or_toggle_reaction(discussion_id, message_id, &actor, &body.emoji, deadline)
        .await?;

    Ok(Json(json!({ "success": true, "message": message })))
}

async fn delete_message(
    State(state): State<AppState>,
    Actor(actor): Actor,
    CallDeadline(deadline): CallDeadline,
    Path((discussion_id, message_id)): Path<(String, String)>,
) -> DiscussionResult<impl IntoResponse> {
    let discussion_id = parse_id(&discussion_id, "discussion")?;
    let message_id = parse_id(&message_id, "message")?;

    state
        .service
        .delete_message(discussion_id, message_id, &actor, deadline)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Message deleted successfully",
    })))
}

#[derive(Deserialize)]
struct PinBody {
    #[serde(default = "default_pinned")]
    pinned: bool,
}

fn default_pinned() -> bool {
    true
}

async fn set_pinned(
    State(state): State<AppState>,
    Actor(actor): Actor,
    CallDeadline(deadline): CallDeadline,
    Path(discussion_id): Path<String>,
    body: Result<Json<PinBody>, JsonRejection>,
) -> DiscussionResult<impl IntoResponse> {
    let discussion_id = parse_id(&discussion_id, "discussion")?;
    let Json(body) = body.map_err(|e| DiscussionError::invalid(e.body_text()))?;

    let discussion = state
        .service
        .set_pinned(discussion_id, &actor, body.pinned, deadline)
        .await?;

    Ok(Json(json!({ "success": true, "discussion": discussion })))
}

async fn route_not_found() -> DiscussionError {
    DiscussionError::not_found("Route not found")
}

fn parse_id(raw: &str, what: &str) -> DiscussionResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| DiscussionError::invalid(format!("Invalid {what} id")))
}

fn parse_number(raw: Option<String>, name: &str, default: i64) -> DiscussionResult<i64> {
    match non_empty(raw) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| DiscussionError::invalid(format!("{name} must be an integer"))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

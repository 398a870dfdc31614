//! HTTP API layer exposing the node lifecycle endpoints.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use plan_hub_core::node::{AppUser, Node, Role, Snapshot, ROOT_ID};
use plan_hub_core::patch::Patch;
use plan_hub_core::service::{CreateNode, GetOptions, NodeView, UpdateNode};
use plan_hub_core::storage::ExpectedVersion;
use plan_hub_core::{HubError, NodeService};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

/// Authenticated principal taken from request headers.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user: AppUser,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let user_id = headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError(HubError::Unauthorized("missing X-User-Id".into())))?;
        let role = match headers.get("X-User-Role").and_then(|v| v.to_str().ok()) {
            Some(r) if r.eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        };
        Ok(Self {
            user: AppUser {
                id: user_id.to_string(),
                role,
            },
        })
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: NodeService,
}

/// Error body: `{"category": ..., "message": ...}`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub category: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub HubError);

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &HubError) -> StatusCode {
    match err {
        HubError::NotFound(_) => StatusCode::NOT_FOUND,
        HubError::Forbidden(_) => StatusCode::FORBIDDEN,
        HubError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        HubError::BadRequest(_)
        | HubError::InvalidInput(_)
        | HubError::InvalidPatch(_)
        | HubError::MalformedId(_)
        | HubError::InvalidAccessControl(_) => StatusCode::BAD_REQUEST,
        HubError::VersionConflict { .. } | HubError::DocumentExists(_) | HubError::TrashState(_) => {
            StatusCode::CONFLICT
        }
        HubError::CyclicDependency(_)
        | HubError::InvalidDependency(_)
        | HubError::DanglingReference(_) => StatusCode::UNPROCESSABLE_ENTITY,
        HubError::FailedDependency(_) => StatusCode::FAILED_DEPENDENCY,
        HubError::MoveFailed { .. } | HubError::CascadeFailed { .. } | HubError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if self.0.is_internal() {
            error!(error = %self.0, "request failed");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorBody {
            category: self.0.category().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteParams {
    #[serde(default)]
    remove: bool,
}

#[derive(Serialize, Deserialize)]
struct Affected {
    affected: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchRequest {
    version_number: ExpectedVersion,
    #[serde(default)]
    patch: Patch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveRequest {
    parent_id: String,
    version_number: ExpectedVersion,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CopyRequest {
    parent_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseRequest {
    version_number: ExpectedVersion,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Deserialize)]
struct CommentRequest {
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestoreVersionRequest {
    version_number: ExpectedVersion,
}

pub fn router(service: NodeService) -> Router {
    let state = AppState { service };
    Router::new()
        .route("/nodes", get(get_root).post(create_node))
        .route(
            "/nodes/{id}",
            get(get_node).put(update_node).delete(delete_node),
        )
        .route("/nodes/{id}/content", axum::routing::patch(patch_content))
        .route("/nodes/{id}/move", post(move_node))
        .route("/nodes/{id}/copy", post(copy_node))
        .route("/nodes/{id}/restore", post(restore_node))
        .route("/nodes/{id}/history", get(history))
        .route("/nodes/{id}/releases", get(releases).post(create_release))
        .route("/snapshots/{id}/comment", put(update_comment))
        .route("/snapshots/{id}/restore", post(restore_version))
        .route("/trash", get(list_trash))
        .route("/health", get(|| async { "OK" }))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

async fn get_root(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<NodeView>> {
    let options = GetOptions {
        trashed: false,
        children: true,
    };
    Ok(Json(state.service.get(&auth.user, ROOT_ID, options).await?))
}

async fn create_node(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateNode>,
) -> ApiResult<(StatusCode, Json<Node>)> {
    let node = state.service.create(&auth.user, req).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn get_node(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Query(options): Query<GetOptions>,
) -> ApiResult<Json<NodeView>> {
    Ok(Json(state.service.get(&auth.user, &id, options).await?))
}

async fn update_node(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateNode>,
) -> ApiResult<Json<Node>> {
    Ok(Json(state.service.update(&auth.user, &id, req).await?))
}

async fn delete_node(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<Affected>> {
    let affected = state.service.delete(&auth.user, &id, params.remove).await?;
    Ok(Json(Affected { affected }))
}

async fn patch_content(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<PatchRequest>,
) -> ApiResult<Json<Node>> {
    Ok(Json(
        state
            .service
            .patch_content(&auth.user, &id, req.version_number, &req.patch)
            .await?,
    ))
}

async fn move_node(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<Json<Node>> {
    Ok(Json(
        state
            .service
            .move_node(&auth.user, &id, &req.parent_id, req.version_number)
            .await?,
    ))
}

async fn copy_node(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<CopyRequest>,
) -> ApiResult<(StatusCode, Json<Node>)> {
    let copy = state.service.copy(&auth.user, &id, &req.parent_id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

async fn restore_node(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Node>> {
    Ok(Json(state.service.restore_from_trash(&auth.user, &id).await?))
}

async fn history(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Snapshot>>> {
    Ok(Json(state.service.history(&auth.user, &id).await?))
}

async fn releases(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Snapshot>>> {
    Ok(Json(state.service.releases(&auth.user, &id).await?))
}

async fn create_release(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<ReleaseRequest>,
) -> ApiResult<(StatusCode, Json<Snapshot>)> {
    let release = state
        .service
        .create_release(&auth.user, &id, req.version_number, req.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(release)))
}

async fn update_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<Json<Snapshot>> {
    Ok(Json(
        state
            .service
            .update_comment(&auth.user, &id, req.comment)
            .await?,
    ))
}

async fn restore_version(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<RestoreVersionRequest>,
) -> ApiResult<Json<Node>> {
    Ok(Json(
        state
            .service
            .restore_version(&auth.user, &id, req.version_number)
            .await?,
    ))
}

async fn list_trash(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<Node>>> {
    Ok(Json(state.service.list_trash(&auth.user).await?))
}

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::response::Json;
use axum::Form;
use bytes::Bytes;
use keyscope_projection::ProjectionService;
use keyscope_types::{Identity, Node};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::IdentityExtractor;
use crate::error::{ServerError, ServerResult};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProjectionService>,
    pub identities: Arc<dyn IdentityExtractor>,
}

/// The identity a request acts as.
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state.identities.extract(&parts.headers).await.map(Caller)
    }
}

#[derive(Debug, Serialize)]
pub struct NodeBody {
    pub node: Node,
}

#[derive(Debug, Deserialize)]
pub struct GetParams {
    pub key: String,
    #[serde(default)]
    pub prefix: bool,
}

#[derive(Debug, Deserialize)]
pub struct PathParams {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct PutForm {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub ttl: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    pub key: String,
    #[serde(default)]
    pub dir: bool,
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn separator_handler(State(state): State<AppState>) -> String {
    state.service.separator().to_string()
}

/// Cluster summary for the connect screen.
///
/// With auth on, a caller without credentials is told to log in and only
/// the root user may connect; both answers are `200` with a `status` the
/// front end switches on.
pub async fn connect_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ServerResult<Json<Value>> {
    let config = state.service.config();
    if config.use_auth {
        if identity.is_anonymous() || identity.secret.is_empty() {
            return Ok(Json(json!({ "status": "login" })));
        }
        if identity.username != config.root_username {
            tracing::debug!(%identity, "connect refused for non-root user");
            return Ok(Json(json!({ "status": "root" })));
        }
    }
    let info = state.service.info(&identity).await?;
    tracing::info!(%identity, version = %info.version, "client connected");
    Ok(Json(json!({ "status": "running", "info": info })))
}

/// Single key, or with `prefix=true` the subtree under it.
pub async fn get_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(params): Query<GetParams>,
) -> ServerResult<Json<NodeBody>> {
    let node = state
        .service
        .project(&identity, &params.key, params.prefix)
        .await?;
    Ok(Json(NodeBody { node }))
}

pub async fn get_path_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(params): Query<PathParams>,
) -> ServerResult<Json<NodeBody>> {
    let node = state.service.project(&identity, &params.key, true).await?;
    Ok(Json(NodeBody { node }))
}

pub async fn put_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Form(form): Form<PutForm>,
) -> ServerResult<Json<NodeBody>> {
    let ttl = parse_ttl(form.ttl.as_deref())?;
    let node = state
        .service
        .write(&identity, &form.key, Bytes::from(form.value), ttl)
        .await?;
    Ok(Json(NodeBody { node }))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Form(form): Form<DeleteForm>,
) -> ServerResult<Json<Value>> {
    state.service.remove(&identity, &form.key, form.dir).await?;
    Ok(Json(json!({ "key": form.key, "deleted": true })))
}

/// An absent or blank TTL means "no lease".
fn parse_ttl(raw: Option<&str>) -> ServerResult<Option<i64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| ServerError::BadRequest(format!("ttl `{text}` is not an integer"))),
    }
}

//! Public read endpoints.
//!
//! Every handler serves from the staleness controller: reads prefer a
//! possibly-stale snapshot over an error, and only "no cache anywhere plus
//! a dead origin" surfaces as 503.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::application::filters::{all_tags, by_person, by_tag, sort_by_date};
use crate::application::share::ShareScope;
use crate::domain::projects::ProjectRecord;

use super::AppState;
use super::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/{id}", get(get_project))
        .route("/projects/tag/{tag}", get(list_by_tag))
        .route("/projects/person/{name}", get(list_by_person))
        .route("/tags", get(list_tags))
        .route("/share/{scope}", get(share_card))
        .route("/share/{scope}/{key}", get(share_card_with_key))
}

async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectRecord>>, ApiError> {
    let projects = state.controller.projects().await?;
    Ok(Json(sort_by_date(&projects)))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectRecord>, ApiError> {
    match state.controller.project_by_id(&id).await? {
        Some(project) => Ok(Json(project)),
        None => Err(ApiError::not_found("Unknown project")),
    }
}

async fn list_by_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<ProjectRecord>>, ApiError> {
    let projects = state.controller.projects().await?;
    let matched: Vec<ProjectRecord> = by_tag(&projects, &tag).into_iter().cloned().collect();
    Ok(Json(sort_by_date(&matched)))
}

async fn list_by_person(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ProjectRecord>>, ApiError> {
    let projects = state.controller.projects().await?;
    let matched: Vec<ProjectRecord> = by_person(&projects, &name).into_iter().cloned().collect();
    Ok(Json(sort_by_date(&matched)))
}

async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let projects = state.controller.projects().await?;
    Ok(Json(all_tags(&projects)))
}

async fn share_card(
    State(state): State<AppState>,
    Path(scope): Path<String>,
) -> Result<impl IntoResponse + use<>, ApiError> {
    render_share(state, &scope, None).await
}

async fn share_card_with_key(
    State(state): State<AppState>,
    Path((scope, key)): Path<(String, String)>,
) -> Result<impl IntoResponse + use<>, ApiError> {
    render_share(state, &scope, Some(&key)).await
}

async fn render_share(
    state: AppState,
    scope: &str,
    key: Option<&str>,
) -> Result<impl IntoResponse + use<>, ApiError> {
    let scope =
        ShareScope::from_parts(scope, key).ok_or_else(|| ApiError::not_found("Unknown share scope"))?;

    let projects = state.controller.projects().await?;
    let bytes = state.share.card(&scope, &projects).await?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

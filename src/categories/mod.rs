use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::core::middleware::Principal;
use crate::core::shared::error::{CrmError, CrmResult};
use crate::core::shared::models::{limits, Category, CategoryChanges, NewCategory};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{ensure_max_len, is_blank, non_blank};

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategorySearchQuery {
    #[serde(default)]
    pub name: String,
}

fn category_not_found(id: i64) -> CrmError {
    CrmError::not_found(format!("Category not found with id: {id}"))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> CrmResult<Json<Vec<Category>>> {
    Ok(Json(state.store.list_categories().await?))
}

/// `GET /api/categories/search?name=ware`, case-insensitive substring match.
pub async fn search_categories(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Query(query): Query<CategorySearchQuery>,
) -> CrmResult<Json<Vec<Category>>> {
    if is_blank(&query.name) {
        return Ok(Json(state.store.list_categories().await?));
    }
    Ok(Json(state.store.search_categories(query.name.trim()).await?))
}

pub async fn get_category(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<Json<Category>> {
    state
        .store
        .find_category(id)
        .await?
        .map(Json)
        .ok_or_else(|| category_not_found(id))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CategoryRequest>,
) -> CrmResult<(StatusCode, Json<Category>)> {
    principal.require_staff()?;
    if is_blank(&req.name) {
        return Err(CrmError::validation("Category name is required"));
    }
    ensure_max_len("name", Some(req.name.trim()), limits::NAME)?;

    let now = Utc::now();
    let category = state
        .store
        .create_category(NewCategory {
            name: req.name.trim().to_string(),
            description: non_blank(req.description),
            created_at: now,
            updated_at: now,
        })
        .await?;
    info!("Category '{}' created by {}", category.name, principal.identity);
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<CategoryRequest>,
) -> CrmResult<Json<Category>> {
    principal.require_staff()?;
    if is_blank(&req.name) {
        return Err(CrmError::validation("Category name is required"));
    }
    ensure_max_len("name", Some(req.name.trim()), limits::NAME)?;

    let changes = CategoryChanges {
        name: Some(req.name.trim().to_string()),
        description: non_blank(req.description),
        updated_at: Some(Utc::now()),
    };
    state
        .store
        .update_category(id, changes)
        .await?
        .map(Json)
        .ok_or_else(|| category_not_found(id))
}

pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> CrmResult<StatusCode> {
    principal.require_staff()?;
    if state.store.delete_category(id).await? {
        info!("Category {id} deleted by {}", principal.identity);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(category_not_found(id))
    }
}

pub fn configure_categories_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/search", get(search_categories))
        .route(
            "/api/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
}

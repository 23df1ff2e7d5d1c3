//! Plant API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use super::{required, success, ApiResponse, ApiResult};
use crate::auth::{CurrentUser, MaybeUser};
use crate::cache::CacheQuery;
use crate::config::parse_timezone;
use crate::errors::AppError;
use crate::models::{
    Plant, PlantDetail, PlantWithTodayTask, RegisterPlantRequest, RegisteredPlant,
    UpdatePlantRequest,
};
use crate::schedule::day_window;
use crate::AppState;

/// Cache owner for lists that look the same to every caller.
const SHARED_CACHE_KEY: &str = "*";

/// Optional timezone selector shared by the "today" endpoints.
#[derive(Debug, Deserialize)]
pub struct TimezoneQuery {
    pub tz: Option<String>,
}

/// GET /api/plants - List visible plants, newest first.
pub async fn list_plants(State(state): State<AppState>) -> ApiResult<Vec<Plant>> {
    if let Some(plants) = state
        .plant_cache
        .get(&CacheQuery::Plants, SHARED_CACHE_KEY)
        .await
    {
        return success(plants);
    }

    let epoch = state.plant_cache.epoch();
    let plants = state.repo.list_plants().await?;
    state
        .plant_cache
        .insert_if_current(CacheQuery::Plants, SHARED_CACHE_KEY, plants.clone(), epoch)
        .await;
    success(plants)
}

/// GET /api/plants/{slug} - Get a plant by slug, with the caller's care frequency.
pub async fn get_plant(
    State(state): State<AppState>,
    MaybeUser(user_id): MaybeUser,
    Path(slug): Path<String>,
) -> ApiResult<PlantDetail> {
    let plant = state
        .repo
        .get_plant_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Plant '{}' not found", slug)))?;

    let frequency = match user_id {
        Some(user_id) => state
            .repo
            .find_user_plant(&user_id, &plant.id)
            .await?
            .map(|up| up.frequency),
        None => None,
    };

    success(PlantDetail { plant, frequency })
}

/// POST /api/plants - Register a plant with its care schedule and first task.
pub async fn register_plant(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(mut request): Json<RegisterPlantRequest>,
) -> ApiResult<RegisteredPlant> {
    request.name = required(&request.name, "Name")?;

    let registered = state
        .repo
        .register_plant(&user_id, &request, state.config.default_timezone, Utc::now())
        .await?;

    state.plant_cache.clear();
    state.task_cache.invalidate_user(&user_id);

    Ok(ApiResponse::created(registered))
}

/// PUT /api/plants/{id} - Update a plant; the slug follows the new name.
pub async fn update_plant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut request): Json<UpdatePlantRequest>,
) -> ApiResult<Plant> {
    request.name = required(&request.name, "Name")?;

    let plant = state.repo.update_plant(&id, &request).await?;

    // Names show up in every user's task list
    state.plant_cache.clear();
    state.task_cache.clear();

    success(plant)
}

/// DELETE /api/plants/{id} - Delete a plant and everything scheduled for it.
pub async fn delete_plant(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.repo.delete_plant(&id).await?;

    state.plant_cache.clear();
    state.task_cache.clear();

    success(())
}

/// GET /api/plants/today - The caller's plants with today's pending task, if any.
pub async fn plants_with_today_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<TimezoneQuery>,
) -> ApiResult<Vec<PlantWithTodayTask>> {
    let tz = match query.tz.as_deref() {
        Some(name) => parse_timezone(name)?,
        None => state.config.default_timezone,
    };
    let window = day_window(Utc::now(), &tz)?;

    success(state.repo.plants_with_tasks_between(&user_id, window).await?)
}

//! Care task API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;

use super::{required, success, ApiResult, TimezoneQuery};
use crate::auth::CurrentUser;
use crate::cache::CacheQuery;
use crate::config::parse_timezone;
use crate::models::{CompleteTaskRequest, CompletionResult, DailyTask};
use crate::schedule::{day_window, local_date};
use crate::AppState;

/// GET /api/tasks/today - Pending tasks due today for the caller, earliest first.
///
/// "Today" is the local calendar day in `tz`, falling back to the configured timezone.
pub async fn list_tasks_today(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<TimezoneQuery>,
) -> ApiResult<Vec<DailyTask>> {
    let tz = match query.tz.as_deref() {
        Some(name) => parse_timezone(name)?,
        None => state.config.default_timezone,
    };
    let now = Utc::now();
    let cache_query = CacheQuery::TasksDue {
        date: local_date(now, &tz),
        timezone: tz.name().to_string(),
    };

    if let Some(tasks) = state.task_cache.get(&cache_query, &user_id).await {
        return success(tasks);
    }

    let epoch = state.task_cache.epoch();
    let window = day_window(now, &tz)?;
    let tasks = state.repo.tasks_due_between(&user_id, window).await?;
    state
        .task_cache
        .insert_if_current(cache_query, &user_id, tasks.clone(), epoch)
        .await;
    success(tasks)
}

/// POST /api/tasks/{id}/complete - Mark a task done and schedule the next one.
pub async fn complete_task(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(task_id): Path<String>,
    Json(request): Json<CompleteTaskRequest>,
) -> ApiResult<CompletionResult> {
    let user_plant_id = required(&request.user_plant_id, "userPlantId")?;

    let result = state
        .repo
        .complete_task(&user_id, &task_id, &user_plant_id, request.due_at, Utc::now())
        .await;

    // Drop the caller's lists even on failure: a conflict means they are stale
    state.task_cache.invalidate_user(&user_id);

    success(result?)
}

//! Database repository for plants, care schedules and care tasks.
//!
//! Multi-row writes run inside a transaction; the care task state change is a
//! conditional update so a task can only be completed once.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    normalize_optional, slugify, CareFrequency, CareTask, CompletionResult, DailyTask, Plant,
    PlantWithTodayTask, RegisterPlantRequest, RegisteredPlant, TaskStatus, UpdatePlantRequest,
    UserPlant,
};
use crate::schedule::{first_due_at, local_date, next_due_at_in, DayWindow};

const PLANT_COLUMNS: &str =
    "id, slug, name, species, location, image_url, is_hidden, created_at";
const USER_PLANT_COLUMNS: &str =
    "id, user_id, plant_id, frequency, timezone, start_date, created_at";
const CARE_TASK_COLUMNS: &str = "id, user_plant_id, due_at, status, completed_at, created_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== PLANT OPERATIONS ====================

    /// List visible plants, newest first.
    pub async fn list_plants(&self) -> Result<Vec<Plant>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM plants WHERE is_hidden = 0 ORDER BY created_at DESC",
            PLANT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(plant_from_row).collect()
    }

    /// Get a plant by ID.
    pub async fn get_plant(&self, id: &str) -> Result<Option<Plant>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM plants WHERE id = ?", PLANT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(plant_from_row).transpose()
    }

    /// Get a plant by its slug.
    pub async fn get_plant_by_slug(&self, slug: &str) -> Result<Option<Plant>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM plants WHERE slug = ?", PLANT_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(plant_from_row).transpose()
    }

    /// Register a plant for a user: the plant, its care schedule and the first task
    /// (today 09:00 in `timezone`) are written together or not at all.
    pub async fn register_plant(
        &self,
        user_id: &str,
        request: &RegisterPlantRequest,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> Result<RegisteredPlant, AppError> {
        let name = request.name.trim().to_string();
        let slug = slugify(&name);
        if slug.is_empty() {
            return Err(AppError::Validation(
                "Name must contain at least one letter or digit".to_string(),
            ));
        }

        let plant = Plant {
            id: uuid::Uuid::new_v4().to_string(),
            slug,
            name,
            species: normalize_optional(request.species.as_deref()),
            location: normalize_optional(request.location.as_deref()),
            image_url: None,
            is_hidden: false,
            created_at: now,
        };
        let user_plant = UserPlant {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            plant_id: plant.id.clone(),
            frequency: request.frequency,
            timezone: timezone.name().to_string(),
            start_date: local_date(now, &timezone),
            created_at: now,
        };
        let first_task = CareTask {
            id: uuid::Uuid::new_v4().to_string(),
            user_plant_id: user_plant.id.clone(),
            due_at: first_due_at(now, &timezone)?,
            status: TaskStatus::Pending,
            completed_at: None,
            created_at: now,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO plants (id, slug, name, species, location, image_url, is_hidden, created_at) VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&plant.id)
        .bind(&plant.slug)
        .bind(&plant.name)
        .bind(&plant.species)
        .bind(&plant.location)
        .bind(&plant.image_url)
        .bind(format_ts(&plant.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO user_plants (id, user_id, plant_id, frequency, timezone, start_date, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user_plant.id)
        .bind(&user_plant.user_id)
        .bind(&user_plant.plant_id)
        .bind(user_plant.frequency.as_str())
        .bind(&user_plant.timezone)
        .bind(user_plant.start_date.to_string())
        .bind(format_ts(&user_plant.created_at))
        .execute(&mut *tx)
        .await?;

        insert_task(&mut tx, &first_task).await?;

        tx.commit().await?;

        tracing::info!(
            "Registered plant {} ({}) for user {} with {} care",
            plant.slug,
            plant.id,
            user_id,
            user_plant.frequency
        );

        Ok(RegisteredPlant {
            plant,
            user_plant,
            first_task,
        })
    }

    /// Update a plant's editable fields; the slug is re-derived from the new name.
    pub async fn update_plant(
        &self,
        id: &str,
        request: &UpdatePlantRequest,
    ) -> Result<Plant, AppError> {
        let name = request.name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(AppError::Validation(
                "Name must contain at least one letter or digit".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE plants SET name = ?, slug = ?, species = ?, location = ?, is_hidden = COALESCE(?, is_hidden) WHERE id = ?",
        )
        .bind(name)
        .bind(&slug)
        .bind(normalize_optional(request.species.as_deref()))
        .bind(normalize_optional(request.location.as_deref()))
        .bind(request.is_hidden.map(|b| b as i32))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Plant {} not found", id)));
        }

        self.get_plant(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plant {} not found", id)))
    }

    /// Delete a plant together with its care schedules and their tasks.
    pub async fn delete_plant(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let tasks = sqlx::query(
            "DELETE FROM care_tasks WHERE user_plant_id IN (SELECT id FROM user_plants WHERE plant_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let user_plants = sqlx::query("DELETE FROM user_plants WHERE plant_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM plants WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Plant {} not found", id)));
        }

        tx.commit().await?;

        tracing::info!(
            "Deleted plant {} with {} care schedules and {} tasks",
            id,
            user_plants.rows_affected(),
            tasks.rows_affected()
        );
        Ok(())
    }

    // ==================== USER PLANT OPERATIONS ====================

    /// Get a care schedule by ID.
    #[cfg(test)]
    pub async fn get_user_plant(&self, id: &str) -> Result<Option<UserPlant>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_plants WHERE id = ?",
            USER_PLANT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_plant_from_row).transpose()
    }

    /// Get the user's care schedule for a plant, if they track it.
    pub async fn find_user_plant(
        &self,
        user_id: &str,
        plant_id: &str,
    ) -> Result<Option<UserPlant>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_plants WHERE user_id = ? AND plant_id = ? ORDER BY created_at LIMIT 1",
            USER_PLANT_COLUMNS
        ))
        .bind(user_id)
        .bind(plant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_plant_from_row).transpose()
    }

    // ==================== CARE TASK OPERATIONS ====================

    /// Get a care task by ID.
    #[cfg(test)]
    pub async fn get_task(&self, id: &str) -> Result<Option<CareTask>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM care_tasks WHERE id = ?",
            CARE_TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(care_task_from_row).transpose()
    }

    /// All tasks of one care schedule, earliest due first.
    #[cfg(test)]
    pub async fn list_tasks_for_user_plant(
        &self,
        user_plant_id: &str,
    ) -> Result<Vec<CareTask>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM care_tasks WHERE user_plant_id = ? ORDER BY due_at, created_at",
            CARE_TASK_COLUMNS
        ))
        .bind(user_plant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(care_task_from_row).collect()
    }

    /// Pending tasks of the user's plants due inside `window`, earliest first.
    pub async fn tasks_due_between(
        &self,
        user_id: &str,
        window: DayWindow,
    ) -> Result<Vec<DailyTask>, AppError> {
        let rows = sqlx::query(
            r#"SELECT ct.id AS task_id, ct.user_plant_id, ct.due_at,
                      p.name AS plant_name, p.species AS plant_species,
                      p.image_url AS plant_image_url
               FROM care_tasks ct
               JOIN user_plants up ON up.id = ct.user_plant_id
               JOIN plants p ON p.id = up.plant_id
               WHERE ct.status = 'pending'
                 AND ct.due_at >= ?
                 AND ct.due_at <= ?
                 AND up.user_id = ?
               ORDER BY ct.due_at ASC"#,
        )
        .bind(format_ts(&window.start))
        .bind(format_ts(&window.end))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(daily_task_from_row).collect()
    }

    /// The user's visible plants, each with its earliest pending task inside `window`.
    pub async fn plants_with_tasks_between(
        &self,
        user_id: &str,
        window: DayWindow,
    ) -> Result<Vec<PlantWithTodayTask>, AppError> {
        let rows = sqlx::query(
            r#"SELECT up.id AS user_plant_id,
                      p.id, p.slug, p.name, p.species, p.location, p.image_url,
                      p.is_hidden, p.created_at
               FROM user_plants up
               JOIN plants p ON p.id = up.plant_id
               WHERE up.user_id = ? AND p.is_hidden = 0
               ORDER BY p.created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut due_today: HashMap<String, DailyTask> = HashMap::new();
        for task in self.tasks_due_between(user_id, window).await? {
            // Results are ordered by due_at, so the first one per schedule wins
            due_today.entry(task.user_plant_id.clone()).or_insert(task);
        }

        rows.iter()
            .map(|row| -> Result<PlantWithTodayTask, AppError> {
                let user_plant_id: String = row.get("user_plant_id");
                let task = due_today.get(&user_plant_id);
                Ok(PlantWithTodayTask {
                    plant: plant_from_row(row)?,
                    has_task_today: task.is_some(),
                    task_id: task.map(|t| t.task_id.clone()),
                    due_at: task.map(|t| t.due_at),
                    user_plant_id,
                })
            })
            .collect()
    }

    /// Mark a task done and schedule the next occurrence, atomically.
    ///
    /// The status change only applies to a pending row with the given due instant that
    /// belongs to `user_id`, so a repeated or concurrent completion affects zero rows
    /// and is rejected instead of scheduling a second follow-up task.
    pub async fn complete_task(
        &self,
        user_id: &str,
        task_id: &str,
        user_plant_id: &str,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CompletionResult, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. pending -> done
        let updated = sqlx::query(
            r#"UPDATE care_tasks
               SET status = 'done', completed_at = ?
               WHERE id = ?
                 AND user_plant_id = ?
                 AND due_at = ?
                 AND status = 'pending'
                 AND user_plant_id IN (SELECT id FROM user_plants WHERE user_id = ?)"#,
        )
        .bind(format_ts(&now))
        .bind(task_id)
        .bind(user_plant_id)
        .bind(format_ts(&due_at))
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(explain_rejected_completion(&mut tx, user_id, task_id, user_plant_id).await);
        }
        tracing::debug!("Task {} marked done", task_id);

        // 2. resolve the schedule
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_plants WHERE id = ?",
            USER_PLANT_COLUMNS
        ))
        .bind(user_plant_id)
        .fetch_optional(&mut *tx)
        .await?;
        let user_plant = row
            .as_ref()
            .map(user_plant_from_row)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("User plant {} not found", user_plant_id)))?;

        // 3. next occurrence on the schedule's wall clock
        let next_due = next_due_at_in(due_at, user_plant.frequency, &user_plant.tz()?)?;
        tracing::debug!(
            "Next {} occurrence for user plant {} due at {}",
            user_plant.frequency,
            user_plant_id,
            next_due
        );

        // 4. insert the next pending task
        let next = CareTask {
            id: uuid::Uuid::new_v4().to_string(),
            user_plant_id: user_plant_id.to_string(),
            due_at: next_due,
            status: TaskStatus::Pending,
            completed_at: None,
            created_at: now,
        };
        insert_task(&mut tx, &next).await?;

        let completed_row = sqlx::query(&format!(
            "SELECT {} FROM care_tasks WHERE id = ?",
            CARE_TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_one(&mut *tx)
        .await?;
        let completed = care_task_from_row(&completed_row)?;

        tx.commit().await?;

        tracing::info!(
            "Completed task {} for user plant {}; next due {}",
            task_id,
            user_plant_id,
            next.due_at
        );

        Ok(CompletionResult { completed, next })
    }
}

/// Work out why the conditional completion update matched nothing.
async fn explain_rejected_completion(
    conn: &mut SqliteConnection,
    user_id: &str,
    task_id: &str,
    user_plant_id: &str,
) -> AppError {
    let row = sqlx::query(
        r#"SELECT ct.status
           FROM care_tasks ct
           JOIN user_plants up ON up.id = ct.user_plant_id
           WHERE ct.id = ? AND ct.user_plant_id = ? AND up.user_id = ?"#,
    )
    .bind(task_id)
    .bind(user_plant_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await;

    match row {
        Ok(None) => AppError::NotFound(format!("Care task {} not found", task_id)),
        Ok(Some(row)) => match row.get::<String, _>("status").parse::<TaskStatus>() {
            Ok(TaskStatus::Done) => {
                AppError::Conflict(format!("Care task {} is already done", task_id))
            }
            Ok(TaskStatus::Pending) => AppError::Conflict(format!(
                "Care task {} is due at a different time than submitted",
                task_id
            )),
            Err(e) => e,
        },
        Err(e) => e.into(),
    }
}

async fn insert_task(conn: &mut SqliteConnection, task: &CareTask) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO care_tasks (id, user_plant_id, due_at, status, completed_at, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&task.id)
    .bind(&task.user_plant_id)
    .bind(format_ts(&task.due_at))
    .bind(task.status.as_str())
    .bind(task.completed_at.as_ref().map(format_ts))
    .bind(format_ts(&task.created_at))
    .execute(conn)
    .await?;
    Ok(())
}

// Helper functions for row conversion

/// Fixed-width UTC text so that string order equals time order in SQL comparisons.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(column: &str, value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("Invalid timestamp in {}: {}", column, e)))
}

fn plant_from_row(row: &SqliteRow) -> Result<Plant, AppError> {
    let is_hidden: i32 = row.get("is_hidden");
    let created_at: String = row.get("created_at");
    Ok(Plant {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        species: row.get("species"),
        location: row.get("location"),
        image_url: row.get("image_url"),
        is_hidden: is_hidden != 0,
        created_at: parse_ts("plants.created_at", &created_at)?,
    })
}

fn user_plant_from_row(row: &SqliteRow) -> Result<UserPlant, AppError> {
    let frequency: String = row.get("frequency");
    let start_date: String = row.get("start_date");
    let created_at: String = row.get("created_at");
    Ok(UserPlant {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plant_id: row.get("plant_id"),
        frequency: frequency.parse::<CareFrequency>()?,
        timezone: row.get("timezone"),
        start_date: start_date.parse::<NaiveDate>().map_err(|e| {
            AppError::Internal(format!("Invalid date in user_plants.start_date: {}", e))
        })?,
        created_at: parse_ts("user_plants.created_at", &created_at)?,
    })
}

fn care_task_from_row(row: &SqliteRow) -> Result<CareTask, AppError> {
    let status: String = row.get("status");
    let due_at: String = row.get("due_at");
    let completed_at: Option<String> = row.get("completed_at");
    let created_at: String = row.get("created_at");
    Ok(CareTask {
        id: row.get("id"),
        user_plant_id: row.get("user_plant_id"),
        due_at: parse_ts("care_tasks.due_at", &due_at)?,
        status: status.parse::<TaskStatus>()?,
        completed_at: completed_at
            .map(|s| parse_ts("care_tasks.completed_at", &s))
            .transpose()?,
        created_at: parse_ts("care_tasks.created_at", &created_at)?,
    })
}

fn daily_task_from_row(row: &SqliteRow) -> Result<DailyTask, AppError> {
    let due_at: String = row.get("due_at");
    Ok(DailyTask {
        task_id: row.get("task_id"),
        user_plant_id: row.get("user_plant_id"),
        due_at: parse_ts("care_tasks.due_at", &due_at)?,
        plant_name: row.get("plant_name"),
        plant_species: row.get("plant_species"),
        plant_image_url: row.get("plant_image_url"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::schedule::day_window;
    use tempfile::TempDir;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    async fn setup() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .expect("Failed to init DB");
        (Repository::new(pool), temp_dir)
    }

    fn register_request(name: &str, frequency: CareFrequency) -> RegisterPlantRequest {
        RegisterPlantRequest {
            name: name.to_string(),
            species: Some("Ficus lyrata".to_string()),
            location: Some("  ".to_string()),
            frequency,
        }
    }

    /// Register a plant and move its first task to `due_at`.
    async fn plant_with_task_due(
        repo: &Repository,
        user_id: &str,
        name: &str,
        frequency: CareFrequency,
        due_at: &str,
    ) -> RegisteredPlant {
        let registered = repo
            .register_plant(
                user_id,
                &register_request(name, frequency),
                chrono_tz::UTC,
                at("2024-03-01T12:00:00Z"),
            )
            .await
            .unwrap();
        sqlx::query("UPDATE care_tasks SET due_at = ? WHERE id = ?")
            .bind(due_at)
            .bind(&registered.first_task.id)
            .execute(&repo.pool)
            .await
            .unwrap();
        registered
    }

    #[test]
    fn test_format_ts_is_fixed_width() {
        assert_eq!(format_ts(&at("2024-03-10T09:00:00Z")), "2024-03-10T09:00:00.000Z");
        assert_eq!(
            format_ts(&at("2024-03-10T09:00:00.5+01:00")),
            "2024-03-10T08:00:00.500Z"
        );
    }

    #[tokio::test]
    async fn test_register_plant_creates_schedule_and_first_task() {
        let (repo, _dir) = setup().await;
        let now = at("2024-03-10T15:00:00Z");

        let registered = repo
            .register_plant(
                "user-1",
                &register_request("  Fiddle Leaf Fig ", CareFrequency::Weekly),
                chrono_tz::Europe::Amsterdam,
                now,
            )
            .await
            .unwrap();

        assert_eq!(registered.plant.name, "Fiddle Leaf Fig");
        assert_eq!(registered.plant.slug, "fiddle-leaf-fig");
        assert_eq!(registered.plant.location, None);
        assert_eq!(registered.user_plant.timezone, "Europe/Amsterdam");
        assert_eq!(
            registered.user_plant.start_date,
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
        assert_eq!(registered.first_task.due_at, at("2024-03-10T08:00:00Z"));
        assert_eq!(registered.first_task.status, TaskStatus::Pending);

        let stored = repo.get_user_plant(&registered.user_plant.id).await.unwrap();
        assert_eq!(stored, Some(registered.user_plant.clone()));
        let by_slug = repo.get_plant_by_slug("fiddle-leaf-fig").await.unwrap();
        assert_eq!(by_slug, Some(registered.plant.clone()));
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_conflict() {
        let (repo, _dir) = setup().await;
        let now = at("2024-03-10T15:00:00Z");
        let request = register_request("Pilea", CareFrequency::Daily);

        repo.register_plant("user-1", &request, chrono_tz::UTC, now)
            .await
            .unwrap();
        let err = repo
            .register_plant("user-1", &request, chrono_tz::UTC, now)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        // The failed registration left nothing behind
        assert_eq!(repo.list_plants().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_task_schedules_next_occurrence() {
        let (repo, _dir) = setup().await;
        let registered = plant_with_task_due(
            &repo,
            "user-1",
            "Monstera",
            CareFrequency::Weekly,
            "2024-03-10T09:00:00.000Z",
        )
        .await;
        let task_id = &registered.first_task.id;
        let user_plant_id = &registered.user_plant.id;
        let now = at("2024-03-10T10:00:00Z");

        let result = repo
            .complete_task("user-1", task_id, user_plant_id, at("2024-03-10T09:00:00Z"), now)
            .await
            .unwrap();

        assert_eq!(result.completed.status, TaskStatus::Done);
        assert_eq!(result.completed.completed_at, Some(now));
        assert_eq!(result.next.status, TaskStatus::Pending);
        assert_eq!(result.next.due_at, at("2024-03-17T09:00:00Z"));

        let tasks = repo.list_tasks_for_user_plant(user_plant_id).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, *task_id);
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert_eq!(tasks[1].status, TaskStatus::Pending);
        assert_eq!(tasks[1].due_at, at("2024-03-17T09:00:00Z"));
    }

    #[tokio::test]
    async fn test_second_completion_is_rejected() {
        let (repo, _dir) = setup().await;
        let registered = plant_with_task_due(
            &repo,
            "user-1",
            "Calathea",
            CareFrequency::Daily,
            "2024-03-10T09:00:00.000Z",
        )
        .await;
        let due = at("2024-03-10T09:00:00Z");
        let now = at("2024-03-10T10:00:00Z");

        repo.complete_task(
            "user-1",
            &registered.first_task.id,
            &registered.user_plant.id,
            due,
            now,
        )
        .await
        .unwrap();
        let err = repo
            .complete_task(
                "user-1",
                &registered.first_task.id,
                &registered.user_plant.id,
                due,
                now,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        let tasks = repo
            .list_tasks_for_user_plant(&registered.user_plant.id)
            .await
            .unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_completions_create_one_next_task() {
        let (repo, _dir) = setup().await;
        let registered = plant_with_task_due(
            &repo,
            "user-1",
            "Pothos",
            CareFrequency::Monthly,
            "2024-01-31T09:00:00.000Z",
        )
        .await;
        let due = at("2024-01-31T09:00:00Z");
        let now = at("2024-01-31T10:00:00Z");

        let mut handles = Vec::new();
        for _ in 0..2 {
            let repo = repo.clone();
            let task_id = registered.first_task.id.clone();
            let user_plant_id = registered.user_plant.id.clone();
            handles.push(tokio::spawn(async move {
                repo.complete_task("user-1", &task_id, &user_plant_id, due, now)
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(result) => {
                    successes += 1;
                    assert_eq!(result.next.due_at, at("2024-02-29T09:00:00Z"));
                }
                Err(e) => assert!(
                    matches!(e, AppError::Conflict(_) | AppError::Database(_)),
                    "unexpected error: {}",
                    e
                ),
            }
        }
        assert_eq!(successes, 1);

        let pending: Vec<_> = repo
            .list_tasks_for_user_plant(&registered.user_plant.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_missing_or_foreign_task_is_not_found() {
        let (repo, _dir) = setup().await;
        let registered = plant_with_task_due(
            &repo,
            "user-1",
            "Fern",
            CareFrequency::Daily,
            "2024-03-10T09:00:00.000Z",
        )
        .await;
        let due = at("2024-03-10T09:00:00Z");
        let now = at("2024-03-10T10:00:00Z");

        let missing = repo
            .complete_task("user-1", "no-such-task", &registered.user_plant.id, due, now)
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));

        let foreign = repo
            .complete_task(
                "user-2",
                &registered.first_task.id,
                &registered.user_plant.id,
                due,
                now,
            )
            .await
            .unwrap_err();
        assert!(matches!(foreign, AppError::NotFound(_)));

        let task = repo.get_task(&registered.first_task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_stale_due_timestamp_is_rejected() {
        let (repo, _dir) = setup().await;
        let registered = plant_with_task_due(
            &repo,
            "user-1",
            "Palm",
            CareFrequency::Weekly,
            "2024-03-10T09:00:00.000Z",
        )
        .await;

        let err = repo
            .complete_task(
                "user-1",
                &registered.first_task.id,
                &registered.user_plant.id,
                at("2024-03-03T09:00:00Z"),
                at("2024-03-10T10:00:00Z"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_tasks_due_between_returns_todays_pending_tasks_in_order() {
        let (repo, _dir) = setup().await;
        plant_with_task_due(
            &repo,
            "user-1",
            "Late",
            CareFrequency::Daily,
            "2024-03-10T23:59:00.000Z",
        )
        .await;
        plant_with_task_due(
            &repo,
            "user-1",
            "Early",
            CareFrequency::Daily,
            "2024-03-10T00:00:01.000Z",
        )
        .await;
        plant_with_task_due(
            &repo,
            "user-1",
            "Tomorrow",
            CareFrequency::Daily,
            "2024-03-11T00:00:01.000Z",
        )
        .await;
        plant_with_task_due(
            &repo,
            "user-2",
            "Other",
            CareFrequency::Daily,
            "2024-03-10T12:00:00.000Z",
        )
        .await;

        let window = day_window(at("2024-03-10T15:00:00Z"), &Utc).unwrap();
        let tasks = repo.tasks_due_between("user-1", window).await.unwrap();

        let names: Vec<_> = tasks.iter().map(|t| t.plant_name.as_str()).collect();
        assert_eq!(names, vec!["Early", "Late"]);
        assert_eq!(tasks[0].due_at, at("2024-03-10T00:00:01Z"));
        assert_eq!(tasks[0].plant_species.as_deref(), Some("Ficus lyrata"));
    }

    #[tokio::test]
    async fn test_plants_with_tasks_between() {
        let (repo, _dir) = setup().await;
        let due = plant_with_task_due(
            &repo,
            "user-1",
            "Due",
            CareFrequency::Daily,
            "2024-03-10T09:00:00.000Z",
        )
        .await;
        plant_with_task_due(
            &repo,
            "user-1",
            "Later",
            CareFrequency::Daily,
            "2024-03-12T09:00:00.000Z",
        )
        .await;

        let window = day_window(at("2024-03-10T15:00:00Z"), &Utc).unwrap();
        let plants = repo.plants_with_tasks_between("user-1", window).await.unwrap();

        assert_eq!(plants.len(), 2);
        let due_entry = plants.iter().find(|p| p.plant.name == "Due").unwrap();
        assert!(due_entry.has_task_today);
        assert_eq!(due_entry.task_id.as_deref(), Some(due.first_task.id.as_str()));
        assert_eq!(due_entry.user_plant_id, due.user_plant.id);
        let later = plants.iter().find(|p| p.plant.name == "Later").unwrap();
        assert!(!later.has_task_today);
        assert_eq!(later.due_at, None);

        assert!(repo.plants_with_tasks_between("nobody", window).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_plant_rederives_slug_and_hides() {
        let (repo, _dir) = setup().await;
        let registered = plant_with_task_due(
            &repo,
            "user-1",
            "Old Name",
            CareFrequency::Daily,
            "2024-03-10T09:00:00.000Z",
        )
        .await;

        let updated = repo
            .update_plant(
                &registered.plant.id,
                &UpdatePlantRequest {
                    name: "New Name".to_string(),
                    species: Some("".to_string()),
                    location: Some("Bedroom".to_string()),
                    is_hidden: Some(true),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.slug, "new-name");
        assert_eq!(updated.species, None);
        assert_eq!(updated.location.as_deref(), Some("Bedroom"));
        assert!(updated.is_hidden);
        assert!(repo.list_plants().await.unwrap().is_empty());

        let missing = repo
            .update_plant(
                "missing",
                &UpdatePlantRequest {
                    name: "X".to_string(),
                    species: None,
                    location: None,
                    is_hidden: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_plant_cascades_to_schedule_and_tasks() {
        let (repo, _dir) = setup().await;
        let registered = plant_with_task_due(
            &repo,
            "user-1",
            "Doomed",
            CareFrequency::Daily,
            "2024-03-10T09:00:00.000Z",
        )
        .await;
        let survivor = plant_with_task_due(
            &repo,
            "user-1",
            "Survivor",
            CareFrequency::Daily,
            "2024-03-10T10:00:00.000Z",
        )
        .await;

        repo.delete_plant(&registered.plant.id).await.unwrap();

        let plants = repo.list_plants().await.unwrap();
        assert_eq!(plants, vec![survivor.plant.clone()]);
        assert_eq!(repo.get_user_plant(&registered.user_plant.id).await.unwrap(), None);
        assert_eq!(repo.get_task(&registered.first_task.id).await.unwrap(), None);

        let window = day_window(at("2024-03-10T15:00:00Z"), &Utc).unwrap();
        let tasks = repo.tasks_due_between("user-1", window).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].plant_name, "Survivor");

        let again = repo.delete_plant(&registered.plant.id).await.unwrap_err();
        assert!(matches!(again, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_corrupt_frequency_fails_loudly() {
        let (repo, _dir) = setup().await;
        let registered = plant_with_task_due(
            &repo,
            "user-1",
            "Cactus",
            CareFrequency::Monthly,
            "2024-03-10T09:00:00.000Z",
        )
        .await;

        // Bypass the CHECK constraint the way a manual edit would
        let mut conn = repo.pool.acquire().await.unwrap();
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("UPDATE user_plants SET frequency = 'yearly' WHERE id = ?")
            .bind(&registered.user_plant.id)
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let err = repo.get_user_plant(&registered.user_plant.id).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}

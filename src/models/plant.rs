//! Plant model and the request/response shapes built around it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CareFrequency, CareTask, UserPlant};

/// A houseplant registered by a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    pub id: String,
    /// Unique human-readable key derived from the name
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
}

/// Request body for registering a new plant under the current user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPlantRequest {
    pub name: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub frequency: CareFrequency,
}

/// Request body for editing a plant. The slug follows the name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlantRequest {
    pub name: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_hidden: Option<bool>,
}

/// Everything created by a successful registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredPlant {
    pub plant: Plant,
    pub user_plant: UserPlant,
    pub first_task: CareTask,
}

/// Plant detail with the current user's care frequency, if they track it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantDetail {
    #[serde(flatten)]
    pub plant: Plant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<CareFrequency>,
}

/// A tracked plant together with today's pending task, if one exists.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlantWithTodayTask {
    #[serde(flatten)]
    pub plant: Plant,
    pub user_plant_id: String,
    pub has_task_today: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
}

/// Derive the URL slug for a plant name.
///
/// Lowercases and trims, drops anything but ASCII word characters, whitespace and
/// hyphens, then turns whitespace runs into single hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.to_lowercase().trim().chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            continue;
        }
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug
}

/// Trim an optional text field, mapping blank input to `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Monstera Deliciosa"), "monstera-deliciosa");
        assert_eq!(slugify("  Ficus  "), "ficus");
        assert_eq!(slugify("Aloe   vera"), "aloe-vera");
    }

    #[test]
    fn test_slugify_strips_punctuation_and_collapses_hyphens() {
        assert_eq!(slugify("Zamioculcas (ZZ) plant!"), "zamioculcas-zz-plant");
        assert_eq!(slugify("peace -- lily"), "peace-lily");
        assert_eq!(slugify("snake_plant 2"), "snake_plant-2");
    }

    #[test]
    fn test_slugify_drops_non_ascii_letters() {
        assert_eq!(slugify("Café plant"), "caf-plant");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_optional(Some("  kitchen ")), Some("kitchen".to_string()));
        assert_eq!(normalize_optional(Some("   ")), None);
        assert_eq!(normalize_optional(None), None);
    }
}

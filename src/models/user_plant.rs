//! Link between a user and a plant, carrying the care schedule.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::parse_timezone;
use crate::errors::AppError;

/// How often a plant needs care.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CareFrequency {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl CareFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            CareFrequency::Daily => "daily",
            CareFrequency::Weekly => "weekly",
            CareFrequency::Monthly => "monthly",
        }
    }
}

impl FromStr for CareFrequency {
    type Err = AppError;

    /// Stored frequencies are written by this service only, so anything else is corruption.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(CareFrequency::Daily),
            "weekly" => Ok(CareFrequency::Weekly),
            "monthly" => Ok(CareFrequency::Monthly),
            other => Err(AppError::Internal(format!(
                "Unrecognized care frequency '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CareFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's care schedule for one plant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPlant {
    pub id: String,
    pub user_id: String,
    pub plant_id: String,
    pub frequency: CareFrequency,
    /// IANA timezone name
    pub timezone: String,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl UserPlant {
    pub fn tz(&self) -> Result<Tz, AppError> {
        parse_timezone(&self.timezone).map_err(|_| {
            AppError::Internal(format!("Stored timezone '{}' is invalid", self.timezone))
        })
    }
}

//! Data models for the plant care backend.
//!
//! Field names serialize as camelCase to match the mobile client.

mod care_task;
mod plant;
mod user_plant;

pub use care_task::*;
pub use plant::*;
pub use user_plant::*;

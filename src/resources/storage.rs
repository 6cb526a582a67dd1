//! Object storage bucket descriptor used for the optional backup bucket.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Objects are deleted one day after their custom time. This mirrors the
/// backup retention contract of the storage consumers and has no
/// configuration surface.
pub const DAYS_SINCE_CUSTOM_TIME: u32 = 1;

/// Action taken when a lifecycle condition matches.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum LifecycleAction {
    /// Delete the object.
    Delete,
    /// Move the object to another storage class.
    SetStorageClass {
        /// Target storage class.
        storage_class: String,
    },
}

/// Conditions of a lifecycle rule. Unset conditions do not participate.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleCondition {
    /// Object age in days.
    pub age_days: Option<u32>,
    /// Days elapsed since the object's custom time.
    pub days_since_custom_time: Option<u32>,
}

/// A single lifecycle rule.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRule {
    /// Action to take.
    pub action: LifecycleAction,
    /// Conditions that must all match.
    pub condition: LifecycleCondition,
}

impl LifecycleRule {
    /// The fixed rule deleting objects once their custom time has passed.
    #[must_use]
    pub fn expire_after_custom_time() -> Self {
        Self {
            action: LifecycleAction::Delete,
            condition: LifecycleCondition {
                days_since_custom_time: Some(DAYS_SINCE_CUSTOM_TIME),
                ..LifecycleCondition::default()
            },
        }
    }
}

/// A storage bucket.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Bucket {
    /// Globally unique bucket name (immutable).
    pub name: String,
    /// Location such as a region (immutable).
    pub location: String,
    /// Creation time (output only).
    pub time_created: Option<String>,
    /// Lifecycle rules (a set).
    pub lifecycle: Vec<LifecycleRule>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Whether uniform bucket-level access is enforced.
    pub uniform_bucket_level_access: bool,
    /// Metadata generation used as a precondition for patches.
    pub metageneration: i64,
}

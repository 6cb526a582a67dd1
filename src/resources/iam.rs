//! Service identity descriptor.

use serde::{Deserialize, Serialize};

/// A service account used by the cluster's workers and controllers.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceAccount {
    /// Account id, the local part of the email (immutable).
    pub account_id: String,
    /// Fully qualified resource name (output only).
    pub name: String,
    /// Email address (output only).
    pub email: String,
    /// Numeric unique id (output only).
    pub unique_id: String,
    /// Human-readable display name.
    pub display_name: String,
}

impl ServiceAccount {
    /// Returns the email address a service account gets in a project.
    #[must_use]
    pub fn email_for(account_id: &str, project_id: &str) -> String {
        format!("{account_id}@{project_id}.iam.gserviceaccount.com")
    }
}

//! Bucket updates.

use std::collections::BTreeMap;

use crate::resources::{Bucket, LifecycleRule};

use super::field::{Field, Patch, SendMode};
use super::{diff_set, diff_value};

/// Update for a [`Bucket`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BucketPatch {
    /// Lifecycle rules.
    pub lifecycle: Field<Vec<LifecycleRule>>,
    /// Labels.
    pub labels: Field<BTreeMap<String, String>>,
    /// Uniform bucket-level access.
    pub uniform_bucket_level_access: Field<bool>,
}

impl BucketPatch {
    /// Applies the patch to a descriptor.
    pub fn apply_to(&self, bucket: &mut Bucket) {
        self.lifecycle.apply_to(&mut bucket.lifecycle);
        self.labels.apply_to(&mut bucket.labels);
        self.uniform_bucket_level_access
            .apply_to(&mut bucket.uniform_bucket_level_access);
    }
}

impl Patch for BucketPatch {
    fn field_modes(&self) -> Vec<(&'static str, SendMode)> {
        vec![
            ("lifecycle.rule", self.lifecycle.send_mode()),
            ("labels", self.labels.send_mode()),
            (
                "iamConfiguration.uniformBucketLevelAccess.enabled",
                self.uniform_bucket_level_access.send_mode(),
            ),
        ]
    }
}

/// Computes the update turning `current` into `desired`.
///
/// Lifecycle rules are compared as a set.
#[must_use]
pub fn bucket_patch(current: &Bucket, desired: &Bucket) -> Option<BucketPatch> {
    let patch = BucketPatch {
        lifecycle: diff_set(&current.lifecycle, &desired.lifecycle),
        labels: diff_value(&current.labels, &desired.labels),
        uniform_bucket_level_access: diff_value(
            &current.uniform_bucket_level_access,
            &desired.uniform_bucket_level_access,
        ),
    };
    (!patch.is_empty()).then_some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{LifecycleAction, LifecycleCondition};

    fn archive_rule() -> LifecycleRule {
        LifecycleRule {
            action: LifecycleAction::SetStorageClass {
                storage_class: String::from("ARCHIVE"),
            },
            condition: LifecycleCondition {
                age_days: Some(30),
                ..LifecycleCondition::default()
            },
        }
    }

    fn backup_bucket() -> Bucket {
        Bucket {
            name: String::from("shoot-backup"),
            location: String::from("europe-west1"),
            lifecycle: vec![LifecycleRule::expire_after_custom_time(), archive_rule()],
            labels: BTreeMap::from([(String::from("cluster"), String::from("shoot"))]),
            uniform_bucket_level_access: true,
            ..Bucket::default()
        }
    }

    #[test]
    fn reordered_lifecycle_rules_need_no_patch() {
        let current = Bucket {
            time_created: Some(String::from("2024-01-01T00:00:00Z")),
            metageneration: 3,
            lifecycle: vec![archive_rule(), LifecycleRule::expire_after_custom_time()],
            ..backup_bucket()
        };
        assert_eq!(bucket_patch(&current, &backup_bucket()), None);
    }

    #[test]
    fn missing_expiry_rule_is_restored() {
        let current = Bucket {
            lifecycle: vec![archive_rule()],
            ..backup_bucket()
        };
        let patch = bucket_patch(&current, &backup_bucket()).expect("rule missing");
        assert_eq!(patch.lifecycle, Field::Set(backup_bucket().lifecycle));
        assert!(patch.labels.is_unset());
    }

    #[test]
    fn dropping_all_labels_force_sends_empty_map() {
        let desired = Bucket {
            labels: BTreeMap::new(),
            ..backup_bucket()
        };
        let patch = bucket_patch(&backup_bucket(), &desired).expect("labels differ");
        assert_eq!(patch.force_send_fields(), vec!["labels"]);
    }

    #[test]
    fn applying_patch_converges() {
        let mut current = Bucket {
            name: String::from("shoot-backup"),
            location: String::from("europe-west1"),
            ..Bucket::default()
        };
        let desired = backup_bucket();

        bucket_patch(&current, &desired)
            .expect("bucket differs")
            .apply_to(&mut current);

        assert_eq!(bucket_patch(&current, &desired), None);
    }
}

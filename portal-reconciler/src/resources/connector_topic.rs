//! Connector topics - topics provisioned for a connector order.

use serde::{Deserialize, Serialize};

use crate::model::{FieldValue, Fields, Identity, PairedField, Resource, Schema};

/// Sentinel for an unset compaction lag.
pub const UNSET_LAG: i64 = -1;

/// A topic owned by a connector order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorTopic {
    pub topic: String,
    /// Partition count. Fixed at creation.
    pub partitions: i64,
    #[serde(default = "default_cleanup_policy")]
    pub cleanup_policy: String,
    #[serde(default = "default_retention_ms")]
    pub retention_ms: i64,
    #[serde(default = "unset_lag")]
    pub min_compaction_lag_ms: i64,
    #[serde(default = "unset_lag")]
    pub max_compaction_lag_ms: i64,
}

fn default_cleanup_policy() -> String {
    "delete".to_string()
}

fn default_retention_ms() -> i64 {
    604_800_000
}

fn unset_lag() -> i64 {
    UNSET_LAG
}

impl Resource for ConnectorTopic {
    const SCHEMA: Schema = Schema {
        kind: "connector-topic",
        immutable: &["partitions"],
        paired: &[PairedField {
            low: "min_compaction_lag_ms",
            high: "max_compaction_lag_ms",
            sentinel: UNSET_LAG,
        }],
        context: &["cleanup_policy"],
    };

    fn identity(&self) -> Identity {
        Identity::new(self.topic.as_str())
    }

    fn fields(&self) -> Fields {
        Fields::from([
            ("partitions", FieldValue::from(self.partitions)),
            (
                "cleanup_policy",
                FieldValue::from(self.cleanup_policy.as_str()),
            ),
            ("retention_ms", FieldValue::from(self.retention_ms)),
            (
                "min_compaction_lag_ms",
                FieldValue::from(self.min_compaction_lag_ms),
            ),
            (
                "max_compaction_lag_ms",
                FieldValue::from(self.max_compaction_lag_ms),
            ),
        ])
    }
}

impl ConnectorTopic {
    pub fn new(topic: &str, partitions: i64) -> Self {
        Self {
            topic: topic.to_string(),
            partitions,
            cleanup_policy: default_cleanup_policy(),
            retention_ms: default_retention_ms(),
            min_compaction_lag_ms: UNSET_LAG,
            max_compaction_lag_ms: UNSET_LAG,
        }
    }
}

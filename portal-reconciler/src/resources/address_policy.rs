//! Address policies - per-address broker settings of a messaging order.

use serde::{Deserialize, Serialize};

use crate::model::{FieldValue, Fields, Identity, PairedField, Resource, Schema};

/// Sentinel for an unset redelivery delay.
pub const UNSET_DELAY: i64 = -1;

/// Broker settings for one address, identified by `prefix.name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPolicy {
    pub prefix: String,
    pub name: String,
    /// ANYCAST or MULTICAST. Fixed once the address exists.
    #[serde(default = "default_routing_type")]
    pub routing_type: String,
    /// FAIL, BLOCK, PAGE or DROP.
    pub address_full_policy: String,
    /// Size limit as understood by the portal (e.g. `100Mb`).
    pub max_size: String,
    #[serde(default = "unset_delay")]
    pub min_redelivery_delay: i64,
    #[serde(default = "unset_delay")]
    pub max_redelivery_delay: i64,
}

fn default_routing_type() -> String {
    "ANYCAST".to_string()
}

fn unset_delay() -> i64 {
    UNSET_DELAY
}

impl Resource for AddressPolicy {
    const SCHEMA: Schema = Schema {
        kind: "address-policy",
        immutable: &["routing_type"],
        paired: &[PairedField {
            low: "min_redelivery_delay",
            high: "max_redelivery_delay",
            sentinel: UNSET_DELAY,
        }],
        // the portal's update call replaces the whole policy record
        context: &["address_full_policy", "max_size"],
    };

    fn identity(&self) -> Identity {
        Identity::new(format!("{}.{}", self.prefix, self.name))
    }

    fn fields(&self) -> Fields {
        Fields::from([
            ("routing_type", FieldValue::from(self.routing_type.as_str())),
            (
                "address_full_policy",
                FieldValue::from(self.address_full_policy.as_str()),
            ),
            ("max_size", FieldValue::from(self.max_size.as_str())),
            (
                "min_redelivery_delay",
                FieldValue::from(self.min_redelivery_delay),
            ),
            (
                "max_redelivery_delay",
                FieldValue::from(self.max_redelivery_delay),
            ),
        ])
    }
}

impl AddressPolicy {
    pub fn new(prefix: &str, name: &str, address_full_policy: &str, max_size: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            name: name.to_string(),
            routing_type: default_routing_type(),
            address_full_policy: address_full_policy.to_string(),
            max_size: max_size.to_string(),
            min_redelivery_delay: UNSET_DELAY,
            max_redelivery_delay: UNSET_DELAY,
        }
    }

    pub fn with_redelivery(mut self, min: i64, max: i64) -> Self {
        self.min_redelivery_delay = min;
        self.max_redelivery_delay = max;
        self
    }

    pub fn with_routing_type(mut self, routing_type: &str) -> Self {
        self.routing_type = routing_type.to_string();
        self
    }
}

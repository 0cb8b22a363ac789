//! Technical users - service accounts with address permissions.

use serde::{Deserialize, Serialize};

use crate::model::{FieldValue, Fields, Identity, Resource, Schema};

/// A service account, identified by its username.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalUser {
    pub username: String,
    /// PASSWORD or CERTIFICATE. Fixed once the account exists.
    #[serde(default = "default_auth_method")]
    pub auth_method: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub read_addresses: Vec<String>,
    #[serde(default)]
    pub write_addresses: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_auth_method() -> String {
    "PASSWORD".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Resource for TechnicalUser {
    const SCHEMA: Schema = Schema {
        kind: "technical-user",
        immutable: &["auth_method"],
        paired: &[],
        // permissions are replaced as a whole on update
        context: &["read_addresses", "write_addresses"],
    };

    fn identity(&self) -> Identity {
        Identity::new(self.username.as_str())
    }

    fn fields(&self) -> Fields {
        Fields::from([
            ("auth_method", FieldValue::from(self.auth_method.as_str())),
            ("description", FieldValue::from(self.description.as_str())),
            (
                "read_addresses",
                FieldValue::from(self.read_addresses.clone()),
            ),
            (
                "write_addresses",
                FieldValue::from(self.write_addresses.clone()),
            ),
            ("enabled", FieldValue::from(self.enabled)),
        ])
    }
}

impl TechnicalUser {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            auth_method: default_auth_method(),
            description: String::new(),
            read_addresses: Vec::new(),
            write_addresses: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_read(mut self, addresses: &[&str]) -> Self {
        self.read_addresses = addresses.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_write(mut self, addresses: &[&str]) -> Self {
        self.write_addresses = addresses.iter().map(|a| a.to_string()).collect();
        self
    }
}

//! Reconciler configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reconciler::converge::Phase;

/// Order in which the convergence phases are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseOrdering {
    /// New entities exist before anything is removed.
    #[default]
    CreateUpdateDelete,
    /// Free identities first, for remotes with uniqueness constraints.
    DeleteCreateUpdate,
}

impl PhaseOrdering {
    pub fn phases(self) -> [Phase; 3] {
        match self {
            PhaseOrdering::CreateUpdateDelete => [Phase::Create, Phase::Update, Phase::Delete],
            PhaseOrdering::DeleteCreateUpdate => [Phase::Delete, Phase::Create, Phase::Update],
        }
    }
}

/// Configuration for the convergence driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub ordering: PhaseOrdering,
    /// Skip all remaining calls once a remote call reports cancellation or
    /// timeout.
    pub stop_on_interrupt: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            ordering: PhaseOrdering::default(),
            stop_on_interrupt: true,
        }
    }
}

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ReconcilerConfig {
    /// Load a JSON configuration file. Missing keys take their defaults.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

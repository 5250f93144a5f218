//! Error taxonomy for a deployment run.

use alloy_core::primitives::Address;
use thiserror::Error;

/// Errors surfaced by a deployment run.
///
/// Configuration errors are raised by the preflight, before the first network
/// call. Execution errors abort the run but leave the ledger entries already
/// committed in place, so the run can be resumed by invoking it again.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("artifact `{contract}` for unit `{unit}` was not found")]
    ArtifactNotFound { unit: String, contract: String },

    #[error("artifact `{contract}` could not be loaded")]
    InvalidArtifact {
        contract: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("dependency cycle between units: {}", .units.join(", "))]
    DependencyCycle { units: Vec<String> },

    #[error("unit `{unit}` depends on undefined unit `{dependency}`")]
    MissingDependency { unit: String, dependency: String },

    #[error("unit `{unit}` references `{dependency}` which has no resolved address")]
    UnresolvedDependency { unit: String, dependency: String },

    #[error("invalid unit `{unit}`: {reason}")]
    InvalidUnit { unit: String, reason: String },

    #[error("no unit is tagged `{tag}`")]
    UnknownTag { tag: String },

    #[error("deployment of `{unit}` failed")]
    DeploymentFailed {
        unit: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("wiring call `{method}` on `{target}` ({address}) after deploying `{unit}` failed")]
    WiringCallFailed {
        unit: String,
        target: String,
        address: Address,
        method: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("network request failed")]
    Network(#[source] anyhow::Error),

    #[error("deployment ledger failure")]
    Ledger(#[source] anyhow::Error),
}

impl DeployError {
    /// Whether this error is detected from the configuration alone.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ArtifactNotFound { .. }
                | Self::InvalidArtifact { .. }
                | Self::DependencyCycle { .. }
                | Self::MissingDependency { .. }
                | Self::InvalidUnit { .. }
                | Self::UnknownTag { .. }
        )
    }

    pub(crate) fn invalid(unit: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUnit {
            unit: unit.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn deployment(unit: &str, cause: anyhow::Error) -> Self {
        Self::DeploymentFailed {
            unit: unit.to_string(),
            cause,
        }
    }
}

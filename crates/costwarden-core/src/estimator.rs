//! Pre-execution cost estimation via backend dry runs.

use crate::error::{GovernanceError, Result};
use crate::pricing::PricingConfig;
use chrono::{DateTime, Utc};

/// Execution backend capable of zero-cost dry runs.
///
/// Implementations wrap the external service that will eventually run the
/// operation. A dry run must not incur any spend.
pub trait DryRunBackend: Send {
    /// Returns the byte volume the operation would process.
    ///
    /// # Errors
    /// Returns error if the backend is unreachable or the operation is
    /// malformed. Callers must treat a failed estimate as "cost unknown",
    /// never as zero cost.
    fn dry_run(&self, operation: &str) -> Result<u64>;
}

/// Projected cost of a proposed operation. Ephemeral, never persisted.
#[derive(Debug, Clone)]
pub struct CostEstimate {
    /// Projected cost in USD.
    pub projected_cost_usd: f64,
    /// Byte volume the dry run reported.
    pub resource_bytes: u64,
    /// Slot-milliseconds assumed for the compute surcharge.
    pub slot_ms_estimate: u64,
    /// When the estimate was computed.
    pub computed_at: DateTime<Utc>,
}

/// Cost estimator combining a dry-run backend with pricing rates.
pub struct CostEstimator {
    backend: Box<dyn DryRunBackend>,
    pricing: PricingConfig,
}

impl CostEstimator {
    /// Creates a new cost estimator.
    pub fn new(backend: Box<dyn DryRunBackend>, pricing: PricingConfig) -> Self {
        Self { backend, pricing }
    }

    /// Estimates the cost of an operation via a backend dry run.
    ///
    /// # Errors
    /// Returns `GovernanceError::EstimationFailed` if the dry run fails.
    /// The cost is then unknown; it is never silently treated as zero.
    pub fn estimate(&self, operation: &str) -> Result<CostEstimate> {
        let resource_bytes = self
            .backend
            .dry_run(operation)
            .map_err(|e| GovernanceError::EstimationFailed(e.to_string()))?;

        Ok(CostEstimate {
            projected_cost_usd: self.pricing.projected_cost(resource_bytes),
            resource_bytes,
            slot_ms_estimate: self.pricing.slot_ms_estimate,
            computed_at: Utc::now(),
        })
    }

    /// The pricing rates this estimator applies.
    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }
}

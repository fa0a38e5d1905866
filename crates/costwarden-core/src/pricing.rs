//! Pricing model converting resource volumes into monetary cost.

use serde::{Deserialize, Serialize};

const BYTES_PER_TIB: f64 = 1_099_511_627_776.0;
const SLOT_MS_PER_HOUR: f64 = 3_600_000.0;

/// Pricing rates for metered operations.
///
/// Rates are supplied by configuration, not derived here. Defaults follow
/// on-demand analytical pricing: $5 per TiB processed plus a small
/// compute-time surcharge billed per slot-hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Cost per TiB of data processed in USD.
    pub price_per_tib_usd: f64,
    /// Cost per slot-hour of compute time in USD.
    pub price_per_slot_hour_usd: f64,
    /// Slot-milliseconds assumed for an operation when no measurement exists.
    #[serde(default = "default_slot_ms_estimate")]
    pub slot_ms_estimate: u64,
}

fn default_slot_ms_estimate() -> u64 {
    1000
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            price_per_tib_usd: 5.0,
            price_per_slot_hour_usd: 0.01,
            slot_ms_estimate: 1000,
        }
    }
}

impl PricingConfig {
    /// Cost of processing the given byte volume.
    pub fn data_cost(&self, bytes: u64) -> f64 {
        (bytes as f64 / BYTES_PER_TIB) * self.price_per_tib_usd
    }

    /// Cost of the given compute time in slot-milliseconds.
    pub fn compute_cost(&self, slot_ms: u64) -> f64 {
        (slot_ms as f64 / SLOT_MS_PER_HOUR) * self.price_per_slot_hour_usd
    }

    /// Total cost of an operation: data processing plus compute surcharge.
    pub fn operation_cost(&self, bytes: u64, slot_ms: u64) -> f64 {
        self.data_cost(bytes) + self.compute_cost(slot_ms)
    }

    /// Projected cost for a dry-run estimate, using the configured
    /// per-operation compute surcharge.
    pub fn projected_cost(&self, bytes: u64) -> f64 {
        self.operation_cost(bytes, self.slot_ms_estimate)
    }
}

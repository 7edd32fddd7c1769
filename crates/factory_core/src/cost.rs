//! Transport and producer cost models (C3).
//!
//! Plain functions plus a `Copy + Default` config struct, computing §4.3's
//! exact weighted-scoring formulas.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;

/// Sentinel for "unavailable" (queue full, interaction unsupported, producer
/// or mover not Alive).
pub const COST_UNAVAILABLE: u64 = u64::MAX;

/// Which weighting scheme a run uses for producer cost. Selected once at
/// blueprint load and stored as a resource; interchangeable per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostModel {
    /// `raw = 1·ticks + 2·cost + 5·queue`
    Linear,
    /// `raw = 2·ticks² + cost² + queue²`
    Quadratic,
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel::Linear
    }
}

/// `τ(from,to) = ⌊‖from−to‖⌋` (Euclidean floor), the transport cost (§4.3).
pub fn transport_cost(from: Vec2, to: Vec2) -> u64 {
    from.distance(to).floor() as u64
}

/// Raw producer cost before the dummy/MQTT transport multiplier is applied.
pub fn producer_raw_cost(model: CostModel, ticks: u64, cost: u64, queue_len: u64) -> u64 {
    match model {
        CostModel::Linear => ticks.saturating_add(2 * cost).saturating_add(5 * queue_len),
        CostModel::Quadratic => (2 * ticks.saturating_mul(ticks))
            .saturating_add(cost.saturating_mul(cost))
            .saturating_add(queue_len.saturating_mul(queue_len)),
    }
}

/// "Dummy" (in-process) bidding transport multiplies the raw cost by the
/// transport cost τ (§4.3).
pub fn dummy_cost(raw: u64, tau: u64) -> u64 {
    if raw == COST_UNAVAILABLE {
        COST_UNAVAILABLE
    } else {
        raw.saturating_mul(tau)
    }
}

/// MQTT bidding transport does not multiply by τ (§4.3).
pub fn mqtt_cost(raw: u64) -> u64 {
    raw
}

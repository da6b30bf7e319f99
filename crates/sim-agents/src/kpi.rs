//! Per-KPI impact calculator.
//!
//! Each of the six KPIs is scored independently on [-5, +5] by the gateway
//! and converted into a bounded multiplicative update. The conversion is the
//! single stochastic element of the calculator, so the random source is
//! injected by the caller. The share price is deliberately excluded here;
//! the market engine computes it and merges it afterward.

use rand::Rng;
use sim_core::{Kpi, KpiSnapshot};
use sim_gateway::{
    calls, CallMetadata, InferenceObjective, KpiImpactRequest, LanguageModelGateway,
};
use tracing::{debug, warn};

/// Convert an integer impact score into a percentage change.
///
/// `pct = s * (s * rnd * signum(s))` with `rnd` drawn from [0, 1): always
/// same-signed as the score, quadratic in its magnitude, bounded by 25%.
pub fn impact_pct<R: Rng>(score: i8, rng: &mut R) -> f64 {
    if score == 0 {
        return 0.0;
    }
    let s = f64::from(score);
    let rnd: f64 = rng.gen::<f64>() * s.signum();
    s * (s * rnd)
}

/// Apply one percentage change multiplicatively.
pub fn apply_pct(current: f64, pct: f64) -> f64 {
    current * (1.0 + pct / 100.0)
}

/// Score all six KPIs against the cycle's outcome and produce the next
/// snapshot (share price carried over unchanged). Individual scoring
/// failures keep that KPI at its prior value; if every score fails the prior
/// snapshot is returned untouched.
pub async fn recompute_kpis<R: Rng>(
    gateway: &dyn LanguageModelGateway,
    prior: &KpiSnapshot,
    situation: &str,
    actions: &[String],
    outcome: &str,
    meta: &CallMetadata,
    rng: &mut R,
) -> KpiSnapshot {
    let meta = meta.with_objective(InferenceObjective::KpiImpact);
    let mut next = prior.clone();
    let mut any_scored = false;

    for kpi in Kpi::ALL {
        let request = KpiImpactRequest {
            kpi,
            situation: situation.to_string(),
            actions: actions.to_vec(),
            outcome: outcome.to_string(),
        };
        match calls::kpi_impact(gateway, request, &meta).await {
            Ok(impact) => {
                let pct = impact_pct(impact.impact_score, rng);
                let updated = apply_pct(prior.get(kpi), pct);
                debug!(%kpi, score = impact.impact_score, pct, updated, "kpi scored");
                next.set(kpi, updated);
                any_scored = true;
            }
            Err(e) => {
                warn!(%kpi, error = %e, "kpi scoring failed; keeping prior value");
            }
        }
    }

    if !any_scored {
        warn!("all kpi scoring failed; returning prior snapshot unchanged");
        return prior.clone();
    }
    next
}

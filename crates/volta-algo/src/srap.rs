//! SRAP: can generation redispatch relieve a post-contingency overload?
//!
//! Candidates are buses whose sensitivity has the same sign as the flow
//! (reducing their injection pushes the flow back toward zero) and that have
//! headroom. They are ranked by |sensitivity|, truncated to the top N and
//! taken greedily:
//!
//! ```text
//! p_i    = min(headroom_i, budget_left, overload_left / |s_i|)
//! relief = Σ |s_i|·p_i
//! solvable ⇔ relief ≥ |flow| - rate
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One overloaded branch to test.
#[derive(Debug, Clone)]
pub struct SrapQuery<'a> {
    pub branch: usize,
    /// Post-contingency flow (MW, signed)
    pub flow: f64,
    /// Rate the flow must come back under (MW)
    pub rate: f64,
    /// Flow sensitivity to each bus injection (PTDF row)
    pub sensitivity: &'a [f64],
    /// Power each bus can give up (MW)
    pub available_power: &'a [f64],
    pub budget_mw: f64,
    pub top_n: usize,
}

/// Result of [`evaluate_srap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrapOutcome {
    pub branch: usize,
    pub solvable: bool,
    /// |flow| - rate, zero when not overloaded
    pub overload: f64,
    /// Flow reduction achieved by the selected buses
    pub relief: f64,
    /// (bus, MW taken) in rank order
    pub used: Vec<(usize, f64)>,
}

pub fn evaluate_srap(query: &SrapQuery<'_>) -> SrapOutcome {
    let overload = (query.flow.abs() - query.rate).max(0.0);
    let mut outcome = SrapOutcome {
        branch: query.branch,
        solvable: overload <= 0.0,
        overload,
        relief: 0.0,
        used: Vec::new(),
    };
    if outcome.solvable {
        return outcome;
    }

    let flow_sign = query.flow.signum();
    let mut candidates: Vec<(usize, f64)> = query
        .sensitivity
        .iter()
        .zip(query.available_power)
        .enumerate()
        .filter(|(_, (&s, &p))| s != 0.0 && s.signum() == flow_sign && p > 0.0)
        .map(|(i, (&s, _))| (i, s.abs()))
        .collect();

    candidates.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    candidates.truncate(query.top_n);

    let mut budget_left = query.budget_mw.max(0.0);
    let mut overload_left = overload;
    for (bus, s) in candidates {
        if budget_left <= 0.0 || overload_left <= 0.0 {
            break;
        }
        let p = query.available_power[bus]
            .min(budget_left)
            .min(overload_left / s);
        if p <= 0.0 {
            continue;
        }
        budget_left -= p;
        overload_left -= s * p;
        outcome.relief += s * p;
        outcome.used.push((bus, p));
    }

    // float slack from the subtraction chain
    outcome.solvable = outcome.relief >= overload * (1.0 - 1e-12);
    outcome
}

/// A generator-like unit contributing to SRAP headroom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrapUnit {
    pub bus: usize,
    /// Active power output (MW)
    pub p_mw: f64,
    pub active: bool,
    pub srap_enabled: bool,
}

/// Per-bus sum of the positive output of active, SRAP-enabled units.
pub fn aggregate_available_power(nbus: usize, units: &[SrapUnit]) -> Vec<f64> {
    let mut out = vec![0.0; nbus];
    for u in units {
        if u.active && u.srap_enabled && u.p_mw > 0.0 && u.bus < nbus {
            out[u.bus] += u.p_mw;
        }
    }
    out
}

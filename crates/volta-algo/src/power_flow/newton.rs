//! Newton-Raphson with backtracking and reactive-limit switching.

use super::jacobian::{inf_norm, jacobian, mismatch, StateLayout};
use super::{PowerFlowProblem, PowerFlowResult, Reclassification, SolverStatus};
use crate::admittance::AdmittanceMatrices;
use crate::indices::SimulationIndices;
use crate::linalg::DenseLu;
use num_complex::Complex64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use volta_core::{PowerFlowOptions, ReactivePowerControl, VoltaError, VoltaResult};
use web_time::Instant;

/// Newton-Raphson power flow solver.
///
/// ```text
/// f(x)  = Scalc(V) - Szip(V)           x = [θ(no_slack); |V|(pq ∪ p)]
/// J·dx  = f
/// x    -= μ·dx                         μ = μ0, μ0·decay, μ0·decay², ...
/// ```
///
/// Failures never raise: the best-known voltage comes back with a
/// [`SolverStatus`] other than `Converged`.
#[derive(Debug, Clone, Default)]
pub struct NewtonRaphson {
    options: PowerFlowOptions,
    cancel: Option<Arc<AtomicBool>>,
}

/// Mutable solver state for one run.
struct State {
    vm: Vec<f64>,
    va: Vec<f64>,
    v: Vec<Complex64>,
    f: Vec<f64>,
    norm: f64,
}

impl State {
    fn recombine(vm: &[f64], va: &[f64]) -> Vec<Complex64> {
        vm.iter()
            .zip(va)
            .map(|(&m, &a)| Complex64::from_polar(m, a))
            .collect()
    }
}

impl NewtonRaphson {
    pub fn new(options: PowerFlowOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    /// Cooperative cancellation, checked once per outer iteration.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn options(&self) -> &PowerFlowOptions {
        &self.options
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Solve one island.
    ///
    /// Errors only on malformed input or an island without a slack bus
    /// ([`VoltaError::UnsolvableIsland`]).
    pub fn solve(&self, problem: &PowerFlowProblem) -> VoltaResult<PowerFlowResult> {
        problem.check()?;
        if problem.indices.unsolvable || problem.indices.reference.is_empty() {
            return Err(VoltaError::UnsolvableIsland(problem.island));
        }

        let start = Instant::now();
        let opts = &self.options;
        let nbus = problem.nbus();

        let mut indices = problem.indices.clone();
        let mut branches = problem.branches.clone();
        let mut s0 = problem.s0.clone();
        let mut i0 = problem.i0.clone();
        let mut y0 = problem.y0.clone();
        let mut adm = AdmittanceMatrices::build(&branches, &problem.yshunt_bus)?;
        let mut layout = StateLayout::new(&indices, nbus);
        let mut reclassifications = Vec::new();

        let vm: Vec<f64> = problem.v0.iter().map(|v| v.norm()).collect();
        let va: Vec<f64> = problem.v0.iter().map(|v| v.arg()).collect();
        let v = State::recombine(&vm, &va);
        let f = mismatch(&adm.ybus, &v, &vm, &s0, &i0, &y0, &layout);
        let mut st = State {
            norm: inf_norm(&f),
            vm,
            va,
            v,
            f,
        };

        let mut iterations = 0;
        let mut status = SolverStatus::MaxIterationsExceeded;

        loop {
            // reactive limits are checked on the fresh mismatch so an already
            // balanced start still sees them
            if opts.control_q == ReactivePowerControl::Direct
                && st.norm < opts.q_control_threshold
                && indices.has_voltage_controlled()
            {
                let scalc = adm.compute_power(&st.v);
                let events = self.apply_q_limits(
                    problem,
                    &mut indices,
                    &scalc,
                    (&mut s0, &mut i0, &mut y0),
                    iterations,
                );
                if !events.is_empty() {
                    reclassifications.extend(events);
                    layout = StateLayout::new(&indices, nbus);
                    st.f = mismatch(&adm.ybus, &st.v, &st.vm, &s0, &i0, &y0, &layout);
                    st.norm = inf_norm(&st.f);
                }
            }

            if st.norm < opts.tolerance {
                status = SolverStatus::Converged;
                break;
            }
            if iterations >= opts.max_iter {
                break;
            }
            if self.cancelled() {
                status = SolverStatus::Cancelled;
                break;
            }
            iterations += 1;

            let jac = jacobian(&adm.ybus, &st.v, &st.vm, &i0, &y0, &layout);
            let dx = match DenseLu::factor_sparse(&jac).and_then(|lu| lu.solve(&st.f)) {
                Ok(dx) => dx,
                Err(e) => {
                    warn!("island {}: Jacobian solve failed: {e}", problem.island);
                    status = SolverStatus::SingularJacobian;
                    break;
                }
            };

            if !self.line_search(&adm, &layout, &dx, &mut st, (&s0, &i0, &y0)) {
                warn!(
                    "island {}: backtracking exhausted at iteration {iterations}, norm {:.3e}",
                    problem.island, st.norm
                );
                status = SolverStatus::BacktrackExhausted;
                break;
            }

            if opts.model_converter_losses && branches.has_converters() {
                let (i_from, _) = adm.branch_currents(&st.v);
                branches.update_converter_losses(&i_from);
                adm = AdmittanceMatrices::build(&branches, &problem.yshunt_bus)?;
                st.f = mismatch(&adm.ybus, &st.v, &st.vm, &s0, &i0, &y0, &layout);
                st.norm = inf_norm(&st.f);
            }

            debug!(
                "island {} iteration {iterations}: |f| = {:.3e}",
                problem.island, st.norm
            );
        }

        if status != SolverStatus::Converged {
            warn!(
                "island {}: power flow stopped ({status:?}) after {iterations} iterations, |f| = {:.3e}",
                problem.island, st.norm
            );
        }

        let scalc = adm.compute_power(&st.v);
        let (i_from, i_to) = adm.branch_currents(&st.v);
        let sf = branches
            .from
            .iter()
            .zip(&i_from)
            .map(|(&f, i)| st.v[f] * i.conj())
            .collect();
        let st_flow = branches
            .to
            .iter()
            .zip(&i_to)
            .map(|(&t, i)| st.v[t] * i.conj())
            .collect();

        Ok(PowerFlowResult {
            v: st.v,
            converged: status == SolverStatus::Converged,
            norm_f: st.norm,
            scalc,
            sf,
            st: st_flow,
            iterations,
            elapsed: start.elapsed(),
            status,
            bus_types: indices.bus_types(),
            reclassifications,
        })
    }

    /// Try `x - μ·dx` with a shrinking μ until the mismatch norm drops.
    ///
    /// Retries are bounded by `max_iter` and by `μ > tolerance`. On failure the
    /// state is left untouched.
    fn line_search(
        &self,
        adm: &AdmittanceMatrices,
        layout: &StateLayout,
        dx: &[f64],
        st: &mut State,
        (s0, i0, y0): (&[Complex64], &[Complex64], &[Complex64]),
    ) -> bool {
        let opts = &self.options;
        let n_va = layout.no_slack.len();
        let mut mu = opts.mu0;
        let mut retries = 0;

        loop {
            let mut va = st.va.clone();
            let mut vm = st.vm.clone();
            for (k, &i) in layout.no_slack.iter().enumerate() {
                va[i] -= mu * dx[k];
            }
            for (k, &i) in layout.pq_p.iter().enumerate() {
                vm[i] -= mu * dx[n_va + k];
            }
            let v = State::recombine(&vm, &va);
            let f = mismatch(&adm.ybus, &v, &vm, s0, i0, y0, layout);
            let norm = inf_norm(&f);

            if norm < st.norm {
                *st = State { vm, va, v, f, norm };
                return true;
            }

            mu *= opts.backtrack_decay;
            retries += 1;
            if retries >= opts.max_iter || mu <= opts.tolerance {
                return false;
            }
            debug!("backtracking: mu = {mu:.3e}, |f| = {norm:.3e}");
        }
    }

    /// Move PV-type buses whose reactive injection leaves [Qmin, Qmax] to PQ.
    ///
    /// A violating bus gets its reactive injection pinned at the bound; a pair
    /// partner dragged along keeps its current Q (clipped to its own limits).
    fn apply_q_limits(
        &self,
        problem: &PowerFlowProblem,
        indices: &mut SimulationIndices,
        scalc: &[Complex64],
        (s0, i0, y0): (&mut Vec<Complex64>, &mut Vec<Complex64>, &mut Vec<Complex64>),
        iteration: usize,
    ) -> Vec<Reclassification> {
        let mut violating = Vec::new();
        let mut pinned = vec![None; scalc.len()];
        for i in indices.voltage_controlled() {
            let q = scalc[i].im;
            let bound = if q > problem.qmax[i] {
                problem.qmax[i]
            } else if q < problem.qmin[i] {
                problem.qmin[i]
            } else {
                continue;
            };
            violating.push(i);
            pinned[i] = Some(bound);
        }
        if violating.is_empty() {
            return Vec::new();
        }

        let before = indices.bus_types();
        let (next, changed) = indices.with_buses_as_pq(&violating);
        let mut events = Vec::with_capacity(changed.len());
        for i in changed {
            let q = pinned[i].unwrap_or_else(|| scalc[i].im.max(problem.qmin[i]).min(problem.qmax[i]));
            s0[i].im = q;
            i0[i].im = 0.0;
            y0[i].im = 0.0;
            info!(
                "island {}: bus {i} {:?} -> PQ, Q pinned at {q:.4} p.u.",
                problem.island, before[i]
            );
            events.push(Reclassification {
                iteration,
                bus: i,
                from: before[i],
                q_calc: scalc[i].im,
                q_pinned: q,
            });
        }
        *indices = next;
        events
    }
}
